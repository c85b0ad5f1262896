use actix_web::{HttpResponse, delete, get, post, put, web};
use chrono::NaiveDateTime;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbBackend, EntityTrait, FromQueryResult, PaginatorTrait,
    QueryFilter, Set, Statement,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::models::comment;
use crate::models::user::Role;

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub lesson_id: i32,
    pub content: String,
}

#[derive(Deserialize)]
pub struct UpdateCommentRequest {
    pub content: String,
}

/// Commentaire enrichi de son auteur, tel que le fil l'affiche.
#[derive(Debug, Serialize, FromQueryResult)]
pub struct CommentRow {
    pub comment_id: i32,
    pub content: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub is_deleted: bool,
    pub user_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub email: String,
}

/// Entrée du panneau de notifications : le commentaire, sa leçon, son cours.
#[derive(Debug, Serialize, FromQueryResult)]
pub struct NotificationRow {
    pub comment_id: i32,
    pub content: String,
    pub created_at: NaiveDateTime,
    pub lesson_id: i32,
    pub lesson_title: String,
    pub course_id: i32,
    pub course_title: String,
    pub author_name: String,
    pub author_lastname: String,
}

/// GET /comments/lesson/{lesson_id} - fil complet de la leçon, du plus
/// ancien au plus récent (PROTÉGÉE). Les commentaires supprimés restent
/// dans le fil, le client affiche un espace réservé à la place du contenu.
#[get("/lesson/{lesson_id}")]
pub async fn list_comments(
    _auth: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let lesson_id = path.into_inner();

    let rows = CommentRow::find_by_statement(Statement::from_sql_and_values(
        DbBackend::MySql,
        r#"SELECT c.comment_id, c.content, c.created_at, c.updated_at,
                  c.is_deleted, c.user_id,
                  u.first_name, u.last_name, u.role, u.email
           FROM comments c
           JOIN users u ON u.user_id = c.user_id
           WHERE c.lesson_id = ?
           ORDER BY c.created_at ASC"#,
        [lesson_id.into()],
    ))
    .all(db.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "data": rows })))
}

/// GET /comments/lesson/{lesson_id}/unread - nombre de commentaires des
/// AUTRES non lus et non supprimés, pour le badge (PROTÉGÉE)
#[get("/lesson/{lesson_id}/unread")]
pub async fn unread_count(
    auth: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let lesson_id = path.into_inner();

    let count = comment::Entity::find()
        .filter(comment::Column::LessonId.eq(lesson_id))
        .filter(comment::Column::UserId.ne(auth.user.user_id))
        .filter(comment::Column::IsRead.eq(false))
        .filter(comment::Column::IsDeleted.eq(false))
        .count(db.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "count": count })))
}

/// PUT /comments/lesson/{lesson_id}/read - marque comme lus tous les
/// commentaires des autres sous cette leçon (PROTÉGÉE)
#[put("/lesson/{lesson_id}/read")]
pub async fn mark_read(
    auth: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let lesson_id = path.into_inner();

    comment::Entity::update_many()
        .col_expr(comment::Column::IsRead, Expr::value(true))
        .filter(comment::Column::LessonId.eq(lesson_id))
        .filter(comment::Column::UserId.ne(auth.user.user_id))
        .filter(comment::Column::IsRead.eq(false))
        .exec(db.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// POST /comments - nouveau commentaire sous une leçon (PROTÉGÉE)
#[post("")]
pub async fn create_comment(
    auth: AuthUser,
    body: web::Json<CreateCommentRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let content = body.content.trim();
    if content.is_empty() {
        return Err(ApiError::Validation(
            "Comment content must not be empty.".to_string(),
        ));
    }

    let now = chrono::Utc::now().naive_utc();
    let inserted = comment::Entity::insert(comment::ActiveModel {
        lesson_id: Set(body.lesson_id),
        user_id: Set(auth.user.user_id),
        content: Set(content.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        is_deleted: Set(false),
        is_read: Set(false),
        ..Default::default()
    })
    .exec(db.get_ref())
    .await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "comment_id": inserted.last_insert_id,
    })))
}

/// Charge le commentaire et vérifie l'auteur : 404 s'il n'existe pas,
/// 403 s'il appartient à quelqu'un d'autre. Contrairement aux ressources
/// du prof, les deux cas sont distingués — le fil est déjà visible des
/// deux côtés, le 403 ne révèle rien.
async fn authored_comment(
    db: &DatabaseConnection,
    user_id: i32,
    comment_id: i32,
) -> Result<comment::Model, ApiError> {
    let found = comment::Entity::find_by_id(comment_id)
        .one(db)
        .await?
        .ok_or_else(|| ApiError::NotFound("Comment not found.".to_string()))?;

    if found.user_id != user_id {
        return Err(ApiError::Forbidden(
            "You can only modify your own comments.".to_string(),
        ));
    }

    Ok(found)
}

/// PUT /comments/{comment_id} - édition par l'auteur uniquement (PROTÉGÉE)
#[put("/{comment_id}")]
pub async fn update_comment(
    auth: AuthUser,
    path: web::Path<i32>,
    body: web::Json<UpdateCommentRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let comment_id = path.into_inner();

    let content = body.content.trim();
    if content.is_empty() {
        return Err(ApiError::Validation(
            "Comment content must not be empty.".to_string(),
        ));
    }

    authored_comment(db.get_ref(), auth.user.user_id, comment_id).await?;

    comment::Entity::update_many()
        .col_expr(comment::Column::Content, Expr::value(content))
        .col_expr(
            comment::Column::UpdatedAt,
            Expr::value(chrono::Utc::now().naive_utc()),
        )
        .filter(comment::Column::CommentId.eq(comment_id))
        .exec(db.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// DELETE /comments/{comment_id} - suppression logique par l'auteur : la
/// ligne reste, le fil garde sa place (PROTÉGÉE)
#[delete("/{comment_id}")]
pub async fn delete_comment(
    auth: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let comment_id = path.into_inner();

    authored_comment(db.get_ref(), auth.user.user_id, comment_id).await?;

    comment::Entity::update_many()
        .col_expr(comment::Column::IsDeleted, Expr::value(true))
        .filter(comment::Column::CommentId.eq(comment_id))
        .exec(db.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// GET /comments/notifications - les 10 derniers commentaires NON LUS des
/// autres dans les cours où je suis impliqué, comme prof ou comme inscrit
/// (PROTÉGÉE)
#[get("/notifications")]
pub async fn notifications(
    auth: AuthUser,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let rows = NotificationRow::find_by_statement(Statement::from_sql_and_values(
        DbBackend::MySql,
        r#"SELECT cm.comment_id, cm.content, cm.created_at,
                  l.lesson_id, l.title AS lesson_title,
                  co.course_id, co.title AS course_title,
                  u.first_name AS author_name, u.last_name AS author_lastname
           FROM comments cm
           JOIN lessons l ON l.lesson_id = cm.lesson_id
           JOIN courses co ON co.course_id = l.course_id
           JOIN users u ON u.user_id = cm.user_id
           WHERE cm.user_id != ?
             AND cm.is_read = FALSE
             AND cm.is_deleted = FALSE
             AND (co.teacher_id = ?
                  OR EXISTS (SELECT 1 FROM enrollments e
                              WHERE e.course_id = co.course_id
                                AND e.student_id = ?))
           ORDER BY cm.created_at DESC
           LIMIT 10"#,
        [
            auth.user.user_id.into(),
            auth.user.user_id.into(),
            auth.user.user_id.into(),
        ],
    ))
    .all(db.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "data": rows })))
}

pub fn comment_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/comments")
            .service(list_comments)
            .service(unread_count)
            .service(mark_read)
            .service(create_comment)
            .service(notifications)
            .service(update_comment)
            .service(delete_comment),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test, web::Data};
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    use crate::models::user;
    use crate::utils::jwt;

    fn student_model() -> user::Model {
        user::Model {
            user_id: 7,
            email: "s1@test.pl".to_string(),
            password_hash: "pbkdf2:sha256:600000$x$y".to_string(),
            first_name: "Jan".to_string(),
            last_name: "Kowalski".to_string(),
            role: Role::Student,
            created_at: Utc::now().naive_utc(),
        }
    }

    fn student_session(db: MockDatabase) -> MockDatabase {
        db.append_query_results([vec![crate::models::user_token::Model {
            token_id: "live-token".to_string(),
            user_id: 7,
        }]])
        .append_query_results([vec![student_model()]])
    }

    fn foreign_comment() -> comment::Model {
        comment::Model {
            comment_id: 5,
            lesson_id: 3,
            user_id: 1,
            content: "Świetna robota!".to_string(),
            created_at: Utc::now().naive_utc(),
            updated_at: Utc::now().naive_utc(),
            is_deleted: false,
            is_read: false,
        }
    }

    #[actix_web::test]
    async fn test_editing_someone_elses_comment_is_403() {
        let db = student_session(MockDatabase::new(DatabaseBackend::MySql))
            .append_query_results([vec![foreign_comment()]])
            .into_connection();
        let signed = jwt::sign_session("live-token").unwrap();

        let app = test::init_service(
            App::new().app_data(Data::new(db)).configure(comment_routes),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/comments/5")
            .cookie(jwt::session_cookie(signed))
            .set_json(serde_json::json!({ "content": "zmiana" }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 403);
    }

    #[actix_web::test]
    async fn test_deleting_missing_comment_is_404() {
        let db = student_session(MockDatabase::new(DatabaseBackend::MySql))
            .append_query_results([Vec::<comment::Model>::new()])
            .into_connection();
        let signed = jwt::sign_session("live-token").unwrap();

        let app = test::init_service(
            App::new().app_data(Data::new(db)).configure(comment_routes),
        )
        .await;

        let req = test::TestRequest::delete()
            .uri("/comments/99")
            .cookie(jwt::session_cookie(signed))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 404);
    }

    #[actix_web::test]
    async fn test_blank_comment_is_400() {
        let db = student_session(MockDatabase::new(DatabaseBackend::MySql)).into_connection();
        let signed = jwt::sign_session("live-token").unwrap();

        let app = test::init_service(
            App::new().app_data(Data::new(db)).configure(comment_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/comments")
            .cookie(jwt::session_cookie(signed))
            .set_json(serde_json::json!({ "lesson_id": 3, "content": "   " }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 400);
    }
}
