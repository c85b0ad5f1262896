use actix_multipart::Multipart;
use actix_web::{HttpResponse, delete, get, post, put, web};
use chrono::NaiveDateTime;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::middleware::{AuthUser, TeacherUser};
use crate::models::course;
use crate::models::enrollment;
use crate::models::lesson::{self, LessonStatus};
use crate::models::lesson_progress;
use crate::models::material;
use crate::models::user::Role;
use crate::services::progress_service::ProgressService;
use crate::utils::upload::{self, SavedFile, UploadForm};

/// Progression renvoyée avec chaque leçon ; les zéros par défaut couvrent
/// l'élève qui n'a pas encore ouvert la leçon.
#[derive(Debug, Default, Serialize)]
pub struct ProgressView {
    pub time_spent_seconds: i32,
    pub is_completed: bool,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize)]
pub struct LessonView {
    #[serde(flatten)]
    pub lesson: lesson::Model,
    pub materials: Vec<material::Model>,
    pub progress: ProgressView,
}

#[derive(Deserialize)]
pub struct UpdateLessonRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration_minutes: Option<i32>,
    pub is_visible: Option<bool>,
    pub status: Option<LessonStatus>,
}

#[derive(Deserialize)]
pub struct ProgressRequest {
    pub time_spent: i32,
    pub is_completed: bool,
}

/// Résout une leçon ET vérifie que son cours appartient au prof connecté.
/// Leçon inconnue ou cours d'autrui : même 404.
async fn owned_lesson(
    db: &DatabaseConnection,
    teacher_id: i32,
    lesson_id: i32,
) -> Result<lesson::Model, ApiError> {
    let found = lesson::Entity::find_by_id(lesson_id)
        .one(db)
        .await?
        .ok_or_else(|| ApiError::NotFound("Lesson not found.".to_string()))?;

    course::Entity::find_by_id(found.course_id)
        .filter(course::Column::TeacherId.eq(teacher_id))
        .one(db)
        .await?
        .ok_or_else(|| ApiError::NotFound("Lesson not found.".to_string()))?;

    Ok(found)
}

/// GET /lessons/course/{course_id} - leçons du cours avec matériaux et
/// progression (PROTÉGÉE). L'élève ne voit que les leçons visibles et sa
/// propre progression ; le prof voit tout, avec la progression du premier
/// inscrit pour les cours individuels.
#[get("/course/{course_id}")]
pub async fn list_lessons(
    auth: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let course_id = path.into_inner();

    let target_student_id = match auth.user.role {
        Role::Student => {
            // Accès borné à l'inscription
            enrollment::Entity::find_by_id((auth.user.user_id, course_id))
                .one(db.get_ref())
                .await?
                .ok_or_else(|| ApiError::NotFound("Course not found.".to_string()))?;
            Some(auth.user.user_id)
        }
        Role::Teacher => {
            course::Entity::find_by_id(course_id)
                .filter(course::Column::TeacherId.eq(auth.user.user_id))
                .one(db.get_ref())
                .await?
                .ok_or_else(|| ApiError::NotFound("Course not found.".to_string()))?;

            enrollment::Entity::find()
                .filter(enrollment::Column::CourseId.eq(course_id))
                .order_by_asc(enrollment::Column::StudentId)
                .one(db.get_ref())
                .await?
                .map(|e| e.student_id)
        }
    };

    let mut query = lesson::Entity::find().filter(lesson::Column::CourseId.eq(course_id));
    if auth.user.role == Role::Student {
        query = query.filter(lesson::Column::IsVisible.eq(true));
    }
    let lessons = query
        .order_by_asc(lesson::Column::LessonId)
        .all(db.get_ref())
        .await?;

    let mut views = Vec::with_capacity(lessons.len());
    for item in lessons {
        let materials = material::Entity::find()
            .filter(material::Column::LessonId.eq(item.lesson_id))
            .all(db.get_ref())
            .await?;

        let progress = match target_student_id {
            Some(student_id) => lesson_progress::Entity::find_by_id((student_id, item.lesson_id))
                .one(db.get_ref())
                .await?
                .map(|p| ProgressView {
                    time_spent_seconds: p.time_spent_seconds,
                    is_completed: p.is_completed,
                    completed_at: p.completed_at,
                })
                .unwrap_or_default(),
            None => ProgressView::default(),
        };

        views.push(LessonView {
            lesson: item,
            materials,
            progress,
        });
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "data": views })))
}

fn parse_lesson_fields(form: &UploadForm) -> Result<(i32, String, Option<String>, i32, bool), ApiError> {
    let course_id: i32 = form
        .fields
        .get("course_id")
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| ApiError::Validation("A valid course_id is required.".to_string()))?;

    let title = form
        .fields
        .get("title")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Validation("Lesson title is required.".to_string()))?;

    let description = form
        .fields
        .get("description")
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    let duration_minutes = form
        .fields
        .get("duration_minutes")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(45);

    let is_visible = form
        .fields
        .get("is_visible")
        .map(|v| v.trim() != "false")
        .unwrap_or(true);

    Ok((course_id, title, description, duration_minutes, is_visible))
}

async fn insert_lesson_with_materials(
    db: &DatabaseConnection,
    teacher_id: i32,
    form: &UploadForm,
) -> Result<i32, ApiError> {
    let (course_id, title, description, duration_minutes, is_visible) = parse_lesson_fields(form)?;

    course::Entity::find_by_id(course_id)
        .filter(course::Column::TeacherId.eq(teacher_id))
        .one(db)
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found.".to_string()))?;

    let txn = db.begin().await?;

    let inserted = lesson::Entity::insert(lesson::ActiveModel {
        course_id: Set(course_id),
        title: Set(title),
        description: Set(description),
        duration_minutes: Set(duration_minutes),
        is_visible: Set(is_visible),
        status: Set(LessonStatus::Planned),
        created_at: Set(chrono::Utc::now().naive_utc()),
        ..Default::default()
    })
    .exec(&txn)
    .await?;

    let lesson_id = inserted.last_insert_id;

    for file in &form.files {
        material::Entity::insert(material::ActiveModel {
            lesson_id: Set(lesson_id),
            title: Set(file.original_name.clone()),
            file_path: Set(file.relative_path.clone()),
            ..Default::default()
        })
        .exec(&txn)
        .await?;
    }

    txn.commit().await?;
    Ok(lesson_id)
}

/// POST /lessons - création multipart : champs texte + pièces jointes (PROF).
/// Les fichiers sont écrits avant la transaction ; si elle échoue, ils sont
/// retirés du disque pour ne pas laisser d'orphelins.
#[post("")]
pub async fn create_lesson(
    teacher: TeacherUser,
    mut payload: Multipart,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let form = upload::collect_form(&mut payload).await?;

    match insert_lesson_with_materials(db.get_ref(), teacher.0.user.user_id, &form).await {
        Ok(lesson_id) => Ok(HttpResponse::Created().json(serde_json::json!({
            "success": true,
            "lesson_id": lesson_id,
        }))),
        Err(e) => {
            upload::cleanup_files(&form.files);
            Err(e)
        }
    }
}

/// PUT /lessons/{id} - mise à jour partielle (PROF)
#[put("/{id}")]
pub async fn update_lesson(
    teacher: TeacherUser,
    path: web::Path<i32>,
    body: web::Json<UpdateLessonRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let lesson_id = path.into_inner();
    owned_lesson(db.get_ref(), teacher.0.user.user_id, lesson_id).await?;

    let mut update = lesson::Entity::update_many();
    let mut dirty = false;

    if let Some(title) = body.title.as_deref().map(str::trim) {
        if title.is_empty() {
            return Err(ApiError::Validation("Lesson title is required.".to_string()));
        }
        update = update.col_expr(lesson::Column::Title, Expr::value(title));
        dirty = true;
    }
    if let Some(description) = &body.description {
        update = update.col_expr(lesson::Column::Description, Expr::value(description.clone()));
        dirty = true;
    }
    if let Some(duration) = body.duration_minutes {
        update = update.col_expr(lesson::Column::DurationMinutes, Expr::value(duration));
        dirty = true;
    }
    if let Some(visible) = body.is_visible {
        update = update.col_expr(lesson::Column::IsVisible, Expr::value(visible));
        dirty = true;
    }
    if let Some(status) = body.status {
        update = update.col_expr(lesson::Column::Status, Expr::value(status));
        dirty = true;
    }

    // Corps vide : rien à écrire, un UPDATE sans SET serait invalide
    if dirty {
        update
            .filter(lesson::Column::LessonId.eq(lesson_id))
            .exec(db.get_ref())
            .await?;
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// POST /lessons/{id}/materials - pièces jointes supplémentaires (PROF)
#[post("/{id}/materials")]
pub async fn add_materials(
    teacher: TeacherUser,
    path: web::Path<i32>,
    mut payload: Multipart,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let lesson_id = path.into_inner();
    owned_lesson(db.get_ref(), teacher.0.user.user_id, lesson_id).await?;

    let form = upload::collect_form(&mut payload).await?;
    if form.files.is_empty() {
        return Err(ApiError::Validation("No files were uploaded.".to_string()));
    }

    match insert_materials(db.get_ref(), lesson_id, &form.files).await {
        Ok(()) => Ok(HttpResponse::Created().json(serde_json::json!({ "success": true }))),
        Err(e) => {
            upload::cleanup_files(&form.files);
            Err(e)
        }
    }
}

async fn insert_materials(
    db: &DatabaseConnection,
    lesson_id: i32,
    files: &[SavedFile],
) -> Result<(), ApiError> {
    for file in files {
        material::Entity::insert(material::ActiveModel {
            lesson_id: Set(lesson_id),
            title: Set(file.original_name.clone()),
            file_path: Set(file.relative_path.clone()),
            ..Default::default()
        })
        .exec(db)
        .await?;
    }
    Ok(())
}

/// DELETE /lessons/{id}/materials/{material_id} - retire la ligne puis le
/// fichier ; la base d'abord, le disque ensuite en best-effort (PROF)
#[delete("/{id}/materials/{material_id}")]
pub async fn delete_material(
    teacher: TeacherUser,
    path: web::Path<(i32, i32)>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let (lesson_id, material_id) = path.into_inner();
    owned_lesson(db.get_ref(), teacher.0.user.user_id, lesson_id).await?;

    let found = material::Entity::find_by_id(material_id)
        .filter(material::Column::LessonId.eq(lesson_id))
        .one(db.get_ref())
        .await?
        .ok_or_else(|| ApiError::NotFound("Material not found.".to_string()))?;

    material::Entity::delete_by_id(material_id)
        .exec(db.get_ref())
        .await?;

    upload::remove_stored_file(&found.file_path);

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// POST /lessons/{id}/progress - l'élève pousse son minuteur (PROTÉGÉE).
/// Chacun n'écrit que SA progression : l'id vient de la session, jamais
/// du corps de la requête.
#[post("/{id}/progress")]
pub async fn record_progress(
    auth: AuthUser,
    path: web::Path<i32>,
    body: web::Json<ProgressRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let lesson_id = path.into_inner();

    if body.time_spent < 0 {
        return Err(ApiError::Validation(
            "time_spent must not be negative.".to_string(),
        ));
    }

    ProgressService::record(
        db.get_ref(),
        auth.user.user_id,
        lesson_id,
        body.time_spent,
        body.is_completed,
    )
    .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

pub fn lesson_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/lessons")
            .service(list_lessons)
            .service(create_lesson)
            .service(update_lesson)
            .service(add_materials)
            .service(delete_material)
            .service(record_progress),
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

    #[actix_web::test]
    async fn test_student_not_enrolled_gets_404() {
        let db = student_session(MockDatabase::new(DatabaseBackend::MySql))
            .append_query_results([Vec::<enrollment::Model>::new()])
            .into_connection();
        let signed = jwt::sign_session("live-token").unwrap();

        let app = test::init_service(
            App::new().app_data(Data::new(db)).configure(lesson_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/lessons/course/42")
            .cookie(jwt::session_cookie(signed))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 404);
    }

    #[actix_web::test]
    async fn test_negative_time_spent_is_400() {
        let db = student_session(MockDatabase::new(DatabaseBackend::MySql)).into_connection();
        let signed = jwt::sign_session("live-token").unwrap();

        let app = test::init_service(
            App::new().app_data(Data::new(db)).configure(lesson_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/lessons/3/progress")
            .cookie(jwt::session_cookie(signed))
            .set_json(serde_json::json!({ "time_spent": -10, "is_completed": false }))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 400);
    }

    #[actix_web::test]
    async fn test_parse_lesson_fields_defaults() {
        let mut form = UploadForm::default();
        form.fields.insert("course_id".to_string(), "42".to_string());
        form.fields
            .insert("title".to_string(), "  Gamy C-dur  ".to_string());

        let (course_id, title, description, duration, visible) =
            parse_lesson_fields(&form).unwrap();
        assert_eq!(course_id, 42);
        assert_eq!(title, "Gamy C-dur");
        assert_eq!(description, None);
        assert_eq!(duration, 45);
        assert!(visible);
    }

    #[actix_web::test]
    async fn test_parse_lesson_fields_requires_title() {
        let mut form = UploadForm::default();
        form.fields.insert("course_id".to_string(), "42".to_string());
        form.fields.insert("title".to_string(), "   ".to_string());

        assert!(parse_lesson_fields(&form).is_err());
    }

    #[actix_web::test]
    async fn test_parse_lesson_fields_hidden_flag() {
        let mut form = UploadForm::default();
        form.fields.insert("course_id".to_string(), "42".to_string());
        form.fields.insert("title".to_string(), "Gamy".to_string());
        form.fields
            .insert("is_visible".to_string(), "false".to_string());

        let (_, _, _, _, visible) = parse_lesson_fields(&form).unwrap();
        assert!(!visible);
    }
}
