use actix_web::{HttpResponse, delete, get, post, put, web};
use chrono::NaiveDateTime;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbBackend, EntityTrait, FromQueryResult, QueryFilter,
    Statement,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::middleware::{AuthUser, TeacherUser};
use crate::models::course::{self, CourseType};
use crate::models::enrollment;
use crate::models::user::{self, Role};
use crate::services::course_service::{CourseService, NewCourse};

#[derive(Deserialize)]
pub struct CreateCourseRequest {
    pub title: String,
    pub description: Option<String>,
    pub workplace_id: Option<i32>,
    pub course_type: Option<CourseType>,
    #[serde(default)]
    pub student_emails: Vec<String>,
}

#[derive(Deserialize)]
pub struct UpdateCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub workplace_id: Option<i32>,
    pub course_type: Option<CourseType>,
}

#[derive(Deserialize)]
pub struct EnrollRequest {
    pub email: String,
}

/// Ligne de la liste côté prof : le cours enrichi de sa placówka et des
/// compteurs d'élèves et de leçons.
#[derive(Debug, Serialize, FromQueryResult)]
pub struct TeacherCourseRow {
    pub course_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub course_type: CourseType,
    pub workplace_id: Option<i32>,
    pub workplace_name: Option<String>,
    pub color_hex: Option<String>,
    pub created_at: NaiveDateTime,
    pub student_count: i64,
    pub lesson_count: i64,
}

/// Ligne de la liste côté élève : ses cours avec le nom de l'enseignant,
/// la placówka et le nombre de leçons.
#[derive(Debug, Serialize, FromQueryResult)]
pub struct StudentCourseRow {
    pub course_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub course_type: CourseType,
    pub workplace_name: Option<String>,
    pub color_hex: Option<String>,
    pub created_at: NaiveDateTime,
    pub lesson_count: i64,
    pub teacher_name: String,
    pub teacher_lastname: String,
}

#[derive(Debug, Serialize, FromQueryResult)]
pub struct CourseDetailsRow {
    pub course_id: i32,
    pub teacher_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub course_type: CourseType,
    pub workplace_id: Option<i32>,
    pub workplace_name: Option<String>,
    pub color_hex: Option<String>,
    pub created_at: NaiveDateTime,
    pub teacher_name: Option<String>,
    pub teacher_lastname: Option<String>,
}

#[derive(Debug, Serialize, FromQueryResult)]
pub struct RosterRow {
    pub user_id: i32,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// GET /courses - liste selon le rôle : le prof voit ses cours avec
/// compteurs, l'élève voit les cours où il est inscrit (PROTÉGÉE)
#[get("")]
pub async fn list_courses(
    auth: AuthUser,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    match auth.user.role {
        Role::Teacher => {
            let rows = TeacherCourseRow::find_by_statement(Statement::from_sql_and_values(
                DbBackend::MySql,
                r#"SELECT c.course_id, c.title, c.description, c.course_type,
                          c.workplace_id, w.name AS workplace_name, w.color_hex,
                          c.created_at,
                          (SELECT COUNT(*) FROM enrollments e
                            WHERE e.course_id = c.course_id) AS student_count,
                          (SELECT COUNT(*) FROM lessons l
                            WHERE l.course_id = c.course_id) AS lesson_count
                   FROM courses c
                   LEFT JOIN workplaces w ON w.workplace_id = c.workplace_id
                   WHERE c.teacher_id = ?
                   ORDER BY c.created_at DESC"#,
                [auth.user.user_id.into()],
            ))
            .all(db.get_ref())
            .await?;

            Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "data": rows })))
        }
        Role::Student => {
            let rows = StudentCourseRow::find_by_statement(Statement::from_sql_and_values(
                DbBackend::MySql,
                r#"SELECT c.course_id, c.title, c.description, c.course_type,
                          w.name AS workplace_name, w.color_hex, c.created_at,
                          (SELECT COUNT(*) FROM lessons l
                            WHERE l.course_id = c.course_id) AS lesson_count,
                          u.first_name AS teacher_name, u.last_name AS teacher_lastname
                   FROM courses c
                   JOIN enrollments e ON e.course_id = c.course_id
                   JOIN users u ON u.user_id = c.teacher_id
                   LEFT JOIN workplaces w ON w.workplace_id = c.workplace_id
                   WHERE e.student_id = ?
                   ORDER BY c.created_at DESC"#,
                [auth.user.user_id.into()],
            ))
            .all(db.get_ref())
            .await?;

            Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "data": rows })))
        }
    }
}

/// POST /courses - création + inscriptions initiales par email (PROF)
#[post("")]
pub async fn create_course(
    teacher: TeacherUser,
    body: web::Json<CreateCourseRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err(ApiError::Validation(
            "Course title and type are required.".to_string(),
        ));
    }
    let course_type = body.course_type.ok_or_else(|| {
        ApiError::Validation("Course title and type are required.".to_string())
    })?;

    let course_id = CourseService::create(
        db.get_ref(),
        teacher.0.user.user_id,
        NewCourse {
            title: title.to_string(),
            description: body.description.clone(),
            workplace_id: body.workplace_id,
            course_type,
            student_emails: body.student_emails.clone(),
        },
    )
    .await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "course_id": course_id,
    })))
}

/// PUT /courses/{id} - mise à jour partielle (PROF). `workplace_id` est
/// toujours écrit, y compris NULL : c'est le seul moyen de détacher un cours
/// de sa placówka. Les autres champs ne bougent que s'ils sont fournis.
#[put("/{id}")]
pub async fn update_course(
    teacher: TeacherUser,
    path: web::Path<i32>,
    body: web::Json<UpdateCourseRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let course_id = path.into_inner();

    let mut update = course::Entity::update_many()
        .col_expr(course::Column::WorkplaceId, Expr::value(body.workplace_id));

    if let Some(title) = body.title.as_deref().map(str::trim) {
        if title.is_empty() {
            return Err(ApiError::Validation("Course title is required.".to_string()));
        }
        update = update.col_expr(course::Column::Title, Expr::value(title));
    }
    if let Some(description) = &body.description {
        update = update.col_expr(course::Column::Description, Expr::value(description.clone()));
    }
    if let Some(course_type) = body.course_type {
        update = update.col_expr(course::Column::CourseType, Expr::value(course_type));
    }

    let result = update
        .filter(course::Column::CourseId.eq(course_id))
        .filter(course::Column::TeacherId.eq(teacher.0.user.user_id))
        .exec(db.get_ref())
        .await?;

    if result.rows_affected == 0 {
        return Err(ApiError::NotFound("Course not found.".to_string()));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// DELETE /courses/{id} - suppression bornée au propriétaire (PROF)
#[delete("/{id}")]
pub async fn delete_course(
    teacher: TeacherUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let course_id = path.into_inner();

    let result = course::Entity::delete_many()
        .filter(course::Column::CourseId.eq(course_id))
        .filter(course::Column::TeacherId.eq(teacher.0.user.user_id))
        .exec(db.get_ref())
        .await?;

    if result.rows_affected == 0 {
        return Err(ApiError::NotFound("Course not found.".to_string()));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// POST /courses/{id}/enroll - ajoute un élève par email (PROF)
#[post("/{id}/enroll")]
pub async fn enroll_student(
    teacher: TeacherUser,
    path: web::Path<i32>,
    body: web::Json<EnrollRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let course_id = path.into_inner();

    // D'abord la propriété du cours, ensuite seulement la résolution de
    // l'email : on ne laisse pas sonder l'annuaire via un cours d'autrui
    course::Entity::find_by_id(course_id)
        .filter(course::Column::TeacherId.eq(teacher.0.user.user_id))
        .one(db.get_ref())
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found.".to_string()))?;

    let student = user::Entity::find()
        .filter(user::Column::Role.eq(Role::Student))
        .filter(user::Column::Email.eq(body.email.trim()))
        .one(db.get_ref())
        .await?
        .ok_or_else(|| {
            ApiError::NotFound("No student account found for this email address.".to_string())
        })?;

    CourseService::enroll(db.get_ref(), course_id, student.user_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// DELETE /courses/{id}/students/{student_id} - désinscrit un élève (PROF)
#[delete("/{id}/students/{student_id}")]
pub async fn unenroll_student(
    teacher: TeacherUser,
    path: web::Path<(i32, i32)>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let (course_id, student_id) = path.into_inner();

    course::Entity::find_by_id(course_id)
        .filter(course::Column::TeacherId.eq(teacher.0.user.user_id))
        .one(db.get_ref())
        .await?
        .ok_or_else(|| ApiError::NotFound("Course not found.".to_string()))?;

    enrollment::Entity::delete_by_id((student_id, course_id))
        .exec(db.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// GET /courses/{id}/details - fiche complète. Le prof obtient aussi la
/// liste des élèves inscrits ; l'élève voit la fiche de ses cours
/// uniquement, jamais le reste du roster (PROTÉGÉE)
#[get("/{id}/details")]
pub async fn course_details(
    auth: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let course_id = path.into_inner();

    let details = match auth.user.role {
        // Côté prof les colonnes enseignant sont inutiles : NULL figées
        // pour garder une seule struct de lecture pour les deux branches
        Role::Teacher => CourseDetailsRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::MySql,
            r#"SELECT c.course_id, c.teacher_id, c.title, c.description,
                      c.course_type, c.workplace_id, w.name AS workplace_name,
                      w.color_hex, c.created_at,
                      NULL AS teacher_name, NULL AS teacher_lastname
               FROM courses c
               LEFT JOIN workplaces w ON w.workplace_id = c.workplace_id
               WHERE c.course_id = ? AND c.teacher_id = ?"#,
            [course_id.into(), auth.user.user_id.into()],
        ))
        .one(db.get_ref())
        .await?,
        Role::Student => CourseDetailsRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::MySql,
            r#"SELECT c.course_id, c.teacher_id, c.title, c.description,
                      c.course_type, c.workplace_id, w.name AS workplace_name,
                      w.color_hex, c.created_at,
                      u.first_name AS teacher_name, u.last_name AS teacher_lastname
               FROM courses c
               JOIN enrollments e ON e.course_id = c.course_id AND e.student_id = ?
               JOIN users u ON u.user_id = c.teacher_id
               LEFT JOIN workplaces w ON w.workplace_id = c.workplace_id
               WHERE c.course_id = ?"#,
            [auth.user.user_id.into(), course_id.into()],
        ))
        .one(db.get_ref())
        .await?,
    };

    let details = details.ok_or_else(|| ApiError::NotFound("Course not found.".to_string()))?;

    let students = match auth.user.role {
        Role::Teacher => RosterRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::MySql,
            r#"SELECT u.user_id, u.email, u.first_name, u.last_name
               FROM users u
               JOIN enrollments e ON e.student_id = u.user_id
               WHERE e.course_id = ?
               ORDER BY u.last_name, u.first_name"#,
            [course_id.into()],
        ))
        .all(db.get_ref())
        .await?,
        Role::Student => Vec::new(),
    };

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "course": details,
        "students": students,
    })))
}

pub fn course_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/courses")
            .service(list_courses)
            .service(create_course)
            .service(update_course)
            .service(delete_course)
            .service(enroll_student)
            .service(unenroll_student)
            .service(course_details),
    );
}
