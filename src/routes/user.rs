use actix_web::{HttpResponse, get, post, web};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set,
};
use serde::Deserialize;
use validator::Validate;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::models::user::{self, Role};
use crate::services::session_service::SessionService;
use crate::utils::{jwt, password};

#[derive(Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Please provide a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
    #[validate(length(min = 1, message = "First name is required."))]
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required."))]
    #[serde(rename = "lastName")]
    pub last_name: String,
    pub role: Role,
}

/// POST /user/register - crée le compte et ouvre la session dans la foulée
/// (PUBLIC). L'unicité de l'email est déléguée à la contrainte UNIQUE : la
/// violation remonte en 400 via ApiError.
#[post("/register")]
pub async fn register(
    body: web::Json<RegisterRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    body.validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let hash = password::hash_password(&body.password).map_err(ApiError::Internal)?;

    let inserted = user::Entity::insert(user::ActiveModel {
        email: Set(body.email.trim().to_string()),
        password_hash: Set(hash),
        first_name: Set(body.first_name.trim().to_string()),
        last_name: Set(body.last_name.trim().to_string()),
        role: Set(body.role),
        created_at: Set(chrono::Utc::now().naive_utc()),
        ..Default::default()
    })
    .exec(db.get_ref())
    .await?;

    let created = user::Entity::find_by_id(inserted.last_insert_id)
        .one(db.get_ref())
        .await?
        .ok_or_else(|| ApiError::Internal("User vanished right after insert".to_string()))?;

    let signed = SessionService::issue(db.get_ref(), created.user_id).await?;

    Ok(HttpResponse::Created()
        .cookie(jwt::session_cookie(signed))
        .json(serde_json::json!({ "success": true, "user": created })))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

/// GET /user/search?query=... - autocomplétion des emails élèves pour le
/// formulaire d'inscription (PROTÉGÉE). Préfixe de 2 caractères minimum,
/// 5 résultats maximum.
#[get("/search")]
pub async fn search(
    _auth: AuthUser,
    params: web::Query<SearchQuery>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    let prefix = params.query.as_deref().unwrap_or("").trim().to_string();

    if prefix.chars().count() < 2 {
        return Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "emails": [] })));
    }

    let emails: Vec<String> = user::Entity::find()
        .select_only()
        .column(user::Column::Email)
        .filter(user::Column::Role.eq(Role::Student))
        .filter(user::Column::Email.starts_with(&prefix))
        .limit(5)
        .into_tuple()
        .all(db.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true, "emails": emails })))
}

pub fn user_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/user").service(register).service(search));
}
