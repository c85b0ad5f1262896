use actix_web::{HttpResponse, get, post, web};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::models::user::{Column as UserColumn, Entity as Users};
use crate::services::session_service::SessionService;
use crate::utils::{jwt, password};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /auth/login - connexion (PUBLIC)
#[post("/login")]
pub async fn login(
    body: web::Json<LoginRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err(ApiError::Validation(
            "Please provide an email and a password.".to_string(),
        ));
    }

    // Même 401 pour « email inconnu » et « mauvais mot de passe »
    let user = Users::find()
        .filter(UserColumn::Email.eq(body.email.trim()))
        .one(db.get_ref())
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password.".to_string()))?;

    let is_match = password::verify_password(&body.password, &user.password_hash).unwrap_or(false);
    if !is_match {
        return Err(ApiError::Unauthorized(
            "Invalid email or password.".to_string(),
        ));
    }

    let signed = SessionService::issue(db.get_ref(), user.user_id).await?;

    Ok(HttpResponse::Ok()
        .cookie(jwt::session_cookie(signed))
        .json(serde_json::json!({ "success": true, "user": user })))
}

/// POST /auth/logout - révoque UNIQUEMENT la session courante (PROTÉGÉE)
#[post("/logout")]
pub async fn logout(
    auth: AuthUser,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, ApiError> {
    SessionService::revoke(db.get_ref(), &auth.token_id).await?;

    Ok(HttpResponse::Ok()
        .cookie(jwt::clear_session_cookie())
        .json(serde_json::json!({ "success": true, "message": "Logged out successfully." })))
}

/// GET /auth/check - renvoie l'utilisateur de la session courante (PROTÉGÉE)
#[get("/check")]
pub async fn check(auth: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "success": true, "user": auth.user }))
}

pub fn auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(login)
            .service(logout)
            .service(check),
    );
}
