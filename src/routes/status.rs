use actix_web::{HttpResponse, get, web};
use sea_orm::{DatabaseConnection, DbBackend, FromQueryResult, Statement};

use crate::error::ApiError;

#[derive(FromQueryResult)]
struct Solution {
    solution: i64,
}

/// GET /status - vivacité du serveur (PUBLIC)
#[get("")]
pub async fn status() -> HttpResponse {
    HttpResponse::Ok().body("MusicDesk API is up and running!")
}

/// GET /status/db-test - aller-retour basique vers la base (PUBLIC)
#[get("/db-test")]
pub async fn db_test(db: web::Data<DatabaseConnection>) -> Result<HttpResponse, ApiError> {
    let row = Solution::find_by_statement(Statement::from_string(
        DbBackend::MySql,
        "SELECT 1 + 1 AS solution",
    ))
    .one(db.get_ref())
    .await?
    .ok_or_else(|| ApiError::Internal("Empty result from database".to_string()))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Database connection successful!",
        "solution": row.solution,
    })))
}

pub fn status_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/status").service(status).service(db_test));
}
