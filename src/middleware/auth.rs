use actix_web::{FromRequest, HttpRequest, dev::Payload, web};
use futures::future::LocalBoxFuture;
use sea_orm::DatabaseConnection;
use serde::Serialize;

use crate::error::ApiError;
use crate::models::user::{self, Role};
use crate::services::session_service::SessionService;

/// Utilisateur authentifié, extrait du cookie de session sur chaque requête
/// protégée. Porte aussi le token_id pour pouvoir révoquer EXACTEMENT cette
/// session au logout.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub user: user::Model,
    #[serde(skip_serializing)]
    pub token_id: String,
}

/// Extracteur asynchrone : vérifie le JWT puis la ligne de session en base.
/// Toute défaillance (cookie absent, signature, expiration, session
/// révoquée) se traduit par le même 401.
impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();

        Box::pin(async move {
            let db = req
                .app_data::<web::Data<DatabaseConnection>>()
                .cloned()
                .ok_or_else(|| {
                    ApiError::Internal("Database connection not configured".to_string())
                })?;

            let cookie = req
                .cookie("token")
                .ok_or_else(|| ApiError::Unauthorized("Not logged in.".to_string()))?;

            let session = SessionService::resolve(db.get_ref(), cookie.value())
                .await?
                .ok_or_else(|| {
                    ApiError::Unauthorized("Session expired, please log in again.".to_string())
                })?;

            Ok(AuthUser {
                user: session.user,
                token_id: session.token_id,
            })
        })
    }
}

/// Garde déclarative pour les routes réservées aux profs : 403 sinon.
#[derive(Debug, Clone)]
pub struct TeacherUser(pub AuthUser);

impl FromRequest for TeacherUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let auth_future = AuthUser::from_request(req, payload);

        Box::pin(async move {
            let auth = auth_future.await?;

            if auth.user.role != Role::Teacher {
                return Err(ApiError::Forbidden("Insufficient permissions.".to_string()));
            }

            Ok(TeacherUser(auth))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, HttpResponse, test, web::Data};
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    use crate::utils::jwt;

    async fn protected(auth: AuthUser) -> HttpResponse {
        HttpResponse::Ok().json(serde_json::json!({ "user_id": auth.user.user_id }))
    }

    async fn teacher_only(teacher: TeacherUser) -> HttpResponse {
        HttpResponse::Ok().json(serde_json::json!({ "user_id": teacher.0.user.user_id }))
    }

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

    #[actix_web::test]
    async fn test_missing_cookie_is_401() {
        let db = MockDatabase::new(DatabaseBackend::MySql).into_connection();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(db))
                .route("/protected", actix_web::web::get().to(protected)),
        )
        .await;

        let req = test::TestRequest::get().uri("/protected").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 401);
    }

    #[actix_web::test]
    async fn test_garbage_token_is_401_without_db_lookup() {
        // Aucun résultat préparé : si l'extracteur touchait la base, le mock paniquerait
        let db = MockDatabase::new(DatabaseBackend::MySql).into_connection();
        let app = test::init_service(
            App::new()
                .app_data(Data::new(db))
                .route("/protected", actix_web::web::get().to(protected)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/protected")
            .cookie(jwt::session_cookie("not.a.jwt".to_string()))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 401);
    }

    #[actix_web::test]
    async fn test_revoked_session_is_401() {
        let signed = jwt::sign_session("revoked-token").unwrap();

        // JWT valide mais la ligne user_tokens n'existe plus (logout)
        let db = MockDatabase::new(DatabaseBackend::MySql)
            .append_query_results([Vec::<crate::models::user_token::Model>::new()])
            .into_connection();

        let app = test::init_service(
            App::new()
                .app_data(Data::new(db))
                .route("/protected", actix_web::web::get().to(protected)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/protected")
            .cookie(jwt::session_cookie(signed))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 401);
    }

    #[actix_web::test]
    async fn test_student_rejected_from_teacher_route() {
        let signed = jwt::sign_session("live-token").unwrap();

        let db = MockDatabase::new(DatabaseBackend::MySql)
            .append_query_results([vec![crate::models::user_token::Model {
                token_id: "live-token".to_string(),
                user_id: 7,
            }]])
            .append_query_results([vec![student_model()]])
            .into_connection();

        let app = test::init_service(
            App::new()
                .app_data(Data::new(db))
                .route("/teacher", actix_web::web::get().to(teacher_only)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/teacher")
            .cookie(jwt::session_cookie(signed))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 403);
    }
}
