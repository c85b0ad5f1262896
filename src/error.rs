use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Erreur API unique pour toutes les routes. La traduction vers un code HTTP
/// et un message client se fait ici, une seule fois ; les handlers se
/// contentent de `?`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] DbErr),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Violation d'unicité (email déjà pris) remontée par la base.
    fn duplicate_key(&self) -> bool {
        match self {
            ApiError::Database(err) => {
                matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
            }
            _ => false,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Database(_) if self.duplicate_key() => StatusCode::BAD_REQUEST,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::Validation(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg) => msg.clone(),
            ApiError::Database(_) if self.duplicate_key() => {
                "This email address is already registered.".to_string()
            }
            // Détail loggé côté serveur uniquement, message générique au client
            ApiError::Database(err) => {
                tracing::error!("database error: {}", err);
                "An unexpected server error occurred.".to_string()
            }
            ApiError::Internal(detail) => {
                tracing::error!("internal error: {}", detail);
                "An unexpected server error occurred.".to_string()
            }
        };

        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "success": false,
            "message": message,
        }))
    }
}
