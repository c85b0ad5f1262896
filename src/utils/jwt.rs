use actix_web::cookie::{Cookie, SameSite, time};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::env;

/// Durée de vie d'une session (JWT + cookie).
pub const SESSION_TTL_DAYS: i64 = 30;

/// Le payload ne contient QUE l'id de la ligne `user_tokens`, jamais
/// l'utilisateur : la validité réelle se décide en base, pas dans le JWT.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub id: String, // token_id de la table user_tokens
    pub exp: i64,
}

fn jwt_secret() -> String {
    env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set, using default (INSECURE)");
        "default-insecure-key-change-this".to_string()
    })
}

/// Signe un JWT portant un token_id de session, expiration 30 jours.
pub fn sign_session(token_id: &str) -> Result<String, String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::days(SESSION_TTL_DAYS))
        .ok_or("Failed to calculate expiration")?
        .timestamp();

    let claims = Claims {
        id: token_id.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret().as_ref()),
    )
    .map_err(|e| format!("Failed to sign token: {}", e))
}

/// Vérifie signature et expiration, sans toucher à la base.
pub fn verify_session(token: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret().as_ref()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("Invalid token: {}", e))
}

fn secure_cookies() -> bool {
    env::var("APP_ENV").map(|v| v == "production").unwrap_or(false)
}

/// Cookie de session : HttpOnly + SameSite=Strict, Secure en production.
pub fn session_cookie(signed_token: String) -> Cookie<'static> {
    Cookie::build("token", signed_token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure_cookies())
        .max_age(time::Duration::days(SESSION_TTL_DAYS))
        .finish()
}

/// Remplace le cookie par une valeur neutre qui expire presque tout de suite.
pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build("token", "none")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure_cookies())
        .max_age(time::Duration::seconds(10))
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify_session() {
        let token_id = "4a7f2c9e-0000-0000-0000-000000000000";

        let signed = sign_session(token_id).unwrap();
        let claims = verify_session(&signed).unwrap();

        assert_eq!(claims.id, token_id);
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn test_invalid_token() {
        assert!(verify_session("invalid.token.here").is_err());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let signed = sign_session("abc").unwrap();
        let mut tampered = signed.clone();
        tampered.push('x');
        assert!(verify_session(&tampered).is_err());
    }

    #[test]
    fn test_session_cookie_flags() {
        let cookie = session_cookie("tok".to_string());
        assert_eq!(cookie.name(), "token");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
    }
}
