use sea_orm::{DatabaseConnection, DbErr, EntityTrait, Set};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{user, user_token};
use crate::utils::jwt;

pub struct SessionService;

/// Session résolue : l'utilisateur courant ET l'id du token de CETTE session,
/// pour que le logout ne révoque que l'appareil qui le demande.
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub user: user::Model,
    pub token_id: String,
}

impl SessionService {
    /// Crée une session : insère une ligne `user_tokens` puis signe un JWT
    /// qui ne porte que ce token_id. Retourne la chaîne signée.
    pub async fn issue(db: &DatabaseConnection, user_id: i32) -> Result<String, ApiError> {
        let token_id = Uuid::new_v4().to_string();

        user_token::Entity::insert(user_token::ActiveModel {
            token_id: Set(token_id.clone()),
            user_id: Set(user_id),
        })
        .exec(db)
        .await?;

        jwt::sign_session(&token_id).map_err(ApiError::Internal)
    }

    /// Valide un token signé. Signature/expiration d'abord (aucun accès base
    /// si le JWT est invalide), puis la ligne de session : c'est ELLE qui
    /// fait autorité — absente, la session a été révoquée même si le JWT
    /// est encore cryptographiquement valide. L'utilisateur est rechargé à
    /// chaque requête pour que les modifications de profil prennent effet
    /// sans re-login.
    pub async fn resolve(
        db: &DatabaseConnection,
        signed_token: &str,
    ) -> Result<Option<ResolvedSession>, DbErr> {
        let Ok(claims) = jwt::verify_session(signed_token) else {
            return Ok(None);
        };

        let Some(token_row) = user_token::Entity::find_by_id(claims.id).one(db).await? else {
            return Ok(None);
        };

        let Some(user) = user::Entity::find_by_id(token_row.user_id).one(db).await? else {
            return Ok(None);
        };

        Ok(Some(ResolvedSession {
            user,
            token_id: token_row.token_id,
        }))
    }

    /// Supprime la ligne de session. Idempotent : révoquer une session déjà
    /// absente n'est pas une erreur.
    pub async fn revoke(db: &DatabaseConnection, token_id: &str) -> Result<(), DbErr> {
        user_token::Entity::delete_by_id(token_id.to_string())
            .exec(db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    use crate::models::user::Role;

    fn sample_user(user_id: i32) -> user::Model {
        user::Model {
            user_id,
            email: "prof@test.pl".to_string(),
            password_hash: "pbkdf2:sha256:600000$x$y".to_string(),
            first_name: "Anna".to_string(),
            last_name: "Nowak".to_string(),
            role: Role::Teacher,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[tokio::test]
    async fn test_resolve_valid_session() {
        let signed = jwt::sign_session("live-token").unwrap();

        let db = MockDatabase::new(DatabaseBackend::MySql)
            .append_query_results([vec![user_token::Model {
                token_id: "live-token".to_string(),
                user_id: 42,
            }]])
            .append_query_results([vec![sample_user(42)]])
            .into_connection();

        let session = SessionService::resolve(&db, &signed).await.unwrap().unwrap();
        assert_eq!(session.user.user_id, 42);
        assert_eq!(session.token_id, "live-token");
    }

    #[tokio::test]
    async fn test_resolve_revoked_session() {
        // JWT encore valide, mais la ligne user_tokens a été supprimée
        let signed = jwt::sign_session("dead-token").unwrap();

        let db = MockDatabase::new(DatabaseBackend::MySql)
            .append_query_results([Vec::<user_token::Model>::new()])
            .into_connection();

        let session = SessionService::resolve(&db, &signed).await.unwrap();
        assert!(session.is_none());
    }

    #[tokio::test]
    async fn test_resolve_malformed_token_skips_database() {
        // Aucun résultat préparé : toute requête ferait échouer le mock
        let db = MockDatabase::new(DatabaseBackend::MySql).into_connection();

        let session = SessionService::resolve(&db, "garbage.token.value")
            .await
            .unwrap();
        assert!(session.is_none());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let db = MockDatabase::new(DatabaseBackend::MySql)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .into_connection();

        SessionService::revoke(&db, "some-token").await.unwrap();
        // Deuxième révocation du même token : 0 ligne touchée, pas d'erreur
        SessionService::revoke(&db, "some-token").await.unwrap();
    }
}
