// src/services/auth.rs

use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use sqlx::PgPool;

use crate::{
    common::{
        db_utils::begin_scoped,
        error::{AppError, Resource},
    },
    db::UserRepository,
    models::auth::{ActorContext, Claims, CreateUserPayload, Role, User},
};

// Chaves HS256 + validade. Separado do serviço para testar sem banco.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, AppError> {
        let now = Utc::now();
        let expires_at = now + self.ttl;

        let claims = Claims {
            sub: user.id,
            role: user.role,
            company_id: user.company_id,
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| AppError::InvalidToken)
    }
}

#[derive(Clone)]
pub struct AuthService {
    user_repo: UserRepository,
    keys: JwtKeys,
    pool: PgPool,
}

impl AuthService {
    pub fn new(user_repo: UserRepository, keys: JwtKeys, pool: PgPool) -> Self {
        Self { user_repo, keys, pool }
    }

    pub async fn login_user(&self, email: &str, password: &str) -> Result<String, AppError> {
        let user = self
            .user_repo
            .find_by_email(email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let password_clone = password.to_owned();
        let password_hash_clone = user.password_hash.clone();

        // Executa a verificação em um thread separado
        let is_password_valid = tokio::task::spawn_blocking(move || {
            verify(&password_clone, &password_hash_clone)
        })
        .await
        .map_err(|e| anyhow::anyhow!("Falha na task de verificação de senha: {}", e))??;

        if !is_password_valid {
            tracing::debug!(user_id = %user.id, "senha incorreta");
            return Err(AppError::InvalidCredentials);
        }

        tracing::info!(user_id = %user.id, role = %user.role, "login");
        self.keys.issue(&user)
    }

    /// Token -> contexto do ator. O usuário precisa ainda existir
    /// (um usuário removido perde o acesso mesmo com token válido).
    pub async fn validate_token(&self, token: &str) -> Result<ActorContext, AppError> {
        let claims = self.keys.verify(token)?;

        let user = self
            .user_repo
            .find_by_id(claims.sub)
            .await?
            .ok_or(AppError::InvalidToken)?;

        current_actor(&claims, &user)
    }

    pub async fn get_user(&self, actor: &ActorContext) -> Result<User, AppError> {
        self.user_repo
            .find_by_id(actor.user_id)
            .await?
            .ok_or(AppError::ResourceNotFound(Resource::User))
    }

    /// Cadastro de usuário feito por um admin, sempre na empresa do admin.
    pub async fn create_user(
        &self,
        actor: &ActorContext,
        payload: &CreateUserPayload,
    ) -> Result<User, AppError> {
        if actor.role != Role::Admin {
            return Err(AppError::Forbidden);
        }
        let role: Role = payload.role.parse()?;

        let password_clone = payload.password.clone();
        let hashed_password = tokio::task::spawn_blocking(move || {
            hash(&password_clone, bcrypt::DEFAULT_COST)
        })
        .await
        .map_err(|e| anyhow::anyhow!("Falha na task de hashing: {}", e))??;

        let mut tx = begin_scoped(&self.pool, actor).await?;
        let user = self
            .user_repo
            .create_user(
                &mut *tx,
                actor.company_id,
                payload.email.trim(),
                payload.full_name.trim(),
                &hashed_password,
                role,
            )
            .await?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, role = %role, created_by = %actor.user_id, "usuário criado");
        Ok(user)
    }
}

/// O token só vale enquanto cargo e empresa do usuário forem os mesmos
/// de quando foi emitido.
fn current_actor(claims: &Claims, user: &User) -> Result<ActorContext, AppError> {
    let actor = user.actor();
    if claims.actor() != actor {
        tracing::debug!(user_id = %user.id, "token emitido para outro cargo ou empresa");
        return Err(AppError::InvalidToken);
    }
    Ok(actor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user(role: Role) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            email: "gunnar@steypa.is".into(),
            full_name: "Gunnar Jónsson".into(),
            password_hash: String::new(),
            role,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn issued_token_carries_the_actor() {
        let keys = JwtKeys::new("leyndarmál", 1);
        let user = user(Role::FactoryManager);

        let token = keys.issue(&user).unwrap();
        let claims = keys.verify(&token).unwrap();

        assert_eq!(claims.actor(), user.actor());
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let token = JwtKeys::new("a", 1).issue(&user(Role::Admin)).unwrap();
        assert!(matches!(
            JwtKeys::new("b", 1).verify(&token),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        // Bem além da tolerância padrão de 60s
        let keys = JwtKeys::new("leyndarmál", -2);
        let token = keys.issue(&user(Role::Driver)).unwrap();
        assert!(matches!(keys.verify(&token), Err(AppError::InvalidToken)));
    }

    #[test]
    fn token_goes_stale_when_the_role_changes() {
        let keys = JwtKeys::new("leyndarmál", 1);
        let mut user = user(Role::FactoryManager);
        let claims = keys.verify(&keys.issue(&user).unwrap()).unwrap();

        assert_eq!(current_actor(&claims, &user).unwrap(), user.actor());

        user.role = Role::Driver;
        assert!(matches!(current_actor(&claims, &user), Err(AppError::InvalidToken)));
    }

    #[test]
    fn garbage_is_rejected() {
        let keys = JwtKeys::new("leyndarmál", 1);
        assert!(keys.verify("ekki.jwt.tákn").is_err());
    }
}
