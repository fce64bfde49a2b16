// src/middleware/rbac.rs

use axum::{extract::FromRequestParts, http::request::Parts};
use std::marker::PhantomData;

use crate::{
    common::error::{ApiError, AppError},
    middleware::{auth::AuthenticatedActor, i18n::Locale},
    models::auth::Role,
};

/// 1. O Trait que define quais cargos passam
pub trait RoleRequirement: Send + Sync + 'static {
    fn allows(role: Role) -> bool;
}

/// 2. O Extractor (Guardião). Os serviços repetem a checagem; aqui a
/// requisição é barrada antes de abrir transação.
pub struct RequireRole<T>(pub PhantomData<T>);

impl<T, S> FromRequestParts<S> for RequireRole<T>
where
    T: RoleRequirement,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let locale = Locale::from_request_parts(parts, state)
            .await
            .unwrap_or_default();

        let AuthenticatedActor(actor) = parts
            .extensions
            .get::<AuthenticatedActor>()
            .copied()
            .ok_or_else(|| AppError::InvalidToken.to_api_error(&locale))?;

        if !T::allows(actor.role) {
            tracing::debug!(user_id = %actor.user_id, role = %actor.role, "cargo sem acesso à rota");
            return Err(AppError::Forbidden.to_api_error(&locale));
        }

        Ok(RequireRole(PhantomData))
    }
}

// ---
// DEFINIÇÃO DOS REQUISITOS (TIPOS)
// ---

/// Admin e gerente de fábrica
pub struct ProductionStaff;
impl RoleRequirement for ProductionStaff {
    fn allows(role: Role) -> bool {
        role.manages_production()
    }
}

pub struct Admins;
impl RoleRequirement for Admins {
    fn allows(role: Role) -> bool {
        role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::ActorContext;
    use axum::http::{Request, StatusCode};
    use uuid::Uuid;

    fn parts_for(role: Option<Role>) -> Parts {
        let (mut parts, _) = Request::builder()
            .uri("/api/projects")
            .header("accept-language", "en")
            .body(())
            .unwrap()
            .into_parts();
        if let Some(role) = role {
            parts.extensions.insert(AuthenticatedActor(ActorContext {
                user_id: Uuid::new_v4(),
                role,
                company_id: Uuid::new_v4(),
            }));
        }
        parts
    }

    #[tokio::test]
    async fn production_staff_passes() {
        let mut parts = parts_for(Some(Role::FactoryManager));
        assert!(RequireRole::<ProductionStaff>::from_request_parts(&mut parts, &())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn buyer_is_forbidden() {
        let mut parts = parts_for(Some(Role::Buyer));
        let err = RequireRole::<ProductionStaff>::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.error, AppError::Forbidden.user_message(true));
    }

    #[tokio::test]
    async fn missing_actor_is_unauthorized() {
        let mut parts = parts_for(None);
        let err = RequireRole::<Admins>::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn admins_only() {
        assert!(Admins::allows(Role::Admin));
        assert!(!Admins::allows(Role::FactoryManager));
        assert!(!ProductionStaff::allows(Role::Driver));
    }
}
