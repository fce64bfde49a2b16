// src/middleware/auth.rs

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    typed_header::TypedHeaderRejection,
    TypedHeader,
};

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
    models::auth::ActorContext,
};

// Quem fez a requisição, já validado pelo guard
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedActor(pub ActorContext);

// O middleware em si: Bearer obrigatório, token válido, usuário existente
pub async fn auth_guard(
    State(app_state): State<AppState>,
    locale: Locale,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|rejection| {
        tracing::debug!(reason = %rejection, "cabeçalho Authorization ausente ou inválido");
        AppError::InvalidToken.to_api_error(&locale)
    })?;

    let actor = app_state
        .auth_service
        .validate_token(bearer.token())
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    // Insere o ator nos "extensions" da requisição
    request.extensions_mut().insert(AuthenticatedActor(actor));
    Ok(next.run(request).await)
}

// Extrator para obter o ator autenticado diretamente nos handlers
impl<S> FromRequestParts<S> for AuthenticatedActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedActor>()
            .copied()
            .ok_or(AppError::InvalidToken)
    }
}
