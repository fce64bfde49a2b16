// src/handlers/elements.rs

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{
        error::{ApiError, AppError},
        response::{created, ok},
    },
    config::AppState,
    middleware::{
        auth::AuthenticatedActor,
        i18n::Locale,
        rbac::{ProductionStaff, RequireRole},
    },
    models::element::{
        CreateElementPayload, Element, ElementDetail, ElementStatus, UpdateElementStatusPayload,
    },
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementListQuery {
    pub project_id: Uuid,
    pub status: Option<ElementStatus>,
}

// POST /api/elements
#[utoipa::path(
    post,
    path = "/api/elements",
    tag = "Elements",
    request_body = CreateElementPayload,
    responses(
        (status = 201, description = "Elemento criado em 'planned'", body = Element)
    ),
    security(("api_jwt" = []))
)]
pub async fn create_element(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _staff: RequireRole<ProductionStaff>,
    Json(payload): Json<CreateElementPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let element = app_state
        .element_service
        .create_element(&actor, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(created(element))
}

// GET /api/elements?projectId=..&status=..
#[utoipa::path(
    get,
    path = "/api/elements",
    tag = "Elements",
    responses(
        (status = 200, description = "Elementos do projeto", body = Vec<Element>)
    ),
    params(
        ("projectId" = Uuid, Query, description = "ID do projeto"),
        ("status" = Option<ElementStatus>, Query, description = "Filtra por status")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_elements(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    Query(query): Query<ElementListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let elements = app_state
        .element_service
        .list_elements(&actor, query.project_id, query.status)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(elements))
}

// GET /api/elements/{id}
#[utoipa::path(
    get,
    path = "/api/elements/{id}",
    tag = "Elements",
    responses(
        (status = 200, description = "Elemento, próximos status e histórico", body = ElementDetail),
        (status = 404, description = "Não encontrado")
    ),
    params(("id" = Uuid, Path, description = "ID do elemento")),
    security(("api_jwt" = []))
)]
pub async fn get_element(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = app_state
        .element_service
        .get_element(&actor, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(detail))
}

// PATCH /api/elements/{id}/status
#[utoipa::path(
    patch,
    path = "/api/elements/{id}/status",
    tag = "Elements",
    request_body = UpdateElementStatusPayload,
    responses(
        (status = 200, description = "Status alterado", body = Element),
        (status = 409, description = "Transição inválida, status só da entrega ou elemento numa entrega aberta")
    ),
    params(("id" = Uuid, Path, description = "ID do elemento")),
    security(("api_jwt" = []))
)]
pub async fn update_status(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateElementStatusPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let element = app_state
        .element_service
        .update_status(&actor, id, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(element))
}
