// src/handlers/rebar.rs

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
    models::rebar::{
        AddBatchElementsPayload, CreateRebarBatchPayload, RebarBatch, RebarBatchDetail,
        ToggleChecklistPayload,
    },
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchListQuery {
    pub project_id: Uuid,
}

// POST /api/rebar-batches
#[utoipa::path(
    post,
    path = "/api/rebar-batches",
    tag = "Rebar",
    request_body = CreateRebarBatchPayload,
    responses(
        (status = 201, description = "Lote criado com o checklist padrão", body = RebarBatchDetail),
        (status = 409, description = "Elemento fora de 'planned' ou já em outro lote")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_batch(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _staff: RequireRole<ProductionStaff>,
    Json(payload): Json<CreateRebarBatchPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let detail = app_state
        .rebar_service
        .create_batch(&actor, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(created(detail))
}

// GET /api/rebar-batches?projectId=..
#[utoipa::path(
    get,
    path = "/api/rebar-batches",
    tag = "Rebar",
    responses(
        (status = 200, description = "Lotes do projeto", body = Vec<RebarBatch>)
    ),
    params(("projectId" = Uuid, Query, description = "ID do projeto")),
    security(("api_jwt" = []))
)]
pub async fn list_batches(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    Query(query): Query<BatchListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let batches = app_state
        .rebar_service
        .list_batches(&actor, query.project_id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(batches))
}

// GET /api/rebar-batches/{id}
#[utoipa::path(
    get,
    path = "/api/rebar-batches/{id}",
    tag = "Rebar",
    responses(
        (status = 200, description = "Lote e seus elementos", body = RebarBatchDetail),
        (status = 404, description = "Não encontrado")
    ),
    params(("id" = Uuid, Path, description = "ID do lote")),
    security(("api_jwt" = []))
)]
pub async fn get_batch(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = app_state
        .rebar_service
        .get_batch(&actor, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(detail))
}

// POST /api/rebar-batches/{id}/elements
#[utoipa::path(
    post,
    path = "/api/rebar-batches/{id}/elements",
    tag = "Rebar",
    request_body = AddBatchElementsPayload,
    responses(
        (status = 200, description = "Elementos adicionados", body = RebarBatchDetail)
    ),
    params(("id" = Uuid, Path, description = "ID do lote")),
    security(("api_jwt" = []))
)]
pub async fn add_elements(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _staff: RequireRole<ProductionStaff>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddBatchElementsPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let detail = app_state
        .rebar_service
        .add_elements(&actor, id, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(detail))
}

// DELETE /api/rebar-batches/{id}/elements/{element_id}
#[utoipa::path(
    delete,
    path = "/api/rebar-batches/{id}/elements/{element_id}",
    tag = "Rebar",
    responses(
        (status = 200, description = "Elemento liberado e de volta a 'planned'", body = RebarBatchDetail)
    ),
    params(
        ("id" = Uuid, Path, description = "ID do lote"),
        ("element_id" = Uuid, Path, description = "ID do elemento")
    ),
    security(("api_jwt" = []))
)]
pub async fn remove_element(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _staff: RequireRole<ProductionStaff>,
    Path((id, element_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = app_state
        .rebar_service
        .remove_element(&actor, id, element_id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(detail))
}

// PUT /api/rebar-batches/{id}/checklist/{item_key}
#[utoipa::path(
    put,
    path = "/api/rebar-batches/{id}/checklist/{item_key}",
    tag = "Rebar",
    request_body = ToggleChecklistPayload,
    responses(
        (status = 200, description = "Item marcado/desmarcado", body = RebarBatch),
        (status = 400, description = "Item desconhecido")
    ),
    params(
        ("id" = Uuid, Path, description = "ID do lote"),
        ("item_key" = String, Path, description = "Chave do item do checklist")
    ),
    security(("api_jwt" = []))
)]
pub async fn toggle_checklist_item(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _staff: RequireRole<ProductionStaff>,
    Path((id, item_key)): Path<(Uuid, String)>,
    Json(payload): Json<ToggleChecklistPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let batch = app_state
        .rebar_service
        .toggle_checklist_item(&actor, id, &item_key, payload.checked)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(batch))
}

// POST /api/rebar-batches/{id}/approve
#[utoipa::path(
    post,
    path = "/api/rebar-batches/{id}/approve",
    tag = "Rebar",
    responses(
        (status = 200, description = "Lote aprovado; elementos em 'rebar'", body = RebarBatchDetail),
        (status = 409, description = "Checklist incompleto ou elemento inelegível")
    ),
    params(("id" = Uuid, Path, description = "ID do lote")),
    security(("api_jwt" = []))
)]
pub async fn approve_batch(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _staff: RequireRole<ProductionStaff>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = app_state
        .rebar_service
        .approve_batch(&actor, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(detail))
}

// POST /api/rebar-batches/{id}/cancel
#[utoipa::path(
    post,
    path = "/api/rebar-batches/{id}/cancel",
    tag = "Rebar",
    responses(
        (status = 200, description = "Lote cancelado; elementos liberados", body = RebarBatch)
    ),
    params(("id" = Uuid, Path, description = "ID do lote")),
    security(("api_jwt" = []))
)]
pub async fn cancel_batch(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _staff: RequireRole<ProductionStaff>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let batch = app_state
        .rebar_service
        .cancel_batch(&actor, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(batch))
}
