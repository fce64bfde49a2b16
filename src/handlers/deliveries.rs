// src/handlers/deliveries.rs

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
    models::delivery::{
        AddDeliveryElementsPayload, CompleteDeliveryPayload, CreateDeliveryPayload, Delivery,
        DeliveryDetail, LoadElementPayload,
    },
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryListQuery {
    pub project_id: Option<Uuid>,
}

// =============================================================================
//  1. PLANEJAMENTO (produção)
// =============================================================================

// POST /api/deliveries
#[utoipa::path(
    post,
    path = "/api/deliveries",
    tag = "Deliveries",
    request_body = CreateDeliveryPayload,
    responses(
        (status = 201, description = "Entrega planejada", body = DeliveryDetail),
        (status = 409, description = "Elemento não está 'ready' ou já em outra entrega")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_delivery(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _staff: RequireRole<ProductionStaff>,
    Json(payload): Json<CreateDeliveryPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let detail = app_state
        .delivery_service
        .create_delivery(&actor, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(created(detail))
}

// GET /api/deliveries?projectId=..
#[utoipa::path(
    get,
    path = "/api/deliveries",
    tag = "Deliveries",
    responses(
        (status = 200, description = "Entregas visíveis ao usuário", body = Vec<Delivery>)
    ),
    params(("projectId" = Option<Uuid>, Query, description = "Filtra por projeto (obrigatório para compradores)")),
    security(("api_jwt" = []))
)]
pub async fn list_deliveries(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    Query(query): Query<DeliveryListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let deliveries = app_state
        .delivery_service
        .list_deliveries(&actor, query.project_id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(deliveries))
}

// GET /api/deliveries/{id}
#[utoipa::path(
    get,
    path = "/api/deliveries/{id}",
    tag = "Deliveries",
    responses(
        (status = 200, description = "Entrega e itens", body = DeliveryDetail),
        (status = 404, description = "Não encontrada")
    ),
    params(("id" = Uuid, Path, description = "ID da entrega")),
    security(("api_jwt" = []))
)]
pub async fn get_delivery(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = app_state
        .delivery_service
        .get_delivery(&actor, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(detail))
}

// POST /api/deliveries/{id}/elements
#[utoipa::path(
    post,
    path = "/api/deliveries/{id}/elements",
    tag = "Deliveries",
    request_body = AddDeliveryElementsPayload,
    responses(
        (status = 200, description = "Elementos adicionados", body = DeliveryDetail)
    ),
    params(("id" = Uuid, Path, description = "ID da entrega")),
    security(("api_jwt" = []))
)]
pub async fn add_elements(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _staff: RequireRole<ProductionStaff>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddDeliveryElementsPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let detail = app_state
        .delivery_service
        .add_elements(&actor, id, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(detail))
}

// DELETE /api/deliveries/{id}/elements/{element_id}
#[utoipa::path(
    delete,
    path = "/api/deliveries/{id}/elements/{element_id}",
    tag = "Deliveries",
    responses(
        (status = 200, description = "Elemento removido (descarregado se preciso)", body = DeliveryDetail)
    ),
    params(
        ("id" = Uuid, Path, description = "ID da entrega"),
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
        .delivery_service
        .remove_element(&actor, id, element_id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(detail))
}

// POST /api/deliveries/{id}/cancel
#[utoipa::path(
    post,
    path = "/api/deliveries/{id}/cancel",
    tag = "Deliveries",
    responses(
        (status = 200, description = "Entrega cancelada", body = Delivery)
    ),
    params(("id" = Uuid, Path, description = "ID da entrega")),
    security(("api_jwt" = []))
)]
pub async fn cancel_delivery(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _staff: RequireRole<ProductionStaff>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let delivery = app_state
        .delivery_service
        .cancel(&actor, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(delivery))
}

// =============================================================================
//  2. EXECUÇÃO (motorista designado ou produção)
// =============================================================================

// POST /api/deliveries/{id}/start-loading
#[utoipa::path(
    post,
    path = "/api/deliveries/{id}/start-loading",
    tag = "Deliveries",
    responses(
        (status = 200, description = "Carregamento iniciado", body = Delivery)
    ),
    params(("id" = Uuid, Path, description = "ID da entrega")),
    security(("api_jwt" = []))
)]
pub async fn start_loading(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let delivery = app_state
        .delivery_service
        .start_loading(&actor, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(delivery))
}

// POST /api/deliveries/{id}/elements/{element_id}/load
#[utoipa::path(
    post,
    path = "/api/deliveries/{id}/elements/{element_id}/load",
    tag = "Deliveries",
    request_body = LoadElementPayload,
    responses(
        (status = 200, description = "Elemento carregado", body = DeliveryDetail),
        (status = 409, description = "Entrega não está em carregamento")
    ),
    params(
        ("id" = Uuid, Path, description = "ID da entrega"),
        ("element_id" = Uuid, Path, description = "ID do elemento")
    ),
    security(("api_jwt" = []))
)]
pub async fn load_element(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path((id, element_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<LoadElementPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = app_state
        .delivery_service
        .load_element(&actor, id, element_id, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(detail))
}

// POST /api/deliveries/{id}/depart
#[utoipa::path(
    post,
    path = "/api/deliveries/{id}/depart",
    tag = "Deliveries",
    responses(
        (status = 200, description = "Caminhão saiu", body = Delivery),
        (status = 409, description = "Há elementos não carregados")
    ),
    params(("id" = Uuid, Path, description = "ID da entrega")),
    security(("api_jwt" = []))
)]
pub async fn depart(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let delivery = app_state
        .delivery_service
        .depart(&actor, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(delivery))
}

// POST /api/deliveries/{id}/arrive
#[utoipa::path(
    post,
    path = "/api/deliveries/{id}/arrive",
    tag = "Deliveries",
    responses(
        (status = 200, description = "Chegada registrada", body = Delivery)
    ),
    params(("id" = Uuid, Path, description = "ID da entrega")),
    security(("api_jwt" = []))
)]
pub async fn arrive(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let delivery = app_state
        .delivery_service
        .arrive(&actor, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(delivery))
}

// POST /api/deliveries/{id}/elements/{element_id}/confirm
#[utoipa::path(
    post,
    path = "/api/deliveries/{id}/elements/{element_id}/confirm",
    tag = "Deliveries",
    responses(
        (status = 200, description = "Elemento confirmado no canteiro", body = DeliveryDetail),
        (status = 409, description = "Entrega ainda não chegou")
    ),
    params(
        ("id" = Uuid, Path, description = "ID da entrega"),
        ("element_id" = Uuid, Path, description = "ID do elemento")
    ),
    security(("api_jwt" = []))
)]
pub async fn confirm_element(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path((id, element_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = app_state
        .delivery_service
        .confirm_element(&actor, id, element_id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(detail))
}

// POST /api/deliveries/{id}/complete
#[utoipa::path(
    post,
    path = "/api/deliveries/{id}/complete",
    tag = "Deliveries",
    request_body = CompleteDeliveryPayload,
    responses(
        (status = 200, description = "Entrega concluída", body = DeliveryDetail),
        (status = 400, description = "Falta recebedor ou assinatura"),
        (status = 409, description = "Elementos não confirmados")
    ),
    params(("id" = Uuid, Path, description = "ID da entrega")),
    security(("api_jwt" = []))
)]
pub async fn complete(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteDeliveryPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = app_state
        .delivery_service
        .complete(&actor, id, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(detail))
}
