// src/handlers/framvinda.rs

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
        rbac::{Admins, ProductionStaff, RequireRole},
    },
    models::framvinda::{
        AddContractLinePayload, Contract, ContractDetail, ContractLine, CreateContractPayload,
        CreatePeriodPayload, CumulativeQuantity, Period, PeriodSummary, SavePeriodLinesPayload,
    },
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractListQuery {
    pub project_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeQuery {
    pub period_number: i32,
}

// =============================================================================
//  1. CONTRATOS
// =============================================================================

// POST /api/framvinda/contracts
#[utoipa::path(
    post,
    path = "/api/framvinda/contracts",
    tag = "Framvinda",
    request_body = CreateContractPayload,
    responses(
        (status = 201, description = "Contrato criado", body = Contract)
    ),
    security(("api_jwt" = []))
)]
pub async fn create_contract(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _staff: RequireRole<ProductionStaff>,
    Json(payload): Json<CreateContractPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let contract = app_state
        .framvinda_service
        .create_contract(&actor, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(created(contract))
}

// GET /api/framvinda/contracts?projectId=..
#[utoipa::path(
    get,
    path = "/api/framvinda/contracts",
    tag = "Framvinda",
    responses(
        (status = 200, description = "Contratos do projeto", body = Vec<Contract>)
    ),
    params(("projectId" = Uuid, Query, description = "ID do projeto")),
    security(("api_jwt" = []))
)]
pub async fn list_contracts(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    Query(query): Query<ContractListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let contracts = app_state
        .framvinda_service
        .list_contracts(&actor, query.project_id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(contracts))
}

// GET /api/framvinda/contracts/{id}
#[utoipa::path(
    get,
    path = "/api/framvinda/contracts/{id}",
    tag = "Framvinda",
    responses(
        (status = 200, description = "Contrato, linhas e períodos", body = ContractDetail),
        (status = 404, description = "Não encontrado")
    ),
    params(("id" = Uuid, Path, description = "ID do contrato")),
    security(("api_jwt" = []))
)]
pub async fn get_contract(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = app_state
        .framvinda_service
        .get_contract(&actor, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(detail))
}

// POST /api/framvinda/contracts/{id}/lines
#[utoipa::path(
    post,
    path = "/api/framvinda/contracts/{id}/lines",
    tag = "Framvinda",
    request_body = AddContractLinePayload,
    responses(
        (status = 201, description = "Linha adicionada", body = ContractLine)
    ),
    params(("id" = Uuid, Path, description = "ID do contrato")),
    security(("api_jwt" = []))
)]
pub async fn add_contract_line(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _staff: RequireRole<ProductionStaff>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddContractLinePayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let line = app_state
        .framvinda_service
        .add_contract_line(&actor, id, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(created(line))
}

// GET /api/framvinda/contracts/{id}/cumulative?periodNumber=..
#[utoipa::path(
    get,
    path = "/api/framvinda/contracts/{id}/cumulative",
    tag = "Framvinda",
    responses(
        (status = 200, description = "Quantidade faturada por linha antes do período", body = Vec<CumulativeQuantity>)
    ),
    params(
        ("id" = Uuid, Path, description = "ID do contrato"),
        ("periodNumber" = i32, Query, description = "Número do período")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_cumulative_before(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<Uuid>,
    Query(query): Query<CumulativeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let cumulative = app_state
        .framvinda_service
        .get_cumulative_before(&actor, id, query.period_number)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(cumulative))
}

// =============================================================================
//  2. PERÍODOS
// =============================================================================

// POST /api/framvinda/contracts/{id}/periods
#[utoipa::path(
    post,
    path = "/api/framvinda/contracts/{id}/periods",
    tag = "Framvinda",
    request_body = CreatePeriodPayload,
    responses(
        (status = 201, description = "Período criado com sugestões", body = PeriodSummary),
        (status = 400, description = "Datas ou vísitala inválidas")
    ),
    params(("id" = Uuid, Path, description = "ID do contrato")),
    security(("api_jwt" = []))
)]
pub async fn create_period(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _staff: RequireRole<ProductionStaff>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreatePeriodPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let summary = app_state
        .framvinda_service
        .create_period(&actor, id, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(created(summary))
}

// GET /api/framvinda/periods/{id}
#[utoipa::path(
    get,
    path = "/api/framvinda/periods/{id}",
    tag = "Framvinda",
    responses(
        (status = 200, description = "Resumo do período com totais e vísitala", body = PeriodSummary),
        (status = 404, description = "Não encontrado")
    ),
    params(("id" = Uuid, Path, description = "ID do período")),
    security(("api_jwt" = []))
)]
pub async fn get_period_summary(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = app_state
        .framvinda_service
        .get_period_summary(&actor, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(summary))
}

// PUT /api/framvinda/periods/{id}/lines
#[utoipa::path(
    put,
    path = "/api/framvinda/periods/{id}/lines",
    tag = "Framvinda",
    request_body = SavePeriodLinesPayload,
    responses(
        (status = 200, description = "Linhas salvas", body = PeriodSummary),
        (status = 409, description = "Período não está em rascunho")
    ),
    params(("id" = Uuid, Path, description = "ID do período")),
    security(("api_jwt" = []))
)]
pub async fn save_period_lines(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _staff: RequireRole<ProductionStaff>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SavePeriodLinesPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let summary = app_state
        .framvinda_service
        .save_period_lines(&actor, id, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(summary))
}

// POST /api/framvinda/periods/{id}/refresh
#[utoipa::path(
    post,
    path = "/api/framvinda/periods/{id}/refresh",
    tag = "Framvinda",
    responses(
        (status = 200, description = "Sugestões recalculadas (linhas não manuais)", body = PeriodSummary)
    ),
    params(("id" = Uuid, Path, description = "ID do período")),
    security(("api_jwt" = []))
)]
pub async fn refresh_suggestions(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _staff: RequireRole<ProductionStaff>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = app_state
        .framvinda_service
        .refresh_suggestions(&actor, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(summary))
}

// POST /api/framvinda/periods/{id}/finalize
#[utoipa::path(
    post,
    path = "/api/framvinda/periods/{id}/finalize",
    tag = "Framvinda",
    responses(
        (status = 200, description = "Período finalizado", body = Period)
    ),
    params(("id" = Uuid, Path, description = "ID do período")),
    security(("api_jwt" = []))
)]
pub async fn finalize_period(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _staff: RequireRole<ProductionStaff>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let period = app_state
        .framvinda_service
        .finalize_period(&actor, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(period))
}

// POST /api/framvinda/periods/{id}/reopen
#[utoipa::path(
    post,
    path = "/api/framvinda/periods/{id}/reopen",
    tag = "Framvinda",
    responses(
        (status = 200, description = "Período de volta a rascunho", body = Period),
        (status = 409, description = "Existe período posterior finalizado")
    ),
    params(("id" = Uuid, Path, description = "ID do período")),
    security(("api_jwt" = []))
)]
pub async fn reopen_period(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _admin: RequireRole<Admins>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let period = app_state
        .framvinda_service
        .reopen_period(&actor, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(period))
}

// DELETE /api/framvinda/periods/{id}
#[utoipa::path(
    delete,
    path = "/api/framvinda/periods/{id}",
    tag = "Framvinda",
    responses(
        (status = 200, description = "Rascunho excluído")
    ),
    params(("id" = Uuid, Path, description = "ID do período")),
    security(("api_jwt" = []))
)]
pub async fn delete_period(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _staff: RequireRole<ProductionStaff>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    app_state
        .framvinda_service
        .delete_period(&actor, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(()))
}
