// src/handlers/projects.rs

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
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
    models::project::{CreateProjectPayload, Project},
};

// POST /api/projects
#[utoipa::path(
    post,
    path = "/api/projects",
    tag = "Projects",
    request_body = CreateProjectPayload,
    responses(
        (status = 201, description = "Projeto criado", body = Project),
        (status = 403, description = "Só produção")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_project(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    _staff: RequireRole<ProductionStaff>,
    Json(payload): Json<CreateProjectPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let project = app_state
        .project_service
        .create_project(&actor, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(created(project))
}

// GET /api/projects
#[utoipa::path(
    get,
    path = "/api/projects",
    tag = "Projects",
    responses(
        (status = 200, description = "Projetos visíveis ao usuário", body = Vec<Project>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_projects(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
) -> Result<impl IntoResponse, ApiError> {
    let projects = app_state
        .project_service
        .list_projects(&actor)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(projects))
}

// GET /api/projects/{id}
#[utoipa::path(
    get,
    path = "/api/projects/{id}",
    tag = "Projects",
    responses(
        (status = 200, description = "Projeto", body = Project),
        (status = 404, description = "Não encontrado")
    ),
    params(("id" = Uuid, Path, description = "ID do projeto")),
    security(("api_jwt" = []))
)]
pub async fn get_project(
    State(app_state): State<AppState>,
    locale: Locale,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let project = app_state
        .project_service
        .get_project(&actor, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(ok(project))
}
