// src/services/project_service.rs

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::{
        db_utils::begin_scoped,
        error::{AppError, Resource},
    },
    db::{ProjectRepository, UserRepository},
    models::{
        auth::{ActorContext, Role},
        project::{CreateProjectPayload, Project},
    },
};

/// Carrega o projeto e confere se o ator pode vê-lo. Compradores recebem
/// 404 para projetos de outros (não revelamos que existem).
pub(crate) async fn load_visible_project(
    conn: &mut PgConnection,
    repo: &ProjectRepository,
    actor: &ActorContext,
    project_id: Uuid,
) -> Result<Project, AppError> {
    repo.find_by_id(&mut *conn, actor.company_id, project_id)
        .await?
        .filter(|project| project.visible_to(actor))
        .ok_or(AppError::ResourceNotFound(Resource::Project))
}

#[derive(Clone)]
pub struct ProjectService {
    pool: PgPool,
    project_repo: ProjectRepository,
    user_repo: UserRepository,
}

impl ProjectService {
    pub fn new(pool: PgPool, project_repo: ProjectRepository, user_repo: UserRepository) -> Self {
        Self { pool, project_repo, user_repo }
    }

    pub async fn create_project(
        &self,
        actor: &ActorContext,
        payload: &CreateProjectPayload,
    ) -> Result<Project, AppError> {
        if !actor.role.manages_production() {
            return Err(AppError::Forbidden);
        }

        let mut tx = begin_scoped(&self.pool, actor).await?;

        // O comprador vinculado precisa ser um comprador da mesma empresa
        if let Some(buyer_id) = payload.buyer_user_id {
            let buyer = self
                .user_repo
                .find_in_company(&mut *tx, actor.company_id, buyer_id)
                .await?
                .filter(|user| user.role == Role::Buyer)
                .ok_or(AppError::ResourceNotFound(Resource::User))?;
            tracing::debug!(buyer_id = %buyer.id, "comprador vinculado ao projeto");
        }

        let project = self
            .project_repo
            .create_project(
                &mut *tx,
                actor.company_id,
                payload.name.trim(),
                payload.address.as_deref(),
                payload.buyer_user_id,
            )
            .await?;

        tx.commit().await?;
        tracing::info!(project_id = %project.id, "projeto criado");
        Ok(project)
    }

    pub async fn list_projects(&self, actor: &ActorContext) -> Result<Vec<Project>, AppError> {
        let buyer_filter = (actor.role == Role::Buyer).then_some(actor.user_id);

        let mut tx = begin_scoped(&self.pool, actor).await?;
        let projects = self
            .project_repo
            .list_projects(&mut *tx, actor.company_id, buyer_filter)
            .await?;
        tx.commit().await?;

        Ok(projects)
    }

    pub async fn get_project(&self, actor: &ActorContext, id: Uuid) -> Result<Project, AppError> {
        let mut tx = begin_scoped(&self.pool, actor).await?;
        let project = load_visible_project(&mut *tx, &self.project_repo, actor, id).await?;
        tx.commit().await?;

        Ok(project)
    }
}
