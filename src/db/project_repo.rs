// src/db/project_repo.rs

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{common::error::AppError, models::project::Project};

#[derive(Clone, Copy, Default)]
pub struct ProjectRepository;

impl ProjectRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn create_project<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        name: &str,
        address: Option<&str>,
        buyer_user_id: Option<Uuid>,
    ) -> Result<Project, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let project = sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects (company_id, name, address, buyer_user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(name)
        .bind(address)
        .bind(buyer_user_id)
        .fetch_one(executor)
        .await?;

        Ok(project)
    }

    pub async fn find_by_id<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Project>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let project = sqlx::query_as::<_, Project>(
            "SELECT * FROM projects WHERE id = $1 AND company_id = $2",
        )
        .bind(id)
        .bind(company_id)
        .fetch_optional(executor)
        .await?;

        Ok(project)
    }

    // `buyer_user_id` preenchido => só os projetos daquele comprador
    pub async fn list_projects<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        buyer_user_id: Option<Uuid>,
    ) -> Result<Vec<Project>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let projects = sqlx::query_as::<_, Project>(
            r#"
            SELECT * FROM projects
            WHERE company_id = $1
              AND ($2::uuid IS NULL OR buyer_user_id = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(company_id)
        .bind(buyer_user_id)
        .fetch_all(executor)
        .await?;

        Ok(projects)
    }
}
