// src/db/rebar_repo.rs

use sqlx::{types::Json, Executor, PgConnection, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::rebar::{format_batch_number, ChecklistItem, RebarBatch, RebarBatchStatus},
};

#[derive(Clone, Copy, Default)]
pub struct RebarRepository;

impl RebarRepository {
    pub fn new() -> Self {
        Self
    }

    /// Próximo número "RB-<ano>-<seq>" da empresa. O advisory lock serializa
    /// a numeração até o fim da transação.
    pub async fn next_batch_number(
        &self,
        conn: &mut PgConnection,
        company_id: Uuid,
        year: i32,
    ) -> Result<String, AppError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("rebar_batch_number:{company_id}"))
            .execute(&mut *conn)
            .await?;

        let prefix = format!("RB-{year}-");
        let last: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(substring(batch_number FROM length($2) + 1)::bigint)
            FROM rebar_batches
            WHERE company_id = $1 AND batch_number LIKE $2 || '%'
            "#,
        )
        .bind(company_id)
        .bind(&prefix)
        .fetch_one(&mut *conn)
        .await?;

        Ok(format_batch_number(year, last.unwrap_or(0) + 1))
    }

    pub async fn create_batch<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        project_id: Uuid,
        batch_number: &str,
        checklist: &[ChecklistItem],
        notes: Option<&str>,
        created_by: Uuid,
    ) -> Result<RebarBatch, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let batch = sqlx::query_as::<_, RebarBatch>(
            r#"
            INSERT INTO rebar_batches (company_id, project_id, batch_number, checklist, notes, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(project_id)
        .bind(batch_number)
        .bind(Json(checklist))
        .bind(notes)
        .bind(created_by)
        .fetch_one(executor)
        .await?;

        Ok(batch)
    }

    pub async fn find_by_id<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<Option<RebarBatch>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let batch = sqlx::query_as::<_, RebarBatch>(
            "SELECT * FROM rebar_batches WHERE id = $1 AND company_id = $2",
        )
        .bind(id)
        .bind(company_id)
        .fetch_optional(executor)
        .await?;

        Ok(batch)
    }

    // Toggles do checklist concorrentes passam por aqui, um de cada vez
    pub async fn find_for_update<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<Option<RebarBatch>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let batch = sqlx::query_as::<_, RebarBatch>(
            "SELECT * FROM rebar_batches WHERE id = $1 AND company_id = $2 FOR UPDATE",
        )
        .bind(id)
        .bind(company_id)
        .fetch_optional(executor)
        .await?;

        Ok(batch)
    }

    pub async fn list_by_project<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        project_id: Uuid,
    ) -> Result<Vec<RebarBatch>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let batches = sqlx::query_as::<_, RebarBatch>(
            r#"
            SELECT * FROM rebar_batches
            WHERE company_id = $1 AND project_id = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(company_id)
        .bind(project_id)
        .fetch_all(executor)
        .await?;

        Ok(batches)
    }

    pub async fn save_checklist<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        id: Uuid,
        checklist: &[ChecklistItem],
        status: RebarBatchStatus,
    ) -> Result<RebarBatch, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let batch = sqlx::query_as::<_, RebarBatch>(
            r#"
            UPDATE rebar_batches
            SET checklist = $1, status = $2
            WHERE id = $3 AND company_id = $4
            RETURNING *
            "#,
        )
        .bind(Json(checklist))
        .bind(status)
        .bind(id)
        .bind(company_id)
        .fetch_one(executor)
        .await?;

        Ok(batch)
    }

    pub async fn mark_approved<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        id: Uuid,
        approved_by: Uuid,
    ) -> Result<RebarBatch, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let batch = sqlx::query_as::<_, RebarBatch>(
            r#"
            UPDATE rebar_batches
            SET status = 'approved', approved_by = $1, approved_at = NOW()
            WHERE id = $2 AND company_id = $3
            RETURNING *
            "#,
        )
        .bind(approved_by)
        .bind(id)
        .bind(company_id)
        .fetch_one(executor)
        .await?;

        Ok(batch)
    }

    pub async fn mark_cancelled<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<RebarBatch, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let batch = sqlx::query_as::<_, RebarBatch>(
            r#"
            UPDATE rebar_batches
            SET status = 'cancelled', cancelled_at = NOW()
            WHERE id = $1 AND company_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(company_id)
        .fetch_one(executor)
        .await?;

        Ok(batch)
    }
}
