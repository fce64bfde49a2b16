// src/db/element_repo.rs

use sqlx::{Executor, PgConnection, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::element::{CreateElementPayload, Element, ElementEvent, ElementStatus, StatusChange},
};

#[derive(Clone, Copy, Default)]
pub struct ElementRepository;

impl ElementRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn create_element<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        created_by: Uuid,
        payload: &CreateElementPayload,
    ) -> Result<Element, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        // Sempre nasce como 'planned' (default da coluna)
        let element = sqlx::query_as::<_, Element>(
            r#"
            INSERT INTO elements (
                company_id, project_id, name, element_type, priority, floor,
                length_mm, width_mm, height_mm, weight_kg, rebar_spec, notes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(payload.project_id)
        .bind(&payload.name)
        .bind(payload.element_type)
        .bind(payload.priority)
        .bind(payload.floor)
        .bind(payload.length_mm)
        .bind(payload.width_mm)
        .bind(payload.height_mm)
        .bind(payload.weight_kg)
        .bind(payload.rebar_spec.as_deref())
        .bind(payload.notes.as_deref())
        .bind(created_by)
        .fetch_one(executor)
        .await?;

        Ok(element)
    }

    pub async fn find_by_id<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Element>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let element = sqlx::query_as::<_, Element>(
            "SELECT * FROM elements WHERE id = $1 AND company_id = $2",
        )
        .bind(id)
        .bind(company_id)
        .fetch_optional(executor)
        .await?;

        Ok(element)
    }

    // Trava a linha até o fim da transação
    pub async fn find_for_update<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Element>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let element = sqlx::query_as::<_, Element>(
            "SELECT * FROM elements WHERE id = $1 AND company_id = $2 FOR UPDATE",
        )
        .bind(id)
        .bind(company_id)
        .fetch_optional(executor)
        .await?;

        Ok(element)
    }

    pub async fn find_many_for_update<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<Element>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        // ORDER BY id: ordem de travamento estável entre transações
        let elements = sqlx::query_as::<_, Element>(
            r#"
            SELECT * FROM elements
            WHERE company_id = $1 AND id = ANY($2)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(company_id)
        .bind(ids)
        .fetch_all(executor)
        .await?;

        Ok(elements)
    }

    pub async fn list_by_batch_for_update<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        batch_id: Uuid,
    ) -> Result<Vec<Element>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let elements = sqlx::query_as::<_, Element>(
            r#"
            SELECT * FROM elements
            WHERE company_id = $1 AND rebar_batch_id = $2
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(company_id)
        .bind(batch_id)
        .fetch_all(executor)
        .await?;

        Ok(elements)
    }

    pub async fn list_by_batch<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        batch_id: Uuid,
    ) -> Result<Vec<Element>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let elements = sqlx::query_as::<_, Element>(
            r#"
            SELECT * FROM elements
            WHERE company_id = $1 AND rebar_batch_id = $2
            ORDER BY priority DESC, name ASC
            "#,
        )
        .bind(company_id)
        .bind(batch_id)
        .fetch_all(executor)
        .await?;

        Ok(elements)
    }

    pub async fn list_by_project<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        project_id: Uuid,
        status: Option<ElementStatus>,
    ) -> Result<Vec<Element>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let elements = sqlx::query_as::<_, Element>(
            r#"
            SELECT * FROM elements
            WHERE company_id = $1
              AND project_id = $2
              AND ($3::element_status IS NULL OR status = $3)
            ORDER BY priority DESC, floor ASC NULLS LAST, name ASC
            "#,
        )
        .bind(company_id)
        .bind(project_id)
        .bind(status)
        .fetch_all(executor)
        .await?;

        Ok(elements)
    }

    pub async fn assign_batch<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        ids: &[Uuid],
        batch_id: Uuid,
        batch_number: &str,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE elements
            SET rebar_batch_id = $1, batch_number = $2, updated_at = NOW()
            WHERE company_id = $3 AND id = ANY($4)
            "#,
        )
        .bind(batch_id)
        .bind(batch_number)
        .bind(company_id)
        .bind(ids)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn clear_batch<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        ids: &[Uuid],
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE elements
            SET rebar_batch_id = NULL, batch_number = NULL, updated_at = NOW()
            WHERE company_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(company_id)
        .bind(ids)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// Grava uma mudança de status: atualiza o elemento (só se ele ainda
    /// estiver em `change.from`), carimba a data da etapa e anexa o evento.
    pub async fn apply_change(
        &self,
        conn: &mut PgConnection,
        company_id: Uuid,
        actor_id: Uuid,
        change: &StatusChange,
    ) -> Result<(), AppError> {
        let stamps: String = change
            .to
            .stamped_columns()
            .iter()
            .map(|column| format!(", {column} = NOW()"))
            .collect();

        let sql = format!(
            r#"
            UPDATE elements
            SET status = $1, updated_at = NOW(){stamps}
            WHERE id = $2 AND company_id = $3 AND status = $4
            "#
        );

        let updated = sqlx::query(&sql)
            .bind(change.to)
            .bind(change.element_id)
            .bind(company_id)
            .bind(change.from)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        // Alguém mudou o status no meio do caminho
        if updated != 1 {
            return Err(AppError::InvalidStatusTransition {
                from: change.from,
                to: change.to,
            });
        }

        self.insert_event(&mut *conn, company_id, actor_id, change).await?;
        Ok(())
    }

    pub async fn insert_event<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        actor_id: Uuid,
        change: &StatusChange,
    ) -> Result<ElementEvent, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let event = sqlx::query_as::<_, ElementEvent>(
            r#"
            INSERT INTO element_events (
                company_id, element_id, previous_status, new_status, notes, is_override, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(change.element_id)
        .bind(change.from)
        .bind(change.to)
        .bind(change.notes.as_deref())
        .bind(change.is_override)
        .bind(actor_id)
        .fetch_one(executor)
        .await?;

        Ok(event)
    }

    pub async fn list_events<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        element_id: Uuid,
    ) -> Result<Vec<ElementEvent>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let events = sqlx::query_as::<_, ElementEvent>(
            r#"
            SELECT * FROM element_events
            WHERE company_id = $1 AND element_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(company_id)
        .bind(element_id)
        .fetch_all(executor)
        .await?;

        Ok(events)
    }
}
