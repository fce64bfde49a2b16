// src/db/delivery_repo.rs

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::delivery::{CreateDeliveryPayload, Delivery, DeliveryItem, DeliveryStatus},
};

// Colunas do item + dados do elemento (JOIN)
const ITEM_SELECT: &str = r#"
    SELECT di.id, di.company_id, di.delivery_id, di.element_id, di.load_position,
           di.loaded_at, di.delivered_at,
           e.name AS element_name, e.status AS element_status
    FROM delivery_items di
    JOIN elements e ON e.id = di.element_id
"#;

#[derive(Clone, Copy, Default)]
pub struct DeliveryRepository;

impl DeliveryRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn create_delivery<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        created_by: Uuid,
        payload: &CreateDeliveryPayload,
    ) -> Result<Delivery, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let delivery = sqlx::query_as::<_, Delivery>(
            r#"
            INSERT INTO deliveries (
                company_id, project_id, truck_registration, truck_description,
                driver_id, planned_date, notes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(payload.project_id)
        .bind(payload.truck_registration.as_deref())
        .bind(payload.truck_description.as_deref())
        .bind(payload.driver_id)
        .bind(payload.planned_date)
        .bind(payload.notes.as_deref())
        .bind(created_by)
        .fetch_one(executor)
        .await?;

        Ok(delivery)
    }

    pub async fn find_by_id<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Delivery>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let delivery = sqlx::query_as::<_, Delivery>(
            "SELECT * FROM deliveries WHERE id = $1 AND company_id = $2",
        )
        .bind(id)
        .bind(company_id)
        .fetch_optional(executor)
        .await?;

        Ok(delivery)
    }

    pub async fn find_for_update<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Delivery>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let delivery = sqlx::query_as::<_, Delivery>(
            "SELECT * FROM deliveries WHERE id = $1 AND company_id = $2 FOR UPDATE",
        )
        .bind(id)
        .bind(company_id)
        .fetch_optional(executor)
        .await?;

        Ok(delivery)
    }

    // `driver_id` preenchido => só as entregas daquele motorista
    pub async fn list_deliveries<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        project_id: Option<Uuid>,
        driver_id: Option<Uuid>,
    ) -> Result<Vec<Delivery>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let deliveries = sqlx::query_as::<_, Delivery>(
            r#"
            SELECT * FROM deliveries
            WHERE company_id = $1
              AND ($2::uuid IS NULL OR project_id = $2)
              AND ($3::uuid IS NULL OR driver_id = $3)
            ORDER BY planned_date ASC NULLS LAST, created_at DESC
            "#,
        )
        .bind(company_id)
        .bind(project_id)
        .bind(driver_id)
        .fetch_all(executor)
        .await?;

        Ok(deliveries)
    }

    /// Avança o status e carimba a data correspondente.
    pub async fn set_status<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        id: Uuid,
        status: DeliveryStatus,
    ) -> Result<Delivery, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let stamp = match status {
            DeliveryStatus::Loading => ", loading_started_at = NOW()",
            DeliveryStatus::InTransit => ", departed_at = NOW()",
            DeliveryStatus::Arrived => ", arrived_at = NOW()",
            DeliveryStatus::Completed => ", completed_at = NOW()",
            DeliveryStatus::Planned | DeliveryStatus::Cancelled => "",
        };

        let sql = format!(
            r#"
            UPDATE deliveries
            SET status = $1, updated_at = NOW(){stamp}
            WHERE id = $2 AND company_id = $3
            RETURNING *
            "#
        );

        let delivery = sqlx::query_as::<_, Delivery>(&sql)
            .bind(status)
            .bind(id)
            .bind(company_id)
            .fetch_one(executor)
            .await?;

        Ok(delivery)
    }

    pub async fn record_receipt<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        id: Uuid,
        received_by_name: &str,
        signature_url: Option<&str>,
        photo_url: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Delivery, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let delivery = sqlx::query_as::<_, Delivery>(
            r#"
            UPDATE deliveries
            SET status = 'completed', completed_at = NOW(), updated_at = NOW(),
                received_by_name = $1, signature_url = $2, photo_url = $3,
                notes = COALESCE($4, notes)
            WHERE id = $5 AND company_id = $6
            RETURNING *
            "#,
        )
        .bind(received_by_name)
        .bind(signature_url)
        .bind(photo_url)
        .bind(notes)
        .bind(id)
        .bind(company_id)
        .fetch_one(executor)
        .await?;

        Ok(delivery)
    }

    // --- Itens ---

    pub async fn list_items<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        delivery_id: Uuid,
    ) -> Result<Vec<DeliveryItem>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "{ITEM_SELECT} WHERE di.company_id = $1 AND di.delivery_id = $2 \
             ORDER BY di.load_position ASC NULLS LAST, e.name ASC"
        );
        let items = sqlx::query_as::<_, DeliveryItem>(&sql)
            .bind(company_id)
            .bind(delivery_id)
            .fetch_all(executor)
            .await?;

        Ok(items)
    }

    pub async fn find_item<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        delivery_id: Uuid,
        element_id: Uuid,
    ) -> Result<Option<DeliveryItem>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "{ITEM_SELECT} WHERE di.company_id = $1 AND di.delivery_id = $2 AND di.element_id = $3"
        );
        let item = sqlx::query_as::<_, DeliveryItem>(&sql)
            .bind(company_id)
            .bind(delivery_id)
            .bind(element_id)
            .fetch_optional(executor)
            .await?;

        Ok(item)
    }

    /// Elementos (dentre `element_ids`) que já estão em outra entrega aberta.
    pub async fn elements_in_open_deliveries<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        element_ids: &[Uuid],
        excluding_delivery: Uuid,
    ) -> Result<Vec<Uuid>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT di.element_id
            FROM delivery_items di
            JOIN deliveries d ON d.id = di.delivery_id
            WHERE di.company_id = $1
              AND di.element_id = ANY($2)
              AND di.delivery_id <> $3
              AND d.status NOT IN ('completed', 'cancelled')
            "#,
        )
        .bind(company_id)
        .bind(element_ids)
        .bind(excluding_delivery)
        .fetch_all(executor)
        .await?;

        Ok(ids)
    }

    pub async fn insert_item<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        delivery_id: Uuid,
        element_id: Uuid,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO delivery_items (company_id, delivery_id, element_id)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(company_id)
        .bind(delivery_id)
        .bind(element_id)
        .execute(executor)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    return AppError::ElementAlreadyInDelivery(element_id);
                }
            }
            e.into()
        })?;

        Ok(())
    }

    pub async fn delete_item<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        delivery_id: Uuid,
        element_id: Uuid,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            "DELETE FROM delivery_items WHERE company_id = $1 AND delivery_id = $2 AND element_id = $3",
        )
        .bind(company_id)
        .bind(delivery_id)
        .bind(element_id)
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn mark_item_loaded<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        delivery_id: Uuid,
        element_id: Uuid,
        load_position: Option<i32>,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE delivery_items
            SET loaded_at = NOW(), load_position = COALESCE($1, load_position)
            WHERE company_id = $2 AND delivery_id = $3 AND element_id = $4
            "#,
        )
        .bind(load_position)
        .bind(company_id)
        .bind(delivery_id)
        .bind(element_id)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn mark_item_delivered<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        delivery_id: Uuid,
        element_id: Uuid,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE delivery_items
            SET delivered_at = NOW()
            WHERE company_id = $1 AND delivery_id = $2 AND element_id = $3
            "#,
        )
        .bind(company_id)
        .bind(delivery_id)
        .bind(element_id)
        .execute(executor)
        .await?;

        Ok(())
    }
}
