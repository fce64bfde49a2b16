// src/db/framvinda_repo.rs

use rust_decimal::Decimal;
use sqlx::{Executor, FromRow, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        element::Element,
        framvinda::{
            AddContractLinePayload, Contract, ContractLine, Period, PeriodLine, PeriodStatus,
        },
    },
    services::framvinda_calculator::BilledQuantity,
};

// Linha bruta do histórico faturado
#[derive(FromRow)]
struct BilledRow {
    period_number: i32,
    status: PeriodStatus,
    contract_line_id: Uuid,
    quantity_this_period: Decimal,
}

#[derive(Clone, Copy, Default)]
pub struct FramvindaRepository;

impl FramvindaRepository {
    pub fn new() -> Self {
        Self
    }

    // ---
    // Contratos
    // ---

    pub async fn create_contract<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        project_id: Uuid,
        name: &str,
        grunnvisitala: Decimal,
    ) -> Result<Contract, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let contract = sqlx::query_as::<_, Contract>(
            r#"
            INSERT INTO contracts (company_id, project_id, name, grunnvisitala)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(project_id)
        .bind(name)
        .bind(grunnvisitala)
        .fetch_one(executor)
        .await?;

        Ok(contract)
    }

    pub async fn find_contract<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Contract>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let contract = sqlx::query_as::<_, Contract>(
            "SELECT * FROM contracts WHERE id = $1 AND company_id = $2",
        )
        .bind(id)
        .bind(company_id)
        .fetch_optional(executor)
        .await?;

        Ok(contract)
    }

    pub async fn list_contracts<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        project_id: Uuid,
    ) -> Result<Vec<Contract>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let contracts = sqlx::query_as::<_, Contract>(
            r#"
            SELECT * FROM contracts
            WHERE company_id = $1 AND project_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(company_id)
        .bind(project_id)
        .fetch_all(executor)
        .await?;

        Ok(contracts)
    }

    pub async fn add_line<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        contract_id: Uuid,
        payload: &AddContractLinePayload,
    ) -> Result<ContractLine, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let line = sqlx::query_as::<_, ContractLine>(
            r#"
            INSERT INTO contract_lines (
                company_id, contract_id, label, category, pricing_unit, total_quantity,
                unit_price, sort_order, element_type, suggestion_basis
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(contract_id)
        .bind(&payload.label)
        .bind(payload.category.as_deref())
        .bind(payload.pricing_unit)
        .bind(payload.total_quantity)
        .bind(payload.unit_price)
        .bind(payload.sort_order)
        .bind(payload.element_type)
        .bind(payload.suggestion_basis)
        .fetch_one(executor)
        .await?;

        Ok(line)
    }

    pub async fn list_lines<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        contract_id: Uuid,
    ) -> Result<Vec<ContractLine>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let lines = sqlx::query_as::<_, ContractLine>(
            r#"
            SELECT * FROM contract_lines
            WHERE company_id = $1 AND contract_id = $2
            ORDER BY sort_order ASC, label ASC
            "#,
        )
        .bind(company_id)
        .bind(contract_id)
        .fetch_all(executor)
        .await?;

        Ok(lines)
    }

    // ---
    // Períodos
    // ---

    /// Trava o contrato para numerar o próximo período sem colisão.
    pub async fn lock_contract<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        contract_id: Uuid,
    ) -> Result<Option<Contract>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let contract = sqlx::query_as::<_, Contract>(
            "SELECT * FROM contracts WHERE id = $1 AND company_id = $2 FOR UPDATE",
        )
        .bind(contract_id)
        .bind(company_id)
        .fetch_optional(executor)
        .await?;

        Ok(contract)
    }

    pub async fn next_period_number<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        contract_id: Uuid,
    ) -> Result<i32, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let last: Option<i32> = sqlx::query_scalar(
            "SELECT MAX(period_number) FROM periods WHERE company_id = $1 AND contract_id = $2",
        )
        .bind(company_id)
        .bind(contract_id)
        .fetch_one(executor)
        .await?;

        Ok(last.unwrap_or(0) + 1)
    }

    pub async fn create_period<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        contract_id: Uuid,
        period_number: i32,
        period_start: chrono::NaiveDate,
        period_end: chrono::NaiveDate,
        visitala: Decimal,
    ) -> Result<Period, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let period = sqlx::query_as::<_, Period>(
            r#"
            INSERT INTO periods (company_id, contract_id, period_number, period_start, period_end, visitala)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(contract_id)
        .bind(period_number)
        .bind(period_start)
        .bind(period_end)
        .bind(visitala)
        .fetch_one(executor)
        .await?;

        Ok(period)
    }

    pub async fn find_period<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Period>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let period = sqlx::query_as::<_, Period>(
            "SELECT * FROM periods WHERE id = $1 AND company_id = $2",
        )
        .bind(id)
        .bind(company_id)
        .fetch_optional(executor)
        .await?;

        Ok(period)
    }

    pub async fn find_period_for_update<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Period>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let period = sqlx::query_as::<_, Period>(
            "SELECT * FROM periods WHERE id = $1 AND company_id = $2 FOR UPDATE",
        )
        .bind(id)
        .bind(company_id)
        .fetch_optional(executor)
        .await?;

        Ok(period)
    }

    pub async fn list_periods<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        contract_id: Uuid,
    ) -> Result<Vec<Period>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let periods = sqlx::query_as::<_, Period>(
            r#"
            SELECT * FROM periods
            WHERE company_id = $1 AND contract_id = $2
            ORDER BY period_number ASC
            "#,
        )
        .bind(company_id)
        .bind(contract_id)
        .fetch_all(executor)
        .await?;

        Ok(periods)
    }

    pub async fn list_draft_periods<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        contract_id: Uuid,
    ) -> Result<Vec<Period>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let periods = sqlx::query_as::<_, Period>(
            r#"
            SELECT * FROM periods
            WHERE company_id = $1 AND contract_id = $2 AND status = 'draft'
            ORDER BY period_number ASC
            "#,
        )
        .bind(company_id)
        .bind(contract_id)
        .fetch_all(executor)
        .await?;

        Ok(periods)
    }

    pub async fn has_later_finalized<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        contract_id: Uuid,
        period_number: i32,
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM periods
                WHERE company_id = $1 AND contract_id = $2
                  AND period_number > $3 AND status = 'finalized'
            )
            "#,
        )
        .bind(company_id)
        .bind(contract_id)
        .bind(period_number)
        .fetch_one(executor)
        .await?;

        Ok(exists)
    }

    pub async fn set_period_status<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        id: Uuid,
        status: PeriodStatus,
        actor_id: Uuid,
    ) -> Result<Period, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        // Reabrir limpa os carimbos da finalização
        let period = sqlx::query_as::<_, Period>(
            r#"
            UPDATE periods
            SET status = $1,
                finalized_at = CASE WHEN $1 = 'finalized'::period_status THEN NOW() ELSE NULL END,
                finalized_by = CASE WHEN $1 = 'finalized'::period_status THEN $2 ELSE NULL END
            WHERE id = $3 AND company_id = $4
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(actor_id)
        .bind(id)
        .bind(company_id)
        .fetch_one(executor)
        .await?;

        Ok(period)
    }

    pub async fn delete_period<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        id: Uuid,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        // period_lines saem via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM periods WHERE id = $1 AND company_id = $2 AND status = 'draft'")
            .bind(id)
            .bind(company_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    // ---
    // Linhas do período
    // ---

    pub async fn list_period_lines<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        period_id: Uuid,
    ) -> Result<Vec<PeriodLine>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let lines = sqlx::query_as::<_, PeriodLine>(
            "SELECT * FROM period_lines WHERE company_id = $1 AND period_id = $2",
        )
        .bind(company_id)
        .bind(period_id)
        .fetch_all(executor)
        .await?;

        Ok(lines)
    }

    /// Grava (ou substitui) a linha de um período.
    pub async fn upsert_period_line<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        period_id: Uuid,
        contract_line_id: Uuid,
        quantity: Decimal,
        amount: Decimal,
        is_manually_adjusted: bool,
        notes: Option<&str>,
    ) -> Result<PeriodLine, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let line = sqlx::query_as::<_, PeriodLine>(
            r#"
            INSERT INTO period_lines (
                company_id, period_id, contract_line_id, quantity_this_period,
                amount_this_period, is_manually_adjusted, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (period_id, contract_line_id) DO UPDATE
            SET quantity_this_period = EXCLUDED.quantity_this_period,
                amount_this_period = EXCLUDED.amount_this_period,
                is_manually_adjusted = EXCLUDED.is_manually_adjusted,
                notes = EXCLUDED.notes
            RETURNING *
            "#,
        )
        .bind(company_id)
        .bind(period_id)
        .bind(contract_line_id)
        .bind(quantity)
        .bind(amount)
        .bind(is_manually_adjusted)
        .bind(notes)
        .fetch_one(executor)
        .await?;

        Ok(line)
    }

    /// Grava a sugestão automática. Não toca em `notes` e nunca sobrescreve
    /// uma linha ajustada manualmente.
    pub async fn upsert_suggested_line<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        period_id: Uuid,
        contract_line_id: Uuid,
        quantity: Decimal,
        amount: Decimal,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO period_lines (
                company_id, period_id, contract_line_id, quantity_this_period,
                amount_this_period, is_manually_adjusted
            )
            VALUES ($1, $2, $3, $4, $5, false)
            ON CONFLICT (period_id, contract_line_id) DO UPDATE
            SET quantity_this_period = EXCLUDED.quantity_this_period,
                amount_this_period = EXCLUDED.amount_this_period
            WHERE period_lines.is_manually_adjusted = false
            "#,
        )
        .bind(company_id)
        .bind(period_id)
        .bind(contract_line_id)
        .bind(quantity)
        .bind(amount)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Histórico faturado do contrato: uma entrada por (período, linha).
    pub async fn billed_quantities<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        contract_id: Uuid,
    ) -> Result<Vec<BilledQuantity>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let rows = sqlx::query_as::<_, BilledRow>(
            r#"
            SELECT p.period_number, p.status, pl.contract_line_id, pl.quantity_this_period
            FROM period_lines pl
            JOIN periods p ON p.id = pl.period_id
            WHERE pl.company_id = $1 AND p.contract_id = $2
            "#,
        )
        .bind(company_id)
        .bind(contract_id)
        .fetch_all(executor)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| BilledQuantity {
                period_number: r.period_number,
                status: r.status,
                contract_line_id: r.contract_line_id,
                quantity: r.quantity_this_period,
            })
            .collect())
    }

    /// Elementos do projeto com etapa carimbada dentro do intervalo de datas
    /// (base das sugestões automáticas).
    pub async fn elements_for_suggestion<'e, E>(
        &self,
        executor: E,
        company_id: Uuid,
        project_id: Uuid,
        period: &Period,
    ) -> Result<Vec<Element>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let elements = sqlx::query_as::<_, Element>(
            r#"
            SELECT * FROM elements
            WHERE company_id = $1 AND project_id = $2
              AND (
                (cast_at IS NOT NULL AND (cast_at AT TIME ZONE 'UTC')::date BETWEEN $3 AND $4)
                OR (delivered_at IS NOT NULL AND (delivered_at AT TIME ZONE 'UTC')::date BETWEEN $3 AND $4)
              )
            "#,
        )
        .bind(company_id)
        .bind(project_id)
        .bind(period.period_start)
        .bind(period.period_end)
        .fetch_all(executor)
        .await?;

        Ok(elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::db_utils::begin_scoped;
    use crate::db::fixtures;
    use crate::models::framvinda::PricingUnit;
    use chrono::NaiveDate;
    use sqlx::PgPool;

    #[sqlx::test]
    #[ignore = "precisa de um Postgres em DATABASE_URL"]
    async fn refreshed_suggestion_keeps_notes_and_manual_lines(pool: PgPool) {
        let seed = fixtures::seed(&pool).await;
        let company = seed.actor.company_id;
        let repo = FramvindaRepository::new();

        let mut tx = begin_scoped(&pool, &seed.actor).await.unwrap();
        let contract = repo
            .create_contract(&mut *tx, company, seed.project_id, "Einingar", Decimal::from(100))
            .await
            .unwrap();
        let line_payload = |label: &str| AddContractLinePayload {
            label: label.into(),
            category: None,
            pricing_unit: PricingUnit::Piece,
            total_quantity: Decimal::from(100),
            unit_price: Decimal::from(1000),
            sort_order: 0,
            element_type: None,
            suggestion_basis: None,
        };
        let noted = repo.add_line(&mut *tx, company, contract.id, &line_payload("Veggir")).await.unwrap();
        let manual = repo.add_line(&mut *tx, company, contract.id, &line_payload("Stigar")).await.unwrap();
        let period = repo
            .create_period(
                &mut *tx,
                company,
                contract.id,
                1,
                NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
                Decimal::from(110),
            )
            .await
            .unwrap();

        // Quantidade igual à sugestão, só com observação: continua automática
        repo.upsert_period_line(
            &mut *tx, company, period.id, noted.id,
            Decimal::from(4), Decimal::from(4000), false, Some("Hluti afhentur"),
        )
        .await
        .unwrap();
        repo.upsert_period_line(
            &mut *tx, company, period.id, manual.id,
            Decimal::from(9), Decimal::from(9000), true, None,
        )
        .await
        .unwrap();

        for line_id in [noted.id, manual.id] {
            repo.upsert_suggested_line(&mut *tx, company, period.id, line_id, Decimal::from(6), Decimal::from(6000))
                .await
                .unwrap();
        }

        let lines = repo.list_period_lines(&mut *tx, company, period.id).await.unwrap();
        let find = |id: Uuid| lines.iter().find(|l| l.contract_line_id == id).unwrap();

        let refreshed = find(noted.id);
        assert_eq!(refreshed.quantity_this_period, Decimal::from(6));
        assert_eq!(refreshed.notes.as_deref(), Some("Hluti afhentur"));
        assert!(!refreshed.is_manually_adjusted);

        let kept = find(manual.id);
        assert_eq!(kept.quantity_this_period, Decimal::from(9));
        assert!(kept.is_manually_adjusted);
    }
}
