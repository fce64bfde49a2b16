// src/services/framvinda_service.rs

use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::{
        db_utils::begin_scoped,
        error::{AppError, Resource},
    },
    db::{FramvindaRepository, ProjectRepository},
    models::{
        auth::{ActorContext, Role},
        framvinda::{
            AddContractLinePayload, Contract, ContractDetail, ContractLine, CreateContractPayload,
            CreatePeriodPayload, CumulativeQuantity, Period, PeriodLine, PeriodStatus,
            PeriodSummary, SavePeriodLinesPayload,
        },
    },
    services::{
        framvinda_calculator::{
            cumulative_before, line_amount, period_totals, resolve_saved_line,
            suggested_quantity, summarize_line, BilledQuantity,
        },
        project_service::load_visible_project,
    },
};

// ---
// Regras puras
// ---

fn ensure_can_edit(actor: &ActorContext) -> Result<(), AppError> {
    if actor.role.manages_production() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

// Motoristas não veem faturamento; compradores só leem
fn ensure_can_view(actor: &ActorContext) -> Result<(), AppError> {
    if actor.role == Role::Driver {
        Err(AppError::Forbidden)
    } else {
        Ok(())
    }
}

/// Monta o resumo de um período a partir das linhas do contrato, das
/// linhas gravadas do período e do histórico faturado.
pub fn build_summary(
    contract: &Contract,
    period: Period,
    contract_lines: &[ContractLine],
    period_lines: &[PeriodLine],
    billed: &[BilledQuantity],
) -> Result<PeriodSummary, AppError> {
    let before = cumulative_before(billed, period.period_number);
    let saved: HashMap<Uuid, &PeriodLine> = period_lines
        .iter()
        .map(|line| (line.contract_line_id, line))
        .collect();

    let lines = contract_lines
        .iter()
        .map(|line| {
            let previous = before.get(&line.id).copied().unwrap_or(Decimal::ZERO);
            match saved.get(&line.id) {
                Some(pl) => summarize_line(
                    line,
                    previous,
                    pl.quantity_this_period,
                    pl.is_manually_adjusted,
                    pl.notes.clone(),
                ),
                None => summarize_line(line, previous, Decimal::ZERO, false, None),
            }
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let totals = period_totals(&lines, period.visitala, contract.grunnvisitala)?;

    Ok(PeriodSummary {
        period,
        grunnvisitala: contract.grunnvisitala,
        lines,
        totals,
    })
}

/// Reabrir: só admin, só finalizado, e nunca com um período posterior já
/// finalizado (o cumulativo dele dependeria deste).
pub fn ensure_reopenable(
    actor: &ActorContext,
    period: &Period,
    later_finalized: bool,
) -> Result<(), AppError> {
    if actor.role != Role::Admin {
        return Err(AppError::Forbidden);
    }
    period.ensure_finalized()?;
    if later_finalized {
        return Err(AppError::LaterPeriodFinalized);
    }
    Ok(())
}

// ---
// Serviço
// ---

#[derive(Clone)]
pub struct FramvindaService {
    pool: PgPool,
    framvinda_repo: FramvindaRepository,
    project_repo: ProjectRepository,
}

impl FramvindaService {
    pub fn new(pool: PgPool, framvinda_repo: FramvindaRepository, project_repo: ProjectRepository) -> Self {
        Self { pool, framvinda_repo, project_repo }
    }

    // --- Contratos ---

    pub async fn create_contract(
        &self,
        actor: &ActorContext,
        payload: &CreateContractPayload,
    ) -> Result<Contract, AppError> {
        ensure_can_edit(actor)?;

        let mut tx = begin_scoped(&self.pool, actor).await?;
        load_visible_project(&mut *tx, &self.project_repo, actor, payload.project_id).await?;

        let contract = self
            .framvinda_repo
            .create_contract(
                &mut *tx,
                actor.company_id,
                payload.project_id,
                payload.name.trim(),
                payload.grunnvisitala,
            )
            .await?;
        tx.commit().await?;

        tracing::info!(contract_id = %contract.id, grunnvisitala = %contract.grunnvisitala, "contrato criado");
        Ok(contract)
    }

    pub async fn list_contracts(
        &self,
        actor: &ActorContext,
        project_id: Uuid,
    ) -> Result<Vec<Contract>, AppError> {
        ensure_can_view(actor)?;

        let mut tx = begin_scoped(&self.pool, actor).await?;
        load_visible_project(&mut *tx, &self.project_repo, actor, project_id).await?;
        let contracts = self
            .framvinda_repo
            .list_contracts(&mut *tx, actor.company_id, project_id)
            .await?;
        tx.commit().await?;

        Ok(contracts)
    }

    pub async fn get_contract(&self, actor: &ActorContext, id: Uuid) -> Result<ContractDetail, AppError> {
        ensure_can_view(actor)?;

        let mut tx = begin_scoped(&self.pool, actor).await?;
        let contract = self.load_contract(&mut *tx, actor, id).await?;
        let lines = self
            .framvinda_repo
            .list_lines(&mut *tx, actor.company_id, id)
            .await?;
        let periods = self
            .framvinda_repo
            .list_periods(&mut *tx, actor.company_id, id)
            .await?;
        tx.commit().await?;

        Ok(ContractDetail { contract, lines, periods })
    }

    /// Nova linha também entra nos períodos em rascunho (com sugestão).
    pub async fn add_contract_line(
        &self,
        actor: &ActorContext,
        contract_id: Uuid,
        payload: &AddContractLinePayload,
    ) -> Result<ContractLine, AppError> {
        ensure_can_edit(actor)?;

        let mut tx = begin_scoped(&self.pool, actor).await?;
        let contract = self.load_contract(&mut *tx, actor, contract_id).await?;

        let line = self
            .framvinda_repo
            .add_line(&mut *tx, actor.company_id, contract_id, payload)
            .await?;

        let drafts = self
            .framvinda_repo
            .list_draft_periods(&mut *tx, actor.company_id, contract_id)
            .await?;
        for period in &drafts {
            self.insert_suggestions(&mut *tx, actor, &contract, period, std::slice::from_ref(&line))
                .await?;
        }
        tx.commit().await?;

        tracing::info!(contract_id = %contract_id, line_id = %line.id, drafts = drafts.len(), "linha de contrato adicionada");
        Ok(line)
    }

    // --- Períodos ---

    pub async fn create_period(
        &self,
        actor: &ActorContext,
        contract_id: Uuid,
        payload: &CreatePeriodPayload,
    ) -> Result<PeriodSummary, AppError> {
        ensure_can_edit(actor)?;
        payload.ensure_date_range()?;

        let mut tx = begin_scoped(&self.pool, actor).await?;
        let contract = self
            .framvinda_repo
            .lock_contract(&mut *tx, actor.company_id, contract_id)
            .await?
            .ok_or(AppError::ResourceNotFound(Resource::Contract))?;
        load_visible_project(&mut *tx, &self.project_repo, actor, contract.project_id).await?;

        let number = self
            .framvinda_repo
            .next_period_number(&mut *tx, actor.company_id, contract_id)
            .await?;
        let period = self
            .framvinda_repo
            .create_period(
                &mut *tx,
                actor.company_id,
                contract_id,
                number,
                payload.period_start,
                payload.period_end,
                payload.visitala,
            )
            .await?;

        let lines = self
            .framvinda_repo
            .list_lines(&mut *tx, actor.company_id, contract_id)
            .await?;
        self.insert_suggestions(&mut *tx, actor, &contract, &period, &lines)
            .await?;

        let summary = self.summary(&mut *tx, actor, &contract, period).await?;
        tx.commit().await?;

        tracing::info!(
            contract_id = %contract_id,
            period_number = number,
            subtotal = %summary.totals.period_subtotal,
            "período criado"
        );
        Ok(summary)
    }

    pub async fn get_period_summary(&self, actor: &ActorContext, id: Uuid) -> Result<PeriodSummary, AppError> {
        ensure_can_view(actor)?;

        let mut tx = begin_scoped(&self.pool, actor).await?;
        let period = self
            .framvinda_repo
            .find_period(&mut *tx, actor.company_id, id)
            .await?
            .ok_or(AppError::ResourceNotFound(Resource::Period))?;
        let contract = self.load_contract(&mut *tx, actor, period.contract_id).await?;

        let summary = self.summary(&mut *tx, actor, &contract, period).await?;
        tx.commit().await?;

        Ok(summary)
    }

    /// Recalcula as sugestões das linhas nunca ajustadas manualmente.
    pub async fn refresh_suggestions(&self, actor: &ActorContext, id: Uuid) -> Result<PeriodSummary, AppError> {
        ensure_can_edit(actor)?;

        let mut tx = begin_scoped(&self.pool, actor).await?;
        let (contract, period) = self.lock_period(&mut *tx, actor, id).await?;
        period.ensure_draft()?;

        let lines = self
            .framvinda_repo
            .list_lines(&mut *tx, actor.company_id, contract.id)
            .await?;
        let saved = self
            .framvinda_repo
            .list_period_lines(&mut *tx, actor.company_id, id)
            .await?;

        let untouched: Vec<ContractLine> = lines
            .into_iter()
            .filter(|line| {
                !saved
                    .iter()
                    .any(|pl| pl.contract_line_id == line.id && pl.is_manually_adjusted)
            })
            .collect();
        self.insert_suggestions(&mut *tx, actor, &contract, &period, &untouched)
            .await?;

        let summary = self.summary(&mut *tx, actor, &contract, period).await?;
        tx.commit().await?;

        tracing::info!(period_id = %id, refreshed = untouched.len(), "sugestões recalculadas");
        Ok(summary)
    }

    pub async fn save_period_lines(
        &self,
        actor: &ActorContext,
        id: Uuid,
        payload: &SavePeriodLinesPayload,
    ) -> Result<PeriodSummary, AppError> {
        ensure_can_edit(actor)?;

        let mut tx = begin_scoped(&self.pool, actor).await?;
        let (contract, period) = self.lock_period(&mut *tx, actor, id).await?;
        period.ensure_draft()?;

        let lines = self
            .framvinda_repo
            .list_lines(&mut *tx, actor.company_id, contract.id)
            .await?;
        let by_id: HashMap<Uuid, &ContractLine> = lines.iter().map(|l| (l.id, l)).collect();
        let saved = self
            .framvinda_repo
            .list_period_lines(&mut *tx, actor.company_id, id)
            .await?;
        let existing: HashMap<Uuid, (Decimal, bool)> = saved
            .iter()
            .map(|pl| (pl.contract_line_id, (pl.quantity_this_period, pl.is_manually_adjusted)))
            .collect();

        // Valida e calcula tudo antes da primeira escrita
        let mut resolved_lines = Vec::with_capacity(payload.lines.len());
        for input in &payload.lines {
            let line = by_id
                .get(&input.contract_line_id)
                .ok_or(AppError::UnknownContractLine(input.contract_line_id))?;
            let resolved = resolve_saved_line(
                existing.get(&line.id).copied(),
                input.quantity_this_period,
                line.unit_price,
            )?;
            resolved_lines.push((line.id, resolved, input.notes.as_deref()));
        }

        for (line_id, resolved, notes) in resolved_lines {
            self.framvinda_repo
                .upsert_period_line(
                    &mut *tx,
                    actor.company_id,
                    id,
                    line_id,
                    resolved.quantity,
                    resolved.amount,
                    resolved.is_manually_adjusted,
                    notes,
                )
                .await?;
        }

        let summary = self.summary(&mut *tx, actor, &contract, period).await?;
        tx.commit().await?;

        tracing::info!(period_id = %id, lines = payload.lines.len(), "linhas do período salvas");
        Ok(summary)
    }

    pub async fn finalize_period(&self, actor: &ActorContext, id: Uuid) -> Result<Period, AppError> {
        ensure_can_edit(actor)?;

        let mut tx = begin_scoped(&self.pool, actor).await?;
        let (_, period) = self.lock_period(&mut *tx, actor, id).await?;
        period.ensure_draft()?;

        let period = self
            .framvinda_repo
            .set_period_status(&mut *tx, actor.company_id, id, PeriodStatus::Finalized, actor.user_id)
            .await?;
        tx.commit().await?;

        tracing::info!(period_id = %id, period_number = period.period_number, "período finalizado");
        Ok(period)
    }

    pub async fn reopen_period(&self, actor: &ActorContext, id: Uuid) -> Result<Period, AppError> {
        let mut tx = begin_scoped(&self.pool, actor).await?;
        let (contract, period) = self.lock_period(&mut *tx, actor, id).await?;

        let later_finalized = self
            .framvinda_repo
            .has_later_finalized(&mut *tx, actor.company_id, contract.id, period.period_number)
            .await?;
        ensure_reopenable(actor, &period, later_finalized)?;

        let period = self
            .framvinda_repo
            .set_period_status(&mut *tx, actor.company_id, id, PeriodStatus::Draft, actor.user_id)
            .await?;
        tx.commit().await?;

        tracing::warn!(period_id = %id, period_number = period.period_number, actor = %actor.user_id, "período reaberto");
        Ok(period)
    }

    pub async fn delete_period(&self, actor: &ActorContext, id: Uuid) -> Result<(), AppError> {
        ensure_can_edit(actor)?;

        let mut tx = begin_scoped(&self.pool, actor).await?;
        let (_, period) = self.lock_period(&mut *tx, actor, id).await?;
        period.ensure_draft()?;

        self.framvinda_repo
            .delete_period(&mut *tx, actor.company_id, id)
            .await?;
        tx.commit().await?;

        tracing::info!(period_id = %id, period_number = period.period_number, "período excluído");
        Ok(())
    }

    /// Cumulativo por linha antes do período `period_number` (só finalizados).
    pub async fn get_cumulative_before(
        &self,
        actor: &ActorContext,
        contract_id: Uuid,
        period_number: i32,
    ) -> Result<Vec<CumulativeQuantity>, AppError> {
        ensure_can_view(actor)?;

        let mut tx = begin_scoped(&self.pool, actor).await?;
        self.load_contract(&mut *tx, actor, contract_id).await?;
        let lines = self
            .framvinda_repo
            .list_lines(&mut *tx, actor.company_id, contract_id)
            .await?;
        let billed = self
            .framvinda_repo
            .billed_quantities(&mut *tx, actor.company_id, contract_id)
            .await?;
        tx.commit().await?;

        let before = cumulative_before(&billed, period_number);
        Ok(lines
            .iter()
            .map(|line| CumulativeQuantity {
                contract_line_id: line.id,
                cumulative_before: before.get(&line.id).copied().unwrap_or(Decimal::ZERO),
            })
            .collect())
    }

    // --- Auxiliares ---

    async fn load_contract(
        &self,
        conn: &mut PgConnection,
        actor: &ActorContext,
        id: Uuid,
    ) -> Result<Contract, AppError> {
        let contract = self
            .framvinda_repo
            .find_contract(&mut *conn, actor.company_id, id)
            .await?
            .ok_or(AppError::ResourceNotFound(Resource::Contract))?;
        load_visible_project(&mut *conn, &self.project_repo, actor, contract.project_id).await?;
        Ok(contract)
    }

    async fn lock_period(
        &self,
        conn: &mut PgConnection,
        actor: &ActorContext,
        id: Uuid,
    ) -> Result<(Contract, Period), AppError> {
        let period = self
            .framvinda_repo
            .find_period_for_update(&mut *conn, actor.company_id, id)
            .await?
            .ok_or(AppError::ResourceNotFound(Resource::Period))?;
        let contract = self.load_contract(&mut *conn, actor, period.contract_id).await?;
        Ok((contract, period))
    }

    /// Grava a sugestão automática (`is_manually_adjusted = false`) de cada
    /// linha. Linhas sem base de sugestão ficam com quantidade 0.
    async fn insert_suggestions(
        &self,
        conn: &mut PgConnection,
        actor: &ActorContext,
        contract: &Contract,
        period: &Period,
        lines: &[ContractLine],
    ) -> Result<(), AppError> {
        if lines.is_empty() {
            return Ok(());
        }
        let elements = self
            .framvinda_repo
            .elements_for_suggestion(&mut *conn, actor.company_id, contract.project_id, period)
            .await?;

        for line in lines {
            let quantity = suggested_quantity(line, period, &elements).unwrap_or(Decimal::ZERO);
            let amount = line_amount(quantity, line.unit_price)?;
            self.framvinda_repo
                .upsert_suggested_line(&mut *conn, actor.company_id, period.id, line.id, quantity, amount)
                .await?;
        }
        Ok(())
    }

    async fn summary(
        &self,
        conn: &mut PgConnection,
        actor: &ActorContext,
        contract: &Contract,
        period: Period,
    ) -> Result<PeriodSummary, AppError> {
        let lines = self
            .framvinda_repo
            .list_lines(&mut *conn, actor.company_id, contract.id)
            .await?;
        let saved = self
            .framvinda_repo
            .list_period_lines(&mut *conn, actor.company_id, period.id)
            .await?;
        let billed = self
            .framvinda_repo
            .billed_quantities(&mut *conn, actor.company_id, contract.id)
            .await?;

        build_summary(contract, period, &lines, &saved, &billed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::framvinda::PricingUnit;
    use chrono::{NaiveDate, Utc};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn contract(grunnvisitala: &str) -> Contract {
        Contract {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            project_id: Uuid::new_v4(),
            name: "Einingar".into(),
            grunnvisitala: dec(grunnvisitala),
            created_at: Utc::now(),
        }
    }

    fn line(contract: &Contract, total: &str, price: &str) -> ContractLine {
        ContractLine {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            contract_id: contract.id,
            label: "Veggeiningar".into(),
            category: None,
            pricing_unit: PricingUnit::Piece,
            total_quantity: dec(total),
            unit_price: dec(price),
            sort_order: 0,
            element_type: None,
            suggestion_basis: None,
        }
    }

    fn period(contract: &Contract, number: i32, status: PeriodStatus, visitala: &str) -> Period {
        Period {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            contract_id: contract.id,
            period_number: number,
            period_start: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            visitala: dec(visitala),
            status,
            finalized_at: None,
            finalized_by: None,
            created_at: Utc::now(),
        }
    }

    fn period_line(period: &Period, line: &ContractLine, qty: &str, manual: bool) -> PeriodLine {
        PeriodLine {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            period_id: period.id,
            contract_line_id: line.id,
            quantity_this_period: dec(qty),
            amount_this_period: line_amount(dec(qty), line.unit_price).unwrap(),
            is_manually_adjusted: manual,
            notes: None,
        }
    }

    fn actor(role: Role) -> ActorContext {
        ActorContext {
            user_id: Uuid::new_v4(),
            role,
            company_id: Uuid::nil(),
        }
    }

    #[test]
    fn summary_counts_only_finalized_history() {
        let contract = contract("100");
        let line = line(&contract, "100", "1000");
        let p2 = period(&contract, 2, PeriodStatus::Draft, "100");
        let billed = [
            BilledQuantity {
                period_number: 1,
                status: PeriodStatus::Finalized,
                contract_line_id: line.id,
                quantity: dec("40"),
            },
            BilledQuantity {
                period_number: 2,
                status: PeriodStatus::Draft,
                contract_line_id: line.id,
                quantity: dec("30"),
            },
        ];
        let saved = [period_line(&p2, &line, "30", true)];

        let summary = build_summary(&contract, p2, std::slice::from_ref(&line), &saved, &billed).unwrap();

        let l = &summary.lines[0];
        assert_eq!(l.cumulative_before, dec("40"));
        assert_eq!(l.cumulative_total, dec("70"));
        assert_eq!(l.percent_complete, dec("0.70"));
        assert_eq!(l.amount_this_period, dec("30000"));
        assert_eq!(summary.totals.period_subtotal, dec("30000"));
        assert_eq!(summary.totals.visitala_amount, Decimal::ZERO);
    }

    #[test]
    fn summary_applies_index_adjustment() {
        let contract = contract("100");
        let line = line(&contract, "1000", "1000");
        let p1 = period(&contract, 1, PeriodStatus::Draft, "110");
        let saved = [period_line(&p1, &line, "500", false)];

        let summary = build_summary(&contract, p1, std::slice::from_ref(&line), &saved, &[]).unwrap();

        assert_eq!(summary.totals.period_subtotal, dec("500000"));
        assert_eq!(summary.totals.visitala_amount, dec("50000"));
        assert_eq!(summary.totals.total_with_visitala, dec("550000"));
        assert_eq!(summary.grunnvisitala, dec("100"));
    }

    #[test]
    fn lines_without_saved_rows_show_zero() {
        let contract = contract("0");
        let line = line(&contract, "0", "1000");
        let p1 = period(&contract, 1, PeriodStatus::Draft, "110");

        let summary = build_summary(&contract, p1, std::slice::from_ref(&line), &[], &[]).unwrap();

        let l = &summary.lines[0];
        assert_eq!(l.quantity_this_period, Decimal::ZERO);
        assert_eq!(l.percent_complete, Decimal::ZERO);
        assert!(!l.is_manually_adjusted);
        assert_eq!(summary.totals.visitala_amount, Decimal::ZERO);
    }

    #[test]
    fn reopen_is_admin_only() {
        let contract = contract("100");
        let finalized = period(&contract, 1, PeriodStatus::Finalized, "110");

        assert!(matches!(
            ensure_reopenable(&actor(Role::FactoryManager), &finalized, false),
            Err(AppError::Forbidden)
        ));
        assert!(ensure_reopenable(&actor(Role::Admin), &finalized, false).is_ok());
    }

    #[test]
    fn reopen_blocked_by_later_finalized_period() {
        let contract = contract("100");
        let finalized = period(&contract, 1, PeriodStatus::Finalized, "110");
        assert!(matches!(
            ensure_reopenable(&actor(Role::Admin), &finalized, true),
            Err(AppError::LaterPeriodFinalized)
        ));
    }

    #[test]
    fn reopen_requires_finalized_period() {
        let contract = contract("100");
        let draft = period(&contract, 1, PeriodStatus::Draft, "110");
        assert!(matches!(
            ensure_reopenable(&actor(Role::Admin), &draft, false),
            Err(AppError::PeriodNotFinalized)
        ));
    }

    #[test]
    fn billing_access_by_role() {
        assert!(ensure_can_edit(&actor(Role::FactoryManager)).is_ok());
        assert!(ensure_can_edit(&actor(Role::Buyer)).is_err());
        assert!(ensure_can_view(&actor(Role::Buyer)).is_ok());
        assert!(ensure_can_view(&actor(Role::Driver)).is_err());
    }
}
