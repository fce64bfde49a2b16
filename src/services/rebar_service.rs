// src/services/rebar_service.rs

use std::collections::HashSet;

use chrono::{Datelike, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{
        db_utils::begin_scoped,
        error::{AppError, Resource},
    },
    db::{ElementRepository, ProjectRepository, RebarRepository},
    models::{
        auth::ActorContext,
        element::{Element, ElementStatus, StatusChange},
        rebar::{
            default_checklist, ensure_checklist_complete, status_for_checklist, toggle_item,
            AddBatchElementsPayload, CreateRebarBatchPayload, RebarBatch, RebarBatchDetail,
        },
    },
    services::project_service::load_visible_project,
};

// ---
// Regras puras (sem banco)
// ---

/// Remove ids repetidos mantendo a ordem do pedido.
pub fn dedup_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Só elementos existentes, do mesmo projeto, sem lote e em `planned`
/// entram num lote.
pub fn check_attachable(
    project_id: Uuid,
    requested: &[Uuid],
    found: &[Element],
) -> Result<(), AppError> {
    if requested.is_empty() {
        return Err(AppError::EmptyBatch);
    }
    if found.len() != requested.len() {
        return Err(AppError::ResourceNotFound(Resource::Element));
    }

    for element in found {
        if element.project_id != project_id {
            return Err(AppError::ElementProjectMismatch(element.id));
        }
        if element.rebar_batch_id.is_some() {
            return Err(AppError::ElementAlreadyBatched(element.id));
        }
        if element.status != ElementStatus::Planned {
            return Err(AppError::ElementNotEligible {
                element_id: element.id,
                status: element.status,
            });
        }
    }
    Ok(())
}

/// Cascata da aprovação: `planned -> rebar`; quem já está em `rebar` fica.
/// Qualquer membro inelegível derruba a aprovação inteira antes de gravar.
pub fn plan_approval(
    batch: &RebarBatch,
    members: &[Element],
) -> Result<Vec<StatusChange>, AppError> {
    if members.is_empty() {
        return Err(AppError::EmptyBatch);
    }

    let mut changes = Vec::with_capacity(members.len());
    for element in members {
        if element.rebar_batch_id != Some(batch.id) {
            return Err(AppError::ElementNotInBatch);
        }
        match element.status {
            ElementStatus::Planned => changes.push(
                StatusChange::new(element.id, ElementStatus::Planned, ElementStatus::Rebar)
                    .with_notes(format!("Járnabunki {} samþykktur", batch.batch_number)),
            ),
            ElementStatus::Rebar => {}
            status => {
                return Err(AppError::ElementNotEligible {
                    element_id: element.id,
                    status,
                });
            }
        }
    }
    Ok(changes)
}

/// Devolve um membro para `planned`. Membros já em `planned` não geram
/// evento; `delivered` é terminal e bloqueia a liberação.
pub fn plan_release(batch: &RebarBatch, element: &Element) -> Result<Option<StatusChange>, AppError> {
    if element.rebar_batch_id != Some(batch.id) {
        return Err(AppError::ElementNotInBatch);
    }

    match element.status {
        ElementStatus::Planned => Ok(None),
        ElementStatus::Delivered => Err(AppError::InvalidStatusTransition {
            from: ElementStatus::Delivered,
            to: ElementStatus::Planned,
        }),
        from => Ok(Some(
            StatusChange::new(element.id, from, ElementStatus::Planned)
                .with_notes(format!("Losað úr járnabunka {}", batch.batch_number))
                .overriding(),
        )),
    }
}

/// Cancelamento: todos os membros voltam para `planned`, seja qual for o
/// status de cada um.
pub fn plan_cancellation(
    batch: &RebarBatch,
    members: &[Element],
) -> Result<Vec<StatusChange>, AppError> {
    let mut changes = Vec::new();
    for element in members {
        if let Some(change) = plan_release(batch, element)? {
            changes.push(change);
        }
    }
    Ok(changes)
}

// ---
// Serviço
// ---

#[derive(Clone)]
pub struct RebarService {
    pool: PgPool,
    rebar_repo: RebarRepository,
    element_repo: ElementRepository,
    project_repo: ProjectRepository,
}

impl RebarService {
    pub fn new(
        pool: PgPool,
        rebar_repo: RebarRepository,
        element_repo: ElementRepository,
        project_repo: ProjectRepository,
    ) -> Self {
        Self { pool, rebar_repo, element_repo, project_repo }
    }

    pub async fn create_batch(
        &self,
        actor: &ActorContext,
        payload: &CreateRebarBatchPayload,
    ) -> Result<RebarBatchDetail, AppError> {
        if !actor.role.manages_production() {
            return Err(AppError::Forbidden);
        }
        let ids = dedup_ids(&payload.element_ids);

        let mut tx = begin_scoped(&self.pool, actor).await?;
        load_visible_project(&mut *tx, &self.project_repo, actor, payload.project_id).await?;

        let found = self
            .element_repo
            .find_many_for_update(&mut *tx, actor.company_id, &ids)
            .await?;
        check_attachable(payload.project_id, &ids, &found)?;

        let batch_number = self
            .rebar_repo
            .next_batch_number(&mut *tx, actor.company_id, Utc::now().year())
            .await?;

        let batch = self
            .rebar_repo
            .create_batch(
                &mut *tx,
                actor.company_id,
                payload.project_id,
                &batch_number,
                &default_checklist(),
                payload.notes.as_deref(),
                actor.user_id,
            )
            .await?;

        self.element_repo
            .assign_batch(&mut *tx, actor.company_id, &ids, batch.id, &batch.batch_number)
            .await?;
        let elements = self
            .element_repo
            .list_by_batch(&mut *tx, actor.company_id, batch.id)
            .await?;
        tx.commit().await?;

        tracing::info!(batch_id = %batch.id, batch_number = %batch.batch_number, elements = ids.len(), "lote de armação criado");
        Ok(RebarBatchDetail { batch, elements })
    }

    pub async fn list_batches(
        &self,
        actor: &ActorContext,
        project_id: Uuid,
    ) -> Result<Vec<RebarBatch>, AppError> {
        let mut tx = begin_scoped(&self.pool, actor).await?;
        load_visible_project(&mut *tx, &self.project_repo, actor, project_id).await?;

        let batches = self
            .rebar_repo
            .list_by_project(&mut *tx, actor.company_id, project_id)
            .await?;
        tx.commit().await?;

        Ok(batches)
    }

    pub async fn get_batch(&self, actor: &ActorContext, id: Uuid) -> Result<RebarBatchDetail, AppError> {
        let mut tx = begin_scoped(&self.pool, actor).await?;

        let batch = self
            .rebar_repo
            .find_by_id(&mut *tx, actor.company_id, id)
            .await?
            .ok_or(AppError::ResourceNotFound(Resource::RebarBatch))?;
        load_visible_project(&mut *tx, &self.project_repo, actor, batch.project_id).await?;

        let elements = self
            .element_repo
            .list_by_batch(&mut *tx, actor.company_id, id)
            .await?;
        tx.commit().await?;

        Ok(RebarBatchDetail { batch, elements })
    }

    pub async fn add_elements(
        &self,
        actor: &ActorContext,
        id: Uuid,
        payload: &AddBatchElementsPayload,
    ) -> Result<RebarBatchDetail, AppError> {
        if !actor.role.manages_production() {
            return Err(AppError::Forbidden);
        }
        let ids = dedup_ids(&payload.element_ids);

        let mut tx = begin_scoped(&self.pool, actor).await?;
        let batch = self.lock_batch(&mut *tx, actor, id).await?;
        batch.ensure_editable()?;

        let found = self
            .element_repo
            .find_many_for_update(&mut *tx, actor.company_id, &ids)
            .await?;
        check_attachable(batch.project_id, &ids, &found)?;

        self.element_repo
            .assign_batch(&mut *tx, actor.company_id, &ids, batch.id, &batch.batch_number)
            .await?;
        let elements = self
            .element_repo
            .list_by_batch(&mut *tx, actor.company_id, batch.id)
            .await?;
        tx.commit().await?;

        tracing::info!(batch_id = %batch.id, added = ids.len(), "elementos adicionados ao lote");
        Ok(RebarBatchDetail { batch, elements })
    }

    pub async fn toggle_checklist_item(
        &self,
        actor: &ActorContext,
        id: Uuid,
        item_key: &str,
        checked: bool,
    ) -> Result<RebarBatch, AppError> {
        if !actor.role.manages_production() {
            return Err(AppError::Forbidden);
        }

        let mut tx = begin_scoped(&self.pool, actor).await?;
        let batch = self.lock_batch(&mut *tx, actor, id).await?;
        batch.ensure_editable()?;

        let mut checklist = batch.checklist.0;
        toggle_item(&mut checklist, item_key, checked, actor.user_id, Utc::now())?;
        let status = status_for_checklist(&checklist);

        let updated = self
            .rebar_repo
            .save_checklist(&mut *tx, actor.company_id, id, &checklist, status)
            .await?;
        tx.commit().await?;

        tracing::debug!(batch_id = %id, item = item_key, checked, status = %status, "checklist atualizado");
        Ok(updated)
    }

    pub async fn approve_batch(&self, actor: &ActorContext, id: Uuid) -> Result<RebarBatchDetail, AppError> {
        if !actor.role.manages_production() {
            return Err(AppError::Forbidden);
        }

        let mut tx = begin_scoped(&self.pool, actor).await?;
        let batch = self.lock_batch(&mut *tx, actor, id).await?;
        batch.ensure_editable()?;
        ensure_checklist_complete(&batch.checklist.0)?;

        let members = self
            .element_repo
            .list_by_batch_for_update(&mut *tx, actor.company_id, id)
            .await?;
        let changes = plan_approval(&batch, &members)?;

        // Tudo validado: a partir daqui só escritas
        for change in &changes {
            self.element_repo
                .apply_change(&mut *tx, actor.company_id, actor.user_id, change)
                .await?;
        }
        let batch = self
            .rebar_repo
            .mark_approved(&mut *tx, actor.company_id, id, actor.user_id)
            .await?;
        let elements = self
            .element_repo
            .list_by_batch(&mut *tx, actor.company_id, id)
            .await?;
        tx.commit().await?;

        tracing::info!(batch_id = %id, promoted = changes.len(), "lote de armação aprovado");
        Ok(RebarBatchDetail { batch, elements })
    }

    pub async fn cancel_batch(&self, actor: &ActorContext, id: Uuid) -> Result<RebarBatch, AppError> {
        if !actor.role.manages_production() {
            return Err(AppError::Forbidden);
        }

        let mut tx = begin_scoped(&self.pool, actor).await?;
        let batch = self.lock_batch(&mut *tx, actor, id).await?;
        batch.ensure_editable()?;

        let members = self
            .element_repo
            .list_by_batch_for_update(&mut *tx, actor.company_id, id)
            .await?;
        let changes = plan_cancellation(&batch, &members)?;

        for change in &changes {
            self.element_repo
                .apply_change(&mut *tx, actor.company_id, actor.user_id, change)
                .await?;
        }
        let member_ids: Vec<Uuid> = members.iter().map(|e| e.id).collect();
        self.element_repo
            .clear_batch(&mut *tx, actor.company_id, &member_ids)
            .await?;
        let batch = self
            .rebar_repo
            .mark_cancelled(&mut *tx, actor.company_id, id)
            .await?;
        tx.commit().await?;

        tracing::info!(batch_id = %id, released = member_ids.len(), reverted = changes.len(), "lote de armação cancelado");
        Ok(batch)
    }

    pub async fn remove_element(
        &self,
        actor: &ActorContext,
        id: Uuid,
        element_id: Uuid,
    ) -> Result<RebarBatchDetail, AppError> {
        if !actor.role.manages_production() {
            return Err(AppError::Forbidden);
        }

        let mut tx = begin_scoped(&self.pool, actor).await?;
        let batch = self.lock_batch(&mut *tx, actor, id).await?;
        batch.ensure_editable()?;

        let element = self
            .element_repo
            .find_for_update(&mut *tx, actor.company_id, element_id)
            .await?
            .ok_or(AppError::ResourceNotFound(Resource::Element))?;

        if let Some(change) = plan_release(&batch, &element)? {
            self.element_repo
                .apply_change(&mut *tx, actor.company_id, actor.user_id, &change)
                .await?;
        }
        self.element_repo
            .clear_batch(&mut *tx, actor.company_id, &[element_id])
            .await?;
        let elements = self
            .element_repo
            .list_by_batch(&mut *tx, actor.company_id, id)
            .await?;
        tx.commit().await?;

        tracing::info!(batch_id = %id, element_id = %element_id, "elemento removido do lote");
        Ok(RebarBatchDetail { batch, elements })
    }

    async fn lock_batch(
        &self,
        tx: &mut sqlx::PgConnection,
        actor: &ActorContext,
        id: Uuid,
    ) -> Result<RebarBatch, AppError> {
        self.rebar_repo
            .find_for_update(&mut *tx, actor.company_id, id)
            .await?
            .ok_or(AppError::ResourceNotFound(Resource::RebarBatch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rebar::RebarBatchStatus;
    use sqlx::types::Json;
    use ElementStatus::*;

    fn batch() -> RebarBatch {
        RebarBatch {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            project_id: Uuid::new_v4(),
            batch_number: "RB-2025-0001".into(),
            status: RebarBatchStatus::Preparing,
            checklist: Json(default_checklist()),
            notes: None,
            created_by: Uuid::nil(),
            created_at: Utc::now(),
            approved_by: None,
            approved_at: None,
            cancelled_at: None,
        }
    }

    fn member(batch: &RebarBatch, status: ElementStatus) -> Element {
        let mut element = Element::fixture(batch.project_id, status);
        element.rebar_batch_id = Some(batch.id);
        element.batch_number = Some(batch.batch_number.clone());
        element
    }

    #[test]
    fn approval_promotes_planned_and_keeps_rebar() {
        let batch = batch();
        let planned = member(&batch, Planned);
        let already = member(&batch, Rebar);

        let changes = plan_approval(&batch, &[planned.clone(), already]).unwrap();

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].element_id, planned.id);
        assert_eq!((changes[0].from, changes[0].to), (Planned, Rebar));
        assert!(!changes[0].is_override);
    }

    #[test]
    fn one_ineligible_member_rejects_the_whole_approval() {
        let batch = batch();
        let members = [member(&batch, Planned), member(&batch, Cast), member(&batch, Planned)];

        // Nenhuma mudança é devolvida: nada seria gravado
        assert!(matches!(
            plan_approval(&batch, &members),
            Err(AppError::ElementNotEligible { status: Cast, .. })
        ));
    }

    #[test]
    fn empty_batch_cannot_be_approved() {
        assert!(matches!(plan_approval(&batch(), &[]), Err(AppError::EmptyBatch)));
    }

    #[test]
    fn foreign_element_is_not_a_member() {
        let batch = batch();
        let stranger = Element::fixture(batch.project_id, Planned);
        assert!(matches!(
            plan_approval(&batch, &[stranger]),
            Err(AppError::ElementNotInBatch)
        ));
    }

    #[test]
    fn cancellation_returns_everyone_to_planned() {
        let batch = batch();
        let e1 = member(&batch, Planned);
        let e2 = member(&batch, Rebar);

        let changes = plan_cancellation(&batch, &[e1, e2.clone()]).unwrap();

        // e1 já está em planned: sem evento; e2 volta com override
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].element_id, e2.id);
        assert_eq!((changes[0].from, changes[0].to), (Rebar, Planned));
        assert!(changes[0].is_override);
    }

    #[test]
    fn release_refuses_delivered_elements() {
        let batch = batch();
        assert!(plan_release(&batch, &member(&batch, Delivered)).is_err());
    }

    #[test]
    fn attach_requires_unbatched_planned_same_project() {
        let project = Uuid::new_v4();
        let ok = Element::fixture(project, Planned);
        assert!(check_attachable(project, &[ok.id], &[ok.clone()]).is_ok());

        let other = Element::fixture(Uuid::new_v4(), Planned);
        assert!(matches!(
            check_attachable(project, &[other.id], &[other.clone()]),
            Err(AppError::ElementProjectMismatch(_))
        ));

        let mut batched = Element::fixture(project, Planned);
        batched.rebar_batch_id = Some(Uuid::new_v4());
        assert!(matches!(
            check_attachable(project, &[batched.id], &[batched.clone()]),
            Err(AppError::ElementAlreadyBatched(_))
        ));

        let cast = Element::fixture(project, Cast);
        assert!(matches!(
            check_attachable(project, &[cast.id], &[cast.clone()]),
            Err(AppError::ElementNotEligible { status: Cast, .. })
        ));
    }

    #[test]
    fn attach_detects_missing_elements() {
        let project = Uuid::new_v4();
        let ok = Element::fixture(project, Planned);
        assert!(matches!(
            check_attachable(project, &[ok.id, Uuid::new_v4()], &[ok]),
            Err(AppError::ResourceNotFound(Resource::Element))
        ));
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(dedup_ids(&[a, b, a]), vec![a, b]);
    }
}
