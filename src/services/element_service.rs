// src/services/element_service.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{
        db_utils::begin_scoped,
        error::{AppError, Resource},
    },
    db::{DeliveryRepository, ElementRepository, ProjectRepository},
    models::{
        auth::{ActorContext, Role},
        element::{
            CreateElementPayload, Element, ElementDetail, ElementStatus, StatusChange,
            TransitionKind, UpdateElementStatusPayload,
        },
    },
    services::project_service::load_visible_project,
};

/// Valida uma mudança manual de status e monta o que será gravado.
/// Retrocessos ficam marcados como override, com a justificativa no evento.
pub fn plan_manual_change(
    element: &Element,
    role: Role,
    payload: &UpdateElementStatusPayload,
) -> Result<StatusChange, AppError> {
    if role == Role::Buyer {
        return Err(AppError::Forbidden);
    }
    if payload.status.is_delivery_managed() {
        return Err(AppError::StatusSetByDelivery(payload.status));
    }

    let kind = element
        .status
        .authorize(payload.status, role, payload.override_reason.as_deref())?;

    let mut change = StatusChange::new(element.id, element.status, payload.status);

    let notes = match (kind, payload.override_reason.as_deref(), payload.notes.as_deref()) {
        (TransitionKind::Reversal, Some(reason), Some(notes)) => {
            Some(format!("{} ({})", reason.trim(), notes.trim()))
        }
        (TransitionKind::Reversal, Some(reason), None) => Some(reason.trim().to_string()),
        (_, _, notes) => notes.map(str::trim).filter(|n| !n.is_empty()).map(String::from),
    };
    if let Some(notes) = notes {
        change = change.with_notes(notes);
    }
    if kind == TransitionKind::Reversal {
        change = change.overriding();
    }

    Ok(change)
}

/// Elemento numa entrega aberta só muda de status pela própria entrega.
pub fn ensure_off_open_delivery(element_id: Uuid, open_deliveries: &[Uuid]) -> Result<(), AppError> {
    if open_deliveries.contains(&element_id) {
        return Err(AppError::ElementOnOpenDelivery(element_id));
    }
    Ok(())
}

/// O que a tela pode oferecer como mudança manual.
pub fn manual_next(status: ElementStatus) -> Vec<ElementStatus> {
    status
        .allowed_next()
        .into_iter()
        .filter(|s| !s.is_delivery_managed())
        .collect()
}

#[derive(Clone)]
pub struct ElementService {
    pool: PgPool,
    element_repo: ElementRepository,
    delivery_repo: DeliveryRepository,
    project_repo: ProjectRepository,
}

impl ElementService {
    pub fn new(
        pool: PgPool,
        element_repo: ElementRepository,
        delivery_repo: DeliveryRepository,
        project_repo: ProjectRepository,
    ) -> Self {
        Self { pool, element_repo, delivery_repo, project_repo }
    }

    pub async fn create_element(
        &self,
        actor: &ActorContext,
        payload: &CreateElementPayload,
    ) -> Result<Element, AppError> {
        if !actor.role.manages_production() {
            return Err(AppError::Forbidden);
        }

        let mut tx = begin_scoped(&self.pool, actor).await?;
        load_visible_project(&mut *tx, &self.project_repo, actor, payload.project_id).await?;

        let element = self
            .element_repo
            .create_element(&mut *tx, actor.company_id, actor.user_id, payload)
            .await?;
        tx.commit().await?;

        tracing::info!(element_id = %element.id, project_id = %element.project_id, "elemento criado");
        Ok(element)
    }

    pub async fn list_elements(
        &self,
        actor: &ActorContext,
        project_id: Uuid,
        status: Option<ElementStatus>,
    ) -> Result<Vec<Element>, AppError> {
        let mut tx = begin_scoped(&self.pool, actor).await?;
        load_visible_project(&mut *tx, &self.project_repo, actor, project_id).await?;

        let elements = self
            .element_repo
            .list_by_project(&mut *tx, actor.company_id, project_id, status)
            .await?;
        tx.commit().await?;

        Ok(elements)
    }

    pub async fn get_element(&self, actor: &ActorContext, id: Uuid) -> Result<ElementDetail, AppError> {
        let mut tx = begin_scoped(&self.pool, actor).await?;

        let element = self
            .element_repo
            .find_by_id(&mut *tx, actor.company_id, id)
            .await?
            .ok_or(AppError::ResourceNotFound(Resource::Element))?;
        load_visible_project(&mut *tx, &self.project_repo, actor, element.project_id).await?;

        let events = self
            .element_repo
            .list_events(&mut *tx, actor.company_id, id)
            .await?;
        tx.commit().await?;

        Ok(ElementDetail {
            allowed_next: manual_next(element.status),
            element,
            events,
        })
    }

    pub async fn update_status(
        &self,
        actor: &ActorContext,
        id: Uuid,
        payload: &UpdateElementStatusPayload,
    ) -> Result<Element, AppError> {
        let mut tx = begin_scoped(&self.pool, actor).await?;

        let element = self
            .element_repo
            .find_for_update(&mut *tx, actor.company_id, id)
            .await?
            .ok_or(AppError::ResourceNotFound(Resource::Element))?;

        let open = self
            .delivery_repo
            .elements_in_open_deliveries(&mut *tx, actor.company_id, &[id], Uuid::nil())
            .await?;

        let change = plan_manual_change(&element, actor.role, payload)
            .and_then(|change| ensure_off_open_delivery(id, &open).map(|_| change))
            .inspect_err(|e| {
                tracing::debug!(element_id = %id, error = %e, "mudança de status recusada");
            })?;

        self.element_repo
            .apply_change(&mut *tx, actor.company_id, actor.user_id, &change)
            .await?;

        let updated = self
            .element_repo
            .find_by_id(&mut *tx, actor.company_id, id)
            .await?
            .ok_or(AppError::ResourceNotFound(Resource::Element))?;
        tx.commit().await?;

        if change.is_override {
            tracing::warn!(
                element_id = %id,
                from = %change.from,
                to = %change.to,
                actor = %actor.user_id,
                "retrocesso de status (override)"
            );
        } else {
            tracing::info!(element_id = %id, from = %change.from, to = %change.to, "status alterado");
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ElementStatus::*;

    fn payload(status: ElementStatus, reason: Option<&str>) -> UpdateElementStatusPayload {
        UpdateElementStatusPayload {
            status,
            notes: None,
            override_reason: reason.map(String::from),
        }
    }

    #[test]
    fn forward_change_is_not_an_override() {
        let element = Element::fixture(Uuid::new_v4(), Curing);
        let change = plan_manual_change(&element, Role::FactoryManager, &payload(Ready, None)).unwrap();

        assert_eq!(change.from, Curing);
        assert_eq!(change.to, Ready);
        assert!(!change.is_override);
        assert_eq!(change.notes, None);
    }

    #[test]
    fn reversal_records_reason_as_override() {
        let element = Element::fixture(Uuid::new_v4(), Cast);
        let change = plan_manual_change(
            &element,
            Role::Admin,
            &payload(Rebar, Some(" járn vantaði ")),
        )
        .unwrap();

        assert!(change.is_override);
        assert_eq!(change.notes.as_deref(), Some("járn vantaði"));
    }

    #[test]
    fn drivers_cannot_reverse() {
        let element = Element::fixture(Uuid::new_v4(), Loaded);
        assert!(matches!(
            plan_manual_change(&element, Role::Driver, &payload(Ready, Some("rangt"))),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn buyers_cannot_change_status() {
        let element = Element::fixture(Uuid::new_v4(), Planned);
        assert!(matches!(
            plan_manual_change(&element, Role::Buyer, &payload(Rebar, None)),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn skip_is_rejected_before_any_write() {
        let element = Element::fixture(Uuid::new_v4(), Planned);
        assert!(matches!(
            plan_manual_change(&element, Role::Admin, &payload(Ready, None)),
            Err(AppError::InvalidStatusTransition { from: Planned, to: Ready })
        ));
    }

    #[test]
    fn loading_and_delivery_are_left_to_the_delivery() {
        let ready = Element::fixture(Uuid::new_v4(), Ready);
        assert!(matches!(
            plan_manual_change(&ready, Role::Driver, &payload(Loaded, None)),
            Err(AppError::StatusSetByDelivery(Loaded))
        ));

        let loaded = Element::fixture(Uuid::new_v4(), Loaded);
        for role in [Role::Admin, Role::FactoryManager, Role::Driver] {
            assert!(matches!(
                plan_manual_change(&loaded, role, &payload(Delivered, None)),
                Err(AppError::StatusSetByDelivery(Delivered))
            ));
        }
    }

    #[test]
    fn elements_on_an_open_delivery_are_locked() {
        let element = Element::fixture(Uuid::new_v4(), Loaded);
        let other = Uuid::new_v4();

        assert!(ensure_off_open_delivery(element.id, &[other]).is_ok());
        assert!(matches!(
            ensure_off_open_delivery(element.id, &[element.id]),
            Err(AppError::ElementOnOpenDelivery(id)) if id == element.id
        ));
    }

    #[test]
    fn manual_options_hide_delivery_steps() {
        assert_eq!(manual_next(Curing), vec![Ready, Issue]);
        assert_eq!(manual_next(Ready), vec![Issue]);
        assert!(manual_next(Delivered).is_empty());
    }

    #[test]
    fn issue_keeps_the_notes() {
        let element = Element::fixture(Uuid::new_v4(), Cast);
        let mut p = payload(Issue, None);
        p.notes = Some("Sprunga í horni".into());

        let change = plan_manual_change(&element, Role::FactoryManager, &p).unwrap();
        assert!(!change.is_override);
        assert_eq!(change.notes.as_deref(), Some("Sprunga í horni"));
    }
}
