// src/services/delivery_service.rs

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::{
        db_utils::begin_scoped,
        error::{AppError, Resource},
    },
    db::{DeliveryRepository, ElementRepository, ProjectRepository, UserRepository},
    models::{
        auth::{ActorContext, Role},
        delivery::{
            ensure_completable, ensure_departable, AddDeliveryElementsPayload,
            CompleteDeliveryPayload, CreateDeliveryPayload, Delivery, DeliveryDetail,
            DeliveryItem, DeliveryStatus, LoadElementPayload,
        },
        element::{Element, ElementStatus, StatusChange},
    },
    services::{project_service::load_visible_project, rebar_service::dedup_ids},
};

// ---
// Regras puras
// ---

/// Quem opera o caminhão: a produção, ou o motorista designado.
pub fn ensure_can_operate(delivery: &Delivery, actor: &ActorContext) -> Result<(), AppError> {
    let assigned_driver =
        actor.role == Role::Driver && delivery.driver_id == Some(actor.user_id);

    if actor.role.manages_production() || assigned_driver {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// Só elementos `ready` do mesmo projeto, fora de outra entrega aberta.
pub fn check_loadable(
    delivery: &Delivery,
    requested: &[Uuid],
    found: &[Element],
    in_other_deliveries: &[Uuid],
) -> Result<(), AppError> {
    if found.len() != requested.len() {
        return Err(AppError::ResourceNotFound(Resource::Element));
    }
    if let Some(taken) = in_other_deliveries.first() {
        return Err(AppError::ElementAlreadyInDelivery(*taken));
    }

    for element in found {
        if element.project_id != delivery.project_id {
            return Err(AppError::ElementProjectMismatch(element.id));
        }
        if element.status != ElementStatus::Ready {
            return Err(AppError::ElementNotReady {
                element_id: element.id,
                status: element.status,
            });
        }
    }
    Ok(())
}

/// Carregar um item: entrega em `loading`, elemento `ready -> loaded`.
pub fn plan_load(delivery: &Delivery, element: &Element) -> Result<StatusChange, AppError> {
    if delivery.status != DeliveryStatus::Loading {
        return Err(AppError::DeliveryNotLoading);
    }
    element.status.classify(ElementStatus::Loaded)?;
    Ok(StatusChange::new(element.id, element.status, ElementStatus::Loaded))
}

/// Confirmar um item: só depois da chegada, elemento `loaded -> delivered`.
pub fn plan_confirmation(delivery: &Delivery, element: &Element) -> Result<StatusChange, AppError> {
    if delivery.status != DeliveryStatus::Arrived {
        return Err(AppError::DeliveryNotArrived);
    }
    element.status.classify(ElementStatus::Delivered)?;
    Ok(StatusChange::new(element.id, element.status, ElementStatus::Delivered))
}

/// Descarregar (remoção do item ou cancelamento): um elemento já
/// carregado volta para `ready`, como override.
pub fn plan_unload(element: &Element, reason: &str) -> Option<StatusChange> {
    (element.status == ElementStatus::Loaded).then(|| {
        StatusChange::new(element.id, ElementStatus::Loaded, ElementStatus::Ready)
            .with_notes(reason)
            .overriding()
    })
}

// ---
// Serviço
// ---

#[derive(Clone)]
pub struct DeliveryService {
    pool: PgPool,
    delivery_repo: DeliveryRepository,
    element_repo: ElementRepository,
    project_repo: ProjectRepository,
    user_repo: UserRepository,
}

impl DeliveryService {
    pub fn new(
        pool: PgPool,
        delivery_repo: DeliveryRepository,
        element_repo: ElementRepository,
        project_repo: ProjectRepository,
        user_repo: UserRepository,
    ) -> Self {
        Self { pool, delivery_repo, element_repo, project_repo, user_repo }
    }

    pub async fn create_delivery(
        &self,
        actor: &ActorContext,
        payload: &CreateDeliveryPayload,
    ) -> Result<DeliveryDetail, AppError> {
        if !actor.role.manages_production() {
            return Err(AppError::Forbidden);
        }

        let mut tx = begin_scoped(&self.pool, actor).await?;
        load_visible_project(&mut *tx, &self.project_repo, actor, payload.project_id).await?;

        if let Some(driver_id) = payload.driver_id {
            self.user_repo
                .find_in_company(&mut *tx, actor.company_id, driver_id)
                .await?
                .filter(|user| user.role == Role::Driver)
                .ok_or(AppError::ResourceNotFound(Resource::User))?;
        }

        let delivery = self
            .delivery_repo
            .create_delivery(&mut *tx, actor.company_id, actor.user_id, payload)
            .await?;

        let ids = dedup_ids(&payload.element_ids);
        if !ids.is_empty() {
            self.attach_elements(&mut *tx, actor, &delivery, &ids).await?;
        }

        let items = self
            .delivery_repo
            .list_items(&mut *tx, actor.company_id, delivery.id)
            .await?;
        tx.commit().await?;

        tracing::info!(delivery_id = %delivery.id, elements = items.len(), "entrega criada");
        Ok(DeliveryDetail { delivery, items })
    }

    pub async fn list_deliveries(
        &self,
        actor: &ActorContext,
        project_id: Option<Uuid>,
    ) -> Result<Vec<Delivery>, AppError> {
        let mut tx = begin_scoped(&self.pool, actor).await?;

        let driver_filter = match actor.role {
            Role::Driver => Some(actor.user_id),
            // Comprador só lista dentro de um projeto que enxerga
            Role::Buyer => {
                let project_id = project_id.ok_or(AppError::Forbidden)?;
                load_visible_project(&mut *tx, &self.project_repo, actor, project_id).await?;
                None
            }
            Role::Admin | Role::FactoryManager => None,
        };

        let deliveries = self
            .delivery_repo
            .list_deliveries(&mut *tx, actor.company_id, project_id, driver_filter)
            .await?;
        tx.commit().await?;

        Ok(deliveries)
    }

    pub async fn get_delivery(&self, actor: &ActorContext, id: Uuid) -> Result<DeliveryDetail, AppError> {
        let mut tx = begin_scoped(&self.pool, actor).await?;

        let delivery = self
            .delivery_repo
            .find_by_id(&mut *tx, actor.company_id, id)
            .await?
            .ok_or(AppError::ResourceNotFound(Resource::Delivery))?;

        match actor.role {
            Role::Driver => ensure_can_operate(&delivery, actor)?,
            Role::Buyer => {
                load_visible_project(&mut *tx, &self.project_repo, actor, delivery.project_id)
                    .await?;
            }
            Role::Admin | Role::FactoryManager => {}
        }

        let items = self
            .delivery_repo
            .list_items(&mut *tx, actor.company_id, id)
            .await?;
        tx.commit().await?;

        Ok(DeliveryDetail { delivery, items })
    }

    pub async fn add_elements(
        &self,
        actor: &ActorContext,
        id: Uuid,
        payload: &AddDeliveryElementsPayload,
    ) -> Result<DeliveryDetail, AppError> {
        if !actor.role.manages_production() {
            return Err(AppError::Forbidden);
        }

        let mut tx = begin_scoped(&self.pool, actor).await?;
        let delivery = self.lock_delivery(&mut *tx, actor, id).await?;
        delivery.ensure_items_editable()?;

        let ids = dedup_ids(&payload.element_ids);
        self.attach_elements(&mut *tx, actor, &delivery, &ids).await?;

        let items = self
            .delivery_repo
            .list_items(&mut *tx, actor.company_id, id)
            .await?;
        tx.commit().await?;

        tracing::info!(delivery_id = %id, added = ids.len(), "elementos adicionados à entrega");
        Ok(DeliveryDetail { delivery, items })
    }

    pub async fn remove_element(
        &self,
        actor: &ActorContext,
        id: Uuid,
        element_id: Uuid,
    ) -> Result<DeliveryDetail, AppError> {
        if !actor.role.manages_production() {
            return Err(AppError::Forbidden);
        }

        let mut tx = begin_scoped(&self.pool, actor).await?;
        let delivery = self.lock_delivery(&mut *tx, actor, id).await?;
        delivery.ensure_items_editable()?;
        self.find_item(&mut *tx, actor, id, element_id).await?;

        let element = self.lock_element(&mut *tx, actor, element_id).await?;
        if let Some(change) = plan_unload(&element, "Tekið af bíl") {
            self.element_repo
                .apply_change(&mut *tx, actor.company_id, actor.user_id, &change)
                .await?;
        }
        self.delivery_repo
            .delete_item(&mut *tx, actor.company_id, id, element_id)
            .await?;

        let items = self
            .delivery_repo
            .list_items(&mut *tx, actor.company_id, id)
            .await?;
        tx.commit().await?;

        tracing::info!(delivery_id = %id, element_id = %element_id, "elemento removido da entrega");
        Ok(DeliveryDetail { delivery, items })
    }

    pub async fn start_loading(&self, actor: &ActorContext, id: Uuid) -> Result<Delivery, AppError> {
        let mut tx = begin_scoped(&self.pool, actor).await?;
        let delivery = self.lock_delivery(&mut *tx, actor, id).await?;
        ensure_can_operate(&delivery, actor)?;
        delivery.status.ensure_transition(DeliveryStatus::Loading)?;

        let items = self
            .delivery_repo
            .list_items(&mut *tx, actor.company_id, id)
            .await?;
        if items.is_empty() {
            return Err(AppError::EmptyDelivery);
        }

        let delivery = self
            .delivery_repo
            .set_status(&mut *tx, actor.company_id, id, DeliveryStatus::Loading)
            .await?;
        tx.commit().await?;

        tracing::info!(delivery_id = %id, "carregamento iniciado");
        Ok(delivery)
    }

    pub async fn load_element(
        &self,
        actor: &ActorContext,
        id: Uuid,
        element_id: Uuid,
        payload: &LoadElementPayload,
    ) -> Result<DeliveryDetail, AppError> {
        let mut tx = begin_scoped(&self.pool, actor).await?;
        let delivery = self.lock_delivery(&mut *tx, actor, id).await?;
        ensure_can_operate(&delivery, actor)?;
        self.find_item(&mut *tx, actor, id, element_id).await?;

        let element = self.lock_element(&mut *tx, actor, element_id).await?;
        let change = plan_load(&delivery, &element)?;

        self.element_repo
            .apply_change(&mut *tx, actor.company_id, actor.user_id, &change)
            .await?;
        self.delivery_repo
            .mark_item_loaded(&mut *tx, actor.company_id, id, element_id, payload.load_position)
            .await?;

        let items = self
            .delivery_repo
            .list_items(&mut *tx, actor.company_id, id)
            .await?;
        tx.commit().await?;

        tracing::info!(delivery_id = %id, element_id = %element_id, "elemento carregado");
        Ok(DeliveryDetail { delivery, items })
    }

    pub async fn depart(&self, actor: &ActorContext, id: Uuid) -> Result<Delivery, AppError> {
        let mut tx = begin_scoped(&self.pool, actor).await?;
        let delivery = self.lock_delivery(&mut *tx, actor, id).await?;
        ensure_can_operate(&delivery, actor)?;
        delivery.status.ensure_transition(DeliveryStatus::InTransit)?;

        let items = self
            .delivery_repo
            .list_items(&mut *tx, actor.company_id, id)
            .await?;
        ensure_departable(&items)?;

        let delivery = self
            .delivery_repo
            .set_status(&mut *tx, actor.company_id, id, DeliveryStatus::InTransit)
            .await?;
        tx.commit().await?;

        tracing::info!(delivery_id = %id, elements = items.len(), "entrega saiu da fábrica");
        Ok(delivery)
    }

    pub async fn arrive(&self, actor: &ActorContext, id: Uuid) -> Result<Delivery, AppError> {
        let mut tx = begin_scoped(&self.pool, actor).await?;
        let delivery = self.lock_delivery(&mut *tx, actor, id).await?;
        ensure_can_operate(&delivery, actor)?;
        delivery.status.ensure_transition(DeliveryStatus::Arrived)?;

        let delivery = self
            .delivery_repo
            .set_status(&mut *tx, actor.company_id, id, DeliveryStatus::Arrived)
            .await?;
        tx.commit().await?;

        tracing::info!(delivery_id = %id, "entrega chegou à obra");
        Ok(delivery)
    }

    pub async fn confirm_element(
        &self,
        actor: &ActorContext,
        id: Uuid,
        element_id: Uuid,
    ) -> Result<DeliveryDetail, AppError> {
        let mut tx = begin_scoped(&self.pool, actor).await?;
        let delivery = self.lock_delivery(&mut *tx, actor, id).await?;
        ensure_can_operate(&delivery, actor)?;
        self.find_item(&mut *tx, actor, id, element_id).await?;

        let element = self.lock_element(&mut *tx, actor, element_id).await?;
        let change = plan_confirmation(&delivery, &element)?;

        self.element_repo
            .apply_change(&mut *tx, actor.company_id, actor.user_id, &change)
            .await?;
        self.delivery_repo
            .mark_item_delivered(&mut *tx, actor.company_id, id, element_id)
            .await?;

        let items = self
            .delivery_repo
            .list_items(&mut *tx, actor.company_id, id)
            .await?;
        tx.commit().await?;

        tracing::info!(delivery_id = %id, element_id = %element_id, "elemento entregue");
        Ok(DeliveryDetail { delivery, items })
    }

    pub async fn complete(
        &self,
        actor: &ActorContext,
        id: Uuid,
        payload: &CompleteDeliveryPayload,
    ) -> Result<DeliveryDetail, AppError> {
        let mut tx = begin_scoped(&self.pool, actor).await?;
        let delivery = self.lock_delivery(&mut *tx, actor, id).await?;
        ensure_can_operate(&delivery, actor)?;

        let items = self
            .delivery_repo
            .list_items(&mut *tx, actor.company_id, id)
            .await?;
        ensure_completable(
            delivery.status,
            &items,
            &payload.received_by_name,
            payload.signature_url.as_deref(),
        )
        .inspect_err(|e| tracing::debug!(delivery_id = %id, error = %e, "conclusão recusada"))?;

        let delivery = self
            .delivery_repo
            .record_receipt(
                &mut *tx,
                actor.company_id,
                id,
                payload.received_by_name.trim(),
                payload.signature_url.as_deref().map(str::trim),
                payload.photo_url.as_deref(),
                payload.notes.as_deref(),
            )
            .await?;
        tx.commit().await?;

        tracing::info!(delivery_id = %id, "entrega concluída");
        Ok(DeliveryDetail { delivery, items })
    }

    pub async fn cancel(&self, actor: &ActorContext, id: Uuid) -> Result<Delivery, AppError> {
        if !actor.role.manages_production() {
            return Err(AppError::Forbidden);
        }

        let mut tx = begin_scoped(&self.pool, actor).await?;
        let delivery = self.lock_delivery(&mut *tx, actor, id).await?;
        delivery.status.ensure_transition(DeliveryStatus::Cancelled)?;

        let items = self
            .delivery_repo
            .list_items(&mut *tx, actor.company_id, id)
            .await?;
        let ids: Vec<Uuid> = items.iter().map(|i| i.element_id).collect();
        let elements = self
            .element_repo
            .find_many_for_update(&mut *tx, actor.company_id, &ids)
            .await?;

        let changes: Vec<StatusChange> = elements
            .iter()
            .filter_map(|e| plan_unload(e, "Hætt við afhendingu"))
            .collect();
        for change in &changes {
            self.element_repo
                .apply_change(&mut *tx, actor.company_id, actor.user_id, change)
                .await?;
        }

        let delivery = self
            .delivery_repo
            .set_status(&mut *tx, actor.company_id, id, DeliveryStatus::Cancelled)
            .await?;
        tx.commit().await?;

        tracing::info!(delivery_id = %id, unloaded = changes.len(), "entrega cancelada");
        Ok(delivery)
    }

    // --- Auxiliares ---

    async fn attach_elements(
        &self,
        conn: &mut PgConnection,
        actor: &ActorContext,
        delivery: &Delivery,
        ids: &[Uuid],
    ) -> Result<(), AppError> {
        let found = self
            .element_repo
            .find_many_for_update(&mut *conn, actor.company_id, ids)
            .await?;
        let taken = self
            .delivery_repo
            .elements_in_open_deliveries(&mut *conn, actor.company_id, ids, delivery.id)
            .await?;
        check_loadable(delivery, ids, &found, &taken)?;

        for element_id in ids {
            self.delivery_repo
                .insert_item(&mut *conn, actor.company_id, delivery.id, *element_id)
                .await?;
        }
        Ok(())
    }

    async fn lock_delivery(
        &self,
        conn: &mut PgConnection,
        actor: &ActorContext,
        id: Uuid,
    ) -> Result<Delivery, AppError> {
        self.delivery_repo
            .find_for_update(&mut *conn, actor.company_id, id)
            .await?
            .ok_or(AppError::ResourceNotFound(Resource::Delivery))
    }

    async fn lock_element(
        &self,
        conn: &mut PgConnection,
        actor: &ActorContext,
        element_id: Uuid,
    ) -> Result<Element, AppError> {
        self.element_repo
            .find_for_update(&mut *conn, actor.company_id, element_id)
            .await?
            .ok_or(AppError::ResourceNotFound(Resource::Element))
    }

    async fn find_item(
        &self,
        conn: &mut PgConnection,
        actor: &ActorContext,
        id: Uuid,
        element_id: Uuid,
    ) -> Result<DeliveryItem, AppError> {
        self.delivery_repo
            .find_item(&mut *conn, actor.company_id, id, element_id)
            .await?
            .ok_or(AppError::ElementNotInDelivery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn delivery(status: DeliveryStatus, driver_id: Option<Uuid>) -> Delivery {
        let now = Utc::now();
        Delivery {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            project_id: Uuid::new_v4(),
            status,
            truck_registration: Some("AB-123".into()),
            truck_description: None,
            driver_id,
            planned_date: None,
            loading_started_at: None,
            departed_at: None,
            arrived_at: None,
            completed_at: None,
            received_by_name: None,
            signature_url: None,
            photo_url: None,
            notes: None,
            created_by: Uuid::nil(),
            created_at: now,
            updated_at: now,
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
    fn only_the_assigned_driver_operates() {
        let driver = actor(Role::Driver);
        let mine = delivery(DeliveryStatus::Loading, Some(driver.user_id));
        let theirs = delivery(DeliveryStatus::Loading, Some(Uuid::new_v4()));

        assert!(ensure_can_operate(&mine, &driver).is_ok());
        assert!(matches!(ensure_can_operate(&theirs, &driver), Err(AppError::Forbidden)));
        assert!(ensure_can_operate(&theirs, &actor(Role::FactoryManager)).is_ok());
        assert!(ensure_can_operate(&mine, &actor(Role::Buyer)).is_err());
    }

    #[test]
    fn loading_requires_loading_status_and_ready_element() {
        let d = delivery(DeliveryStatus::Planned, None);
        let ready = Element::fixture(d.project_id, ElementStatus::Ready);
        assert!(matches!(plan_load(&d, &ready), Err(AppError::DeliveryNotLoading)));

        let d = delivery(DeliveryStatus::Loading, None);
        let change = plan_load(&d, &ready).unwrap();
        assert_eq!((change.from, change.to), (ElementStatus::Ready, ElementStatus::Loaded));

        let curing = Element::fixture(d.project_id, ElementStatus::Curing);
        assert!(matches!(
            plan_load(&d, &curing),
            Err(AppError::InvalidStatusTransition { .. })
        ));
    }

    #[test]
    fn confirmation_requires_arrival_first() {
        let loaded = Element::fixture(Uuid::new_v4(), ElementStatus::Loaded);
        for status in [DeliveryStatus::Loading, DeliveryStatus::InTransit] {
            assert!(matches!(
                plan_confirmation(&delivery(status, None), &loaded),
                Err(AppError::DeliveryNotArrived)
            ));
        }

        let change = plan_confirmation(&delivery(DeliveryStatus::Arrived, None), &loaded).unwrap();
        assert_eq!(change.to, ElementStatus::Delivered);
        assert!(!change.is_override);
    }

    #[test]
    fn unloading_returns_loaded_elements_to_ready() {
        let loaded = Element::fixture(Uuid::new_v4(), ElementStatus::Loaded);
        let change = plan_unload(&loaded, "Hætt við afhendingu").unwrap();
        assert_eq!(change.to, ElementStatus::Ready);
        assert!(change.is_override);

        let ready = Element::fixture(Uuid::new_v4(), ElementStatus::Ready);
        assert!(plan_unload(&ready, "x").is_none());
    }

    #[test]
    fn only_ready_elements_of_the_project_can_be_added() {
        let d = delivery(DeliveryStatus::Planned, None);
        let ready = Element::fixture(d.project_id, ElementStatus::Ready);
        assert!(check_loadable(&d, &[ready.id], &[ready.clone()], &[]).is_ok());

        assert!(matches!(
            check_loadable(&d, &[ready.id], &[ready.clone()], &[ready.id]),
            Err(AppError::ElementAlreadyInDelivery(_))
        ));

        let cast = Element::fixture(d.project_id, ElementStatus::Cast);
        assert!(matches!(
            check_loadable(&d, &[cast.id], &[cast.clone()], &[]),
            Err(AppError::ElementNotReady { status: ElementStatus::Cast, .. })
        ));

        let foreign = Element::fixture(Uuid::new_v4(), ElementStatus::Ready);
        assert!(matches!(
            check_loadable(&d, &[foreign.id], &[foreign.clone()], &[]),
            Err(AppError::ElementProjectMismatch(_))
        ));
    }
}
