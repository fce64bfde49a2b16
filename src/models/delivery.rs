// src/models/delivery.rs

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::common::error::AppError;
use crate::models::element::ElementStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "delivery_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Planned,
    Loading,
    InTransit,
    Arrived,
    Completed,
    Cancelled,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Planned => "planned",
            DeliveryStatus::Loading => "loading",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Arrived => "arrived",
            DeliveryStatus::Completed => "completed",
            DeliveryStatus::Cancelled => "cancelled",
        }
    }

    pub fn label_is(self) -> &'static str {
        match self {
            DeliveryStatus::Planned => "skipulögð",
            DeliveryStatus::Loading => "í hleðslu",
            DeliveryStatus::InTransit => "á leiðinni",
            DeliveryStatus::Arrived => "komin",
            DeliveryStatus::Completed => "lokið",
            DeliveryStatus::Cancelled => "hætt við",
        }
    }

    pub fn next(self) -> Option<DeliveryStatus> {
        match self {
            DeliveryStatus::Planned => Some(DeliveryStatus::Loading),
            DeliveryStatus::Loading => Some(DeliveryStatus::InTransit),
            DeliveryStatus::InTransit => Some(DeliveryStatus::Arrived),
            DeliveryStatus::Arrived => Some(DeliveryStatus::Completed),
            DeliveryStatus::Completed | DeliveryStatus::Cancelled => None,
        }
    }

    /// Estritamente para frente, uma etapa por vez. Cancelar só antes de sair.
    pub fn ensure_transition(self, to: DeliveryStatus) -> Result<(), AppError> {
        let allowed = match to {
            DeliveryStatus::Cancelled => {
                matches!(self, DeliveryStatus::Planned | DeliveryStatus::Loading)
            }
            _ => self.next() == Some(to),
        };

        if allowed {
            Ok(())
        } else {
            Err(AppError::InvalidDeliveryTransition { from: self, to })
        }
    }

    /// Itens podem entrar/sair enquanto o caminhão não partiu.
    pub fn items_editable(self) -> bool {
        matches!(self, DeliveryStatus::Planned | DeliveryStatus::Loading)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: Uuid,
    #[schema(ignore)]
    pub company_id: Uuid,
    pub project_id: Uuid,
    pub status: DeliveryStatus,
    #[schema(example = "AB-123")]
    pub truck_registration: Option<String>,
    #[schema(example = "Scania með krana")]
    pub truck_description: Option<String>,
    pub driver_id: Option<Uuid>,
    #[schema(value_type = Option<String>, format = Date, example = "2025-03-14")]
    pub planned_date: Option<NaiveDate>,
    pub loading_started_at: Option<DateTime<Utc>>,
    pub departed_at: Option<DateTime<Utc>>,
    pub arrived_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub received_by_name: Option<String>,
    pub signature_url: Option<String>,
    pub photo_url: Option<String>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    pub fn ensure_items_editable(&self) -> Result<(), AppError> {
        if self.status.items_editable() {
            Ok(())
        } else {
            Err(AppError::DeliveryNotEditable(self.status))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryItem {
    pub id: Uuid,
    #[schema(ignore)]
    pub company_id: Uuid,
    pub delivery_id: Uuid,
    pub element_id: Uuid,
    pub load_position: Option<i32>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    // Vem do JOIN com elements
    pub element_name: String,
    pub element_status: ElementStatus,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDetail {
    #[serde(flatten)]
    pub delivery: Delivery,
    pub items: Vec<DeliveryItem>,
}

// ---
// Regras puras
// ---

/// Partida: pelo menos um elemento e todos já carregados.
pub fn ensure_departable(items: &[DeliveryItem]) -> Result<(), AppError> {
    if items.is_empty() {
        return Err(AppError::EmptyDelivery);
    }
    let pending = items.iter().filter(|i| i.loaded_at.is_none()).count();
    if pending > 0 {
        return Err(AppError::ItemsNotLoaded { pending });
    }
    Ok(())
}

/// Conclusão: chegou, todos confirmados, recebedor e assinatura presentes.
/// A foto é opcional.
pub fn ensure_completable(
    status: DeliveryStatus,
    items: &[DeliveryItem],
    received_by_name: &str,
    signature_url: Option<&str>,
) -> Result<(), AppError> {
    if status != DeliveryStatus::Arrived {
        return Err(match status {
            DeliveryStatus::Completed | DeliveryStatus::Cancelled => {
                AppError::DeliveryNotEditable(status)
            }
            _ => AppError::DeliveryNotArrived,
        });
    }
    if items.is_empty() {
        return Err(AppError::EmptyDelivery);
    }
    let pending = items.iter().filter(|i| i.delivered_at.is_none()).count();
    if pending > 0 {
        return Err(AppError::ItemsNotDelivered { pending });
    }
    if received_by_name.trim().is_empty() {
        return Err(AppError::MissingReceiverName);
    }
    if signature_url.map(str::trim).unwrap_or_default().is_empty() {
        return Err(AppError::MissingSignature);
    }
    Ok(())
}

// --- Payloads ---

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeliveryPayload {
    pub project_id: Uuid,
    #[schema(example = "AB-123")]
    pub truck_registration: Option<String>,
    pub truck_description: Option<String>,
    pub driver_id: Option<Uuid>,
    #[schema(value_type = Option<String>, format = Date, example = "2025-03-14")]
    pub planned_date: Option<NaiveDate>,
    pub notes: Option<String>,
    #[serde(default)]
    pub element_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddDeliveryElementsPayload {
    #[validate(length(min = 1, message = "Veldu a.m.k. eina einingu."))]
    pub element_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadElementPayload {
    pub load_position: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteDeliveryPayload {
    #[schema(example = "Guðrún Sigurðardóttir")]
    pub received_by_name: String,
    pub signature_url: Option<String>,
    pub photo_url: Option<String>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(loaded: bool, delivered: bool) -> DeliveryItem {
        let now = Utc::now();
        DeliveryItem {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            delivery_id: Uuid::new_v4(),
            element_id: Uuid::new_v4(),
            load_position: None,
            loaded_at: loaded.then_some(now),
            delivered_at: delivered.then_some(now),
            element_name: "V-1".into(),
            element_status: if delivered {
                ElementStatus::Delivered
            } else {
                ElementStatus::Loaded
            },
        }
    }

    #[test]
    fn status_moves_strictly_forward() {
        use DeliveryStatus::*;
        assert!(Planned.ensure_transition(Loading).is_ok());
        assert!(Loading.ensure_transition(InTransit).is_ok());
        assert!(InTransit.ensure_transition(Arrived).is_ok());
        assert!(Arrived.ensure_transition(Completed).is_ok());

        assert!(Planned.ensure_transition(InTransit).is_err());
        assert!(Arrived.ensure_transition(Loading).is_err());
        assert!(Completed.ensure_transition(Completed).is_err());
    }

    #[test]
    fn cancel_only_before_departure() {
        use DeliveryStatus::*;
        assert!(Planned.ensure_transition(Cancelled).is_ok());
        assert!(Loading.ensure_transition(Cancelled).is_ok());
        assert!(InTransit.ensure_transition(Cancelled).is_err());
        assert!(Completed.ensure_transition(Cancelled).is_err());
    }

    #[test]
    fn departure_requires_everything_loaded() {
        assert!(matches!(ensure_departable(&[]), Err(AppError::EmptyDelivery)));
        assert!(matches!(
            ensure_departable(&[item(true, false), item(false, false)]),
            Err(AppError::ItemsNotLoaded { pending: 1 })
        ));
        assert!(ensure_departable(&[item(true, false)]).is_ok());
    }

    #[test]
    fn completion_requires_arrival() {
        let items = [item(true, true)];
        for status in [DeliveryStatus::Planned, DeliveryStatus::Loading, DeliveryStatus::InTransit] {
            assert!(matches!(
                ensure_completable(status, &items, "Guðrún", Some("sig.png")),
                Err(AppError::DeliveryNotArrived)
            ));
        }
        assert!(matches!(
            ensure_completable(DeliveryStatus::Completed, &items, "Guðrún", Some("sig.png")),
            Err(AppError::DeliveryNotEditable(DeliveryStatus::Completed))
        ));
    }

    #[test]
    fn completion_requires_every_element_confirmed() {
        let items = [item(true, true), item(true, false), item(true, false)];
        assert!(matches!(
            ensure_completable(DeliveryStatus::Arrived, &items, "Guðrún", Some("sig.png")),
            Err(AppError::ItemsNotDelivered { pending: 2 })
        ));
    }

    #[test]
    fn completion_requires_receiver_and_signature() {
        let items = [item(true, true)];
        assert!(matches!(
            ensure_completable(DeliveryStatus::Arrived, &items, "  ", Some("sig.png")),
            Err(AppError::MissingReceiverName)
        ));
        assert!(matches!(
            ensure_completable(DeliveryStatus::Arrived, &items, "Guðrún", None),
            Err(AppError::MissingSignature)
        ));
        assert!(matches!(
            ensure_completable(DeliveryStatus::Arrived, &items, "Guðrún", Some("")),
            Err(AppError::MissingSignature)
        ));
    }

    #[test]
    fn completion_succeeds_without_photo() {
        let items = [item(true, true), item(true, true)];
        assert!(ensure_completable(DeliveryStatus::Arrived, &items, "Guðrún", Some("sig.png")).is_ok());
    }
}
