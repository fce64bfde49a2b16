// src/models/element.rs

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::common::error::AppError;
use crate::models::auth::Role;

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "element_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Wall,
    Filigran,
    Staircase,
    Balcony,
    Ceiling,
    Column,
    Beam,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "element_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ElementStatus {
    Planned,
    Rebar,
    Cast,
    Curing,
    Ready,
    Loaded,
    Delivered,
    Issue,
}

/// Como uma transição foi classificada pela tabela de transições.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Próxima etapa do pipeline
    Forward,
    /// Qualquer etapa (menos entregue) -> issue
    Issue,
    /// issue -> de volta à produção
    Resolve,
    /// Volta para uma etapa anterior. Exige justificativa e fica auditada.
    Reversal,
}

impl ElementStatus {
    /// O pipeline de produção, em ordem. `Issue` fica de fora.
    pub const PIPELINE: [ElementStatus; 7] = [
        ElementStatus::Planned,
        ElementStatus::Rebar,
        ElementStatus::Cast,
        ElementStatus::Curing,
        ElementStatus::Ready,
        ElementStatus::Loaded,
        ElementStatus::Delivered,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ElementStatus::Planned => "planned",
            ElementStatus::Rebar => "rebar",
            ElementStatus::Cast => "cast",
            ElementStatus::Curing => "curing",
            ElementStatus::Ready => "ready",
            ElementStatus::Loaded => "loaded",
            ElementStatus::Delivered => "delivered",
            ElementStatus::Issue => "issue",
        }
    }

    pub fn label_is(self) -> &'static str {
        match self {
            ElementStatus::Planned => "skipulagt",
            ElementStatus::Rebar => "járnabinding",
            ElementStatus::Cast => "steypt",
            ElementStatus::Curing => "þornun",
            ElementStatus::Ready => "tilbúið",
            ElementStatus::Loaded => "hlaðið",
            ElementStatus::Delivered => "afhent",
            ElementStatus::Issue => "vandamál",
        }
    }

    fn stage_index(self) -> Option<usize> {
        Self::PIPELINE.iter().position(|s| *s == self)
    }

    pub fn next(self) -> Option<ElementStatus> {
        self.stage_index()
            .and_then(|i| Self::PIPELINE.get(i + 1).copied())
    }

    /// `loaded` e `delivered` só são gravados pelas ações da entrega.
    pub fn is_delivery_managed(self) -> bool {
        matches!(self, ElementStatus::Loaded | ElementStatus::Delivered)
    }

    /// Destinos permitidos sem justificativa (a tabela `allowed_next`).
    pub fn allowed_next(self) -> Vec<ElementStatus> {
        match self {
            ElementStatus::Delivered => vec![],
            ElementStatus::Issue => Self::PIPELINE[..=4].to_vec(),
            _ => {
                let mut next: Vec<ElementStatus> = self.next().into_iter().collect();
                next.push(ElementStatus::Issue);
                next
            }
        }
    }

    /// Classifica `self -> to`. Saltos para frente e saídas de `delivered`
    /// são rejeitados.
    pub fn classify(self, to: ElementStatus) -> Result<TransitionKind, AppError> {
        let invalid = || AppError::InvalidStatusTransition { from: self, to };

        if self == to || self == ElementStatus::Delivered {
            return Err(invalid());
        }

        match (self, to) {
            (_, ElementStatus::Issue) => Ok(TransitionKind::Issue),
            (ElementStatus::Issue, target) => {
                if Self::PIPELINE[..=4].contains(&target) {
                    Ok(TransitionKind::Resolve)
                } else {
                    Err(invalid())
                }
            }
            (from, target) => {
                let (Some(from_idx), Some(to_idx)) = (from.stage_index(), target.stage_index())
                else {
                    return Err(invalid());
                };
                if to_idx == from_idx + 1 {
                    Ok(TransitionKind::Forward)
                } else if to_idx < from_idx {
                    Ok(TransitionKind::Reversal)
                } else {
                    Err(invalid())
                }
            }
        }
    }

    /// Valida uma transição manual: retrocessos só para quem gerencia a
    /// produção e com justificativa.
    pub fn authorize(
        self,
        to: ElementStatus,
        role: Role,
        reason: Option<&str>,
    ) -> Result<TransitionKind, AppError> {
        let kind = self.classify(to)?;

        if kind == TransitionKind::Reversal {
            if !role.manages_production() {
                return Err(AppError::Forbidden);
            }
            if reason.map(str::trim).unwrap_or_default().is_empty() {
                return Err(AppError::OverrideReasonRequired);
            }
        }

        Ok(kind)
    }

    /// Colunas de data carimbadas ao entrar neste status.
    pub fn stamped_columns(self) -> &'static [&'static str] {
        match self {
            ElementStatus::Rebar => &["rebar_completed_at"],
            ElementStatus::Cast => &["cast_at"],
            ElementStatus::Ready => &["curing_completed_at", "ready_at"],
            ElementStatus::Loaded => &["loaded_at"],
            ElementStatus::Delivered => &["delivered_at"],
            ElementStatus::Planned | ElementStatus::Curing | ElementStatus::Issue => &[],
        }
    }
}

impl fmt::Display for ElementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: Uuid,
    #[schema(ignore)]
    pub company_id: Uuid,
    pub project_id: Uuid,
    #[schema(example = "V-204")]
    pub name: String,
    pub element_type: ElementType,
    pub status: ElementStatus,
    #[schema(example = 0)]
    pub priority: i32,
    #[schema(example = 2)]
    pub floor: Option<i32>,
    #[schema(example = 6000)]
    pub length_mm: Option<i32>,
    #[schema(example = 2800)]
    pub width_mm: Option<i32>,
    #[schema(example = 200)]
    pub height_mm: Option<i32>,
    #[schema(example = "8400.00")]
    pub weight_kg: Option<Decimal>,
    pub rebar_spec: Option<String>,
    #[schema(example = "RB-2025-0007")]
    pub batch_number: Option<String>,
    pub rebar_batch_id: Option<Uuid>,
    pub rebar_completed_at: Option<DateTime<Utc>>,
    pub cast_at: Option<DateTime<Utc>>,
    pub curing_completed_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Linha do log de auditoria (imutável)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ElementEvent {
    pub id: Uuid,
    #[schema(ignore)]
    pub company_id: Uuid,
    pub element_id: Uuid,
    pub previous_status: ElementStatus,
    pub new_status: ElementStatus,
    pub notes: Option<String>,
    pub is_override: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Uma mudança de status já validada, pronta para ser gravada
/// (status + carimbo de data + evento).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub element_id: Uuid,
    pub from: ElementStatus,
    pub to: ElementStatus,
    pub notes: Option<String>,
    pub is_override: bool,
}

impl StatusChange {
    pub fn new(element_id: Uuid, from: ElementStatus, to: ElementStatus) -> Self {
        Self {
            element_id,
            from,
            to,
            notes: None,
            is_override: false,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn overriding(mut self) -> Self {
        self.is_override = true;
        self
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ElementDetail {
    #[serde(flatten)]
    pub element: Element,
    pub allowed_next: Vec<ElementStatus>,
    pub events: Vec<ElementEvent>,
}

// --- Payloads ---

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateElementPayload {
    pub project_id: Uuid,
    #[validate(length(min = 1, message = "Heiti einingar vantar."))]
    #[schema(example = "V-204")]
    pub name: String,
    pub element_type: ElementType,
    #[serde(default)]
    #[validate(range(min = 0, message = "Forgangur má ekki vera neikvæður."))]
    pub priority: i32,
    pub floor: Option<i32>,
    #[validate(range(min = 1, message = "Lengd þarf að vera jákvæð."))]
    pub length_mm: Option<i32>,
    #[validate(range(min = 1, message = "Breidd þarf að vera jákvæð."))]
    pub width_mm: Option<i32>,
    #[validate(range(min = 1, message = "Hæð þarf að vera jákvæð."))]
    pub height_mm: Option<i32>,
    pub weight_kg: Option<Decimal>,
    pub rebar_spec: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateElementStatusPayload {
    pub status: ElementStatus,
    pub notes: Option<String>,
    /// Obrigatório para retrocessos
    pub override_reason: Option<String>,
}

#[cfg(test)]
impl Element {
    /// Elemento mínimo para testes de serviço.
    pub(crate) fn fixture(project_id: Uuid, status: ElementStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            project_id,
            name: "V-1".into(),
            element_type: ElementType::Wall,
            status,
            priority: 0,
            floor: None,
            length_mm: None,
            width_mm: None,
            height_mm: None,
            weight_kg: None,
            rebar_spec: None,
            batch_number: None,
            rebar_batch_id: None,
            rebar_completed_at: None,
            cast_at: None,
            curing_completed_at: None,
            ready_at: None,
            loaded_at: None,
            delivered_at: None,
            notes: None,
            created_by: Uuid::nil(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ElementStatus::*;

    #[test]
    fn forward_transitions_follow_the_pipeline() {
        for pair in ElementStatus::PIPELINE.windows(2) {
            assert_eq!(pair[0].classify(pair[1]).unwrap(), TransitionKind::Forward);
        }
    }

    #[test]
    fn skipping_a_stage_is_rejected() {
        assert!(matches!(
            Planned.classify(Cast),
            Err(AppError::InvalidStatusTransition { from: Planned, to: Cast })
        ));
        assert!(Ready.classify(Delivered).is_err());
    }

    #[test]
    fn delivered_is_terminal() {
        for target in [Planned, Ready, Loaded, Issue] {
            assert!(Delivered.classify(target).is_err());
        }
        assert!(Delivered.allowed_next().is_empty());
    }

    #[test]
    fn same_status_is_not_a_transition() {
        assert!(Cast.classify(Cast).is_err());
    }

    #[test]
    fn issue_can_be_raised_and_resolved() {
        assert_eq!(Curing.classify(Issue).unwrap(), TransitionKind::Issue);
        assert_eq!(Issue.classify(Cast).unwrap(), TransitionKind::Resolve);
        assert!(Issue.classify(Delivered).is_err());
        assert!(Issue.classify(Loaded).is_err());
    }

    #[test]
    fn reversal_needs_role_and_reason() {
        assert_eq!(Cast.classify(Planned).unwrap(), TransitionKind::Reversal);

        assert!(matches!(
            Cast.authorize(Planned, Role::Driver, Some("mistök")),
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            Cast.authorize(Planned, Role::FactoryManager, Some("   ")),
            Err(AppError::OverrideReasonRequired)
        ));
        assert_eq!(
            Cast.authorize(Planned, Role::FactoryManager, Some("röng skráning"))
                .unwrap(),
            TransitionKind::Reversal
        );
    }

    #[test]
    fn forward_needs_no_reason() {
        assert_eq!(
            Rebar.authorize(Cast, Role::FactoryManager, None).unwrap(),
            TransitionKind::Forward
        );
    }

    #[test]
    fn allowed_next_matches_classify() {
        for from in ElementStatus::PIPELINE.iter().copied().chain([Issue]) {
            for to in from.allowed_next() {
                let kind = from.classify(to).unwrap();
                assert_ne!(kind, TransitionKind::Reversal, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn stamps_follow_stage() {
        assert_eq!(Rebar.stamped_columns(), &["rebar_completed_at"]);
        assert_eq!(Ready.stamped_columns(), &["curing_completed_at", "ready_at"]);
        assert!(Issue.stamped_columns().is_empty());
    }
}
