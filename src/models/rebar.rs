// src/models/rebar.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::common::error::AppError;
use crate::models::element::Element;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "rebar_batch_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RebarBatchStatus {
    Preparing,
    QcReady,
    Approved,
    Cancelled,
}

impl RebarBatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RebarBatchStatus::Preparing => "preparing",
            RebarBatchStatus::QcReady => "qc_ready",
            RebarBatchStatus::Approved => "approved",
            RebarBatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn label_is(self) -> &'static str {
        match self {
            RebarBatchStatus::Preparing => "í undirbúningi",
            RebarBatchStatus::QcReady => "tilbúinn í gæðaskoðun",
            RebarBatchStatus::Approved => "samþykktur",
            RebarBatchStatus::Cancelled => "hætt við",
        }
    }

    pub fn is_editable(self) -> bool {
        matches!(self, RebarBatchStatus::Preparing | RebarBatchStatus::QcReady)
    }
}

impl fmt::Display for RebarBatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---
// Checklist de qualidade (12 itens fixos)
// ---

const CHECKLIST_TEMPLATE: [(&str, &str); 12] = [
    ("drawing_reviewed", "Teikning yfirfarin"),
    ("bar_grade", "Rétt járnategund og þvermál"),
    ("bar_count", "Fjöldi járna samkvæmt teikningu"),
    ("bar_spacing", "Bil milli járna rétt"),
    ("concrete_cover", "Steypuhula og fjarlægðarklossar"),
    ("laps_anchorage", "Skarar og festingar"),
    ("lifting_loops", "Lyftilykkjur á sínum stað"),
    ("cast_in_items", "Innsteyptir hlutir staðsettir"),
    ("electrical", "Rafmagnsrör og dósir"),
    ("openings", "Op og úrtök"),
    ("ties_secure", "Bindingar traustar"),
    ("labelled", "Eining merkt"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    #[schema(example = "bar_spacing")]
    pub key: String,
    #[schema(example = "Bil milli járna rétt")]
    pub label: String,
    pub checked: bool,
    pub checked_by: Option<Uuid>,
    pub checked_at: Option<DateTime<Utc>>,
}

pub fn default_checklist() -> Vec<ChecklistItem> {
    CHECKLIST_TEMPLATE
        .iter()
        .map(|(key, label)| ChecklistItem {
            key: key.to_string(),
            label: label.to_string(),
            checked: false,
            checked_by: None,
            checked_at: None,
        })
        .collect()
}

pub fn unchecked_count(checklist: &[ChecklistItem]) -> usize {
    checklist.iter().filter(|item| !item.checked).count()
}

/// Marca/desmarca um item. Última escrita vence por item.
pub fn toggle_item(
    checklist: &mut [ChecklistItem],
    key: &str,
    checked: bool,
    actor: Uuid,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let item = checklist
        .iter_mut()
        .find(|item| item.key == key)
        .ok_or_else(|| AppError::UnknownChecklistItem(key.to_string()))?;

    item.checked = checked;
    item.checked_by = Some(actor);
    item.checked_at = checked.then_some(now);
    Ok(())
}

/// Status de um lote editável segue o checklist.
pub fn status_for_checklist(checklist: &[ChecklistItem]) -> RebarBatchStatus {
    if !checklist.is_empty() && unchecked_count(checklist) == 0 {
        RebarBatchStatus::QcReady
    } else {
        RebarBatchStatus::Preparing
    }
}

/// Portão da aprovação: todos os itens marcados.
pub fn ensure_checklist_complete(checklist: &[ChecklistItem]) -> Result<(), AppError> {
    match unchecked_count(checklist) {
        0 if !checklist.is_empty() => Ok(()),
        0 => Err(AppError::ChecklistIncomplete { unchecked: 0 }),
        unchecked => Err(AppError::ChecklistIncomplete { unchecked }),
    }
}

pub fn format_batch_number(year: i32, sequence: i64) -> String {
    format!("RB-{year}-{sequence:04}")
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RebarBatch {
    pub id: Uuid,
    #[schema(ignore)]
    pub company_id: Uuid,
    pub project_id: Uuid,
    #[schema(example = "RB-2025-0007")]
    pub batch_number: String,
    pub status: RebarBatchStatus,
    #[schema(value_type = Vec<ChecklistItem>)]
    pub checklist: Json<Vec<ChecklistItem>>,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl RebarBatch {
    pub fn ensure_editable(&self) -> Result<(), AppError> {
        if self.status.is_editable() {
            Ok(())
        } else {
            Err(AppError::BatchNotEditable(self.status))
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RebarBatchDetail {
    #[serde(flatten)]
    pub batch: RebarBatch,
    pub elements: Vec<Element>,
}

// --- Payloads ---

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRebarBatchPayload {
    pub project_id: Uuid,
    #[validate(length(min = 1, message = "Veldu a.m.k. eina einingu."))]
    pub element_ids: Vec<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddBatchElementsPayload {
    #[validate(length(min = 1, message = "Veldu a.m.k. eina einingu."))]
    pub element_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ToggleChecklistPayload {
    pub checked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_checked() -> Vec<ChecklistItem> {
        let actor = Uuid::new_v4();
        let mut checklist = default_checklist();
        for (key, _) in CHECKLIST_TEMPLATE {
            toggle_item(&mut checklist, key, true, actor, Utc::now()).unwrap();
        }
        checklist
    }

    #[test]
    fn default_checklist_has_twelve_unchecked_items() {
        let checklist = default_checklist();
        assert_eq!(checklist.len(), 12);
        assert_eq!(unchecked_count(&checklist), 12);
        assert_eq!(status_for_checklist(&checklist), RebarBatchStatus::Preparing);
    }

    #[test]
    fn toggle_records_actor_and_time() {
        let actor = Uuid::new_v4();
        let now = Utc::now();
        let mut checklist = default_checklist();

        toggle_item(&mut checklist, "bar_count", true, actor, now).unwrap();
        let item = checklist.iter().find(|i| i.key == "bar_count").unwrap();
        assert!(item.checked);
        assert_eq!(item.checked_by, Some(actor));
        assert_eq!(item.checked_at, Some(now));

        toggle_item(&mut checklist, "bar_count", false, actor, now).unwrap();
        let item = checklist.iter().find(|i| i.key == "bar_count").unwrap();
        assert!(!item.checked);
        assert_eq!(item.checked_at, None);
    }

    #[test]
    fn toggle_unknown_key_fails() {
        let mut checklist = default_checklist();
        let err = toggle_item(&mut checklist, "nope", true, Uuid::new_v4(), Utc::now());
        assert!(matches!(err, Err(AppError::UnknownChecklistItem(_))));
    }

    #[test]
    fn gate_rejects_any_unchecked_item() {
        // Para cada item: todos marcados menos ele -> aprovação recusada
        for (key, _) in CHECKLIST_TEMPLATE {
            let mut checklist = all_checked();
            toggle_item(&mut checklist, key, false, Uuid::new_v4(), Utc::now()).unwrap();
            assert!(matches!(
                ensure_checklist_complete(&checklist),
                Err(AppError::ChecklistIncomplete { unchecked: 1 })
            ));
            assert_eq!(status_for_checklist(&checklist), RebarBatchStatus::Preparing);
        }
    }

    #[test]
    fn gate_passes_when_everything_is_checked() {
        let checklist = all_checked();
        assert!(ensure_checklist_complete(&checklist).is_ok());
        assert_eq!(status_for_checklist(&checklist), RebarBatchStatus::QcReady);
    }

    #[test]
    fn gate_works_for_any_size() {
        let actor = Uuid::new_v4();
        for size in 1..=5 {
            let mut checklist: Vec<ChecklistItem> = default_checklist().into_iter().take(size).collect();
            assert!(ensure_checklist_complete(&checklist).is_err());
            let keys: Vec<String> = checklist.iter().map(|i| i.key.clone()).collect();
            for key in &keys {
                toggle_item(&mut checklist, key, true, actor, Utc::now()).unwrap();
            }
            assert!(ensure_checklist_complete(&checklist).is_ok());
        }
    }

    #[test]
    fn empty_checklist_never_passes() {
        assert!(ensure_checklist_complete(&[]).is_err());
    }

    #[test]
    fn batch_numbers_are_zero_padded() {
        assert_eq!(format_batch_number(2025, 7), "RB-2025-0007");
        assert_eq!(format_batch_number(2025, 12345), "RB-2025-12345");
    }
}
