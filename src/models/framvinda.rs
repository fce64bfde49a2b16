// src/models/framvinda.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::common::error::AppError;
use crate::models::element::ElementType;

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "pricing_unit", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PricingUnit {
    Piece,
    SquareMeter,
    CubicMeter,
    Meter,
    Kilogram,
    Lump,
}

// De onde vem a sugestão automática de quantidade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "suggestion_basis", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SuggestionBasis {
    Cast,
    Delivered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "period_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
    Draft,
    Finalized,
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: Uuid,
    #[schema(ignore)]
    pub company_id: Uuid,
    pub project_id: Uuid,
    #[schema(example = "Einingar - Hlíðarendi 3")]
    pub name: String,
    /// Vísitala base do contrato
    #[schema(example = "100.0")]
    pub grunnvisitala: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContractLine {
    pub id: Uuid,
    #[schema(ignore)]
    pub company_id: Uuid,
    pub contract_id: Uuid,
    #[schema(example = "Veggeiningar")]
    pub label: String,
    #[schema(example = "Forsteyptar einingar")]
    pub category: Option<String>,
    pub pricing_unit: PricingUnit,
    #[schema(example = "100")]
    pub total_quantity: Decimal,
    #[schema(example = "1000")]
    pub unit_price: Decimal,
    pub sort_order: i32,
    pub element_type: Option<ElementType>,
    pub suggestion_basis: Option<SuggestionBasis>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub id: Uuid,
    #[schema(ignore)]
    pub company_id: Uuid,
    pub contract_id: Uuid,
    #[schema(example = 2)]
    pub period_number: i32,
    #[schema(value_type = String, format = Date, example = "2025-03-01")]
    pub period_start: NaiveDate,
    #[schema(value_type = String, format = Date, example = "2025-03-31")]
    pub period_end: NaiveDate,
    #[schema(example = "110.0")]
    pub visitala: Decimal,
    pub status: PeriodStatus,
    pub finalized_at: Option<DateTime<Utc>>,
    pub finalized_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Period {
    pub fn ensure_draft(&self) -> Result<(), AppError> {
        match self.status {
            PeriodStatus::Draft => Ok(()),
            PeriodStatus::Finalized => Err(AppError::PeriodNotDraft),
        }
    }

    pub fn ensure_finalized(&self) -> Result<(), AppError> {
        match self.status {
            PeriodStatus::Finalized => Ok(()),
            PeriodStatus::Draft => Err(AppError::PeriodNotFinalized),
        }
    }

    pub fn contains(&self, moment: DateTime<Utc>) -> bool {
        let day = moment.date_naive();
        day >= self.period_start && day <= self.period_end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PeriodLine {
    pub id: Uuid,
    #[schema(ignore)]
    pub company_id: Uuid,
    pub period_id: Uuid,
    pub contract_line_id: Uuid,
    #[schema(example = "30")]
    pub quantity_this_period: Decimal,
    #[schema(example = "30000")]
    pub amount_this_period: Decimal,
    pub is_manually_adjusted: bool,
    pub notes: Option<String>,
}

// --- Saídas calculadas ---

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineSummary {
    pub contract_line_id: Uuid,
    pub label: String,
    pub pricing_unit: PricingUnit,
    pub total_quantity: Decimal,
    pub unit_price: Decimal,
    pub cumulative_before: Decimal,
    pub quantity_this_period: Decimal,
    pub cumulative_total: Decimal,
    /// Fração (0.70 = 70%)
    pub percent_complete: Decimal,
    pub cumulative_amount: Decimal,
    pub amount_this_period: Decimal,
    pub is_manually_adjusted: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PeriodTotals {
    pub period_subtotal: Decimal,
    pub visitala_amount: Decimal,
    pub total_with_visitala: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSummary {
    pub period: Period,
    pub grunnvisitala: Decimal,
    pub lines: Vec<LineSummary>,
    pub totals: PeriodTotals,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContractDetail {
    #[serde(flatten)]
    pub contract: Contract,
    pub lines: Vec<ContractLine>,
    pub periods: Vec<Period>,
}

/// Quantidade já faturada por linha antes de um período.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeQuantity {
    pub contract_line_id: Uuid,
    pub cumulative_before: Decimal,
}

// --- Payloads ---

fn validate_not_negative(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() && !val.is_zero() {
        let mut err = ValidationError::new("range");
        err.message = Some("Gildið má ekki vera neikvætt.".into());
        return Err(err);
    }
    Ok(())
}

// Limites das colunas NUMERIC(14,4) e NUMERIC(14,2)
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 4);
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);

fn validate_quantity(val: &Decimal) -> Result<(), ValidationError> {
    validate_not_negative(val)?;
    if *val > MAX_QUANTITY {
        let mut err = ValidationError::new("range");
        err.message = Some("Magnið er of hátt.".into());
        return Err(err);
    }
    Ok(())
}

fn validate_unit_price(val: &Decimal) -> Result<(), ValidationError> {
    validate_not_negative(val)?;
    if *val > MAX_UNIT_PRICE {
        let mut err = ValidationError::new("range");
        err.message = Some("Einingaverðið er of hátt.".into());
        return Err(err);
    }
    Ok(())
}

fn validate_positive(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() || val.is_zero() {
        let mut err = ValidationError::new("range");
        err.message = Some("Gildið þarf að vera stærra en núll.".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateContractPayload {
    pub project_id: Uuid,
    #[validate(length(min = 1, message = "Heiti samnings vantar."))]
    pub name: String,
    #[validate(custom(function = "validate_not_negative"))]
    #[schema(example = "100.0")]
    pub grunnvisitala: Decimal,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddContractLinePayload {
    #[validate(length(min = 1, message = "Heiti línu vantar."))]
    pub label: String,
    pub category: Option<String>,
    pub pricing_unit: PricingUnit,
    #[validate(custom(function = "validate_quantity"))]
    #[schema(example = "100")]
    pub total_quantity: Decimal,
    #[validate(custom(function = "validate_unit_price"))]
    #[schema(example = "1000")]
    pub unit_price: Decimal,
    #[serde(default)]
    pub sort_order: i32,
    pub element_type: Option<ElementType>,
    pub suggestion_basis: Option<SuggestionBasis>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePeriodPayload {
    #[schema(value_type = String, format = Date, example = "2025-03-01")]
    pub period_start: NaiveDate,
    #[schema(value_type = String, format = Date, example = "2025-03-31")]
    pub period_end: NaiveDate,
    #[validate(custom(function = "validate_positive"))]
    #[schema(example = "110.0")]
    pub visitala: Decimal,
}

impl CreatePeriodPayload {
    pub fn ensure_date_range(&self) -> Result<(), AppError> {
        if self.period_end < self.period_start {
            return Err(AppError::InvalidDateRange);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PeriodLineInput {
    pub contract_line_id: Uuid,
    #[validate(custom(function = "validate_quantity"))]
    #[schema(example = "30")]
    pub quantity_this_period: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SavePeriodLinesPayload {
    #[validate(length(min = 1, message = "Engar línur til að vista."), nested)]
    pub lines: Vec<PeriodLineInput>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn period_payload(start: (i32, u32, u32), end: (i32, u32, u32), visitala: &str) -> CreatePeriodPayload {
        CreatePeriodPayload {
            period_start: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            period_end: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
            visitala: Decimal::from_str(visitala).unwrap(),
        }
    }

    #[test]
    fn period_end_before_start_is_rejected() {
        let payload = period_payload((2025, 3, 31), (2025, 3, 1), "110");
        assert!(matches!(payload.ensure_date_range(), Err(AppError::InvalidDateRange)));

        let single_day = period_payload((2025, 3, 1), (2025, 3, 1), "110");
        assert!(single_day.ensure_date_range().is_ok());
    }

    #[test]
    fn visitala_must_be_positive() {
        assert!(period_payload((2025, 3, 1), (2025, 3, 31), "0").validate().is_err());
        assert!(period_payload((2025, 3, 1), (2025, 3, 31), "110.5").validate().is_ok());
    }

    #[test]
    fn negative_line_quantities_are_rejected() {
        let line = AddContractLinePayload {
            label: "Filigran".into(),
            category: None,
            pricing_unit: PricingUnit::SquareMeter,
            total_quantity: Decimal::from(-1),
            unit_price: Decimal::from(9500),
            sort_order: 0,
            element_type: None,
            suggestion_basis: None,
        };
        assert!(line.validate().is_err());
    }

    fn save_payload(quantity: Decimal) -> SavePeriodLinesPayload {
        SavePeriodLinesPayload {
            lines: vec![PeriodLineInput {
                contract_line_id: Uuid::new_v4(),
                quantity_this_period: quantity,
                notes: None,
            }],
        }
    }

    #[test]
    fn period_line_quantity_stays_inside_the_column() {
        assert!(save_payload(Decimal::from(-50)).validate().is_err());
        assert!(save_payload(Decimal::from_scientific("1e20").unwrap()).validate().is_err());
        assert!(save_payload(MAX_QUANTITY + Decimal::new(1, 4)).validate().is_err());

        assert!(save_payload(Decimal::ZERO).validate().is_ok());
        assert!(save_payload(MAX_QUANTITY).validate().is_ok());
        assert_eq!(MAX_QUANTITY, Decimal::from_str("9999999999.9999").unwrap());
        assert_eq!(MAX_UNIT_PRICE, Decimal::from_str("999999999999.99").unwrap());
    }

    #[test]
    fn empty_save_is_rejected() {
        let payload = SavePeriodLinesPayload { lines: vec![] };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn period_contains_is_inclusive() {
        use chrono::TimeZone;
        let period = Period {
            id: Uuid::new_v4(),
            company_id: Uuid::nil(),
            contract_id: Uuid::new_v4(),
            period_number: 1,
            period_start: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            visitala: Decimal::from(110),
            status: PeriodStatus::Draft,
            finalized_at: None,
            finalized_by: None,
            created_at: Utc::now(),
        };
        assert!(period.contains(Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 0).unwrap()));
        assert!(period.contains(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()));
        assert!(!period.contains(Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap()));
        assert!(period.ensure_draft().is_ok());
        assert!(matches!(period.ensure_finalized(), Err(AppError::PeriodNotFinalized)));
    }
}
