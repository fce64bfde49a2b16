// src/services/framvinda_calculator.rs
//
// Cálculo puro da framvinda (faturamento por avanço). Sem banco, sem efeitos.

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::common::error::AppError;
use crate::models::{
    element::Element,
    framvinda::{
        ContractLine, LineSummary, Period, PeriodStatus, PeriodTotals, PricingUnit,
        SuggestionBasis,
    },
};

const AMOUNT_DP: u32 = 2;
const QUANTITY_DP: u32 = 4;

fn round(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// quantidade × preço unitário, arredondado como a coluna guarda.
/// Determinístico: salvar duas vezes dá o mesmo valor.
pub fn line_amount(quantity: Decimal, unit_price: Decimal) -> Result<Decimal, AppError> {
    quantity
        .checked_mul(unit_price)
        .map(|amount| round(amount, AMOUNT_DP))
        .ok_or(AppError::AmountOverflow)
}

/// cumulativo / total, ou 0 quando o total é 0 (nunca NaN/infinito).
pub fn percent_complete(cumulative_total: Decimal, total_quantity: Decimal) -> Decimal {
    if total_quantity.is_zero() {
        return Decimal::ZERO;
    }
    cumulative_total
        .checked_div(total_quantity)
        .map(|p| round(p, QUANTITY_DP))
        .unwrap_or(Decimal::ZERO)
}

/// subtotal × (vísitala / grunnvísitala − 1). grunnvísitala 0 => 0.
pub fn visitala_amount(
    subtotal: Decimal,
    visitala: Decimal,
    grunnvisitala: Decimal,
) -> Result<Decimal, AppError> {
    if grunnvisitala.is_zero() {
        return Ok(Decimal::ZERO);
    }
    subtotal
        .checked_mul(visitala)
        .and_then(|indexed| indexed.checked_div(grunnvisitala))
        .and_then(|indexed| indexed.checked_sub(subtotal))
        .map(|amount| round(amount, AMOUNT_DP))
        .ok_or(AppError::AmountOverflow)
}

pub fn summarize_line(
    line: &ContractLine,
    cumulative_before: Decimal,
    quantity_this_period: Decimal,
    is_manually_adjusted: bool,
    notes: Option<String>,
) -> Result<LineSummary, AppError> {
    let cumulative_total = cumulative_before
        .checked_add(quantity_this_period)
        .ok_or(AppError::AmountOverflow)?;

    Ok(LineSummary {
        contract_line_id: line.id,
        label: line.label.clone(),
        pricing_unit: line.pricing_unit,
        total_quantity: line.total_quantity,
        unit_price: line.unit_price,
        cumulative_before,
        quantity_this_period,
        cumulative_total,
        percent_complete: percent_complete(cumulative_total, line.total_quantity),
        cumulative_amount: line_amount(cumulative_total, line.unit_price)?,
        amount_this_period: line_amount(quantity_this_period, line.unit_price)?,
        is_manually_adjusted,
        notes,
    })
}

pub fn period_totals(
    lines: &[LineSummary],
    visitala: Decimal,
    grunnvisitala: Decimal,
) -> Result<PeriodTotals, AppError> {
    let period_subtotal = lines
        .iter()
        .try_fold(Decimal::ZERO, |acc, l| acc.checked_add(l.amount_this_period))
        .ok_or(AppError::AmountOverflow)?;
    let visitala_amount = visitala_amount(period_subtotal, visitala, grunnvisitala)?;
    let total_with_visitala = period_subtotal
        .checked_add(visitala_amount)
        .ok_or(AppError::AmountOverflow)?;

    Ok(PeriodTotals {
        period_subtotal,
        visitala_amount,
        total_with_visitala,
    })
}

// ---
// Cumulativo anterior
// ---

/// Uma quantidade faturada numa linha de um período.
#[derive(Debug, Clone)]
pub struct BilledQuantity {
    pub period_number: i32,
    pub status: PeriodStatus,
    pub contract_line_id: Uuid,
    pub quantity: Decimal,
}

/// Soma por linha das quantidades de períodos FINALIZADOS com número < k.
/// Rascunhos nunca entram, mesmo com quantidades.
pub fn cumulative_before(billed: &[BilledQuantity], period_number: i32) -> HashMap<Uuid, Decimal> {
    let mut totals: HashMap<Uuid, Decimal> = HashMap::new();
    for entry in billed
        .iter()
        .filter(|b| b.period_number < period_number && b.status == PeriodStatus::Finalized)
    {
        *totals.entry(entry.contract_line_id).or_default() += entry.quantity;
    }
    totals
}

// ---
// Edição de linhas
// ---

/// O que fica gravado numa linha após o usuário salvar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedLine {
    pub quantity: Decimal,
    pub amount: Decimal,
    pub is_manually_adjusted: bool,
}

/// Uma linha vira "ajustada manualmente" quando a quantidade muda, e nunca
/// volta atrás. Linha nova (sem registro anterior) conta como manual.
pub fn resolve_saved_line(
    existing: Option<(Decimal, bool)>,
    quantity: Decimal,
    unit_price: Decimal,
) -> Result<SavedLine, AppError> {
    let is_manually_adjusted = match existing {
        Some((stored_quantity, was_manual)) => was_manual || stored_quantity != quantity,
        None => true,
    };

    Ok(SavedLine {
        quantity,
        amount: line_amount(quantity, unit_price)?,
        is_manually_adjusted,
    })
}

// ---
// Sugestão automática a partir do estado físico dos elementos
// ---

pub fn element_quantity(unit: PricingUnit, element: &Element) -> Decimal {
    let mm = |v: Option<i32>| Decimal::from(v.unwrap_or(0));
    let thousand = Decimal::from(1000);

    match unit {
        PricingUnit::Piece => Decimal::ONE,
        PricingUnit::Meter => mm(element.length_mm) / thousand,
        PricingUnit::SquareMeter => {
            mm(element.length_mm) * mm(element.width_mm) / (thousand * thousand)
        }
        PricingUnit::CubicMeter => {
            mm(element.length_mm) * mm(element.width_mm) * mm(element.height_mm)
                / (thousand * thousand * thousand)
        }
        PricingUnit::Kilogram => element.weight_kg.unwrap_or(Decimal::ZERO),
        PricingUnit::Lump => Decimal::ZERO,
    }
}

/// `None` quando a linha não tem base de sugestão (fica como está).
pub fn suggested_quantity(
    line: &ContractLine,
    period: &Period,
    elements: &[Element],
) -> Option<Decimal> {
    let basis = line.suggestion_basis?;
    if line.pricing_unit == PricingUnit::Lump {
        return None;
    }

    let total: Decimal = elements
        .iter()
        .filter(|e| line.element_type.is_none_or(|t| t == e.element_type))
        .filter(|e| {
            let moment = match basis {
                SuggestionBasis::Cast => e.cast_at,
                SuggestionBasis::Delivered => e.delivered_at,
            };
            moment.is_some_and(|m| period.contains(m))
        })
        .map(|e| element_quantity(line.pricing_unit, e))
        .sum();

    Some(round(total, QUANTITY_DP))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::str::FromStr;

    use crate::models::element::{ElementStatus, ElementType};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn contract_line(total: &str, price: &str) -> ContractLine {
        ContractLine {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            contract_id: Uuid::new_v4(),
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

    fn period(number: i32, status: PeriodStatus) -> Period {
        Period {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            contract_id: Uuid::new_v4(),
            period_number: number,
            period_start: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            visitala: dec("110"),
            status,
            finalized_at: None,
            finalized_by: None,
            created_at: Utc::now(),
        }
    }

    fn element(kind: ElementType, cast_day: Option<u32>) -> Element {
        let now = Utc::now();
        Element {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            name: "V-1".into(),
            element_type: kind,
            status: ElementStatus::Cast,
            priority: 0,
            floor: None,
            length_mm: Some(6000),
            width_mm: Some(2500),
            height_mm: Some(200),
            weight_kg: Some(dec("7500")),
            rebar_spec: None,
            batch_number: None,
            rebar_batch_id: None,
            rebar_completed_at: None,
            cast_at: cast_day.map(|d| Utc.with_ymd_and_hms(2025, 3, d, 12, 0, 0).unwrap()),
            curing_completed_at: None,
            ready_at: None,
            loaded_at: None,
            delivered_at: None,
            notes: None,
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    fn billed(number: i32, status: PeriodStatus, line: Uuid, qty: &str) -> BilledQuantity {
        BilledQuantity {
            period_number: number,
            status,
            contract_line_id: line,
            quantity: dec(qty),
        }
    }

    #[test]
    fn worked_example_second_period() {
        // total 100, preço 1000; P1 finalizado = 40; P2 rascunho = 30
        let line = contract_line("100", "1000");
        let history = [
            billed(1, PeriodStatus::Finalized, line.id, "40"),
            billed(2, PeriodStatus::Draft, line.id, "30"),
        ];

        let before = cumulative_before(&history, 2);
        let cumulative = before.get(&line.id).copied().unwrap_or_default();
        assert_eq!(cumulative, dec("40"));

        let summary = summarize_line(&line, cumulative, dec("30"), true, None).unwrap();
        assert_eq!(summary.cumulative_total, dec("70"));
        assert_eq!(summary.percent_complete, dec("0.70"));
        assert_eq!(summary.amount_this_period, dec("30000"));
        assert_eq!(summary.cumulative_amount, dec("70000"));
    }

    #[test]
    fn worked_example_index_adjustment() {
        let amount = visitala_amount(dec("500000"), dec("110"), dec("100")).unwrap();
        assert_eq!(amount, dec("50000"));

        let line = contract_line("1000", "1000");
        let lines = [summarize_line(&line, Decimal::ZERO, dec("500"), false, None).unwrap()];
        let totals = period_totals(&lines, dec("110"), dec("100")).unwrap();
        assert_eq!(totals.period_subtotal, dec("500000"));
        assert_eq!(totals.visitala_amount, dec("50000"));
        assert_eq!(totals.total_with_visitala, dec("550000"));
    }

    #[test]
    fn zero_base_index_gives_no_adjustment() {
        for (subtotal, visitala) in [("500000", "110"), ("0", "0"), ("123.45", "999")] {
            assert_eq!(
                visitala_amount(dec(subtotal), dec(visitala), Decimal::ZERO).unwrap(),
                Decimal::ZERO
            );
        }
    }

    #[test]
    fn zero_total_quantity_gives_zero_percent() {
        assert_eq!(percent_complete(dec("15"), Decimal::ZERO), Decimal::ZERO);
        let line = contract_line("0", "1000");
        let summary = summarize_line(&line, dec("5"), dec("3"), false, None).unwrap();
        assert_eq!(summary.percent_complete, Decimal::ZERO);
    }

    #[test]
    fn drafts_never_count_towards_cumulative() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let history = [
            billed(1, PeriodStatus::Finalized, a, "10"),
            billed(1, PeriodStatus::Finalized, b, "2"),
            billed(2, PeriodStatus::Draft, a, "999"),
            billed(3, PeriodStatus::Finalized, a, "5"),
            billed(4, PeriodStatus::Draft, b, "7"),
            billed(5, PeriodStatus::Finalized, a, "1"),
        ];

        let at_4 = cumulative_before(&history, 4);
        assert_eq!(at_4[&a], dec("15"));
        assert_eq!(at_4[&b], dec("2"));

        let at_6 = cumulative_before(&history, 6);
        assert_eq!(at_6[&a], dec("16"));
        assert_eq!(at_6[&b], dec("2"));

        assert!(cumulative_before(&history, 1).is_empty());
    }

    #[test]
    fn cumulative_matches_brute_force_for_every_k() {
        let line = Uuid::new_v4();
        let history: Vec<BilledQuantity> = (1..=8)
            .map(|n| {
                let status = if n % 3 == 0 { PeriodStatus::Draft } else { PeriodStatus::Finalized };
                billed(n, status, line, &n.to_string())
            })
            .collect();

        for k in 1..=9 {
            let expected: Decimal = history
                .iter()
                .filter(|b| b.period_number < k && b.status == PeriodStatus::Finalized)
                .map(|b| b.quantity)
                .sum();
            let got = cumulative_before(&history, k).get(&line).copied().unwrap_or_default();
            assert_eq!(got, expected, "k = {k}");
        }
    }

    #[test]
    fn saving_twice_is_idempotent() {
        let price = dec("1234.56");
        let first = resolve_saved_line(Some((dec("0"), false)), dec("12.5"), price).unwrap();
        let second =
            resolve_saved_line(Some((first.quantity, first.is_manually_adjusted)), dec("12.5"), price)
                .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.amount, dec("15432.00"));
    }

    #[test]
    fn oversized_amount_is_an_error_not_a_panic() {
        let huge = Decimal::from_scientific("1e20").unwrap();
        let price = dec("999999999999.99");

        assert!(matches!(line_amount(huge, price), Err(AppError::AmountOverflow)));
        assert!(matches!(
            resolve_saved_line(Some((Decimal::ZERO, false)), huge, price),
            Err(AppError::AmountOverflow)
        ));
        assert!(matches!(
            visitala_amount(Decimal::MAX, dec("110"), dec("100")),
            Err(AppError::AmountOverflow)
        ));
    }

    #[test]
    fn manual_flag_is_sticky() {
        let price = dec("1000");
        // Mesmo valor da sugestão: continua automático
        let untouched = resolve_saved_line(Some((dec("4"), false)), dec("4"), price).unwrap();
        assert!(!untouched.is_manually_adjusted);

        let edited = resolve_saved_line(Some((dec("4"), false)), dec("6"), price).unwrap();
        assert!(edited.is_manually_adjusted);

        // Voltar ao valor antigo não desfaz o ajuste
        let back = resolve_saved_line(Some((dec("6"), true)), dec("4"), price).unwrap();
        assert!(back.is_manually_adjusted);
    }

    #[test]
    fn suggestion_counts_elements_cast_inside_the_period() {
        let mut line = contract_line("50", "1000");
        line.suggestion_basis = Some(SuggestionBasis::Cast);
        line.element_type = Some(ElementType::Wall);
        let p = period(1, PeriodStatus::Draft);

        let elements = [
            element(ElementType::Wall, Some(1)),
            element(ElementType::Wall, Some(31)),
            element(ElementType::Wall, None),
            element(ElementType::Column, Some(10)),
        ];

        assert_eq!(suggested_quantity(&line, &p, &elements), Some(dec("2")));
    }

    #[test]
    fn suggestion_uses_pricing_unit() {
        let mut line = contract_line("500", "20000");
        line.suggestion_basis = Some(SuggestionBasis::Cast);
        line.pricing_unit = PricingUnit::SquareMeter;
        let p = period(1, PeriodStatus::Draft);
        let elements = [element(ElementType::Wall, Some(5)), element(ElementType::Filigran, Some(6))];

        // 6.0 m × 2.5 m = 15 m² cada
        assert_eq!(suggested_quantity(&line, &p, &elements), Some(dec("30")));

        line.pricing_unit = PricingUnit::CubicMeter;
        assert_eq!(suggested_quantity(&line, &p, &elements), Some(dec("6")));

        line.pricing_unit = PricingUnit::Kilogram;
        assert_eq!(suggested_quantity(&line, &p, &elements), Some(dec("15000")));
    }

    #[test]
    fn no_basis_means_no_suggestion() {
        let line = contract_line("10", "10");
        let p = period(1, PeriodStatus::Draft);
        assert_eq!(suggested_quantity(&line, &p, &[element(ElementType::Wall, Some(2))]), None);

        let mut lump = contract_line("1", "5000000");
        lump.pricing_unit = PricingUnit::Lump;
        lump.suggestion_basis = Some(SuggestionBasis::Delivered);
        assert_eq!(suggested_quantity(&lump, &p, &[]), None);
    }
}
