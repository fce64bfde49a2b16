// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Auth ---
        handlers::auth::login,

        // --- Users ---
        handlers::auth::get_me,
        handlers::auth::create_user,

        // --- Projects ---
        handlers::projects::create_project,
        handlers::projects::list_projects,
        handlers::projects::get_project,

        // --- Elements ---
        handlers::elements::create_element,
        handlers::elements::list_elements,
        handlers::elements::get_element,
        handlers::elements::update_status,

        // --- Rebar ---
        handlers::rebar::create_batch,
        handlers::rebar::list_batches,
        handlers::rebar::get_batch,
        handlers::rebar::add_elements,
        handlers::rebar::remove_element,
        handlers::rebar::toggle_checklist_item,
        handlers::rebar::approve_batch,
        handlers::rebar::cancel_batch,

        // --- Deliveries ---
        handlers::deliveries::create_delivery,
        handlers::deliveries::list_deliveries,
        handlers::deliveries::get_delivery,
        handlers::deliveries::add_elements,
        handlers::deliveries::remove_element,
        handlers::deliveries::cancel_delivery,
        handlers::deliveries::start_loading,
        handlers::deliveries::load_element,
        handlers::deliveries::depart,
        handlers::deliveries::arrive,
        handlers::deliveries::confirm_element,
        handlers::deliveries::complete,

        // --- Framvinda ---
        handlers::framvinda::create_contract,
        handlers::framvinda::list_contracts,
        handlers::framvinda::get_contract,
        handlers::framvinda::add_contract_line,
        handlers::framvinda::get_cumulative_before,
        handlers::framvinda::create_period,
        handlers::framvinda::get_period_summary,
        handlers::framvinda::save_period_lines,
        handlers::framvinda::refresh_suggestions,
        handlers::framvinda::finalize_period,
        handlers::framvinda::reopen_period,
        handlers::framvinda::delete_period,
    ),
    components(
        schemas(
            // --- Auth ---
            models::auth::Role,
            models::auth::User,
            models::auth::LoginUserPayload,
            models::auth::CreateUserPayload,
            models::auth::AuthResponse,

            // --- Projects ---
            models::project::Project,
            models::project::CreateProjectPayload,

            // --- Elements ---
            models::element::ElementType,
            models::element::ElementStatus,
            models::element::Element,
            models::element::ElementEvent,
            models::element::ElementDetail,
            models::element::CreateElementPayload,
            models::element::UpdateElementStatusPayload,

            // --- Rebar ---
            models::rebar::RebarBatchStatus,
            models::rebar::ChecklistItem,
            models::rebar::RebarBatch,
            models::rebar::RebarBatchDetail,
            models::rebar::CreateRebarBatchPayload,
            models::rebar::AddBatchElementsPayload,
            models::rebar::ToggleChecklistPayload,

            // --- Deliveries ---
            models::delivery::DeliveryStatus,
            models::delivery::Delivery,
            models::delivery::DeliveryItem,
            models::delivery::DeliveryDetail,
            models::delivery::CreateDeliveryPayload,
            models::delivery::AddDeliveryElementsPayload,
            models::delivery::LoadElementPayload,
            models::delivery::CompleteDeliveryPayload,

            // --- Framvinda ---
            models::framvinda::PricingUnit,
            models::framvinda::SuggestionBasis,
            models::framvinda::PeriodStatus,
            models::framvinda::Contract,
            models::framvinda::ContractLine,
            models::framvinda::Period,
            models::framvinda::PeriodLine,
            models::framvinda::LineSummary,
            models::framvinda::PeriodTotals,
            models::framvinda::PeriodSummary,
            models::framvinda::ContractDetail,
            models::framvinda::CumulativeQuantity,
            models::framvinda::CreateContractPayload,
            models::framvinda::AddContractLinePayload,
            models::framvinda::CreatePeriodPayload,
            models::framvinda::PeriodLineInput,
            models::framvinda::SavePeriodLinesPayload,
        )
    ),
    tags(
        (name = "Auth", description = "Autenticação"),
        (name = "Users", description = "Usuário atual e cadastro pelo admin"),
        (name = "Projects", description = "Obras"),
        (name = "Elements", description = "Elementos pré-moldados e máquina de estados"),
        (name = "Rebar", description = "Lotes de armadura e checklist de QC"),
        (name = "Deliveries", description = "Entregas ao canteiro"),
        (name = "Framvinda", description = "Medição mensal e reajuste por vísitala")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_the_billing_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/framvinda/periods/{id}/finalize"));
        assert!(doc.paths.paths.contains_key("/api/rebar-batches/{id}/approve"));
        assert!(doc
            .components
            .as_ref()
            .is_some_and(|c| c.security_schemes.contains_key("api_jwt")));
    }
}
