//src/main.rs

use anyhow::Context;
use axum::{
    middleware as axum_middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod middleware;
mod models;
mod services;

use crate::config::{AppState, Config};
use crate::docs::ApiDoc;
use crate::middleware::auth::auth_guard;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG manda; sem ele, "info"
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let config = Config::from_env()?;
    let app_state = AppState::new(&config).await?;

    // Faz o app rodar as migrações do SQLx na inicialização
    sqlx::migrate!()
        .run(&app_state.db_pool)
        .await
        .context("Falha ao rodar as migrações do banco de dados.")?;

    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    // Rotas públicas
    let auth_routes = Router::new()
        .route("/login", post(handlers::auth::login));

    let user_routes = Router::new()
        .route("/", post(handlers::auth::create_user))
        .route("/me", get(handlers::auth::get_me));

    let project_routes = Router::new()
        .route("/"
               ,post(handlers::projects::create_project)
               .get(handlers::projects::list_projects)
        )
        .route("/{id}", get(handlers::projects::get_project));

    let element_routes = Router::new()
        .route("/"
               ,post(handlers::elements::create_element)
               .get(handlers::elements::list_elements)
        )
        .route("/{id}", get(handlers::elements::get_element))
        .route("/{id}/status", patch(handlers::elements::update_status));

    let rebar_routes = Router::new()
        .route("/"
               ,post(handlers::rebar::create_batch)
               .get(handlers::rebar::list_batches)
        )
        .route("/{id}", get(handlers::rebar::get_batch))
        .route("/{id}/elements", post(handlers::rebar::add_elements))
        .route("/{id}/elements/{element_id}", delete(handlers::rebar::remove_element))
        .route("/{id}/checklist/{item_key}", put(handlers::rebar::toggle_checklist_item))
        .route("/{id}/approve", post(handlers::rebar::approve_batch))
        .route("/{id}/cancel", post(handlers::rebar::cancel_batch));

    let delivery_routes = Router::new()
        .route("/"
               ,post(handlers::deliveries::create_delivery)
               .get(handlers::deliveries::list_deliveries)
        )
        .route("/{id}", get(handlers::deliveries::get_delivery))
        .route("/{id}/elements", post(handlers::deliveries::add_elements))
        .route("/{id}/elements/{element_id}", delete(handlers::deliveries::remove_element))
        .route("/{id}/elements/{element_id}/load", post(handlers::deliveries::load_element))
        .route("/{id}/elements/{element_id}/confirm", post(handlers::deliveries::confirm_element))
        .route("/{id}/start-loading", post(handlers::deliveries::start_loading))
        .route("/{id}/depart", post(handlers::deliveries::depart))
        .route("/{id}/arrive", post(handlers::deliveries::arrive))
        .route("/{id}/complete", post(handlers::deliveries::complete))
        .route("/{id}/cancel", post(handlers::deliveries::cancel_delivery));

    let framvinda_routes = Router::new()
        .route("/contracts"
               ,post(handlers::framvinda::create_contract)
               .get(handlers::framvinda::list_contracts)
        )
        .route("/contracts/{id}", get(handlers::framvinda::get_contract))
        .route("/contracts/{id}/lines", post(handlers::framvinda::add_contract_line))
        .route("/contracts/{id}/periods", post(handlers::framvinda::create_period))
        .route("/contracts/{id}/cumulative", get(handlers::framvinda::get_cumulative_before))
        .route("/periods/{id}"
               ,get(handlers::framvinda::get_period_summary)
               .delete(handlers::framvinda::delete_period)
        )
        .route("/periods/{id}/lines", put(handlers::framvinda::save_period_lines))
        .route("/periods/{id}/refresh", post(handlers::framvinda::refresh_suggestions))
        .route("/periods/{id}/finalize", post(handlers::framvinda::finalize_period))
        .route("/periods/{id}/reopen", post(handlers::framvinda::reopen_period));

    // Tudo abaixo exige Bearer válido
    let protected = Router::new()
        .nest("/users", user_routes)
        .nest("/projects", project_routes)
        .nest("/elements", element_routes)
        .nest("/rebar-batches", rebar_routes)
        .nest("/deliveries", delivery_routes)
        .nest("/framvinda", framvinda_routes)
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // Combina tudo no router principal
    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/auth", auth_routes)
        .nest("/api", protected)
        .with_state(app_state);

    // Inicia o servidor
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Falha ao iniciar o listener TCP em {}", config.bind_addr))?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);

    axum::serve(listener, app)
        .await
        .context("Erro no servidor Axum")?;

    Ok(())
}
