// src/config.rs

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{env, time::Duration};

use crate::{
    db::{
        DeliveryRepository, ElementRepository, FramvindaRepository, ProjectRepository,
        RebarRepository, UserRepository,
    },
    services::{
        auth::{AuthService, JwtKeys},
        delivery_service::DeliveryService,
        element_service::ElementService,
        framvinda_service::FramvindaService,
        project_service::ProjectService,
        rebar_service::RebarService,
    },
};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_JWT_TTL_HOURS: i64 = 168;

// Variáveis de ambiente lidas na inicialização
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub jwt_ttl_hours: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL deve ser definida")?;
        let jwt_secret = lookup("JWT_SECRET").context("JWT_SECRET deve ser definido")?;

        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let db_max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("DB_MAX_CONNECTIONS inválido: {raw}"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        let jwt_ttl_hours = match lookup("JWT_TTL_HOURS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("JWT_TTL_HOURS inválido: {raw}"))?,
            None => DEFAULT_JWT_TTL_HOURS,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr,
            db_max_connections,
            jwt_ttl_hours,
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub auth_service: AuthService,
    pub project_service: ProjectService,
    pub element_service: ElementService,
    pub rebar_service: RebarService,
    pub delivery_service: DeliveryService,
    pub framvinda_service: FramvindaService,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
            .context("Falha ao conectar ao banco de dados")?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Monta o gráfico de dependências ---
        let user_repo = UserRepository::new(db_pool.clone());
        let project_repo = ProjectRepository::new();
        let element_repo = ElementRepository::new();
        let rebar_repo = RebarRepository::new();
        let delivery_repo = DeliveryRepository::new();
        let framvinda_repo = FramvindaRepository::new();

        let keys = JwtKeys::new(&config.jwt_secret, config.jwt_ttl_hours);

        Ok(Self {
            auth_service: AuthService::new(user_repo.clone(), keys, db_pool.clone()),
            project_service: ProjectService::new(db_pool.clone(), project_repo, user_repo.clone()),
            element_service: ElementService::new(
                db_pool.clone(),
                element_repo,
                delivery_repo,
                project_repo,
            ),
            rebar_service: RebarService::new(db_pool.clone(), rebar_repo, element_repo, project_repo),
            delivery_service: DeliveryService::new(
                db_pool.clone(),
                delivery_repo,
                element_repo,
                project_repo,
                user_repo,
            ),
            framvinda_service: FramvindaService::new(db_pool.clone(), framvinda_repo, project_repo),
            db_pool,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/forsteypa"),
            ("JWT_SECRET", "leyndo"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.jwt_ttl_hours, 168);
    }

    #[test]
    fn missing_secret_fails() {
        let err = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/x")]))
            .unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn bad_number_fails() {
        let result = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/x"),
            ("JWT_SECRET", "s"),
            ("DB_MAX_CONNECTIONS", "many"),
        ]));
        assert!(result.is_err());
    }
}
