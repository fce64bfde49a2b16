// src/models/auth.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::common::error::AppError;

// ---
// Cargos (fechados). Strings soltas só na fronteira, via `FromStr`.
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    FactoryManager,
    Buyer,
    Driver,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::FactoryManager => "factory_manager",
            Role::Buyer => "buyer",
            Role::Driver => "driver",
        }
    }

    /// Pode mexer na produção (elementos, lotes, entregas)
    pub fn manages_production(self) -> bool {
        matches!(self, Role::Admin | Role::FactoryManager)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    // Aceita as variantes legadas e islandesas que ainda aparecem nos dados
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_lowercase().replace(['-', ' '], "_");
        let role = match normalized.as_str() {
            "admin" | "administrator" | "stjornandi" | "stjórnandi" | "kerfisstjori"
            | "kerfisstjóri" => Role::Admin,
            "factory_manager" | "factorymanager" | "factory" | "manager" | "producer"
            | "verksmidjustjori" | "verksmiðjustjóri" | "framleidandi" | "framleiðandi" => {
                Role::FactoryManager
            }
            "buyer" | "customer" | "kaupandi" | "verkkaupi" => Role::Buyer,
            "driver" | "bilstjori" | "bílstjóri" => Role::Driver,
            _ => return Err(AppError::UnknownRole(raw.to_string())),
        };
        Ok(role)
    }
}

// ---
// Quem está agindo. Passado explicitamente para todo serviço.
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorContext {
    pub user_id: Uuid,
    pub role: Role,
    pub company_id: Uuid,
}

// Representa um usuário vindo do banco de dados
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    #[schema(ignore)]
    pub company_id: Uuid,
    #[schema(example = "jon@steypa.is")]
    pub email: String,
    #[schema(example = "Jón Jónsson")]
    pub full_name: String,

    #[serde(skip_serializing)] // IMPORTANTE para segurança
    #[schema(ignore)]
    pub password_hash: String,

    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn actor(&self) -> ActorContext {
        ActorContext {
            user_id: self.id,
            role: self.role,
            company_id: self.company_id,
        }
    }
}

// Dados para login
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginUserPayload {
    #[validate(email(message = "Netfangið er ógilt."))]
    pub email: String,
    #[validate(length(min = 6, message = "Lykilorð þarf að vera a.m.k. 6 stafir."))]
    pub password: String,
}

// Criação de usuário pelo admin. O cargo chega como string e é parseado aqui.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserPayload {
    #[validate(email(message = "Netfangið er ógilt."))]
    pub email: String,
    #[validate(length(min = 1, message = "Nafn vantar."))]
    pub full_name: String,
    #[validate(length(min = 6, message = "Lykilorð þarf að vera a.m.k. 6 stafir."))]
    pub password: String,
    #[schema(example = "factory_manager")]
    pub role: String,
}

// Resposta de autenticação com o token
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
}

// Estrutura de dados ("claims") dentro do JWT
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,         // ID do usuário
    pub role: Role,
    pub company_id: Uuid,
    pub exp: usize,
    pub iat: usize,
}

impl Claims {
    pub fn actor(&self) -> ActorContext {
        ActorContext {
            user_id: self.sub,
            role: self.role,
            company_id: self.company_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_roles() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("factory_manager".parse::<Role>().unwrap(), Role::FactoryManager);
        assert_eq!("buyer".parse::<Role>().unwrap(), Role::Buyer);
        assert_eq!("driver".parse::<Role>().unwrap(), Role::Driver);
    }

    #[test]
    fn parses_legacy_and_localized_roles() {
        assert_eq!("Factory Manager".parse::<Role>().unwrap(), Role::FactoryManager);
        assert_eq!("factory-manager".parse::<Role>().unwrap(), Role::FactoryManager);
        assert_eq!("Bílstjóri".parse::<Role>().unwrap(), Role::Driver);
        assert_eq!(" kaupandi ".parse::<Role>().unwrap(), Role::Buyer);
        assert_eq!("Stjórnandi".parse::<Role>().unwrap(), Role::Admin);
    }

    #[test]
    fn rejects_unknown_roles() {
        let err = "superuser".parse::<Role>().unwrap_err();
        assert!(matches!(err, AppError::UnknownRole(ref raw) if raw == "superuser"));
    }

    #[test]
    fn production_rights() {
        assert!(Role::Admin.manages_production());
        assert!(Role::FactoryManager.manages_production());
        assert!(!Role::Driver.manages_production());
        assert!(!Role::Buyer.manages_production());
    }
}
