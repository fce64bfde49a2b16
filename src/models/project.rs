// src/models/project.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::auth::{ActorContext, Role};

// O canteiro de obra que recebe os elementos
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    #[schema(ignore)]
    pub company_id: Uuid,
    #[schema(example = "Hlíðarendi 3")]
    pub name: String,
    #[schema(example = "Hlíðarendi 3, 102 Reykjavík")]
    pub address: Option<String>,
    /// O comprador que enxerga este projeto no portal
    pub buyer_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    // Compradores só veem os próprios projetos
    pub fn visible_to(&self, actor: &ActorContext) -> bool {
        actor.role != Role::Buyer || self.buyer_user_id == Some(actor.user_id)
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectPayload {
    #[validate(length(min = 1, message = "Heiti verkefnis vantar."))]
    pub name: String,
    pub address: Option<String>,
    pub buyer_user_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(buyer: Option<Uuid>) -> Project {
        Project {
            id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            name: "Hlíðarendi 3".into(),
            address: None,
            buyer_user_id: buyer,
            created_at: Utc::now(),
        }
    }

    fn actor(role: Role) -> ActorContext {
        ActorContext {
            user_id: Uuid::new_v4(),
            role,
            company_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn buyers_only_see_their_projects() {
        let buyer = actor(Role::Buyer);
        assert!(project(Some(buyer.user_id)).visible_to(&buyer));
        assert!(!project(Some(Uuid::new_v4())).visible_to(&buyer));
        assert!(!project(None).visible_to(&buyer));
    }

    #[test]
    fn staff_see_every_project() {
        for role in [Role::Admin, Role::FactoryManager, Role::Driver] {
            assert!(project(None).visible_to(&actor(role)));
        }
    }
}
