// src/db/fixtures.rs
//
// Dados mínimos para os testes que rodam contra um Postgres de verdade
// (`#[sqlx::test]` cria um banco novo e aplica as migrações).

use sqlx::PgPool;
use uuid::Uuid;

use crate::common::db_utils::begin_scoped;
use crate::models::{
    auth::{ActorContext, Role},
    element::ElementStatus,
};

pub struct Seed {
    pub actor: ActorContext,
    pub project_id: Uuid,
}

/// Empresa + gerente de fábrica + um projeto.
pub async fn seed(pool: &PgPool) -> Seed {
    let company_id: Uuid = sqlx::query_scalar("INSERT INTO companies (name) VALUES ('Forsteypan') RETURNING id")
        .fetch_one(pool)
        .await
        .unwrap();

    let user_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO users (company_id, email, full_name, password_hash, role)
        VALUES ($1, $2, 'Verkstjóri', 'x', 'factory_manager')
        RETURNING id
        "#,
    )
    .bind(company_id)
    .bind(format!("{}@forsteypa.is", Uuid::new_v4()))
    .fetch_one(pool)
    .await
    .unwrap();

    let actor = ActorContext {
        user_id,
        role: Role::FactoryManager,
        company_id,
    };

    let mut tx = begin_scoped(pool, &actor).await.unwrap();
    let project_id: Uuid = sqlx::query_scalar(
        "INSERT INTO projects (company_id, name) VALUES ($1, 'Hlíðarendi 3') RETURNING id",
    )
    .bind(company_id)
    .fetch_one(&mut *tx)
    .await
    .unwrap();
    tx.commit().await.unwrap();

    Seed { actor, project_id }
}

pub async fn element(pool: &PgPool, seed: &Seed, status: ElementStatus) -> Uuid {
    let mut tx = begin_scoped(pool, &seed.actor).await.unwrap();
    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO elements (company_id, project_id, name, element_type, status, created_by)
        VALUES ($1, $2, 'V-1', 'wall', $3, $4)
        RETURNING id
        "#,
    )
    .bind(seed.actor.company_id)
    .bind(seed.project_id)
    .bind(status)
    .bind(seed.actor.user_id)
    .fetch_one(&mut *tx)
    .await
    .unwrap();
    tx.commit().await.unwrap();
    id
}
