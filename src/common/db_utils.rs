// src/common/db_utils.rs

use sqlx::{PgPool, Postgres, Transaction};

use crate::common::error::AppError;
use crate::models::auth::ActorContext;

// ---
// Helper RLS: A "Chave" para o Banco de Dados
// ---
/// Abre uma transação e define as variáveis RLS (empresa e usuário).
/// `set_config(..., true)` vale só até o fim da transação, por isso toda
/// ação roda dentro de uma.
pub(crate) async fn begin_scoped(
    pool: &PgPool,
    actor: &ActorContext,
) -> Result<Transaction<'static, Postgres>, AppError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT set_config('app.company_id', $1, true)")
        .bind(actor.company_id.to_string())
        .execute(&mut *tx)
        .await?;

    sqlx::query("SELECT set_config('app.user_id', $1, true)")
        .bind(actor.user_id.to_string())
        .execute(&mut *tx)
        .await?;

    Ok(tx)
}
