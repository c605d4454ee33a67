// file: src/database/counter.rs
use log::{info, warn};
use sqlx::{Sqlite, SqlitePool, Transaction};

use super::COUNTER_KEY;
use crate::error::{AppError, AppResult};
use crate::models::AlarmId;

async fn read_counter(tx: &mut Transaction<'_, Sqlite>) -> AppResult<AlarmId> {
    let raw: Option<String> = sqlx::query_scalar("SELECT value FROM alarm_store WHERE key = ?")
        .bind(COUNTER_KEY)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(match raw {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!("{}", AppError::corruption(COUNTER_KEY, format!("unreadable value '{}'", value)));
            0
        }),
        None => 0,
    })
}

async fn write_counter(tx: &mut Transaction<'_, Sqlite>, value: AlarmId) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO alarm_store (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(COUNTER_KEY)
    .bind(value.to_string())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Issue the next alarm id. The increment and the read happen in one statement, so
/// the counter is persisted before the id is handed out.
pub async fn next_id(pool: &SqlitePool) -> AppResult<AlarmId> {
    let next: AlarmId = sqlx::query_scalar(
        r#"
        INSERT INTO alarm_store (key, value, updated_at) VALUES (?, '1', CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE
            SET value = MAX(CAST(value AS INTEGER), 0) + 1, updated_at = CURRENT_TIMESTAMP
        RETURNING CAST(value AS INTEGER)
        "#,
    )
    .bind(COUNTER_KEY)
    .fetch_one(pool)
    .await?;

    Ok(next)
}

pub async fn current(pool: &SqlitePool) -> AppResult<AlarmId> {
    let mut tx = pool.begin().await?;
    let value = read_counter(&mut tx).await?;
    tx.commit().await?;

    Ok(value)
}

/// Raise the counter to at least `at_least`. Never lowers it.
pub async fn resync(pool: &SqlitePool, at_least: AlarmId) -> AppResult<AlarmId> {
    let mut tx = pool.begin().await?;
    let stored = read_counter(&mut tx).await?;
    let value = stored.max(at_least).max(0);
    if value != stored {
        info!("Resynchronizing alarm id counter from {} to {}", stored, value);
        write_counter(&mut tx, value).await?;
    }
    tx.commit().await?;

    Ok(value)
}
