// file: src/database/alarms.rs
use std::time::Instant;

use log::{debug, warn};
use sqlx::SqlitePool;

use super::COUNTER_KEY;
use crate::error::{AppError, AppResult};
use crate::models::{AlarmId, AlarmRecord, StoreEntry};
use crate::utils::logging::log_database_operation;

fn key_for(id: AlarmId) -> String {
    id.to_string()
}

pub async fn put(pool: &SqlitePool, record: &AlarmRecord) -> AppResult<()> {
    let started = Instant::now();
    let key = key_for(record.id);
    let value = serde_json::to_string(record)?;
    sqlx::query(
        r#"
        INSERT INTO alarm_store (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&key)
    .bind(value)
    .execute(pool)
    .await?;

    log_database_operation("put", &key, started.elapsed().as_millis() as u64);
    Ok(())
}

pub async fn remove(pool: &SqlitePool, id: AlarmId) -> AppResult<()> {
    let started = Instant::now();
    let key = key_for(id);
    sqlx::query("DELETE FROM alarm_store WHERE key = ?")
        .bind(&key)
        .execute(pool)
        .await?;

    log_database_operation("remove", &key, started.elapsed().as_millis() as u64);
    Ok(())
}

/// Remove every alarm row. The id counter is kept so ids are never handed out twice.
pub async fn clear(pool: &SqlitePool) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM alarm_store WHERE key != ?")
        .bind(COUNTER_KEY)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Load every readable alarm, skipping rows that do not decode.
pub async fn load_all(pool: &SqlitePool) -> AppResult<Vec<AlarmRecord>> {
    let entries = sqlx::query_as::<_, StoreEntry>("SELECT key, value FROM alarm_store")
        .fetch_all(pool)
        .await?;

    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.key == COUNTER_KEY {
            continue;
        }
        match decode_entry(&entry) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping persisted alarm: {}", e),
        }
    }

    records.sort_by_key(|r| r.id);
    debug!("Loaded {} alarm(s) from store", records.len());
    Ok(records)
}

fn decode_entry(entry: &StoreEntry) -> AppResult<AlarmRecord> {
    let key_id: AlarmId = entry
        .key
        .parse()
        .map_err(|_| AppError::corruption(&entry.key, "key is not an alarm id"))?;

    let record: AlarmRecord = serde_json::from_str(&entry.value)
        .map_err(|e| AppError::corruption(&entry.key, e.to_string()))?;

    if record.id != key_id {
        return Err(AppError::corruption(
            &entry.key,
            format!("record carries id {}", record.id),
        ));
    }
    if record.is_recurring() && record.interval_millis.map_or(true, |i| i <= 0) {
        return Err(AppError::corruption(
            &entry.key,
            "recurring record without a positive interval",
        ));
    }

    Ok(record)
}
