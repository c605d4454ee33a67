// file: src/database/mod.rs

use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePool, Sqlite};

use crate::error::AppResult;
use crate::models::{AlarmId, AlarmRecord};

// Declare submodules
pub mod alarms;
pub mod counter;

/// Reserved key holding the id counter. Never parsed as an alarm.
pub const COUNTER_KEY: &str = "id_counter";

/// Durable alarm store backed by a single SQLite key/value table.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let db_url = format!("sqlite:{}?mode=rwc", path.display());
        Self::connect(&db_url).await
    }

    pub async fn connect(db_url: &str) -> Result<Self> {
        // Create database if it doesn't exist
        let db_exists = Sqlite::database_exists(db_url)
            .await
            .context("Failed to check if database exists")?;
        if !db_exists {
            info!("Creating database");
            Sqlite::create_database(db_url)
                .await
                .context("Failed to create database")?;
        }

        let pool = SqlitePool::connect(db_url)
            .await
            .context("Failed to connect to database")?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, applying the schema first.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        run_schema(&pool).await.context("Failed to run database schema")?;

        info!("Alarm store initialized");
        Ok(Database { pool })
    }

    // --- Alarm Delegates ---

    pub async fn put_alarm(&self, record: &AlarmRecord) -> AppResult<()> {
        alarms::put(&self.pool, record).await
    }

    pub async fn remove_alarm(&self, id: AlarmId) -> AppResult<()> {
        alarms::remove(&self.pool, id).await
    }

    pub async fn load_alarms(&self) -> AppResult<Vec<AlarmRecord>> {
        alarms::load_all(&self.pool).await
    }

    pub async fn clear_alarms(&self) -> AppResult<u64> {
        alarms::clear(&self.pool).await
    }

    // --- Counter Delegates ---

    pub async fn next_alarm_id(&self) -> AppResult<AlarmId> {
        counter::next_id(&self.pool).await
    }

    pub async fn current_alarm_id(&self) -> AppResult<AlarmId> {
        counter::current(&self.pool).await
    }

    pub async fn resync_counter(&self, at_least: AlarmId) -> AppResult<AlarmId> {
        counter::resync(&self.pool, at_least).await
    }
}

async fn run_schema(pool: &SqlitePool) -> Result<()> {
    let schema = include_str!("schema.sql");

    let mut current_statement = String::new();

    for line in schema.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") || trimmed.is_empty() {
            continue;
        }

        current_statement.push_str(line);
        current_statement.push('\n');

        if trimmed.ends_with(';') {
            sqlx::query(&current_statement).execute(pool).await?;
            current_statement.clear();
        }
    }
    Ok(())
}
