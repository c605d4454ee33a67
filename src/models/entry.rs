// file: src/models/entry.rs
use sqlx::FromRow;

/// One raw row of the persisted key/value table.
#[derive(Debug, Clone, FromRow)]
pub struct StoreEntry {
    pub key: String,
    pub value: String,
}
