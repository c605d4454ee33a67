// Declare modules
pub mod alarm;
pub mod alert;
pub mod entry;
pub mod wake;

// Flattened re-exports so callers can `use crate::models::AlarmRecord`.
pub use alarm::{AlarmId, AlarmKind, AlarmRecord, DEFAULT_ALARM_LABEL};
pub use alert::RingingAlert;
pub use entry::StoreEntry;
pub use wake::{FireCompletion, WakeAction, WakeIntent, WakePayload};
