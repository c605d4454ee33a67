// file: src/models/wake.rs
use serde::{Deserialize, Serialize};

use super::alarm::{AlarmId, AlarmKind, AlarmRecord};

/// What a wake callback asks the handler to do. Carried explicitly so that a stop
/// request works without knowing which alarm is ringing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeAction {
    Fire,
    Stop,
}

/// Everything the handler needs to act on a firing, registered alongside the wake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakePayload {
    pub id: AlarmId,
    pub kind: AlarmKind,
    pub interval_millis: Option<i64>,
    pub label: String,
}

impl From<&AlarmRecord> for WakePayload {
    fn from(record: &AlarmRecord) -> Self {
        Self {
            id: record.id,
            kind: record.kind,
            interval_millis: record.interval_millis,
            label: record.display_name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeIntent {
    pub action: WakeAction,
    pub payload: Option<WakePayload>,
}

impl WakeIntent {
    pub fn fire(payload: WakePayload) -> Self {
        Self {
            action: WakeAction::Fire,
            payload: Some(payload),
        }
    }

    pub fn stop() -> Self {
        Self {
            action: WakeAction::Stop,
            payload: None,
        }
    }
}

/// Emitted by the wake handler once a firing has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireCompletion {
    pub id: AlarmId,
    pub kind: AlarmKind,
    pub interval_millis: Option<i64>,
}

impl FireCompletion {
    pub fn one_shot(id: AlarmId) -> Self {
        Self {
            id,
            kind: AlarmKind::OneShot,
            interval_millis: None,
        }
    }

    pub fn recurring(id: AlarmId, interval_millis: i64) -> Self {
        Self {
            id,
            kind: AlarmKind::Recurring,
            interval_millis: Some(interval_millis),
        }
    }
}
