// file: src/models/alarm.rs
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub type AlarmId = i64;

/// Label used when the user leaves the alarm name blank.
pub const DEFAULT_ALARM_LABEL: &str = "Alarm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmKind {
    OneShot,
    Recurring,
}

impl AlarmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmKind::OneShot => "one_shot",
            AlarmKind::Recurring => "recurring",
        }
    }
}

impl std::fmt::Display for AlarmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub id: AlarmId,
    pub name: String,
    pub kind: AlarmKind,
    /// Next firing instant. Recomputed on every recurring firing.
    pub fire_at_epoch_millis: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_millis: Option<i64>,
}

impl AlarmRecord {
    pub fn one_shot(id: AlarmId, name: impl Into<String>, at_epoch_millis: i64) -> Self {
        Self {
            id,
            name: name.into(),
            kind: AlarmKind::OneShot,
            fire_at_epoch_millis: at_epoch_millis,
            interval_millis: None,
        }
    }

    pub fn recurring(
        id: AlarmId,
        name: impl Into<String>,
        interval_millis: i64,
        now_epoch_millis: i64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind: AlarmKind::Recurring,
            fire_at_epoch_millis: now_epoch_millis.saturating_add(interval_millis),
            interval_millis: Some(interval_millis),
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.kind == AlarmKind::Recurring
    }

    pub fn display_name(&self) -> &str {
        let trimmed = self.name.trim();
        if trimmed.is_empty() {
            DEFAULT_ALARM_LABEL
        } else {
            trimmed
        }
    }

    pub fn fire_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.fire_at_epoch_millis).single()
    }

    /// Advance a recurring alarm to one interval past `now`. One-shot records are
    /// left untouched.
    pub fn reschedule_from(&mut self, now_epoch_millis: i64, interval_millis: i64) {
        if self.is_recurring() {
            self.fire_at_epoch_millis = now_epoch_millis.saturating_add(interval_millis);
            self.interval_millis = Some(interval_millis);
        }
    }

    /// Milliseconds until the next firing, clamped at zero for past-due alarms.
    pub fn millis_until_fire(&self, now_epoch_millis: i64) -> i64 {
        (self.fire_at_epoch_millis - now_epoch_millis).max(0)
    }
}
