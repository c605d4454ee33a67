// file: src/models/alert.rs
use serde::{Deserialize, Serialize};

/// The visible notification shown while an alarm rings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingingAlert {
    pub title: String,
    pub text: String,
    pub alarm_label: String,
}

impl RingingAlert {
    pub fn new(alarm_label: &str) -> Self {
        Self {
            title: format!("{} Alarm", alarm_label),
            text: "Tap to stop alarm".to_string(),
            alarm_label: alarm_label.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ringing_alert_new() {
        let alert = RingingAlert::new("Hydrate");
        assert_eq!(alert.title, "Hydrate Alarm");
        assert_eq!(alert.text, "Tap to stop alarm");
        assert_eq!(alert.alarm_label, "Hydrate");
    }
}
