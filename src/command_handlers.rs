//! Command handlers module
//!
//! Line-oriented commands for driving alarms and the coaster link from a terminal.
//! Parsing is separate from execution so both can be tested on their own.

use std::sync::Arc;

use log::info;

use crate::error::{AppError, AppResult};
use crate::link::TemperatureController;
use crate::models::AlarmId;
use crate::utils::{describe_alarm, format_countdown, minutes_to_millis, INTERVAL_PRESET_MINUTES};
use crate::AppState;

pub const HELP: &str = "\
commands:
  at HH:MM [name]        one-shot alarm at the next HH:MM
  in MINUTES [name]      one-shot alarm MINUTES from now
  every MINUTES [name]   interval alarm (presets: 5 10 15 30 60)
  cancel ID              cancel one alarm
  clear                  cancel every alarm
  stop                   silence the ringing alarm
  list                   show active alarms
  temp VALUE             send preferred temperature to the coaster
  threshold VALUE        send temperature threshold to the coaster
  help";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    At { hour: u32, minute: u32, name: String },
    In { minutes: i64, name: String },
    Every { minutes: i64, name: String },
    Cancel(AlarmId),
    Clear,
    Stop,
    List,
    Temperature(f32),
    Threshold(f32),
    Help,
}

fn rest_as_name<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.collect::<Vec<_>>().join(" ")
}

fn parse_number<T: std::str::FromStr>(raw: Option<&str>, what: &str) -> AppResult<T> {
    let raw = raw.ok_or_else(|| AppError::invalid_input(format!("missing {}", what)))?;
    raw.parse()
        .map_err(|_| AppError::invalid_input(format!("'{}' is not a valid {}", raw, what)))
}

pub fn parse_command(line: &str) -> AppResult<Command> {
    let mut parts = line.split_whitespace();
    let verb = parts
        .next()
        .ok_or_else(|| AppError::invalid_input("empty command"))?
        .to_lowercase();

    let command = match verb.as_str() {
        "at" => {
            let time = parts
                .next()
                .ok_or_else(|| AppError::invalid_input("missing time"))?;
            let (h, m) = time
                .split_once(':')
                .ok_or_else(|| AppError::invalid_input(format!("'{}' is not HH:MM", time)))?;
            Command::At {
                hour: parse_number(Some(h), "hour")?,
                minute: parse_number(Some(m), "minute")?,
                name: rest_as_name(parts),
            }
        }
        "in" => Command::In {
            minutes: parse_number(parts.next(), "minute count")?,
            name: rest_as_name(parts),
        },
        "every" => Command::Every {
            minutes: parse_number(parts.next(), "minute count")?,
            name: rest_as_name(parts),
        },
        "cancel" => Command::Cancel(parse_number(parts.next(), "alarm id")?),
        "clear" => Command::Clear,
        "stop" => Command::Stop,
        "list" | "ls" => Command::List,
        "temp" => Command::Temperature(parse_number(parts.next(), "temperature")?),
        "threshold" => Command::Threshold(parse_number(parts.next(), "threshold")?),
        "help" | "?" => Command::Help,
        other => return Err(AppError::invalid_input(format!("unknown command '{}'", other))),
    };
    Ok(command)
}

/// Executes parsed commands against the running app.
pub struct CommandHandlers {
    state: Arc<AppState>,
    controller: Option<Arc<TemperatureController>>,
}

impl CommandHandlers {
    pub fn new(state: Arc<AppState>, controller: Option<Arc<TemperatureController>>) -> Self {
        Self { state, controller }
    }

    /// Run one command and return the text to show the user.
    pub async fn execute(&self, command: Command) -> AppResult<String> {
        let manager = &self.state.manager;
        match command {
            Command::At { hour, minute, name } => {
                let record = manager.set_one_shot_at(&name, hour, minute).await?;
                Ok(format!("Alarm {} set for {:02}:{:02}", record.id, hour, minute))
            }
            Command::In { minutes, name } => {
                if minutes <= 0 {
                    return Err(AppError::invalid_input("minutes must be positive"));
                }
                let at = manager.now_millis() + minutes_to_millis(minutes);
                let record = manager.set_one_shot(&name, at).await?;
                Ok(format!("Alarm {} set, rings in {}", record.id, format_countdown(minutes_to_millis(minutes))))
            }
            Command::Every { minutes, name } => {
                if !INTERVAL_PRESET_MINUTES.contains(&minutes) {
                    info!("Non-preset interval of {} minutes requested", minutes);
                }
                let record = manager.set_recurring(&name, minutes_to_millis(minutes)).await?;
                Ok(format!("Interval alarm {} set: {}", record.id, describe_alarm(&record)))
            }
            Command::Cancel(id) => match manager.cancel(id).await? {
                true => Ok(format!("Alarm {} cancelled", id)),
                false => Ok(format!("No active alarm with id {}", id)),
            },
            Command::Clear => {
                let count = manager.cancel_all().await?;
                Ok(format!("Cancelled {} alarm(s)", count))
            }
            Command::Stop => {
                self.state.request_stop();
                Ok("Stopping alarm".to_string())
            }
            Command::List => {
                let alarms = manager.active_alarms().await;
                if alarms.is_empty() {
                    return Ok("No active alarms".to_string());
                }
                let now = manager.now_millis();
                let lines: Vec<String> = alarms
                    .iter()
                    .map(|record| {
                        format!(
                            "[{}] {} (in {})",
                            record.id,
                            describe_alarm(record),
                            format_countdown(record.millis_until_fire(now))
                        )
                    })
                    .collect();
                Ok(lines.join("\n"))
            }
            Command::Temperature(value) => {
                self.link()?.update_preferred_temperature(value);
                Ok(format!("Preferred temperature set to {}", value))
            }
            Command::Threshold(value) => {
                self.link()?.update_threshold(value);
                Ok(format!("Threshold set to {}", value))
            }
            Command::Help => Ok(HELP.to_string()),
        }
    }

    fn link(&self) -> AppResult<&TemperatureController> {
        self.controller
            .as_deref()
            .ok_or_else(|| AppError::invalid_input("no coaster device connected"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_at() {
        assert_eq!(
            parse_command("at 7:05 Morning tea").unwrap(),
            Command::At { hour: 7, minute: 5, name: "Morning tea".to_string() }
        );
        assert!(parse_command("at 7").is_err());
        assert!(parse_command("at xx:10").is_err());
    }

    #[test]
    fn test_parse_interval_and_relative() {
        assert_eq!(
            parse_command("every 15 Hydrate").unwrap(),
            Command::Every { minutes: 15, name: "Hydrate".to_string() }
        );
        assert_eq!(
            parse_command("IN 3").unwrap(),
            Command::In { minutes: 3, name: String::new() }
        );
    }

    #[test]
    fn test_parse_simple_verbs() {
        assert_eq!(parse_command("cancel 12").unwrap(), Command::Cancel(12));
        assert_eq!(parse_command("clear").unwrap(), Command::Clear);
        assert_eq!(parse_command("  stop ").unwrap(), Command::Stop);
        assert_eq!(parse_command("ls").unwrap(), Command::List);
        assert_eq!(parse_command("temp 42.5").unwrap(), Command::Temperature(42.5));
        assert_eq!(parse_command("threshold 2").unwrap(), Command::Threshold(2.0));
    }

    #[test]
    fn test_parse_errors_are_user_facing() {
        for line in ["", "snooze", "cancel", "cancel one", "temp hot"] {
            let err = parse_command(line).unwrap_err();
            assert!(err.is_user_facing(), "{:?} should be user facing", line);
        }
    }
}
