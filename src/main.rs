// Coaster Companion - alarm daemon and coaster link
// Main entry point

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use coastercompanion::command_handlers::{parse_command, CommandHandlers, HELP};
use coastercompanion::config::AppConfig;
use coastercompanion::link::{self, TemperatureController};
use coastercompanion::utils::describe_alarm;
use coastercompanion::utils::logging::{init_logging, log_error_with_context};
use coastercompanion::{AlarmRinger, AlertBoard, AppState, AudioManager, Database};

fn main() {
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!("Starting Coaster Companion");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(run());
    // A serial read may still be blocked; don't wait on it forever.
    runtime.shutdown_timeout(Duration::from_secs(2));

    if let Err(e) = result {
        log_error_with_context(&e, "startup");
        eprintln!("Coaster Companion failed to start: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Invalid configuration")?;

    let db = Database::open(&config.db_path)
        .await
        .context("Failed to initialize database")?;

    let audio = AudioManager::new(config.sound_file.clone(), config.volume);
    let board = AlertBoard::new();
    let ringer = Arc::new(AlarmRinger::new(audio, board.clone()));

    let state = Arc::new(
        AppState::builder(db, ringer)
            .wake_lock_timeout(config.wake_lock_timeout)
            .exact_alarms(config.exact_alarms)
            .start()
            .context("Failed to start alarm runtime")?,
    );

    let restored = state.manager.on_load().await.context("Failed to restore alarms")?;
    info!("Restored {} alarm(s)", restored);

    spawn_alarm_list_logger(&state);
    spawn_alert_logger(&board, &state);

    let controller = match &config.device_path {
        Some(path) => start_device_link(path, &state),
        None => {
            info!("No coaster device configured");
            None
        }
    };

    let handlers = CommandHandlers::new(state.clone(), controller);
    println!("{}", HELP);

    tokio::select! {
        _ = read_commands(&handlers) => info!("Input closed"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            info!("Interrupt received");
        }
    }

    state.close().await;
    info!("Coaster Companion stopped");
    Ok(())
}

async fn read_commands(handlers: &CommandHandlers) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read input: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let result = match parse_command(&line) {
            Ok(command) => handlers.execute(command).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(output) => println!("{}", output),
            Err(e) if e.is_user_facing() => println!("{}", e.to_safe_string()),
            Err(e) => {
                error!("Command failed: {}", e);
                println!("{}", e.to_safe_string());
            }
        }
    }
}

fn spawn_alarm_list_logger(state: &AppState) {
    let mut alarms = state.manager.subscribe();
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = alarms.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = alarms.borrow_and_update().clone();
                    info!("{} active alarm(s)", snapshot.len());
                    for record in &snapshot {
                        info!("  {}", describe_alarm(record));
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    });
}

fn spawn_alert_logger(board: &AlertBoard, state: &AppState) {
    let mut alerts = board.subscribe();
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = alerts.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if let Some(alert) = alerts.borrow_and_update().clone() {
                        info!("{}: {}", alert.title, alert.text);
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    });
}

fn start_device_link(path: &std::path::Path, state: &AppState) -> Option<Arc<TemperatureController>> {
    let (reader, writer) = match link::open_device(path) {
        Ok(ends) => ends,
        Err(e) => {
            warn!("Coaster device unavailable: {}", e);
            return None;
        }
    };

    let (temperature_tx, temperature_rx) = watch::channel(0.0);
    let controller = Arc::new(TemperatureController::new(temperature_rx));
    controller.attach_writer(Box::new(writer));

    let reading = link::spawn_read_loop(reader, temperature_tx, state.shutdown.clone());
    tokio::spawn(async move {
        if let Err(e) = reading.await {
            error!("Coaster read loop ended abnormally: {}", e);
        }
    });

    Some(controller)
}
