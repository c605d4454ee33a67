// Coaster Companion library
// Durable alarm scheduling plus the coaster device link

pub mod alarms;
pub mod alerts;
pub mod audio;
pub mod clock;
pub mod command_handlers;
pub mod config;
pub mod database;
pub mod error;
pub mod link;
pub mod models;
pub mod scheduler;
pub mod utils;
pub mod wake;

// Re-export commonly used types
pub use alarms::AlarmManager;
pub use alerts::{AlarmRinger, AlertBoard};
pub use audio::AudioManager;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use database::Database;
pub use error::{AppError, AppResult};
pub use models::{
    AlarmId, AlarmKind, AlarmRecord, FireCompletion, RingingAlert, WakeAction, WakeIntent, WakePayload,
};
pub use scheduler::{ScheduleOutcome, TokioWakeFacility, WakeFacility, WakeScheduler, WakeTrigger};
pub use wake::{AlarmSideEffects, WakeHandler};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Application state shared across the application
pub struct AppState {
    pub db: Database,
    pub manager: Arc<AlarmManager>,
    pub handler: Arc<WakeHandler>,
    pub facility: Arc<TokioWakeFacility>,
    pub shutdown: CancellationToken,
    intents: UnboundedSender<WakeIntent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AppState {
    pub fn builder(db: Database, effects: Arc<dyn AlarmSideEffects>) -> AppStateBuilder {
        AppStateBuilder {
            db,
            effects,
            clock: Arc::new(SystemClock),
            wake_lock_timeout: wake::DEFAULT_WAKE_LOCK_TIMEOUT,
            exact_alarms: true,
        }
    }

    /// What tapping the ringing alert does.
    pub fn request_stop(&self) {
        if self.intents.send(WakeIntent::stop()).is_err() {
            warn!("Stop request dropped: wake dispatcher is not running");
        }
    }

    /// Cancel background tasks and wait for them to finish.
    pub async fn close(&self) {
        info!("Shutting down alarm runtime");
        self.shutdown.cancel();
        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        for task in tasks {
            let _ = task.await;
        }
    }
}

pub struct AppStateBuilder {
    db: Database,
    effects: Arc<dyn AlarmSideEffects>,
    clock: Arc<dyn Clock>,
    wake_lock_timeout: Duration,
    exact_alarms: bool,
}

impl AppStateBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn wake_lock_timeout(mut self, timeout: Duration) -> Self {
        self.wake_lock_timeout = timeout;
        self
    }

    pub fn exact_alarms(mut self, allowed: bool) -> Self {
        self.exact_alarms = allowed;
        self
    }

    /// Wire the facility, scheduler, manager and handler, and spawn the dispatch
    /// tasks. Must be called inside a tokio runtime. Does not load persisted alarms;
    /// call [`AlarmManager::on_load`] next.
    pub fn start(self) -> AppResult<AppState> {
        let (intent_tx, intent_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let facility = Arc::new(TokioWakeFacility::new(intent_tx.clone())?);
        facility.set_exact_allowed(self.exact_alarms);
        let scheduler = WakeScheduler::new(facility.clone());

        let manager = Arc::new(AlarmManager::new(self.db.clone(), scheduler.clone(), self.clock));
        let handler = Arc::new(
            WakeHandler::new(scheduler, self.effects, completion_tx)
                .with_wake_lock_timeout(self.wake_lock_timeout),
        );

        let tasks = vec![
            manager.clone().spawn_completion_listener(completion_rx, shutdown.clone()),
            wake::spawn_dispatcher(handler.clone(), intent_rx, shutdown.clone()),
        ];

        Ok(AppState {
            db: self.db,
            manager,
            handler,
            facility,
            shutdown,
            intents: intent_tx,
            tasks: Mutex::new(tasks),
        })
    }
}
