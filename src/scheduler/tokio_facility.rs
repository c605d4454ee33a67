//! In-process wake facility built on tokio timers.
//!
//! Each registration is one task. When it expires a [`WakeIntent::fire`] is pushed to
//! the dispatch channel. Registrations die with the process, so the alarm manager
//! re-registers everything on load when this facility is in use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use log::{debug, trace, warn};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};

use super::{WakeFacility, WakeTrigger};
use crate::error::{AppError, AppResult};
use crate::models::{AlarmId, WakeIntent, WakePayload};

/// Wall-clock waits are split into slices no longer than this so a clock change is
/// noticed within one slice.
const MAX_RTC_SLICE: Duration = Duration::from_secs(30);

pub struct TokioWakeFacility {
    runtime: Handle,
    sender: UnboundedSender<WakeIntent>,
    registrations: Mutex<HashMap<AlarmId, JoinHandle<()>>>,
    exact_allowed: AtomicBool,
}

impl TokioWakeFacility {
    /// Must be called from inside a tokio runtime.
    pub fn new(sender: UnboundedSender<WakeIntent>) -> AppResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| AppError::config(format!("wake facility needs a tokio runtime: {}", e)))?;

        Ok(Self {
            runtime,
            sender,
            registrations: Mutex::new(HashMap::new()),
            exact_allowed: AtomicBool::new(true),
        })
    }

    /// Simulates the platform granting or revoking exact-alarm permission.
    pub fn set_exact_allowed(&self, allowed: bool) {
        self.exact_allowed.store(allowed, Ordering::SeqCst);
    }

    /// Ids with a registration that has not fired yet.
    pub fn pending_ids(&self) -> Vec<AlarmId> {
        let mut ids: Vec<AlarmId> = self
            .lock_registrations()
            .iter()
            .filter(|(_, task)| !task.is_finished())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    fn lock_registrations(&self) -> MutexGuard<'_, HashMap<AlarmId, JoinHandle<()>>> {
        self.registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn register(&self, id: AlarmId, trigger: WakeTrigger, payload: WakePayload) -> AppResult<()> {
        if self.sender.is_closed() {
            return Err(AppError::scheduling("wake dispatcher is not running"));
        }

        // Resolve the monotonic deadline now; the offset counts from registration.
        let deadline = match trigger {
            WakeTrigger::Elapsed { after } => Some(Instant::now() + after),
            WakeTrigger::Rtc { .. } => None,
        };
        let sender = self.sender.clone();

        let task = self.runtime.spawn(async move {
            match (trigger, deadline) {
                (_, Some(deadline)) => sleep_until(deadline).await,
                (WakeTrigger::Rtc { at_epoch_millis }, None) => wait_for_wall_clock(at_epoch_millis).await,
                (WakeTrigger::Elapsed { .. }, None) => {}
            }
            trace!("Wake registration {} expired", payload.id);
            if sender.send(WakeIntent::fire(payload)).is_err() {
                warn!("Wake for alarm {} dropped: dispatcher stopped", id);
            }
        });

        if let Some(previous) = self.lock_registrations().insert(id, task) {
            previous.abort();
        }
        Ok(())
    }
}

async fn wait_for_wall_clock(at_epoch_millis: i64) {
    loop {
        let remaining = at_epoch_millis - Utc::now().timestamp_millis();
        if remaining <= 0 {
            return;
        }
        sleep(Duration::from_millis(remaining as u64).min(MAX_RTC_SLICE)).await;
    }
}

impl WakeFacility for TokioWakeFacility {
    fn can_schedule_exact(&self) -> bool {
        self.exact_allowed.load(Ordering::SeqCst)
    }

    fn set_alarm_clock(&self, id: AlarmId, at_epoch_millis: i64, payload: WakePayload) -> AppResult<()> {
        if !self.can_schedule_exact() {
            return Err(AppError::scheduling_denied("exact alarm permission revoked"));
        }
        self.register(id, WakeTrigger::Rtc { at_epoch_millis }, payload)
    }

    fn set_exact_and_allow_while_idle(
        &self,
        id: AlarmId,
        trigger: WakeTrigger,
        payload: WakePayload,
    ) -> AppResult<()> {
        self.register(id, trigger, payload)
    }

    fn cancel(&self, id: AlarmId) -> AppResult<()> {
        if let Some(task) = self.lock_registrations().remove(&id) {
            task.abort();
            debug!("Aborted wake registration {}", id);
        }
        Ok(())
    }

    fn survives_restart(&self) -> bool {
        false
    }
}

impl Drop for TokioWakeFacility {
    fn drop(&mut self) {
        for (_, task) in self.lock_registrations().drain() {
            task.abort();
        }
    }
}
