//! Wake scheduler: the thin adapter between alarm bookkeeping and the facility that
//! actually delivers a callback at a given time.
//!
//! ```text
//!   AlarmManager / WakeHandler
//!            │ schedule_absolute / schedule_relative / cancel
//!            ▼
//!      WakeScheduler  ── exact first, degrade when denied, log every failure
//!            │
//!            ▼
//!     dyn WakeFacility  (TokioWakeFacility in-process, or a platform backend)
//! ```

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::{AlarmId, WakePayload};
use crate::utils::logging::log_scheduling_failure;

pub mod tokio_facility;

pub use tokio_facility::TokioWakeFacility;

/// When a registration should fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeTrigger {
    /// Wall-clock instant in epoch milliseconds.
    Rtc { at_epoch_millis: i64 },
    /// Offset on the monotonic clock, measured from the moment of registration.
    Elapsed { after: Duration },
}

/// The platform service that can wake the process at a requested time.
///
/// Registering an id that is already registered replaces the old registration.
#[cfg_attr(test, mockall::automock)]
pub trait WakeFacility: Send + Sync {
    /// Whether the platform currently permits exact alarm-clock registrations.
    fn can_schedule_exact(&self) -> bool;

    /// Exact wall-clock registration, allowed to wake the device from low power.
    fn set_alarm_clock(&self, id: AlarmId, at_epoch_millis: i64, payload: WakePayload)
        -> AppResult<()>;

    /// Best-effort exact registration that is honoured while the device idles.
    fn set_exact_and_allow_while_idle(
        &self,
        id: AlarmId,
        trigger: WakeTrigger,
        payload: WakePayload,
    ) -> AppResult<()>;

    fn cancel(&self, id: AlarmId) -> AppResult<()>;

    /// Whether registrations outlive the current process.
    fn survives_restart(&self) -> bool;
}

/// How a schedule request ended up being registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Exact,
    /// Exact scheduling was denied; registered with while-idle semantics instead.
    Degraded,
    /// Nothing was registered. The failure has already been logged.
    Failed,
}

impl ScheduleOutcome {
    pub fn is_registered(&self) -> bool {
        !matches!(self, ScheduleOutcome::Failed)
    }
}

#[derive(Clone)]
pub struct WakeScheduler {
    facility: Arc<dyn WakeFacility>,
}

impl WakeScheduler {
    pub fn new(facility: Arc<dyn WakeFacility>) -> Self {
        Self { facility }
    }

    pub fn survives_restart(&self) -> bool {
        self.facility.survives_restart()
    }

    /// Register a wall-clock wake for `payload.id` at `at_epoch_millis`.
    pub fn schedule_absolute(&self, payload: &WakePayload, at_epoch_millis: i64) -> ScheduleOutcome {
        let id = payload.id;

        if self.facility.can_schedule_exact() {
            match self
                .facility
                .set_alarm_clock(id, at_epoch_millis, payload.clone())
            {
                Ok(()) => {
                    debug!("Alarm {} set for {}", id, at_epoch_millis);
                    return ScheduleOutcome::Exact;
                }
                Err(AppError::SchedulingDenied(reason)) => {
                    warn!("Exact alarm {} denied ({}), degrading", id, reason);
                }
                Err(e) => {
                    log_scheduling_failure(id, &e);
                    return ScheduleOutcome::Failed;
                }
            }
        } else {
            info!(
                "{}; alarm {} registered while-idle",
                AppError::scheduling_denied("exact alarms not permitted"),
                id
            );
        }

        let trigger = WakeTrigger::Rtc { at_epoch_millis };
        match self
            .facility
            .set_exact_and_allow_while_idle(id, trigger, payload.clone())
        {
            Ok(()) => ScheduleOutcome::Degraded,
            Err(e) => {
                log_scheduling_failure(id, &e);
                ScheduleOutcome::Failed
            }
        }
    }

    /// Register a wake `after_millis` from now on the monotonic clock.
    pub fn schedule_relative(&self, payload: &WakePayload, after_millis: i64) -> ScheduleOutcome {
        let id = payload.id;
        let after = Duration::from_millis(after_millis.max(0) as u64);

        match self.facility.set_exact_and_allow_while_idle(
            id,
            WakeTrigger::Elapsed { after },
            payload.clone(),
        ) {
            Ok(()) => {
                debug!("Interval alarm {} set for {}ms", id, after_millis);
                ScheduleOutcome::Exact
            }
            Err(e) => {
                log_scheduling_failure(id, &e);
                ScheduleOutcome::Failed
            }
        }
    }

    /// Drop any registration for `id`. Unknown ids are fine.
    pub fn cancel(&self, id: AlarmId) {
        match self.facility.cancel(id) {
            Ok(()) => debug!("Alarm cancelled for id {}", id),
            Err(e) => error!("Failed to cancel alarm {}: {}", id, e),
        }
    }
}
