//! Alarm manager: the single owner of the active alarm list.
//!
//! The in-memory list and the store are only touched while holding `active`, so a
//! user cancel and a firing completion for the same id cannot interleave. Whichever
//! gets the lock first wins; the other finds the id gone and does nothing.

use std::sync::Arc;

use chrono::{Local, TimeZone};
use log::{debug, error, info, warn};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::database::Database;
use crate::error::{AppError, AppResult};
use crate::models::{AlarmId, AlarmKind, AlarmRecord, FireCompletion, WakePayload};
use crate::scheduler::WakeScheduler;
use crate::utils::logging::log_alarm_event;
use crate::utils::next_time_of_day;

pub struct AlarmManager {
    db: Database,
    scheduler: WakeScheduler,
    clock: Arc<dyn Clock>,
    active: Mutex<Vec<AlarmRecord>>,
    publisher: watch::Sender<Vec<AlarmRecord>>,
}

impl AlarmManager {
    pub fn new(db: Database, scheduler: WakeScheduler, clock: Arc<dyn Clock>) -> Self {
        let (publisher, _) = watch::channel(Vec::new());
        Self {
            db,
            scheduler,
            clock,
            active: Mutex::new(Vec::new()),
            publisher,
        }
    }

    /// Every change to the active list is pushed to subscribers as a full snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Vec<AlarmRecord>> {
        self.publisher.subscribe()
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub async fn active_alarms(&self) -> Vec<AlarmRecord> {
        self.active.lock().await.clone()
    }

    fn publish(&self, active: &[AlarmRecord]) {
        self.publisher.send_replace(active.to_vec());
    }

    /// Create an alarm that fires once at `at_epoch_millis`.
    pub async fn set_one_shot(&self, name: &str, at_epoch_millis: i64) -> AppResult<AlarmRecord> {
        let mut active = self.active.lock().await;

        let id = self.db.next_alarm_id().await?;
        let record = AlarmRecord::one_shot(id, name, at_epoch_millis);
        self.db.put_alarm(&record).await?;

        self.scheduler
            .schedule_absolute(&WakePayload::from(&record), at_epoch_millis);

        active.push(record.clone());
        self.publish(&active);
        log_alarm_event("Created", &record);

        Ok(record)
    }

    /// Create a one-shot alarm for the next local `hour:minute`.
    pub async fn set_one_shot_at(&self, name: &str, hour: u32, minute: u32) -> AppResult<AlarmRecord> {
        let now = Local
            .timestamp_millis_opt(self.clock.now_millis())
            .single()
            .ok_or_else(|| AppError::invalid_input("clock is out of range"))?;
        let at = next_time_of_day(hour, minute, &now)?;
        self.set_one_shot(name, at.timestamp_millis()).await
    }

    /// Create the repeating alarm. Only one may be active at a time.
    pub async fn set_recurring(&self, name: &str, interval_millis: i64) -> AppResult<AlarmRecord> {
        if interval_millis <= 0 {
            return Err(AppError::invalid_input(format!(
                "interval must be positive, got {}ms",
                interval_millis
            )));
        }

        let mut active = self.active.lock().await;
        if let Some(existing) = active.iter().find(|r| r.is_recurring()) {
            info!("Rejecting interval alarm '{}': alarm {} is active", name, existing.id);
            return Err(AppError::AlreadyActive(existing.id));
        }

        let id = self.db.next_alarm_id().await?;
        let record = AlarmRecord::recurring(id, name, interval_millis, self.clock.now_millis());
        self.db.put_alarm(&record).await?;

        self.scheduler
            .schedule_relative(&WakePayload::from(&record), interval_millis);

        active.push(record.clone());
        self.publish(&active);
        log_alarm_event("Created", &record);

        Ok(record)
    }

    /// Cancel one alarm. Returns whether it was active.
    pub async fn cancel(&self, id: AlarmId) -> AppResult<bool> {
        let mut active = self.active.lock().await;

        if let Err(e) = self.db.remove_alarm(id).await {
            error!("Failed to remove alarm {} from store, keeping it scheduled: {}", id, e);
            return Err(e);
        }
        self.scheduler.cancel(id);

        let before = active.len();
        active.retain(|r| r.id != id);
        let removed = active.len() != before;
        if removed {
            self.publish(&active);
            info!("[Alarm] Cancelled id={}", id);
        } else {
            debug!("Cancel for unknown alarm {}", id);
        }

        Ok(removed)
    }

    /// Cancel everything. Returns how many alarms were active.
    pub async fn cancel_all(&self) -> AppResult<usize> {
        let mut active = self.active.lock().await;

        for record in active.iter() {
            self.scheduler.cancel(record.id);
        }
        self.db.clear_alarms().await?;

        let count = active.len();
        active.clear();
        self.publish(&active);
        info!("[Alarm] Cancelled all {} alarm(s)", count);

        Ok(count)
    }

    /// Rebuild the active list from the store at startup.
    ///
    /// Registrations are re-armed only when the wake facility loses them with the
    /// process. Past-due one-shot alarms then fire straight away.
    pub async fn on_load(&self) -> AppResult<usize> {
        let mut active = self.active.lock().await;

        let mut records = self.db.load_alarms().await?;
        if let Some(max_id) = records.iter().map(|r| r.id).max() {
            self.db.resync_counter(max_id).await?;
        }
        self.drop_extra_recurring(&mut records).await?;

        if !self.scheduler.survives_restart() {
            let now = self.clock.now_millis();
            for record in &records {
                let payload = WakePayload::from(record);
                match record.kind {
                    AlarmKind::OneShot => {
                        self.scheduler
                            .schedule_absolute(&payload, record.fire_at_epoch_millis);
                    }
                    AlarmKind::Recurring => {
                        self.scheduler
                            .schedule_relative(&payload, record.millis_until_fire(now));
                    }
                }
            }
            debug!("Re-registered {} alarm(s) after restart", records.len());
        }

        *active = records;
        self.publish(&active);
        info!("Loaded {} active alarm(s)", active.len());

        Ok(active.len())
    }

    /// Keep the lowest-id recurring record and discard the rest.
    async fn drop_extra_recurring(&self, records: &mut Vec<AlarmRecord>) -> AppResult<()> {
        let mut extra = Vec::new();
        let mut seen_recurring = false;
        for record in records.iter() {
            if record.is_recurring() {
                if seen_recurring {
                    extra.push(record.id);
                }
                seen_recurring = true;
            }
        }

        for id in &extra {
            warn!("Discarding extra interval alarm {} found in store", id);
            self.scheduler.cancel(*id);
            self.db.remove_alarm(*id).await?;
        }
        records.retain(|r| !extra.contains(&r.id));
        Ok(())
    }

    /// Apply a completion reported by the wake handler.
    pub async fn on_fire_completed(&self, completion: FireCompletion) -> AppResult<()> {
        let mut active = self.active.lock().await;

        let Some(index) = active.iter().position(|r| r.id == completion.id) else {
            debug!("{}", AppError::StaleCompletion(completion.id));
            // The handler may have re-armed an alarm cancelled while it was firing.
            if completion.kind == AlarmKind::Recurring {
                self.scheduler.cancel(completion.id);
            }
            return Ok(());
        };

        match completion.kind {
            AlarmKind::OneShot => {
                self.db.remove_alarm(completion.id).await?;
                let record = active.remove(index);
                self.publish(&active);
                log_alarm_event("Completed", &record);
            }
            AlarmKind::Recurring => {
                let interval = completion
                    .interval_millis
                    .or(active[index].interval_millis)
                    .filter(|i| *i > 0)
                    .ok_or_else(|| {
                        AppError::invalid_input(format!(
                            "completion for alarm {} carries no interval",
                            completion.id
                        ))
                    })?;

                let mut updated = active[index].clone();
                updated.reschedule_from(self.clock.now_millis(), interval);
                self.db.put_alarm(&updated).await?;

                active[index] = updated;
                self.publish(&active);
                log_alarm_event("Rescheduled", &active[index]);
            }
        }

        Ok(())
    }

    /// Consume completion events until the channel closes or `shutdown` fires.
    pub fn spawn_completion_listener(
        self: Arc<Self>,
        mut completions: UnboundedReceiver<FireCompletion>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Starting alarm completion listener");
            loop {
                tokio::select! {
                    next = completions.recv() => {
                        let Some(completion) = next else { break };
                        if let Err(e) = self.on_fire_completed(completion).await {
                            error!("Failed to apply completion for alarm {}: {}", completion.id, e);
                        }
                    }
                    _ = shutdown.cancelled() => {
                        info!("Shutdown signal received, stopping completion listener");
                        break;
                    }
                }
            }
            info!("Alarm completion listener stopped");
        })
    }
}
