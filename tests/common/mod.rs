#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use coastercompanion::{
    AlarmId, AlarmManager, AppResult, Clock, Database, ManualClock, WakeFacility, WakePayload,
    WakeScheduler, WakeTrigger,
};
use tempfile::TempDir;

pub const T: i64 = 1_700_000_000_000;

#[derive(Debug, Clone, PartialEq)]
pub enum FacilityCall {
    AlarmClock { id: AlarmId, at: i64 },
    WhileIdle { id: AlarmId, trigger: WakeTrigger },
    Cancel(AlarmId),
}

/// Facility double that records every call instead of waking anything.
pub struct RecordingWakeFacility {
    calls: Mutex<Vec<FacilityCall>>,
    exact: AtomicBool,
    survives_restart: AtomicBool,
}

impl RecordingWakeFacility {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            exact: AtomicBool::new(true),
            survives_restart: AtomicBool::new(false),
        })
    }

    pub fn persistent() -> Arc<Self> {
        let facility = Self::new();
        facility.survives_restart.store(true, Ordering::SeqCst);
        facility
    }

    pub fn set_exact(&self, allowed: bool) {
        self.exact.store(allowed, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<FacilityCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn cancelled_ids(&self) -> Vec<AlarmId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                FacilityCall::Cancel(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn registered_ids(&self) -> Vec<AlarmId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                FacilityCall::AlarmClock { id, .. } | FacilityCall::WhileIdle { id, .. } => Some(id),
                FacilityCall::Cancel(_) => None,
            })
            .collect()
    }

    fn record(&self, call: FacilityCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl WakeFacility for RecordingWakeFacility {
    fn can_schedule_exact(&self) -> bool {
        self.exact.load(Ordering::SeqCst)
    }

    fn set_alarm_clock(&self, id: AlarmId, at_epoch_millis: i64, _payload: WakePayload) -> AppResult<()> {
        self.record(FacilityCall::AlarmClock { id, at: at_epoch_millis });
        Ok(())
    }

    fn set_exact_and_allow_while_idle(
        &self,
        id: AlarmId,
        trigger: WakeTrigger,
        _payload: WakePayload,
    ) -> AppResult<()> {
        self.record(FacilityCall::WhileIdle { id, trigger });
        Ok(())
    }

    fn cancel(&self, id: AlarmId) -> AppResult<()> {
        self.record(FacilityCall::Cancel(id));
        Ok(())
    }

    fn survives_restart(&self) -> bool {
        self.survives_restart.load(Ordering::SeqCst)
    }
}

pub struct Harness {
    pub manager: AlarmManager,
    pub db: Database,
    pub facility: Arc<RecordingWakeFacility>,
    pub clock: Arc<ManualClock>,
    pub dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        Self::in_dir(dir, RecordingWakeFacility::new()).await
    }

    pub async fn in_dir(dir: TempDir, facility: Arc<RecordingWakeFacility>) -> Self {
        let db = Database::open(&dir.path().join("coaster.db")).await.unwrap();
        let clock = Arc::new(ManualClock::new(T));
        let manager = AlarmManager::new(
            db.clone(),
            WakeScheduler::new(facility.clone()),
            clock.clone(),
        );
        Self { manager, db, facility, clock, dir }
    }

    /// Simulate a process restart: drop the manager and reopen the same file.
    pub async fn restart(self, facility: Arc<RecordingWakeFacility>) -> Self {
        let Harness { dir, db, clock, .. } = self;
        db.pool.close().await;
        let next = Self::in_dir(dir, facility).await;
        next.clock.set(clock.now_millis());
        next
    }
}

/// Ids in the store and ids in the active list, both sorted.
pub async fn store_and_list_ids(h: &Harness) -> (Vec<AlarmId>, Vec<AlarmId>) {
    let stored: Vec<AlarmId> = h.db.load_alarms().await.unwrap().iter().map(|r| r.id).collect();
    let mut listed: Vec<AlarmId> = h.manager.active_alarms().await.iter().map(|r| r.id).collect();
    listed.sort_unstable();
    (stored, listed)
}
