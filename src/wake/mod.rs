//! Wake handler: the entry point the wake facility calls at fire time.
//!
//! The handler keeps no state between calls. Everything it needs arrives in the
//! [`WakeIntent`], so it behaves the same whether or not the process was restarted
//! since the alarm was set.
//!
//! ```text
//!   WakeIntent ──▶ acquire wake lock
//!                    ├─ Stop ──▶ silence + dismiss
//!                    └─ Fire ──▶ side effects (best effort)
//!                                 ├─ OneShot   ──▶ cancel(id)            ──▶ completion
//!                                 └─ Recurring ──▶ schedule_relative(id) ──▶ completion
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::models::{AlarmKind, FireCompletion, WakeAction, WakeIntent, WakePayload};
use crate::scheduler::WakeScheduler;

pub mod lock;

pub use lock::{WakeLock, WakeLockGuard, DEFAULT_WAKE_LOCK_TIMEOUT};

/// Sound, vibration and notification for a ringing alarm.
#[cfg_attr(test, mockall::automock)]
pub trait AlarmSideEffects: Send + Sync {
    fn start(&self, alarm_label: &str) -> AppResult<()>;

    /// Must be safe to call when nothing is ringing.
    fn stop(&self) -> AppResult<()>;
}

pub struct WakeHandler {
    scheduler: WakeScheduler,
    effects: Arc<dyn AlarmSideEffects>,
    completions: UnboundedSender<FireCompletion>,
    wake_lock: WakeLock,
    wake_lock_timeout: Duration,
}

impl WakeHandler {
    pub fn new(
        scheduler: WakeScheduler,
        effects: Arc<dyn AlarmSideEffects>,
        completions: UnboundedSender<FireCompletion>,
    ) -> Self {
        Self {
            scheduler,
            effects,
            completions,
            wake_lock: WakeLock::new("coastercompanion:alarm"),
            wake_lock_timeout: DEFAULT_WAKE_LOCK_TIMEOUT,
        }
    }

    pub fn with_wake_lock_timeout(mut self, timeout: Duration) -> Self {
        self.wake_lock_timeout = timeout;
        self
    }

    pub fn wake_lock(&self) -> &WakeLock {
        &self.wake_lock
    }

    /// Process one wake callback. Never fails; problems are logged here because
    /// there is no caller to hand them to.
    pub fn handle(&self, intent: WakeIntent) {
        let _guard = self.wake_lock.acquire(self.wake_lock_timeout);

        let result = match intent.action {
            WakeAction::Stop => self.handle_stop(),
            WakeAction::Fire => match intent.payload {
                Some(payload) => self.handle_fire(payload),
                None => Err(AppError::invalid_input("fire intent without payload")),
            },
        };

        if let Err(e) = result {
            error!("Wake handling failed: {}", e);
        }
    }

    fn handle_fire(&self, payload: WakePayload) -> AppResult<()> {
        info!("Alarm {} firing ({})", payload.id, payload.kind);

        // Rescheduling below must happen even if the ringer misbehaves.
        match catch_unwind(AssertUnwindSafe(|| self.effects.start(&payload.label))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Alarm {} side effects failed: {}", payload.id, e),
            Err(_) => error!("Alarm {} side effects panicked", payload.id),
        }

        let completion = match payload.kind {
            AlarmKind::OneShot => {
                self.scheduler.cancel(payload.id);
                FireCompletion::one_shot(payload.id)
            }
            AlarmKind::Recurring => {
                let interval = payload.interval_millis.filter(|i| *i > 0).ok_or_else(|| {
                    AppError::invalid_input(format!(
                        "recurring alarm {} fired without an interval",
                        payload.id
                    ))
                })?;
                self.scheduler.schedule_relative(&payload, interval);
                FireCompletion::recurring(payload.id, interval)
            }
        };

        if self.completions.send(completion).is_err() {
            warn!(
                "Completion for alarm {} dropped: manager is not listening",
                completion.id
            );
        }
        Ok(())
    }

    fn handle_stop(&self) -> AppResult<()> {
        debug!("Stop requested");
        match catch_unwind(AssertUnwindSafe(|| self.effects.stop())) {
            Ok(result) => result,
            Err(_) => Err(AppError::audio("ringer panicked while stopping")),
        }
    }
}

/// Route wake intents to the handler until the channel closes or `shutdown` fires.
pub fn spawn_dispatcher(
    handler: Arc<WakeHandler>,
    mut intents: UnboundedReceiver<WakeIntent>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting wake dispatcher");
        loop {
            tokio::select! {
                next = intents.recv() => {
                    let Some(intent) = next else { break };
                    handler.handle(intent);
                }
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received, stopping wake dispatcher");
                    break;
                }
            }
        }
        info!("Wake dispatcher stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{MockWakeFacility, WakeTrigger};
    use mockall::predicate::eq;
    use tokio::sync::mpsc;

    fn one_shot(id: i64) -> WakePayload {
        WakePayload {
            id,
            kind: AlarmKind::OneShot,
            interval_millis: None,
            label: "Tea".to_string(),
        }
    }

    fn recurring(id: i64, interval: i64) -> WakePayload {
        WakePayload {
            id,
            kind: AlarmKind::Recurring,
            interval_millis: Some(interval),
            label: "Hydrate".to_string(),
        }
    }

    fn handler(
        facility: MockWakeFacility,
        effects: MockAlarmSideEffects,
    ) -> (WakeHandler, mpsc::UnboundedReceiver<FireCompletion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = WakeHandler::new(
            WakeScheduler::new(Arc::new(facility)),
            Arc::new(effects),
            tx,
        );
        (handler, rx)
    }

    #[test]
    fn test_one_shot_fire_cancels_and_completes() {
        let mut facility = MockWakeFacility::new();
        facility.expect_cancel().with(eq(1)).times(1).returning(|_| Ok(()));
        let mut effects = MockAlarmSideEffects::new();
        effects.expect_start().with(eq("Tea")).times(1).returning(|_| Ok(()));

        let (handler, mut rx) = handler(facility, effects);
        handler.handle(WakeIntent::fire(one_shot(1)));

        assert_eq!(rx.try_recv().unwrap(), FireCompletion::one_shot(1));
        assert!(!handler.wake_lock().is_held());
    }

    #[test]
    fn test_recurring_fire_rearms_before_completing() {
        let mut facility = MockWakeFacility::new();
        facility
            .expect_set_exact_and_allow_while_idle()
            .with(
                eq(2),
                eq(WakeTrigger::Elapsed { after: Duration::from_millis(5_000) }),
                eq(recurring(2, 5_000)),
            )
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut effects = MockAlarmSideEffects::new();
        effects.expect_start().returning(|_| Ok(()));

        let (handler, mut rx) = handler(facility, effects);
        handler.handle(WakeIntent::fire(recurring(2, 5_000)));

        assert_eq!(rx.try_recv().unwrap(), FireCompletion::recurring(2, 5_000));
    }

    #[test]
    fn test_side_effect_failure_does_not_block_rescheduling() {
        let mut facility = MockWakeFacility::new();
        facility
            .expect_set_exact_and_allow_while_idle()
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut effects = MockAlarmSideEffects::new();
        effects
            .expect_start()
            .returning(|_| Err(AppError::audio("no output device")));

        let (handler, mut rx) = handler(facility, effects);
        handler.handle(WakeIntent::fire(recurring(3, 1_000)));

        assert_eq!(rx.try_recv().unwrap(), FireCompletion::recurring(3, 1_000));
    }

    struct PanickingRinger;

    impl AlarmSideEffects for PanickingRinger {
        fn start(&self, _: &str) -> AppResult<()> {
            panic!("speaker on fire")
        }

        fn stop(&self) -> AppResult<()> {
            panic!("speaker still on fire")
        }
    }

    #[test]
    fn test_side_effect_panic_does_not_block_completion() {
        let mut facility = MockWakeFacility::new();
        facility.expect_cancel().times(1).returning(|_| Ok(()));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = WakeHandler::new(
            WakeScheduler::new(Arc::new(facility)),
            Arc::new(PanickingRinger),
            tx,
        );
        handler.handle(WakeIntent::fire(one_shot(4)));
        handler.handle(WakeIntent::stop());

        assert_eq!(rx.try_recv().unwrap(), FireCompletion::one_shot(4));
        assert!(!handler.wake_lock().is_held());
    }

    #[test]
    fn test_stop_leaves_scheduling_alone() {
        let mut facility = MockWakeFacility::new();
        facility.expect_cancel().never();
        facility.expect_set_exact_and_allow_while_idle().never();
        let mut effects = MockAlarmSideEffects::new();
        effects.expect_stop().times(1).returning(|| Ok(()));
        effects.expect_start().never();

        let (handler, mut rx) = handler(facility, effects);
        handler.handle(WakeIntent::stop());

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_recurring_without_interval_is_dropped() {
        let mut facility = MockWakeFacility::new();
        facility.expect_set_exact_and_allow_while_idle().never();
        let mut effects = MockAlarmSideEffects::new();
        effects.expect_start().returning(|_| Ok(()));

        let (handler, mut rx) = handler(facility, effects);
        let mut payload = recurring(5, 1_000);
        payload.interval_millis = None;
        handler.handle(WakeIntent::fire(payload));

        assert!(rx.try_recv().is_err());
        assert!(!handler.wake_lock().is_held());
    }

    #[test]
    fn test_closed_completion_channel_is_tolerated() {
        let mut facility = MockWakeFacility::new();
        facility.expect_cancel().returning(|_| Ok(()));
        let mut effects = MockAlarmSideEffects::new();
        effects.expect_start().returning(|_| Ok(()));

        let (handler, rx) = handler(facility, effects);
        drop(rx);
        handler.handle(WakeIntent::fire(one_shot(6)));
    }

    #[tokio::test]
    async fn test_dispatcher_stops_on_shutdown() {
        let mut effects = MockAlarmSideEffects::new();
        effects.expect_stop().times(1).returning(|| Ok(()));
        let (handler, _rx) = handler(MockWakeFacility::new(), effects);

        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let task = spawn_dispatcher(Arc::new(handler), rx, shutdown.clone());

        tx.send(WakeIntent::stop()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
