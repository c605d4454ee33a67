//! Scoped wake assertions.
//!
//! A [`WakeLockGuard`] keeps the device awake until it is dropped or until its timeout
//! elapses, whichever comes first. Releasing twice is harmless.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Default safety net for a single wake assertion.
pub const DEFAULT_WAKE_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct WakeLock {
    tag: &'static str,
    held: Arc<AtomicUsize>,
}

impl WakeLock {
    pub fn new(tag: &'static str) -> Self {
        Self {
            tag,
            held: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst) > 0
    }

    /// Number of outstanding assertions.
    pub fn held_count(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    pub fn acquire(&self, timeout: Duration) -> WakeLockGuard {
        self.held.fetch_add(1, Ordering::SeqCst);
        debug!("Wake lock '{}' acquired", self.tag);

        let released = Arc::new(AtomicBool::new(false));
        let timer = Handle::try_current().ok().map(|runtime| {
            let released = released.clone();
            let held = self.held.clone();
            let tag = self.tag;
            runtime.spawn(async move {
                tokio::time::sleep(timeout).await;
                if release(&released, &held) {
                    warn!("Wake lock '{}' released by {:?} timeout", tag, timeout);
                }
            })
        });

        WakeLockGuard {
            tag: self.tag,
            held: self.held.clone(),
            released,
            timer,
        }
    }
}

fn release(released: &AtomicBool, held: &AtomicUsize) -> bool {
    if released.swap(true, Ordering::SeqCst) {
        return false;
    }
    held.fetch_sub(1, Ordering::SeqCst);
    true
}

#[must_use = "the wake lock is released when the guard is dropped"]
pub struct WakeLockGuard {
    tag: &'static str,
    held: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
    timer: Option<JoinHandle<()>>,
}

impl WakeLockGuard {
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for WakeLockGuard {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if release(&self.released, &self.held) {
            debug!("Wake lock '{}' released", self.tag);
        }
    }
}
