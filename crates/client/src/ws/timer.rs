//! Single-owner cancelable timers.
//!
//! A [`TimerSlot`] holds at most one live timer. Starting a new timer aborts
//! the previous one, and dropping the slot aborts whatever is pending, so a
//! timer can never outlive or duplicate its owner.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{abortable, AbortHandle};

use crate::runtime::{self, MaybeSend};
use crate::util::lock;

struct ActiveTimer {
    abort: AbortHandle,
    finished: Arc<AtomicBool>,
}

impl ActiveTimer {
    fn is_live(&self) -> bool {
        !self.finished.load(Ordering::SeqCst)
    }
}

/// Slot owning at most one pending timer.
pub struct TimerSlot {
    name: &'static str,
    current: Mutex<Option<ActiveTimer>>,
}

impl TimerSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            current: Mutex::new(None),
        }
    }

    /// Run `action` once after `delay`, replacing any pending timer.
    ///
    /// Once the delay elapses the action runs as its own task, so cancelling
    /// the slot afterwards does not interrupt it.
    pub fn once<F, Fut>(&self, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + MaybeSend + 'static,
        Fut: Future<Output = ()> + MaybeSend + 'static,
    {
        let finished = Arc::new(AtomicBool::new(false));
        let done = finished.clone();
        let (task, abort) = abortable(async move {
            runtime::sleep(delay).await;
            done.store(true, Ordering::SeqCst);
            runtime::spawn(action());
        });
        self.install(ActiveTimer { abort, finished });
        runtime::spawn(async move {
            let _ = task.await;
        });
    }

    /// Call `tick` every `period` until cancelled, replacing any pending timer.
    pub fn every<F>(&self, period: Duration, tick: F)
    where
        F: Fn() + MaybeSend + 'static,
    {
        let finished = Arc::new(AtomicBool::new(false));
        let (task, abort) = abortable(async move {
            loop {
                runtime::sleep(period).await;
                tick();
            }
        });
        self.install(ActiveTimer { abort, finished });
        runtime::spawn(async move {
            let _ = task.await;
        });
    }

    fn install(&self, timer: ActiveTimer) {
        let previous = lock(&self.current).replace(timer);
        if let Some(previous) = previous {
            if previous.is_live() {
                crate::log_debug!("{} timer superseded", self.name);
            }
            previous.abort.abort();
        }
    }

    /// Abort the pending timer. Returns whether one was still waiting.
    pub fn cancel(&self) -> bool {
        match lock(&self.current).take() {
            Some(timer) => {
                let was_live = timer.is_live();
                timer.abort.abort();
                timer.finished.store(true, Ordering::SeqCst);
                was_live
            }
            None => false,
        }
    }

    /// Whether a timer is waiting to fire
    pub fn is_active(&self) -> bool {
        lock(&self.current)
            .as_ref()
            .map(ActiveTimer::is_live)
            .unwrap_or(false)
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for TimerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerSlot")
            .field("name", &self.name)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_keeps_exactly_one_timer() {
        let slot = TimerSlot::new("test");
        let fired = counter();
        let which = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let fired = fired.clone();
            let which = which.clone();
            slot.once(Duration::from_millis(100), move || async move {
                fired.fetch_add(1, Ordering::SeqCst);
                which.lock().unwrap().push(i);
            });
        }
        assert!(slot.is_active());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(*which.lock().unwrap(), vec![4]);
        assert!(!slot.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let slot = TimerSlot::new("test");
        let fired = counter();
        let f = fired.clone();
        slot.once(Duration::from_millis(100), move || async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(slot.cancel());
        assert!(!slot.cancel());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_ticks_until_cancelled() {
        let slot = TimerSlot::new("keepalive");
        let ticks = counter();
        let t = ticks.clone();
        slot.every(Duration::from_millis(100), move || {
            t.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        slot.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_slot_aborts_the_timer() {
        let fired = counter();
        {
            let slot = TimerSlot::new("test");
            let f = fired.clone();
            slot.once(Duration::from_millis(100), move || async move {
                f.fetch_add(1, Ordering::SeqCst);
            });
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
