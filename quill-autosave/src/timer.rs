//! Single-slot cancellable timer.
//!
//! A [`TimerSlot`] owns at most one pending task. Arming always cancels the
//! previous task first, so a slot can never have two timers in flight.
//! Every arm bumps a generation counter; the fired task passes its
//! generation back through [`TimerSlot::claim`] and bails out if the slot
//! has been re-armed or cancelled in the meantime.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

pub(crate) struct TimerSlot {
    label: &'static str,
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    pub(crate) fn new(label: &'static str) -> Self {
        Self {
            label,
            generation: 0,
            handle: None,
        }
    }

    /// Cancel any pending task, then run `callback(generation)` after `delay`.
    pub(crate) fn arm<F, Fut>(&mut self, delay: Duration, callback: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let label = self.label;
        log::debug!("{label} timer armed for {}ms", delay.as_millis());
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            log::debug!("{label} timer fired (generation {generation})");
            callback(generation).await;
        }));
        generation
    }

    /// Abort the pending task. Returns whether one was pending.
    pub(crate) fn cancel(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                log::debug!("{} timer cancelled", self.label);
                true
            }
            None => false,
        }
    }

    /// Release the slot from inside the fired task.
    ///
    /// Returns `false` when `generation` is stale, in which case the caller
    /// must do nothing.
    pub(crate) fn claim(&mut self, generation: u64) -> bool {
        if self.handle.is_some() && self.generation == generation {
            // Detach rather than abort: the caller is this very task.
            self.handle = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
