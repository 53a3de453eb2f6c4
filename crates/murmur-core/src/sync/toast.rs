//! Self-expiring transient notifications
//!
//! At most one notification is visible. Showing a new one cancels the
//! pending expiry of the previous one and schedules its own.

use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Debug)]
pub(crate) struct Toasts {
    duration: Duration,
    generation: u64,
    current: Option<String>,
    timer: Option<JoinHandle<()>>,
}

impl Toasts {
    pub(crate) fn new(duration: Duration) -> Self {
        Self {
            duration,
            generation: 0,
            current: None,
            timer: None,
        }
    }

    /// Show `message`; `expire` is called with the returned generation once
    /// the duration has elapsed, unless superseded first
    pub(crate) fn show<F>(&mut self, message: impl Into<String>, expire: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel_timer();
        self.generation += 1;
        self.current = Some(message.into());

        let generation = self.generation;
        let duration = self.duration;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            expire(generation);
        }));

        generation
    }

    /// Expire the notification of `generation`
    ///
    /// Returns false if a newer notification replaced it in the meantime.
    pub(crate) fn expire(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.current.is_none() {
            return false;
        }
        self.current = None;
        self.timer = None;
        true
    }

    /// Hide the current notification and cancel its expiry
    pub(crate) fn dismiss(&mut self) -> bool {
        self.cancel_timer();
        self.current.take().is_some()
    }

    pub(crate) fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for Toasts {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
