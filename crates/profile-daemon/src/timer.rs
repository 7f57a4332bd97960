//! Recurring timer with a single cancellable handle.
//!
//! Each `start` spawns one task that sends an event into the core loop every
//! period. Events carry the generation they were started under; `stop` aborts
//! the task and bumps the generation, so a tick that was already queued when
//! the timer stopped is recognised as stale and dropped.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::core::DaemonEvent;

#[derive(Debug, Default)]
pub struct Ticker {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl Ticker {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)start the timer. The first event fires one full `period` from now.
    pub fn start<F>(&mut self, period: Duration, tx: mpsc::Sender<DaemonEvent>, make_event: F)
    where
        F: Fn(u64) -> DaemonEvent + Send + 'static,
    {
        self.stop();
        let generation = self.generation;
        self.handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(make_event(generation)).await.is_err() {
                    break;
                }
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.generation += 1;
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Whether an event stamped with `generation` came from the live timer.
    pub fn is_current(&self, generation: u64) -> bool {
        self.handle.is_some() && generation == self.generation
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
