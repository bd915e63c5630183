//! Scheduling of rain checks for one engine.
//!
//! All scans run on the monitor's own task, one at a time. Periodic
//! ticks, inbound triggers, and follow-up rescans funnel into that task;
//! triggers that pile up while a scan is running collapse into a single
//! follow-up scan.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::config::TimingConfig;
use common::RainState;
use forecast_source::RainSource;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::engine::RainEngine;

const TRIGGER_QUEUE: usize = 16;

/// Why a scan was requested outside the periodic schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// External "check now" request. Always publishes.
    Manual,
    /// A previously predicted transition is due.
    FollowUp { offset_minutes: u32 },
}

impl Trigger {
    fn forces_emission(self) -> bool {
        matches!(self, Trigger::Manual)
    }
}

/// Cloneable handle for requesting an immediate scan.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<Trigger>,
}

impl TriggerHandle {
    /// Request a scan. Returns false if the monitor has stopped.
    pub fn trigger_now(&self) -> bool {
        match self.tx.try_send(Trigger::Manual) {
            Ok(()) => true,
            // A full queue already guarantees a pending scan.
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// One-shot rescans keyed by the slot offset they were scheduled for.
#[derive(Debug, Default)]
pub struct FollowUps {
    tasks: BTreeMap<u32, JoinHandle<()>>,
}

impl FollowUps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_scheduled(&self, offset_minutes: u32) -> bool {
        self.tasks.contains_key(&offset_minutes)
    }

    /// Send `Trigger::FollowUp` on `tx` once `at` is reached. Replaces any
    /// task already scheduled for the same offset.
    pub fn schedule(&mut self, offset_minutes: u32, at: DateTime<Utc>, tx: mpsc::Sender<Trigger>) {
        let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let _ = tx.send(Trigger::FollowUp { offset_minutes }).await;
        });
        if let Some(previous) = self.tasks.insert(offset_minutes, handle) {
            previous.abort();
        }
        debug!("follow-up scan scheduled for +{}m in {:?}", offset_minutes, wait);
    }

    /// Forget a task that has fired.
    pub fn complete(&mut self, offset_minutes: u32) {
        self.tasks.remove(&offset_minutes);
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in std::mem::take(&mut self.tasks) {
            handle.abort();
        }
    }
}

impl Drop for FollowUps {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Drives one [`RainEngine`]: startup scan, periodic scans, triggers.
pub struct RainMonitor<R, A> {
    engine: RainEngine<R, A>,
    period: Option<Duration>,
    startup_delay: Duration,
    followups: FollowUps,
    trigger_tx: mpsc::Sender<Trigger>,
    trigger_rx: mpsc::Receiver<Trigger>,
}

impl<R: RainSource, A: RainSource> RainMonitor<R, A> {
    pub fn new(engine: RainEngine<R, A>, timing: &TimingConfig) -> Self {
        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE);
        let period = match timing.rain_check_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            engine,
            period,
            startup_delay: Duration::from_secs(timing.startup_delay_secs),
            followups: FollowUps::new(),
            trigger_tx,
            trigger_rx,
        }
    }

    pub fn trigger_handle(&self) -> TriggerHandle {
        TriggerHandle {
            tx: self.trigger_tx.clone(),
        }
    }

    pub fn followups(&self) -> &FollowUps {
        &self.followups
    }

    /// Run until `shutdown` flips (or its sender is dropped).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tokio::select! {
            _ = tokio::time::sleep(self.startup_delay) => {}
            _ = shutdown.changed() => return,
        }

        // First boot always publishes.
        self.scan(true).await;

        let mut ticker = self.period.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("rain monitor shutting down");
                    break;
                }
                _ = next_tick(&mut ticker) => {
                    self.scan(false).await;
                }
                Some(trigger) = self.trigger_rx.recv() => {
                    let force = self.absorb(trigger);
                    self.scan(force).await;
                }
            }
        }

        self.followups.cancel_all();
    }

    /// Collapse `first` and everything already queued into one scan request.
    fn absorb(&mut self, first: Trigger) -> bool {
        let mut force = false;
        let mut next = Some(first);
        while let Some(trigger) = next {
            debug!("trigger received: {:?}", trigger);
            force |= trigger.forces_emission();
            if let Trigger::FollowUp { offset_minutes } = trigger {
                self.followups.complete(offset_minutes);
            }
            next = self.trigger_rx.try_recv().ok();
        }
        force
    }

    /// One scan; reschedules follow-ups when a new state goes out.
    pub async fn scan(&mut self, force: bool) -> Option<RainState> {
        self.scan_at(Utc::now(), force).await
    }

    pub async fn scan_at(&mut self, now: DateTime<Utc>, force: bool) -> Option<RainState> {
        let published = self.engine.check_rain_at(now, force).await?;
        self.reschedule(&published);
        Some(published)
    }

    fn reschedule(&mut self, state: &RainState) {
        self.followups.cancel_all();
        if state.expects_change() {
            self.followups.schedule(
                state.predicted.offset_minutes,
                state.predicted.time,
                self.trigger_tx.clone(),
            );
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
