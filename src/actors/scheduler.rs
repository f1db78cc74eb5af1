//! Scheduler - Drives the periodic jobs
//!
//! Every cadence entry gets its own task and timer, so a slow or failing job
//! cannot starve the others. A job runs inline on its task: the next tick is
//! only awaited once the current run has finished, and ticks missed in the
//! meantime are skipped.
//!
//! ## Message Flow
//!
//! ```text
//! timer tick ──> job.run() ──> (store, hub)
//!     ↑
//!     └─── shutdown signal (watch channel) ends the loop after the current run
//! ```

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveTime, TimeZone};
use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep, timeout};
use tracing::{Instrument, debug, info, info_span, warn};

/// A unit of periodic work
#[async_trait]
pub trait ScheduledJob: Send {
    fn name(&self) -> &'static str;

    /// Perform one run; failures are handled and logged by the job itself
    async fn run(&mut self);
}

/// When a job fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Fixed period, first run immediately
    Every(Duration),

    /// Once a day at a local wall-clock time
    DailyAt(NaiveTime),
}

impl Cadence {
    pub fn daily_at_hour(hour: u32) -> Result<Self> {
        let at = NaiveTime::from_hms_opt(hour, 0, 0)
            .ok_or_else(|| anyhow::anyhow!("invalid hour of day: {hour}"))?;
        Ok(Cadence::DailyAt(at))
    }
}

/// First instant strictly after `now` whose local time is `at`
pub fn next_occurrence<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();

    // a day whose `at` falls into a DST gap has no occurrence, try the next one
    for offset in 0..=2 {
        let Some(day) = now.date_naive().checked_add_days(chrono::Days::new(offset)) else {
            break;
        };
        if let Some(candidate) = tz.from_local_datetime(&day.and_time(at)).earliest() {
            if candidate > *now {
                return candidate;
            }
        }
    }

    now.clone() + chrono::Duration::days(1)
}

/// Cadence table under construction
#[derive(Default)]
pub struct Scheduler {
    entries: Vec<(Cadence, Box<dyn ScheduledJob>)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, cadence: Cadence, job: impl ScheduledJob + 'static) -> Self {
        self.entries.push((cadence, Box::new(job)));
        self
    }

    pub fn entries(&self) -> impl Iterator<Item = (&'static str, Cadence)> + '_ {
        self.entries.iter().map(|(cadence, job)| (job.name(), *cadence))
    }

    /// Start one task per entry
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tasks = self
            .entries
            .into_iter()
            .map(|(cadence, job)| {
                let span = info_span!("job", name = job.name());
                tokio::spawn(run_entry(cadence, job, shutdown_rx.clone()).instrument(span))
            })
            .collect();

        SchedulerHandle { shutdown_tx, tasks }
    }
}

async fn run_entry(
    cadence: Cadence,
    mut job: Box<dyn ScheduledJob>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("starting with cadence {cadence:?}");

    match cadence {
        Cadence::Every(period) => {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => job.run().await,
                }
            }
        }

        Cadence::DailyAt(at) => loop {
            let now = Local::now();
            let next = next_occurrence(&now, at);
            let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!("next run at {next}");

            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = sleep(delay) => job.run().await,
            }
        },
    }

    debug!("stopped");
}

/// Running scheduler; dropping it also stops every entry after its current run
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop all timers and wait up to `grace` for in-flight runs before aborting them
    pub async fn shutdown(self, grace: Duration) {
        let _ = self.shutdown_tx.send(true);

        let aborts: Vec<_> = self.tasks.iter().map(|t| t.abort_handle()).collect();

        match timeout(grace, join_all(self.tasks)).await {
            Ok(_) => info!("scheduler stopped"),
            Err(_) => {
                warn!("jobs still running after {grace:?}, aborting");
                for abort in aborts {
                    abort.abort();
                }
            }
        }
    }
}
