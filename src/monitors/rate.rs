//! Rate derivation from cumulative network counters
//!
//! Operating systems report bytes sent and received as ever-growing counters.
//! `RateSampler` keeps the previous reading per interface and turns two
//! consecutive readings into MB/s.
//!
//! ```text
//! rate = (current.bytes - previous.bytes) / elapsed_seconds / 1_048_576
//! ```
//!
//! A counter that went backwards (interface reset or wrap) contributes a zero
//! delta. Interfaces seen for the first time contribute nothing until their
//! second reading.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};

use crate::util::{BYTES_PER_MB, round2};

/// One reading of an interface's cumulative byte counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSample {
    pub interface: String,
    pub sent_bytes: u64,
    pub received_bytes: u64,
    pub captured_at: DateTime<Utc>,
}

/// Upload and download speed of one interface in MB/s
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InterfaceRate {
    pub upload: f64,
    pub download: f64,
}

/// Output of one `RateSampler::sample` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkRates {
    pub per_interface: BTreeMap<String, InterfaceRate>,

    /// Sum over all interfaces in MB/s
    pub upload_total: f64,

    /// Sum over all interfaces in MB/s
    pub download_total: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RateError {
    /// The new batch is not later than the stored baseline
    DegenerateInterval { elapsed_secs: f64 },
}

impl fmt::Display for RateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateError::DegenerateInterval { elapsed_secs } => {
                write!(f, "degenerate sampling interval of {elapsed_secs}s")
            }
        }
    }
}

impl std::error::Error for RateError {}

/// Converts successive counter readings into per-interval rates
#[derive(Debug, Default)]
pub struct RateSampler {
    previous: HashMap<String, CounterSample>,
    previous_at: Option<DateTime<Utc>>,
}

impl RateSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive rates against the previous call and store `current` as the new baseline.
    ///
    /// The batch time is the latest `captured_at` in `current`. The baseline is
    /// replaced even when the call fails.
    pub fn sample(
        &mut self,
        current: HashMap<String, CounterSample>,
    ) -> Result<NetworkRates, RateError> {
        let batch_at = current.values().map(|s| s.captured_at).max();
        let previous_at = self.previous_at;

        let previous = std::mem::replace(&mut self.previous, current);
        // an empty batch keeps the old clock so the next non-empty batch measures against it
        if batch_at.is_some() {
            self.previous_at = batch_at;
        }

        let (Some(previous_at), Some(batch_at)) = (previous_at, batch_at) else {
            return Ok(NetworkRates::default());
        };

        let elapsed_secs = (batch_at - previous_at).num_milliseconds() as f64 / 1000.0;
        if elapsed_secs <= 0.0 {
            return Err(RateError::DegenerateInterval { elapsed_secs });
        }

        let mut rates = NetworkRates::default();
        let mut sent_total: u64 = 0;
        let mut received_total: u64 = 0;

        for (name, now) in &self.previous {
            let Some(before) = previous.get(name) else {
                continue;
            };

            let sent = now.sent_bytes.saturating_sub(before.sent_bytes);
            let received = now.received_bytes.saturating_sub(before.received_bytes);
            sent_total = sent_total.saturating_add(sent);
            received_total = received_total.saturating_add(received);

            rates.per_interface.insert(
                name.clone(),
                InterfaceRate {
                    upload: to_rate(sent, elapsed_secs),
                    download: to_rate(received, elapsed_secs),
                },
            );
        }

        rates.upload_total = to_rate(sent_total, elapsed_secs);
        rates.download_total = to_rate(received_total, elapsed_secs);
        Ok(rates)
    }
}

/// MB/s for `bytes` transferred over `elapsed_secs`, rounded to two decimals
pub fn to_rate(bytes: u64, elapsed_secs: f64) -> f64 {
    round2(bytes as f64 / elapsed_secs / BYTES_PER_MB)
}

/// Key a batch of readings by interface name
pub fn by_interface(samples: Vec<CounterSample>) -> HashMap<String, CounterSample> {
    samples
        .into_iter()
        .map(|s| (s.interface.clone(), s))
        .collect()
}
