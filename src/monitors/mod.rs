//! Host sampling and the pure decisions built on top of it
//!
//! - `rate`: cumulative counters to MB/s
//! - `system`: CPU, memory, disk and network snapshots through a `SystemProbe`
//! - `thresholds`: the alert transition table
//! - `service`: TCP and HTTP reachability checks

pub mod rate;
pub mod service;
pub mod system;
pub mod thresholds;
