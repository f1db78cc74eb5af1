//! Actor-based monitoring pipeline
//!
//! The hub process runs one broadcast actor and a scheduler that drives the
//! periodic jobs. Every job owns its collectors and talks to the outside
//! world through an injected storage backend and a cloneable `HubHandle`.
//!
//! ## Architecture Overview
//!
//! ```text
//!                  ┌──────────────┐
//!                  │  Scheduler   │ one task + timer per cadence entry
//!                  └──────┬───────┘
//!       ┌─────────┬───────┼─────────┬───────────┬───────────┐
//!       ▼         ▼       ▼         ▼           ▼           ▼
//!   metrics   services   disk    network     log push   retention
//!       │         │                              │
//!       │ AlertEvaluator                         │
//!       ▼         ▼                              ▼
//!  ┌─────────────────────────────────────────────────┐
//!  │                  HubActor                       │ subscriber set
//!  └───────────────────────┬─────────────────────────┘
//!                          │ try_send
//!                ┌─────────┼─────────┐
//!                ▼         ▼         ▼
//!            WebSocket  WebSocket  WebSocket
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: the hub has an unbounded mpsc command channel
//! 2. **Fan-out**: one bounded queue per subscriber, never awaited by the hub
//! 3. **Request/Response**: oneshot channels for queries

pub mod hub;
pub mod jobs;
pub mod messages;
pub mod scheduler;
