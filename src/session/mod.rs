//! Export session state machine
//!
//! ```text
//! Idle ──start──▶ Capturing ──stop──▶ Processing ──▶ Done
//!                     │                    │
//!                     └──frame cap──▶ Error ◀──failure
//! ```
//!
//! `reset` returns to `Idle` from any phase. Only one export can be active at
//! a time; the [`SessionManager`] owns it and hands out a [`SessionToken`].

mod export;
mod manager;
mod phase;

pub use export::{ExportRequest, ExportSession, SessionSnapshot, SessionToken};
pub use manager::SessionManager;
pub use phase::{Phase, ProgressPlan};
