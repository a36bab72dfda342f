//! # sculpt-orchestrator
//!
//! Pipeline engine for sculpt.
//!
//! This crate provides:
//! - A pure state machine describing phase order and bounds
//! - Bounded retry with fixed backoff around collaborator calls
//! - Monotonic progress reporting
//! - The [`Orchestrator`] that drives one prompt from analysis to artifact

mod orchestrator;
mod progress;
mod retry;
mod state_machine;

pub use orchestrator::{Collaborators, Orchestrator};
pub use progress::{ProgressCallback, ProgressReporter};
pub use retry::{execute_bounded, execute_with_retry, RetryPolicy};
pub use state_machine::{transition, Action, Event, State, Step};
