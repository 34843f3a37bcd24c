//! Shared data model for contacts, sequences, enrollments, and tasks.
//!
//! These types mirror the persisted JSON records so every store backend and
//! the CLI agree on one schema.
mod contact;
mod sequence;

pub use contact::{Contact, Interaction, InteractionKind, Stage};
pub use sequence::{
    Enrollment, EnrollmentStatus, EventOutcome, MessageTemplate, SequenceTemplate, StepDef,
    StepEvent, StepKind, Task, TaskStatus,
};

/// Milliseconds in one day; step delays are expressed in whole days.
pub const DAY_MS: u64 = 86_400_000;

/// Whole days elapsed between two epoch-ms timestamps, saturating at zero.
pub fn days_between(earlier: u64, later: u64) -> u64 {
    later.saturating_sub(earlier) / DAY_MS
}
