//! The one place an enrollment moves to its next step.
//!
//! Enrollment, post-send scheduling, and task resumption (from the scan or
//! from `complete_task`) all go through `advance`, so there is a single
//! scheduling rule: next step due `delay_days` after `base`, or completion.
use super::SequenceEngine;
use crate::error::{EngineError, EngineResult};
use crate::model::{Enrollment, EnrollmentStatus, SequenceTemplate, Task, DAY_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Advanced {
    Scheduled { next_action_at: u64 },
    Completed,
}

/// Schedule the step at `current_step_index` relative to `base`, or
/// complete the enrollment when no step is left.
pub(super) fn advance(
    enrollment: &mut Enrollment,
    sequence: &SequenceTemplate,
    base: u64,
    now: u64,
) -> Advanced {
    match sequence.steps.get(enrollment.current_step_index) {
        Some(step) => {
            let delay = u64::from(step.delay_days()).saturating_mul(DAY_MS);
            let next_action_at = base.saturating_add(delay);
            enrollment.status = EnrollmentStatus::Active;
            enrollment.next_action_at = Some(next_action_at);
            enrollment.waiting_task_id = None;
            enrollment.updated_at = now;
            Advanced::Scheduled { next_action_at }
        }
        None => {
            enrollment.mark_completed(now);
            Advanced::Completed
        }
    }
}

#[derive(Debug)]
pub(super) enum Resumption {
    StillWaiting,
    Scheduled { next_action_at: u64 },
    Completed,
    ForceStopped(EngineError),
}

impl SequenceEngine {
    /// Resume an enrollment parked on `task` once the task is done.
    ///
    /// The next step's delay counts from the task's completion time.
    pub(super) fn resume_from_task(
        &self,
        enrollment: &mut Enrollment,
        task: &Task,
        now: u64,
    ) -> EngineResult<Resumption> {
        if !task.is_done() {
            return Ok(Resumption::StillWaiting);
        }
        let templates = self.templates();
        let Ok(sequence) = templates.resolve_sequence(&enrollment.sequence_id) else {
            let detail = format!(
                "sequence {} no longer exists for enrollment {}",
                enrollment.sequence_id, enrollment.id
            );
            let violation = self.force_stop(enrollment, "sequence_missing", detail, now)?;
            return Ok(Resumption::ForceStopped(violation));
        };
        let base = task.completed_at.unwrap_or(now);
        let advanced = advance(enrollment, sequence, base, now);
        self.sequences.save_enrollment(enrollment)?;
        tracing::info!(
            enrollment_id = %enrollment.id,
            task_id = %task.id,
            step_index = enrollment.current_step_index,
            "resumed enrollment after task"
        );
        match advanced {
            Advanced::Scheduled { next_action_at } => Ok(Resumption::Scheduled { next_action_at }),
            Advanced::Completed => {
                self.release_contact(&enrollment.contact_id, &enrollment.id)?;
                Ok(Resumption::Completed)
            }
        }
    }
}
