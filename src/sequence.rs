//! Sequence engine: enrollment lifecycle and the due-step scan.
//!
//! All state lives behind the `ContactStore`/`SequenceStore` seams. Two locks
//! order the work: `run_lock` keeps `process_due_steps` from overlapping with
//! itself, and `write_lock` serializes every enrollment mutation so `stop`
//! and `complete_task` never interleave with a step of the same enrollment.
mod advance;
mod tick;

pub use tick::{RunMode, TickIssue, TickOptions, TickReport};

use crate::dispatch::ActionDispatcher;
use crate::error::{EngineError, EngineResult, EntityKind};
use crate::governor::ThroughputGovernor;
use crate::model::{Contact, Enrollment, EnrollmentStatus, Interaction, TaskStatus};
use crate::store::{ContactStore, SequenceStore};
use crate::templates::TemplateRegistry;
use advance::{advance, Advanced, Resumption};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Result of `complete_task`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskCompletion {
    pub task_id: String,
    /// False when the task was already done and nothing changed.
    pub newly_completed: bool,
    pub resumed: Vec<String>,
    pub completed: Vec<String>,
}

/// Result of `record_interaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedInteraction {
    pub contact: Contact,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_enrollment: Option<String>,
}

pub struct SequenceEngine {
    contacts: Arc<dyn ContactStore>,
    sequences: Arc<dyn SequenceStore>,
    templates: RwLock<Arc<TemplateRegistry>>,
    dispatcher: Arc<dyn ActionDispatcher>,
    governor: Arc<ThroughputGovernor>,
    sending_enabled: bool,
    auto_enroll_sequence: Option<String>,
    run_lock: Mutex<()>,
    write_lock: Mutex<()>,
}

fn guard(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn new_enrollment_id() -> String {
    format!("enr-{}", uuid::Uuid::new_v4().simple())
}

impl SequenceEngine {
    pub fn new(
        contacts: Arc<dyn ContactStore>,
        sequences: Arc<dyn SequenceStore>,
        templates: Arc<TemplateRegistry>,
        dispatcher: Arc<dyn ActionDispatcher>,
        governor: Arc<ThroughputGovernor>,
    ) -> Self {
        Self {
            contacts,
            sequences,
            templates: RwLock::new(templates),
            dispatcher,
            governor,
            sending_enabled: false,
            auto_enroll_sequence: None,
            run_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
        }
    }

    /// Global switch gating `RunMode::Send`.
    pub fn with_sending_enabled(mut self, enabled: bool) -> Self {
        self.sending_enabled = enabled;
        self
    }

    /// Sequence applied to contacts created through `add_contact`.
    pub fn with_auto_enroll(mut self, sequence_id: Option<String>) -> Self {
        self.auto_enroll_sequence = sequence_id;
        self
    }

    pub fn governor(&self) -> &ThroughputGovernor {
        &self.governor
    }

    /// Current registry snapshot. In-flight enrollments resolve against
    /// whatever registry is current when their next step runs.
    pub fn templates(&self) -> Arc<TemplateRegistry> {
        let templates = self.templates.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&templates)
    }

    pub fn replace_templates(&self, registry: TemplateRegistry) {
        let mut templates = self.templates.write().unwrap_or_else(PoisonError::into_inner);
        *templates = Arc::new(registry);
    }

    fn load_contact(&self, contact_id: &str) -> EngineResult<Contact> {
        self.contacts
            .get(contact_id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Contact, contact_id))
    }

    fn load_enrollment(&self, enrollment_id: &str) -> EngineResult<Enrollment> {
        self.sequences
            .get_enrollment(enrollment_id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Enrollment, enrollment_id))
    }

    /// Create a contact and apply the auto-enroll sequence, if configured.
    pub fn add_contact(&self, contact: Contact, now: u64) -> EngineResult<(Contact, Option<Enrollment>)> {
        let enrollment = {
            let _write = guard(&self.write_lock);
            if self.contacts.get(&contact.id)?.is_some() {
                return Err(EngineError::InvariantViolation(format!(
                    "contact {} already exists",
                    contact.id
                )));
            }
            self.contacts.save(&contact)?;
            tracing::info!(contact_id = %contact.id, stage = %contact.stage, "added contact");
            match self.auto_enroll_sequence.as_deref() {
                Some(sequence_id) if !contact.opted_out => {
                    Some(self.enroll_locked(&contact.id, sequence_id, now)?)
                }
                _ => None,
            }
        };
        let contact = self.load_contact(&contact.id)?;
        Ok((contact, enrollment))
    }

    /// Enroll a contact in a sequence.
    ///
    /// Re-enrolling in the same sequence while an enrollment is still open
    /// returns that enrollment. An open enrollment in a different sequence is
    /// `AlreadyEnrolled`.
    pub fn enroll(&self, contact_id: &str, sequence_id: &str, now: u64) -> EngineResult<Enrollment> {
        let _write = guard(&self.write_lock);
        self.enroll_locked(contact_id, sequence_id, now)
    }

    fn enroll_locked(&self, contact_id: &str, sequence_id: &str, now: u64) -> EngineResult<Enrollment> {
        let contact = self.load_contact(contact_id)?;
        let templates = self.templates();
        let sequence = templates.resolve_sequence(sequence_id)?;

        let open: Vec<Enrollment> = self
            .sequences
            .enrollments_for_contact(contact_id)?
            .into_iter()
            .filter(|enrollment| !enrollment.is_terminal())
            .collect();
        if let Some(existing) = open.iter().find(|enrollment| enrollment.sequence_id == sequence_id) {
            if contact.active_enrollment.as_deref() != Some(existing.id.as_str()) {
                self.point_contact_at(contact_id, &existing.id)?;
            }
            tracing::debug!(contact_id, enrollment_id = %existing.id, "already enrolled");
            return Ok(existing.clone());
        }
        if let Some(other) = open.first() {
            return Err(EngineError::AlreadyEnrolled {
                contact_id: contact_id.to_string(),
                enrollment_id: other.id.clone(),
            });
        }

        let mut enrollment = Enrollment {
            id: new_enrollment_id(),
            contact_id: contact_id.to_string(),
            sequence_id: sequence_id.to_string(),
            status: EnrollmentStatus::Active,
            current_step_index: 0,
            next_action_at: None,
            waiting_task_id: None,
            events: Vec::new(),
            enrolled_at: now,
            updated_at: now,
            finished_at: None,
            stop_reason: None,
        };
        let advanced = advance(&mut enrollment, sequence, now, now);
        self.sequences.save_enrollment(&enrollment)?;
        if advanced != Advanced::Completed {
            self.point_contact_at(contact_id, &enrollment.id)?;
        }
        tracing::info!(
            contact_id,
            enrollment_id = %enrollment.id,
            sequence_id,
            next_action_at = ?enrollment.next_action_at,
            "enrolled contact"
        );
        Ok(enrollment)
    }

    /// Stop a non-terminal enrollment. Stopping a finished one is a no-op.
    pub fn stop(&self, enrollment_id: &str, reason: &str, now: u64) -> EngineResult<Enrollment> {
        let _write = guard(&self.write_lock);
        self.stop_locked(enrollment_id, reason, now)
    }

    fn stop_locked(&self, enrollment_id: &str, reason: &str, now: u64) -> EngineResult<Enrollment> {
        let mut enrollment = self.load_enrollment(enrollment_id)?;
        if enrollment.is_terminal() {
            return Ok(enrollment);
        }
        self.stop_in_place(&mut enrollment, reason, now)?;
        tracing::info!(
            enrollment_id,
            contact_id = %enrollment.contact_id,
            reason,
            "stopped enrollment"
        );
        Ok(enrollment)
    }

    /// Mark a task done and resume every enrollment parked on it.
    pub fn complete_task(&self, task_id: &str, now: u64) -> EngineResult<TaskCompletion> {
        let _write = guard(&self.write_lock);
        let mut task = self
            .sequences
            .get_task(task_id)?
            .ok_or_else(|| EngineError::not_found(EntityKind::Task, task_id))?;
        let mut completion = TaskCompletion {
            task_id: task_id.to_string(),
            newly_completed: false,
            resumed: Vec::new(),
            completed: Vec::new(),
        };
        if task.is_done() {
            return Ok(completion);
        }
        task.status = TaskStatus::Done;
        task.completed_at = Some(now);
        self.sequences.save_task(&task)?;
        completion.newly_completed = true;

        let waiting: Vec<Enrollment> = self
            .sequences
            .list_enrollments()?
            .into_iter()
            .filter(|enrollment| {
                enrollment.status == EnrollmentStatus::WaitingTask
                    && enrollment.waiting_task_id.as_deref() == Some(task_id)
            })
            .collect();
        for mut enrollment in waiting {
            match self.resume_from_task(&mut enrollment, &task, now)? {
                Resumption::Scheduled { .. } => completion.resumed.push(enrollment.id),
                Resumption::Completed => completion.completed.push(enrollment.id),
                Resumption::StillWaiting | Resumption::ForceStopped(_) => {}
            }
        }
        tracing::info!(
            task_id,
            resumed = completion.resumed.len(),
            completed = completion.completed.len(),
            "completed task"
        );
        Ok(completion)
    }

    /// Append an interaction; an inbound reply stops the active enrollment.
    pub fn record_interaction(
        &self,
        contact_id: &str,
        interaction: Interaction,
        now: u64,
    ) -> EngineResult<RecordedInteraction> {
        let _write = guard(&self.write_lock);
        self.load_contact(contact_id)?;
        let inbound = interaction.kind.is_inbound();
        let contact = self.contacts.append_interaction(contact_id, interaction)?;
        let stopped_enrollment = match contact.active_enrollment.clone() {
            Some(enrollment_id) if inbound => {
                self.stop_locked(&enrollment_id, "replied", now)?;
                Some(enrollment_id)
            }
            _ => None,
        };
        let contact = self.load_contact(contact_id)?;
        Ok(RecordedInteraction {
            contact,
            stopped_enrollment,
        })
    }

    fn stop_in_place(&self, enrollment: &mut Enrollment, reason: &str, now: u64) -> EngineResult<()> {
        enrollment.mark_stopped(reason, now);
        self.sequences.save_enrollment(enrollment)?;
        self.release_contact(&enrollment.contact_id, &enrollment.id)
    }

    /// Stop an enrollment whose state cannot be executed and return the
    /// violation so batch callers can report it.
    fn force_stop(
        &self,
        enrollment: &mut Enrollment,
        reason: &str,
        detail: String,
        now: u64,
    ) -> EngineResult<EngineError> {
        let violation = EngineError::InvariantViolation(detail);
        tracing::warn!(
            enrollment_id = %enrollment.id,
            contact_id = %enrollment.contact_id,
            reason,
            error = %violation,
            "force-stopping enrollment"
        );
        self.stop_in_place(enrollment, reason, now)?;
        Ok(violation)
    }

    /// Point the contact's back-reference at `enrollment_id`. Only the
    /// pointer changes; the interaction log is left to concurrent appenders.
    fn point_contact_at(&self, contact_id: &str, enrollment_id: &str) -> EngineResult<()> {
        self.contacts
            .update(contact_id, &mut |contact| {
                contact.active_enrollment = Some(enrollment_id.to_string());
            })?
            .ok_or_else(|| EngineError::not_found(EntityKind::Contact, contact_id))?;
        Ok(())
    }

    /// Clear the contact's back-reference if it still points at `enrollment_id`.
    fn release_contact(&self, contact_id: &str, enrollment_id: &str) -> EngineResult<()> {
        self.contacts.update(contact_id, &mut |contact| {
            if contact.active_enrollment.as_deref() == Some(enrollment_id) {
                contact.active_enrollment = None;
            }
        })?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "sequence_tests.rs"]
mod tests;
