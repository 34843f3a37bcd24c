//! Due-step scan and dispatch.
use super::advance::{advance, Advanced, Resumption};
use super::{guard, SequenceEngine};
use crate::dispatch::{DeliveryError, MessageRequest, TaskRequest};
use crate::error::{EngineError, EngineResult};
use crate::model::{
    Enrollment, EnrollmentStatus, EventOutcome, Interaction, InteractionKind, StepDef, StepEvent,
    StepKind, Task, TaskStatus,
};
use crate::templates::{contact_variables, render_text};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How email steps are carried out in one run. Task steps run in every mode.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Leave email steps pending.
    #[default]
    Hold,
    /// Record email steps as executed without calling the dispatcher.
    DryRun,
    /// Dispatch email steps through the governor.
    Send,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Hold => "hold",
            RunMode::DryRun => "dry_run",
            RunMode::Send => "send",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "hold" => Ok(RunMode::Hold),
            "dry_run" => Ok(RunMode::DryRun),
            "send" => Ok(RunMode::Send),
            _ => Err(format!("unknown run mode {raw:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOptions {
    /// Steps executed across all enrollments before the scan stops.
    pub limit: usize,
    pub mode: RunMode,
    /// Treat every active enrollment as due. Dry-run only.
    pub ignore_delays: bool,
}

impl TickOptions {
    pub fn new(mode: RunMode, limit: usize) -> Self {
        Self {
            limit,
            mode,
            ignore_delays: false,
        }
    }

    pub fn ignoring_delays(mut self) -> Self {
        self.ignore_delays = true;
        self
    }
}

/// One per-enrollment problem surfaced by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickIssue {
    pub contact_id: String,
    pub enrollment_id: String,
    pub code: String,
    pub message: String,
}

impl TickIssue {
    fn new(enrollment: &Enrollment, err: &EngineError) -> Self {
        Self {
            contact_id: enrollment.contact_id.clone(),
            enrollment_id: enrollment.id.clone(),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub mode: RunMode,
    pub steps_processed: usize,
    pub emails_sent: usize,
    pub emails_dry_run: usize,
    /// Due email steps left pending by `hold`.
    pub emails_held: usize,
    /// Due email steps left pending because the send window was full.
    pub emails_deferred: usize,
    pub tasks_created: usize,
    pub enrollments_resumed: usize,
    pub enrollments_completed: usize,
    pub enrollments_stopped: usize,
    /// Failures that left the enrollment untouched for the next run.
    pub errors: Vec<TickIssue>,
    /// Enrollments force-stopped because their state could not run.
    pub violations: Vec<TickIssue>,
}

impl TickReport {
    fn new(mode: RunMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    fn force_stopped(&mut self, enrollment: &Enrollment, violation: &EngineError) {
        self.enrollments_stopped += 1;
        self.violations.push(TickIssue::new(enrollment, violation));
    }
}

impl SequenceEngine {
    /// Scan open enrollments in contact order and execute due steps.
    ///
    /// Only misconfiguration and store failures while listing enrollments
    /// fail the whole run; everything per-enrollment lands in the report.
    pub fn process_due_steps(&self, options: TickOptions, now: u64) -> EngineResult<TickReport> {
        if options.mode == RunMode::Send && !self.sending_enabled {
            return Err(EngineError::Configuration(
                "send mode requested but sending is disabled (set sending_enabled in config.json)"
                    .to_string(),
            ));
        }
        if options.ignore_delays && options.mode != RunMode::DryRun {
            return Err(EngineError::Configuration(format!(
                "ignore_delays is only allowed with dry_run (got {})",
                options.mode
            )));
        }
        let _run = guard(&self.run_lock);

        let mut pending: Vec<Enrollment> = self
            .sequences
            .list_enrollments()?
            .into_iter()
            .filter(|enrollment| !enrollment.is_terminal())
            .collect();
        pending.sort_by(|a, b| {
            a.contact_id
                .cmp(&b.contact_id)
                .then(a.enrolled_at.cmp(&b.enrolled_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut report = TickReport::new(options.mode);
        for listed in &pending {
            if report.steps_processed >= options.limit {
                tracing::debug!(limit = options.limit, "tick limit reached");
                break;
            }
            if let Err(err) = self.process_enrollment(&listed.id, options, now, &mut report) {
                tracing::warn!(
                    contact_id = %listed.contact_id,
                    enrollment_id = %listed.id,
                    error = %err,
                    "enrollment step failed"
                );
                report.errors.push(TickIssue::new(listed, &err));
            }
        }
        tracing::info!(
            mode = %options.mode,
            steps = report.steps_processed,
            sent = report.emails_sent,
            dry_run = report.emails_dry_run,
            deferred = report.emails_deferred,
            tasks = report.tasks_created,
            errors = report.errors.len(),
            "tick finished"
        );
        Ok(report)
    }

    fn process_enrollment(
        &self,
        enrollment_id: &str,
        options: TickOptions,
        now: u64,
        report: &mut TickReport,
    ) -> EngineResult<()> {
        let _write = guard(&self.write_lock);
        // Reload so a stop issued since the listing takes effect.
        let Some(mut enrollment) = self.sequences.get_enrollment(enrollment_id)? else {
            return Ok(());
        };
        if enrollment.is_terminal() {
            return Ok(());
        }
        if !enrollment.schedule_is_consistent() {
            let detail = format!(
                "enrollment {} is {} with inconsistent schedule",
                enrollment.id, enrollment.status
            );
            let violation = self.force_stop(&mut enrollment, "inconsistent_schedule", detail, now)?;
            report.force_stopped(&enrollment, &violation);
            return Ok(());
        }

        if enrollment.status == EnrollmentStatus::WaitingTask {
            match self.check_waiting_task(&mut enrollment, now)? {
                Resumption::StillWaiting => return Ok(()),
                Resumption::ForceStopped(violation) => {
                    report.force_stopped(&enrollment, &violation);
                    return Ok(());
                }
                Resumption::Completed => {
                    report.enrollments_resumed += 1;
                    report.enrollments_completed += 1;
                    return Ok(());
                }
                Resumption::Scheduled { .. } => report.enrollments_resumed += 1,
            }
        }

        let due = options.ignore_delays || enrollment.is_due(now);
        if !due || report.steps_processed >= options.limit {
            return Ok(());
        }
        self.execute_step(&mut enrollment, options.mode, now, report)
    }

    fn check_waiting_task(&self, enrollment: &mut Enrollment, now: u64) -> EngineResult<Resumption> {
        let task_id = enrollment.waiting_task_id.clone().unwrap_or_default();
        match self.sequences.get_task(&task_id)? {
            Some(task) => self.resume_from_task(enrollment, &task, now),
            None => {
                let detail = format!(
                    "enrollment {} waits on unknown task {task_id}",
                    enrollment.id
                );
                let violation = self.force_stop(enrollment, "task_missing", detail, now)?;
                Ok(Resumption::ForceStopped(violation))
            }
        }
    }

    fn execute_step(
        &self,
        enrollment: &mut Enrollment,
        mode: RunMode,
        now: u64,
        report: &mut TickReport,
    ) -> EngineResult<()> {
        let templates = self.templates();
        let Ok(sequence) = templates.resolve_sequence(&enrollment.sequence_id) else {
            let detail = format!(
                "sequence {} no longer exists for enrollment {}",
                enrollment.sequence_id, enrollment.id
            );
            let violation = self.force_stop(enrollment, "sequence_missing", detail, now)?;
            report.force_stopped(enrollment, &violation);
            return Ok(());
        };
        let Some(step) = sequence.steps.get(enrollment.current_step_index) else {
            // The sequence was shortened under this enrollment.
            enrollment.mark_completed(now);
            self.sequences.save_enrollment(enrollment)?;
            self.release_contact(&enrollment.contact_id, &enrollment.id)?;
            report.enrollments_completed += 1;
            return Ok(());
        };
        let Some(contact) = self.contacts.get(&enrollment.contact_id)? else {
            let detail = format!(
                "contact {} no longer exists for enrollment {}",
                enrollment.contact_id, enrollment.id
            );
            let violation = self.force_stop(enrollment, "contact_missing", detail, now)?;
            report.force_stopped(enrollment, &violation);
            return Ok(());
        };
        let step_index = enrollment.current_step_index;

        let (kind, outcome) = match step {
            StepDef::Email { template_id, .. } => {
                if mode == RunMode::Hold {
                    report.emails_held += 1;
                    return Ok(());
                }
                if contact.opted_out {
                    self.stop_in_place(enrollment, "opted_out", now)?;
                    tracing::info!(
                        enrollment_id = %enrollment.id,
                        contact_id = %contact.id,
                        "contact opted out; stopped enrollment"
                    );
                    report.enrollments_stopped += 1;
                    return Ok(());
                }
                let rendered = match templates.render_message(template_id, &contact) {
                    Ok(rendered) => rendered,
                    Err(EngineError::NotFound { .. }) => {
                        let detail = format!(
                            "message template {template_id} no longer exists for enrollment {}",
                            enrollment.id
                        );
                        let violation =
                            self.force_stop(enrollment, "message_template_missing", detail, now)?;
                        report.force_stopped(enrollment, &violation);
                        return Ok(());
                    }
                    Err(err) => return Err(err),
                };
                let outcome = if mode == RunMode::DryRun {
                    EventOutcome::DryRun
                } else {
                    let Some(permit) = self.governor.try_reserve(now) else {
                        tracing::debug!(
                            enrollment_id = %enrollment.id,
                            "send window exhausted; leaving step pending"
                        );
                        report.emails_deferred += 1;
                        return Ok(());
                    };
                    let request = MessageRequest {
                        contact_id: contact.id.clone(),
                        to: contact.email.clone(),
                        template_id: rendered.template_id,
                        subject: rendered.subject,
                        body: rendered.body,
                        variables: contact_variables(&contact)
                            .into_iter()
                            .map(|(key, value)| (key.to_string(), value))
                            .collect(),
                    };
                    let receipt = match self.dispatcher.send_templated_message(&request) {
                        Ok(receipt) if receipt.sent => receipt,
                        Ok(_) => {
                            self.governor.release(permit);
                            return Err(DeliveryError::new("provider did not accept the message").into());
                        }
                        Err(err) => {
                            self.governor.release(permit);
                            return Err(err.into());
                        }
                    };
                    EventOutcome::Sent {
                        provider_id: receipt.provider_id,
                    }
                };
                (StepKind::Email, outcome)
            }
            StepDef::Task {
                title, description, ..
            } => {
                let variables = contact_variables(&contact);
                let request = TaskRequest {
                    contact_id: contact.id.clone(),
                    title: render_text(title, &variables),
                    description: render_text(description, &variables),
                };
                let task_id = self.dispatcher.create_task(&request)?;
                self.sequences.save_task(&Task {
                    id: task_id.clone(),
                    contact_id: contact.id.clone(),
                    enrollment_id: enrollment.id.clone(),
                    title: request.title,
                    description: request.description,
                    status: TaskStatus::Open,
                    created_at: now,
                    completed_at: None,
                })?;
                (StepKind::Task, EventOutcome::TaskCreated { task_id })
            }
        };

        enrollment.events.push(StepEvent {
            step_index,
            kind,
            at: now,
            outcome: outcome.clone(),
        });
        enrollment.current_step_index += 1;
        let advanced = match &outcome {
            EventOutcome::TaskCreated { task_id } => {
                enrollment.status = EnrollmentStatus::WaitingTask;
                enrollment.next_action_at = None;
                enrollment.waiting_task_id = Some(task_id.clone());
                enrollment.updated_at = now;
                None
            }
            EventOutcome::Sent { .. } | EventOutcome::DryRun => {
                Some(advance(enrollment, sequence, now, now))
            }
        };
        self.sequences.save_enrollment(enrollment)?;

        // The step is committed; bookkeeping failures past this point are logged only.
        report.steps_processed += 1;
        match &outcome {
            EventOutcome::Sent { provider_id } => {
                report.emails_sent += 1;
                let logged = self.contacts.append_interaction(
                    &contact.id,
                    Interaction::new(InteractionKind::EmailSent, now).with_note(format!(
                        "{} step {step_index} ({provider_id})",
                        enrollment.sequence_id
                    )),
                );
                if let Err(err) = logged {
                    tracing::warn!(
                        enrollment_id = %enrollment.id,
                        contact_id = %contact.id,
                        error = %err,
                        "sent email but failed to log the interaction"
                    );
                }
            }
            EventOutcome::DryRun => report.emails_dry_run += 1,
            EventOutcome::TaskCreated { .. } => report.tasks_created += 1,
        }
        if advanced == Some(Advanced::Completed) {
            report.enrollments_completed += 1;
            if let Err(err) = self.release_contact(&enrollment.contact_id, &enrollment.id) {
                tracing::warn!(
                    enrollment_id = %enrollment.id,
                    contact_id = %enrollment.contact_id,
                    error = %err,
                    "completed enrollment but failed to clear the contact pointer"
                );
            }
        }
        tracing::info!(
            enrollment_id = %enrollment.id,
            contact_id = %enrollment.contact_id,
            step_index,
            kind = %kind,
            mode = %mode,
            "executed step"
        );
        Ok(())
    }
}
