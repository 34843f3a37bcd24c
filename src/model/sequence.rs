use serde::{Deserialize, Serialize};
use std::fmt;

/// Subject/body pair referenced by email steps.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    pub id: String,
    pub subject: String,
    pub body: String,
}

/// One step of a sequence template.
///
/// `delay_days` is relative to the completion of the previous step, not to
/// enrollment time.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepDef {
    Email {
        template_id: String,
        #[serde(default)]
        delay_days: u32,
    },
    Task {
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        delay_days: u32,
    },
}

impl StepDef {
    pub fn delay_days(&self) -> u32 {
        match self {
            StepDef::Email { delay_days, .. } | StepDef::Task { delay_days, .. } => *delay_days,
        }
    }

    pub fn kind(&self) -> StepKind {
        match self {
            StepDef::Email { .. } => StepKind::Email,
            StepDef::Task { .. } => StepKind::Task,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Email,
    Task,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Email => "email",
            StepKind::Task => "task",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SequenceTemplate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub steps: Vec<StepDef>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    WaitingTask,
    Completed,
    Stopped,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::WaitingTask => "waiting_task",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EnrollmentStatus::Completed | EnrollmentStatus::Stopped)
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an executed step was carried out.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    Sent { provider_id: String },
    DryRun,
    TaskCreated { task_id: String },
}

/// Append-only record of one executed step.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StepEvent {
    pub step_index: usize,
    pub kind: StepKind,
    pub at: u64,
    #[serde(flatten)]
    pub outcome: EventOutcome,
}

/// One contact's run through one sequence template.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub id: String,
    pub contact_id: String,
    pub sequence_id: String,
    pub status: EnrollmentStatus,
    /// Index of the next unexecuted step.
    pub current_step_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_task_id: Option<String>,
    #[serde(default)]
    pub events: Vec<StepEvent>,
    pub enrolled_at: u64,
    pub updated_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

impl Enrollment {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Exactly one of `next_action_at` / `waiting_task_id` while non-terminal,
    /// neither once terminal.
    pub fn schedule_is_consistent(&self) -> bool {
        match self.status {
            EnrollmentStatus::Active => {
                self.next_action_at.is_some() && self.waiting_task_id.is_none()
            }
            EnrollmentStatus::WaitingTask => {
                self.next_action_at.is_none() && self.waiting_task_id.is_some()
            }
            EnrollmentStatus::Completed | EnrollmentStatus::Stopped => {
                self.next_action_at.is_none() && self.waiting_task_id.is_none()
            }
        }
    }

    pub fn is_due(&self, now: u64) -> bool {
        self.status == EnrollmentStatus::Active
            && self.next_action_at.is_some_and(|at| at <= now)
    }

    pub fn mark_stopped(&mut self, reason: impl Into<String>, now: u64) {
        self.status = EnrollmentStatus::Stopped;
        self.next_action_at = None;
        self.waiting_task_id = None;
        self.stop_reason = Some(reason.into());
        self.finished_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_completed(&mut self, now: u64) {
        self.status = EnrollmentStatus::Completed;
        self.next_action_at = None;
        self.waiting_task_id = None;
        self.finished_at = Some(now);
        self.updated_at = now;
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    Done,
}

/// Human-in-the-loop artifact created by a task step.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub contact_id: String,
    pub enrollment_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
}

impl Task {
    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }
}
