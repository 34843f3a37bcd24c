//! CLI argument parsing for the outreach workspace.
//!
//! The CLI stays thin: every command loads the workspace, calls one engine
//! operation, persists shared state, and prints the result.
use crate::learning::CallOutcome;
use crate::model::{InteractionKind, Stage};
use crate::scoring::{Priority, ReasonCode};
use crate::sequence::RunMode;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "outreach",
    version,
    about = "Outreach sequences and call-priority scoring over a local workspace",
    after_help = "Examples:\n  outreach init --workspace /tmp/sales\n  outreach add-contact --workspace /tmp/sales --id c1 --name 'Ada Lovelace' --email ada@example.com --phone 555-0100\n  outreach enroll --workspace /tmp/sales c1 cold_outreach\n  outreach tick --workspace /tmp/sales --mode dry-run\n  outreach rank --workspace /tmp/sales --min-priority high\n  outreach feedback --workspace /tmp/sales c1 hot_lead successful\n  outreach status --workspace /tmp/sales --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Raise the default log level to debug
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Init(InitArgs),
    AddContact(AddContactArgs),
    LogInteraction(LogInteractionArgs),
    SetStage(SetStageArgs),
    Enroll(EnrollArgs),
    Tick(TickArgs),
    CompleteTask(CompleteTaskArgs),
    Stop(StopArgs),
    Analyze(AnalyzeArgs),
    Rank(RankArgs),
    Feedback(FeedbackArgs),
    Weights(WeightsArgs),
    Status(StatusArgs),
}

/// Workspace location shared by every command.
#[derive(Args, Debug, Clone)]
pub struct WorkspaceArg {
    /// Workspace root containing config.json, templates.json, and state/
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub workspace: PathBuf,
}

#[derive(Parser, Debug)]
#[command(about = "Create config.json, templates.json, and state/")]
pub struct InitArgs {
    #[command(flatten)]
    pub target: WorkspaceArg,

    /// Overwrite an existing config.json and templates.json
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Add a contact (auto-enrolls when configured)")]
pub struct AddContactArgs {
    #[command(flatten)]
    pub target: WorkspaceArg,

    #[arg(long)]
    pub id: String,

    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub phone: Option<String>,

    #[arg(long)]
    pub company: Option<String>,

    /// Pipeline stage (lead, prospect, contacted, ...)
    #[arg(long, default_value = "lead")]
    pub stage: Stage,

    /// Record the contact as opted out of outreach
    #[arg(long)]
    pub opted_out: bool,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Append an interaction; inbound replies stop the active sequence")]
pub struct LogInteractionArgs {
    #[command(flatten)]
    pub target: WorkspaceArg,

    pub contact_id: String,

    /// Interaction kind (email_replied, inbound_call, meeting_no_show, ...)
    pub kind: InteractionKind,

    /// Mark a support ticket as urgent
    #[arg(long)]
    pub urgent: bool,

    #[arg(long)]
    pub note: Option<String>,

    /// Backdate the interaction by whole days
    #[arg(long, value_name = "DAYS", default_value_t = 0)]
    pub days_ago: u64,

    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Move a contact to a pipeline stage")]
pub struct SetStageArgs {
    #[command(flatten)]
    pub target: WorkspaceArg,

    pub contact_id: String,

    pub stage: Stage,
}

#[derive(Parser, Debug)]
#[command(about = "Enroll a contact in a sequence (idempotent per sequence)")]
pub struct EnrollArgs {
    #[command(flatten)]
    pub target: WorkspaceArg,

    pub contact_id: String,

    pub sequence_id: String,

    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Execute due sequence steps")]
pub struct TickArgs {
    #[command(flatten)]
    pub target: WorkspaceArg,

    /// hold, dry-run, or send
    #[arg(long, default_value = "hold")]
    pub mode: RunMode,

    /// Maximum steps across all enrollments (defaults to config)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Treat every active enrollment as due (dry-run only)
    #[arg(long)]
    pub ignore_delays: bool,

    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Mark a task done and resume its enrollment")]
pub struct CompleteTaskArgs {
    #[command(flatten)]
    pub target: WorkspaceArg,

    pub task_id: String,

    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Stop an enrollment permanently")]
pub struct StopArgs {
    #[command(flatten)]
    pub target: WorkspaceArg,

    pub enrollment_id: String,

    #[arg(long, default_value = "manual")]
    pub reason: String,
}

#[derive(Parser, Debug)]
#[command(about = "Explain one contact's call priority")]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub target: WorkspaceArg,

    pub contact_id: String,

    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Rank callable contacts by priority")]
pub struct RankArgs {
    #[command(flatten)]
    pub target: WorkspaceArg,

    /// Lowest bucket to include (none, low, medium, high, urgent)
    #[arg(long, default_value = "low")]
    pub min_priority: Priority,

    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Record a call outcome and adjust the reason's weight")]
pub struct FeedbackArgs {
    #[command(flatten)]
    pub target: WorkspaceArg,

    pub contact_id: String,

    /// Reason code that justified the call
    pub reason: ReasonCode,

    /// successful, no_answer, not_interested, wrong_contact, or wrong_timing
    pub outcome: CallOutcome,

    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Dump the current weight table")]
pub struct WeightsArgs {
    #[command(flatten)]
    pub target: WorkspaceArg,

    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Summarize enrollments, tasks, and the next action")]
pub struct StatusArgs {
    #[command(flatten)]
    pub target: WorkspaceArg,

    #[arg(long)]
    pub json: bool,
}
