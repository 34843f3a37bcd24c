//! Command handlers behind the CLI.
//!
//! Each handler loads the workspace, runs one engine operation, persists the
//! process-wide state it touched (governor window, weights, feedback log),
//! and prints either text or JSON.
use crate::cli::{
    AddContactArgs, AnalyzeArgs, CompleteTaskArgs, EnrollArgs, FeedbackArgs, InitArgs,
    LogInteractionArgs, RankArgs, SetStageArgs, StatusArgs, StopArgs, TickArgs, WeightsArgs,
};
use crate::config::{default_config, load_config, write_config, EngineConfig};
use crate::dispatch::OutboxDispatcher;
use crate::error::{EngineError, EntityKind};
use crate::governor::{GovernorState, ThroughputGovernor};
use crate::learning::{load_feedback_log, load_weights, write_weights, WeightStore};
use crate::model::{Contact, Interaction, DAY_MS};
use crate::scoring::{CallPriorityAnalyzer, ScoreAnalysis};
use crate::sequence::{SequenceEngine, TickOptions, TickReport};
use crate::status::{build_status_summary, print_status};
use crate::store::{ContactStore, JsonFileStore};
use crate::templates::{load_templates, write_templates, TemplateRegistry};
use crate::util::now_epoch_ms;
use crate::workspace::{
    append_jsonl, ensure_workspace_root, read_json_optional, write_json_atomic, StateLock,
    WorkspacePaths,
};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// How long a mutating command waits for another one to release the workspace.
const STATE_LOCK_WAIT: Duration = Duration::from_secs(10);

pub fn run_init(args: InitArgs) -> Result<()> {
    let root = ensure_workspace_root(&args.target.workspace, true)?;
    let paths = WorkspacePaths::new(root);
    let config_path = paths.config_path();
    if config_path.is_file() && !args.force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            config_path.display()
        ));
    }
    write_config(&paths, &default_config())?;
    println!("wrote {}", config_path.display());
    if !paths.templates_path().is_file() || args.force {
        write_templates(&paths, &TemplateRegistry::builtin()?)?;
        println!("wrote {}", paths.templates_path().display());
    }
    fs::create_dir_all(paths.state_dir())
        .with_context(|| format!("create {}", paths.state_dir().display()))?;
    Ok(())
}

pub fn run_add_contact(args: AddContactArgs) -> Result<()> {
    let ctx = WorkspaceContext::load(&args.target.workspace)?;
    let now = now_epoch_ms()?;
    let _lock = ctx.lock_state(now)?;
    let mut contact = Contact::new(args.id, args.name, args.email, now).with_stage(args.stage, now);
    if let Some(phone) = args.phone {
        contact = contact.with_phone(phone);
    }
    if let Some(company) = args.company {
        contact = contact.with_company(company);
    }
    contact.opted_out = args.opted_out;

    let engine = ctx.engine(ctx.governor()?)?;
    let (contact, enrollment) = engine.add_contact(contact, now)?;
    if args.json {
        return print_json(&serde_json::json!({
            "contact": contact,
            "enrollment": enrollment,
        }));
    }
    println!("added contact {} ({})", contact.id, contact.stage);
    if let Some(enrollment) = enrollment {
        println!(
            "enrolled {} in {} as {}",
            contact.id, enrollment.sequence_id, enrollment.id
        );
    }
    Ok(())
}

pub fn run_log_interaction(args: LogInteractionArgs) -> Result<()> {
    let ctx = WorkspaceContext::load(&args.target.workspace)?;
    let now = now_epoch_ms()?;
    let _lock = ctx.lock_state(now)?;
    let at = now.saturating_sub(args.days_ago.saturating_mul(DAY_MS));
    let mut interaction = Interaction::new(args.kind, at);
    if args.urgent {
        interaction = interaction.urgent();
    }
    if let Some(note) = args.note {
        interaction = interaction.with_note(note);
    }
    let engine = ctx.engine(ctx.governor()?)?;
    let recorded = engine.record_interaction(&args.contact_id, interaction, now)?;
    if args.json {
        return print_json(&recorded);
    }
    println!("logged {} for {}", args.kind, args.contact_id);
    if let Some(enrollment_id) = recorded.stopped_enrollment {
        println!("stopped enrollment {enrollment_id} (replied)");
    }
    Ok(())
}

pub fn run_set_stage(args: SetStageArgs) -> Result<()> {
    let ctx = WorkspaceContext::load(&args.target.workspace)?;
    let now = now_epoch_ms()?;
    let _lock = ctx.lock_state(now)?;
    let mut previous = args.stage;
    let contact = ctx
        .store
        .update(&args.contact_id, &mut |contact| {
            previous = contact.stage;
            contact.set_stage(args.stage, now);
        })?
        .ok_or_else(|| EngineError::not_found(EntityKind::Contact, args.contact_id.as_str()))?;
    tracing::info!(contact_id = %contact.id, from = %previous, to = %contact.stage, "stage changed");
    println!("{}: {} -> {}", contact.id, previous, contact.stage);
    Ok(())
}

pub fn run_enroll(args: EnrollArgs) -> Result<()> {
    let ctx = WorkspaceContext::load(&args.target.workspace)?;
    let now = now_epoch_ms()?;
    let _lock = ctx.lock_state(now)?;
    let engine = ctx.engine(ctx.governor()?)?;
    let enrollment = engine.enroll(&args.contact_id, &args.sequence_id, now)?;
    if args.json {
        return print_json(&enrollment);
    }
    println!(
        "enrollment {} ({}) for {} in {}",
        enrollment.id, enrollment.status, enrollment.contact_id, enrollment.sequence_id
    );
    Ok(())
}

pub fn run_tick(args: TickArgs) -> Result<()> {
    let ctx = WorkspaceContext::load(&args.target.workspace)?;
    let now = now_epoch_ms()?;
    let _lock = ctx.lock_state(now)?;
    let governor = ctx.governor()?;
    let engine = ctx.engine(Arc::clone(&governor))?;

    let limit = args.limit.unwrap_or(ctx.config.default_tick_limit);
    let mut options = TickOptions::new(args.mode, limit);
    if args.ignore_delays {
        options = options.ignoring_delays();
    }
    let report = engine.process_due_steps(options, now)?;
    ctx.save_governor(&governor)?;

    if args.json {
        return print_json(&report);
    }
    print_tick_report(&report);
    Ok(())
}

fn print_tick_report(report: &TickReport) {
    println!("mode: {}", report.mode);
    println!("steps processed: {}", report.steps_processed);
    println!(
        "emails: sent={} dry_run={} held={} deferred={}",
        report.emails_sent, report.emails_dry_run, report.emails_held, report.emails_deferred
    );
    println!("tasks created: {}", report.tasks_created);
    println!(
        "enrollments: resumed={} completed={} stopped={}",
        report.enrollments_resumed, report.enrollments_completed, report.enrollments_stopped
    );
    for issue in report.errors.iter().chain(&report.violations) {
        println!(
            "  - {} {} [{}]: {}",
            issue.contact_id, issue.enrollment_id, issue.code, issue.message
        );
    }
}

pub fn run_complete_task(args: CompleteTaskArgs) -> Result<()> {
    let ctx = WorkspaceContext::load(&args.target.workspace)?;
    let now = now_epoch_ms()?;
    let _lock = ctx.lock_state(now)?;
    let engine = ctx.engine(ctx.governor()?)?;
    let completion = engine.complete_task(&args.task_id, now)?;
    if args.json {
        return print_json(&completion);
    }
    if !completion.newly_completed {
        println!("task {} was already done", completion.task_id);
        return Ok(());
    }
    println!(
        "task {} done; resumed {} and completed {} enrollment(s)",
        completion.task_id,
        completion.resumed.len(),
        completion.completed.len()
    );
    Ok(())
}

pub fn run_stop(args: StopArgs) -> Result<()> {
    let ctx = WorkspaceContext::load(&args.target.workspace)?;
    let now = now_epoch_ms()?;
    let _lock = ctx.lock_state(now)?;
    let engine = ctx.engine(ctx.governor()?)?;
    let enrollment = engine.stop(&args.enrollment_id, &args.reason, now)?;
    println!(
        "enrollment {} is {} ({})",
        enrollment.id,
        enrollment.status,
        enrollment.stop_reason.as_deref().unwrap_or("finished")
    );
    Ok(())
}

pub fn run_analyze(args: AnalyzeArgs) -> Result<()> {
    let ctx = WorkspaceContext::load(&args.target.workspace)?;
    let now = now_epoch_ms()?;
    let analysis = ctx.analyzer(Arc::new(ctx.weights()?)).analyze(&args.contact_id, now)?;
    if args.json {
        return print_json(&analysis);
    }
    print_analysis(&analysis);
    Ok(())
}

fn print_analysis(analysis: &ScoreAnalysis) {
    println!(
        "{}: score {} ({})",
        analysis.contact_id, analysis.score, analysis.priority
    );
    for reason in &analysis.reasons {
        println!("  +{} {}: {}", reason.weight, reason.code, reason.detail);
    }
    println!("  {}", analysis.recommendation);
}

pub fn run_rank(args: RankArgs) -> Result<()> {
    let ctx = WorkspaceContext::load(&args.target.workspace)?;
    let now = now_epoch_ms()?;
    let ranked = ctx
        .analyzer(Arc::new(ctx.weights()?))
        .rank_candidates(args.min_priority, args.limit, now)?;
    if args.json {
        return print_json(&ranked);
    }
    if ranked.is_empty() {
        println!("no contacts at or above {}", args.min_priority);
        return Ok(());
    }
    for analysis in &ranked {
        print_analysis(analysis);
    }
    Ok(())
}

pub fn run_feedback(args: FeedbackArgs) -> Result<()> {
    let ctx = WorkspaceContext::load(&args.target.workspace)?;
    let now = now_epoch_ms()?;
    let _lock = ctx.lock_state(now)?;
    let weights = Arc::new(ctx.weights()?);
    let record = ctx
        .analyzer(Arc::clone(&weights))
        .record_feedback(&args.contact_id, args.reason, args.outcome, now)?;
    append_jsonl(&ctx.paths.feedback_log_path(), &record).context("append feedback log")?;
    write_weights(&ctx.paths, &weights, now)?;
    if args.json {
        return print_json(&record);
    }
    println!(
        "{} {}: weight {} -> {}",
        record.reason_code, record.outcome, record.weight_before, record.weight_after
    );
    Ok(())
}

#[derive(Serialize)]
struct WeightsReport {
    weights: std::collections::BTreeMap<crate::scoring::ReasonCode, u32>,
    feedback_records: usize,
}

pub fn run_weights(args: WeightsArgs) -> Result<()> {
    let ctx = WorkspaceContext::load(&args.target.workspace)?;
    let report = WeightsReport {
        weights: ctx.weights()?.snapshot(),
        feedback_records: load_feedback_log(&ctx.paths)?.len(),
    };
    if args.json {
        return print_json(&report);
    }
    for (code, weight) in &report.weights {
        println!("{code}: {weight}");
    }
    println!("feedback records: {}", report.feedback_records);
    Ok(())
}

pub fn run_status(args: StatusArgs) -> Result<()> {
    let ctx = WorkspaceContext::load(&args.target.workspace)?;
    let now = now_epoch_ms()?;
    let governor = ctx.governor()?;
    let summary = build_status_summary(
        ctx.paths.root(),
        ctx.store.as_ref(),
        ctx.store.as_ref(),
        &governor,
        &ctx.config,
        now,
    )?;
    if args.json {
        return print_json(&summary);
    }
    print_status(ctx.paths.root(), &summary);
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{text}");
    Ok(())
}

/// Loaded workspace: paths, validated config, and the file-backed store.
struct WorkspaceContext {
    paths: WorkspacePaths,
    config: EngineConfig,
    store: Arc<JsonFileStore>,
}

impl WorkspaceContext {
    fn load(workspace: &Path) -> Result<Self> {
        let root = ensure_workspace_root(workspace, false)?;
        let paths = WorkspacePaths::new(root);
        let config = load_config(&paths)?;
        let store = Arc::new(JsonFileStore::new(paths.clone()));
        Ok(Self {
            paths,
            config,
            store,
        })
    }

    /// Serialize state mutations with every other `outreach` process. Shared
    /// state (governor, weights) must be loaded after this returns.
    fn lock_state(&self, now: u64) -> Result<StateLock> {
        StateLock::acquire(self.paths.state_lock_path(), now, STATE_LOCK_WAIT)
    }

    fn governor(&self) -> Result<Arc<ThroughputGovernor>> {
        let state: GovernorState =
            read_json_optional(&self.paths.governor_path())?.unwrap_or_default();
        Ok(Arc::new(ThroughputGovernor::with_state(
            &self.config.throughput,
            state,
        )))
    }

    fn save_governor(&self, governor: &ThroughputGovernor) -> Result<()> {
        write_json_atomic(&self.paths.governor_path(), &governor.snapshot())
            .context("write governor state")
    }

    fn weights(&self) -> Result<WeightStore> {
        load_weights(
            &self.paths,
            &self.config.learning,
            &self.config.initial_weights,
        )
    }

    fn engine(&self, governor: Arc<ThroughputGovernor>) -> Result<SequenceEngine> {
        let templates = load_templates(&self.paths)?;
        Ok(SequenceEngine::new(
            self.store.clone(),
            self.store.clone(),
            Arc::new(templates),
            Arc::new(OutboxDispatcher::new(self.paths.outbox_path())),
            governor,
        )
        .with_sending_enabled(self.config.sending_enabled)
        .with_auto_enroll(self.config.auto_enroll_sequence.clone()))
    }

    fn analyzer(&self, weights: Arc<WeightStore>) -> CallPriorityAnalyzer {
        CallPriorityAnalyzer::new(
            self.store.clone(),
            weights,
            self.config.priority.clone(),
            self.config.signals.clone(),
        )
    }
}
