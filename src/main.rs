use anyhow::Result;
use clap::Parser;
use outreach::cli::{Command, RootArgs};
use outreach::workflow;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Init(args) => workflow::run_init(args),
        Command::AddContact(args) => workflow::run_add_contact(args),
        Command::LogInteraction(args) => workflow::run_log_interaction(args),
        Command::SetStage(args) => workflow::run_set_stage(args),
        Command::Enroll(args) => workflow::run_enroll(args),
        Command::Tick(args) => workflow::run_tick(args),
        Command::CompleteTask(args) => workflow::run_complete_task(args),
        Command::Stop(args) => workflow::run_stop(args),
        Command::Analyze(args) => workflow::run_analyze(args),
        Command::Rank(args) => workflow::run_rank(args),
        Command::Feedback(args) => workflow::run_feedback(args),
        Command::Weights(args) => workflow::run_weights(args),
        Command::Status(args) => workflow::run_status(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "outreach=debug" } else { "outreach=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
