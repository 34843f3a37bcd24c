//! Shared test infrastructure for integration tests.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Throwaway workspace driven through the compiled `outreach` binary.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    /// Create a temp dir and run `outreach init` in it.
    pub fn init() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let workspace = Self { dir };
        workspace.run_ok(&["init"]);
        workspace
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Run a subcommand against this workspace.
    pub fn run(&self, args: &[&str]) -> Output {
        let (command, rest) = args.split_first().expect("subcommand");
        Command::new(env!("CARGO_BIN_EXE_outreach"))
            .arg(command)
            .arg("--workspace")
            .arg(self.root())
            .args(rest)
            .env("RUST_LOG", "outreach=warn")
            .output()
            .expect("spawn outreach")
    }

    /// Run a subcommand and fail the test on a non-zero exit.
    pub fn run_ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "outreach {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    /// Run a `--json` subcommand and parse stdout.
    pub fn run_json(&self, args: &[&str]) -> serde_json::Value {
        let mut args = args.to_vec();
        args.push("--json");
        let stdout = self.run_ok(&args);
        serde_json::from_str(&stdout)
            .unwrap_or_else(|err| panic!("parse {:?} output: {err}\n{stdout}", args))
    }

    pub fn add_contact(&self, id: &str, name: &str, phone: Option<&str>) {
        let email = format!("{id}@example.com");
        let mut args = vec![
            "add-contact",
            "--id",
            id,
            "--name",
            name,
            "--email",
            email.as_str(),
            "--company",
            "Acme",
        ];
        if let Some(phone) = phone {
            args.extend(["--phone", phone]);
        }
        self.run_ok(&args);
    }
}
