//! End-to-end checks of the CLI over a temp workspace.

mod common;

use common::Workspace;

#[test]
fn init_refuses_to_overwrite_without_force() {
    let workspace = Workspace::init();
    assert!(workspace.root().join("config.json").is_file());
    assert!(workspace.root().join("templates.json").is_file());
    assert!(workspace.root().join("state").is_dir());

    let second = workspace.run(&["init"]);
    assert!(!second.status.success());
    assert!(String::from_utf8_lossy(&second.stderr).contains("--force"));

    workspace.run_ok(&["init", "--force"]);
}

#[test]
fn commands_before_init_point_at_init() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_outreach"))
        .args(["status", "--workspace"])
        .arg(dir.path())
        .output()
        .expect("spawn outreach");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("outreach init"));
}

#[test]
fn sequence_runs_through_dry_run_and_status() {
    let workspace = Workspace::init();
    let status = workspace.run_json(&["status"]);
    assert_eq!(status["contacts"], 0);
    assert!(status["next_action"]["command"]
        .as_str()
        .expect("command")
        .starts_with("outreach add-contact"));

    workspace.add_contact("c1", "Ada Lovelace", Some("555-0100"));
    let enrollment = workspace.run_json(&["enroll", "c1", "cold_outreach"]);
    assert_eq!(enrollment["status"], "active");
    assert_eq!(enrollment["current_step_index"], 0);

    let again = workspace.run_json(&["enroll", "c1", "cold_outreach"]);
    assert_eq!(again["id"], enrollment["id"]);

    let conflict = workspace.run(&["enroll", "c1", "post_meeting"]);
    assert!(!conflict.status.success());

    let status = workspace.run_json(&["status"]);
    assert_eq!(status["due_now"], 1);
    assert_eq!(status["enrollments"]["active"], 1);
    assert!(status["next_action"]["command"]
        .as_str()
        .expect("command")
        .contains("--mode dry-run"));

    let held = workspace.run_json(&["tick"]);
    assert_eq!(held["mode"], "hold");
    assert_eq!(held["emails_held"], 1);
    assert_eq!(held["steps_processed"], 0);

    let refused = workspace.run(&["tick", "--mode", "send"]);
    assert!(!refused.status.success());

    let report = workspace.run_json(&["tick", "--mode", "dry-run"]);
    assert_eq!(report["emails_dry_run"], 1);
    assert_eq!(report["emails_sent"], 0);
    assert!(!workspace.root().join("state/outbox.jsonl").exists());

    let status = workspace.run_json(&["status"]);
    assert_eq!(status["due_now"], 0);
    assert_eq!(status["next_due"]["due_now"], false);
    assert!(!workspace.root().join("state/state.lock").exists());
}

#[test]
fn inbound_reply_stops_sequence_and_drives_scoring() {
    let workspace = Workspace::init();
    workspace.add_contact("c1", "Ada Lovelace", Some("555-0100"));
    workspace.add_contact("c2", "Grace Hopper", None);
    let enrollment = workspace.run_json(&["enroll", "c1", "cold_outreach"]);

    let logged = workspace.run_json(&["log-interaction", "c1", "email_replied"]);
    assert_eq!(logged["stopped_enrollment"], enrollment["id"]);

    let analysis = workspace.run_json(&["analyze", "c1"]);
    assert_eq!(analysis["score"], 75);
    assert_eq!(analysis["priority"], "high");
    assert_eq!(analysis["reasons"][0]["code"], "email_replied");

    let unreachable = workspace.run_json(&["analyze", "c2"]);
    assert_eq!(unreachable["score"], 0);
    assert_eq!(unreachable["priority"], "none");

    let ranked = workspace.run_json(&["rank", "--min-priority", "high"]);
    let ranked = ranked.as_array().expect("ranked list");
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0]["contact_id"], "c1");

    let record = workspace.run_json(&["feedback", "c1", "email_replied", "successful"]);
    assert_eq!(record["weight_before"], 75);
    assert_eq!(record["weight_after"], 77);

    let weights = workspace.run_json(&["weights"]);
    assert_eq!(weights["weights"]["email_replied"], 77);
    assert_eq!(weights["weights"]["hot_lead"], 80);
    assert_eq!(weights["feedback_records"], 1);
}

#[test]
fn unknown_ids_fail_cleanly() {
    let workspace = Workspace::init();
    for args in [
        vec!["analyze", "ghost"],
        vec!["enroll", "ghost", "cold_outreach"],
        vec!["complete-task", "task-missing"],
        vec!["stop", "enr-missing"],
        vec!["set-stage", "ghost", "prospect"],
    ] {
        let output = workspace.run(&args);
        assert!(!output.status.success(), "{args:?} should fail");
        assert!(
            String::from_utf8_lossy(&output.stderr).contains("not found"),
            "{args:?}: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

#[test]
fn concurrent_feedback_loses_no_adjustment() {
    let workspace = Workspace::init();
    workspace.add_contact("c1", "Ada Lovelace", Some("555-0100"));

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..6)
            .map(|_| scope.spawn(|| workspace.run_ok(&["feedback", "c1", "hot_lead", "successful"])))
            .collect();
        for handle in handles {
            handle.join().expect("feedback thread");
        }
    });

    let weights = workspace.run_json(&["weights"]);
    assert_eq!(weights["weights"]["hot_lead"], 92);
    assert_eq!(weights["feedback_records"], 6);
    assert!(!workspace.root().join("state/state.lock").exists());
}

#[test]
fn deleted_message_template_stops_enrollment_instead_of_failing_tick() {
    let workspace = Workspace::init();
    workspace.add_contact("c1", "Ada Lovelace", Some("555-0100"));
    let enrollment = workspace.run_json(&["enroll", "c1", "cold_outreach"]);

    let templates_path = workspace.root().join("templates.json");
    let mut templates: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&templates_path).expect("read templates"))
            .expect("parse templates");
    templates["messages"]
        .as_array_mut()
        .expect("messages")
        .retain(|message| message["id"] != "intro");
    std::fs::write(
        &templates_path,
        serde_json::to_string_pretty(&templates).expect("serialize templates"),
    )
    .expect("write templates");

    let report = workspace.run_json(&["tick", "--mode", "dry-run"]);
    assert_eq!(report["emails_dry_run"], 0);
    assert_eq!(report["enrollments_stopped"], 1);
    assert_eq!(report["violations"][0]["enrollment_id"], enrollment["id"]);
    assert_eq!(report["violations"][0]["code"], "invariant_violation");

    let status = workspace.run_json(&["status"]);
    assert_eq!(status["enrollments"]["stopped"], 1);
}
