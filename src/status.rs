//! Read-only workspace summary with a single suggested next command.
use crate::config::EngineConfig;
use crate::governor::ThroughputGovernor;
use crate::model::{EnrollmentStatus, TaskStatus};
use crate::store::{ContactFilter, ContactStore, SequenceStore};
use crate::util::truncate_string;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

const TITLE_WIDTH: usize = 48;

#[derive(Debug, Clone, Serialize)]
pub struct OpenTask {
    pub task_id: String,
    pub contact_id: String,
    pub enrollment_id: String,
    pub title: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NextDue {
    pub enrollment_id: String,
    pub contact_id: String,
    pub at: u64,
    pub due_now: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GovernorUsage {
    pub max_sends: u32,
    pub remaining: u32,
    pub window_start: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NextAction {
    pub command: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub generated_at: u64,
    pub sending_enabled: bool,
    pub contacts: usize,
    pub call_candidates: usize,
    pub enrollments: BTreeMap<String, usize>,
    pub open_tasks: Vec<OpenTask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_due: Option<NextDue>,
    pub due_now: usize,
    pub governor: GovernorUsage,
    pub next_action: NextAction,
}

pub fn build_status_summary(
    root: &Path,
    contacts: &dyn ContactStore,
    sequences: &dyn SequenceStore,
    governor: &ThroughputGovernor,
    config: &EngineConfig,
    now: u64,
) -> Result<StatusSummary> {
    let all_contacts = contacts.find_many(&ContactFilter::all())?;
    let call_candidates = all_contacts
        .iter()
        .filter(|contact| ContactFilter::call_candidates().matches(contact))
        .count();

    let enrollment_records = sequences.list_enrollments()?;
    let mut enrollments: BTreeMap<String, usize> = [
        EnrollmentStatus::Active,
        EnrollmentStatus::WaitingTask,
        EnrollmentStatus::Completed,
        EnrollmentStatus::Stopped,
    ]
    .iter()
    .map(|status| (status.as_str().to_string(), 0))
    .collect();
    for enrollment in &enrollment_records {
        *enrollments
            .entry(enrollment.status.as_str().to_string())
            .or_default() += 1;
    }

    let next_due = enrollment_records
        .iter()
        .filter(|enrollment| enrollment.status == EnrollmentStatus::Active)
        .filter_map(|enrollment| enrollment.next_action_at.map(|at| (at, enrollment)))
        .min_by(|(a_at, a), (b_at, b)| a_at.cmp(b_at).then_with(|| a.contact_id.cmp(&b.contact_id)))
        .map(|(at, enrollment)| NextDue {
            enrollment_id: enrollment.id.clone(),
            contact_id: enrollment.contact_id.clone(),
            at,
            due_now: at <= now,
        });
    let due_now = enrollment_records
        .iter()
        .filter(|enrollment| enrollment.is_due(now))
        .count();

    let mut open_tasks: Vec<OpenTask> = sequences
        .list_tasks()?
        .into_iter()
        .filter(|task| task.status == TaskStatus::Open)
        .map(|task| OpenTask {
            task_id: task.id,
            contact_id: task.contact_id,
            enrollment_id: task.enrollment_id,
            title: task.title,
            created_at: task.created_at,
        })
        .collect();
    open_tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.task_id.cmp(&b.task_id)));

    let snapshot = governor.snapshot();
    let governor = GovernorUsage {
        max_sends: governor.max_sends(),
        remaining: governor.remaining(now),
        window_start: snapshot.window_start,
    };

    let next_action = next_action(
        root,
        config,
        all_contacts.is_empty(),
        enrollment_records.is_empty(),
        due_now,
        open_tasks.first(),
    );

    Ok(StatusSummary {
        generated_at: now,
        sending_enabled: config.sending_enabled,
        contacts: all_contacts.len(),
        call_candidates,
        enrollments,
        open_tasks,
        next_due,
        due_now,
        governor,
        next_action,
    })
}

fn next_action(
    root: &Path,
    config: &EngineConfig,
    no_contacts: bool,
    no_enrollments: bool,
    due_now: usize,
    oldest_task: Option<&OpenTask>,
) -> NextAction {
    let workspace = root.display();
    if no_contacts {
        return NextAction {
            command: format!(
                "outreach add-contact --workspace {workspace} --id <ID> --name <NAME> --email <EMAIL>"
            ),
            reason: "workspace has no contacts".to_string(),
        };
    }
    if due_now > 0 {
        let mode = if config.sending_enabled { "send" } else { "dry-run" };
        return NextAction {
            command: format!("outreach tick --workspace {workspace} --mode {mode}"),
            reason: format!("{due_now} enrollment step(s) are due"),
        };
    }
    if let Some(task) = oldest_task {
        return NextAction {
            command: format!("outreach complete-task --workspace {workspace} {}", task.task_id),
            reason: format!("enrollment {} is waiting on this task", task.enrollment_id),
        };
    }
    if no_enrollments {
        return NextAction {
            command: format!("outreach enroll --workspace {workspace} <CONTACT_ID> <SEQUENCE_ID>"),
            reason: "no contact is enrolled in a sequence".to_string(),
        };
    }
    NextAction {
        command: format!("outreach rank --workspace {workspace}"),
        reason: "no sequence work is due; review who to call".to_string(),
    }
}

pub fn print_status(root: &Path, summary: &StatusSummary) {
    println!("workspace: {}", root.display());
    println!(
        "sending: {}",
        if summary.sending_enabled { "enabled" } else { "disabled" }
    );
    println!(
        "contacts: {} ({} callable)",
        summary.contacts, summary.call_candidates
    );
    let counts: Vec<String> = summary
        .enrollments
        .iter()
        .map(|(status, count)| format!("{status}={count}"))
        .collect();
    println!("enrollments: {}", counts.join(" "));
    match summary.next_due.as_ref() {
        Some(next) if next.due_now => println!(
            "next due: {} ({}) now, {} due in total",
            next.enrollment_id, next.contact_id, summary.due_now
        ),
        Some(next) => println!(
            "next due: {} ({}) at {}",
            next.enrollment_id, next.contact_id, next.at
        ),
        None => println!("next due: none"),
    }
    println!(
        "send window: {}/{} remaining",
        summary.governor.remaining, summary.governor.max_sends
    );
    if !summary.open_tasks.is_empty() {
        println!("open tasks:");
        for task in &summary.open_tasks {
            println!(
                "  - {} [{}] {}",
                task.task_id,
                task.contact_id,
                truncate_string(&task.title, TITLE_WIDTH)
            );
        }
    }
    println!("next: {}", summary.next_action.command);
    println!("next detail: {}", summary.next_action.reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_config, ThroughputConfig};
    use crate::model::{Contact, Enrollment, Task};
    use crate::store::MemoryStore;

    fn enrollment(id: &str, contact_id: &str, next_action_at: Option<u64>) -> Enrollment {
        Enrollment {
            id: id.to_string(),
            contact_id: contact_id.to_string(),
            sequence_id: "drip".to_string(),
            status: if next_action_at.is_some() {
                EnrollmentStatus::Active
            } else {
                EnrollmentStatus::WaitingTask
            },
            current_step_index: 0,
            next_action_at,
            waiting_task_id: next_action_at.is_none().then(|| "t1".to_string()),
            events: Vec::new(),
            enrolled_at: 0,
            updated_at: 0,
            finished_at: None,
            stop_reason: None,
        }
    }

    #[test]
    fn empty_workspace_suggests_adding_contacts() {
        let store = MemoryStore::new();
        let governor = ThroughputGovernor::new(&ThroughputConfig::default());
        let summary = build_status_summary(
            Path::new("/ws"),
            &store,
            &store,
            &governor,
            &default_config(),
            0,
        )
        .expect("summary");
        assert_eq!(summary.contacts, 0);
        assert_eq!(summary.enrollments["active"], 0);
        assert!(summary.next_action.command.starts_with("outreach add-contact"));
    }

    #[test]
    fn due_steps_win_over_open_tasks() {
        let store = MemoryStore::with_contacts([
            Contact::new("a", "A", "a@example.com", 0),
            Contact::new("b", "B", "b@example.com", 0).with_phone("555"),
        ]);
        store.save_enrollment(&enrollment("e1", "a", Some(10))).expect("save");
        store.save_enrollment(&enrollment("e2", "b", None)).expect("save");
        store
            .save_task(&Task {
                id: "t1".to_string(),
                contact_id: "b".to_string(),
                enrollment_id: "e2".to_string(),
                title: "Call B".to_string(),
                description: String::new(),
                status: TaskStatus::Open,
                created_at: 5,
                completed_at: None,
            })
            .expect("save task");
        let governor = ThroughputGovernor::new(&ThroughputConfig::default());
        let config = default_config();

        let due = build_status_summary(Path::new("/ws"), &store, &store, &governor, &config, 10)
            .expect("summary");
        assert_eq!(due.call_candidates, 1);
        assert_eq!(due.due_now, 1);
        assert_eq!(due.enrollments["waiting_task"], 1);
        assert_eq!(
            due.next_action.command,
            "outreach tick --workspace /ws --mode dry-run"
        );

        let waiting = build_status_summary(Path::new("/ws"), &store, &store, &governor, &config, 9)
            .expect("summary");
        assert_eq!(waiting.open_tasks.len(), 1);
        assert_eq!(
            waiting.next_action.command,
            "outreach complete-task --workspace /ws t1"
        );
    }
}
