//! Action dispatcher seam: the only place messages leave the process.
//!
//! Real providers (mail, SMS, CRM tasks) implement `ActionDispatcher`. The
//! CLI ships `OutboxDispatcher`, which appends every dispatched action to
//! `state/outbox.jsonl` for a downstream sender to drain.
use crate::util::{now_epoch_ms, sha256_hex};
use crate::workspace::append_jsonl;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Transient failure reported by a dispatcher. The engine never retries
/// within one run; the step stays pending for the next tick.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("delivery failed: {message}")]
pub struct DeliveryError {
    pub message: String,
}

impl DeliveryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Fully rendered message plus the variables used to render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRequest {
    pub contact_id: String,
    pub to: String,
    pub template_id: String,
    pub subject: String,
    pub body: String,
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub sent: bool,
    pub provider_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRequest {
    pub contact_id: String,
    pub title: String,
    pub description: String,
}

pub trait ActionDispatcher: Send + Sync {
    fn send_templated_message(&self, request: &MessageRequest) -> Result<SendReceipt, DeliveryError>;

    /// Open a human task and return its id.
    fn create_task(&self, request: &TaskRequest) -> Result<String, DeliveryError>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboxEntry {
    Email {
        at: u64,
        provider_id: String,
        contact_id: String,
        to: String,
        template_id: String,
        subject: String,
        body: String,
    },
    Task {
        at: u64,
        task_id: String,
        contact_id: String,
        title: String,
        description: String,
    },
}

/// Appends dispatched actions to a JSONL outbox.
#[derive(Debug, Clone)]
pub struct OutboxDispatcher {
    path: PathBuf,
}

impl OutboxDispatcher {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn append(&self, entry: &OutboxEntry) -> Result<(), DeliveryError> {
        append_jsonl(&self.path, entry).map_err(|err| DeliveryError::new(format!("{err:#}")))
    }
}

fn clock() -> Result<u64, DeliveryError> {
    now_epoch_ms().map_err(|err| DeliveryError::new(format!("{err:#}")))
}

impl ActionDispatcher for OutboxDispatcher {
    fn send_templated_message(&self, request: &MessageRequest) -> Result<SendReceipt, DeliveryError> {
        if request.to.trim().is_empty() {
            return Err(DeliveryError::new(format!(
                "contact {} has no email address",
                request.contact_id
            )));
        }
        let at = clock()?;
        let digest = sha256_hex(
            format!("{}\n{}\n{}\n{at}", request.contact_id, request.template_id, request.body).as_bytes(),
        );
        let provider_id = format!("outbox-{}", &digest[..16]);
        self.append(&OutboxEntry::Email {
            at,
            provider_id: provider_id.clone(),
            contact_id: request.contact_id.clone(),
            to: request.to.clone(),
            template_id: request.template_id.clone(),
            subject: request.subject.clone(),
            body: request.body.clone(),
        })?;
        Ok(SendReceipt {
            sent: true,
            provider_id,
        })
    }

    fn create_task(&self, request: &TaskRequest) -> Result<String, DeliveryError> {
        let task_id = format!("task-{}", uuid::Uuid::new_v4().simple());
        self.append(&OutboxEntry::Task {
            at: clock()?,
            task_id: task_id.clone(),
            contact_id: request.contact_id.clone(),
            title: request.title.clone(),
            description: request.description.clone(),
        })?;
        Ok(task_id)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::read_jsonl;

    #[test]
    fn outbox_appends_email_and_task_entries() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("outbox.jsonl");
        let dispatcher = OutboxDispatcher::new(path.clone());

        let receipt = dispatcher
            .send_templated_message(&MessageRequest {
                contact_id: "c1".to_string(),
                to: "c1@example.com".to_string(),
                template_id: "intro".to_string(),
                subject: "Hi".to_string(),
                body: "Hello".to_string(),
                variables: BTreeMap::new(),
            })
            .expect("send");
        assert!(receipt.sent);
        assert!(receipt.provider_id.starts_with("outbox-"));

        let task_id = dispatcher
            .create_task(&TaskRequest {
                contact_id: "c1".to_string(),
                title: "Call".to_string(),
                description: String::new(),
            })
            .expect("task");
        assert!(task_id.starts_with("task-"));

        let entries: Vec<OutboxEntry> = read_jsonl(&path).expect("read outbox");
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[1], OutboxEntry::Task { .. }));
    }

    #[test]
    fn missing_address_is_a_delivery_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let dispatcher = OutboxDispatcher::new(dir.path().join("outbox.jsonl"));
        let err = dispatcher
            .send_templated_message(&MessageRequest {
                contact_id: "c1".to_string(),
                to: " ".to_string(),
                template_id: "intro".to_string(),
                subject: String::new(),
                body: String::new(),
                variables: BTreeMap::new(),
            })
            .expect_err("no address");
        assert!(err.message.contains("no email"));
    }
}
