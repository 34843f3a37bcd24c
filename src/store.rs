//! Persistence seams for contacts, enrollments, and tasks.
//!
//! The engines operate exclusively through these traits so the state machine
//! never assumes a storage medium. `MemoryStore` backs tests and embedding;
//! `JsonFileStore` backs the CLI workspace.
mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use crate::model::{Contact, Enrollment, Interaction, Stage, Task};
use anyhow::Result;

/// Candidate-pool filter for `ContactStore::find_many`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactFilter {
    pub has_phone: Option<bool>,
    pub opted_out: Option<bool>,
    pub stage: Option<Stage>,
}

impl ContactFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Contacts a caller could ring right now.
    pub fn call_candidates() -> Self {
        Self {
            has_phone: Some(true),
            opted_out: Some(false),
            stage: None,
        }
    }

    pub fn matches(&self, contact: &Contact) -> bool {
        self.has_phone.is_none_or(|want| contact.has_phone() == want)
            && self.opted_out.is_none_or(|want| contact.opted_out == want)
            && self.stage.is_none_or(|want| contact.stage == want)
    }
}

pub trait ContactStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Contact>>;

    /// Matching contacts ordered by id.
    fn find_many(&self, filter: &ContactFilter) -> Result<Vec<Contact>>;

    fn save(&self, contact: &Contact) -> Result<()>;

    /// Read-modify-write one contact under the store's own lock and return
    /// the updated record, or `None` when the contact does not exist.
    fn update(&self, id: &str, apply: &mut dyn FnMut(&mut Contact)) -> Result<Option<Contact>>;

    /// Append to the contact's interaction log and return the updated record.
    fn append_interaction(&self, id: &str, interaction: Interaction) -> Result<Contact>;
}

pub trait SequenceStore: Send + Sync {
    fn get_enrollment(&self, id: &str) -> Result<Option<Enrollment>>;

    /// Every enrollment, terminal ones included.
    fn list_enrollments(&self) -> Result<Vec<Enrollment>>;

    fn save_enrollment(&self, enrollment: &Enrollment) -> Result<()>;

    fn get_task(&self, id: &str) -> Result<Option<Task>>;

    fn list_tasks(&self) -> Result<Vec<Task>>;

    fn save_task(&self, task: &Task) -> Result<()>;

    fn enrollments_for_contact(&self, contact_id: &str) -> Result<Vec<Enrollment>> {
        Ok(self
            .list_enrollments()?
            .into_iter()
            .filter(|enrollment| enrollment.contact_id == contact_id)
            .collect())
    }
}

/// Records keyed by a stable string id.
pub(crate) trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Contact {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Enrollment {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Task {
    fn key(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_candidates_need_phone_and_consent() {
        let filter = ContactFilter::call_candidates();
        let reachable = Contact::new("a", "A", "a@example.com", 0).with_phone("+1 555 0100");
        let mut opted_out = reachable.clone();
        opted_out.opted_out = true;
        let no_phone = Contact::new("b", "B", "b@example.com", 0);

        assert!(filter.matches(&reachable));
        assert!(!filter.matches(&opted_out));
        assert!(!filter.matches(&no_phone));
        assert!(ContactFilter::all().matches(&no_phone));
    }
}
