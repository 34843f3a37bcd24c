use super::{ContactFilter, ContactStore, Keyed, SequenceStore};
use crate::model::{Contact, Enrollment, Interaction, Task};
use crate::workspace::{read_json_optional, write_json_atomic, WorkspacePaths};
use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Workspace-backed store: one pretty JSON array per record kind.
///
/// Every mutation rewrites its file atomically before returning, so an
/// advanced enrollment is durable before the engine moves on.
#[derive(Debug)]
pub struct JsonFileStore {
    paths: WorkspacePaths,
    io: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(paths: WorkspacePaths) -> Self {
        Self {
            paths,
            io: Mutex::new(()),
        }
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.io.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn load_records<T: DeserializeOwned + Keyed>(path: &Path) -> Result<BTreeMap<String, T>> {
    let records: Vec<T> = read_json_optional(path)?.unwrap_or_default();
    Ok(records
        .into_iter()
        .map(|record| (record.key().to_string(), record))
        .collect())
}

fn store_records<T: Serialize>(path: &Path, records: &BTreeMap<String, T>) -> Result<()> {
    let ordered: Vec<&T> = records.values().collect();
    write_json_atomic(path, &ordered)
}

fn upsert_record<T: DeserializeOwned + Serialize + Keyed + Clone>(path: &Path, record: &T) -> Result<()> {
    let mut records = load_records::<T>(path)?;
    records.insert(record.key().to_string(), record.clone());
    store_records(path, &records)
}

impl ContactStore for JsonFileStore {
    fn get(&self, id: &str) -> Result<Option<Contact>> {
        let _guard = self.guard();
        Ok(load_records::<Contact>(&self.paths.contacts_path())?.remove(id))
    }

    fn find_many(&self, filter: &ContactFilter) -> Result<Vec<Contact>> {
        let _guard = self.guard();
        Ok(load_records::<Contact>(&self.paths.contacts_path())?
            .into_values()
            .filter(|contact| filter.matches(contact))
            .collect())
    }

    fn save(&self, contact: &Contact) -> Result<()> {
        let _guard = self.guard();
        upsert_record(&self.paths.contacts_path(), contact)
    }

    fn update(&self, id: &str, apply: &mut dyn FnMut(&mut Contact)) -> Result<Option<Contact>> {
        let _guard = self.guard();
        let path = self.paths.contacts_path();
        let mut contacts = load_records::<Contact>(&path)?;
        let Some(contact) = contacts.get_mut(id) else {
            return Ok(None);
        };
        apply(contact);
        let updated = contact.clone();
        store_records(&path, &contacts)?;
        Ok(Some(updated))
    }

    fn append_interaction(&self, id: &str, interaction: Interaction) -> Result<Contact> {
        let _guard = self.guard();
        let path = self.paths.contacts_path();
        let mut contacts = load_records::<Contact>(&path)?;
        let contact = contacts
            .get_mut(id)
            .ok_or_else(|| anyhow!("contact {id} does not exist"))?;
        contact.push_interaction(interaction);
        let updated = contact.clone();
        store_records(&path, &contacts)?;
        Ok(updated)
    }
}

impl SequenceStore for JsonFileStore {
    fn get_enrollment(&self, id: &str) -> Result<Option<Enrollment>> {
        let _guard = self.guard();
        Ok(load_records::<Enrollment>(&self.paths.enrollments_path())?.remove(id))
    }

    fn list_enrollments(&self) -> Result<Vec<Enrollment>> {
        let _guard = self.guard();
        Ok(load_records::<Enrollment>(&self.paths.enrollments_path())?
            .into_values()
            .collect())
    }

    fn save_enrollment(&self, enrollment: &Enrollment) -> Result<()> {
        let _guard = self.guard();
        upsert_record(&self.paths.enrollments_path(), enrollment)
    }

    fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let _guard = self.guard();
        Ok(load_records::<Task>(&self.paths.tasks_path())?.remove(id))
    }

    fn list_tasks(&self) -> Result<Vec<Task>> {
        let _guard = self.guard();
        Ok(load_records::<Task>(&self.paths.tasks_path())?.into_values().collect())
    }

    fn save_task(&self, task: &Task) -> Result<()> {
        let _guard = self.guard();
        upsert_record(&self.paths.tasks_path(), task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InteractionKind;

    #[test]
    fn contacts_persist_across_store_instances() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = WorkspacePaths::new(dir.path().to_path_buf());
        let store = JsonFileStore::new(paths.clone());
        store
            .save(&Contact::new("b", "Bea", "b@example.com", 0).with_phone("1"))
            .expect("save b");
        store
            .save(&Contact::new("a", "Al", "a@example.com", 0))
            .expect("save a");
        store
            .append_interaction("a", Interaction::new(InteractionKind::EmailReplied, 7))
            .expect("append");

        let reopened = JsonFileStore::new(paths);
        let all = reopened.find_many(&ContactFilter::all()).expect("find");
        let ids: Vec<_> = all.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(all[0].interactions.len(), 1);
        assert!(reopened
            .append_interaction("zzz", Interaction::new(InteractionKind::Note, 1))
            .is_err());
    }

    #[test]
    fn update_keeps_interactions_written_by_other_handles() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = WorkspacePaths::new(dir.path().to_path_buf());
        let first = JsonFileStore::new(paths.clone());
        let second = JsonFileStore::new(paths);
        first
            .save(&Contact::new("a", "Al", "a@example.com", 0))
            .expect("save");
        second
            .append_interaction("a", Interaction::new(InteractionKind::CallPlaced, 3))
            .expect("append");

        let updated = first
            .update("a", &mut |contact| contact.active_enrollment = Some("enr-1".to_string()))
            .expect("update")
            .expect("contact exists");
        assert_eq!(updated.interactions.len(), 1);
        assert_eq!(updated.active_enrollment.as_deref(), Some("enr-1"));
        assert!(first.update("zzz", &mut |_| {}).expect("update").is_none());
    }
}
