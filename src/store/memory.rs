use super::{ContactFilter, ContactStore, Keyed, SequenceStore};
use crate::model::{Contact, Enrollment, Interaction, Task};
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// In-process store backing tests and embedders.
#[derive(Debug, Default)]
pub struct MemoryStore {
    contacts: Mutex<BTreeMap<String, Contact>>,
    enrollments: Mutex<BTreeMap<String, Enrollment>>,
    tasks: Mutex<BTreeMap<String, Task>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn upsert<T: Keyed + Clone>(map: &Mutex<BTreeMap<String, T>>, record: &T) {
    lock(map).insert(record.key().to_string(), record.clone());
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contacts(contacts: impl IntoIterator<Item = Contact>) -> Self {
        let store = Self::new();
        {
            let mut map = lock(&store.contacts);
            for contact in contacts {
                map.insert(contact.id.clone(), contact);
            }
        }
        store
    }
}

impl ContactStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<Contact>> {
        Ok(lock(&self.contacts).get(id).cloned())
    }

    fn find_many(&self, filter: &ContactFilter) -> Result<Vec<Contact>> {
        Ok(lock(&self.contacts)
            .values()
            .filter(|contact| filter.matches(contact))
            .cloned()
            .collect())
    }

    fn save(&self, contact: &Contact) -> Result<()> {
        upsert(&self.contacts, contact);
        Ok(())
    }

    fn update(&self, id: &str, apply: &mut dyn FnMut(&mut Contact)) -> Result<Option<Contact>> {
        let mut contacts = lock(&self.contacts);
        Ok(contacts.get_mut(id).map(|contact| {
            apply(contact);
            contact.clone()
        }))
    }

    fn append_interaction(&self, id: &str, interaction: Interaction) -> Result<Contact> {
        let mut contacts = lock(&self.contacts);
        let contact = contacts
            .get_mut(id)
            .ok_or_else(|| anyhow!("contact {id} does not exist"))?;
        contact.push_interaction(interaction);
        Ok(contact.clone())
    }
}

impl SequenceStore for MemoryStore {
    fn get_enrollment(&self, id: &str) -> Result<Option<Enrollment>> {
        Ok(lock(&self.enrollments).get(id).cloned())
    }

    fn list_enrollments(&self) -> Result<Vec<Enrollment>> {
        Ok(lock(&self.enrollments).values().cloned().collect())
    }

    fn save_enrollment(&self, enrollment: &Enrollment) -> Result<()> {
        upsert(&self.enrollments, enrollment);
        Ok(())
    }

    fn get_task(&self, id: &str) -> Result<Option<Task>> {
        Ok(lock(&self.tasks).get(id).cloned())
    }

    fn list_tasks(&self) -> Result<Vec<Task>> {
        Ok(lock(&self.tasks).values().cloned().collect())
    }

    fn save_task(&self, task: &Task) -> Result<()> {
        upsert(&self.tasks, task);
        Ok(())
    }
}
