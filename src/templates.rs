//! Template registry: message content and sequence definitions.
//!
//! Lookups are pure. The registry is loaded per process, so edits to
//! `templates.json` apply to in-flight enrollments on the next tick.
use crate::error::{EngineError, EngineResult, EntityKind};
use crate::model::{Contact, MessageTemplate, SequenceTemplate, StepDef};
use crate::workspace::{write_json_atomic, WorkspacePaths};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;

pub const TEMPLATES_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_TEMPLATES_JSON: &str = include_str!("../defaults/templates.json");

/// On-disk shape of `templates.json`.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TemplatesFile {
    pub schema_version: u32,
    #[serde(default)]
    pub messages: Vec<MessageTemplate>,
    #[serde(default)]
    pub sequences: Vec<SequenceTemplate>,
}

/// Rendered subject/body ready for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedMessage {
    pub template_id: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    messages: BTreeMap<String, MessageTemplate>,
    sequences: BTreeMap<String, SequenceTemplate>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated from the built-in defaults.
    pub fn builtin() -> Result<Self> {
        let file: TemplatesFile =
            serde_json::from_str(DEFAULT_TEMPLATES_JSON).context("parse built-in templates")?;
        let registry = Self::from_file(file)?;
        registry.validate().context("validate built-in templates")?;
        Ok(registry)
    }

    /// Build a registry without cross-checking references; dangling
    /// references surface per enrollment when a step runs.
    pub fn from_file(file: TemplatesFile) -> Result<Self> {
        if file.schema_version != TEMPLATES_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported templates schema_version {}",
                file.schema_version
            ));
        }
        let mut registry = Self::new();
        for message in file.messages {
            registry.insert_message(message);
        }
        for sequence in file.sequences {
            registry.insert_sequence(sequence);
        }
        Ok(registry)
    }

    pub fn to_file(&self) -> TemplatesFile {
        TemplatesFile {
            schema_version: TEMPLATES_SCHEMA_VERSION,
            messages: self.messages.values().cloned().collect(),
            sequences: self.sequences.values().cloned().collect(),
        }
    }

    pub fn insert_message(&mut self, message: MessageTemplate) {
        self.messages.insert(message.id.clone(), message);
    }

    pub fn insert_sequence(&mut self, sequence: SequenceTemplate) {
        self.sequences.insert(sequence.id.clone(), sequence);
    }

    pub fn remove_sequence(&mut self, id: &str) -> Option<SequenceTemplate> {
        self.sequences.remove(id)
    }

    pub fn remove_message(&mut self, id: &str) -> Option<MessageTemplate> {
        self.messages.remove(id)
    }

    pub fn resolve_message(&self, id: &str) -> EngineResult<&MessageTemplate> {
        self.messages
            .get(id)
            .ok_or_else(|| EngineError::not_found(EntityKind::MessageTemplate, id))
    }

    pub fn resolve_sequence(&self, id: &str) -> EngineResult<&SequenceTemplate> {
        self.sequences
            .get(id)
            .ok_or_else(|| EngineError::not_found(EntityKind::SequenceTemplate, id))
    }

    pub fn sequence_ids(&self) -> impl Iterator<Item = &str> {
        self.sequences.keys().map(String::as_str)
    }

    /// Every email step must point at a known message template.
    pub fn validate(&self) -> Result<()> {
        for (id, sequence) in &self.sequences {
            if id.trim().is_empty() {
                return Err(anyhow!("sequence ids must be non-empty"));
            }
            for (index, step) in sequence.steps.iter().enumerate() {
                match step {
                    StepDef::Email { template_id, .. } => {
                        if !self.messages.contains_key(template_id) {
                            return Err(anyhow!(
                                "sequence {id} step {index} references unknown message template {template_id:?}"
                            ));
                        }
                    }
                    StepDef::Task { title, .. } => {
                        if title.trim().is_empty() {
                            return Err(anyhow!("sequence {id} step {index} has an empty task title"));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolve and render a message for a specific contact.
    pub fn render_message(&self, template_id: &str, contact: &Contact) -> EngineResult<RenderedMessage> {
        let template = self.resolve_message(template_id)?;
        let variables = contact_variables(contact);
        Ok(RenderedMessage {
            template_id: template.id.clone(),
            subject: render_text(&template.subject, &variables),
            body: render_text(&template.body, &variables),
        })
    }
}

/// Substitution variables exposed to templates.
pub fn contact_variables(contact: &Contact) -> BTreeMap<&'static str, String> {
    let mut variables = BTreeMap::new();
    variables.insert("first_name", contact.first_name().to_string());
    variables.insert("name", contact.name.clone());
    variables.insert(
        "company",
        contact
            .company
            .clone()
            .unwrap_or_else(|| "your team".to_string()),
    );
    variables.insert("email", contact.email.clone());
    variables
}

/// Replace `{{var}}` placeholders; unknown placeholders are left verbatim.
pub fn render_text(text: &str, variables: &BTreeMap<&'static str, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = after[..end].trim();
        match variables.get(key) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Load `templates.json`, falling back to built-ins when it is absent.
pub fn load_templates(paths: &WorkspacePaths) -> Result<TemplateRegistry> {
    let path = paths.templates_path();
    if !path.is_file() {
        return TemplateRegistry::builtin();
    }
    let bytes = fs::read(&path).with_context(|| format!("read templates {}", path.display()))?;
    let file: TemplatesFile =
        serde_json::from_slice(&bytes).context("parse templates JSON")?;
    let registry =
        TemplateRegistry::from_file(file).with_context(|| format!("load {}", path.display()))?;
    if let Err(err) = registry.validate() {
        tracing::warn!(
            path = %path.display(),
            error = %err,
            "templates reference missing entries; affected enrollments stop when their step runs"
        );
    }
    Ok(registry)
}

/// Validate and persist the registry.
pub fn write_templates(paths: &WorkspacePaths, registry: &TemplateRegistry) -> Result<()> {
    registry.validate().context("refusing to write invalid templates")?;
    write_json_atomic(&paths.templates_path(), &registry.to_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_templates_validate() {
        let registry = TemplateRegistry::builtin().expect("built-in templates");
        let sequence = registry
            .resolve_sequence("cold_outreach")
            .expect("cold outreach sequence");
        assert_eq!(sequence.steps.len(), 4);
        assert!(registry.resolve_message("intro").is_ok());
    }

    fn dangling_file() -> TemplatesFile {
        TemplatesFile {
            schema_version: TEMPLATES_SCHEMA_VERSION,
            messages: Vec::new(),
            sequences: vec![
                SequenceTemplate {
                    id: "s".to_string(),
                    name: String::new(),
                    steps: vec![StepDef::Email {
                        template_id: "missing".to_string(),
                        delay_days: 0,
                    }],
                },
                SequenceTemplate {
                    id: "empty".to_string(),
                    name: String::new(),
                    steps: Vec::new(),
                },
            ],
        }
    }

    #[test]
    fn unknown_message_reference_fails_validation_and_write() {
        let registry = TemplateRegistry::from_file(dangling_file()).expect("lenient build");
        let err = registry.validate().expect_err("missing template");
        assert!(err.to_string().contains("missing"));

        let dir = tempfile::tempdir().expect("temp dir");
        let paths = WorkspacePaths::new(dir.path().to_path_buf());
        assert!(write_templates(&paths, &registry).is_err());
        assert!(!paths.templates_path().exists());
    }

    #[test]
    fn load_tolerates_dangling_references() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = WorkspacePaths::new(dir.path().to_path_buf());
        write_json_atomic(&paths.templates_path(), &dangling_file()).expect("write raw");

        let registry = load_templates(&paths).expect("load");
        assert!(registry.resolve_sequence("s").is_ok());
        assert_eq!(
            registry.resolve_message("missing").expect_err("miss").code(),
            "not_found"
        );
    }

    #[test]
    fn empty_sequences_are_valid() {
        let mut registry = TemplateRegistry::new();
        registry.insert_sequence(SequenceTemplate {
            id: "empty".to_string(),
            name: String::new(),
            steps: Vec::new(),
        });
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn render_substitutes_known_variables_only() {
        let contact = Contact::new("c1", "Grace Hopper", "grace@example.com", 0)
            .with_company("Navy");
        let variables = contact_variables(&contact);
        assert_eq!(
            render_text("Hi {{ first_name }} at {{company}} {{unknown}} {{", &variables),
            "Hi Grace at Navy {{unknown}} {{"
        );
    }

    #[test]
    fn lookup_miss_is_not_found() {
        let registry = TemplateRegistry::new();
        let err = registry.resolve_sequence("nope").expect_err("miss");
        assert_eq!(err.code(), "not_found");
    }
}
