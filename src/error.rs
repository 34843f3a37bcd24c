//! Error taxonomy for engine-level operations.
//!
//! Repository and file helpers stay on `anyhow`; anything crossing the engine
//! boundary is classified here so callers can tell caller mistakes from
//! transient delivery failures.
use crate::dispatch::DeliveryError;
use std::fmt;
use thiserror::Error;

/// Entity kinds named in `NotFound` errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Contact,
    SequenceTemplate,
    MessageTemplate,
    Enrollment,
    Task,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Contact => "contact",
            EntityKind::SequenceTemplate => "sequence template",
            EntityKind::MessageTemplate => "message template",
            EntityKind::Enrollment => "enrollment",
            EntityKind::Task => "task",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown contact, template, enrollment, or task. Not retried.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Caller asked for something the configuration forbids.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transient failure from the action dispatcher.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// State that should be impossible; auto-resolved where it is detected.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The contact already runs a different sequence.
    #[error("contact {contact_id} already has active enrollment {enrollment_id}")]
    AlreadyEnrolled {
        contact_id: String,
        enrollment_id: String,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable code used in reports and JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "not_found",
            EngineError::Configuration(_) => "configuration_error",
            EngineError::Delivery(_) => "delivery_error",
            EngineError::InvariantViolation(_) => "invariant_violation",
            EngineError::AlreadyEnrolled { .. } => "already_enrolled",
            EngineError::Storage(_) => "storage_error",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_kind_and_id() {
        let err = EngineError::not_found(EntityKind::SequenceTemplate, "onboarding");
        assert_eq!(err.to_string(), "sequence template not found: onboarding");
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn delivery_errors_keep_their_message() {
        let err: EngineError = DeliveryError::new("smtp timeout").into();
        assert_eq!(err.code(), "delivery_error");
        assert!(err.to_string().contains("smtp timeout"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineError>();
    }
}
