use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};

/// A single offending field inside a `ValidationFailed` error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors surfaced by the workflow core.
///
/// All of these are caller-visible failures. The core never retries and
/// never partially commits; a batch either fully applies or fully fails.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum WorkflowError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    /// One or more request fields failed validation. The offending fields
    /// are reported individually so callers can surface them verbatim.
    #[error("Validation failed: {}", format_field_errors(.0))]
    ValidationFailed(Vec<FieldError>),

    /// The requested (from, to) pair is absent from the transition table,
    /// or present but not permitted for the acting role.
    #[error("Transition denied ({from} -> {to}): {reason}")]
    TransitionDenied {
        from: String,
        to: String,
        reason: String,
    },

    /// The actor's capability set does not include the attempted action
    /// in the requisition's current status.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Mutation of a soft-deleted or terminal record, e.g. reclassifying
    /// a purchase-rejected item.
    #[error("Conflict: {0}")]
    ConflictStale(String),

    #[error("Event error: {0}")]
    EventError(String),
}

impl WorkflowError {
    /// Shorthand for a single-field validation failure.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        WorkflowError::ValidationFailed(vec![FieldError::new(field, message)])
    }

    pub fn transition_denied(
        from: impl ToString,
        to: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        WorkflowError::TransitionDenied {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.into(),
        }
    }

    pub fn db_error(err: DbErr) -> Self {
        WorkflowError::DatabaseError(err)
    }
}

impl From<validator::ValidationErrors> for WorkflowError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    FieldError::new(field, message)
                })
            })
            .collect();
        WorkflowError::ValidationFailed(fields)
    }
}

fn format_field_errors(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_every_offending_field() {
        let err = WorkflowError::ValidationFailed(vec![
            FieldError::new("reason", "too short"),
            FieldError::new("cantidad_aprobada", "exceeds requested quantity"),
        ]);
        let rendered = err.to_string();
        assert!(rendered.contains("reason: too short"));
        assert!(rendered.contains("cantidad_aprobada: exceeds requested quantity"));
    }

    #[test]
    fn transition_denied_names_both_endpoints() {
        let err = WorkflowError::transition_denied("RECHAZADO_COMPRA", "EN_STOCK", "absorbing");
        assert_eq!(
            err.to_string(),
            "Transition denied (RECHAZADO_COMPRA -> EN_STOCK): absorbing"
        );
    }
}
