//! Input validation shared by sequence and campaign authoring.

use thiserror::Error;

/// Longest accepted name or subject line, in characters
pub const MAX_TITLE_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("{field} must be at most {max} characters, got {len}")]
    TooLong {
        field: &'static str,
        max: usize,
        len: usize,
    },

    #[error("At least one step is required")]
    NoSteps,

    #[error("Step {order}: {source}")]
    Step {
        order: usize,
        #[source]
        source: Box<ValidationError>,
    },

    #[error("Valid email required")]
    InvalidEmail,
}

/// Check a required, length-bounded text field
pub fn title(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required { field });
    }

    let len = value.chars().count();
    if len > MAX_TITLE_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_TITLE_LEN,
            len,
        });
    }

    Ok(())
}

/// Check a required body field
pub fn body(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Required { field })
    } else {
        Ok(())
    }
}

/// Minimal address sanity check; deliverability is the transport's concern
pub fn email(value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ValidationError::InvalidEmail),
    }
}
