//! Error taxonomy.
//!
//! Each layer has its own small error enum (`StoreError`, `BlobError`,
//! `UploadError`, `ConfigError`, `AuthError`). Coordinators translate all of
//! them into `ServiceError`, the only error type surfaced to callers. No raw
//! backend error crosses a coordinator boundary.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
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

/// Collection of field-level validation failures.
///
/// Validation runs before any mutation begins, so a `ValidationErrors` result
/// guarantees no side effects occurred.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return `Ok(())` when no errors were collected.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for err in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", err.field, err.message)?;
            first = false;
        }
        Ok(())
    }
}

/// Persistence adapter errors.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Unique constraint violation (e.g., client code).
    #[error("duplicate value for '{field}'")]
    Duplicate { field: &'static str },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Blob store errors.
#[derive(Debug, Clone, Error)]
pub enum BlobError {
    #[error("blob not found")]
    NotFound,
    #[error("blob store I/O failed: {0}")]
    Io(String),
}

/// Upload gate rejections. The gate runs before any blob is written, so a
/// rejection means zero blobs exist for the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("too many files: maximum {max} allowed")]
    TooManyFiles { max: usize },
    #[error("file '{name}' too large: maximum {max} bytes")]
    FileTooLarge { name: String, max: u64 },
    #[error("file '{name}' has unsupported type '{content_type}'")]
    UnsupportedType { name: String, content_type: String },
}

/// Configuration resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Authentication errors from the opaque AuthN collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
}

/// The caller-facing error taxonomy.
///
/// `NotFound` deliberately covers both "resource absent" and "access scope
/// excludes it", so unauthorized callers cannot confirm a resource exists by
/// guessing its id. `AccessDenied` is used only where existence is already
/// confirmed to the caller (role-gated actions on a readable resource).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("access denied: {0}")]
    AccessDenied(&'static str),
    #[error("duplicate value for '{field}'")]
    DuplicateKey { field: &'static str },
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("operation timed out")]
    Timeout,
}

impl ServiceError {
    /// Stable machine-readable kind for API consumers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::AccessDenied(_) => "access_denied",
            Self::DuplicateKey { .. } => "duplicate_key",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Timeout => "timeout",
        }
    }

    /// Field errors when this is a validation failure.
    pub fn field_errors(&self) -> Option<&[FieldError]> {
        match self {
            Self::Validation(errors) => Some(&errors.0),
            _ => None,
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { field } => Self::DuplicateKey { field },
            StoreError::Unavailable(reason) => Self::UpstreamUnavailable(reason),
        }
    }
}

impl From<BlobError> for ServiceError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound => Self::NotFound("document"),
            BlobError::Io(reason) => Self::UpstreamUnavailable(reason),
        }
    }
}

impl From<UploadError> for ServiceError {
    fn from(err: UploadError) -> Self {
        let mut errors = ValidationErrors::new();
        errors.push("files", err.to_string());
        Self::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_collect_and_format() {
        let mut errors = ValidationErrors::new();
        assert!(errors.clone().into_result().is_ok());

        errors.push("name", "is required");
        errors.push("code", "must be 2-20 uppercase letters/numbers");
        let err = errors.into_result().expect_err("two field errors");
        assert_eq!(err.0.len(), 2);
        assert_eq!(
            err.to_string(),
            "name: is required; code: must be 2-20 uppercase letters/numbers"
        );
    }

    #[test]
    fn service_error_kinds_are_stable() {
        assert_eq!(ServiceError::NotFound("client").kind(), "not_found");
        assert_eq!(ServiceError::Timeout.kind(), "timeout");
        assert_eq!(
            ServiceError::from(StoreError::Duplicate { field: "code" }).kind(),
            "duplicate_key"
        );
        assert_eq!(
            ServiceError::from(StoreError::Unavailable("pool exhausted".into())).kind(),
            "upstream_unavailable"
        );
    }

    #[test]
    fn upload_errors_surface_as_field_validation() {
        let err = ServiceError::from(UploadError::TooManyFiles { max: 10 });
        let fields = err.field_errors().expect("validation");
        assert_eq!(fields[0].field, "files");
        assert!(fields[0].message.contains("maximum 10"));
    }
}
