//! Document upload gate.
//!
//! Files arrive fully buffered and the whole batch is validated before a
//! single blob is written, so acceptance is all-or-nothing per request: a
//! rejection guarantees zero blobs exist for the batch.

use bytes::Bytes;

use crate::error::UploadError;

/// Allowed upload MIME types out of the box.
pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "text/plain",
    "text/csv",
    "image/jpeg",
    "image/png",
    "image/gif",
    "application/zip",
    "application/x-rar-compressed",
];

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_FILES: usize = 10;

/// Per-request upload limits.
#[derive(Debug, Clone)]
pub struct UploadConstraints {
    pub max_count: usize,
    pub max_size_per_file: u64,
    pub allowed_mime_types: Vec<String>,
}

impl Default for UploadConstraints {
    fn default() -> Self {
        Self {
            max_count: DEFAULT_MAX_FILES,
            max_size_per_file: DEFAULT_MAX_FILE_SIZE,
            allowed_mime_types: DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl UploadConstraints {
    pub fn allows_type(&self, content_type: &str) -> bool {
        self.allowed_mime_types.iter().any(|t| t == content_type)
    }
}

/// An incoming file, buffered in memory until the batch is accepted.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl IncomingFile {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Validate a batch against the constraints. Fails on the first violation;
/// nothing has touched the blob store yet at this point.
pub fn validate_batch(
    files: &[IncomingFile],
    constraints: &UploadConstraints,
) -> Result<(), UploadError> {
    if files.len() > constraints.max_count {
        return Err(UploadError::TooManyFiles {
            max: constraints.max_count,
        });
    }
    for file in files {
        if file.size() > constraints.max_size_per_file {
            return Err(UploadError::FileTooLarge {
                name: file.original_name.clone(),
                max: constraints.max_size_per_file,
            });
        }
        if !constraints.allows_type(&file.content_type) {
            return Err(UploadError::UnsupportedType {
                name: file.original_name.clone(),
                content_type: file.content_type.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, content_type: &str, size: usize) -> IncomingFile {
        IncomingFile {
            original_name: name.to_string(),
            content_type: content_type.to_string(),
            bytes: Bytes::from(vec![0u8; size]),
        }
    }

    #[test]
    fn accepts_a_batch_within_limits() {
        let files = vec![
            file("a.pdf", "application/pdf", 1024),
            file("b.png", "image/png", 2048),
        ];
        assert!(validate_batch(&files, &UploadConstraints::default()).is_ok());
    }

    #[test]
    fn rejects_too_many_files() {
        let constraints = UploadConstraints {
            max_count: 2,
            ..UploadConstraints::default()
        };
        let files = vec![
            file("a.pdf", "application/pdf", 10),
            file("b.pdf", "application/pdf", 10),
            file("c.pdf", "application/pdf", 10),
        ];
        assert_eq!(
            validate_batch(&files, &constraints),
            Err(UploadError::TooManyFiles { max: 2 })
        );
    }

    #[test]
    fn rejects_oversized_file_by_name() {
        let constraints = UploadConstraints {
            max_size_per_file: 100,
            ..UploadConstraints::default()
        };
        let files = vec![
            file("ok.pdf", "application/pdf", 50),
            file("big.pdf", "application/pdf", 101),
        ];
        assert_eq!(
            validate_batch(&files, &constraints),
            Err(UploadError::FileTooLarge {
                name: "big.pdf".to_string(),
                max: 100
            })
        );
    }

    #[test]
    fn rejects_unsupported_type_anywhere_in_the_batch() {
        let files = vec![
            file("ok.pdf", "application/pdf", 10),
            file("script.sh", "application/x-sh", 10),
            file("also-ok.png", "image/png", 10),
        ];
        let err = validate_batch(&files, &UploadConstraints::default()).expect_err("rejected");
        assert_eq!(
            err,
            UploadError::UnsupportedType {
                name: "script.sh".to_string(),
                content_type: "application/x-sh".to_string()
            }
        );
    }
}
