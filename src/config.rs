//! Service configuration.
//!
//! Defaults overridable via `TRELLIS_*` environment variables, validated at
//! resolve time so a bad deployment fails fast instead of misbehaving later.

use std::env;
use std::time::Duration;

use crate::error::ConfigError;
use crate::upload::{DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_FILES, UploadConstraints};

pub const DEFAULT_IO_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

/// Runtime knobs for the resource coordinators.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Upper bound on every persistence/blob call.
    pub io_timeout: Duration,
    /// Page size used when a list request does not specify one.
    pub default_page_size: u32,
    /// Hard cap on requested page sizes.
    pub max_page_size: u32,
    pub upload: UploadConstraints,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_millis(DEFAULT_IO_TIMEOUT_MS),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            upload: UploadConstraints::default(),
        }
    }
}

impl ServiceConfig {
    /// Resolve from the process environment, falling back to defaults.
    pub fn resolve() -> Result<Self, ConfigError> {
        let io_timeout_ms = parse_u64(
            "TRELLIS_IO_TIMEOUT_MS",
            read_env("TRELLIS_IO_TIMEOUT_MS").as_deref(),
            DEFAULT_IO_TIMEOUT_MS,
        )?;
        if io_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TRELLIS_IO_TIMEOUT_MS".to_string(),
                message: "timeout must be greater than zero".to_string(),
            });
        }

        let default_page_size = parse_u32(
            "TRELLIS_PAGE_SIZE",
            read_env("TRELLIS_PAGE_SIZE").as_deref(),
            DEFAULT_PAGE_SIZE,
        )?;
        let max_page_size = parse_u32(
            "TRELLIS_MAX_PAGE_SIZE",
            read_env("TRELLIS_MAX_PAGE_SIZE").as_deref(),
            DEFAULT_MAX_PAGE_SIZE,
        )?;
        if default_page_size == 0 || default_page_size > max_page_size {
            return Err(ConfigError::InvalidValue {
                key: "TRELLIS_PAGE_SIZE".to_string(),
                message: format!("must be between 1 and {max_page_size}"),
            });
        }

        let max_count = parse_u64(
            "TRELLIS_MAX_UPLOAD_FILES",
            read_env("TRELLIS_MAX_UPLOAD_FILES").as_deref(),
            DEFAULT_MAX_FILES as u64,
        )? as usize;
        let max_size_per_file = parse_u64(
            "TRELLIS_MAX_UPLOAD_SIZE",
            read_env("TRELLIS_MAX_UPLOAD_SIZE").as_deref(),
            DEFAULT_MAX_FILE_SIZE,
        )?;
        if max_count == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TRELLIS_MAX_UPLOAD_FILES".to_string(),
                message: "must allow at least one file".to_string(),
            });
        }

        let allowed_mime_types = match read_env("TRELLIS_ALLOWED_MIME_TYPES") {
            Some(raw) => parse_mime_csv("TRELLIS_ALLOWED_MIME_TYPES", &raw)?,
            None => UploadConstraints::default().allowed_mime_types,
        };

        Ok(Self {
            io_timeout: Duration::from_millis(io_timeout_ms),
            default_page_size,
            max_page_size,
            upload: UploadConstraints {
                max_count,
                max_size_per_file,
                allowed_mime_types,
            },
        })
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_u64(key: &str, raw: Option<&str>, default: u64) -> Result<u64, ConfigError> {
    match raw {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected an unsigned integer, got '{}'", raw.trim()),
        }),
    }
}

fn parse_u32(key: &str, raw: Option<&str>, default: u32) -> Result<u32, ConfigError> {
    match raw {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected an unsigned integer, got '{}'", raw.trim()),
        }),
    }
}

fn parse_mime_csv(key: &str, raw: &str) -> Result<Vec<String>, ConfigError> {
    let types: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
        .collect();
    if types.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "mime type list must not be empty".to_string(),
        });
    }
    for t in &types {
        if !t.contains('/') {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{t}' is not a valid mime type"),
            });
        }
    }
    Ok(types)
}
