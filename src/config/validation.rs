//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Keep configured paths inside the working directory
//! - Check the server address shape and message size
//! - Reject empty filter conditions
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: (Config, cwd) → Result<(), Vec<ValidationError>>
//! - Paths are normalized lexically; nothing is touched on disk

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::config::schema::Config;
use crate::net::address::ServerAddress;

/// A single semantic problem found in a decoded configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `field` resolves outside the working directory.
    PathEscape { field: &'static str, path: String },
    /// `server.address` is neither `host:port` nor `unix://<path>`.
    InvalidAddress { address: String, reason: String },
    /// `server.max_message_size` is zero.
    ZeroMessageSize,
    /// Filter at `index` has an empty condition.
    EmptyCondition { index: usize },
}

impl ValidationError {
    pub fn is_path_escape(&self) -> bool {
        matches!(self, ValidationError::PathEscape { .. })
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::PathEscape { field, path } => {
                write!(f, "{} {:?} is outside the working directory", field, path)
            }
            ValidationError::InvalidAddress { address, reason } => {
                write!(f, "server.address {:?} is invalid: {}", address, reason)
            }
            ValidationError::ZeroMessageSize => {
                write!(f, "server.max_message_size must be greater than zero")
            }
            ValidationError::EmptyCondition { index } => {
                write!(f, "project.filters[{}].condition is empty", index)
            }
        }
    }
}

/// Validate a decoded configuration relative to `cwd`.
pub fn validate_config(config: &Config, cwd: &Path) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !is_inside(cwd, &config.project.root) {
        errors.push(ValidationError::PathEscape {
            field: "project.root",
            path: config.project.root.clone(),
        });
    }

    if let Some(filename) = &config.project.filename {
        if let Err(e) = validate_filename(filename, cwd) {
            errors.push(e);
        }
    }

    if let Err(e) = config.server.address.parse::<ServerAddress>() {
        errors.push(ValidationError::InvalidAddress {
            address: config.server.address.clone(),
            reason: e.to_string(),
        });
    }

    if config.server.max_message_size == 0 {
        errors.push(ValidationError::ZeroMessageSize);
    }

    for (index, filter) in config.project.filters.iter().enumerate() {
        if filter.condition.trim().is_empty() {
            errors.push(ValidationError::EmptyCondition { index });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check a `project.filename` value on its own (used for CLI overrides too).
pub fn validate_filename(filename: &str, cwd: &Path) -> Result<(), ValidationError> {
    if is_inside(cwd, filename) {
        Ok(())
    } else {
        Err(ValidationError::PathEscape {
            field: "project.filename",
            path: filename.to_string(),
        })
    }
}

/// True when `path`, resolved against `cwd`, stays under `cwd`.
pub fn is_inside(cwd: &Path, path: &str) -> bool {
    let base = normalize(cwd);
    let candidate = normalize(&cwd.join(path));
    candidate.starts_with(&base)
}

/// Lexically resolve `.` and `..` components.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{FilterConfig, FilterType};

    fn cwd() -> PathBuf {
        PathBuf::from("/work/project")
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default(), &cwd()).is_ok());
    }

    #[test]
    fn test_is_inside() {
        assert!(is_inside(&cwd(), "."));
        assert!(is_inside(&cwd(), "docs/../src"));
        assert!(is_inside(&cwd(), "/work/project/README.md"));
        assert!(!is_inside(&cwd(), ".."));
        assert!(!is_inside(&cwd(), "docs/../../other"));
        assert!(!is_inside(&cwd(), "/etc/passwd"));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = Config::default();
        config.project.root = "../outside".into();
        config.project.filename = Some("../../README.md".into());
        config.server.address = "no-port".into();
        config.server.max_message_size = 0;
        config.project.filters.push(FilterConfig {
            kind: FilterType::Block,
            condition: "  ".into(),
            extra: Default::default(),
        });

        let errors = validate_config(&config, &cwd()).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors[0].is_path_escape());
        assert!(errors[1].is_path_escape());
        assert!(matches!(errors[2], ValidationError::InvalidAddress { .. }));
        assert_eq!(errors[3], ValidationError::ZeroMessageSize);
        assert_eq!(errors[4], ValidationError::EmptyCondition { index: 0 });
    }

    #[test]
    fn test_unix_address_accepted() {
        let mut config = Config::default();
        config.server.address = "unix:///tmp/runme.sock".into();
        assert!(validate_config(&config, &cwd()).is_ok());
    }
}
