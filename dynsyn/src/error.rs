// src/error.rs
//
// Error types for the dynsyn layer.
//
// ConfigError is fatal and construction-time only: the muscle-group
// specification (or the config around it) is unusable. Everything else in
// DynSynError is either a caller precondition violation (shape mismatch,
// bad amplitude) or an I/O / parse failure on persisted state.

use std::fmt;

/// Muscle-group specification / configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The specification has no groups at all.
    EmptySpec,
    /// A group lists no actuator indices.
    EmptyGroup { group: usize },
    /// An actuator index appears more than once.
    DuplicateIndex {
        index: usize,
        first_group: usize,
        second_group: usize,
    },
    /// An actuator index in `[0, M)` is not covered by any group.
    MissingIndex { index: usize, actuator_count: usize },
    /// A config field failed validation.
    Validation { field: String, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptySpec => write!(f, "muscle group spec has no groups"),
            ConfigError::EmptyGroup { group } => {
                write!(f, "muscle group {} has no actuator indices", group)
            }
            ConfigError::DuplicateIndex {
                index,
                first_group,
                second_group,
            } => write!(
                f,
                "actuator {} appears in group {} and again in group {}",
                index, first_group, second_group
            ),
            ConfigError::MissingIndex {
                index,
                actuator_count,
            } => write!(
                f,
                "actuator {} is not assigned to any group (actuator count {})",
                index, actuator_count
            ),
            ConfigError::Validation { field, message } => {
                write!(f, "config validation error in '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Top-level error for layer construction, evaluation and persistence.
#[derive(Debug, Clone, PartialEq)]
pub enum DynSynError {
    Config(ConfigError),
    /// A vector or batch does not have the width the operation requires.
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    InvalidAmplitude { value: f32 },
    UnknownWrapper { name: String },
    /// The layer variant does not provide this operation.
    Unsupported { operation: &'static str, variant: &'static str },
    Io { path: String, source: String },
    Parse { source: String },
    /// A checkpoint's stored tables disagree with the tables rebuilt from
    /// its muscle groups.
    CheckpointMismatch { field: &'static str },
}

impl fmt::Display for DynSynError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynSynError::Config(e) => write!(f, "configuration error: {}", e),
            DynSynError::ShapeMismatch {
                what,
                expected,
                got,
            } => write!(
                f,
                "shape mismatch for {}: expected width {}, got {}",
                what, expected, got
            ),
            DynSynError::InvalidAmplitude { value } => write!(
                f,
                "invalid weight amplitude {}: must be finite and >= 0",
                value
            ),
            DynSynError::UnknownWrapper { name } => {
                write!(f, "action wrapper '{}' is not registered", name)
            }
            DynSynError::Unsupported { operation, variant } => {
                write!(f, "'{}' is not supported by the {} layer", operation, variant)
            }
            DynSynError::Io { path, source } => write!(f, "I/O error on '{}': {}", path, source),
            DynSynError::Parse { source } => write!(f, "parse error: {}", source),
            DynSynError::CheckpointMismatch { field } => write!(
                f,
                "checkpoint field '{}' does not match the tables rebuilt from its muscle groups",
                field
            ),
        }
    }
}

impl std::error::Error for DynSynError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DynSynError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for DynSynError {
    fn from(e: ConfigError) -> Self {
        DynSynError::Config(e)
    }
}

pub type Result<T> = std::result::Result<T, DynSynError>;

/// Return a `ShapeMismatch` unless `got == expected`.
pub(crate) fn ensure_width(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(DynSynError::ShapeMismatch {
            what,
            expected,
            got,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_and_keeps_source() {
        let err: DynSynError = ConfigError::EmptyGroup { group: 2 }.into();
        assert!(err.to_string().contains("group 2"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn ensure_width_reports_both_sides() {
        assert!(ensure_width("x", 3, 3).is_ok());
        let err = ensure_width("x", 3, 4).unwrap_err();
        assert_eq!(
            err,
            DynSynError::ShapeMismatch {
                what: "x",
                expected: 3,
                got: 4
            }
        );
        assert!(err.to_string().contains("expected width 3, got 4"));
    }
}
