//! Error types for hotswap-flags.

use crate::registry::FlagKind;
use std::fmt;
use std::path::PathBuf;

/// Result type alias for hotswap-flags operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while parsing, merging or reloading flags.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `start` was called on an engine that has already been started.
    #[error("Flags already parsed")]
    AlreadyStarted,

    /// The config file could not be opened or read.
    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        /// Path of the config file
        path: PathBuf,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// A key in the config file does not name a known flag.
    #[error("Unknown \"{key}\" in line {line} of config file {}", .path.display())]
    UnknownKey {
        /// The unresolved key
        key: String,
        /// Path of the config file
        path: PathBuf,
        /// 1-based line number of the entry
        line: usize,
    },

    /// The registry rejected a value taken from the config file.
    #[error("Unable to set {key} to {value}, from line {line} of {}: {cause}", .path.display())]
    ValueAssignment {
        /// The flag name
        key: String,
        /// The rejected value
        value: String,
        /// Path of the config file
        path: PathBuf,
        /// 1-based line number of the entry
        line: usize,
        /// Why the registry rejected the value
        #[source]
        cause: ValidationError,
    },

    /// Resetting an unmentioned flag back to its default value failed.
    #[error("Unable to set {key} to default value {value}: {cause}")]
    DefaultRestore {
        /// The flag name
        key: String,
        /// The default value that was rejected
        value: String,
        /// Why the registry rejected the value
        #[source]
        cause: ValidationError,
    },

    /// A callback was registered for a flag that does not exist.
    #[error("Cannot register callback for non-existent flag {0}")]
    CallbackRegistration(String),

    /// A flag with the same name is already defined.
    #[error("Flag redefined: {0}")]
    DuplicateFlag(String),

    /// Command-line arguments could not be applied to the registry.
    #[error("Invalid command line argument {arg}: {reason}")]
    CommandLine {
        /// The offending argument
        arg: String,
        /// What went wrong
        reason: String,
    },

    /// A reload was requested before `start` completed its first parse.
    #[error("Flags have not been parsed yet")]
    NotStarted,

    /// `start` was called outside of a tokio runtime.
    #[error("No tokio runtime available: {0}")]
    RuntimeUnavailable(String),

    /// A reload trigger source could not be installed.
    #[error("Trigger error: {0}")]
    TriggerError(String),

    /// `-dumpflags` was given; the flags were written to stdout.
    ///
    /// This is a normal completion path, not a failure. Callers should stop
    /// initialization and exit successfully.
    #[error("Dumped")]
    FlagsDumped,
}

impl ConfigError {
    /// Returns true if this is the dump-and-stop completion signal rather than a failure.
    pub fn is_dump_requested(&self) -> bool {
        matches!(self, Self::FlagsDumped)
    }
}

/// Error returned by a registry when a value cannot be assigned to a flag.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// No flag with this name exists.
    UnknownFlag(String),

    /// The value cannot be parsed as the flag's kind.
    InvalidValue {
        /// The kind the flag was defined with
        kind: FlagKind,
        /// The rejected input
        value: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Custom validation error with a message.
    Custom(String),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid value error.
    pub fn invalid_value(
        kind: FlagKind,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            kind,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownFlag(name) => write!(f, "no such flag -{}", name),
            Self::InvalidValue {
                kind,
                value,
                reason,
            } => {
                write!(f, "invalid {} value {:?}: {}", kind, value, reason)
            }
            Self::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}
