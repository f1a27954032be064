//! Flag registry trait.

use super::FlagKind;
use crate::error::{Result, ValidationError};
use serde::Serialize;
use std::collections::BTreeSet;

/// A snapshot of one flag as seen by the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlagRecord {
    /// Flag name, without leading dashes
    pub name: String,
    /// Value kind
    pub kind: FlagKind,
    /// Current value in canonical textual form
    pub current_value: String,
    /// Default value in canonical textual form
    pub default_value: String,
    /// Human-readable description
    pub description: String,
    /// Whether the flag was set on the command line
    pub is_pinned: bool,
}

/// Storage for flag definitions and values.
///
/// The reload engine only talks to flags through this trait. Implement it to
/// plug in an existing flag facility; [`FlagSet`](super::FlagSet) is the
/// in-memory implementation shipped with this crate.
///
/// Implementations must be safe to share between threads: lookups happen from
/// callbacks and application code while reloads mutate values in the
/// background.
pub trait FlagRegistry: Send + Sync {
    /// Define a new flag.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DuplicateFlag` if the name is taken, or
    /// `ConfigError::DefaultRestore` if the default is not a valid value of `kind`.
    fn define(&self, name: &str, kind: FlagKind, default: &str, description: &str) -> Result<()>;

    /// Look up a flag by name.
    fn lookup(&self, name: &str) -> Option<FlagRecord>;

    /// Assign a value from its textual form.
    ///
    /// Either the value is applied or the flag is left untouched and an error
    /// is returned. Setting through this method never pins a flag.
    fn set(&self, name: &str, value: &str) -> std::result::Result<(), ValidationError>;

    /// All flags, in an order that is stable for the lifetime of the registry.
    fn enumerate_all(&self) -> Vec<FlagRecord>;

    /// Names of the flags that were set on the command line.
    fn explicitly_set(&self) -> BTreeSet<String>;
}
