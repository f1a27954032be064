//! Reconciles config file entries with the flag registry.

use crate::core::ConfigEntry;
use crate::error::{ConfigError, Result, ValidationError};
use crate::registry::FlagRegistry;
use std::collections::{BTreeMap, BTreeSet};

/// How flags that a config file does not mention are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeMode {
    /// Unmentioned, unpinned flags are reset to their defaults.
    ///
    /// Removing a line from the config file and reloading undoes its effect.
    #[default]
    FullReconciliation,

    /// Only flags named in the config file are touched.
    MentionedOnly,
}

/// Flags changed by one merge, mapped to their previous values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    previous: BTreeMap<String, String>,
}

impl ChangeSet {
    /// True when the merge changed nothing.
    pub fn is_empty(&self) -> bool {
        self.previous.is_empty()
    }

    /// Number of changed flags.
    pub fn len(&self) -> usize {
        self.previous.len()
    }

    /// Whether `name` changed.
    pub fn contains(&self, name: &str) -> bool {
        self.previous.contains_key(name)
    }

    /// The value `name` had before the merge.
    pub fn previous_value(&self, name: &str) -> Option<&str> {
        self.previous.get(name).map(String::as_str)
    }

    /// Names of the changed flags, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.previous.keys().map(String::as_str)
    }

    /// `(name, previous value)` pairs, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.previous.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Consume the change set, returning the name to previous value map.
    pub fn into_previous(self) -> BTreeMap<String, String> {
        self.previous
    }
}

/// Applies values to the registry and undoes them unless committed.
struct Transaction<'a> {
    registry: &'a dyn FlagRegistry,
    previous: BTreeMap<String, String>,
    committed: bool,
}

impl<'a> Transaction<'a> {
    fn new(registry: &'a dyn FlagRegistry) -> Self {
        Self {
            registry,
            previous: BTreeMap::new(),
            committed: false,
        }
    }

    /// Set `name` to `value` if it differs from `current`.
    ///
    /// Returns whether the stored value actually changed.
    fn assign(
        &mut self,
        name: &str,
        current: &str,
        value: &str,
    ) -> std::result::Result<bool, ValidationError> {
        if current == value {
            return Ok(false);
        }
        self.registry.set(name, value)?;

        // The registry may normalize `value` back to what it already held.
        let stored = self
            .registry
            .lookup(name)
            .map(|record| record.current_value)
            .unwrap_or_default();
        if stored == current {
            return Ok(false);
        }
        self.previous
            .entry(name.to_string())
            .or_insert_with(|| current.to_string());
        Ok(true)
    }

    fn commit(mut self) -> ChangeSet {
        self.committed = true;
        ChangeSet {
            previous: std::mem::take(&mut self.previous),
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for (name, value) in &self.previous {
            if let Err(e) = self.registry.set(name, value) {
                tracing::error!(flag = %name, value = %value, error = %e, "failed to restore flag during rollback");
            }
        }
    }
}

/// Reconciles parsed config entries against a registry.
///
/// Flags in the pinned set (set on the command line) are never modified.
/// A merge either applies completely or leaves the registry exactly as it
/// found it.
///
/// # Examples
///
/// ```rust
/// use hotswap_flags::core::{Merger, parse_reader};
/// use hotswap_flags::registry::FlagSet;
/// use std::collections::BTreeSet;
/// use std::io::Cursor;
/// use std::path::Path;
///
/// # fn example() -> hotswap_flags::error::Result<()> {
/// let flags = FlagSet::new();
/// flags.define_int("workers", 4, "worker count")?;
///
/// let entries = parse_reader(Cursor::new("workers 8\n"), Path::new("app.conf"))?;
/// let pinned = BTreeSet::new();
/// let changes = Merger::new(&flags, &pinned).merge(&entries)?;
///
/// assert_eq!(changes.previous_value("workers"), Some("4"));
/// assert_eq!(flags.get_int("workers"), Some(8));
/// # Ok(())
/// # }
/// ```
pub struct Merger<'a> {
    registry: &'a dyn FlagRegistry,
    pinned: &'a BTreeSet<String>,
    mode: MergeMode,
}

impl<'a> Merger<'a> {
    /// Create a merger with full reconciliation.
    pub fn new(registry: &'a dyn FlagRegistry, pinned: &'a BTreeSet<String>) -> Self {
        Self {
            registry,
            pinned,
            mode: MergeMode::default(),
        }
    }

    /// Select how unmentioned flags are treated.
    pub fn with_mode(mut self, mode: MergeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Apply `entries` to the registry.
    ///
    /// When a key appears more than once, its first occurrence wins.
    ///
    /// # Errors
    ///
    /// - `ConfigError::UnknownKey` if an entry names no flag
    /// - `ConfigError::ValueAssignment` if the registry rejects a value
    /// - `ConfigError::DefaultRestore` if resetting a flag to its default fails
    ///
    /// On error every change made by this call has been reverted.
    pub fn merge(&self, entries: &[ConfigEntry]) -> Result<ChangeSet> {
        let mut tx = Transaction::new(self.registry);
        let mut mentioned = BTreeSet::new();

        for entry in entries {
            let record =
                self.registry
                    .lookup(&entry.key)
                    .ok_or_else(|| ConfigError::UnknownKey {
                        key: entry.key.clone(),
                        path: entry.source_path.clone(),
                        line: entry.line_number,
                    })?;

            if self.pinned.contains(&record.name) || !mentioned.insert(record.name.clone()) {
                continue;
            }

            tx.assign(&record.name, &record.current_value, &entry.value)
                .map_err(|cause| ConfigError::ValueAssignment {
                    key: entry.key.clone(),
                    value: entry.value.clone(),
                    path: entry.source_path.clone(),
                    line: entry.line_number,
                    cause,
                })?;
        }

        if self.mode == MergeMode::FullReconciliation {
            for record in self.registry.enumerate_all() {
                if self.pinned.contains(&record.name) || mentioned.contains(&record.name) {
                    continue;
                }
                tx.assign(&record.name, &record.current_value, &record.default_value)
                    .map_err(|cause| ConfigError::DefaultRestore {
                        key: record.name.clone(),
                        value: record.default_value.clone(),
                        cause,
                    })?;
            }
        }

        Ok(tx.commit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parse_reader;
    use crate::registry::FlagSet;
    use std::io::Cursor;
    use std::path::Path;

    fn entries(text: &str) -> Vec<ConfigEntry> {
        parse_reader(Cursor::new(text.to_string()), Path::new("test.conf")).unwrap()
    }

    fn sample() -> FlagSet {
        let flags = FlagSet::new();
        flags.define_string("flag1", "default1", "first").unwrap();
        flags.define_bool("flag2", false, "second").unwrap();
        flags.define_string("flag3", "default3", "third").unwrap();
        flags.define_bool("flag4", false, "fourth").unwrap();
        flags.define_int("flagN", 123, "number").unwrap();
        flags
    }

    #[test]
    fn test_scenario_respects_command_line() {
        let flags = sample();
        flags.set_from_command_line("flag3", "foobar").unwrap();
        let pinned = flags.explicitly_set();

        let changes = Merger::new(&flags, &pinned)
            .merge(&entries("flag1 val1\n\nflag4\nflagN 4\nflag3 ignored\n"))
            .unwrap();

        assert_eq!(flags.get("flag1").as_deref(), Some("val1"));
        assert_eq!(flags.get_bool("flag2"), Some(false));
        assert_eq!(flags.get("flag3").as_deref(), Some("foobar"));
        assert_eq!(flags.get_bool("flag4"), Some(true));
        assert_eq!(flags.get_int("flagN"), Some(4));

        assert_eq!(changes.len(), 3);
        assert_eq!(changes.previous_value("flag1"), Some("default1"));
        assert_eq!(changes.previous_value("flag4"), Some("false"));
        assert_eq!(changes.previous_value("flagN"), Some("123"));
        assert!(!changes.contains("flag3"));
    }

    #[test]
    fn test_unknown_key_rolls_back() {
        let flags = sample();
        let pinned = BTreeSet::new();

        let err = Merger::new(&flags, &pinned)
            .merge(&entries("flag1 changed\nbogus 1\n"))
            .unwrap_err();

        match err {
            ConfigError::UnknownKey { key, line, .. } => {
                assert_eq!(key, "bogus");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(flags.get("flag1").as_deref(), Some("default1"));
    }

    #[test]
    fn test_invalid_value_rolls_back() {
        let flags = sample();
        let pinned = BTreeSet::new();

        let err = Merger::new(&flags, &pinned)
            .merge(&entries("flag4\nflagN lots\n"))
            .unwrap_err();

        assert!(matches!(err, ConfigError::ValueAssignment { ref key, line: 2, .. } if key == "flagN"));
        assert_eq!(flags.get_bool("flag4"), Some(false));
        assert_eq!(flags.get_int("flagN"), Some(123));
    }

    #[test]
    fn test_unmentioned_flags_reset_to_default() {
        let flags = sample();
        let pinned = BTreeSet::new();
        let merger = Merger::new(&flags, &pinned);

        merger.merge(&entries("flag1 val1\nflagN 4\n")).unwrap();
        let changes = merger.merge(&entries("flagN 4\n")).unwrap();

        assert_eq!(flags.get("flag1").as_deref(), Some("default1"));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.previous_value("flag1"), Some("val1"));
    }

    #[test]
    fn test_mentioned_only_mode_keeps_values() {
        let flags = sample();
        let pinned = BTreeSet::new();
        let merger = Merger::new(&flags, &pinned).with_mode(MergeMode::MentionedOnly);

        merger.merge(&entries("flag1 val1\n")).unwrap();
        let changes = merger.merge(&entries("flagN 4\n")).unwrap();

        assert_eq!(flags.get("flag1").as_deref(), Some("val1"));
        assert_eq!(changes.names().collect::<Vec<_>>(), vec!["flagN"]);
    }

    #[test]
    fn test_reapplying_same_file_is_a_no_op() {
        let flags = sample();
        let pinned = BTreeSet::new();
        let merger = Merger::new(&flags, &pinned);
        let input = entries("flag1 val1\nflag4\n");

        assert_eq!(merger.merge(&input).unwrap().len(), 2);
        assert!(merger.merge(&input).unwrap().is_empty());
    }

    #[test]
    fn test_equivalent_spelling_is_not_a_change() {
        let flags = sample();
        let pinned = BTreeSet::new();

        let changes = Merger::new(&flags, &pinned)
            .merge(&entries("flag2 0\n"))
            .unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_first_occurrence_wins() {
        let flags = sample();
        let pinned = BTreeSet::new();

        Merger::new(&flags, &pinned)
            .merge(&entries("flagN 1\nflagN 2\n"))
            .unwrap();
        assert_eq!(flags.get_int("flagN"), Some(1));
    }

    #[test]
    fn test_pinned_flags_are_never_reset() {
        let flags = sample();
        flags.set_from_command_line("flag1", "cli").unwrap();
        let pinned = flags.explicitly_set();

        let changes = Merger::new(&flags, &pinned).merge(&[]).unwrap();
        assert!(changes.is_empty());
        assert_eq!(flags.get("flag1").as_deref(), Some("cli"));
    }

    #[test]
    fn test_overflowing_duration_is_rejected() {
        let flags = FlagSet::new();
        flags
            .define_duration("d", std::time::Duration::from_secs(1), "")
            .unwrap();
        let pinned = BTreeSet::new();

        let err = Merger::new(&flags, &pinned)
            .merge(&entries("d 340282366920938463463374607431768211.9us
"))
            .unwrap_err();

        assert!(matches!(err, ConfigError::ValueAssignment { ref key, line: 1, .. } if key == "d"));
        assert_eq!(flags.get("d").as_deref(), Some("1s"));
    }

    /// Refuses to put one flag back to its default.
    struct StuckFlag {
        inner: FlagSet,
        stuck: &'static str,
    }

    impl FlagRegistry for StuckFlag {
        fn define(&self, name: &str, kind: crate::registry::FlagKind, default: &str, description: &str) -> Result<()> {
            self.inner.define(name, kind, default, description)
        }

        fn lookup(&self, name: &str) -> Option<crate::registry::FlagRecord> {
            self.inner.lookup(name)
        }

        fn set(&self, name: &str, value: &str) -> std::result::Result<(), ValidationError> {
            let is_default = self
                .inner
                .lookup(name)
                .is_some_and(|record| record.default_value == value);
            if name == self.stuck && is_default {
                return Err(ValidationError::custom("cannot reset"));
            }
            self.inner.set(name, value)
        }

        fn enumerate_all(&self) -> Vec<crate::registry::FlagRecord> {
            self.inner.enumerate_all()
        }

        fn explicitly_set(&self) -> BTreeSet<String> {
            self.inner.explicitly_set()
        }
    }

    #[test]
    fn test_failed_default_reset_rolls_back() {
        let registry = StuckFlag {
            inner: FlagSet::new(),
            stuck: "z",
        };
        registry.inner.define_int("a", 0, "").unwrap();
        registry.inner.define_string("b", "bdef", "").unwrap();
        registry.inner.define_string("z", "zdef", "").unwrap();
        registry.inner.set("a", "1").unwrap();
        registry.inner.set("b", "bval").unwrap();
        registry.inner.set("z", "x").unwrap();
        let pinned = BTreeSet::new();

        let err = Merger::new(&registry, &pinned)
            .merge(&entries("a 2
"))
            .unwrap_err();

        assert!(matches!(err, ConfigError::DefaultRestore { ref key, .. } if key == "z"));
        assert_eq!(registry.inner.get_int("a"), Some(1));
        assert_eq!(registry.inner.get("b").as_deref(), Some("bval"));
        assert_eq!(registry.inner.get("z").as_deref(), Some("x"));
    }
}
