//! In-memory flag registry with `clap`-based command-line parsing.

use super::{FlagKind, FlagRecord, FlagRegistry};
use crate::error::{ConfigError, Result, ValidationError};
use clap::builder::ValueParser;
use clap::error::{ContextKind, ContextValue};
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::time::Duration;

/// Id of the trailing positional arguments. The space keeps it out of the flag namespace.
const TRAILING_ARGS: &str = "trailing args";

struct FlagEntry {
    kind: FlagKind,
    value: String,
    default: String,
    description: String,
    explicit: bool,
}

impl FlagEntry {
    fn record(&self, name: &str) -> FlagRecord {
        FlagRecord {
            name: name.to_string(),
            kind: self.kind,
            current_value: self.value.clone(),
            default_value: self.default.clone(),
            description: self.description.clone(),
            is_pinned: self.explicit,
        }
    }
}

/// Thread-safe, in-memory set of typed flags.
///
/// Flags are kept sorted by name, so enumeration order is stable.
///
/// # Examples
///
/// ```rust
/// use hotswap_flags::registry::FlagSet;
/// use std::time::Duration;
///
/// # fn example() -> hotswap_flags::error::Result<()> {
/// let flags = FlagSet::new();
/// flags.define_string("listen", "127.0.0.1:8080", "address to listen on")?;
/// flags.define_bool("verbose", false, "log more")?;
/// flags.define_duration("timeout", Duration::from_secs(5), "request timeout")?;
///
/// let rest = flags.parse_args(["--verbose", "--timeout", "1m", "input.txt"])?;
/// assert_eq!(rest, vec!["input.txt".to_string()]);
/// assert_eq!(flags.get_bool("verbose"), Some(true));
/// assert_eq!(flags.get_duration("timeout"), Some(Duration::from_secs(60)));
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct FlagSet {
    flags: RwLock<BTreeMap<String, FlagEntry>>,
}

impl FlagSet {
    /// Create an empty flag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a string flag.
    pub fn define_string(&self, name: &str, default: &str, description: &str) -> Result<()> {
        self.define(name, FlagKind::String, default, description)
    }

    /// Define a boolean flag.
    pub fn define_bool(&self, name: &str, default: bool, description: &str) -> Result<()> {
        self.define(name, FlagKind::Bool, &default.to_string(), description)
    }

    /// Define an integer flag.
    pub fn define_int(&self, name: &str, default: i64, description: &str) -> Result<()> {
        self.define(name, FlagKind::Int, &default.to_string(), description)
    }

    /// Define a floating point flag.
    pub fn define_float(&self, name: &str, default: f64, description: &str) -> Result<()> {
        self.define(name, FlagKind::Float, &default.to_string(), description)
    }

    /// Define a duration flag.
    pub fn define_duration(&self, name: &str, default: Duration, description: &str) -> Result<()> {
        self.define(
            name,
            FlagKind::Duration,
            &super::format_duration(default),
            description,
        )
    }

    /// Current textual value of a flag.
    pub fn get(&self, name: &str) -> Option<String> {
        self.flags.read().get(name).map(|entry| entry.value.clone())
    }

    /// Current value of a boolean flag.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(|v| super::parse_bool(&v))
    }

    /// Current value of an integer flag.
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| v.parse().ok())
    }

    /// Current value of a floating point flag.
    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.parse().ok())
    }

    /// Current value of a duration flag.
    pub fn get_duration(&self, name: &str) -> Option<Duration> {
        self.get(name).and_then(|v| super::parse_duration(&v).ok())
    }

    /// Set a flag as if it had been given on the command line.
    ///
    /// The flag becomes pinned: config file reloads will not change it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::CommandLine` if the flag is unknown or the value is invalid.
    pub fn set_from_command_line(&self, name: &str, value: &str) -> Result<()> {
        let mut flags = self.flags.write();
        let entry = flags.get_mut(name).ok_or_else(|| ConfigError::CommandLine {
            arg: format!("--{}", name),
            reason: "flag provided but not defined".to_string(),
        })?;
        entry.value = entry
            .kind
            .normalize(value)
            .map_err(|e| ConfigError::CommandLine {
                arg: format!("--{}", name),
                reason: e.to_string(),
            })?;
        entry.explicit = true;
        Ok(())
    }

    /// Build a `clap` command with one `--name` argument per flag.
    ///
    /// Boolean flags take an optional value (`--verbose`, `--verbose=false`).
    /// Everything after the first positional argument, or after `--`, is
    /// collected as trailing arguments.
    pub fn command(&self) -> Command {
        let flags = self.flags.read();
        let mut command = Command::new("flags")
            .no_binary_name(true)
            .disable_version_flag(true)
            .disable_help_flag(flags.contains_key("help"))
            .arg(
                Arg::new(TRAILING_ARGS)
                    .value_name("ARGS")
                    .num_args(1..)
                    .trailing_var_arg(true)
                    .value_parser(ValueParser::string()),
            );

        for (name, entry) in flags.iter() {
            let mut arg = Arg::new(name.clone())
                .long(name.clone())
                .help(entry.description.clone())
                .action(ArgAction::Set)
                .value_parser(ValueParser::string())
                .allow_hyphen_values(true);
            if entry.kind.is_bool() {
                arg = arg
                    .num_args(0..=1)
                    .require_equals(true)
                    .default_missing_value("true");
            }
            command = command.arg(arg);
        }
        command
    }

    /// Apply the flags present in `matches` and return the trailing arguments.
    ///
    /// Every flag given on the command line becomes pinned.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::CommandLine` if a value is invalid for its flag.
    pub fn apply_matches(&self, matches: &ArgMatches) -> Result<Vec<String>> {
        let names: Vec<String> = self.flags.read().keys().cloned().collect();
        for name in names {
            if matches.value_source(&name) != Some(ValueSource::CommandLine) {
                continue;
            }
            if let Ok(Some(value)) = matches.try_get_one::<String>(&name) {
                self.set_from_command_line(&name, value)?;
            }
        }

        Ok(matches
            .get_many::<String>(TRAILING_ARGS)
            .map(|values| values.cloned().collect())
            .unwrap_or_default())
    }

    /// Parse command-line arguments (without the program name).
    ///
    /// Shorthand for matching [`command`](Self::command) and applying the
    /// result with [`apply_matches`](Self::apply_matches).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::CommandLine` for unknown flags, missing values
    /// and values the flag's kind rejects.
    pub fn parse_args<I, S>(&self, args: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString> + Clone,
    {
        let matches = self
            .command()
            .try_get_matches_from(args)
            .map_err(command_line_error)?;
        self.apply_matches(&matches)
    }
}

fn command_line_error(err: clap::Error) -> ConfigError {
    let arg = match err.get(ContextKind::InvalidArg) {
        Some(ContextValue::String(arg)) => arg.clone(),
        _ => String::new(),
    };
    ConfigError::CommandLine {
        arg,
        reason: err.kind().to_string(),
    }
}

impl FlagRegistry for FlagSet {
    fn define(&self, name: &str, kind: FlagKind, default: &str, description: &str) -> Result<()> {
        let default = kind
            .normalize(default)
            .map_err(|cause| ConfigError::DefaultRestore {
                key: name.to_string(),
                value: default.to_string(),
                cause,
            })?;

        let mut flags = self.flags.write();
        if flags.contains_key(name) {
            return Err(ConfigError::DuplicateFlag(name.to_string()));
        }
        flags.insert(
            name.to_string(),
            FlagEntry {
                kind,
                value: default.clone(),
                default,
                description: description.to_string(),
                explicit: false,
            },
        );
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<FlagRecord> {
        self.flags.read().get(name).map(|entry| entry.record(name))
    }

    fn set(&self, name: &str, value: &str) -> std::result::Result<(), ValidationError> {
        let mut flags = self.flags.write();
        let entry = flags
            .get_mut(name)
            .ok_or_else(|| ValidationError::UnknownFlag(name.to_string()))?;
        entry.value = entry.kind.normalize(value)?;
        Ok(())
    }

    fn enumerate_all(&self) -> Vec<FlagRecord> {
        self.flags
            .read()
            .iter()
            .map(|(name, entry)| entry.record(name))
            .collect()
    }

    fn explicitly_set(&self) -> BTreeSet<String> {
        self.flags
            .read()
            .iter()
            .filter(|(_, entry)| entry.explicit)
            .map(|(name, _)| name.clone())
            .collect()
    }
}
