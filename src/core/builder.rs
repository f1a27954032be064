//! Builder for constructing HotswapFlags instances.

use crate::core::dump::{CONFIG_FLAG, DUMP_FLAGS_FLAG, UPDATE_INTERVAL_FLAG};
use crate::core::engine::StartupParts;
use crate::core::{HotswapFlags, MergeMode, ReloadResult};
use crate::error::Result;
use crate::notify::TriggerSource;
use crate::registry::{FlagKind, FlagRegistry, FlagSet, format_duration};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[cfg(feature = "metrics")]
use crate::metrics::ReloadMetrics;

const CONFIG_USAGE: &str = "config file";

const UPDATE_INTERVAL_USAGE: &str = "Update interval for re-reading config file set via -config \
     flag. Zero disables config file re-reading.  Interval may end in s, m, or h to indicate \
     seconds, minutes, or hours respectively.";

const DUMP_FLAGS_USAGE: &str =
    "Prints all flags and config options to stdout in a format useable for -config";

/// Builder for constructing a `HotswapFlags` instance.
///
/// Provides a fluent interface for configuring the registry, reload triggers
/// and result publishing.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_flags::prelude::*;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # fn example() -> Result<()> {
/// let flags = Arc::new(FlagSet::new());
/// let (results_tx, _results_rx) = tokio::sync::mpsc::channel(16);
///
/// let engine = HotswapFlags::builder()
///     .with_registry(flags)
///     .with_config_path("/etc/myapp.conf")
///     .with_update_interval(Duration::from_secs(30))
///     .with_results(results_tx)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct HotswapFlagsBuilder {
    registry: Option<Arc<dyn FlagRegistry>>,
    config_path: Option<PathBuf>,
    update_interval: Duration,
    mode: MergeMode,
    results: Option<mpsc::Sender<ReloadResult>>,
    triggers: Vec<Box<dyn TriggerSource>>,
    hangup_signal: bool,
    #[cfg(feature = "file-watch")]
    file_watch: bool,
    #[cfg(feature = "metrics")]
    metrics: Option<ReloadMetrics>,
}

impl HotswapFlagsBuilder {
    /// Create a new builder with default settings.
    ///
    /// Defaults: a fresh [`FlagSet`], no config file, periodic reload
    /// disabled, full reconciliation, and `SIGHUP` reloads where supported.
    pub fn new() -> Self {
        Self {
            registry: None,
            config_path: None,
            update_interval: Duration::ZERO,
            mode: MergeMode::default(),
            results: None,
            triggers: Vec::new(),
            hangup_signal: cfg!(all(unix, feature = "signal")),
            #[cfg(feature = "file-watch")]
            file_watch: false,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Use `registry` for flag storage.
    ///
    /// The control flags (`config`, `configUpdateInterval`, `dumpflags`) are
    /// defined on it by [`build`](Self::build).
    pub fn with_registry<R: FlagRegistry + 'static>(mut self, registry: Arc<R>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Default value of the `-config` flag.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Default value of the `-configUpdateInterval` flag. Zero disables the timer.
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// How flags missing from the config file are treated on reload.
    pub fn with_merge_mode(mut self, mode: MergeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Publish the result of every background reload on `results`.
    ///
    /// Sends never block the reload loops; results queue up in spawned tasks
    /// if the receiver falls behind.
    pub fn with_results(mut self, results: mpsc::Sender<ReloadResult>) -> Self {
        self.results = Some(results);
        self
    }

    /// Reload on every event from `trigger`.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use hotswap_flags::prelude::*;
    ///
    /// # fn example() {
    /// let (reload_tx, reload_rx) = tokio::sync::mpsc::channel::<()>(8);
    /// let builder = HotswapFlags::builder().with_trigger(reload_rx);
    /// // later: reload_tx.try_send(()) requests a reload
    /// # }
    /// ```
    pub fn with_trigger<T: TriggerSource>(mut self, trigger: T) -> Self {
        self.triggers.push(Box::new(trigger));
        self
    }

    /// Whether `SIGHUP` triggers a reload. Enabled by default on unix.
    pub fn with_hangup_signal(mut self, enabled: bool) -> Self {
        self.hangup_signal = enabled;
        self
    }

    /// Also reload whenever the config file changes on disk.
    #[cfg(feature = "file-watch")]
    pub fn with_file_watch(mut self, enabled: bool) -> Self {
        self.file_watch = enabled;
        self
    }

    /// Record reload metrics with `meter`.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, meter: opentelemetry::metrics::Meter) -> Self {
        self.metrics = Some(ReloadMetrics::new(meter));
        self
    }

    /// Define the control flags and create the engine.
    ///
    /// Nothing is read yet; call [`HotswapFlags::start`] after applying the
    /// command line to the registry.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DuplicateFlag` if the registry already defines
    /// one of the control flags.
    pub fn build(self) -> Result<HotswapFlags> {
        let registry: Arc<dyn FlagRegistry> = match self.registry {
            Some(registry) => registry,
            None => Arc::new(FlagSet::new()),
        };

        let config_path = self
            .config_path
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        registry.define(CONFIG_FLAG, FlagKind::String, &config_path, CONFIG_USAGE)?;
        registry.define(
            UPDATE_INTERVAL_FLAG,
            FlagKind::Duration,
            &format_duration(self.update_interval),
            UPDATE_INTERVAL_USAGE,
        )?;
        registry.define(DUMP_FLAGS_FLAG, FlagKind::Bool, "false", DUMP_FLAGS_USAGE)?;

        let startup = StartupParts {
            triggers: self.triggers,
            results: self.results,
            hangup_signal: self.hangup_signal,
            #[cfg(feature = "file-watch")]
            file_watch: self.file_watch,
        };

        Ok(HotswapFlags::from_parts(
            registry,
            self.mode,
            self.update_interval,
            startup,
            #[cfg(feature = "metrics")]
            self.metrics,
        ))
    }
}

impl Default for HotswapFlagsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HotswapFlags {
    /// Create a new builder for constructing an engine.
    pub fn builder() -> HotswapFlagsBuilder {
        HotswapFlagsBuilder::new()
    }
}
