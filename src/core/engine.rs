//! The engine handle tying parsing, merging, callbacks and reload loops together.

use crate::core::dump::{self, CONFIG_FLAG, DUMP_FLAGS_FLAG, UPDATE_INTERVAL_FLAG};
use crate::core::{ChangeSet, GenerationTracker, MergeMode, Merger, parse_file};
use crate::error::{ConfigError, Result};
use crate::notify::{CallbackRegistry, DispatchHandle, ReloadFn, ReloadScheduler, TriggerSource};
use crate::registry::{FlagRegistry, parse_bool, parse_duration};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

#[cfg(feature = "metrics")]
use crate::metrics::ReloadMetrics;

/// Outcome of a reload, as published on the results channel.
pub type ReloadResult = Result<FlagChanges>;

/// Flags changed by a reload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlagChanges {
    /// Generation after the reload
    pub generation: u64,
    /// New values of the changed flags
    pub changed: BTreeMap<String, String>,
    /// Previous values of the changed flags
    pub old_values: BTreeMap<String, String>,
}

impl FlagChanges {
    /// True when the reload changed nothing.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    fn from_change_set(generation: u64, changes: ChangeSet, registry: &dyn FlagRegistry) -> Self {
        let changed = changes
            .names()
            .filter_map(|name| {
                registry
                    .lookup(name)
                    .map(|record| (name.to_string(), record.current_value))
            })
            .collect();
        Self {
            generation,
            changed,
            old_values: changes.into_previous(),
        }
    }
}

/// Parts handed to the scheduler when `start` runs.
pub(crate) struct StartupParts {
    pub(crate) triggers: Vec<Box<dyn TriggerSource>>,
    pub(crate) results: Option<mpsc::Sender<ReloadResult>>,
    pub(crate) hangup_signal: bool,
    #[cfg(feature = "file-watch")]
    pub(crate) file_watch: bool,
}

struct Inner {
    registry: Arc<dyn FlagRegistry>,
    callbacks: CallbackRegistry,
    generation: GenerationTracker,
    /// Held across merge, generation bump and dispatch
    merge_lock: Mutex<()>,
    mode: MergeMode,
    started: AtomicBool,
    parsed: AtomicBool,
    /// Command-line flags, captured once by `start`
    pinned: OnceLock<BTreeSet<String>>,
    runtime: OnceLock<Handle>,
    interval: watch::Sender<Duration>,
    startup: Mutex<Option<StartupParts>>,
    scheduler: Mutex<Option<ReloadScheduler>>,
    #[cfg(feature = "metrics")]
    metrics: Option<ReloadMetrics>,
}

/// Handle to a flag set kept in sync with a config file.
///
/// Command-line values always win. Everything else comes from the config
/// file named by `-config`, which is re-read on `SIGHUP`, on custom triggers
/// and every `-configUpdateInterval`. Each reload is applied atomically.
///
/// Cloning the handle is cheap; all clones share the same state.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_flags::prelude::*;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<()> {
/// let flags = Arc::new(FlagSet::new());
/// flags.define_int("workers", 4, "number of worker threads")?;
///
/// let engine = HotswapFlags::builder()
///     .with_registry(Arc::clone(&flags))
///     .build()?;
/// flags.parse_args(std::env::args().skip(1))?;
///
/// engine.on_flag_change("workers", || println!("workers changed"))?;
///
/// match engine.start() {
///     Ok(_) => {}
///     Err(e) if e.is_dump_requested() => return Ok(()),
///     Err(e) => return Err(e),
/// }
/// println!("workers = {:?}", flags.get_int("workers"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HotswapFlags {
    inner: Arc<Inner>,
}

impl HotswapFlags {
    pub(crate) fn from_parts(
        registry: Arc<dyn FlagRegistry>,
        mode: MergeMode,
        update_interval: Duration,
        startup: StartupParts,
        #[cfg(feature = "metrics")] metrics: Option<ReloadMetrics>,
    ) -> Self {
        let (interval, _) = watch::channel(update_interval);
        Self {
            inner: Arc::new(Inner {
                registry,
                callbacks: CallbackRegistry::new(),
                generation: GenerationTracker::new(),
                merge_lock: Mutex::new(()),
                mode,
                started: AtomicBool::new(false),
                parsed: AtomicBool::new(false),
                pinned: OnceLock::new(),
                runtime: OnceLock::new(),
                interval,
                startup: Mutex::new(Some(startup)),
                scheduler: Mutex::new(None),
                #[cfg(feature = "metrics")]
                metrics,
            }),
        }
    }

    /// Read the config file, apply it and start the background reload loops.
    ///
    /// Call this once, after the command line has been applied to the
    /// registry and from within a tokio runtime. The flags set on the command
    /// line at this point are pinned for the rest of the process.
    ///
    /// Every registered callback is fired once. The returned handle can be
    /// awaited to observe their completion, or dropped.
    ///
    /// # Errors
    ///
    /// - `ConfigError::AlreadyStarted` on a second call
    /// - `ConfigError::RuntimeUnavailable` outside a tokio runtime
    /// - any parse or merge error from the config file
    /// - `ConfigError::CallbackRegistration` if a callback names an unknown flag
    /// - `ConfigError::TriggerError` if a trigger source cannot be installed
    /// - `ConfigError::FlagsDumped` after writing the flags to stdout when
    ///   `-dumpflags` is set; this means "exit normally"
    pub fn start(&self) -> Result<DispatchHandle> {
        let runtime =
            Handle::try_current().map_err(|e| ConfigError::RuntimeUnavailable(e.to_string()))?;
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(ConfigError::AlreadyStarted);
        }
        let _ = self.inner.runtime.set(runtime.clone());
        let _ = self.inner.pinned.set(self.inner.registry.explicitly_set());

        let guard = self.inner.merge_lock.lock();
        let changes = self.inner.merge_config()?;
        self.inner.parsed.store(true, Ordering::SeqCst);

        if self.inner.flag_is_true(DUMP_FLAGS_FLAG) {
            self.dump(io::stdout().lock())
                .map_err(|source| ConfigError::Io {
                    path: PathBuf::from("<stdout>"),
                    source,
                })?;
            return Err(ConfigError::FlagsDumped);
        }

        let mut names = self.inner.callbacks.flag_names();
        names.sort();
        if let Some(unknown) = names
            .into_iter()
            .find(|name| self.inner.registry.lookup(name).is_none())
        {
            return Err(ConfigError::CallbackRegistration(unknown));
        }

        // Triggers, SIGHUP included, are installed only after a successful parse.
        let parts = self.inner.startup.lock().take();
        let (triggers, results) = match parts {
            Some(parts) => self.inner.install_triggers(parts)?,
            None => (Vec::new(), None),
        };

        let generation = self.inner.generation.bump(&guard);
        self.inner.refresh_interval();
        let dispatch = self.inner.callbacks.dispatch_all(&runtime);
        drop(guard);

        tracing::info!(
            generation,
            changed = changes.len(),
            pinned = self.inner.pinned.get().map_or(0, BTreeSet::len),
            callbacks = dispatch.len(),
            "flags parsed"
        );

        let inner = Arc::clone(&self.inner);
        let reload: ReloadFn = Arc::new(move || inner.reload().map(|(changes, _)| changes));
        let scheduler =
            ReloadScheduler::start(&runtime, reload, self.inner.interval.subscribe(), triggers, results);
        *self.inner.scheduler.lock() = Some(scheduler);

        Ok(dispatch)
    }

    /// Re-read the config file now.
    ///
    /// Runs the same serialized path as the background loops: merge, bump
    /// the generation if anything changed, then fire the callbacks of the
    /// changed flags. Blocks while another reload holds the merge lock.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotStarted` before a successful `start`, or the
    /// parse/merge error. On error no flag has changed.
    pub fn reload(&self) -> Result<(FlagChanges, DispatchHandle)> {
        self.inner.reload()
    }

    /// Register `callback` to run after `flag_name` changes.
    ///
    /// Callbacks run on the blocking pool, each independently. All callbacks
    /// fire once when `start` completes; afterwards only those of changed
    /// flags fire.
    ///
    /// # Errors
    ///
    /// Once `start` has parsed the config file, returns
    /// `ConfigError::CallbackRegistration` for unknown flag names. Earlier
    /// registrations are checked by `start`.
    pub fn on_flag_change<F>(&self, flag_name: &str, callback: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        // Serializes with the batch check in `start`.
        let _guard = self.inner.merge_lock.lock();
        if self.inner.parsed.load(Ordering::SeqCst) && self.inner.registry.lookup(flag_name).is_none() {
            return Err(ConfigError::CallbackRegistration(flag_name.to_string()));
        }
        self.inner.callbacks.register(flag_name, callback);
        Ok(())
    }

    /// The current generation: 0 before `start`, then bumped once per
    /// committed change.
    pub fn generation(&self) -> u64 {
        self.inner.generation.current()
    }

    /// The underlying flag registry.
    pub fn registry(&self) -> &Arc<dyn FlagRegistry> {
        &self.inner.registry
    }

    /// The periodic reload interval currently in effect.
    pub fn update_interval(&self) -> Duration {
        *self.inner.interval.borrow()
    }

    /// The config file path, if `-config` is set.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.inner.config_path()
    }

    /// Whether `start` has been called.
    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Write the current flags in config file format.
    ///
    /// # Errors
    ///
    /// Returns any error from the writer.
    pub fn dump<W: Write>(&self, writer: W) -> io::Result<()> {
        dump::write_flags(&*self.inner.registry, writer)
    }

    /// Stop the background reload loops.
    ///
    /// Without this they run until the process exits.
    pub fn shutdown(&self) {
        if let Some(scheduler) = self.inner.scheduler.lock().take() {
            scheduler.shutdown();
            tracing::debug!("reload scheduler stopped");
        }
    }
}

impl Inner {
    fn reload(&self) -> Result<(FlagChanges, DispatchHandle)> {
        if !self.parsed.load(Ordering::SeqCst) {
            return Err(ConfigError::NotStarted);
        }
        let runtime = self.runtime.get().ok_or(ConfigError::NotStarted)?;

        let guard = self.merge_lock.lock();
        #[cfg(feature = "metrics")]
        let timer = self.metrics.as_ref().map(|m| (m, m.start_reload()));

        let changes = match self.merge_config() {
            Ok(changes) => changes,
            Err(e) => {
                #[cfg(feature = "metrics")]
                if let Some((metrics, start)) = timer {
                    metrics.record_reload_failure(start);
                }
                return Err(e);
            }
        };

        if changes.is_empty() {
            #[cfg(feature = "metrics")]
            if let Some((metrics, start)) = timer {
                metrics.record_reload_unchanged(start);
            }
            let unchanged = FlagChanges {
                generation: self.generation.current(),
                ..Default::default()
            };
            return Ok((unchanged, DispatchHandle::empty()));
        }

        let generation = self.generation.bump(&guard);
        self.refresh_interval();
        let dispatch = self.callbacks.dispatch_changed(runtime, &changes);
        let flag_changes = FlagChanges::from_change_set(generation, changes, &*self.registry);
        drop(guard);

        #[cfg(feature = "metrics")]
        if let Some((metrics, start)) = timer {
            metrics.record_reload_success(start, generation, dispatch.len());
        }

        Ok((flag_changes, dispatch))
    }

    /// Parse and merge the config file. The caller holds the merge lock.
    fn merge_config(&self) -> Result<ChangeSet> {
        let Some(path) = self.config_path() else {
            return Ok(ChangeSet::default());
        };
        let entries = parse_file(&path)?;
        let pinned = self.pinned.get().ok_or(ConfigError::NotStarted)?;
        Merger::new(&*self.registry, pinned)
            .with_mode(self.mode)
            .merge(&entries)
    }

    fn config_path(&self) -> Option<PathBuf> {
        self.registry
            .lookup(CONFIG_FLAG)
            .map(|record| record.current_value)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
    }

    fn flag_is_true(&self, name: &str) -> bool {
        self.registry
            .lookup(name)
            .and_then(|record| parse_bool(&record.current_value))
            .unwrap_or(false)
    }

    /// Publish the interval flag to the timer loop, waking it if it changed.
    fn refresh_interval(&self) {
        let Some(interval) = self
            .registry
            .lookup(UPDATE_INTERVAL_FLAG)
            .and_then(|record| parse_duration(&record.current_value).ok())
        else {
            return;
        };
        self.interval.send_if_modified(|current| {
            if *current == interval {
                return false;
            }
            tracing::info!(interval = ?interval, "config update interval changed");
            *current = interval;
            true
        });
    }

    /// Add the built-in triggers the builder asked for to the custom ones.
    #[allow(unused_mut)]
    fn install_triggers(
        &self,
        parts: StartupParts,
    ) -> Result<(Vec<Box<dyn TriggerSource>>, Option<mpsc::Sender<ReloadResult>>)> {
        let mut triggers = parts.triggers;
        #[cfg(all(unix, feature = "signal"))]
        if parts.hangup_signal {
            triggers.push(Box::new(crate::notify::HangupSignal::new()?));
        }
        #[cfg(not(all(unix, feature = "signal")))]
        if parts.hangup_signal {
            tracing::warn!("SIGHUP reloads are not available in this build");
        }

        #[cfg(feature = "file-watch")]
        if parts.file_watch {
            if let Some(path) = self.config_path() {
                triggers.push(Box::new(crate::notify::FileChangeTrigger::new(path)?));
            }
        }

        Ok((triggers, parts.results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FlagSet;
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn engine_with(flags: &Arc<FlagSet>) -> HotswapFlags {
        HotswapFlags::builder()
            .with_registry(Arc::clone(flags))
            .with_hangup_signal(false)
            .build()
            .unwrap()
    }

    #[test]
    fn test_start_outside_runtime() {
        let flags = Arc::new(FlagSet::new());
        let engine = engine_with(&flags);
        let err = engine.start().unwrap_err();
        assert!(matches!(err, ConfigError::RuntimeUnavailable(_)));
        assert!(!engine.is_started());
    }

    #[tokio::test]
    async fn test_reload_before_start() {
        let flags = Arc::new(FlagSet::new());
        let engine = engine_with(&flags);
        assert!(matches!(engine.reload(), Err(ConfigError::NotStarted)));
    }

    #[tokio::test]
    async fn test_start_without_config_file() {
        let flags = Arc::new(FlagSet::new());
        flags.define_int("workers", 4, "").unwrap();
        let engine = engine_with(&flags);

        engine.start().unwrap();
        assert_eq!(engine.generation(), 1);
        assert!(engine.config_path().is_none());

        let (changes, dispatch) = engine.reload().unwrap();
        assert!(changes.is_empty());
        assert!(dispatch.is_empty());
        assert_eq!(engine.generation(), 1);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_flag_changes_report_old_and_new() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.conf");
        fs::write(&path, "workers 8\n").unwrap();

        let flags = Arc::new(FlagSet::new());
        flags.define_int("workers", 4, "").unwrap();
        let engine = engine_with(&flags);
        flags
            .set_from_command_line(CONFIG_FLAG, path.to_str().unwrap())
            .unwrap();
        engine.start().unwrap();

        fs::write(&path, "workers 16\n").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        engine
            .on_flag_change("workers", move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let (changes, dispatch) = engine.reload().unwrap();
        assert_eq!(changes.generation, 2);
        assert_eq!(changes.changed.get("workers").map(String::as_str), Some("16"));
        assert_eq!(changes.old_values.get("workers").map(String::as_str), Some("8"));
        assert_eq!(dispatch.wait().await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_interval_flag_feeds_timer() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.conf");
        fs::write(&path, "configUpdateInterval 1h\n").unwrap();

        let flags = Arc::new(FlagSet::new());
        let engine = engine_with(&flags);
        flags
            .set_from_command_line(CONFIG_FLAG, path.to_str().unwrap())
            .unwrap();

        assert_eq!(engine.update_interval(), Duration::ZERO);
        engine.start().unwrap();
        assert_eq!(engine.update_interval(), Duration::from_secs(3600));
        engine.shutdown();
    }

    /// Records whether the merge lock was held on every lookup of `watched`.
    struct LockObserver {
        inner: FlagSet,
        watched: &'static str,
        engine: OnceLock<HotswapFlags>,
        unlocked_lookups: AtomicUsize,
    }

    impl FlagRegistry for LockObserver {
        fn define(&self, name: &str, kind: crate::registry::FlagKind, default: &str, description: &str) -> Result<()> {
            self.inner.define(name, kind, default, description)
        }

        fn lookup(&self, name: &str) -> Option<crate::registry::FlagRecord> {
            if name == self.watched {
                let locked = self
                    .engine
                    .get()
                    .is_some_and(|engine| engine.inner.merge_lock.is_locked());
                if !locked {
                    self.unlocked_lookups.fetch_add(1, Ordering::SeqCst);
                }
            }
            self.inner.lookup(name)
        }

        fn set(&self, name: &str, value: &str) -> std::result::Result<(), crate::error::ValidationError> {
            self.inner.set(name, value)
        }

        fn enumerate_all(&self) -> Vec<crate::registry::FlagRecord> {
            self.inner.enumerate_all()
        }

        fn explicitly_set(&self) -> BTreeSet<String> {
            self.inner.explicitly_set()
        }
    }

    #[tokio::test]
    async fn test_reload_reads_new_values_under_lock() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app.conf");
        fs::write(&path, "workers 1
").unwrap();

        let registry = Arc::new(LockObserver {
            inner: FlagSet::new(),
            watched: "workers",
            engine: OnceLock::new(),
            unlocked_lookups: AtomicUsize::new(0),
        });
        registry.inner.define_int("workers", 4, "").unwrap();
        let engine = HotswapFlags::builder()
            .with_registry(Arc::clone(&registry))
            .with_hangup_signal(false)
            .build()
            .unwrap();
        registry
            .inner
            .set_from_command_line(CONFIG_FLAG, path.to_str().unwrap())
            .unwrap();
        let _ = registry.engine.set(engine.clone());
        engine.start().unwrap();

        fs::write(&path, "workers 2
").unwrap();
        let (changes, _) = engine.reload().unwrap();

        assert_eq!(changes.changed.get("workers").map(String::as_str), Some("2"));
        assert_eq!(changes.old_values.get("workers").map(String::as_str), Some("1"));
        assert_eq!(registry.unlocked_lookups.load(Ordering::SeqCst), 0);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_failed_start_installs_no_triggers() {
        let flags = Arc::new(FlagSet::new());
        let (trigger_tx, trigger_rx) = mpsc::channel::<()>(1);
        let engine = HotswapFlags::builder()
            .with_registry(Arc::clone(&flags))
            .with_trigger(trigger_rx)
            .with_hangup_signal(false)
            .build()
            .unwrap();
        engine.on_flag_change("missing", || {}).unwrap();

        assert!(engine.start().is_err());
        assert!(engine.inner.startup.lock().is_some());
        assert!(engine.inner.scheduler.lock().is_none());
        assert!(!trigger_tx.is_closed());
    }

    #[tokio::test]
    async fn test_dumpflags_installs_no_triggers() {
        let flags = Arc::new(FlagSet::new());
        let engine = engine_with(&flags);
        flags.set_from_command_line(DUMP_FLAGS_FLAG, "true").unwrap();

        assert!(engine.start().unwrap_err().is_dump_requested());
        assert!(engine.inner.startup.lock().is_some());
        assert!(engine.inner.scheduler.lock().is_none());
    }
}
