//! Per-flag change callbacks and their concurrent dispatch.

use crate::core::ChangeSet;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Callback invoked after a flag's value changes.
pub type FlagChangeCallback = Arc<dyn Fn() + Send + Sync>;

type CallbackTable = HashMap<String, Vec<FlagChangeCallback>>;

/// Registry of callbacks keyed by flag name.
///
/// Registration copies the table and swaps it in, so dispatch reads a
/// consistent snapshot without holding a lock while spawning.
///
/// Name validation is the caller's job: the registry accepts any name.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_flags::notify::CallbackRegistry;
///
/// # async fn example() {
/// let registry = CallbackRegistry::new();
/// registry.register("workers", || println!("workers changed"));
///
/// let dispatch = registry.dispatch_all(&tokio::runtime::Handle::current());
/// dispatch.wait().await;
/// # }
/// ```
pub struct CallbackRegistry {
    table: ArcSwap<CallbackTable>,
}

impl CallbackRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Append `callback` to the list for `flag_name`.
    pub fn register<F>(&self, flag_name: &str, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let callback: FlagChangeCallback = Arc::new(callback);
        self.table.rcu(|table| {
            let mut table = CallbackTable::clone(table);
            table
                .entry(flag_name.to_string())
                .or_default()
                .push(Arc::clone(&callback));
            table
        });
    }

    /// Flag names that have at least one callback.
    pub fn flag_names(&self) -> Vec<String> {
        self.table.load().keys().cloned().collect()
    }

    /// Total number of registered callbacks.
    pub fn callback_count(&self) -> usize {
        self.table.load().values().map(Vec::len).sum()
    }

    /// Fire every registered callback once.
    pub fn dispatch_all(&self, runtime: &Handle) -> DispatchHandle {
        let table = self.table.load_full();
        let tasks = table
            .iter()
            .flat_map(|(name, callbacks)| callbacks.iter().map(move |cb| (name, cb)))
            .map(|(name, cb)| spawn_callback(runtime, name, cb))
            .collect();
        DispatchHandle { tasks }
    }

    /// Fire the callbacks of every flag in `changes`.
    pub fn dispatch_changed(&self, runtime: &Handle, changes: &ChangeSet) -> DispatchHandle {
        let table = self.table.load_full();
        let tasks = changes
            .names()
            .filter_map(|name| table.get_key_value(name))
            .flat_map(|(name, callbacks)| callbacks.iter().map(move |cb| (name, cb)))
            .map(|(name, cb)| spawn_callback(runtime, name, cb))
            .collect();
        DispatchHandle { tasks }
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Callbacks are plain blocking closures, so they go to the blocking pool.
fn spawn_callback(runtime: &Handle, flag_name: &str, callback: &FlagChangeCallback) -> JoinHandle<()> {
    let callback = Arc::clone(callback);
    let flag_name = flag_name.to_string();
    tracing::trace!(flag = %flag_name, "dispatching flag change callback");
    runtime.spawn_blocking(move || {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback())) {
            tracing::error!(flag = %flag_name, "flag change callback panicked");
            panic::resume_unwind(payload);
        }
    })
}

/// The callbacks started by one dispatch.
///
/// Dropping the handle detaches the callbacks; they still run to completion.
#[derive(Debug, Default)]
pub struct DispatchHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl DispatchHandle {
    /// A handle for a dispatch that started nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of callbacks started.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True if no callbacks were started.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every callback to finish.
    ///
    /// Returns how many completed without panicking.
    pub async fn wait(self) -> usize {
        let mut completed = 0;
        for task in self.tasks {
            match task.await {
                Ok(()) => completed += 1,
                Err(e) => tracing::warn!(error = %e, "flag change callback failed"),
            }
        }
        completed
    }
}
