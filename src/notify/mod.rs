//! Change notification and reload triggering.
//!
//! Provides per-flag callbacks, trigger sources (channels, `SIGHUP`, file
//! changes) and the scheduler that turns triggers into serialized reloads.

pub mod callbacks;
pub mod scheduler;
pub mod trigger;

#[cfg(feature = "file-watch")]
pub mod watcher;

pub use callbacks::{CallbackRegistry, DispatchHandle, FlagChangeCallback};
pub use scheduler::{ReloadFn, ReloadScheduler};
pub use trigger::TriggerSource;

#[cfg(all(unix, feature = "signal"))]
pub use trigger::HangupSignal;

#[cfg(feature = "file-watch")]
pub use watcher::FileChangeTrigger;
