//! # hotswap-flags
//!
//! Command-line flags backed by a hot-reloaded config file.
//!
//! ## Overview
//!
//! `hotswap-flags` keeps a set of typed flags in sync with a plain text
//! config file:
//! - Command-line values always win and are never overwritten
//! - Config files use one `name value` pair per line with `#` comments
//! - Reloads are atomic: a bad file changes nothing
//! - Reloads run on `SIGHUP`, on a timer, and on custom triggers
//! - Per-flag callbacks fire after a value changes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hotswap_flags::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> hotswap_flags::error::Result<()> {
//! let flags = Arc::new(FlagSet::new());
//! flags.define_string("listen", ":8080", "address to listen on")?;
//! flags.define_duration("timeout", Duration::from_secs(5), "request timeout")?;
//!
//! let engine = HotswapFlags::builder()
//!     .with_registry(Arc::clone(&flags))
//!     .with_config_path("/etc/myapp.conf")
//!     .build()?;
//!
//! // -config, -configUpdateInterval and -dumpflags are now defined too
//! flags.parse_args(std::env::args().skip(1))?;
//!
//! engine.on_flag_change("timeout", || println!("timeout changed"))?;
//! engine.start()?;
//!
//! println!("timeout: {:?}", flags.get_duration("timeout"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Config file format
//!
//! ```text
//! # comment
//! listen :9090
//! timeout 30s
//! verbose            # a bare name sets a boolean flag to true
//! ```
//!
//! ## Feature Flags
//!
//! - `signal` (default): reload on `SIGHUP`
//! - `file-watch`: reload when the config file changes on disk
//! - `metrics`: OpenTelemetry reload metrics

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod notify;
pub mod registry;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{FlagChanges, HotswapFlags, HotswapFlagsBuilder, MergeMode, ReloadResult};
    pub use crate::error::{ConfigError, Result, ValidationError};
    pub use crate::notify::{DispatchHandle, TriggerSource};
    pub use crate::registry::{FlagKind, FlagRegistry, FlagSet};
}
