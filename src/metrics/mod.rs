//! Built-in metrics for reload operations.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Reload attempts, changes, no-ops and failures
//! - Reload duration
//! - Current generation
//! - Dispatched callbacks
//!
//! # Examples
//!
//! ```rust,no_run
//! use hotswap_flags::prelude::*;
//! use opentelemetry::global;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<()> {
//! let flags = Arc::new(FlagSet::new());
//! let engine = HotswapFlags::builder()
//!     .with_registry(flags)
//!     .with_metrics(global::meter("my-app"))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod reload_metrics;

pub use reload_metrics::ReloadMetrics;
