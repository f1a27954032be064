//! Reload trigger sources.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// An asynchronous stream of reload requests.
///
/// Each event yields one reload attempt. Returning `None` ends the stream
/// and stops the listener loop driving it.
///
/// Implement this trait to reload on custom events (admin endpoints,
/// message bus notifications, ...).
#[async_trait]
pub trait TriggerSource: Send + 'static {
    /// Wait for the next reload request.
    async fn next_trigger(&mut self) -> Option<()>;

    /// Get a human-readable name for this source (for logging/debugging).
    fn name(&self) -> String;
}

#[async_trait]
impl TriggerSource for mpsc::Receiver<()> {
    async fn next_trigger(&mut self) -> Option<()> {
        self.recv().await
    }

    fn name(&self) -> String {
        "channel".to_string()
    }
}

#[async_trait]
impl TriggerSource for mpsc::UnboundedReceiver<()> {
    async fn next_trigger(&mut self) -> Option<()> {
        self.recv().await
    }

    fn name(&self) -> String {
        "unbounded-channel".to_string()
    }
}

/// Reload trigger fired by `SIGHUP`.
#[cfg(all(unix, feature = "signal"))]
pub struct HangupSignal {
    signal: tokio::signal::unix::Signal,
}

#[cfg(all(unix, feature = "signal"))]
impl HangupSignal {
    /// Install the `SIGHUP` handler.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::TriggerError` if the handler cannot be registered.
    pub fn new() -> crate::error::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        let signal = signal(SignalKind::hangup()).map_err(|e| {
            crate::error::ConfigError::TriggerError(format!("Failed to install SIGHUP handler: {}", e))
        })?;
        Ok(Self { signal })
    }
}

#[cfg(all(unix, feature = "signal"))]
#[async_trait]
impl TriggerSource for HangupSignal {
    async fn next_trigger(&mut self) -> Option<()> {
        self.signal.recv().await
    }

    fn name(&self) -> String {
        "signal:SIGHUP".to_string()
    }
}
