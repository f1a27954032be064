//! Background loops that drive reloads.

use super::TriggerSource;
use crate::core::ReloadResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// One serialized reload attempt.
///
/// The function blocks (it reads the config file and takes the merge lock),
/// so the scheduler runs it on the blocking pool.
pub type ReloadFn = Arc<dyn Fn() -> ReloadResult + Send + Sync>;

/// Runs the periodic timer loop and one listener loop per trigger source.
///
/// Every loop calls the same reload function and publishes its result on the
/// optional results channel. Triggers are not coalesced: each one performs
/// its own reload.
pub struct ReloadScheduler {
    tasks: Vec<JoinHandle<()>>,
}

impl ReloadScheduler {
    /// Spawn the loops on `runtime`.
    ///
    /// `interval` holds the timer period; zero parks the timer until a new
    /// value is sent.
    pub fn start(
        runtime: &Handle,
        reload: ReloadFn,
        interval: watch::Receiver<Duration>,
        triggers: Vec<Box<dyn TriggerSource>>,
        results: Option<mpsc::Sender<ReloadResult>>,
    ) -> Self {
        let mut tasks = Vec::with_capacity(triggers.len() + 1);

        tasks.push(runtime.spawn(timer_loop(
            interval,
            Arc::clone(&reload),
            results.clone(),
        )));

        for source in triggers {
            tasks.push(runtime.spawn(trigger_loop(
                source,
                Arc::clone(&reload),
                results.clone(),
            )));
        }

        Self { tasks }
    }

    /// Number of background loops.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Abort every loop. Reloads already in progress run to completion.
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

async fn timer_loop(
    mut interval: watch::Receiver<Duration>,
    reload: ReloadFn,
    results: Option<mpsc::Sender<ReloadResult>>,
) {
    loop {
        let period = *interval.borrow_and_update();
        if period.is_zero() {
            if interval.changed().await.is_err() {
                return;
            }
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(period) => {
                run_reload(&reload, results.as_ref(), "timer").await;
            }
            changed = interval.changed() => {
                if changed.is_err() {
                    return;
                }
                tracing::debug!("update interval changed, restarting timer");
            }
        }
    }
}

async fn trigger_loop(
    mut source: Box<dyn TriggerSource>,
    reload: ReloadFn,
    results: Option<mpsc::Sender<ReloadResult>>,
) {
    let name = source.name();
    while source.next_trigger().await.is_some() {
        run_reload(&reload, results.as_ref(), &name).await;
    }
    tracing::debug!(source = %name, "reload trigger closed");
}

async fn run_reload(reload: &ReloadFn, results: Option<&mpsc::Sender<ReloadResult>>, cause: &str) {
    let reload = Arc::clone(reload);
    let result = match tokio::task::spawn_blocking(move || reload()).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(cause = %cause, error = %e, "reload task failed");
            return;
        }
    };

    match &result {
        Ok(changes) if changes.is_empty() => {
            tracing::debug!(cause = %cause, "config reloaded, no changes");
        }
        Ok(changes) => {
            tracing::info!(
                cause = %cause,
                generation = changes.generation,
                changed = changes.changed.len(),
                "config reloaded"
            );
        }
        Err(e) => {
            tracing::warn!(cause = %cause, error = %e, "config reload failed, keeping current flags");
        }
    }

    if let Some(tx) = results {
        // Publishing must not stall this loop on a slow consumer.
        let tx = tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(result).await;
        });
    }
}
