/**
 * ============================================================================
 * TRANSMISSION WORKER MODULE
 * ============================================================================
 *
 * PURPOSE: Run outbound HTTP transmissions off the sample delivery path
 *
 * ARCHITECTURE:
 * - Unbounded MPSC channel for dispatch submission (never blocks the sender)
 * - Single background task processes dispatches sequentially
 * - Each dispatch carries the config snapshot it was throttled against
 *
 * FAILURE POLICY:
 * - Transport errors and non-2xx responses are logged and counted
 * - No retries, the next dispatch is processed normally
 * - Dispatches whose tracking session ended before they were dequeued
 *   are skipped, even if a new session has started since
 *
 * ============================================================================
 */

use crate::tracking::client::HttpTransmitter;
use crate::tracking::config::{ActiveConfig, ConfigStore};
use crate::tracking::logger::PluginLog;
use crate::tracking::types::LocationSample;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// One sample to transmit with the configuration it was accepted under
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub active: Arc<ActiveConfig>,
    pub sample: LocationSample,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub pending: u64,
    pub last_error: Option<String>,
}

pub struct TransmissionWorker {
    sender: Mutex<Option<mpsc::UnboundedSender<Dispatch>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<Mutex<WorkerStats>>,
    // Mirrors stats.pending, updated under the stats lock
    pending_tx: Arc<watch::Sender<u64>>,
    log: PluginLog,
}

/**
 * Apply a stats update and publish the resulting pending count
 */
fn update_stats(
    stats: &Mutex<WorkerStats>,
    pending_tx: &watch::Sender<u64>,
    update: impl FnOnce(&mut WorkerStats),
) {
    let mut stats = stats.lock().unwrap();
    update(&mut stats);
    pending_tx.send_replace(stats.pending);
}

impl TransmissionWorker {
    /**
     * Start the background processor on the current tokio runtime
     */
    pub fn spawn(
        transmitter: HttpTransmitter,
        store: Arc<ConfigStore>,
        log: PluginLog,
    ) -> Result<Self, String> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| format!("Transmission worker requires a tokio runtime: {}", e))?;

        let (tx, rx) = mpsc::unbounded_channel::<Dispatch>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let (pending_tx, _) = watch::channel(0_u64);
        let pending_tx = Arc::new(pending_tx);

        let handle = runtime.spawn(process_dispatches(
            rx,
            transmitter,
            store,
            Arc::clone(&stats),
            Arc::clone(&pending_tx),
            log.clone(),
        ));

        log.service("Transmission worker started");

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            stats,
            pending_tx,
            log,
        })
    }

    /**
     * Queue a dispatch for transmission
     * Non-blocking: returns immediately after queuing
     */
    pub fn submit(&self, dispatch: Dispatch) -> Result<(), String> {
        let sender = self.sender.lock().unwrap();
        let tx = sender
            .as_ref()
            .ok_or_else(|| "Transmission worker is shut down".to_string())?;

        update_stats(&self.stats, &self.pending_tx, |stats| {
            stats.submitted += 1;
            stats.pending += 1;
        });

        if let Err(e) = tx.send(dispatch) {
            update_stats(&self.stats, &self.pending_tx, |stats| {
                stats.pending = stats.pending.saturating_sub(1);
            });
            return Err(format!("Failed to queue transmission: {}", e));
        }

        Ok(())
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().unwrap().clone()
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().unwrap().is_some()
    }

    /**
     * Wait until every queued dispatch has been processed
     */
    pub async fn wait_idle(&self) {
        let mut rx = self.pending_tx.subscribe();
        let _ = rx.wait_for(|pending| *pending == 0).await;
    }

    /**
     * Close the queue and wait for the processor to finish what is queued
     */
    pub async fn shutdown(&self) {
        self.log.service("Shutting down transmission worker...");

        // Dropping the sender closes the channel once the queue drains
        self.sender.lock().unwrap().take();

        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                self.log
                    .error(format!("Transmission worker ended abnormally: {}", e));
            }
        }

        self.log.service("Transmission worker shutdown complete");
    }
}

async fn process_dispatches(
    mut rx: mpsc::UnboundedReceiver<Dispatch>,
    transmitter: HttpTransmitter,
    store: Arc<ConfigStore>,
    stats: Arc<Mutex<WorkerStats>>,
    pending_tx: Arc<watch::Sender<u64>>,
    log: PluginLog,
) {
    while let Some(dispatch) = rx.recv().await {
        process_dispatch(&transmitter, &store, &stats, &pending_tx, &log, dispatch).await;
    }
    log.service("Transmission worker stopped");
}

async fn process_dispatch(
    transmitter: &HttpTransmitter,
    store: &ConfigStore,
    stats: &Mutex<WorkerStats>,
    pending_tx: &watch::Sender<u64>,
    log: &PluginLog,
    dispatch: Dispatch,
) {
    let generation = dispatch.active.generation;

    if !store.is_current_session(dispatch.active.session) {
        log.service(format!(
            "Skipping queued transmission (generation {}, session {}): tracking stopped",
            generation, dispatch.active.session
        ));
        update_stats(stats, pending_tx, |stats| {
            stats.skipped += 1;
            stats.pending = stats.pending.saturating_sub(1);
        });
        return;
    }

    log.http(format!(
        "Transmitting sample {} (generation {})",
        dispatch.sample.timestamp_ms, generation
    ));

    let result = transmitter
        .transmit(&dispatch.active.config, &dispatch.sample)
        .await;

    let last_error = match result {
        Ok(outcome) if outcome.success => None,
        Ok(outcome) => Some(format!("HTTP {}", outcome.status)),
        Err(e) => {
            log.error(format!(
                "Transmission failed (generation {}): {}",
                generation, e
            ));
            Some(e.to_string())
        }
    };

    update_stats(stats, pending_tx, |stats| {
        stats.pending = stats.pending.saturating_sub(1);
        match last_error {
            None => stats.completed += 1,
            Some(error) => {
                stats.failed += 1;
                stats.last_error = Some(error);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::config::TransmissionConfig;
    use tokio::time::Duration;

    fn worker(store: Arc<ConfigStore>) -> TransmissionWorker {
        let log = PluginLog::default();
        let transmitter = HttpTransmitter::new(log.clone()).unwrap();
        TransmissionWorker::spawn(transmitter, store, log).unwrap()
    }

    fn unreachable_config() -> TransmissionConfig {
        TransmissionConfig {
            endpoint_template: "http://127.0.0.1:9/ingest".to_string(),
            ..TransmissionConfig::default()
        }
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let log = PluginLog::default();
        let transmitter = HttpTransmitter::new(log.clone()).unwrap();
        let store = Arc::new(ConfigStore::new(log.clone()));
        assert!(TransmissionWorker::spawn(transmitter, store, log).is_err());
    }

    #[tokio::test]
    async fn test_skips_when_store_cleared() {
        let store = Arc::new(ConfigStore::new(PluginLog::default()));
        let active = store.replace(unreachable_config());
        store.clear();

        let worker = worker(Arc::clone(&store));
        worker
            .submit(Dispatch {
                active,
                sample: LocationSample::new(1.0, 2.0, 0.0, 1.0, 0),
            })
            .unwrap();
        worker.wait_idle().await;

        let stats = worker.stats();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_skips_stopped_session_after_restart() {
        let store = Arc::new(ConfigStore::new(PluginLog::default()));
        let stopped = store.replace(unreachable_config());
        store.clear();
        let restarted = store.replace(unreachable_config());
        assert_ne!(stopped.session, restarted.session);

        let worker = worker(Arc::clone(&store));
        worker
            .submit(Dispatch {
                active: stopped,
                sample: LocationSample::new(1.0, 2.0, 0.0, 1.0, 0),
            })
            .unwrap();
        worker.wait_idle().await;

        let stats = worker.stats();
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.completed, 0);
    }

    #[tokio::test]
    async fn test_wait_idle_resolves_without_polling() {
        let store = Arc::new(ConfigStore::new(PluginLog::default()));
        let active = store.replace(unreachable_config());
        let worker = worker(Arc::clone(&store));

        tokio::time::timeout(Duration::from_secs(1), worker.wait_idle())
            .await
            .expect("idle worker should resolve immediately");

        store.clear();
        for ts in [0, 1, 2] {
            worker
                .submit(Dispatch {
                    active: Arc::clone(&active),
                    sample: LocationSample::new(1.0, 2.0, 0.0, 1.0, ts),
                })
                .unwrap();
        }
        tokio::time::timeout(Duration::from_secs(1), worker.wait_idle())
            .await
            .expect("worker should become idle once the queue drains");

        let stats = worker.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.skipped, 3);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_processing() {
        let store = Arc::new(ConfigStore::new(PluginLog::default()));
        let active = store.replace(unreachable_config());

        let worker = worker(Arc::clone(&store));
        for ts in [0, 10_000] {
            worker
                .submit(Dispatch {
                    active: Arc::clone(&active),
                    sample: LocationSample::new(1.0, 2.0, 0.0, 1.0, ts),
                })
                .unwrap();
        }
        worker.wait_idle().await;

        let stats = worker.stats();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.pending, 0);
        assert!(stats.last_error.is_some());
        assert!(worker.is_running());
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let store = Arc::new(ConfigStore::new(PluginLog::default()));
        let active = store.replace(unreachable_config());
        let worker = worker(store);

        worker.shutdown().await;
        assert!(!worker.is_running());
        let result = worker.submit(Dispatch {
            active,
            sample: LocationSample::new(1.0, 2.0, 0.0, 1.0, 0),
        });
        assert!(result.is_err());
    }
}
