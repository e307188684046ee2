/**
 * ============================================================================
 * LOCATION SOURCE MODULE
 * ============================================================================
 *
 * PURPOSE: Seam between the tracking pipeline and the platform location
 * provider
 *
 * IMPLEMENTATIONS:
 * - Platform providers live in the host (fused, GPS, CoreLocation, ...)
 * - ReplaySource: replays recorded samples on a tokio timer
 *
 * Sources push samples into a SampleSink from whatever thread or task
 * their callbacks run on.
 *
 * ============================================================================
 */

use crate::tracking::fanout::SampleSink;
use crate::tracking::types::LocationSample;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};

pub trait LocationSource: Send + Sync + 'static {
    fn has_permission(&self) -> bool;

    fn is_location_enabled(&self) -> bool;

    /**
     * Begin periodic updates at roughly `interval_ms`
     * Every fix must be pushed into `sink`
     */
    fn start_updates(&self, interval_ms: u64, sink: SampleSink) -> Result<(), String>;

    fn stop_updates(&self);

    /// Whether `current_location` performs a real single-shot query
    fn supports_single_shot(&self) -> bool {
        false
    }

    /// High-accuracy single-shot query, Ok(None) when no fix is available
    fn current_location(
        &self,
    ) -> impl Future<Output = Result<Option<LocationSample>, String>> + Send {
        async { Ok(None) }
    }

    fn last_known_location(&self) -> Option<LocationSample> {
        None
    }

    /// Ask for a single update to be delivered through `sink`
    fn request_location(&self, sink: SampleSink) {
        let _ = sink;
    }
}

/**
 * Replays a fixed list of samples at a fixed pace
 * Used by the replay binary and in tests
 */
pub struct ReplaySource {
    samples: Arc<Vec<LocationSample>>,
    pace: Duration,
    restamp: bool,
    permission: AtomicBool,
    enabled: AtomicBool,
    cursor: Arc<AtomicUsize>,
    last_known: Arc<Mutex<Option<LocationSample>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    finished_tx: Arc<watch::Sender<bool>>,
}

impl ReplaySource {
    pub fn new(samples: Vec<LocationSample>, pace: Duration) -> Self {
        let (finished_tx, _) = watch::channel(samples.is_empty());
        Self {
            samples: Arc::new(samples),
            pace,
            restamp: false,
            permission: AtomicBool::new(true),
            enabled: AtomicBool::new(true),
            cursor: Arc::new(AtomicUsize::new(0)),
            last_known: Arc::new(Mutex::new(None)),
            task: Mutex::new(None),
            finished_tx: Arc::new(finished_tx),
        }
    }

    /// Replace recorded timestamps with the wall clock at delivery
    pub fn with_restamp(mut self, restamp: bool) -> Self {
        self.restamp = restamp;
        self
    }

    pub fn set_permission(&self, granted: bool) {
        self.permission.store(granted, Ordering::SeqCst);
    }

    pub fn set_location_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn remaining(&self) -> usize {
        self.samples
            .len()
            .saturating_sub(self.cursor.load(Ordering::SeqCst))
    }

    /**
     * Resolve once every sample has been delivered
     */
    pub async fn wait_finished(&self) {
        let mut rx = self.finished_tx.subscribe();
        let _ = rx.wait_for(|finished| *finished).await;
    }

    fn next_sample(&self) -> Option<LocationSample> {
        next_sample(&self.samples, &self.cursor, self.restamp)
    }
}

fn next_sample(samples: &[LocationSample], cursor: &AtomicUsize, restamp: bool) -> Option<LocationSample> {
    let index = cursor.fetch_add(1, Ordering::SeqCst);
    let mut sample = samples.get(index).copied()?;
    if restamp {
        sample.timestamp_ms = chrono::Utc::now().timestamp_millis();
    }
    Some(sample)
}

// Call only after the last sample has been delivered to the sink
fn finish_if_exhausted(samples: &[LocationSample], cursor: &AtomicUsize, finished_tx: &watch::Sender<bool>) {
    if cursor.load(Ordering::SeqCst) >= samples.len() {
        finished_tx.send_replace(true);
    }
}

impl LocationSource for ReplaySource {
    fn has_permission(&self) -> bool {
        self.permission.load(Ordering::SeqCst)
    }

    fn is_location_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn start_updates(&self, interval_ms: u64, sink: SampleSink) -> Result<(), String> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| format!("Replay requires a tokio runtime: {}", e))?;

        let mut task = self.task.lock().unwrap();
        if let Some(previous) = task.take() {
            previous.abort();
        }

        let samples = Arc::clone(&self.samples);
        let cursor = Arc::clone(&self.cursor);
        let last_known = Arc::clone(&self.last_known);
        let finished_tx = Arc::clone(&self.finished_tx);
        let restamp = self.restamp;
        let pace = self.pace;

        log::info!(
            "[LOCATION] Replay started: {} sample(s) remaining, pace {:?}, requested interval {}ms",
            self.remaining(),
            pace,
            interval_ms
        );

        *task = Some(runtime.spawn(async move {
            while let Some(sample) = next_sample(&samples, &cursor, restamp) {
                *last_known.lock().unwrap() = Some(sample);
                sink.deliver(sample);
                finish_if_exhausted(&samples, &cursor, &finished_tx);
                sleep(pace).await;
            }
            finish_if_exhausted(&samples, &cursor, &finished_tx);
            log::info!("[LOCATION] Replay finished");
        }));

        Ok(())
    }

    fn stop_updates(&self) {
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
            log::info!("[LOCATION] Replay stopped");
        }
    }

    fn last_known_location(&self) -> Option<LocationSample> {
        *self.last_known.lock().unwrap()
    }

    fn request_location(&self, sink: SampleSink) {
        if let Some(sample) = self.next_sample() {
            *self.last_known.lock().unwrap() = Some(sample);
            sink.deliver(sample);
        }
        finish_if_exhausted(&self.samples, &self.cursor, &self.finished_tx);
    }
}
