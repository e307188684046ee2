/**
 * ============================================================================
 * EVENT FAN-OUT MODULE
 * ============================================================================
 *
 * PURPOSE: Deliver every incoming sample to its independent consumers
 *
 * ORDER PER SAMPLE:
 * 1. Live listener (bounded channel, try_send, never blocks)
 * 2. Pending one-shot location requests
 * 3. Throttle, then the transmission worker (if a config is live)
 *
 * A failure in one consumer never affects the others.
 *
 * Answers to single location requests arrive through a one-shot sink and
 * only complete pending one-shots: no listener event, no transmission.
 *
 * ============================================================================
 */

use crate::tracking::config::ConfigStore;
use crate::tracking::logger::PluginLog;
use crate::tracking::queue::{Dispatch, TransmissionWorker};
use crate::tracking::throttle::SampleThrottle;
use crate::tracking::types::LocationSample;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

/// Event delivered to listeners: the field map of one sample
pub type LocationEvent = Map<String, Value>;

pub struct EventFanout {
    listener: Mutex<Option<mpsc::Sender<LocationEvent>>>,
    one_shots: Mutex<Vec<oneshot::Sender<LocationSample>>>,
    throttle: SampleThrottle,
    store: Arc<ConfigStore>,
    worker: TransmissionWorker,
    dropped_events: AtomicU64,
    log: PluginLog,
}

impl EventFanout {
    pub fn new(store: Arc<ConfigStore>, worker: TransmissionWorker, log: PluginLog) -> Self {
        Self {
            listener: Mutex::new(None),
            one_shots: Mutex::new(Vec::new()),
            throttle: SampleThrottle::new(),
            store,
            worker,
            dropped_events: AtomicU64::new(0),
            log,
        }
    }

    /**
     * Entry point for the location source
     * Never blocks on network I/O or on a slow listener
     */
    pub fn on_sample(&self, sample: LocationSample) {
        self.log.location(format!(
            "Received location: {}, {} (accuracy {}m)",
            sample.latitude, sample.longitude, sample.accuracy
        ));

        self.deliver_to_listener(&sample);
        self.complete_one_shots(&sample);
        self.dispatch_if_eligible(sample);
    }

    fn deliver_to_listener(&self, sample: &LocationSample) {
        let mut listener = self.listener.lock().unwrap();
        let Some(tx) = listener.as_ref() else {
            return;
        };

        match tx.try_send(sample.to_field_map()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                self.log.warn(format!(
                    "[LOCATION] Listener buffer full, dropping event {}",
                    sample.timestamp_ms
                ));
            }
            Err(TrySendError::Closed(_)) => {
                *listener = None;
                self.log.location("Listener went away, detached");
            }
        }
    }

    /**
     * Entry point for the answer to a single location request
     */
    pub fn deliver_one_shot(&self, sample: LocationSample) {
        self.log.location(format!(
            "Received requested location: {}, {} (accuracy {}m)",
            sample.latitude, sample.longitude, sample.accuracy
        ));
        self.complete_one_shots(&sample);
    }

    fn complete_one_shots(&self, sample: &LocationSample) {
        let pending: Vec<_> = self.one_shots.lock().unwrap().drain(..).collect();
        if pending.is_empty() {
            return;
        }

        self.log.location(format!(
            "Completing {} pending location request(s)",
            pending.len()
        ));
        for tx in pending {
            // Receiver may have timed out already
            let _ = tx.send(*sample);
        }
    }

    fn dispatch_if_eligible(&self, sample: LocationSample) {
        let Some(active) = self.store.snapshot() else {
            return;
        };

        if !self
            .throttle
            .try_acquire(sample.timestamp_ms, active.config.min_interval_ms)
        {
            self.log.debug(format!(
                "Throttled sample {} (min interval {}ms)",
                sample.timestamp_ms, active.config.min_interval_ms
            ));
            return;
        }

        let generation = active.generation;
        if let Err(e) = self.worker.submit(Dispatch { active, sample }) {
            self.log
                .error(format!("Dropping sample (generation {}): {}", generation, e));
        }
    }

    /**
     * Attach a new listener, replacing any previous one
     */
    pub fn attach_listener(&self, capacity: usize) -> mpsc::Receiver<LocationEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let previous = self.listener.lock().unwrap().replace(tx);
        if previous.is_some() {
            self.log.service("Listener replaced");
        } else {
            self.log.service("Listener attached");
        }
        rx
    }

    pub fn detach_listener(&self) {
        if self.listener.lock().unwrap().take().is_some() {
            self.log.service("Listener detached");
        }
    }

    pub fn has_listener(&self) -> bool {
        self.listener
            .lock()
            .unwrap()
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /**
     * Register interest in the next delivered sample
     */
    pub fn register_one_shot(&self) -> oneshot::Receiver<LocationSample> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.one_shots.lock().unwrap();
        // Requests that timed out dropped their receiver
        pending.retain(|tx| !tx.is_closed());
        pending.push(tx);
        rx
    }

    pub fn pending_one_shots(&self) -> usize {
        self.one_shots.lock().unwrap().len()
    }

    /**
     * Drop every pending one-shot, their receivers observe cancellation
     */
    pub fn cancel_one_shots(&self) {
        let cancelled = {
            let mut pending = self.one_shots.lock().unwrap();
            let count = pending.len();
            pending.clear();
            count
        };
        if cancelled > 0 {
            self.log
                .location(format!("Cancelled {} pending location request(s)", cancelled));
        }
    }

    pub fn reset_throttle(&self) {
        self.throttle.reset();
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn worker(&self) -> &TransmissionWorker {
        &self.worker
    }
}

/**
 * Handle given to a location source for delivering samples
 */
#[derive(Clone)]
pub struct SampleSink {
    fanout: Arc<EventFanout>,
    one_shot_only: bool,
}

impl SampleSink {
    /// Sink for periodic updates: full fan-out
    pub fn new(fanout: Arc<EventFanout>) -> Self {
        Self {
            fanout,
            one_shot_only: false,
        }
    }

    /// Sink for a single location request: completes pending one-shots only
    pub fn one_shot(fanout: Arc<EventFanout>) -> Self {
        Self {
            fanout,
            one_shot_only: true,
        }
    }

    pub fn deliver(&self, sample: LocationSample) {
        if self.one_shot_only {
            self.fanout.deliver_one_shot(sample);
        } else {
            self.fanout.on_sample(sample);
        }
    }
}
