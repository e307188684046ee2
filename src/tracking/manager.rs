/**
 * ============================================================================
 * TRACKING MANAGER MODULE
 * ============================================================================
 *
 * PURPOSE: Own the tracking state machine and the command surface
 *
 * RESPONSIBILITIES:
 * - Validate and store the transmission config on start
 * - Start/stop the location source
 * - Serve one-shot location requests
 * - Persist the "tracking requested" flag
 *
 * STATE MACHINE:
 *   Stopped -> Starting -> Tracking -> Stopped
 *   Any start failure returns to Stopped with the config cleared.
 *   Start while Tracking swaps the config in place.
 *   Each command holds the state lock from start to finish, so
 *   concurrent start/stop/terminate calls apply one after another.
 *
 * ============================================================================
 */

use crate::tracking::client::HttpTransmitter;
use crate::tracking::config::{ConfigStore, PluginOptions, TransmissionConfig};
use crate::tracking::error::TrackingError;
use crate::tracking::fanout::{EventFanout, LocationEvent, SampleSink};
use crate::tracking::logger::PluginLog;
use crate::tracking::queue::{TransmissionWorker, WorkerStats};
use crate::tracking::source::LocationSource;
use crate::tracking::state::ServiceState;
use crate::tracking::types::{LocationSample, TrackingState};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::timeout;

pub struct TrackingManager<S: LocationSource> {
    source: Arc<S>,
    store: Arc<ConfigStore>,
    fanout: Arc<EventFanout>,
    service_state: ServiceState,
    options: PluginOptions,
    state: Mutex<TrackingState>,
    log: PluginLog,
}

impl<S: LocationSource> TrackingManager<S> {
    /**
     * Wire the pipeline together
     * Must be called inside a tokio runtime (spawns the transmission worker)
     */
    pub fn new(source: Arc<S>, options: PluginOptions) -> Result<Self, String> {
        let log = PluginLog::default();
        let store = Arc::new(ConfigStore::new(log.clone()));
        let transmitter = HttpTransmitter::new(log.clone())?;
        let worker = TransmissionWorker::spawn(transmitter, Arc::clone(&store), log.clone())?;
        let fanout = Arc::new(EventFanout::new(Arc::clone(&store), worker, log.clone()));
        let service_state = ServiceState::new(&options.data_dir, log.clone());

        log.service(format!(
            "Tracking manager ready (state file {})",
            service_state.path().display()
        ));

        Ok(Self {
            source,
            store,
            fanout,
            service_state,
            options,
            state: Mutex::new(TrackingState::Stopped),
            log,
        })
    }

    pub fn state(&self) -> TrackingState {
        *self.state.lock().unwrap()
    }

    fn transition(&self, state: &mut TrackingState, to: TrackingState) {
        if *state != to {
            self.log
                .service(format!("State: {:?} -> {:?}", *state, to));
            *state = to;
        }
    }

    fn sink(&self) -> SampleSink {
        SampleSink::new(Arc::clone(&self.fanout))
    }

    fn one_shot_sink(&self) -> SampleSink {
        SampleSink::one_shot(Arc::clone(&self.fanout))
    }

    pub fn check_permission(&self) -> bool {
        let granted = self.source.has_permission();
        self.log
            .permission(format!("Location permission granted: {}", granted));
        granted
    }

    pub fn is_location_enabled(&self) -> bool {
        let enabled = self.source.is_location_enabled();
        self.log
            .location(format!("Location services enabled: {}", enabled));
        enabled
    }

    /**
     * Start tracking, or replace the config of an active session
     *
     * Errors: INVALID_CONFIG, PERMISSION_DENIED, LOCATION_ERROR.
     * Every error leaves the manager Stopped with an empty config.
     */
    pub fn start_tracking(&self, args: &Value) -> Result<(), TrackingError> {
        self.log.action("startTracking");
        let mut state = self.state.lock().unwrap();
        let was_running = state.is_running();

        let config = match TransmissionConfig::from_raw(args).and_then(|c| {
            c.validate()?;
            Ok(c)
        }) {
            Ok(config) => config,
            Err(message) => {
                return Err(self.fail_start(
                    &mut state,
                    was_running,
                    TrackingError::invalid_config(message),
                ));
            }
        };

        if !self.source.has_permission() {
            self.log.permission("Start refused: location permission not granted");
            return Err(self.fail_start(&mut state, was_running, TrackingError::PermissionDenied));
        }

        if was_running {
            return self.reconfigure(&mut state, config);
        }

        self.transition(&mut state, TrackingState::Starting);
        let interval_ms = config.min_interval_ms;
        let active = self.store.replace(config);
        self.fanout.reset_throttle();

        if let Err(e) = self.source.start_updates(interval_ms, self.sink()) {
            return Err(self.fail_start(&mut state, false, TrackingError::location(e)));
        }

        self.transition(&mut state, TrackingState::Tracking);
        self.service_state.save_running(true);
        self.log.service(format!(
            "Tracking started: {} {} every {}ms (generation {})",
            active.config.method, active.config.endpoint_template, interval_ms, active.generation
        ));
        Ok(())
    }

    fn reconfigure(
        &self,
        state: &mut TrackingState,
        config: TransmissionConfig,
    ) -> Result<(), TrackingError> {
        let previous_interval = self
            .store
            .snapshot()
            .map(|active| active.config.min_interval_ms);
        let interval_ms = config.min_interval_ms;
        self.store.replace(config);

        if previous_interval != Some(interval_ms) {
            self.log
                .service(format!("Interval changed, restarting updates at {}ms", interval_ms));
            self.source.stop_updates();
            if let Err(e) = self.source.start_updates(interval_ms, self.sink()) {
                return Err(self.fail_start(state, true, TrackingError::location(e)));
            }
        }
        Ok(())
    }

    fn fail_start(
        &self,
        state: &mut TrackingState,
        was_running: bool,
        error: TrackingError,
    ) -> TrackingError {
        self.log.error(format!("startTracking failed: {}", error));
        if was_running {
            self.source.stop_updates();
            self.service_state.save_running(false);
        }
        self.store.clear();
        self.fanout.reset_throttle();
        self.transition(state, TrackingState::Stopped);
        error
    }

    /**
     * User-requested stop
     * In-flight transmissions complete, queued ones are skipped
     */
    pub fn stop_tracking(&self) {
        self.log.action("stopTracking");
        let mut state = self.state.lock().unwrap();
        self.store.clear();
        self.source.stop_updates();
        self.fanout.reset_throttle();
        self.transition(&mut state, TrackingState::Stopped);
        self.service_state.save_running(false);
    }

    pub fn is_tracking_running(&self) -> bool {
        self.state().is_running()
    }

    /**
     * One-shot location fix, never throttled and never transmitted
     */
    pub async fn get_current_location(&self) -> Result<LocationSample, TrackingError> {
        self.log.action("getCurrentLocation");

        if !self.source.has_permission() {
            return Err(TrackingError::PermissionDenied);
        }

        if self.source.supports_single_shot() {
            return match self.source.current_location().await {
                Ok(Some(sample)) => Ok(sample),
                Ok(None) => {
                    self.log.location("No fresh fix, using last known location");
                    self.source
                        .last_known_location()
                        .ok_or(TrackingError::NoLocation)
                }
                Err(e) => Err(TrackingError::location(e)),
            };
        }

        let rx = self.fanout.register_one_shot();
        self.source.request_location(self.one_shot_sink());

        match timeout(self.options.one_shot_timeout, rx).await {
            Ok(Ok(sample)) => Ok(sample),
            Ok(Err(_)) => Err(TrackingError::location("Location request cancelled")),
            Err(_) => {
                self.log.warn(format!(
                    "[LOCATION] No location within {:?}",
                    self.options.one_shot_timeout
                ));
                Err(TrackingError::NoLocation)
            }
        }
    }

    /**
     * Attach the event listener, replacing any previous one
     */
    pub fn attach_listener(&self) -> mpsc::Receiver<LocationEvent> {
        self.fanout.attach_listener(self.options.listener_capacity)
    }

    pub fn detach_listener(&self) {
        self.fanout.detach_listener();
    }

    /**
     * The host reports the OS killed the service
     * Tracking stops but the persisted flag stays set so the host can resume
     */
    pub fn terminate(&self) {
        self.log.service("Service terminated by host");
        let mut state = self.state.lock().unwrap();
        self.store.clear();
        self.source.stop_updates();
        self.fanout.reset_throttle();
        self.fanout.cancel_one_shots();
        self.transition(&mut state, TrackingState::Stopped);
    }

    pub fn should_resume_tracking(&self) -> bool {
        self.service_state.is_running()
    }

    pub fn worker_stats(&self) -> WorkerStats {
        self.fanout.worker().stats()
    }

    pub fn dropped_events(&self) -> u64 {
        self.fanout.dropped_events()
    }

    /**
     * Wait until every queued transmission has been processed
     */
    pub async fn wait_for_transmissions(&self) {
        self.fanout.worker().wait_idle().await;
    }

    /**
     * Stop the transmission worker once its queue is drained
     */
    pub async fn shutdown(&self) {
        self.fanout.worker().shutdown().await;
    }
}
