/**
 * ============================================================================
 * PLUGIN LOGGER MODULE
 * ============================================================================
 *
 * PURPOSE: Category-tagged logging gated by the active debug flag
 *
 * BEHAVIOR:
 * - Informational messages only emitted while debug logging is enabled
 * - Warnings and errors always emitted
 * - Flag follows the active TransmissionConfig (true when none is active)
 *
 * ============================================================================
 */

use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone)]
pub struct PluginLog {
    debug: Arc<AtomicBool>,
}

impl Default for PluginLog {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PluginLog {
    pub fn new(enabled: bool) -> Self {
        Self {
            debug: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn service(&self, message: impl Display) {
        if self.is_enabled() {
            log::info!("[SERVICE] {}", message);
        }
    }

    pub fn action(&self, message: impl Display) {
        if self.is_enabled() {
            log::info!("[ACTION] {}", message);
        }
    }

    pub fn location(&self, message: impl Display) {
        if self.is_enabled() {
            log::info!("[LOCATION] {}", message);
        }
    }

    pub fn permission(&self, message: impl Display) {
        if self.is_enabled() {
            log::info!("[PERMISSION] {}", message);
        }
    }

    pub fn http(&self, message: impl Display) {
        if self.is_enabled() {
            log::info!("[HTTP] {}", message);
        }
    }

    pub fn debug(&self, message: impl Display) {
        if self.is_enabled() {
            log::debug!("{}", message);
        }
    }

    pub fn warn(&self, message: impl Display) {
        log::warn!("{}", message);
    }

    pub fn error(&self, message: impl Display) {
        log::error!("[ERROR] {}", message);
    }
}
