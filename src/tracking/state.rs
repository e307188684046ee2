/**
 * ============================================================================
 * SERVICE STATE MODULE
 * ============================================================================
 *
 * PURPOSE: Persist the "tracking requested" flag across restarts
 *
 * STORAGE: {data_dir}/service_state.json, written via temp file + rename
 *
 * Write failures are logged and never fail the calling command.
 *
 * ============================================================================
 */

use crate::tracking::logger::PluginLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const STATE_FILE: &str = "service_state.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub running: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ServiceState {
    path: PathBuf,
    log: PluginLog,
}

impl ServiceState {
    pub fn new(data_dir: &Path, log: PluginLog) -> Self {
        Self {
            path: data_dir.join(STATE_FILE),
            log,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /**
     * Record whether tracking should be running
     * Errors are logged, not returned
     */
    pub fn save_running(&self, running: bool) {
        match self.write(running) {
            Ok(()) => self
                .log
                .service(format!("Saved service state: running={}", running)),
            Err(e) => self.log.error(format!("Failed to save service state: {}", e)),
        }
    }

    /**
     * Read the persisted flag
     * Missing or unreadable state counts as not running
     */
    pub fn is_running(&self) -> bool {
        match self.load() {
            Ok(Some(state)) => state.running,
            Ok(None) => false,
            Err(e) => {
                self.log.warn(format!("Ignoring service state: {}", e));
                false
            }
        }
    }

    pub fn load(&self) -> Result<Option<PersistedState>, String> {
        if !self.path.exists() {
            return Ok(None);
        }

        let json_str = fs::read_to_string(&self.path)
            .map_err(|e| format!("Failed to read service state: {}", e))?;

        let state = serde_json::from_str(&json_str)
            .map_err(|e| format!("Failed to parse service state: {}", e))?;

        Ok(Some(state))
    }

    fn write(&self, running: bool) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create state directory: {}", e))?;
        }

        let state = PersistedState {
            running,
            updated_at: Utc::now(),
        };
        let json_str = serde_json::to_string_pretty(&state)
            .map_err(|e| format!("Failed to serialize service state: {}", e))?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json_str)
            .map_err(|e| format!("Failed to write temporary state file: {}", e))?;

        fs::rename(&temp_path, &self.path)
            .map_err(|e| format!("Failed to replace state file: {}", e))?;

        Ok(())
    }
}
