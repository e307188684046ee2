/**
 * ============================================================================
 * METHOD BRIDGE MODULE
 * ============================================================================
 *
 * PURPOSE: Route host method calls (name + JSON args) to the tracking manager
 *
 * METHODS:
 * - checkPermission, isLocationEnabled, isTrackingRunning -> bool
 * - startTracking(url, headers?, body?, method?, interval?, debug?) -> true
 * - stopTracking -> true
 * - getCurrentLocation -> field map
 *
 * Errors carry a stable code and a human-readable message.
 *
 * ============================================================================
 */

use crate::tracking::error::TrackingError;
use crate::tracking::manager::TrackingManager;
use crate::tracking::source::LocationSource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const NOT_IMPLEMENTED: &str = "NOT_IMPLEMENTED";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodError {
    pub code: String,
    pub message: String,
}

impl MethodError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for MethodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for MethodError {}

impl From<TrackingError> for MethodError {
    fn from(e: TrackingError) -> Self {
        MethodError::new(e.code(), e.to_string())
    }
}

/**
 * Dispatch one host call
 * Unknown method names yield NOT_IMPLEMENTED
 */
pub async fn handle_method_call<S: LocationSource>(
    manager: &TrackingManager<S>,
    method: &str,
    args: &Value,
) -> Result<Value, MethodError> {
    match method {
        "checkPermission" => Ok(Value::Bool(manager.check_permission())),
        "isLocationEnabled" => Ok(Value::Bool(manager.is_location_enabled())),
        "isTrackingRunning" => Ok(Value::Bool(manager.is_tracking_running())),
        "startTracking" => {
            manager.start_tracking(args)?;
            Ok(Value::Bool(true))
        }
        "stopTracking" => {
            manager.stop_tracking();
            Ok(Value::Bool(true))
        }
        "getCurrentLocation" => {
            let sample = manager.get_current_location().await?;
            Ok(Value::Object(sample.to_field_map()))
        }
        other => {
            log::warn!("[ACTION] Unknown method: {}", other);
            Err(MethodError::new(
                NOT_IMPLEMENTED,
                format!("Method {} is not implemented", other),
            ))
        }
    }
}
