/**
 * ============================================================================
 * TRACKING ERRORS MODULE
 * ============================================================================
 *
 * PURPOSE: Error taxonomy for commands and background transmissions
 *
 * PROPAGATION:
 * - TrackingError: surfaced synchronously to the command that triggered it
 * - TransportError: terminal for one transmission attempt, logged only
 *
 * ============================================================================
 */

use std::fmt;

/**
 * Errors returned by the command surface
 * Each variant maps to a stable error code for the host bridge
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingError {
    /// Missing or invalid endpoint or malformed start arguments
    InvalidConfig { message: String },

    /// Location permission not granted
    PermissionDenied,

    /// Neither a fresh nor a last known location was available
    NoLocation,

    /// The location source failed or the request was cancelled
    Location { message: String },
}

impl TrackingError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        TrackingError::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn location(message: impl Into<String>) -> Self {
        TrackingError::Location {
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TrackingError::InvalidConfig { .. } => "INVALID_CONFIG",
            TrackingError::PermissionDenied => "PERMISSION_DENIED",
            TrackingError::NoLocation => "NO_LOCATION",
            TrackingError::Location { .. } => "LOCATION_ERROR",
        }
    }
}

impl fmt::Display for TrackingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingError::InvalidConfig { message } => {
                write!(f, "Tracking config is invalid: {}", message)
            }
            TrackingError::PermissionDenied => write!(f, "Location permission not granted"),
            TrackingError::NoLocation => write!(f, "Unable to retrieve current location"),
            TrackingError::Location { message } => write!(f, "Location error: {}", message),
        }
    }
}

impl std::error::Error for TrackingError {}

/**
 * Failures while building or sending a transmission
 * Never propagated beyond the worker
 */
#[derive(Debug)]
pub enum TransportError {
    /// Body could not be serialized to JSON
    Serialization(serde_json::Error),

    /// DNS, connect, timeout, invalid URL or header, connection reset
    Request(reqwest::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Serialization(e) => write!(f, "Failed to serialize body: {}", e),
            TransportError::Request(e) => {
                if e.is_timeout() {
                    write!(f, "Request timed out: {}", e)
                } else if e.is_connect() {
                    write!(f, "Connection failed: {}", e)
                } else if e.is_builder() {
                    write!(f, "Invalid request: {}", e)
                } else {
                    write!(f, "Request failed: {}", e)
                }
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Serialization(e) => Some(e),
            TransportError::Request(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Serialization(e)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Request(e)
    }
}
