/**
 * ============================================================================
 * TRACKING TYPES MODULE
 * ============================================================================
 *
 * PURPOSE: Define the data structures shared across the tracking pipeline
 *
 * TYPES DEFINED:
 * - LocationSample: One immutable position fix from the location source
 * - HttpMethod: Supported request methods for transmission
 * - TrackingState: Lifecycle state of the tracking session
 *
 * ============================================================================
 */

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Field names exposed to templates, listeners and legacy bodies
pub const FIELD_NAMES: [&str; 5] = ["latitude", "longitude", "speed", "accuracy", "timestamp"];

/**
 * A single location fix
 * Created per sensor callback and never persisted
 */
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub accuracy: f64,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64, speed: f64, accuracy: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            speed,
            accuracy,
            timestamp_ms,
        }
    }

    /**
     * JSON object view of the sample
     * Used for listener events, one-shot results and legacy request bodies
     */
    pub fn to_field_map(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("latitude".to_string(), Value::from(self.latitude));
        fields.insert("longitude".to_string(), Value::from(self.longitude));
        fields.insert("speed".to_string(), Value::from(self.speed));
        fields.insert("accuracy".to_string(), Value::from(self.accuracy));
        fields.insert("timestamp".to_string(), Value::from(self.timestamp_ms));
        fields
    }

    /**
     * String representation of every field, keyed by field name
     * Scoped to a single transmission
     */
    pub fn placeholder_map(&self) -> HashMap<String, String> {
        HashMap::from([
            ("latitude".to_string(), self.latitude.to_string()),
            ("longitude".to_string(), self.longitude.to_string()),
            ("speed".to_string(), self.speed.to_string()),
            ("accuracy".to_string(), self.accuracy.to_string()),
            ("timestamp".to_string(), self.timestamp_ms.to_string()),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
}

impl HttpMethod {
    /**
     * Parse a method name, ignoring case
     * Returns None for anything outside GET/POST/PUT/PATCH
     */
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
        }
    }

    pub fn has_body(&self) -> bool {
        !matches!(self, HttpMethod::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

/**
 * Lifecycle of a tracking session
 * Stopped -> Starting -> Tracking -> Stopped, no paused state
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type")]
pub enum TrackingState {
    #[default]
    Stopped,
    Starting,
    Tracking,
}

impl TrackingState {
    pub fn is_running(&self) -> bool {
        matches!(self, TrackingState::Tracking)
    }
}
