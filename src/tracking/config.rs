/**
 * ============================================================================
 * TRACKING CONFIGURATION MODULE
 * ============================================================================
 *
 * PURPOSE: Transmission configuration schema, parsing, validation and store
 *
 * LIFECYCLE:
 * - Created by the start tracking command from raw JSON arguments
 * - Lives for the duration of active tracking (memory only)
 * - Cleared on stop tracking or service termination
 * - Replacing it while tracking is last write wins, never merged
 *
 * ============================================================================
 */

use crate::tracking::logger::PluginLog;
use crate::tracking::types::HttpMethod;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Default minimum interval between transmissions
pub const DEFAULT_INTERVAL_MS: u64 = 10_000;

/**
 * Complete transmission configuration
 * All request construction is driven by these settings
 */
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransmissionConfig {
    // Endpoint URL, may contain %field% placeholders
    pub endpoint_template: String,

    // Request method
    pub method: HttpMethod,

    // Static headers, sent as-is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,

    // User payload, dynamic or legacy mode depending on placeholders
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_template: Option<Map<String, Value>>,

    // Minimum interval between transmissions in milliseconds
    pub min_interval_ms: u64,

    // Emit informational plugin logs
    pub debug_logging: bool,
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            endpoint_template: String::new(),
            method: HttpMethod::Post,
            headers: None,
            body_template: None,
            min_interval_ms: DEFAULT_INTERVAL_MS,
            debug_logging: true,
        }
    }
}

impl TransmissionConfig {
    /**
     * Parse start tracking arguments
     * Keys: url, headers, body, method, interval, debug
     * Missing or null keys fall back to defaults, wrong types are rejected
     */
    pub fn from_raw(raw: &Value) -> Result<Self, String> {
        let args = match raw {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::default()),
            _ => return Err("arguments must be an object".to_string()),
        };

        let mut config = Self::default();

        match field(args, "url") {
            None => {}
            Some(Value::String(url)) => config.endpoint_template = url.clone(),
            Some(_) => return Err("url must be a string".to_string()),
        }

        match field(args, "headers") {
            None => {}
            Some(Value::Object(map)) => {
                let headers = map
                    .iter()
                    .map(|(k, v)| (k.clone(), header_value(v)))
                    .collect();
                config.headers = Some(headers);
            }
            Some(_) => return Err("headers must be an object".to_string()),
        }

        match field(args, "body") {
            None => {}
            Some(Value::Object(map)) => config.body_template = Some(map.clone()),
            Some(_) => return Err("body must be an object".to_string()),
        }

        match field(args, "method") {
            None => {}
            Some(Value::String(name)) => {
                config.method = HttpMethod::parse(name)
                    .ok_or_else(|| format!("unsupported method: {}", name))?;
            }
            Some(_) => return Err("method must be a string".to_string()),
        }

        match field(args, "interval") {
            None => {}
            Some(Value::Number(n)) => {
                config.min_interval_ms = n
                    .as_u64()
                    .ok_or_else(|| format!("interval must be a non-negative integer, got {}", n))?;
            }
            Some(_) => return Err("interval must be a number".to_string()),
        }

        match field(args, "debug") {
            None => {}
            Some(Value::Bool(debug)) => config.debug_logging = *debug,
            Some(_) => return Err("debug must be a boolean".to_string()),
        }

        Ok(config)
    }

    /**
     * Load start tracking arguments from a JSON file
     * Used by the replay binary
     */
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let json_str = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let raw: Value = serde_json::from_str(&json_str)
            .map_err(|e| format!("Failed to parse config JSON: {}", e))?;

        Self::from_raw(&raw)
    }

    /**
     * Only the endpoint is required
     * Headers and body are optional so legacy body-merge mode keeps working
     */
    pub fn is_valid(&self) -> bool {
        !self.endpoint_template.trim().is_empty()
    }

    /**
     * Validate configuration values
     * Returns Ok(()) if valid, Err(String) with validation message if invalid
     */
    pub fn validate(&self) -> Result<(), String> {
        if !self.is_valid() {
            return Err("url is required".to_string());
        }
        Ok(())
    }
}

fn field<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    args.get(key).filter(|v| !v.is_null())
}

fn header_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/**
 * A configuration together with the generation it was stored under
 * Dispatches carry this so transmissions can be attributed to their config
 *
 * `session` stays the same across replacements and changes only after
 * the store has been cleared.
 */
#[derive(Debug, PartialEq)]
pub struct ActiveConfig {
    pub generation: u64,
    pub session: u64,
    pub config: TransmissionConfig,
}

/**
 * Holder of the single live configuration
 * Swapped whole, readers get an immutable snapshot
 */
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Option<Arc<ActiveConfig>>>,
    generation: AtomicU64,
    sessions: AtomicU64,
    log: PluginLog,
}

impl ConfigStore {
    pub fn new(log: PluginLog) -> Self {
        Self {
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
            sessions: AtomicU64::new(0),
            log,
        }
    }

    /**
     * Parse, validate and store raw arguments
     * Nothing is stored when parsing or validation fails
     */
    pub fn configure(&self, raw: &Value) -> Result<Arc<ActiveConfig>, String> {
        let config = TransmissionConfig::from_raw(raw)?;
        config.validate()?;
        Ok(self.replace(config))
    }

    /**
     * Store a new configuration, replacing any previous one
     */
    pub fn replace(&self, config: TransmissionConfig) -> Arc<ActiveConfig> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.set_enabled(config.debug_logging);

        let mut current = self.current.write().unwrap();
        let session = match current.as_ref() {
            Some(previous) => previous.session,
            None => self.sessions.fetch_add(1, Ordering::SeqCst) + 1,
        };

        let active = Arc::new(ActiveConfig {
            generation,
            session,
            config,
        });
        let previous = current.replace(Arc::clone(&active));
        drop(current);

        if previous.is_some() {
            self.log.service(format!(
                "Replaced active configuration (generation {}, last write wins)",
                generation
            ));
        } else {
            self.log.service(format!(
                "Configuration stored (generation {}, session {})",
                generation, session
            ));
        }
        active
    }

    /**
     * True while the session that produced `session` is still live
     * False once the store was cleared, even if a new session started since
     */
    pub fn is_current_session(&self, session: u64) -> bool {
        self.current
            .read()
            .unwrap()
            .as_ref()
            .map(|active| active.session == session)
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> Option<Arc<ActiveConfig>> {
        self.current.read().unwrap().clone()
    }

    pub fn is_valid(&self) -> bool {
        self.snapshot()
            .map(|active| active.config.is_valid())
            .unwrap_or(false)
    }

    /**
     * Reset to defaults
     * Called when tracking stops or the service is terminated
     */
    pub fn clear(&self) {
        let previous = self.current.write().unwrap().take();
        self.log.set_enabled(true);
        if let Some(active) = previous {
            self.log.service(format!(
                "Configuration cleared (generation {})",
                active.generation
            ));
        }
    }
}

/**
 * Ambient plugin settings
 * Independent of the per-session TransmissionConfig
 */
#[derive(Debug, Clone)]
pub struct PluginOptions {
    // Directory holding service_state.json
    pub data_dir: PathBuf,

    // Buffered events per listener before new ones are dropped
    pub listener_capacity: usize,

    // How long a one-shot request waits for the next sample
    pub one_shot_timeout: Duration,
}

impl Default for PluginOptions {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("background_location_transmitter");

        Self {
            data_dir,
            listener_capacity: 64,
            one_shot_timeout: Duration::from_secs(30),
        }
    }
}

impl PluginOptions {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_applied() {
        let config = TransmissionConfig::from_raw(&json!({ "url": "https://x/ingest" })).unwrap();
        assert_eq!(config.endpoint_template, "https://x/ingest");
        assert_eq!(config.method, HttpMethod::Post);
        assert_eq!(config.min_interval_ms, 10_000);
        assert!(config.debug_logging);
        assert!(config.headers.is_none());
        assert!(config.body_template.is_none());
        assert!(config.is_valid());
    }

    #[test]
    fn test_full_arguments_parsed() {
        let raw = json!({
            "url": "https://x/%latitude%",
            "headers": { "Authorization": "Bearer abc", "X-Retry": 3 },
            "body": { "device": "abc" },
            "method": "put",
            "interval": 2500,
            "debug": false
        });
        let config = TransmissionConfig::from_raw(&raw).unwrap();
        let headers = config.headers.as_ref().unwrap();
        assert_eq!(headers["Authorization"], "Bearer abc");
        assert_eq!(headers["X-Retry"], "3");
        assert_eq!(config.body_template.as_ref().unwrap()["device"], json!("abc"));
        assert_eq!(config.method, HttpMethod::Put);
        assert_eq!(config.min_interval_ms, 2500);
        assert!(!config.debug_logging);
    }

    #[test]
    fn test_null_fields_use_defaults() {
        let raw = json!({ "url": "https://x", "headers": null, "method": null, "interval": null });
        let config = TransmissionConfig::from_raw(&raw).unwrap();
        assert!(config.headers.is_none());
        assert_eq!(config.method, HttpMethod::Post);
        assert_eq!(config.min_interval_ms, DEFAULT_INTERVAL_MS);
    }

    #[test]
    fn test_malformed_arguments_rejected() {
        assert!(TransmissionConfig::from_raw(&json!({ "url": 5 })).is_err());
        assert!(TransmissionConfig::from_raw(&json!({ "url": "u", "method": "DELETE" })).is_err());
        assert!(TransmissionConfig::from_raw(&json!({ "url": "u", "interval": -1 })).is_err());
        assert!(TransmissionConfig::from_raw(&json!({ "url": "u", "interval": 1.5 })).is_err());
        assert!(TransmissionConfig::from_raw(&json!({ "url": "u", "headers": ["a"] })).is_err());
        assert!(TransmissionConfig::from_raw(&json!({ "url": "u", "body": "text" })).is_err());
        assert!(TransmissionConfig::from_raw(&json!(["u"])).is_err());
    }

    #[test]
    fn test_validation_requires_only_url() {
        let mut config = TransmissionConfig::default();
        assert!(!config.is_valid());
        assert!(config.validate().is_err());

        config.endpoint_template = "   ".to_string();
        assert!(!config.is_valid());

        config.endpoint_template = "https://x".to_string();
        assert!(config.is_valid());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_store_configure_rejects_invalid() {
        let store = ConfigStore::new(PluginLog::default());
        assert!(store.configure(&json!({ "url": "" })).is_err());
        assert!(store.snapshot().is_none());
        assert!(!store.is_valid());
    }

    #[test]
    fn test_store_replace_bumps_generation() {
        let log = PluginLog::default();
        let store = ConfigStore::new(log.clone());

        let first = store.configure(&json!({ "url": "https://a" })).unwrap();
        let second = store
            .configure(&json!({ "url": "https://b", "debug": false }))
            .unwrap();

        assert!(second.generation > first.generation);
        let current = store.snapshot().unwrap();
        assert_eq!(current.config.endpoint_template, "https://b");
        assert!(!log.is_enabled());

        // Old snapshot is untouched by the swap
        assert_eq!(first.config.endpoint_template, "https://a");
    }

    #[test]
    fn test_session_survives_replace_but_not_clear() {
        let store = ConfigStore::new(PluginLog::default());
        let first = store.replace(TransmissionConfig::default());
        let swapped = store.replace(TransmissionConfig::default());
        assert_eq!(first.session, swapped.session);
        assert!(store.is_current_session(first.session));

        store.clear();
        assert!(!store.is_current_session(first.session));

        let restarted = store.replace(TransmissionConfig::default());
        assert_ne!(restarted.session, first.session);
        assert!(!store.is_current_session(first.session));
        assert!(store.is_current_session(restarted.session));
    }

    #[test]
    fn test_store_clear_resets() {
        let log = PluginLog::default();
        let store = ConfigStore::new(log.clone());
        store
            .configure(&json!({ "url": "https://a", "debug": false }))
            .unwrap();

        store.clear();
        assert!(store.snapshot().is_none());
        assert!(log.is_enabled());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracking.json");
        fs::write(&path, r#"{"url":"https://x/ingest","interval":0}"#).unwrap();

        let config = TransmissionConfig::from_file(&path).unwrap();
        assert_eq!(config.min_interval_ms, 0);

        assert!(TransmissionConfig::from_file(&dir.path().join("missing.json")).is_err());
    }
}
