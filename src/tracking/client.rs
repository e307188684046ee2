/**
 * ============================================================================
 * HTTP TRANSMITTER MODULE
 * ============================================================================
 *
 * PURPOSE: Build and send one HTTP request per eligible location sample
 *
 * FLOW:
 * 1. Build placeholder map from the sample
 * 2. Substitute the endpoint template
 * 3. Copy configured headers, force JSON content type for non-GET
 * 4. Resolve body (dynamic or legacy), GET carries none
 * 5. Send with fixed connect/read timeouts, log the outcome
 *
 * No retries. Failures end the attempt and are reported to the caller
 * for logging only.
 *
 * ============================================================================
 */

use crate::tracking::config::TransmissionConfig;
use crate::tracking::error::TransportError;
use crate::tracking::logger::PluginLog;
use crate::tracking::template::{self, BodyMode};
use crate::tracking::types::{HttpMethod, LocationSample};
use serde_json::{Map, Value};
use std::time::Duration;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

const CONTENT_TYPE: &str = "Content-Type";
const JSON_CONTENT_TYPE: &str = "application/json";
const UNREADABLE_BODY: &str = "<unreadable response body>";

/**
 * Fully resolved request, ready to send
 */
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub url_had_placeholders: bool,
    pub headers: Vec<(String, String)>,
    pub body: Option<Map<String, Value>>,
    pub body_mode: Option<BodyMode>,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/**
 * Result of a request that reached the server
 */
#[derive(Debug, Clone, PartialEq)]
pub struct TransmissionOutcome {
    pub status: u16,
    pub success: bool,
    pub response_body: String,
}

/**
 * Resolve URL, headers and body for one sample without doing any I/O
 */
pub fn prepare(config: &TransmissionConfig, sample: &LocationSample) -> PreparedRequest {
    let values = sample.placeholder_map();

    let url = template::substitute(&config.endpoint_template, &values);
    let url_had_placeholders = url != config.endpoint_template;

    let mut headers: Vec<(String, String)> = config
        .headers
        .iter()
        .flatten()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let (body, body_mode) = if config.method.has_body() {
        headers.retain(|(k, _)| !k.eq_ignore_ascii_case(CONTENT_TYPE));
        headers.push((CONTENT_TYPE.to_string(), JSON_CONTENT_TYPE.to_string()));

        let (body, mode) = template::resolve_body(
            config.body_template.as_ref(),
            &sample.to_field_map(),
            &values,
            url_had_placeholders,
        );
        (Some(body), Some(mode))
    } else {
        (None, None)
    };

    PreparedRequest {
        method: config.method,
        url,
        url_had_placeholders,
        headers,
        body,
        body_mode,
    }
}

/**
 * Shared HTTP client for transmissions
 * One instance per tracking manager, reused across requests
 */
#[derive(Debug, Clone)]
pub struct HttpTransmitter {
    client: reqwest::Client,
    log: PluginLog,
}

impl HttpTransmitter {
    pub fn new(log: PluginLog) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client, log })
    }

    /**
     * Send one sample using the given configuration
     *
     * Ok covers every response that came back from the server, including
     * non-2xx statuses. Err is only returned for transport failures.
     */
    pub async fn transmit(
        &self,
        config: &TransmissionConfig,
        sample: &LocationSample,
    ) -> Result<TransmissionOutcome, TransportError> {
        let prepared = prepare(config, sample);
        self.send(&prepared).await
    }

    pub async fn send(&self, prepared: &PreparedRequest) -> Result<TransmissionOutcome, TransportError> {
        let body_json = match &prepared.body {
            Some(body) => Some(serde_json::to_string(body)?),
            None => None,
        };

        self.log.http(format!("Method: {}", prepared.method));
        self.log.http(format!("URL: {}", prepared.url));
        self.log.http(format!("Headers: {:?}", prepared.headers));
        match (&body_json, prepared.body_mode) {
            (Some(json), Some(mode)) => {
                self.log.http(format!("Body ({:?}): {}", mode, json));
            }
            _ => self.log.http("Body: <none>"),
        }

        let mut request = self
            .client
            .request(prepared.method.into(), prepared.url.as_str());

        for (name, value) in &prepared.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if let Some(json) = body_json {
            request = request.body(json);
        }

        let response = request.send().await?;
        let status = response.status();
        let response_body = response
            .text()
            .await
            .unwrap_or_else(|_| UNREADABLE_BODY.to_string());

        let outcome = TransmissionOutcome {
            status: status.as_u16(),
            success: status.is_success(),
            response_body,
        };

        if outcome.success {
            self.log.http(format!("Response code: {}", outcome.status));
            self.log.http(format!("Response: {}", outcome.response_body));
        } else {
            self.log.warn(format!(
                "[HTTP] {} {} failed with status {}: {}",
                prepared.method, prepared.url, outcome.status, outcome.response_body
            ));
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn sample() -> LocationSample {
        LocationSample::new(1.5, 2.5, 0.0, 5.0, 1_700_000_000_000)
    }

    fn config(url: &str) -> TransmissionConfig {
        TransmissionConfig {
            endpoint_template: url.to_string(),
            ..TransmissionConfig::default()
        }
    }

    #[test]
    fn test_prepare_substitutes_url() {
        let prepared = prepare(&config("https://x/%latitude%/%longitude%"), &sample());
        assert_eq!(prepared.url, "https://x/1.5/2.5");
        assert!(prepared.url_had_placeholders);
        assert_eq!(prepared.body, Some(Map::new()));
        assert_eq!(prepared.body_mode, Some(BodyMode::LegacyEmpty));
    }

    #[test]
    fn test_prepare_raw_field_map_without_placeholders() {
        let prepared = prepare(&config("https://x/ingest"), &sample());
        assert!(!prepared.url_had_placeholders);
        assert_eq!(prepared.body, Some(sample().to_field_map()));
        assert_eq!(prepared.header("content-type"), Some("application/json"));
    }

    #[test]
    fn test_prepare_content_type_overrides_user_value() {
        let mut cfg = config("https://x/ingest");
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "text/plain".to_string());
        headers.insert("Authorization".to_string(), "Bearer t".to_string());
        cfg.headers = Some(headers);

        let prepared = prepare(&cfg, &sample());
        let content_types: Vec<_> = prepared
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .collect();
        assert_eq!(content_types.len(), 1);
        assert_eq!(content_types[0].1, "application/json");
        assert_eq!(prepared.header("Authorization"), Some("Bearer t"));
    }

    #[test]
    fn test_prepare_get_has_no_body() {
        let mut cfg = config("https://x/%latitude%");
        cfg.method = HttpMethod::Get;
        cfg.body_template = Some(Map::from_iter([("a".to_string(), json!("%speed%"))]));
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "text/plain".to_string());
        cfg.headers = Some(headers);

        let prepared = prepare(&cfg, &sample());
        assert_eq!(prepared.body, None);
        assert_eq!(prepared.body_mode, None);
        assert_eq!(prepared.header("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn test_prepare_dynamic_body() {
        let mut cfg = config("https://x/ingest");
        cfg.method = HttpMethod::Patch;
        cfg.body_template = Some(Map::from_iter([(
            "msg".to_string(),
            json!("at %latitude%,%longitude%"),
        )]));

        let prepared = prepare(&cfg, &sample());
        assert_eq!(prepared.body_mode, Some(BodyMode::Dynamic));
        assert_eq!(
            Value::Object(prepared.body.unwrap()),
            json!({ "msg": "at 1.5,2.5" })
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_error() {
        let transmitter = HttpTransmitter::new(PluginLog::default()).unwrap();
        // Port 9 on localhost is not expected to accept connections
        let result = transmitter
            .transmit(&config("http://127.0.0.1:9/ingest"), &sample())
            .await;
        assert!(matches!(result, Err(TransportError::Request(_))));
    }

    #[tokio::test]
    async fn test_invalid_url_is_error() {
        let transmitter = HttpTransmitter::new(PluginLog::default()).unwrap();
        let result = transmitter.transmit(&config("not a url"), &sample()).await;
        assert!(result.is_err());
    }
}
