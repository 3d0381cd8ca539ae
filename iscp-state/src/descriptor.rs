//! Device descriptor and the clamped settings derived from it
//!
//! The descriptor is owned by an external configuration store. The adapter
//! reads a snapshot on start and whenever the store reports a change, and
//! re-derives [`ReceiverSettings`] from it each time.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use iscp_codec::DEFAULT_PORT;

/// Meta key for the poll interval in milliseconds
pub const META_POLL_INTERVAL: &str = "pollIntervalMs";
/// Meta key for the reconnect interval in milliseconds
pub const META_RETRY_INTERVAL: &str = "retryIntervalMs";
/// Meta key for the raw value that maps to 100 % volume
pub const META_VOLUME_MAX_RAW: &str = "volumeMaxRaw";
/// Meta key for the allow-list of input codes
pub const META_ACTIVE_CODES: &str = "activeSliCodes";
/// Prefix of per-code label override keys, e.g. `inputLabel_23`
pub const META_LABEL_PREFIX: &str = "inputLabel_";

const DEFAULT_POLL_INTERVAL_MS: i64 = 5_000;
const DEFAULT_RETRY_INTERVAL_MS: i64 = 10_000;
const DEFAULT_VOLUME_MAX_RAW: i64 = 160;
const PRESENCE_GRACE_MS: u64 = 1_000;

/// Snapshot of the externally stored device configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// Adapter instance id assigned by the store
    pub id: String,
    /// User-facing name
    pub name: String,
    /// Hostname, typically from discovery
    pub host: String,
    /// IP address used for control connections
    pub ip: String,
    /// Control port; 0 means unset
    pub port: u16,
    /// Free-form metadata (intervals, input codes, labels, identity)
    pub meta: Map<String, Value>,
}

impl DeviceDescriptor {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Trimmed string meta value, empty if absent or not a string
    pub fn meta_str(&self, key: &str) -> String {
        self.meta
            .get(key)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    /// Boolean meta value; absent or non-boolean reads as false
    pub fn meta_bool(&self, key: &str) -> bool {
        self.meta.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Integer meta value, accepting numbers and numeric strings
    pub fn meta_int(&self, key: &str, default: i64) -> i64 {
        match self.meta.get(key) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Input codes declared active, or `None` if no list is declared
    ///
    /// Numeric entries are zero-padded to two characters.
    pub fn active_codes(&self) -> Option<BTreeSet<String>> {
        let entries = self.meta.get(META_ACTIVE_CODES)?.as_array()?;
        let codes = entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => n.as_i64().map(|v| format!("{:02}", v)),
                _ => None,
            })
            .filter(|code| !code.is_empty())
            .collect();
        Some(codes)
    }

    /// Per-code label overrides keyed by code; blank labels are kept blank
    pub fn label_overrides(&self) -> BTreeMap<String, String> {
        self.meta
            .iter()
            .filter_map(|(key, value)| {
                let code = key.strip_prefix(META_LABEL_PREFIX)?.trim();
                if code.is_empty() {
                    return None;
                }
                let label = value.as_str().unwrap_or_default().trim().to_string();
                Some((code.to_string(), label))
            })
            .collect()
    }

    /// Address used for control connections: the IP, else the hostname
    pub fn target_host(&self) -> Option<&str> {
        [self.ip.trim(), self.host.trim()]
            .into_iter()
            .find(|candidate| !candidate.is_empty())
    }
}

/// Settings derived from a descriptor, with every bound applied
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverSettings {
    pub host: Option<String>,
    pub port: u16,
    pub poll_interval: Duration,
    pub retry_interval: Duration,
    pub presence_timeout: Duration,
    pub volume_max_raw: u16,
}

impl ReceiverSettings {
    pub fn from_descriptor(descriptor: &DeviceDescriptor) -> Self {
        let port = if descriptor.port > 0 {
            descriptor.port
        } else {
            DEFAULT_PORT
        };
        let poll_ms = descriptor
            .meta_int(META_POLL_INTERVAL, DEFAULT_POLL_INTERVAL_MS)
            .clamp(500, 300_000) as u64;
        let retry_ms = descriptor
            .meta_int(META_RETRY_INTERVAL, DEFAULT_RETRY_INTERVAL_MS)
            .clamp(1_000, 300_000) as u64;
        let volume_max_raw = descriptor
            .meta_int(META_VOLUME_MAX_RAW, DEFAULT_VOLUME_MAX_RAW)
            .clamp(1, 500) as u16;

        Self {
            host: descriptor.target_host().map(str::to_string),
            port,
            poll_interval: Duration::from_millis(poll_ms),
            retry_interval: Duration::from_millis(retry_ms),
            presence_timeout: Duration::from_millis(poll_ms + PRESENCE_GRACE_MS),
            volume_max_raw,
        }
    }

    /// Host and port, if a host is configured
    pub fn endpoint(&self) -> Option<(&str, u16)> {
        match self.host.as_deref() {
            Some(host) if self.port != 0 => Some((host, self.port)),
            _ => None,
        }
    }
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        Self::from_descriptor(&DeviceDescriptor::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_defaults_for_empty_descriptor() {
        let settings = ReceiverSettings::default();

        assert_eq!(settings.host, None);
        assert_eq!(settings.port, 60128);
        assert_eq!(settings.poll_interval, Duration::from_millis(5_000));
        assert_eq!(settings.retry_interval, Duration::from_millis(10_000));
        assert_eq!(settings.presence_timeout, Duration::from_millis(6_000));
        assert_eq!(settings.volume_max_raw, 160);
        assert!(settings.endpoint().is_none());
    }

    #[rstest]
    #[case(json!(100), 500)]
    #[case(json!(2_000), 2_000)]
    #[case(json!(1_000_000), 300_000)]
    #[case(json!("750"), 750)]
    #[case(json!("soon"), 5_000)]
    fn test_poll_interval_clamping(#[case] value: Value, #[case] expected_ms: u64) {
        let descriptor = DeviceDescriptor::new("10.0.0.5").with_meta(META_POLL_INTERVAL, value);
        let settings = ReceiverSettings::from_descriptor(&descriptor);

        assert_eq!(settings.poll_interval, Duration::from_millis(expected_ms));
        assert_eq!(
            settings.presence_timeout,
            Duration::from_millis(expected_ms + 1_000)
        );
    }

    #[rstest]
    #[case(json!(10), 1_000)]
    #[case(json!(900_000), 300_000)]
    fn test_retry_interval_clamping(#[case] value: Value, #[case] expected_ms: u64) {
        let descriptor = DeviceDescriptor::new("10.0.0.5").with_meta(META_RETRY_INTERVAL, value);
        let settings = ReceiverSettings::from_descriptor(&descriptor);
        assert_eq!(settings.retry_interval, Duration::from_millis(expected_ms));
    }

    #[rstest]
    #[case(json!(0), 1)]
    #[case(json!(80), 80)]
    #[case(json!(9_999), 500)]
    fn test_volume_max_raw_clamping(#[case] value: Value, #[case] expected: u16) {
        let descriptor = DeviceDescriptor::new("10.0.0.5").with_meta(META_VOLUME_MAX_RAW, value);
        let settings = ReceiverSettings::from_descriptor(&descriptor);
        assert_eq!(settings.volume_max_raw, expected);
    }

    #[test]
    fn test_endpoint_prefers_ip_over_host() {
        let mut descriptor = DeviceDescriptor::new(" 192.168.1.20 ").with_port(60129);
        descriptor.host = "receiver.local".to_string();

        let settings = ReceiverSettings::from_descriptor(&descriptor);
        assert_eq!(settings.endpoint(), Some(("192.168.1.20", 60129)));

        descriptor.ip.clear();
        let settings = ReceiverSettings::from_descriptor(&descriptor);
        assert_eq!(settings.endpoint(), Some(("receiver.local", 60129)));
    }

    #[test]
    fn test_active_codes_normalizes_numbers() {
        let descriptor = DeviceDescriptor::new("10.0.0.5")
            .with_meta(META_ACTIVE_CODES, json!(["23", 1, " 2E ", "", null, 41]));

        let codes = descriptor.active_codes().unwrap();
        let codes: Vec<_> = codes.into_iter().collect();
        assert_eq!(codes, vec!["01", "23", "2E", "41"]);
    }

    #[test]
    fn test_active_codes_absent_or_not_an_array() {
        assert!(DeviceDescriptor::new("10.0.0.5").active_codes().is_none());

        let descriptor = DeviceDescriptor::new("10.0.0.5").with_meta(META_ACTIVE_CODES, "23");
        assert!(descriptor.active_codes().is_none());
    }

    #[test]
    fn test_label_overrides() {
        let descriptor = DeviceDescriptor::new("10.0.0.5")
            .with_meta("inputLabel_23", " Apple TV ")
            .with_meta("inputLabel_", "ignored")
            .with_meta("inputLabel_10", "")
            .with_meta("deviceName", "TX-NR686");

        let overrides = descriptor.label_overrides();
        assert_eq!(overrides.len(), 2);
        assert_eq!(overrides["23"], "Apple TV");
        assert_eq!(overrides["10"], "");
    }

    #[test]
    fn test_descriptor_deserializes_from_store_json() {
        let descriptor: DeviceDescriptor = serde_json::from_value(json!({
            "id": "adapter-1",
            "ip": "192.168.1.20",
            "meta": { "pollIntervalMs": 2000 }
        }))
        .unwrap();

        assert_eq!(descriptor.id, "adapter-1");
        assert_eq!(descriptor.port, 0);
        assert_eq!(descriptor.meta_int(META_POLL_INTERVAL, 0), 2000);
    }
}
