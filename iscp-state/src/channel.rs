//! Logical channels exposed for a receiver

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StateError;
use crate::inputs::{InputChoice, InputLabelRegistry};

/// Identifier of a receiver channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelId {
    Power,
    Volume,
    Mute,
    Input,
    Connectivity,
}

impl ChannelId {
    pub const ALL: [ChannelId; 5] = [
        ChannelId::Power,
        ChannelId::Volume,
        ChannelId::Mute,
        ChannelId::Input,
        ChannelId::Connectivity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelId::Power => "power",
            ChannelId::Volume => "volume",
            ChannelId::Mute => "mute",
            ChannelId::Input => "input",
            ChannelId::Connectivity => "connectivity",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelId {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChannelId::ALL
            .into_iter()
            .find(|id| id.as_str() == s.trim())
            .ok_or_else(|| StateError::UnknownChannel(s.to_string()))
    }
}

/// Whether the receiver is currently answering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectivityStatus {
    Connected,
    #[default]
    Disconnected,
}

impl ConnectivityStatus {
    pub fn from_connected(connected: bool) -> Self {
        if connected {
            ConnectivityStatus::Connected
        } else {
            ConnectivityStatus::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectivityStatus::Connected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectivityStatus::Connected => "Connected",
            ConnectivityStatus::Disconnected => "Disconnected",
        }
    }
}

/// Normalized channel value
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Connectivity(ConnectivityStatus),
}

impl ChannelValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ChannelValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ChannelValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ChannelValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// JSON form handed to collaborators
    pub fn to_json(&self) -> Value {
        match self {
            ChannelValue::Bool(b) => Value::Bool(*b),
            ChannelValue::Number(n) => {
                serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number)
            }
            ChannelValue::Text(s) => Value::String(s.clone()),
            ChannelValue::Connectivity(status) => Value::String(status.as_str().to_string()),
        }
    }
}

/// A parsed change for one channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelUpdate {
    pub channel: ChannelId,
    pub value: ChannelValue,
}

impl ChannelUpdate {
    pub fn new(channel: ChannelId, value: ChannelValue) -> Self {
        Self { channel, value }
    }
}

/// Channel-state event as delivered to collaborators
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStateEvent {
    pub device_id: String,
    pub channel: ChannelId,
    pub value: ChannelValue,
    pub ts_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Float,
    String,
    Enum,
}

/// Static description of a channel in the device snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: ChannelId,
    pub name: &'static str,
    pub data_type: DataType,
    pub writable: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub choices: Vec<InputChoice>,
    pub enum_values: Vec<&'static str>,
}

impl Channel {
    fn basic(id: ChannelId, name: &'static str, data_type: DataType) -> Self {
        Self {
            id,
            name,
            data_type,
            writable: true,
            min: None,
            max: None,
            step: None,
            choices: Vec::new(),
            enum_values: Vec::new(),
        }
    }

    pub fn power() -> Self {
        Self::basic(ChannelId::Power, "Power", DataType::Bool)
    }

    pub fn volume() -> Self {
        Self {
            min: Some(0.0),
            max: Some(100.0),
            step: Some(1.0),
            ..Self::basic(ChannelId::Volume, "Volume", DataType::Float)
        }
    }

    pub fn mute() -> Self {
        Self::basic(ChannelId::Mute, "Mute", DataType::Bool)
    }

    pub fn input(registry: &InputLabelRegistry) -> Self {
        Self {
            choices: registry.choices(),
            ..Self::basic(ChannelId::Input, "Input", DataType::String)
        }
    }

    pub fn connectivity() -> Self {
        Self {
            writable: false,
            enum_values: vec![
                ConnectivityStatus::Connected.as_str(),
                ConnectivityStatus::Disconnected.as_str(),
            ],
            ..Self::basic(ChannelId::Connectivity, "Connectivity", DataType::Enum)
        }
    }
}

/// Full channel list for a receiver, in presentation order
pub fn channel_catalog(registry: &InputLabelRegistry) -> Vec<Channel> {
    vec![
        Channel::power(),
        Channel::volume(),
        Channel::mute(),
        Channel::input(registry),
        Channel::connectivity(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("power", ChannelId::Power)]
    #[case("volume", ChannelId::Volume)]
    #[case(" mute ", ChannelId::Mute)]
    #[case("input", ChannelId::Input)]
    #[case("connectivity", ChannelId::Connectivity)]
    fn test_channel_id_parse(#[case] raw: &str, #[case] expected: ChannelId) {
        assert_eq!(raw.parse::<ChannelId>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_channel_id() {
        let err = "bass".parse::<ChannelId>().unwrap_err();
        assert_eq!(err, StateError::UnknownChannel("bass".to_string()));
    }

    #[test]
    fn test_value_to_json() {
        assert_eq!(ChannelValue::Bool(true).to_json(), json!(true));
        assert_eq!(ChannelValue::Number(31.5).to_json(), json!(31.5));
        assert_eq!(ChannelValue::Text("23".into()).to_json(), json!("23"));
        assert_eq!(
            ChannelValue::Connectivity(ConnectivityStatus::Connected).to_json(),
            json!("Connected")
        );
        assert_eq!(ChannelValue::Number(f64::NAN).to_json(), Value::Null);
    }

    #[test]
    fn test_catalog_shape() {
        let catalog = channel_catalog(&InputLabelRegistry::default());
        let ids: Vec<_> = catalog.iter().map(|c| c.id).collect();
        assert_eq!(ids, ChannelId::ALL.to_vec());

        let connectivity = &catalog[4];
        assert!(!connectivity.writable);
        assert_eq!(connectivity.enum_values, vec!["Connected", "Disconnected"]);

        let volume = &catalog[1];
        assert_eq!((volume.min, volume.max, volume.step), (Some(0.0), Some(100.0), Some(1.0)));

        assert!(!catalog[3].choices.is_empty());
    }
}
