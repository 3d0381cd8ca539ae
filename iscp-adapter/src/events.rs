//! Messages exchanged with the hosting application
//!
//! Inbound: [`ChannelWrite`] requests and action invocations. Outbound: an
//! [`AdapterEvent`] stream delivered through an [`EventSink`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use iscp_state::{Channel, ChannelStateEvent, DeviceInfo};

/// Correlation id chosen by the caller
pub type CmdId = u64;

/// A request to change one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelWrite {
    pub device_id: String,
    pub channel_id: String,
    pub value: Value,
    pub cmd_id: CmdId,
}

impl ChannelWrite {
    pub fn new(
        device_id: impl Into<String>,
        channel_id: impl Into<String>,
        value: impl Into<Value>,
        cmd_id: CmdId,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            channel_id: channel_id.into(),
            value: value.into(),
            cmd_id,
        }
    }
}

/// Status reported for a write or action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmdStatus {
    Success,
    Failure,
    InvalidArgument,
    NotSupported,
    NotImplemented,
    TemporarilyOffline,
}

/// Result of a channel write
#[derive(Debug, Clone, PartialEq)]
pub struct CmdResponse {
    pub cmd_id: CmdId,
    pub status: CmdStatus,
    pub error: Option<String>,
    pub final_value: Option<Value>,
    pub ts_ms: u64,
}

impl CmdResponse {
    pub fn success(cmd_id: CmdId, final_value: Value) -> Self {
        Self {
            cmd_id,
            status: CmdStatus::Success,
            error: None,
            final_value: Some(final_value),
            ts_ms: epoch_ms(),
        }
    }

    pub fn failed(cmd_id: CmdId, status: CmdStatus, error: impl Into<String>) -> Self {
        Self {
            cmd_id,
            status,
            error: Some(error.into()),
            final_value: None,
            ts_ms: epoch_ms(),
        }
    }
}

/// Result of an adapter action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResponse {
    pub action_id: String,
    pub cmd_id: CmdId,
    pub status: CmdStatus,
    pub error: Option<String>,
    pub result: Option<Value>,
    pub ts_ms: u64,
}

impl ActionResponse {
    pub fn success(action_id: impl Into<String>, cmd_id: CmdId, result: Value) -> Self {
        Self {
            action_id: action_id.into(),
            cmd_id,
            status: CmdStatus::Success,
            error: None,
            result: Some(result),
            ts_ms: epoch_ms(),
        }
    }

    pub fn failed(
        action_id: impl Into<String>,
        cmd_id: CmdId,
        status: CmdStatus,
        error: impl Into<String>,
    ) -> Self {
        Self {
            action_id: action_id.into(),
            cmd_id,
            status,
            error: Some(error.into()),
            result: None,
            ts_ms: epoch_ms(),
        }
    }
}

/// Everything the adapter reports
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    /// Full device snapshot
    DeviceUpdated(DeviceInfo),
    /// A single channel description changed
    ChannelUpdated { device_id: String, channel: Channel },
    /// The snapshot above is complete
    FullSyncCompleted { device_id: String },
    /// A channel value changed
    ChannelState(ChannelStateEvent),
    /// Connectivity flipped
    ConnectionStateChanged(bool),
    CommandResult(CmdResponse),
    ActionResult(ActionResponse),
    /// Proposed additions to the stored device metadata
    MetaPatch {
        device_id: String,
        patch: Map<String, Value>,
    },
}

/// Destination for adapter events
pub trait EventSink: Send + 'static {
    fn emit(&self, event: AdapterEvent);
}

impl EventSink for mpsc::UnboundedSender<AdapterEvent> {
    fn emit(&self, event: AdapterEvent) {
        if self.send(event).is_err() {
            tracing::trace!("Event receiver dropped");
        }
    }
}

/// Wall-clock milliseconds since the Unix epoch
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
