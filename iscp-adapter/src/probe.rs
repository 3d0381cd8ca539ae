//! Standalone reachability check for a receiver
//!
//! Used before an adapter is created (e.g. when a user enters an address)
//! and by the `probe` adapter action. It does not touch any adapter state,
//! but inside an adapter it shares the adapter's cancellation token.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use iscp_codec::{encode, Command, FrameDecoder, DEFAULT_PORT};
use iscp_state::DeviceDescriptor;

use crate::config::AdapterConfig;
use crate::dispatcher::{close_stream, open_stream, read_response, write_frame};
use crate::error::{DispatchError, ProbeError};
use crate::events::{ActionResponse, CmdId, CmdStatus};

/// Action id for the reachability probe
pub const PROBE_ACTION: &str = "probe";

/// Check that a receiver answers a power query
///
/// The host is taken from `host`, falling back to `ip`.
pub async fn probe_receiver(
    descriptor: &DeviceDescriptor,
    config: &AdapterConfig,
) -> Result<(), ProbeError> {
    probe_receiver_until(descriptor, config, &CancellationToken::new()).await
}

/// [`probe_receiver`] that gives up as soon as `cancel` fires
pub async fn probe_receiver_until(
    descriptor: &DeviceDescriptor,
    config: &AdapterConfig,
    cancel: &CancellationToken,
) -> Result<(), ProbeError> {
    let host = [descriptor.host.trim(), descriptor.ip.trim()]
        .into_iter()
        .find(|candidate| !candidate.is_empty())
        .ok_or(ProbeError::HostRequired)?;
    let port = if descriptor.port > 0 {
        descriptor.port
    } else {
        DEFAULT_PORT
    };

    let mut stream = open_stream(host, port, config, cancel)
        .await
        .map_err(probe_failure)?;

    let frame = encode(&Command::power_query(), config.framing, config.terminator);
    if let Err(e) = write_frame(&mut stream, &frame, config, cancel).await {
        close_stream(stream, config, cancel).await;
        return Err(probe_failure(e));
    }

    let data = read_response(&mut stream, config.probe_timeout, config, cancel).await;
    close_stream(stream, config, cancel).await;

    if cancel.is_cancelled() {
        return Err(ProbeError::Cancelled);
    }
    let data = data.map_err(|_| ProbeError::NoResponse)?;
    if data.is_empty() {
        return Err(ProbeError::NoResponse);
    }

    let mut decoder = FrameDecoder::new(config.framing);
    let mut payloads = decoder.push(&data);
    payloads.extend(decoder.finish());

    let text: String = payloads
        .iter()
        .map(|payload| String::from_utf8_lossy(payload).into_owned())
        .collect();
    if text.trim().is_empty() {
        return Err(ProbeError::EmptyResponse);
    }
    if !text.contains("PWR") {
        debug!(host, port, response = %text.trim(), "Probe got unexpected response");
        return Err(ProbeError::UnexpectedResponse);
    }

    info!(host, port, "Receiver answered probe");
    Ok(())
}

/// Probe outcome as an action result
pub async fn probe_action(
    descriptor: &DeviceDescriptor,
    config: &AdapterConfig,
    cancel: &CancellationToken,
    cmd_id: CmdId,
) -> ActionResponse {
    match probe_receiver_until(descriptor, config, cancel).await {
        Ok(()) => ActionResponse::success(PROBE_ACTION, cmd_id, serde_json::Value::Bool(true)),
        Err(ProbeError::HostRequired) => ActionResponse::failed(
            PROBE_ACTION,
            cmd_id,
            CmdStatus::InvalidArgument,
            ProbeError::HostRequired.to_string(),
        ),
        Err(e) => ActionResponse::failed(PROBE_ACTION, cmd_id, CmdStatus::Failure, e.to_string()),
    }
}

fn probe_failure(error: DispatchError) -> ProbeError {
    match error {
        DispatchError::Cancelled => ProbeError::Cancelled,
        DispatchError::ConnectFailed { source, .. } => {
            ProbeError::ConnectionFailed(source.to_string())
        }
        DispatchError::ConnectTimeout { .. } => {
            ProbeError::ConnectionFailed("timed out".to_string())
        }
        other => ProbeError::ConnectionFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_requires_host() {
        let result = probe_receiver(&DeviceDescriptor::default(), &AdapterConfig::fast()).await;
        assert_eq!(result, Err(ProbeError::HostRequired));
    }

    #[tokio::test]
    async fn test_probe_action_maps_missing_host() {
        let cancel = CancellationToken::new();
        let response =
            probe_action(&DeviceDescriptor::default(), &AdapterConfig::fast(), &cancel, 5).await;
        assert_eq!(response.status, CmdStatus::InvalidArgument);
        assert_eq!(response.error.as_deref(), Some("Host is required"));
        assert_eq!(response.action_id, PROBE_ACTION);
    }

    #[tokio::test]
    async fn test_cancelled_probe_returns_early() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let descriptor = DeviceDescriptor::new("127.0.0.1").with_port(9);

        let result = probe_receiver_until(&descriptor, &AdapterConfig::fast(), &cancel).await;
        assert_eq!(result, Err(ProbeError::Cancelled));
    }
}
