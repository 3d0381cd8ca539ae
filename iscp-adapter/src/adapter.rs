//! Per-device adapter task and its handle
//!
//! Each receiver gets one tokio task that owns all of its state: the
//! connection state machine, the translator and label registry, and the
//! timers. Requests arrive over a channel and are handled one at a time, so
//! socket exchanges for a device never overlap and nothing needs a lock.
//!
//! ```text
//! AdapterHandle ──Request──▶ ReceiverWorker ──Command──▶ CommandDispatcher ──▶ receiver
//!                               │   ▲ timers                    │ payloads
//!                               ▼   │                           ▼
//!                           EventSink ◀── ChannelStateTranslator
//! ```

use std::time::Duration;

use bytes::Bytes;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, trace, warn, Instrument, Span};

use iscp_codec::Command;
use iscp_state::descriptor::{META_ACTIVE_CODES, META_LABEL_PREFIX};
use iscp_state::{
    generated_label, resolve_device_id, Channel, ChannelId, ChannelStateEvent,
    ChannelStateTranslator, ChannelUpdate, ChannelValue, ConnectivityStatus, DeviceDescriptor,
    DeviceInfo, InputLabelRegistry, ReceiverSettings, StateError,
};

use crate::config::AdapterConfig;
use crate::connection::{Clock, ConnectionManager};
use crate::dispatcher::CommandDispatcher;
use crate::error::{AdapterError, DispatchError, Result};
use crate::events::{
    epoch_ms, ActionResponse, AdapterEvent, ChannelWrite, CmdId, CmdResponse, CmdStatus,
    EventSink,
};
use crate::probe::{probe_action, PROBE_ACTION};
use crate::scheduler::PollScheduler;

/// Action id that asks the receiver for its current input
pub const PROBE_CURRENT_INPUT_ACTION: &str = "probeCurrentInput";

const UNKNOWN_DEVICE: &str = "Unknown device";
const CHANNEL_NOT_SUPPORTED: &str = "Channel not supported";
const RECEIVER_UNAVAILABLE: &str = "Receiver unavailable";
const ADDRESS_NOT_CONFIGURED: &str = "Receiver address not configured";
const ACTION_NOT_SUPPORTED: &str = "Adapter action not supported";
const NO_INPUT_REPORTED: &str = "No input reported";

/// Lifecycle phase of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterPhase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug)]
enum Request {
    Write(ChannelWrite),
    Action {
        action_id: String,
        params: Map<String, Value>,
        cmd_id: CmdId,
    },
    UpdateDescriptor(DeviceDescriptor),
    FullSync,
}

/// Entry point for creating receiver adapters
pub struct ReceiverAdapter;

impl ReceiverAdapter {
    pub fn builder(descriptor: DeviceDescriptor) -> AdapterBuilder {
        AdapterBuilder {
            descriptor,
            config: AdapterConfig::default(),
            span: None,
        }
    }
}

/// Configures and starts a [`ReceiverAdapter`]
pub struct AdapterBuilder {
    descriptor: DeviceDescriptor,
    config: AdapterConfig,
    span: Option<Span>,
}

impl AdapterBuilder {
    pub fn config(mut self, config: AdapterConfig) -> Self {
        self.config = config;
        self
    }

    /// Span the adapter task logs under
    ///
    /// Defaults to `iscp_adapter` with the resolved device id.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Spawn the adapter task; must be called within a tokio runtime
    pub fn start<S: EventSink>(self, sink: S) -> Result<AdapterHandle> {
        self.config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(AdapterPhase::Starting);
        let cancel = CancellationToken::new();

        let span = self.span.unwrap_or_else(|| {
            info_span!("iscp_adapter", device = %resolve_device_id(&self.descriptor))
        });
        let worker_cancel = cancel.clone();
        let descriptor = self.descriptor;
        let config = self.config;
        let task = tokio::spawn(
            async move {
                ReceiverWorker::new(descriptor, config, worker_cancel, sink, phase_tx)
                    .run(rx)
                    .await;
            }
            .instrument(span),
        );

        Ok(AdapterHandle {
            requests: tx,
            cancel,
            phase: phase_rx,
            task: Some(task),
        })
    }
}

/// Handle to a running adapter
///
/// Requests are queued and processed in order. Results arrive on the event
/// sink, correlated by `cmd_id`. Dropping the handle stops the adapter.
#[derive(Debug)]
pub struct AdapterHandle {
    requests: mpsc::UnboundedSender<Request>,
    cancel: CancellationToken,
    phase: watch::Receiver<AdapterPhase>,
    task: Option<JoinHandle<()>>,
}

impl AdapterHandle {
    /// Queue a channel write; the result is reported as `CommandResult`
    pub fn write_channel(&self, write: ChannelWrite) -> Result<()> {
        self.submit(Request::Write(write))
    }

    /// Queue an adapter action; the result is reported as `ActionResult`
    pub fn invoke_action(
        &self,
        action_id: impl Into<String>,
        params: Map<String, Value>,
        cmd_id: CmdId,
    ) -> Result<()> {
        self.submit(Request::Action {
            action_id: action_id.into(),
            params,
            cmd_id,
        })
    }

    /// Replace the device descriptor after the store changed it
    pub fn update_descriptor(&self, descriptor: DeviceDescriptor) -> Result<()> {
        self.submit(Request::UpdateDescriptor(descriptor))
    }

    pub fn request_full_sync(&self) -> Result<()> {
        self.submit(Request::FullSync)
    }

    pub fn phase(&self) -> AdapterPhase {
        *self.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<AdapterPhase> {
        self.phase.clone()
    }

    /// Stop the adapter and wait for its task to finish
    pub async fn stop(mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| AdapterError::TaskFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn submit(&self, request: Request) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AdapterError::Stopped);
        }
        self.requests
            .send(request)
            .map_err(|_| AdapterError::Stopped)
    }
}

impl Drop for AdapterHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct ReceiverWorker<S: EventSink> {
    descriptor: DeviceDescriptor,
    settings: ReceiverSettings,
    device_id: String,
    config: AdapterConfig,
    link: ConnectionManager,
    translator: ChannelStateTranslator,
    dispatcher: CommandDispatcher,
    scheduler: PollScheduler,
    clock: Clock,
    cancel: CancellationToken,
    sink: S,
    phase: watch::Sender<AdapterPhase>,
    synced: bool,
}

impl<S: EventSink> ReceiverWorker<S> {
    fn new(
        descriptor: DeviceDescriptor,
        config: AdapterConfig,
        cancel: CancellationToken,
        sink: S,
        phase: watch::Sender<AdapterPhase>,
    ) -> Self {
        let settings = ReceiverSettings::from_descriptor(&descriptor);
        let registry = InputLabelRegistry::from_descriptor(&descriptor);
        let clock = Clock::new();

        Self {
            device_id: resolve_device_id(&descriptor),
            link: ConnectionManager::new(&settings),
            translator: ChannelStateTranslator::new(&settings, registry),
            dispatcher: CommandDispatcher::new(config.clone(), cancel.clone(), clock),
            scheduler: PollScheduler::new(&settings, false, config.initial_refresh_delay),
            descriptor,
            settings,
            config,
            clock,
            cancel,
            sink,
            phase,
            synced: false,
        }
    }

    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        self.set_phase(AdapterPhase::Starting);
        info!(
            host = self.settings.host.as_deref().unwrap_or(""),
            port = self.settings.port,
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            presence_timeout_ms = self.settings.presence_timeout.as_millis() as u64,
            volume_max_raw = self.settings.volume_max_raw,
            "Starting receiver adapter"
        );
        if self.settings.endpoint().is_none() {
            warn!("Receiver address not configured; staying disconnected");
        }

        let presence_period = self.config.presence_check_interval;
        let mut presence = interval_at(Instant::now() + presence_period, presence_period);
        presence.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.emit_snapshot();
        self.set_phase(AdapterPhase::Running);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                request = requests.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => {
                        debug!("All adapter handles dropped");
                        break;
                    }
                },
                _ = presence.tick() => self.check_presence(),
                tick = self.scheduler.tick() => {
                    trace!(?tick, "Refresh due");
                    self.refresh().await;
                }
            }
        }

        self.set_phase(AdapterPhase::Stopping);
        self.synced = false;
        let transition = self.link.set_connected(false);
        self.apply_transition(transition);
        info!("Receiver adapter stopped");
        self.set_phase(AdapterPhase::Stopped);
    }

    async fn handle(&mut self, request: Request) {
        match request {
            Request::Write(write) => {
                let response = self.write_channel(write).await;
                self.sink.emit(AdapterEvent::CommandResult(response));
            }
            Request::Action {
                action_id,
                params,
                cmd_id,
            } => {
                debug!(%action_id, params = params.len(), cmd_id, "Adapter action requested");
                if let Some(response) = self.invoke_action(&action_id, cmd_id).await {
                    self.sink.emit(AdapterEvent::ActionResult(response));
                }
            }
            Request::UpdateDescriptor(descriptor) => self.update_descriptor(descriptor).await,
            Request::FullSync => self.request_full_sync().await,
        }
    }

    async fn write_channel(&mut self, write: ChannelWrite) -> CmdResponse {
        let cmd_id = write.cmd_id;
        if write.device_id != self.device_id {
            return CmdResponse::failed(cmd_id, CmdStatus::NotSupported, UNKNOWN_DEVICE);
        }
        let Ok(channel) = write.channel_id.parse::<ChannelId>() else {
            return CmdResponse::failed(cmd_id, CmdStatus::NotSupported, CHANNEL_NOT_SUPPORTED);
        };

        let (command, final_value) = match self.translator.encode_write(channel, &write.value) {
            Ok(encoded) => encoded,
            Err(StateError::InvalidArgument(message)) => {
                return CmdResponse::failed(cmd_id, CmdStatus::InvalidArgument, message);
            }
            Err(error) => {
                debug!(%error, "Rejected channel write");
                return CmdResponse::failed(cmd_id, CmdStatus::NotSupported, CHANNEL_NOT_SUPPORTED);
            }
        };

        match self.send(&command, None).await {
            Ok(_) => CmdResponse::success(cmd_id, final_value.to_json()),
            Err(DispatchError::NotConfigured) => {
                CmdResponse::failed(cmd_id, CmdStatus::InvalidArgument, ADDRESS_NOT_CONFIGURED)
            }
            Err(error) => {
                debug!(%command, %error, "Channel write failed");
                CmdResponse::failed(cmd_id, CmdStatus::TemporarilyOffline, RECEIVER_UNAVAILABLE)
            }
        }
    }

    async fn invoke_action(&mut self, action_id: &str, cmd_id: CmdId) -> Option<ActionResponse> {
        if cmd_id == 0 {
            debug!(action_id, "Ignoring action without command id");
            return None;
        }

        let response = match action_id {
            PROBE_CURRENT_INPUT_ACTION => self.probe_current_input(cmd_id).await,
            PROBE_ACTION => {
                probe_action(&self.descriptor, &self.config, &self.cancel, cmd_id).await
            }
            _ => ActionResponse::failed(
                action_id,
                cmd_id,
                CmdStatus::NotSupported,
                ACTION_NOT_SUPPORTED,
            ),
        };
        Some(response)
    }

    async fn probe_current_input(&mut self, cmd_id: CmdId) -> ActionResponse {
        let action = PROBE_CURRENT_INPUT_ACTION;
        let previous = self.translator.last_input().map(str::to_string);

        let updates = match self
            .send(&Command::input_query(), Some(self.config.probe_timeout))
            .await
        {
            Ok(updates) => updates,
            Err(error) => {
                debug!(%error, "Input probe failed");
                return ActionResponse::failed(
                    action,
                    cmd_id,
                    CmdStatus::TemporarilyOffline,
                    RECEIVER_UNAVAILABLE,
                );
            }
        };

        let reported = updates
            .iter()
            .rev()
            .find(|update| update.channel == ChannelId::Input)
            .and_then(|update| update.value.as_text())
            .map(str::to_string);
        let Some(code) = reported
            .or_else(|| previous.clone())
            .map(|code| pad_input_code(&code))
        else {
            return ActionResponse::failed(action, cmd_id, CmdStatus::Failure, NO_INPUT_REPORTED);
        };

        // The query is a one-off; keep the cached input as it was
        self.translator.restore_last_input(previous);

        let patch = self.input_meta_patch(&code);
        info!(%code, "Proposing input code for device metadata");
        self.sink.emit(AdapterEvent::MetaPatch {
            device_id: self.device_id.clone(),
            patch,
        });

        ActionResponse::success(action, cmd_id, Value::String(code))
    }

    fn input_meta_patch(&self, code: &str) -> Map<String, Value> {
        let mut active = self.descriptor.active_codes().unwrap_or_default();
        active.insert(code.to_string());

        let mut patch = Map::new();
        patch.insert(
            META_ACTIVE_CODES.to_string(),
            Value::Array(active.into_iter().map(Value::String).collect()),
        );

        let labelled = self
            .descriptor
            .label_overrides()
            .get(code)
            .is_some_and(|label| !label.is_empty());
        if !labelled {
            patch.insert(
                format!("{}{}", META_LABEL_PREFIX, code),
                Value::String(generated_label(code)),
            );
        }
        patch
    }

    async fn update_descriptor(&mut self, descriptor: DeviceDescriptor) {
        self.descriptor = descriptor;
        self.settings = ReceiverSettings::from_descriptor(&self.descriptor);
        self.link.reconfigure(&self.settings);
        self.translator.reconfigure(
            &self.settings,
            InputLabelRegistry::from_descriptor(&self.descriptor),
        );
        self.scheduler.retune(&self.settings, self.link.is_connected());
        info!(
            host = self.settings.host.as_deref().unwrap_or(""),
            port = self.settings.port,
            "Device descriptor updated"
        );

        if self.synced {
            self.sink.emit(AdapterEvent::ChannelUpdated {
                device_id: self.device_id.clone(),
                channel: Channel::input(self.translator.registry()),
            });
        } else {
            self.emit_snapshot();
        }
        self.refresh().await;
    }

    async fn request_full_sync(&mut self) {
        if self.synced {
            return;
        }
        self.emit_snapshot();
        self.refresh().await;
    }

    /// Query power, mute, volume and input in turn; failures do not stop
    /// the remaining queries
    async fn refresh(&mut self) {
        let queries = [
            Command::power_query(),
            Command::mute_query(),
            Command::volume_query(),
            Command::input_query(),
        ];
        for query in queries {
            if self.cancel.is_cancelled() {
                return;
            }
            if let Err(error) = self.send(&query, Some(self.config.refresh_timeout)).await {
                trace!(%query, %error, "State query failed");
            }
        }
    }

    async fn send(
        &mut self,
        command: &Command,
        response: Option<Duration>,
    ) -> std::result::Result<Vec<ChannelUpdate>, DispatchError> {
        let before = self.link.status();
        let result = self
            .dispatcher
            .send(&mut self.link, &self.settings, command, response)
            .await;
        let after = self.link.status();
        if after != before {
            self.apply_transition(Some(after));
        }

        let payloads = result?;
        Ok(self.apply_payloads(&payloads))
    }

    fn apply_payloads(&mut self, payloads: &[Bytes]) -> Vec<ChannelUpdate> {
        let mut applied = Vec::new();
        for payload in payloads {
            for update in self.translator.parse_payload(payload) {
                let transition = self.link.mark_seen(self.clock.now_ms());
                self.apply_transition(transition);
                self.emit_channel_state(update.channel, update.value.clone());
                applied.push(update);
            }
        }
        applied
    }

    fn check_presence(&mut self) {
        let transition = self.link.check_presence(self.clock.now_ms());
        self.apply_transition(transition);
    }

    fn apply_transition(&mut self, transition: Option<ConnectivityStatus>) {
        let Some(status) = transition else {
            return;
        };
        info!(status = status.as_str(), "Receiver connectivity changed");
        self.sink
            .emit(AdapterEvent::ConnectionStateChanged(status.is_connected()));
        self.emit_channel_state(ChannelId::Connectivity, ChannelValue::Connectivity(status));
        self.scheduler.retune(&self.settings, status.is_connected());
    }

    fn emit_snapshot(&mut self) {
        if self.synced {
            return;
        }
        self.device_id = resolve_device_id(&self.descriptor);
        let info = DeviceInfo::from_descriptor(&self.descriptor, self.translator.registry());
        debug!(device_id = %self.device_id, model = %info.model, "Publishing device snapshot");

        self.sink.emit(AdapterEvent::DeviceUpdated(info));
        self.sink.emit(AdapterEvent::FullSyncCompleted {
            device_id: self.device_id.clone(),
        });
        self.synced = true;

        let status = self.link.status();
        self.emit_channel_state(ChannelId::Connectivity, ChannelValue::Connectivity(status));
    }

    fn emit_channel_state(&self, channel: ChannelId, value: ChannelValue) {
        self.sink.emit(AdapterEvent::ChannelState(ChannelStateEvent {
            device_id: self.device_id.clone(),
            channel,
            value,
            ts_ms: epoch_ms(),
        }));
    }

    fn set_phase(&self, phase: AdapterPhase) {
        self.phase.send_replace(phase);
    }
}

/// Zero-pad single-character input codes
fn pad_input_code(code: &str) -> String {
    let code = code.trim();
    if code.chars().count() == 1 {
        format!("0{}", code)
    } else {
        code.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_input_code() {
        assert_eq!(pad_input_code("1"), "01");
        assert_eq!(pad_input_code("23"), "23");
        assert_eq!(pad_input_code(" 2E "), "2E");
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let config = AdapterConfig {
            wait_step: Duration::ZERO,
            ..AdapterConfig::default()
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = ReceiverAdapter::builder(DeviceDescriptor::default())
            .config(config)
            .start(tx);
        assert!(matches!(result, Err(AdapterError::Config(_))));
    }

    #[tokio::test]
    async fn test_unconfigured_adapter_lifecycle() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ReceiverAdapter::builder(DeviceDescriptor::default())
            .config(AdapterConfig::fast())
            .start(tx)
            .unwrap();

        let mut phase = handle.watch_phase();
        phase
            .wait_for(|p| *p == AdapterPhase::Running)
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            AdapterEvent::DeviceUpdated(info) => assert_eq!(info.id, "onkyo-pioneer"),
            other => panic!("unexpected event: {:?}", other),
        }

        handle
            .write_channel(ChannelWrite::new("onkyo-pioneer", "power", true, 1))
            .unwrap();
        let response = loop {
            if let AdapterEvent::CommandResult(response) = rx.recv().await.unwrap() {
                break response;
            }
        };
        assert_eq!(response.status, CmdStatus::InvalidArgument);
        assert_eq!(response.error.as_deref(), Some(ADDRESS_NOT_CONFIGURED));

        handle.stop().await.unwrap();
        assert_eq!(*phase.borrow(), AdapterPhase::Stopped);
    }
}
