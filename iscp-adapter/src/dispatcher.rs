//! Per-command socket exchange
//!
//! Every command runs on its own short-lived TCP connection: connect, write
//! one frame, optionally collect the response, close. Each blocking wait is
//! split into short slices and races the adapter's cancellation token so a
//! stop request never waits out a full timeout.

use std::future::Future;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use iscp_codec::{encode, Command, FrameDecoder};
use iscp_state::ReceiverSettings;

use crate::config::AdapterConfig;
use crate::connection::{Clock, ConnectionManager};
use crate::error::DispatchError;

/// Outcome of a sliced wait
#[derive(Debug)]
pub(crate) enum Wait<T> {
    Ready(T),
    TimedOut,
    Cancelled,
}

/// Await `fut` for at most `limit`, checking `cancel` every `step`
pub(crate) async fn wait_stepped<F: Future>(
    fut: F,
    limit: Duration,
    step: Duration,
    cancel: &CancellationToken,
) -> Wait<F::Output> {
    tokio::pin!(fut);
    let step = step.max(Duration::from_millis(1));
    let mut waited = Duration::ZERO;

    loop {
        if cancel.is_cancelled() {
            return Wait::Cancelled;
        }
        if waited >= limit {
            return Wait::TimedOut;
        }
        let slice = step.min(limit - waited);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Wait::Cancelled,
            output = &mut fut => return Wait::Ready(output),
            _ = tokio::time::sleep(slice) => waited += slice,
        }
    }
}

/// Open a TCP connection within the configured connect timeout
pub(crate) async fn open_stream(
    host: &str,
    port: u16,
    config: &AdapterConfig,
    cancel: &CancellationToken,
) -> Result<TcpStream, DispatchError> {
    let connect = TcpStream::connect((host, port));
    match wait_stepped(connect, config.connect_timeout, config.wait_step, cancel).await {
        Wait::Ready(Ok(stream)) => {
            let _ = stream.set_nodelay(true);
            Ok(stream)
        }
        Wait::Ready(Err(source)) => Err(DispatchError::ConnectFailed {
            host: host.to_string(),
            port,
            source,
        }),
        Wait::TimedOut => Err(DispatchError::ConnectTimeout {
            host: host.to_string(),
            port,
        }),
        Wait::Cancelled => Err(DispatchError::Cancelled),
    }
}

/// Write one frame; bounded by the connect timeout and cancellable
pub(crate) async fn write_frame(
    stream: &mut TcpStream,
    frame: &[u8],
    config: &AdapterConfig,
    cancel: &CancellationToken,
) -> Result<(), DispatchError> {
    let write = async {
        stream.write_all(frame).await?;
        stream.flush().await
    };
    match wait_stepped(write, config.connect_timeout, config.wait_step, cancel).await {
        Wait::Ready(result) => result.map_err(DispatchError::from),
        Wait::TimedOut => Err(DispatchError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "write timed out",
        ))),
        Wait::Cancelled => Err(DispatchError::Cancelled),
    }
}

/// Collect response bytes: wait up to `timeout` for the first data, then
/// keep draining while more arrives within one drain step
pub(crate) async fn read_response(
    stream: &mut TcpStream,
    timeout: Duration,
    config: &AdapterConfig,
    cancel: &CancellationToken,
) -> Result<BytesMut, DispatchError> {
    let mut buf = BytesMut::with_capacity(512);

    match wait_stepped(stream.read_buf(&mut buf), timeout, config.wait_step, cancel).await {
        Wait::Ready(Ok(0)) | Wait::TimedOut | Wait::Cancelled => return Ok(buf),
        Wait::Ready(Ok(_)) => {}
        Wait::Ready(Err(e)) => return Err(e.into()),
    }

    loop {
        match wait_stepped(
            stream.read_buf(&mut buf),
            config.drain_step,
            config.drain_step,
            cancel,
        )
        .await
        {
            Wait::Ready(Ok(n)) if n > 0 => continue,
            Wait::Ready(Err(e)) => {
                trace!(error = %e, "Read error while draining response");
                break;
            }
            _ => break,
        }
    }

    Ok(buf)
}

/// Half-close and wait briefly for the receiver to close its side
pub(crate) async fn close_stream(
    mut stream: TcpStream,
    config: &AdapterConfig,
    cancel: &CancellationToken,
) {
    let grace = config.disconnect_grace;
    let step = config.disconnect_step;

    if let Wait::Ready(Err(e)) = wait_stepped(stream.shutdown(), grace, step, cancel).await {
        trace!(error = %e, "Socket shutdown failed");
        return;
    }

    let mut scratch = [0u8; 256];
    let drained = async {
        loop {
            match stream.read(&mut scratch).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };
    if let Wait::TimedOut = wait_stepped(drained, grace, step, cancel).await {
        trace!("Receiver did not close within grace period");
    }
}

/// Sends commands to one receiver, one exchange at a time
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    config: AdapterConfig,
    cancel: CancellationToken,
    clock: Clock,
}

impl CommandDispatcher {
    pub fn new(config: AdapterConfig, cancel: CancellationToken, clock: Clock) -> Self {
        Self {
            config,
            cancel,
            clock,
        }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Run one command exchange
    ///
    /// With `response` set, waits that long for reply data and returns the
    /// decoded payloads; otherwise returns an empty list once the frame is
    /// written. Connectivity on `link` changes only through device contact.
    pub async fn send(
        &self,
        link: &mut ConnectionManager,
        settings: &ReceiverSettings,
        command: &Command,
        response: Option<Duration>,
    ) -> Result<Vec<Bytes>, DispatchError> {
        let (host, port) = settings.endpoint().ok_or(DispatchError::NotConfigured)?;
        if self.cancel.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        let now = self.clock.now_ms();
        if !link.admits_attempt(now) {
            trace!(%command, "Skipping command during reconnect backoff");
            return Err(DispatchError::BackoffActive);
        }
        link.mark_connect_attempt(now);

        let mut stream = match open_stream(host, port, &self.config, &self.cancel).await {
            Ok(stream) => stream,
            Err(error) => {
                if !matches!(error, DispatchError::Cancelled) {
                    let reason = match &error {
                        DispatchError::ConnectFailed { source, .. } => source.to_string(),
                        other => other.to_string(),
                    };
                    if link.record_connect_failure(&reason, host, now) {
                        warn!(host, port, %reason, "Failed to connect to receiver");
                    }
                }
                return Err(error);
            }
        };

        if self.config.connect_counts_as_seen {
            link.mark_seen(self.clock.now_ms());
        }

        let frame = encode(command, self.config.framing, self.config.terminator);
        debug!(%command, host, port, "Sending command");
        let outcome = self.exchange(&mut stream, &frame, response).await;
        close_stream(stream, &self.config, &self.cancel).await;
        outcome
    }

    async fn exchange(
        &self,
        stream: &mut TcpStream,
        frame: &[u8],
        response: Option<Duration>,
    ) -> Result<Vec<Bytes>, DispatchError> {
        write_frame(stream, frame, &self.config, &self.cancel).await?;

        let Some(timeout) = response.filter(|t| !t.is_zero()) else {
            return Ok(Vec::new());
        };

        let data = read_response(stream, timeout, &self.config, &self.cancel).await?;
        if data.is_empty() {
            trace!("No response data");
            return Ok(Vec::new());
        }

        let mut decoder = FrameDecoder::new(self.config.framing);
        let mut payloads = decoder.push(&data);
        payloads.extend(decoder.finish());
        debug!(bytes = data.len(), payloads = payloads.len(), "Received response");
        Ok(payloads)
    }
}
