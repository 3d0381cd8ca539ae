//! Log output of the adapter, captured through a test subscriber

use std::io::Write;
use std::sync::{Arc, Mutex};

use iscp_adapter::{AdapterConfig, AdapterPhase, ReceiverAdapter};
use iscp_state::DeviceDescriptor;
use tokio::sync::mpsc;
use tracing_subscriber::fmt::MakeWriter;

/// Shared in-memory sink for formatted log lines
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn capture() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}

// The default subscriber is thread-local, so these tests rely on the
// current-thread runtime that `tokio::test` uses by default.

#[tokio::test]
async fn test_adapter_logs_inside_injected_span() {
    let (logs, _guard) = capture();

    let (tx, _events) = mpsc::unbounded_channel();
    let handle = ReceiverAdapter::builder(DeviceDescriptor::default())
        .config(AdapterConfig::fast())
        .span(tracing::info_span!("living_room_receiver"))
        .start(tx)
        .unwrap();
    handle
        .watch_phase()
        .wait_for(|phase| *phase == AdapterPhase::Running)
        .await
        .unwrap();
    handle.stop().await.unwrap();

    let output = logs.contents();
    assert!(output.contains("living_room_receiver"), "{}", output);
    assert!(output.contains("Starting receiver adapter"), "{}", output);
    assert!(output.contains("Receiver address not configured"), "{}", output);
    assert!(output.contains("Receiver adapter stopped"), "{}", output);
}

#[tokio::test]
async fn test_default_span_names_the_device() {
    let (logs, _guard) = capture();

    let (tx, _events) = mpsc::unbounded_channel();
    let descriptor = DeviceDescriptor::default().with_meta("deviceUuid", "rx-42");
    let handle = ReceiverAdapter::builder(descriptor)
        .config(AdapterConfig::fast())
        .start(tx)
        .unwrap();
    handle.stop().await.unwrap();

    let output = logs.contents();
    assert!(output.contains("iscp_adapter"), "{}", output);
    assert!(output.contains("rx-42"), "{}", output);
}
