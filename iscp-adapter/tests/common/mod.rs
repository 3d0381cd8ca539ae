//! Test helpers: an in-process eISCP receiver on a loopback port

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use iscp_adapter::AdapterEvent;
use iscp_codec::{encode, Command, FrameDecoder, Framing, Terminator};
use iscp_state::DeviceDescriptor;

/// How the mock answers queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Report power on, unmuted, volume 0x50 and input 23
    Normal,
    /// Accept connections and read, never reply
    Silent,
    /// Reply to everything with an unrelated command
    Unexpected,
}

/// Loopback receiver that records every command it receives
pub struct MockReceiver {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl MockReceiver {
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock receiver");
        let addr = listener.local_addr().expect("Mock receiver has no address");
        let received = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&received);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, behavior, Arc::clone(&log)));
            }
        });

        Self {
            addr,
            received,
            task,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Descriptor pointing at this mock, with a full-range volume scale of 160
    pub fn descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor::new("127.0.0.1")
            .with_port(self.port())
            .with_meta("volumeMaxRaw", 160)
    }

    /// Commands received so far, without the `!1` prefix and terminator
    pub async fn received(&self) -> Vec<String> {
        self.received.lock().await.clone()
    }

    /// Wait until `command` has been received
    pub async fn wait_for_command(&self, command: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.received.lock().await.iter().any(|c| c == command) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    /// Stop accepting connections; the port is released
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for MockReceiver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: TcpStream, behavior: Behavior, log: Arc<Mutex<Vec<String>>>) {
    let mut decoder = FrameDecoder::new(Framing::Eiscp);
    let mut buf = [0u8; 512];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };

        for payload in decoder.push(&buf[..n]) {
            let text = String::from_utf8_lossy(&payload);
            let command = text
                .trim_start_matches("!1")
                .trim_end_matches(['\r', '\n', '\u{1a}'])
                .to_string();
            log.lock().await.push(command.clone());

            if let Some(reply) = reply_for(&command, behavior) {
                let frame = encode(&reply, Framing::Eiscp, Terminator::CrLf);
                if stream.write_all(&frame).await.is_err() {
                    return;
                }
            }
        }
    }
}

fn reply_for(command: &str, behavior: Behavior) -> Option<Command> {
    let reply = match behavior {
        Behavior::Silent => return None,
        Behavior::Unexpected => "NRI00",
        Behavior::Normal => match command {
            "PWRQSTN" => "PWR01",
            "AMTQSTN" => "AMT00",
            "MVLQSTN" => "MVL50",
            "SLIQSTN" => "SLI23",
            // Receivers echo accepted settings
            other => other,
        },
    };
    reply.parse::<Command>().ok()
}

/// Receive events until `pred` matches or the timeout passes
pub async fn next_matching<F>(
    events: &mut mpsc::UnboundedReceiver<AdapterEvent>,
    timeout: Duration,
    mut pred: F,
) -> Option<AdapterEvent>
where
    F: FnMut(&AdapterEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Some(event)) if pred(&event) => return Some(event),
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => return None,
        }
    }
}

/// Drain whatever is queued right now
pub fn drain(events: &mut mpsc::UnboundedReceiver<AdapterEvent>) -> Vec<AdapterEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
