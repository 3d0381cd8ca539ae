//! # ISCP Receiver Adapter
//!
//! Network control for Onkyo and Pioneer AV receivers over eISCP, exposing
//! power, volume, mute and input as logical channels plus a connectivity
//! channel.
//!
//! ## Overview
//!
//! One adapter runs per receiver as a single tokio task. Receivers close idle
//! sockets, so the adapter opens a fresh TCP connection for every command and
//! tracks reachability from device contact rather than socket state:
//!
//! - **Connect** only after data (or an accepted connection) arrives
//! - **Disconnect** only after the receiver has been silent for the poll
//!   interval plus one second
//! - **Reconnect attempts** at most once per retry interval while disconnected
//!
//! A failed single attempt never flips connectivity on its own.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use iscp_adapter::{AdapterEvent, ChannelWrite, ReceiverAdapter};
//! use iscp_state::DeviceDescriptor;
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let descriptor = DeviceDescriptor::new("192.168.1.20").with_meta("pollIntervalMs", 3000);
//! let (events_tx, mut events) = mpsc::unbounded_channel();
//!
//! let adapter = ReceiverAdapter::builder(descriptor).start(events_tx)?;
//! adapter.write_channel(ChannelWrite::new("192.168.1.20", "volume", 35, 1))?;
//!
//! while let Some(event) = events.recv().await {
//!     if let AdapterEvent::ChannelState(state) = event {
//!         println!("{} = {:?}", state.channel, state.value);
//!     }
//! }
//! adapter.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`connection`]: the connectivity state machine and reconnect gate
//! - [`dispatcher`]: one command exchange on a short-lived socket
//! - [`scheduler`]: refresh timing that follows connectivity
//! - [`adapter`]: the per-device task, its handle and the write/action paths
//! - [`probe`]: standalone reachability check

pub mod adapter;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod probe;
pub mod scheduler;

// Re-export main types for convenience
pub use adapter::{
    AdapterBuilder, AdapterHandle, AdapterPhase, ReceiverAdapter, PROBE_CURRENT_INPUT_ACTION,
};
pub use config::AdapterConfig;
pub use connection::{Clock, ConnectionManager};
pub use dispatcher::CommandDispatcher;
pub use error::{AdapterError, DispatchError, ProbeError, Result};
pub use events::{
    epoch_ms, ActionResponse, AdapterEvent, ChannelWrite, CmdId, CmdResponse, CmdStatus,
    EventSink,
};
pub use probe::{probe_action, probe_receiver, probe_receiver_until, PROBE_ACTION};
pub use scheduler::{PollScheduler, PollTick};

// Re-export commonly used types from dependencies
pub use iscp_codec::{Framing, Terminator};
pub use iscp_state::{ChannelId, ChannelValue, ConnectivityStatus, DeviceDescriptor};
