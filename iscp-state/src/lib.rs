//! Receiver state model for ISCP devices
//!
//! Turns terse receiver reports (`PWR01`, `MVL3C`, `SLI23`) into normalized
//! channel values and turns channel writes back into commands. Also holds
//! the per-device configuration model and the input label table.
//!
//! # Architecture
//!
//! ```text
//! DeviceDescriptor → ReceiverSettings ─┐
//!                  → InputLabelRegistry ┴→ ChannelStateTranslator
//!                                            ↑ payloads   ↓ ChannelUpdate
//! ```
//!
//! # Example
//!
//! ```rust
//! use iscp_state::{ChannelId, ChannelStateTranslator, ChannelValue};
//!
//! let mut translator = ChannelStateTranslator::default();
//! let updates = translator.parse_payload(b"!1PWR01\r\n");
//! assert_eq!(updates[0].channel, ChannelId::Power);
//! assert_eq!(updates[0].value, ChannelValue::Bool(true));
//!
//! let (command, code) = translator.encode_input("HDMI 1").unwrap();
//! assert_eq!(command.to_string(), "SLI23");
//! assert_eq!(code, "23");
//! ```

pub mod channel;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod inputs;
pub mod logging;
pub mod translator;

pub use channel::{
    channel_catalog, Channel, ChannelId, ChannelStateEvent, ChannelUpdate, ChannelValue,
    ConnectivityStatus, DataType,
};
pub use descriptor::{DeviceDescriptor, ReceiverSettings};
pub use device::{infer_model, resolve_device_id, DeviceClass, DeviceInfo};
pub use error::{Result, StateError};
pub use inputs::{generated_label, InputChoice, InputLabelRegistry, DEFAULT_INPUT_LABELS};
pub use translator::{coerce_bool, coerce_number, ChannelStateTranslator};
