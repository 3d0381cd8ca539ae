//! Device identity and snapshot for a receiver

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::channel::{channel_catalog, Channel};
use crate::descriptor::DeviceDescriptor;
use crate::inputs::InputLabelRegistry;

pub const DEFAULT_MANUFACTURER: &str = "Onkyo & Pioneer";
const FALLBACK_DEVICE_ID: &str = "onkyo-pioneer";

pub const META_DEVICE_UUID: &str = "deviceUuid";
pub const META_UUID: &str = "uuid";
pub const META_DEVICE_NAME: &str = "deviceName";
pub const META_MANUFACTURER: &str = "manufacturer";
pub const META_MODEL: &str = "model";
pub const META_SUPPORTS_SPOTIFY: &str = "supportsSpotify";
pub const META_SUPPORTS_TRANSCODER: &str = "supportsTranscoder";

// Advertised names look like "Onkyo-TX-NR686-1A2B3C" or "Pioneer VSX-LX303".
static MODEL_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:Pioneer|Onkyo)[-_ ]?(.+?)(?:-[0-9A-F]{4,12})?$").ok()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    MediaPlayer,
}

/// Identity plus channel list, as published to collaborators
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub class: DeviceClass,
    pub meta: Map<String, Value>,
    pub channels: Vec<Channel>,
}

impl DeviceInfo {
    pub fn from_descriptor(descriptor: &DeviceDescriptor, registry: &InputLabelRegistry) -> Self {
        let name = first_non_empty([
            descriptor.name.trim().to_string(),
            descriptor.meta_str(META_DEVICE_NAME),
            descriptor.ip.trim().to_string(),
        ])
        .unwrap_or_default();

        let manufacturer = first_non_empty([descriptor.meta_str(META_MANUFACTURER)])
            .unwrap_or_else(|| DEFAULT_MANUFACTURER.to_string());

        let model = first_non_empty([descriptor.meta_str(META_MODEL)])
            .or_else(|| infer_model_from_descriptor(descriptor))
            .unwrap_or_default();

        let mut meta = Map::new();
        for key in [META_SUPPORTS_SPOTIFY, META_SUPPORTS_TRANSCODER] {
            if descriptor.meta_bool(key) {
                meta.insert(key.to_string(), Value::Bool(true));
            }
        }

        Self {
            id: resolve_device_id(descriptor),
            name,
            manufacturer,
            model,
            class: DeviceClass::MediaPlayer,
            meta,
            channels: channel_catalog(registry),
        }
    }
}

/// Stable id for the device: uuid metadata first, then addressing
pub fn resolve_device_id(descriptor: &DeviceDescriptor) -> String {
    first_non_empty([
        descriptor.meta_str(META_DEVICE_UUID),
        descriptor.meta_str(META_UUID),
        descriptor.id.trim().to_string(),
        descriptor.host.trim().to_string(),
        descriptor.ip.trim().to_string(),
    ])
    .unwrap_or_else(|| FALLBACK_DEVICE_ID.to_string())
}

/// Model name embedded in an advertised host or device name
///
/// Only candidates containing a digit are accepted, which filters out
/// generic names like "Onkyo Receiver".
pub fn infer_model(candidate: &str) -> Option<String> {
    let mut name = candidate.trim();
    if let Some((head, port)) = name.rsplit_once(':') {
        if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
            name = head;
        }
    }
    let name = name.strip_suffix(".local").unwrap_or(name).trim();

    let model = MODEL_PATTERN.as_ref()?.captures(name)?.get(1)?.as_str().trim();
    if model.is_empty() || !model.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(model.to_string())
}

fn infer_model_from_descriptor(descriptor: &DeviceDescriptor) -> Option<String> {
    [
        descriptor.ip.trim().to_string(),
        descriptor.meta_str(META_DEVICE_UUID),
        descriptor.meta_str(META_UUID),
        descriptor.meta_str(META_DEVICE_NAME),
        descriptor.name.trim().to_string(),
    ]
    .iter()
    .find_map(|candidate| infer_model(candidate))
}

fn first_non_empty<const N: usize>(candidates: [String; N]) -> Option<String> {
    candidates.into_iter().find(|c| !c.is_empty())
}
