//! Translation between receiver payloads and channel values
//!
//! Inbound, a decoded payload may carry several lines separated by carriage
//! returns. Each line is parsed on its own so an unknown or malformed line
//! never hides its neighbours. Outbound, requested channel values become the
//! matching set command.

use serde_json::Value;
use tracing::{debug, trace};

use iscp_codec::{Command, INPUT, MUTE, POWER, VOLUME};

use crate::channel::{ChannelId, ChannelUpdate, ChannelValue};
use crate::descriptor::ReceiverSettings;
use crate::error::{Result, StateError};
use crate::inputs::InputLabelRegistry;

pub const VOLUME_NOT_NUMERIC: &str = "Volume must be numeric";
pub const INPUT_CODE_INVALID: &str = "Input expects 2-digit code (e.g. 01)";

// Unit prefix the receiver echoes in front of every report
const ECHO_PREFIX: &str = "!1";

/// Parses receiver reports and builds commands for channel writes
#[derive(Debug, Clone)]
pub struct ChannelStateTranslator {
    volume_max_raw: u16,
    registry: InputLabelRegistry,
    last_input: Option<String>,
}

impl Default for ChannelStateTranslator {
    fn default() -> Self {
        Self::new(&ReceiverSettings::default(), InputLabelRegistry::default())
    }
}

impl ChannelStateTranslator {
    pub fn new(settings: &ReceiverSettings, registry: InputLabelRegistry) -> Self {
        Self {
            volume_max_raw: settings.volume_max_raw.max(1),
            registry,
            last_input: None,
        }
    }

    /// Apply new settings and labels; the last reported input is kept
    pub fn reconfigure(&mut self, settings: &ReceiverSettings, registry: InputLabelRegistry) {
        self.volume_max_raw = settings.volume_max_raw.max(1);
        self.registry = registry;
    }

    pub fn registry(&self) -> &InputLabelRegistry {
        &self.registry
    }

    pub fn volume_max_raw(&self) -> u16 {
        self.volume_max_raw
    }

    /// Most recent input code the receiver reported
    pub fn last_input(&self) -> Option<&str> {
        self.last_input.as_deref()
    }

    /// Put back a previously cached input, e.g. after a one-off query
    pub fn restore_last_input(&mut self, input: Option<String>) {
        self.last_input = input;
    }

    /// Parse every line of a payload, in order
    pub fn parse_payload(&mut self, payload: &[u8]) -> Vec<ChannelUpdate> {
        let text = String::from_utf8_lossy(payload);
        text.split('\r')
            .filter_map(|line| self.parse_line(line))
            .collect()
    }

    /// Parse a single report line; unknown or malformed lines yield `None`
    pub fn parse_line(&mut self, line: &str) -> Option<ChannelUpdate> {
        let mut line = sanitize(line);
        if let Some(rest) = line.strip_prefix(ECHO_PREFIX) {
            line = sanitize(rest);
        }
        if line.len() < 3 || !line.is_char_boundary(3) {
            return None;
        }

        let (code, value) = line.split_at(3);
        let update = match code {
            POWER => parse_flag(value)
                .map(|on| ChannelUpdate::new(ChannelId::Power, ChannelValue::Bool(on))),
            MUTE => parse_flag(value)
                .map(|muted| ChannelUpdate::new(ChannelId::Mute, ChannelValue::Bool(muted))),
            VOLUME => self.parse_volume(value),
            INPUT if value.chars().count() == 2 => {
                self.last_input = Some(value.to_string());
                Some(ChannelUpdate::new(
                    ChannelId::Input,
                    ChannelValue::Text(value.to_string()),
                ))
            }
            _ => None,
        };

        match &update {
            Some(update) => debug!(line, channel = %update.channel, "Parsed receiver report"),
            None => trace!(line, "Ignoring receiver line"),
        }
        update
    }

    fn parse_volume(&self, value: &str) -> Option<ChannelUpdate> {
        let raw = u32::from_str_radix(value, 16).ok()?;
        let max = u32::from(self.volume_max_raw);
        let raw = raw.min(max);
        let percent = f64::from(raw) / f64::from(max) * 100.0;
        Some(ChannelUpdate::new(
            ChannelId::Volume,
            ChannelValue::Number(percent),
        ))
    }

    /// Command for a power change
    pub fn encode_power(&self, on: bool) -> Command {
        Command::power(on)
    }

    /// Command for a mute change
    pub fn encode_mute(&self, muted: bool) -> Command {
        Command::mute(muted)
    }

    /// Command for a volume percentage, with the clamped percentage
    pub fn encode_volume(&self, percent: f64) -> (Command, f64) {
        let percent = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
        let max = f64::from(self.volume_max_raw);
        let raw = (percent / 100.0 * max).round().clamp(0.0, max) as u16;
        (Command::volume_raw(raw), percent)
    }

    /// Command for an input given as a code, `SLI`-prefixed code or label
    pub fn encode_input(&self, requested: &str) -> Result<(Command, String)> {
        let requested = requested.trim();
        let requested = requested.strip_prefix(INPUT).unwrap_or(requested).trim();

        let code = self
            .registry
            .resolve_label(requested)
            .unwrap_or(requested)
            .to_string();
        if code.chars().count() != 2 {
            return Err(StateError::InvalidArgument(INPUT_CODE_INVALID.to_string()));
        }

        let command = Command::input(&code)
            .map_err(|_| StateError::InvalidArgument(INPUT_CODE_INVALID.to_string()))?;
        Ok((command, code))
    }

    /// Command and normalized final value for a JSON channel write
    pub fn encode_write(&self, channel: ChannelId, value: &Value) -> Result<(Command, ChannelValue)> {
        match channel {
            ChannelId::Power => {
                let on = coerce_bool(value);
                Ok((self.encode_power(on), ChannelValue::Bool(on)))
            }
            ChannelId::Mute => {
                let muted = coerce_bool(value);
                Ok((self.encode_mute(muted), ChannelValue::Bool(muted)))
            }
            ChannelId::Volume => {
                let percent = coerce_number(value)
                    .ok_or_else(|| StateError::InvalidArgument(VOLUME_NOT_NUMERIC.to_string()))?;
                let (command, percent) = self.encode_volume(percent);
                Ok((command, ChannelValue::Number(percent)))
            }
            ChannelId::Input => {
                let requested = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => String::new(),
                };
                let (command, code) = self.encode_input(&requested)?;
                Ok((command, ChannelValue::Text(code)))
            }
            ChannelId::Connectivity => Err(StateError::ReadOnly(channel.to_string())),
        }
    }
}

/// Trim whitespace and trailing control bytes
fn sanitize(line: &str) -> &str {
    line.trim()
        .trim_end_matches(|c: char| c.is_ascii_control())
        .trim()
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "01" => Some(true),
        "00" => Some(false),
        _ => None,
    }
}

/// Boolean reading of a written value
///
/// Numbers are true when non-zero; strings are true unless empty, `0` or `false`.
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let s = s.trim();
            !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))
        }
        _ => false,
    }
}

/// Numeric reading of a written value, accepting numeric strings
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}
