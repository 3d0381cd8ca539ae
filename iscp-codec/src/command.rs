//! ISCP command model
//!
//! A command is a three-letter code (`PWR`, `MVL`, ...) followed by an
//! optional parameter (`01`, `QSTN`, a hex volume, ...). Commands are plain
//! values built per call; the frame layer adds the `!1` unit prefix and the
//! line terminator.

use std::fmt;
use std::str::FromStr;

use crate::error::{CodecError, Result};

/// Main power (`PWR01` / `PWR00` / `PWRQSTN`)
pub const POWER: &str = "PWR";
/// Audio mute (`AMT01` / `AMT00` / `AMTQSTN`)
pub const MUTE: &str = "AMT";
/// Master volume (`MVL<hex>` / `MVLQSTN`)
pub const VOLUME: &str = "MVL";
/// Input selector (`SLI<code>` / `SLIQSTN`)
pub const INPUT: &str = "SLI";

/// Parameter used to ask the receiver for the current value
pub const QUERY: &str = "QSTN";

/// A single ISCP command
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command {
    code: String,
    parameter: String,
}

impl Command {
    /// Build a command from a code and parameter, validating both
    pub fn new(code: impl Into<String>, parameter: impl Into<String>) -> Result<Self> {
        let code = code.into();
        let parameter = parameter.into();

        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(CodecError::InvalidCode(code));
        }
        if !parameter.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
            return Err(CodecError::InvalidParameter(parameter));
        }

        Ok(Self { code, parameter })
    }

    /// `<code>QSTN`
    pub fn query(code: &str) -> Result<Self> {
        Self::new(code, QUERY)
    }

    pub fn power_query() -> Self {
        Self::known(POWER, QUERY)
    }

    pub fn mute_query() -> Self {
        Self::known(MUTE, QUERY)
    }

    pub fn volume_query() -> Self {
        Self::known(VOLUME, QUERY)
    }

    pub fn input_query() -> Self {
        Self::known(INPUT, QUERY)
    }

    /// `PWR01` / `PWR00`
    pub fn power(on: bool) -> Self {
        Self::known(POWER, if on { "01" } else { "00" })
    }

    /// `AMT01` / `AMT00`
    pub fn mute(muted: bool) -> Self {
        Self::known(MUTE, if muted { "01" } else { "00" })
    }

    /// `MVL` followed by the raw level as uppercase hex, at least two digits
    pub fn volume_raw(raw: u16) -> Self {
        Self::known(VOLUME, format!("{:02X}", raw))
    }

    /// `SLI<code>`; the code must be printable ASCII
    pub fn input(code: &str) -> Result<Self> {
        Self::new(INPUT, code)
    }

    // Codes and parameters above are compile-time constants or hex digits.
    fn known(code: &str, parameter: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            parameter: parameter.into(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    /// True when this command asks for the current value
    pub fn is_query(&self) -> bool {
        self.parameter == QUERY
    }

    /// Command text without unit prefix or terminator, e.g. `PWR01`
    pub fn to_ascii(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.code.len() + self.parameter.len());
        out.extend_from_slice(self.code.as_bytes());
        out.extend_from_slice(self.parameter.as_bytes());
        out
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.code, self.parameter)
    }
}

impl FromStr for Command {
    type Err = CodecError;

    /// Parse `PWR01`-style text; a leading `!1` unit prefix is accepted
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s.strip_prefix("!1").unwrap_or(s);
        if s.len() < 3 || !s.is_char_boundary(3) {
            return Err(CodecError::InvalidCode(s.to_string()));
        }
        let (code, parameter) = s.split_at(3);
        Self::new(code, parameter)
    }
}
