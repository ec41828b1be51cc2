use crate::error::{AdbError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    // One `serial\tstate` pair per line of a host devices payload.
    static ref DEVICE_LINE: Regex = Regex::new(r"^(\S+)\t(\S+)$").unwrap();
}

/// Connection state the host server reports for a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Device,
    Offline,
    Unauthorized,
    Bootloader,
    Recovery,
    Sideload,
    Other(String),
}

impl DeviceState {
    pub fn as_str(&self) -> &str {
        match self {
            DeviceState::Device => "device",
            DeviceState::Offline => "offline",
            DeviceState::Unauthorized => "unauthorized",
            DeviceState::Bootloader => "bootloader",
            DeviceState::Recovery => "recovery",
            DeviceState::Sideload => "sideload",
            DeviceState::Other(s) => s,
        }
    }

    /// Check if the device will accept commands.
    pub fn is_online(&self) -> bool {
        *self == DeviceState::Device
    }
}

impl From<&str> for DeviceState {
    fn from(s: &str) -> Self {
        match s {
            "device" => DeviceState::Device,
            "offline" => DeviceState::Offline,
            "unauthorized" => DeviceState::Unauthorized,
            "bootloader" => DeviceState::Bootloader,
            "recovery" => DeviceState::Recovery,
            "sideload" => DeviceState::Sideload,
            other => DeviceState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One device as reported by `host:devices` or `host:track-devices`.
///
/// A snapshot at read time; the server sends a fresh record when the state
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub serial: String,
    pub state: DeviceState,
}

impl DeviceRecord {
    /// Parse one `serial\tstate` line.
    pub(crate) fn parse(line: &str) -> Result<Self> {
        let caps = DEVICE_LINE
            .captures(line)
            .ok_or_else(|| AdbError::protocol(format!("malformed device line: {:?}", line)))?;
        Ok(Self {
            serial: caps[1].to_string(),
            state: DeviceState::from(&caps[2]),
        })
    }

    /// Parse a newline-delimited devices payload, skipping blank lines.
    pub(crate) fn parse_payload(payload: &str) -> Result<Vec<Self>> {
        payload
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Self::parse)
            .collect()
    }
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.serial, self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serial_and_state() {
        let record = DeviceRecord::parse("emulator-5554\tdevice").unwrap();
        assert_eq!(record.serial, "emulator-5554");
        assert_eq!(record.state, DeviceState::Device);
        assert!(record.state.is_online());
    }

    #[test]
    fn unknown_states_are_preserved() {
        let record = DeviceRecord::parse("ABC123\thost").unwrap();
        assert_eq!(record.state, DeviceState::Other("host".to_string()));
        assert_eq!(record.state.as_str(), "host");
        assert!(!record.state.is_online());
    }

    #[test]
    fn rejects_lines_without_a_tab() {
        assert!(matches!(
            DeviceRecord::parse("emulator-5554 device"),
            Err(AdbError::Protocol(_))
        ));
    }

    #[test]
    fn payload_parsing_skips_blank_lines() {
        let records =
            DeviceRecord::parse_payload("serial-a\tdevice\n\nserial-b\tunauthorized\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].serial, "serial-a");
        assert_eq!(records[1].state, DeviceState::Unauthorized);
    }

    #[test]
    fn empty_payload_yields_no_records() {
        assert!(DeviceRecord::parse_payload("").unwrap().is_empty());
        assert!(DeviceRecord::parse_payload("\n  \n").unwrap().is_empty());
    }
}
