use crate::error::{BulbError, Result};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use uuid::Uuid;

/// Managed bulb identifier
pub type DeviceId = Uuid;

/// Default TCP control port
pub const DEFAULT_PORT: u16 = 55443;

/// Coolest color temperature the bulbs accept, in kelvin
pub const MAX_KELVIN: u16 = 6500;

/// Warmest color temperature the bulbs accept, in kelvin
pub const MIN_KELVIN: u16 = 1700;

/// Shortest transition the bulbs accept
pub const MIN_TRANSITION: Duration = Duration::from_millis(30);

/// Device hue units per hub hue unit (device hue is 0-359, hub hue is 0-100)
const HUE_SCALE: f64 = 3.59;

/// Network endpoint and per-session defaults for one bulb
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Dotted-quad IPv4 address
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Default transition duration in milliseconds
    #[serde(default = "default_transition_ms")]
    pub transition_ms: u64,

    /// Interval between property polls in seconds, zero disables polling
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_transition_ms() -> u64 {
    500
}

fn default_poll_interval_secs() -> u64 {
    60
}

impl Endpoint {
    /// Create an endpoint for the given address with default settings
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            port: DEFAULT_PORT,
            transition_ms: default_transition_ms(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }

    /// Load an endpoint from a JSON object, filling in defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Use a port other than 55443
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Default transition for commands that do not give one
    pub fn with_transition(mut self, transition: Duration) -> Self {
        self.transition_ms = u64::try_from(transition.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// How often to poll; `Duration::ZERO` turns polling off
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_secs = interval.as_secs();
        self
    }

    /// Default transition, never shorter than the device minimum
    pub fn transition(&self) -> Duration {
        Duration::from_millis(self.transition_ms).max(MIN_TRANSITION)
    }

    /// Poll interval, `None` when polling is disabled
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_secs > 0).then(|| Duration::from_secs(self.poll_interval_secs))
    }

    /// Validate the address and build the socket address to connect to
    ///
    /// Only literal dotted-quad IPv4 addresses are accepted; host names are
    /// rejected.
    pub fn socket_addr(&self) -> Result<SocketAddrV4> {
        let address = self
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| BulbError::Config("no address configured".to_string()))?;

        let ip: Ipv4Addr = address
            .parse()
            .map_err(|_| BulbError::Config(format!("invalid IPv4 address: {}", address)))?;

        Ok(SocketAddrV4::new(ip, self.port))
    }
}

/// Power switch state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    /// The opposite position
    pub fn flipped(self) -> Self {
        match self {
            Switch::On => Switch::Off,
            Switch::Off => Switch::On,
        }
    }

    /// Wire literal for `set_power`
    pub fn as_str(self) -> &'static str {
        match self {
            Switch::On => "on",
            Switch::Off => "off",
        }
    }
}

/// Which color model the bulb is currently rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorMode {
    #[serde(rename = "CT")]
    ColorTemperature,
    #[serde(rename = "RGB")]
    Rgb,
    #[serde(rename = "HSV")]
    Hsv,
}

impl ColorMode {
    /// Map the device's `color_mode` property; unknown codes mean CT
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => ColorMode::Rgb,
            3 => ColorMode::Hsv,
            _ => ColorMode::ColorTemperature,
        }
    }
}

/// Whether the control connection is up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Connected,
    #[default]
    Disconnected,
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

/// A single attribute update of the canonical state
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Switch(Switch),
    Level(u8),
    ColorTemperature(u16),
    Hue(u8),
    Saturation(u8),
    ColorMode(ColorMode),
    ColorName(&'static str),
    Connectivity(Connectivity),
}

/// Where a state change came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    /// Written locally when a command was issued
    Optimistic,
    /// Reported by the bulb
    Confirmed,
}

/// Canonical, unit-normalized bulb state
///
/// Attributes stay `None` until first reported or commanded. Hue and
/// saturation use the 0-100 hub scale.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulbState {
    pub switch: Option<Switch>,
    pub level: Option<u8>,
    pub color_temperature: Option<u16>,
    pub hue: Option<u8>,
    pub saturation: Option<u8>,
    pub color_mode: Option<ColorMode>,
    pub color_name: Option<&'static str>,
    pub connectivity: Connectivity,
}

impl BulbState {
    /// Apply one change, returning whether anything was modified
    pub fn apply(&mut self, change: &Change) -> bool {
        match *change {
            Change::Switch(v) => replace(&mut self.switch, v),
            Change::Level(v) => replace(&mut self.level, v),
            Change::ColorTemperature(v) => replace(&mut self.color_temperature, v),
            Change::Hue(v) => replace(&mut self.hue, v),
            Change::Saturation(v) => replace(&mut self.saturation, v),
            Change::ColorMode(v) => replace(&mut self.color_mode, v),
            Change::ColorName(v) => replace(&mut self.color_name, v),
            Change::Connectivity(v) => {
                let changed = self.connectivity != v;
                self.connectivity = v;
                changed
            }
        }
    }
}

fn replace<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    let changed = slot.as_ref() != Some(&value);
    *slot = Some(value);
    changed
}

/// Clamp a kelvin value to the supported range
pub fn clamp_kelvin(kelvin: i64) -> u16 {
    kelvin.clamp(i64::from(MIN_KELVIN), i64::from(MAX_KELVIN)) as u16
}

/// Clamp a percentage (level, hue, saturation) to 0-100
pub fn clamp_percent(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

/// Convert a 0-100 hub hue to the device's 0-359 scale
pub fn hue_to_device(hue: u8) -> u16 {
    (f64::from(hue) * HUE_SCALE).round() as u16
}

/// Convert a device hue (0-359) to the 0-100 hub scale
pub fn hue_from_device(hue: i64) -> u8 {
    clamp_percent((hue as f64 / HUE_SCALE).round() as i64)
}

/// Descriptive name for a white color temperature
pub fn kelvin_name(kelvin: u16) -> &'static str {
    match kelvin {
        0..=2000 => "Candlelight",
        2001..=2500 => "Warm White",
        2501..=3000 => "Incandescent",
        3001..=3500 => "Soft White",
        3501..=4000 => "Neutral White",
        4001..=5000 => "Cool White",
        5001..=6000 => "Daylight",
        _ => "Bright Daylight",
    }
}

/// Descriptive name for a hue/saturation pair on the 0-100 scale
pub fn hue_name(hue: u8, saturation: u8) -> &'static str {
    if saturation < 10 {
        return "White";
    }
    match hue {
        0..=3 | 96.. => "Red",
        4..=12 => "Orange",
        13..=20 => "Yellow",
        21..=45 => "Green",
        46..=62 => "Cyan",
        63..=78 => "Blue",
        79..=87 => "Violet",
        _ => "Pink",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_defaults_from_json() {
        let endpoint = Endpoint::from_json(r#"{"address": "192.168.1.40"}"#).unwrap();
        assert_eq!(endpoint, Endpoint::new("192.168.1.40"));
        assert_eq!(endpoint.port, 55443);
        assert_eq!(endpoint.transition(), Duration::from_millis(500));
        assert_eq!(endpoint.poll_interval(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_endpoint_validation() {
        let addr = Endpoint::new("10.0.0.7").with_port(1234).socket_addr().unwrap();
        assert_eq!(addr, SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 7), 1234));

        for bad in ["", "  ", "bulb.local", "10.0.0", "10.0.0.256", "::1"] {
            assert!(
                matches!(Endpoint::new(bad).socket_addr(), Err(BulbError::Config(_))),
                "{:?} should be rejected",
                bad
            );
        }

        let missing = Endpoint::from_json("{}").unwrap();
        assert!(matches!(missing.socket_addr(), Err(BulbError::Config(_))));
    }

    #[test]
    fn test_transition_floor() {
        let endpoint = Endpoint::new("10.0.0.7").with_transition(Duration::from_millis(5));
        assert_eq!(endpoint.transition(), MIN_TRANSITION);
        let no_poll = endpoint.with_poll_interval(Duration::ZERO);
        assert_eq!(no_poll.poll_interval(), None);
    }

    #[test]
    fn test_kelvin_buckets() {
        assert_eq!(kelvin_name(1700), "Candlelight");
        assert_eq!(kelvin_name(2000), "Candlelight");
        assert_eq!(kelvin_name(2001), "Warm White");
        assert_eq!(kelvin_name(2700), "Incandescent");
        assert_eq!(kelvin_name(3500), "Soft White");
        assert_eq!(kelvin_name(4000), "Neutral White");
        assert_eq!(kelvin_name(4500), "Cool White");
        assert_eq!(kelvin_name(6000), "Daylight");
        assert_eq!(kelvin_name(6500), "Bright Daylight");
    }

    #[test]
    fn test_hue_buckets() {
        assert_eq!(hue_name(50, 5), "White");
        assert_eq!(hue_name(0, 100), "Red");
        assert_eq!(hue_name(96, 100), "Red");
        assert_eq!(hue_name(4, 100), "Orange");
        assert_eq!(hue_name(15, 100), "Yellow");
        assert_eq!(hue_name(33, 100), "Green");
        assert_eq!(hue_name(50, 100), "Cyan");
        assert_eq!(hue_name(66, 100), "Blue");
        assert_eq!(hue_name(80, 100), "Violet");
        assert_eq!(hue_name(90, 100), "Pink");
    }

    #[test]
    fn test_hue_scale_round_trip() {
        assert_eq!(hue_to_device(50), 180);
        assert_eq!(hue_from_device(180), 50);
        assert_eq!(hue_to_device(100), 359);
        assert_eq!(hue_from_device(359), 100);
        for hue in 0..=100u8 {
            let back = hue_from_device(i64::from(hue_to_device(hue)));
            assert!(back.abs_diff(hue) <= 1, "hue {} came back as {}", hue, back);
        }
    }

    #[test]
    fn test_clamps() {
        assert_eq!(clamp_kelvin(1000), 1700);
        assert_eq!(clamp_kelvin(9000), 6500);
        assert_eq!(clamp_kelvin(3000), 3000);
        assert_eq!(clamp_percent(-3), 0);
        assert_eq!(clamp_percent(140), 100);
    }

    #[test]
    fn test_state_apply_reports_changes() {
        let mut state = BulbState::default();
        assert!(state.apply(&Change::Level(40)));
        assert!(!state.apply(&Change::Level(40)));
        assert!(state.apply(&Change::Connectivity(Connectivity::Connected)));
        assert_eq!(state.level, Some(40));
        assert_eq!(state.connectivity, Connectivity::Connected);
    }
}
