use crate::bulb::Bulb;
use crate::protocol::{Method, REFRESH_PROPERTIES};
use crate::types::{
    clamp_kelvin, clamp_percent, hue_name, hue_to_device, kelvin_name, Change, ColorMode, Switch,
    UpdateSource, MIN_TRANSITION,
};
use serde_json::{json, Value};
use std::time::Duration;

/// Saturation assumed for hue changes before any saturation is known
const DEFAULT_SATURATION: u8 = 100;

/// Target for [`Bulb::set_color`], on the 0-100 hub scale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorRequest {
    pub hue: i64,
    pub saturation: i64,
    /// Brightness to apply afterwards, as a separate command
    pub level: Option<i64>,
}

/// Transition duration in milliseconds for a command
///
/// An explicit rate is given in seconds; without one the endpoint default is
/// used. Either way the result is at least 30 ms.
pub fn resolve_transition(rate: Option<f64>, default: Duration) -> u64 {
    let floor = MIN_TRANSITION.as_millis() as u64;
    match rate {
        Some(seconds) if seconds.is_finite() && seconds > 0.0 => {
            ((seconds * 1000.0).round() as u64).max(floor)
        }
        Some(_) => floor,
        None => (default.as_millis() as u64).max(floor),
    }
}

// ========== Capability Commands ==========
//
// Every command updates the local state right away and queues its request
// without waiting for the bulb. The reply (or a later property push)
// confirms the state; failures never reach the caller.
impl Bulb {
    /// Turn the bulb on
    pub fn on(&self) {
        self.set_power(Switch::On);
    }

    /// Turn the bulb off
    pub fn off(&self) {
        self.set_power(Switch::Off);
    }

    fn set_power(&self, switch: Switch) {
        self.apply(vec![Change::Switch(switch)], UpdateSource::Optimistic);
        let duration = self.transition_ms(None);
        self.send(
            Method::SetPower,
            vec![json!(switch.as_str()), json!("smooth"), json!(duration)],
        );
    }

    /// Flip the power state; an unknown state is treated as off
    pub fn toggle(&self) {
        let previous = self.state().switch.unwrap_or(Switch::Off);
        self.apply(vec![Change::Switch(previous.flipped())], UpdateSource::Optimistic);
        self.send(Method::Toggle, vec![]);
    }

    /// Set brightness in percent, optionally with a transition `rate` in seconds
    ///
    /// The protocol has no zero brightness, so a level of 0 turns the bulb
    /// off instead.
    pub fn set_level(&self, level: i64, rate: Option<f64>) {
        let level = clamp_percent(level);
        if level == 0 {
            self.off();
            return;
        }

        self.apply(vec![Change::Level(level)], UpdateSource::Optimistic);
        let duration = self.transition_ms(rate);
        self.send(
            Method::SetBright,
            vec![json!(level), json!("smooth"), json!(duration)],
        );
    }

    /// Set hue (0-100), keeping the last known saturation
    pub fn set_hue(&self, hue: i64) {
        let hue = clamp_percent(hue);
        let saturation = self.state().saturation.unwrap_or(DEFAULT_SATURATION);
        self.apply(
            vec![
                Change::Hue(hue),
                Change::ColorMode(ColorMode::Hsv),
                Change::ColorName(hue_name(hue, saturation)),
            ],
            UpdateSource::Optimistic,
        );
        self.send_hsv(hue, saturation);
    }

    /// Set saturation (0-100), keeping the last known hue
    pub fn set_saturation(&self, saturation: i64) {
        let saturation = clamp_percent(saturation);
        let hue = self.state().hue.unwrap_or(0);
        self.apply(
            vec![
                Change::Saturation(saturation),
                Change::ColorMode(ColorMode::Hsv),
                Change::ColorName(hue_name(hue, saturation)),
            ],
            UpdateSource::Optimistic,
        );
        self.send_hsv(hue, saturation);
    }

    /// Set hue and saturation together, then the level if one is given
    ///
    /// The level change is a separate command and may land independently of
    /// the color change.
    pub fn set_color(&self, color: ColorRequest) {
        let hue = clamp_percent(color.hue);
        let saturation = clamp_percent(color.saturation);
        self.apply(
            vec![
                Change::Hue(hue),
                Change::Saturation(saturation),
                Change::ColorMode(ColorMode::Hsv),
                Change::ColorName(hue_name(hue, saturation)),
            ],
            UpdateSource::Optimistic,
        );
        self.send_hsv(hue, saturation);

        if let Some(level) = color.level {
            self.set_level(level, None);
        }
    }

    /// Set the white color temperature in kelvin (clamped to 1700-6500)
    ///
    /// A supplied level is applied with a separate [`Bulb::set_level`].
    pub fn set_color_temperature(&self, kelvin: i64, level: Option<i64>, rate: Option<f64>) {
        let kelvin = clamp_kelvin(kelvin);
        self.apply(
            vec![
                Change::ColorTemperature(kelvin),
                Change::ColorMode(ColorMode::ColorTemperature),
                Change::ColorName(kelvin_name(kelvin)),
            ],
            UpdateSource::Optimistic,
        );
        let duration = self.transition_ms(rate);
        self.send(
            Method::SetCtAbx,
            vec![json!(kelvin), json!("smooth"), json!(duration)],
        );

        if let Some(level) = level {
            self.set_level(level, rate);
        }
    }

    /// Ask the bulb for all tracked properties
    pub fn refresh(&self) {
        let names: Vec<Value> = REFRESH_PROPERTIES.iter().map(|name| json!(name)).collect();
        self.send(Method::GetProp, names);
    }

    /// Periodic poll; same as [`Bulb::refresh`]
    pub fn poll(&self) {
        self.refresh();
    }

    fn send_hsv(&self, hue: u8, saturation: u8) {
        let duration = self.transition_ms(None);
        self.send(
            Method::SetHsv,
            vec![
                json!(hue_to_device(hue)),
                json!(saturation),
                json!("smooth"),
                json!(duration),
            ],
        );
    }

    fn transition_ms(&self, rate: Option<f64>) -> u64 {
        resolve_transition(rate, self.endpoint().transition())
    }
}
