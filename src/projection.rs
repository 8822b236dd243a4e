//! Translation of device property values into canonical state changes.

use crate::types::{
    clamp_kelvin, clamp_percent, hue_from_device, hue_name, kelvin_name, Change, ColorMode, Switch,
};
use serde_json::{Map, Value};

/// Turn a property map (from a notification or a zipped query reply) into
/// canonical state changes
///
/// Every key is handled on its own, so the result does not depend on key
/// order and re-delivering the same map yields the same changes. Values the
/// device reports as zero for `ct`, `rgb`, `hue` and `sat` mean "not in this
/// mode" and are skipped, as are values that cannot be read as integers.
///
/// At most one color name is produced. When both `ct` and `rgb` are present
/// the reported `color_mode` decides which of them names the color; without
/// a mode the `rgb` reading wins.
pub fn project(props: &Map<String, Value>) -> Vec<Change> {
    let mut changes = Vec::new();
    let mut mode = None;
    let mut kelvin_label = None;
    let mut hue_label = None;

    for (name, value) in props {
        match name.as_str() {
            "power" => {
                let switch = if value.as_str() == Some("on") {
                    Switch::On
                } else {
                    Switch::Off
                };
                changes.push(Change::Switch(switch));
            }
            "bright" => {
                if let Some(level) = coerce_int(value) {
                    changes.push(Change::Level(clamp_percent(level)));
                }
            }
            "ct" => {
                if let Some(kelvin) = coerce_int(value).filter(|&k| k != 0) {
                    let kelvin = clamp_kelvin(kelvin);
                    changes.push(Change::ColorTemperature(kelvin));
                    kelvin_label = Some(kelvin_name(kelvin));
                }
            }
            "rgb" => {
                if let Some(rgb) = coerce_int(value).filter(|&v| v != 0) {
                    let (hue, saturation) = rgb_to_hue_saturation(rgb);
                    changes.push(Change::Hue(hue));
                    changes.push(Change::Saturation(saturation));
                    hue_label = Some(hue_name(hue, saturation));
                }
            }
            "hue" => {
                if let Some(hue) = coerce_int(value).filter(|&v| v != 0) {
                    changes.push(Change::Hue(hue_from_device(hue)));
                }
            }
            "sat" => {
                if let Some(saturation) = coerce_int(value).filter(|&v| v != 0) {
                    changes.push(Change::Saturation(clamp_percent(saturation)));
                }
            }
            "color_mode" => {
                if let Some(code) = coerce_int(value) {
                    let color_mode = ColorMode::from_code(code);
                    mode = Some(color_mode);
                    changes.push(Change::ColorMode(color_mode));
                }
            }
            other => {
                tracing::debug!("Ignoring property {}={}", other, value);
            }
        }
    }

    let name = match mode {
        Some(ColorMode::ColorTemperature) => kelvin_label.or(hue_label),
        _ => hue_label.or(kelvin_label),
    };
    changes.extend(name.map(Change::ColorName));

    changes
}

/// Read an integer from a JSON number or a numeric string
///
/// The bulb reports every property as a string in query replies but as a
/// number in notifications.
fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.round() as i64))
        }
        _ => None,
    }
}

/// Convert a packed 0xRRGGBB value to hue and saturation on the 0-100 scale
pub fn rgb_to_hue_saturation(rgb: i64) -> (u8, u8) {
    let r = ((rgb >> 16) & 0xff) as f64 / 255.0;
    let g = ((rgb >> 8) & 0xff) as f64 / 255.0;
    let b = (rgb & 0xff) as f64 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let degrees = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    (
        clamp_percent((degrees / 3.6).round() as i64),
        clamp_percent((saturation * 100.0).round() as i64),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_power() {
        assert_eq!(project(&props(json!({"power": "on"}))), vec![Change::Switch(Switch::On)]);
        assert_eq!(project(&props(json!({"power": "off"}))), vec![Change::Switch(Switch::Off)]);
        assert_eq!(project(&props(json!({"power": 1}))), vec![Change::Switch(Switch::Off)]);
    }

    #[test]
    fn test_bright_coercion() {
        assert_eq!(project(&props(json!({"bright": "80"}))), vec![Change::Level(80)]);
        assert_eq!(project(&props(json!({"bright": 35}))), vec![Change::Level(35)]);
        assert!(project(&props(json!({"bright": "dim"}))).is_empty());
        assert!(project(&props(json!({"bright": null}))).is_empty());
    }

    #[test]
    fn test_ct_in_range_and_named() {
        for kelvin in [1700u16, 2000, 2700, 3300, 4000, 4800, 5600, 6500] {
            let changes = project(&props(json!({ "ct": kelvin.to_string() })));
            assert_eq!(
                changes,
                vec![
                    Change::ColorTemperature(kelvin),
                    Change::ColorName(kelvin_name(kelvin)),
                ]
            );
        }
    }

    #[test]
    fn test_ct_clamped_and_zero_ignored() {
        assert_eq!(
            project(&props(json!({"ct": 9000}))),
            vec![Change::ColorTemperature(6500), Change::ColorName("Bright Daylight")]
        );
        assert!(project(&props(json!({"ct": "0"}))).is_empty());
        assert!(project(&props(json!({"ct": "warm"}))).is_empty());
    }

    #[test]
    fn test_rgb_conversion() {
        assert_eq!(rgb_to_hue_saturation(0xff0000), (0, 100));
        assert_eq!(rgb_to_hue_saturation(0x00ff00), (33, 100));
        assert_eq!(rgb_to_hue_saturation(0x0000ff), (67, 100));
        assert_eq!(rgb_to_hue_saturation(0xffffff), (0, 0));
        assert_eq!(rgb_to_hue_saturation(0xff8080), (0, 50));

        assert_eq!(
            project(&props(json!({"rgb": "255"}))),
            vec![Change::Hue(67), Change::Saturation(100), Change::ColorName("Blue")]
        );
        assert!(project(&props(json!({"rgb": 0}))).is_empty());
    }

    #[test]
    fn test_hue_and_sat() {
        assert_eq!(project(&props(json!({"hue": "180"}))), vec![Change::Hue(50)]);
        assert_eq!(project(&props(json!({"sat": 42}))), vec![Change::Saturation(42)]);
        assert!(project(&props(json!({"hue": "x", "sat": []}))).is_empty());
    }

    #[test]
    fn test_color_mode_codes() {
        let mode = |code: Value| project(&props(json!({ "color_mode": code })));
        assert_eq!(mode(json!("1")), vec![Change::ColorMode(ColorMode::Rgb)]);
        assert_eq!(mode(json!(2)), vec![Change::ColorMode(ColorMode::ColorTemperature)]);
        assert_eq!(mode(json!("3")), vec![Change::ColorMode(ColorMode::Hsv)]);
        assert_eq!(mode(json!(7)), vec![Change::ColorMode(ColorMode::ColorTemperature)]);
        assert!(mode(json!("none")).is_empty());
    }

    #[test]
    fn test_full_refresh_reply() {
        let changes = project(&props(json!({
            "power": "on", "bright": "80", "ct": "4000", "rgb": "0",
            "hue": "0", "sat": "0", "color_mode": "2"
        })));

        assert_eq!(changes.len(), 5);
        assert!(changes.contains(&Change::Switch(Switch::On)));
        assert!(changes.contains(&Change::Level(80)));
        assert!(changes.contains(&Change::ColorTemperature(4000)));
        assert!(changes.contains(&Change::ColorName("Neutral White")));
        assert!(changes.contains(&Change::ColorMode(ColorMode::ColorTemperature)));
    }

    #[test]
    fn test_color_name_follows_reported_mode() {
        let reply = |mode: &str| {
            project(&props(json!({
                "power": "on", "bright": "80", "ct": "4000", "rgb": "16711680",
                "hue": "0", "sat": "0", "color_mode": mode
            })))
        };
        let names = |changes: Vec<Change>| {
            changes
                .into_iter()
                .filter(|c| matches!(c, Change::ColorName(_)))
                .collect::<Vec<_>>()
        };

        assert_eq!(names(reply("2")), vec![Change::ColorName("Neutral White")]);
        assert_eq!(names(reply("1")), vec![Change::ColorName("Red")]);
        assert_eq!(names(reply("3")), vec![Change::ColorName("Red")]);

        // no mode reported: the rgb reading names the color
        let changes = project(&props(json!({"ct": 2700, "rgb": 255})));
        assert_eq!(names(changes), vec![Change::ColorName("Blue")]);
    }

    #[test]
    fn test_unknown_properties_ignored() {
        assert!(project(&props(json!({"flowing": "0", "name": "desk"}))).is_empty());
    }
}
