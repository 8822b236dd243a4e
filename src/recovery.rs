//! Compensation for commands the bulb rejects while powered off.
//!
//! A bulb that is off answers `set_ct_abx`, `set_hsv` and `set_bright` with
//! error -5000. Sending `set_power on` followed by the original command races
//! the bulb's own power-up, so instead a single `set_scene` is sent that turns
//! the bulb on and applies the intended setting together.

use crate::correlator::PendingCommand;
use crate::protocol::Method;
use crate::types::{clamp_kelvin, hue_to_device, BulbState, ColorMode, MAX_KELVIN};
use serde_json::{json, Value};

/// Guards against compensating a compensation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryGuard {
    #[default]
    Normal,
    /// A compensating scene command is in flight
    AwaitingCompensation,
}

impl RetryGuard {
    /// Whether a compensating scene is still unanswered
    pub fn is_awaiting(self) -> bool {
        self == RetryGuard::AwaitingCompensation
    }
}

/// Level used for a CT scene when brightness has never been reported
const FALLBACK_LEVEL: u8 = 100;

/// Build the `set_scene` params that replay `failed` with power-on
///
/// Returns `None` for methods that have no compensation; those failures are
/// only logged.
pub fn compensation_for(failed: &PendingCommand, state: &BulbState) -> Option<Vec<Value>> {
    if !failed.method.is_compensable() {
        return None;
    }

    let arg = |index: usize| failed.params.get(index).cloned();

    match failed.method {
        Method::SetCtAbx => {
            let kelvin = arg(0)?;
            let level = state.level.unwrap_or(FALLBACK_LEVEL);
            Some(vec![json!("ct"), kelvin, json!(level)])
        }
        Method::SetHsv => {
            let hue = arg(0)?;
            let saturation = arg(1)?;
            Some(vec![json!("hsv"), hue, saturation])
        }
        Method::SetBright => {
            let level = arg(0)?;
            if state.color_mode == Some(ColorMode::Hsv) {
                let hue = hue_to_device(state.hue.unwrap_or(0));
                let saturation = state.saturation.unwrap_or(0);
                Some(vec![json!("hsv"), json!(hue), json!(saturation)])
            } else {
                let kelvin = state
                    .color_temperature
                    .map_or(MAX_KELVIN, |k| clamp_kelvin(i64::from(k)));
                Some(vec![json!("ct"), json!(kelvin), level])
            }
        }
        _ => None,
    }
}
