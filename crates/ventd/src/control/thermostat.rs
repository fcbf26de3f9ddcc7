//! Thermostat selection.
//!
//! Several climate entities may exist (zoned thermostats, a disconnected old
//! unit, an integration's virtual thermostat). One is chosen per cycle and
//! supplies the HVAC mode and target temperature for every room.

use std::fmt;

use tracing::info;

use crate::hass::EntityRecord;

/// HVAC operating mode reported by the selected climate entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HvacMode {
    Heat,
    Cool,
    HeatCool,
    Off,
    FanOnly,
    Unavailable,
    Unknown,
    /// A platform mode without dedicated handling (e.g. "auto", "dry")
    Other(String),
}

impl HvacMode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::HeatCool => "heat_cool",
            Self::Off => "off",
            Self::FanOnly => "fan_only",
            Self::Unavailable => "unavailable",
            Self::Unknown => "unknown",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for HvacMode {
    fn from(s: &str) -> Self {
        match s {
            "heat" => Self::Heat,
            "cool" => Self::Cool,
            "heat_cool" => Self::HeatCool,
            "off" => Self::Off,
            "fan_only" => Self::FanOnly,
            "unavailable" => Self::Unavailable,
            "unknown" => Self::Unknown,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Mode and setpoint driving this cycle's decisions
#[derive(Debug, Clone, PartialEq)]
pub struct ThermostatSelection {
    /// The climate entity the values came from; `None` when none exists
    pub entity_id: Option<String>,
    pub mode: HvacMode,
    pub target_temp: Option<f64>,
}

impl ThermostatSelection {
    /// Used when the platform exposes no climate entity at all
    pub fn fallback(default_target_temp: f64) -> Self {
        Self {
            entity_id: None,
            mode: HvacMode::Off,
            target_temp: Some(default_target_temp),
        }
    }
}

/// Picks the authoritative climate entity
#[derive(Debug, Clone)]
pub struct ThermostatSelector {
    /// Preferred climate entity, used whenever it is present
    pub primary: Option<String>,
    /// Target used only when no climate entity exists
    pub default_target_temp: f64,
}

impl ThermostatSelector {
    /// Select from the climate-domain records, in fetch order.
    ///
    /// 1. The configured primary thermostat, whatever its state.
    /// 2. The first candidate that is neither `unavailable` nor `unknown`.
    /// 3. The first candidate.
    /// 4. [`ThermostatSelection::fallback`].
    pub fn select(&self, candidates: &[&EntityRecord]) -> ThermostatSelection {
        if candidates.len() > 1 {
            info!(
                "Found {} climate entities: {}",
                candidates.len(),
                candidates
                    .iter()
                    .map(|c| c.entity_id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        let primary = self
            .primary
            .as_deref()
            .and_then(|id| candidates.iter().find(|c| c.entity_id == id));

        let chosen = primary
            .or_else(|| candidates.iter().find(|c| c.is_available()))
            .or_else(|| candidates.first());

        let Some(record) = chosen else {
            return ThermostatSelection::fallback(self.default_target_temp);
        };

        let mode = HvacMode::from(record.state.as_str());
        let target_temp = target_temperature(record, &mode);

        info!(
            "Using thermostat {} (mode: {}, target: {})",
            record.entity_id,
            mode,
            target_temp
                .map(|t| format!("{:.1}", t))
                .unwrap_or_else(|| "none".to_string())
        );

        ThermostatSelection {
            entity_id: Some(record.entity_id.clone()),
            mode,
            target_temp,
        }
    }
}

/// A single `temperature` setpoint, or the midpoint of the heat/cool range
/// when running in `heat_cool`.
fn target_temperature(record: &EntityRecord, mode: &HvacMode) -> Option<f64> {
    if let Some(t) = record.attribute_f64("temperature") {
        return Some(t);
    }

    if *mode != HvacMode::HeatCool {
        return None;
    }

    // Zero setpoints are treated as absent
    let high = record.attribute_f64("target_temp_high").filter(|t| *t != 0.0)?;
    let low = record.attribute_f64("target_temp_low").filter(|t| *t != 0.0)?;
    Some((high + low) / 2.0)
}
