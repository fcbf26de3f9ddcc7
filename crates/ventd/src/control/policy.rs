//! Vent position policy.
//!
//! A pure decision table over occupancy, HVAC mode and temperature error.
//! Whenever information is missing, or the system is not actively heating or
//! cooling, an occupied room gets a fully open vent. Only an explicit
//! "unoccupied", "too hot" or "too cold" outcome may close one.

use std::fmt;

use super::room::Room;
use super::thermostat::HvacMode;
use super::thermostat::ThermostatSelection;

pub const OPEN: u8 = 100;
pub const BALANCED: u8 = 50;
pub const CLOSED: u8 = 0;

/// Default half-width of the band around the setpoint reported as balanced
pub const DEFAULT_DEADBAND: f64 = 0.5;

/// Why a position was chosen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    Unoccupied,
    NoTargetTemp,
    NoRoomTemp,
    TooHot,
    TooCold,
    Balanced,
    NotConditioning(HvacMode),
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Unoccupied => f.write_str("Default (Unoccupied)"),
            Reason::NoTargetTemp => f.write_str("Occupied, but no Target Temp (Default Open)"),
            Reason::NoRoomTemp => f.write_str("Occupied, but no Room Temp (Default Open)"),
            Reason::TooHot => f.write_str("Too Hot"),
            Reason::TooCold => f.write_str("Too Cold"),
            Reason::Balanced => f.write_str("Balanced"),
            Reason::NotConditioning(mode) => write!(f, "Occupied, HVAC Off/Fan Only ({})", mode),
        }
    }
}

/// Position for every vent of a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Open percentage, 0..=100
    pub position: u8,
    pub reason: Reason,
}

impl Decision {
    fn new(position: u8, reason: Reason) -> Self {
        Self { position, reason }
    }

    /// One command per vent, all at this position
    pub fn for_vents<'a, I>(&self, vent_ids: I) -> Vec<VentDecision>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let reason = self.reason.to_string();
        vent_ids
            .into_iter()
            .map(|vent_id| VentDecision {
                vent_id: vent_id.clone(),
                position: self.position,
                reason: reason.clone(),
            })
            .collect()
    }
}

/// Command for a single vent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VentDecision {
    pub vent_id: String,
    pub position: u8,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct Policy {
    /// Temperature errors within ±deadband (inclusive) are balanced
    pub deadband: f64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            deadband: DEFAULT_DEADBAND,
        }
    }
}

impl Policy {
    /// Decide a room's vent position
    pub fn decide(&self, room: &Room, thermostat: &ThermostatSelection) -> Decision {
        if !room.is_occupied {
            return Decision::new(CLOSED, Reason::Unoccupied);
        }
        let Some(target) = thermostat.target_temp else {
            return Decision::new(OPEN, Reason::NoTargetTemp);
        };
        let Some(current) = room.current_temp else {
            return Decision::new(OPEN, Reason::NoRoomTemp);
        };

        let diff = current - target;
        match thermostat.mode {
            HvacMode::Cool if diff > self.deadband => Decision::new(OPEN, Reason::TooHot),
            HvacMode::Cool if diff < -self.deadband => Decision::new(CLOSED, Reason::TooCold),
            HvacMode::Heat if diff < -self.deadband => Decision::new(OPEN, Reason::TooCold),
            HvacMode::Heat if diff > self.deadband => Decision::new(CLOSED, Reason::TooHot),
            HvacMode::Cool | HvacMode::Heat => Decision::new(BALANCED, Reason::Balanced),
            ref mode => Decision::new(OPEN, Reason::NotConditioning(mode.clone())),
        }
    }
}
