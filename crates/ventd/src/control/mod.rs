//! Vent control.
//!
//! Each cycle turns a platform snapshot into one position per vent:
//! [`classify`] groups entity ids into rooms, [`thermostat`] picks the HVAC
//! state, [`room`] aggregates sensors, [`policy`] decides and [`actuate`]
//! sends the commands. [`cycle`] drives the sequence.

pub mod actuate;
pub mod classify;
pub mod cycle;
pub mod policy;
pub mod room;
pub mod thermostat;

pub use actuate::Actuation;
pub use actuate::DispatchResult;
pub use classify::classify;
pub use classify::Classification;
pub use classify::Role;
pub use classify::RoomEntities;
pub use classify::Rule;
pub use classify::RULES;
pub use cycle::Controller;
pub use cycle::CycleReport;
pub use cycle::CycleSummary;
pub use cycle::RoomReport;
pub use cycle::SensorSource;
pub use policy::Decision;
pub use policy::Policy;
pub use policy::Reason;
pub use policy::VentDecision;
pub use room::Room;
pub use thermostat::HvacMode;
pub use thermostat::ThermostatSelection;
pub use thermostat::ThermostatSelector;
