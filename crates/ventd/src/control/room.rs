use std::collections::BTreeSet;

use tracing::debug;

use super::classify::Classification;
use crate::hass::Snapshot;

/// Per-room aggregate, rebuilt from scratch every cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub name: String,
    pub occupancy_sensor_ids: BTreeSet<String>,
    pub temp_sensor_ids: BTreeSet<String>,
    pub vent_ids: BTreeSet<String>,
    pub is_occupied: bool,
    pub current_temp: Option<f64>,
}

impl Room {
    /// Rooms without vents have nothing to actuate
    pub fn has_vents(&self) -> bool {
        !self.vent_ids.is_empty()
    }
}

/// Any occupancy sensor reading exactly `on`. Missing sensors don't count.
pub fn is_occupied<'a, I>(snapshot: &Snapshot, sensor_ids: I) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    sensor_ids
        .into_iter()
        .any(|id| snapshot.get(id).is_some_and(|r| r.state == "on"))
}

/// Mean of the readings that parse as finite numbers, if any do.
pub fn mean_temperature<'a, I>(snapshot: &Snapshot, sensor_ids: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a String>,
{
    let readings: Vec<f64> = sensor_ids
        .into_iter()
        .filter_map(|id| snapshot.get(id).and_then(|r| r.numeric_state()))
        .collect();

    if readings.is_empty() {
        return None;
    }
    Some(readings.iter().sum::<f64>() / readings.len() as f64)
}

/// Compute occupancy and temperature for every classified room.
///
/// Rooms without vents are still returned; callers filter with
/// [`Room::has_vents`].
pub fn aggregate(classification: &Classification, snapshot: &Snapshot) -> Vec<Room> {
    classification
        .iter()
        .map(|(name, entities)| {
            let room = Room {
                name: name.clone(),
                is_occupied: is_occupied(snapshot, &entities.occupancy_sensors),
                current_temp: mean_temperature(snapshot, &entities.temperature_sensors),
                occupancy_sensor_ids: entities.occupancy_sensors.clone(),
                temp_sensor_ids: entities.temperature_sensors.clone(),
                vent_ids: entities.vents.clone(),
            };
            if !room.has_vents() {
                debug!(
                    "Room '{}' has no vents (occupied={}, temp={:?}), not controlled",
                    room.name, room.is_occupied, room.current_temp
                );
            }
            room
        })
        .collect()
}
