//! Entity classification.
//!
//! Devices are grouped into rooms purely by naming convention. Each [`Rule`]
//! matches one `(domain, marker)` pair and derives a room key from what is
//! left of the ID once the domain prefix and marker are removed:
//!
//! ```text
//! binary_sensor.office_occupancy     -> occupancy   office
//! binary_sensor.office_2_occupancy   -> occupancy   office
//! sensor.office_temperature          -> temperature office
//! sensor.office_duct_temperature     -> (skipped: duct air)
//! cover.office_7a28_vent             -> vent        office
//! cover.office_2_vent                -> vent        office
//! ```
//!
//! Classification never looks at state or attributes.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use strum::Display;
use tracing::debug;

/// The part a device plays in its room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Occupancy,
    Temperature,
    Vent,
}

/// One naming convention: which IDs it claims and how it derives the room key.
pub struct Rule {
    pub role: Role,
    /// Entity domain (the part before the first `.`)
    pub domain: &'static str,
    /// Substring the object ID must contain
    pub marker: &'static str,
    /// Returns true for matching IDs that must be ignored; sees the full ID
    pub skip: fn(&str) -> bool,
    /// Derive the room key from the object ID with the marker removed
    pub key: fn(&str) -> Option<String>,
}

impl Rule {
    /// Apply this rule to an entity ID.
    ///
    /// `None` if the rule does not claim the ID, it is skipped, or no usable
    /// room key remains.
    pub fn apply(&self, entity_id: &str) -> Option<String> {
        let (domain, object_id) = entity_id.split_once('.')?;
        if domain != self.domain || !object_id.contains(self.marker) {
            return None;
        }
        if (self.skip)(entity_id) {
            return None;
        }

        let base = object_id.replace(self.marker, "");
        let key = (self.key)(&base)?;
        if key.is_empty() {
            debug!("No room name left in {}, ignoring it", entity_id);
            return None;
        }
        Some(key)
    }
}

/// Rules in evaluation order; the first rule that yields a key claims the ID.
pub static RULES: &[Rule] = &[
    Rule {
        role: Role::Occupancy,
        domain: "binary_sensor",
        marker: "_occupancy",
        skip: never,
        key: digit_suffix_key,
    },
    Rule {
        role: Role::Temperature,
        domain: "sensor",
        marker: "_temperature",
        skip: is_meta_temperature,
        key: ambient_temperature_key,
    },
    Rule {
        role: Role::Vent,
        domain: "cover",
        marker: "_vent",
        skip: never,
        key: vent_key,
    },
];

fn never(_: &str) -> bool {
    false
}

/// `holding_until` sensors are derived thermostat metadata, not readings.
fn is_meta_temperature(entity_id: &str) -> bool {
    entity_id.contains("holding_until")
}

fn digit_suffix_key(base: &str) -> Option<String> {
    Some(strip_digit_suffix(base).to_string())
}

/// Duct sensors measure supply air, not the room.
fn ambient_temperature_key(base: &str) -> Option<String> {
    if base.contains("_duct") {
        return None;
    }
    digit_suffix_key(base)
}

fn vent_key(base: &str) -> Option<String> {
    Some(strip_vent_disambiguators(base))
}

/// Strip a trailing `_<digit>` disambiguator (`office_2` -> `office`).
///
/// Keys shorter than two bytes are returned unchanged.
pub fn strip_digit_suffix(key: &str) -> &str {
    match key.as_bytes() {
        [.., b'_', d] if d.is_ascii_digit() => &key[..key.len() - 2],
        _ => key,
    }
}

/// Strip vent naming noise from a key.
///
/// A trailing single-digit token is dropped, then a trailing four-character
/// token (a device id fragment such as `7a28`), as long as at least one token
/// is left:
/// `office_2` -> `office`, `office_7a28` -> `office`, `office_7a28_2` -> `office`.
pub fn strip_vent_disambiguators(key: &str) -> String {
    let mut tokens: Vec<&str> = key.split('_').collect();

    if tokens
        .last()
        .is_some_and(|t| t.len() == 1 && t.bytes().all(|b| b.is_ascii_digit()))
    {
        tokens.pop();
    }

    if tokens.len() > 1 && tokens.last().is_some_and(|t| t.chars().count() == 4) {
        tokens.pop();
    }

    tokens.join("_")
}

/// Device IDs belonging to one room
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomEntities {
    pub occupancy_sensors: BTreeSet<String>,
    pub temperature_sensors: BTreeSet<String>,
    pub vents: BTreeSet<String>,
}

impl RoomEntities {
    fn insert(&mut self, role: Role, entity_id: &str) {
        let set = match role {
            Role::Occupancy => &mut self.occupancy_sensors,
            Role::Temperature => &mut self.temperature_sensors,
            Role::Vent => &mut self.vents,
        };
        set.insert(entity_id.to_string());
    }
}

/// Room key -> devices, ordered by room name
pub type Classification = BTreeMap<String, RoomEntities>;

/// Classify a single entity ID against a rule table
pub fn classify_one(rules: &[Rule], entity_id: &str) -> Option<(Role, String)> {
    rules
        .iter()
        .find_map(|rule| rule.apply(entity_id).map(|key| (rule.role, key)))
}

/// Group entity IDs into rooms using [`RULES`]
pub fn classify<'a, I>(entity_ids: I) -> Classification
where
    I: IntoIterator<Item = &'a str>,
{
    classify_with(RULES, entity_ids)
}

/// Group entity IDs into rooms using a custom rule table
pub fn classify_with<'a, I>(rules: &[Rule], entity_ids: I) -> Classification
where
    I: IntoIterator<Item = &'a str>,
{
    let mut rooms = Classification::new();

    for entity_id in entity_ids {
        if let Some((role, room)) = classify_one(rules, entity_id) {
            debug!("Classified {} as {} in room '{}'", entity_id, role, room);
            rooms.entry(room).or_default().insert(role, entity_id);
        }
    }

    rooms
}
