use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// States the platform reports when it has no real reading for an entity.
const UNAVAILABLE_STATES: [&str; 2] = ["unknown", "unavailable"];

/// One entity as reported by the platform's state store.
///
/// Mirrors the objects returned by `GET /api/states`. Fields the control loop
/// does not read (`last_changed`, `context`, ...) are ignored on deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity ID (e.g., "cover.office_vent")
    pub entity_id: String,

    /// Raw state string ("on", "72.5", "heat", "unavailable", ...)
    pub state: String,

    /// Free-form attributes exposed by the entity
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl EntityRecord {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_attributes(mut self, attributes: serde_json::Value) -> Self {
        self.attributes = attributes;
        self
    }

    /// The substring before the first `.`, or `None` for a malformed ID.
    pub fn domain(&self) -> Option<&str> {
        domain_of(&self.entity_id)
    }

    /// False when the platform reports `unknown` or `unavailable`.
    pub fn is_available(&self) -> bool {
        !UNAVAILABLE_STATES.contains(&self.state.as_str())
    }

    /// Read a numeric attribute.
    ///
    /// Accepts JSON numbers and numeric strings; `null`, missing and
    /// non-numeric values yield `None`.
    pub fn attribute_f64(&self, name: &str) -> Option<f64> {
        let value = match self.attributes.get(name)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        value.filter(|v| v.is_finite())
    }

    /// Parse the state as a finite number, treating `unknown`/`unavailable` as absent.
    pub fn numeric_state(&self) -> Option<f64> {
        if !self.is_available() {
            return None;
        }
        self.state
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }
}

/// Split off the domain of an entity ID.
pub fn domain_of(entity_id: &str) -> Option<&str> {
    entity_id.split_once('.').map(|(domain, _)| domain)
}

/// All entity states fetched for a single cycle.
///
/// Keeps the fetch order so "first candidate" rules are stable, plus an index
/// for lookups by ID.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    records: Vec<EntityRecord>,
    index: HashMap<String, usize>,
}

impl Snapshot {
    pub fn new(records: Vec<EntityRecord>) -> Self {
        let mut index = HashMap::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            // First occurrence wins if the platform ever repeats an ID
            index.entry(record.entity_id.clone()).or_insert(i);
        }
        Self { records, index }
    }

    pub fn get(&self, entity_id: &str) -> Option<&EntityRecord> {
        self.index.get(entity_id).map(|&i| &self.records[i])
    }

    /// Insert or replace a record, keeping its original position if present.
    pub fn upsert(&mut self, record: EntityRecord) {
        match self.index.get(&record.entity_id) {
            Some(&i) => self.records[i] = record,
            None => {
                self.index
                    .insert(record.entity_id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    /// Drop a record; it no longer shows up in `get`, `domain` or `ids`.
    pub fn remove(&mut self, entity_id: &str) {
        if let Some(i) = self.index.remove(entity_id) {
            self.records.remove(i);
            for slot in self.index.values_mut() {
                if *slot > i {
                    *slot -= 1;
                }
            }
        }
    }

    /// Records in the given domain, in fetch order.
    pub fn domain<'a>(&'a self, domain: &'a str) -> impl Iterator<Item = &'a EntityRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| r.domain() == Some(domain))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.entity_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<EntityRecord> for Snapshot {
    fn from_iter<T: IntoIterator<Item = EntityRecord>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
