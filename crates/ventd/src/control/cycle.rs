use std::fmt;

use serde::Deserialize;
use strum::Display;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::actuate;
use super::actuate::DispatchResult;
use super::classify::classify;
use super::classify::Classification;
use super::policy::Policy;
use super::policy::VentDecision;
use super::room::aggregate;
use super::room::Room;
use super::thermostat::ThermostatSelection;
use super::thermostat::ThermostatSelector;
use crate::config::ControlConfig;
use crate::hass::EntityRecord;
use crate::hass::HomeAssistant;
use crate::hass::Snapshot;

/// Where sensor readings are taken from
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SensorSource {
    /// Read sensors from the bulk state fetch
    #[default]
    Snapshot,
    /// Re-query each sensor of a controlled room individually
    Entity,
}

/// One controlled room's outcome, rendered as the per-room log line
#[derive(Debug, Clone, PartialEq)]
pub struct RoomReport {
    pub name: String,
    pub occupied: bool,
    pub temp: Option<f64>,
    pub position: u8,
    pub reason: String,
}

impl fmt::Display for RoomReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: occupied={} temp=", self.name, self.occupied)?;
        match self.temp {
            Some(t) => write!(f, "{:.1}", t)?,
            None => f.write_str("none")?,
        }
        write!(f, " position={}% reason=\"{}\"", self.position, self.reason)
    }
}

/// Everything decided in one completed cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary {
    pub thermostat: ThermostatSelection,
    pub rooms: Vec<RoomReport>,
    pub decisions: Vec<VentDecision>,
    pub dispatch: DispatchResult,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleReport {
    /// The state fetch failed; nothing was decided or sent
    Skipped { error: String },
    Completed(CycleSummary),
}

impl CycleReport {
    pub fn summary(&self) -> Option<&CycleSummary> {
        match self {
            CycleReport::Completed(summary) => Some(summary),
            CycleReport::Skipped { .. } => None,
        }
    }
}

/// Vent controller
///
/// Runs fetch → classify → select → aggregate → decide → actuate, one cycle
/// at a time. Nothing carries over between cycles.
pub struct Controller<H> {
    client: H,
    config: ControlConfig,
    policy: Policy,
    selector: ThermostatSelector,
}

impl<H: HomeAssistant> Controller<H> {
    pub fn new(client: H, config: ControlConfig) -> Self {
        let policy = Policy {
            deadband: config.deadband,
        };
        let selector = ThermostatSelector {
            primary: config.primary_thermostat.clone(),
            default_target_temp: config.default_target_temp,
        };
        Self {
            client,
            config,
            policy,
            selector,
        }
    }

    pub fn client(&self) -> &H {
        &self.client
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Run cycles until shutdown.
    ///
    /// A zero interval runs exactly one cycle. Otherwise the controller sleeps
    /// `interval` after each cycle completes; shutdown is only observed while
    /// sleeping, never mid-cycle.
    pub async fn run(&self, mut shutdown_rx: oneshot::Receiver<()>) {
        let interval = self.config.interval;
        info!(
            "Controller starting (interval: {}s, dry run: {}, actuation: {}, sensors: {})",
            interval.as_secs(),
            self.config.dry_run,
            self.config.actuation,
            self.config.sensor_source
        );

        loop {
            self.run_cycle().await;

            if interval.is_zero() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = &mut shutdown_rx => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        info!("Controller stopped");
    }

    /// Run a single cycle. Failures are logged and reported, never returned.
    pub async fn run_cycle(&self) -> CycleReport {
        let records = match self.client.fetch_all_states().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to fetch states, skipping cycle: {}", e);
                return CycleReport::Skipped {
                    error: e.to_string(),
                };
            }
        };

        let mut snapshot = Snapshot::new(records);
        debug!("Fetched {} entity states", snapshot.len());

        let classification = classify(snapshot.ids());
        let thermostat = {
            let climate: Vec<&EntityRecord> = snapshot.domain("climate").collect();
            self.selector.select(&climate)
        };

        if self.config.sensor_source == SensorSource::Entity {
            self.refresh_sensors(&mut snapshot, &classification).await;
        }

        let rooms: Vec<Room> = aggregate(&classification, &snapshot)
            .into_iter()
            .filter(Room::has_vents)
            .collect();

        let mut reports = Vec::with_capacity(rooms.len());
        let mut decisions = Vec::new();
        for room in &rooms {
            let decision = self.policy.decide(room, &thermostat);
            let report = RoomReport {
                name: room.name.clone(),
                occupied: room.is_occupied,
                temp: room.current_temp,
                position: decision.position,
                reason: decision.reason.to_string(),
            };
            info!(target: "ventd::decision", "{}", report);

            decisions.extend(decision.for_vents(&room.vent_ids));
            reports.push(report);
        }

        let dispatch = if self.config.dry_run {
            DispatchResult::default()
        } else {
            actuate::dispatch(&self.client, self.config.actuation, &decisions).await
        };

        info!(
            "Cycle complete: {} rooms, {} vents, {} commands sent, {} failed{}",
            reports.len(),
            decisions.len(),
            dispatch.sent,
            dispatch.failed,
            if self.config.dry_run { " (dry run)" } else { "" }
        );

        CycleReport::Completed(CycleSummary {
            thermostat,
            rooms: reports,
            decisions,
            dispatch,
            dry_run: self.config.dry_run,
        })
    }

    /// Replace snapshot readings of controlled rooms' sensors with fresh
    /// single-entity reads. Sensors that can't be read are dropped.
    async fn refresh_sensors(&self, snapshot: &mut Snapshot, classification: &Classification) {
        let sensor_ids: Vec<&String> = classification
            .values()
            .filter(|room| !room.vents.is_empty())
            .flat_map(|room| room.occupancy_sensors.iter().chain(&room.temperature_sensors))
            .collect();

        for id in sensor_ids {
            match self.client.fetch_state(id).await {
                Ok(Some(record)) => snapshot.upsert(record),
                Ok(None) => {
                    debug!("Sensor {} no longer exists", id);
                    snapshot.remove(id);
                }
                Err(e) => {
                    warn!("Failed to read {}, ignoring it this cycle: {}", id, e);
                    snapshot.remove(id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use insta::assert_snapshot;
    use serde_json::json;

    use super::*;
    use crate::control::actuate::Actuation;
    use crate::hass::MockHomeAssistant;

    fn config() -> ControlConfig {
        ControlConfig {
            interval: Duration::ZERO,
            ..ControlConfig::default()
        }
    }

    fn house() -> Vec<EntityRecord> {
        vec![
            EntityRecord::new("climate.main_floor", "cool")
                .with_attributes(json!({"temperature": 74})),
            EntityRecord::new("binary_sensor.office_occupancy", "on"),
            EntityRecord::new("sensor.office_temperature", "75.0"),
            EntityRecord::new("cover.office_vent", "open"),
            EntityRecord::new("cover.office_7a28_vent", "open"),
            EntityRecord::new("binary_sensor.den_occupancy", "off"),
            EntityRecord::new("sensor.den_temperature", "78.0"),
            EntityRecord::new("cover.den_vent", "open"),
            EntityRecord::new("binary_sensor.hallway_occupancy", "on"),
        ]
    }

    #[test]
    fn test_room_report_line() {
        let report = RoomReport {
            name: "office".to_string(),
            occupied: true,
            temp: Some(74.3),
            position: 50,
            reason: "Balanced".to_string(),
        };
        assert_snapshot!(report.to_string(), @r#"office: occupied=true temp=74.3 position=50% reason="Balanced""#);

        let report = RoomReport {
            name: "den".to_string(),
            occupied: false,
            temp: None,
            position: 0,
            reason: "Default (Unoccupied)".to_string(),
        };
        assert_snapshot!(report.to_string(), @r#"den: occupied=false temp=none position=0% reason="Default (Unoccupied)""#);
    }

    #[tokio::test]
    async fn test_cycle_decides_and_actuates() {
        let controller = Controller::new(MockHomeAssistant::new(house()), config());

        let report = controller.run_cycle().await;
        let summary = report.summary().unwrap();

        // hallway has no vents and is not controlled
        let rooms: Vec<_> = summary.rooms.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(rooms, vec!["den", "office"]);
        assert_eq!(summary.rooms[0].position, 0);
        assert_eq!(summary.rooms[1].position, 100);
        assert_eq!(summary.rooms[1].reason, "Too Hot");

        let calls = controller.client().calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(summary.dispatch, DispatchResult { sent: 3, failed: 0 });
        assert!(calls.iter().all(|c| c.service == "set_cover_position"));
    }

    #[tokio::test]
    async fn test_dry_run_sends_nothing() {
        let live = Controller::new(MockHomeAssistant::new(house()), config());
        let dry = Controller::new(
            MockHomeAssistant::new(house()),
            ControlConfig {
                dry_run: true,
                ..config()
            },
        );

        let live_summary = live.run_cycle().await.summary().cloned().unwrap();
        let dry_summary = dry.run_cycle().await.summary().cloned().unwrap();

        assert!(dry.client().calls().is_empty());
        assert_eq!(dry_summary.dispatch, DispatchResult::default());
        assert_eq!(live_summary.rooms, dry_summary.rooms);
        assert_eq!(live_summary.decisions, dry_summary.decisions);
    }

    #[tokio::test]
    async fn test_identical_cycles_identical_decisions() {
        let controller = Controller::new(MockHomeAssistant::new(house()), config());

        let first = controller.run_cycle().await;
        let second = controller.run_cycle().await;
        assert_eq!(
            first.summary().unwrap().decisions,
            second.summary().unwrap().decisions
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_cycle() {
        let client = MockHomeAssistant {
            states: house(),
            fail_fetch: true,
            ..Default::default()
        };
        let controller = Controller::new(client, config());

        let report = controller.run_cycle().await;
        assert!(matches!(report, CycleReport::Skipped { .. }));
        assert!(controller.client().calls().is_empty());
    }

    #[tokio::test]
    async fn test_tilt_actuation() {
        let controller = Controller::new(
            MockHomeAssistant::new(house()),
            ControlConfig {
                actuation: Actuation::Tilt,
                ..config()
            },
        );

        controller.run_cycle().await;
        let calls = controller.client().calls();
        assert!(calls.iter().all(|c| c.service == "set_cover_tilt_position"));
    }

    #[tokio::test]
    async fn test_entity_source_requeries_sensors() {
        let client = MockHomeAssistant {
            states: house(),
            fail_entities: vec!["sensor.office_temperature".to_string()],
            ..Default::default()
        };
        let controller = Controller::new(
            client,
            ControlConfig {
                sensor_source: SensorSource::Entity,
                ..config()
            },
        );

        let report = controller.run_cycle().await;
        let summary = report.summary().unwrap();

        let fetched = controller.client().single_fetches.lock().unwrap().clone();
        assert!(fetched.contains(&"binary_sensor.office_occupancy".to_string()));
        assert!(fetched.contains(&"sensor.den_temperature".to_string()));
        // hallway has no vents, so its sensor is not re-read
        assert!(!fetched.contains(&"binary_sensor.hallway_occupancy".to_string()));

        // The unreadable office sensor leaves the room without a temperature
        let office = summary.rooms.iter().find(|r| r.name == "office").unwrap();
        assert_eq!(office.temp, None);
        assert_eq!(office.position, 100);
        assert_eq!(office.reason, "Occupied, but no Room Temp (Default Open)");
    }

    #[tokio::test]
    async fn test_no_thermostat_uses_defaults() {
        let states: Vec<_> = house()
            .into_iter()
            .filter(|r| r.domain() != Some("climate"))
            .collect();
        let controller = Controller::new(MockHomeAssistant::new(states), config());

        let report = controller.run_cycle().await;
        let summary = report.summary().unwrap();
        assert_eq!(summary.thermostat, ThermostatSelection::fallback(22.0));

        let office = summary.rooms.iter().find(|r| r.name == "office").unwrap();
        assert_eq!(office.reason, "Occupied, HVAC Off/Fan Only (off)");
    }

    #[tokio::test]
    async fn test_zero_interval_runs_once() {
        let controller = Controller::new(MockHomeAssistant::new(house()), config());
        let (_tx, rx) = oneshot::channel();

        controller.run(rx).await;
        assert_eq!(*controller.client().fetch_count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_between_cycles() {
        let controller = Controller::new(
            MockHomeAssistant::new(house()),
            ControlConfig {
                interval: Duration::from_secs(3600),
                ..config()
            },
        );
        let (tx, rx) = oneshot::channel();
        tx.send(()).unwrap();

        controller.run(rx).await;
        assert_eq!(*controller.client().fetch_count.lock().unwrap(), 1);
    }
}
