//! Whole control cycles against an in-memory Home Assistant.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use ventd::control::Actuation;
use ventd::control::CycleSummary;
use ventd::hass::Error;
use ventd::hass::ServiceParams;
use ventd::ControlConfig;
use ventd::Controller;
use ventd::CycleReport;
use ventd::EntityRecord;
use ventd::HomeAssistant;

#[derive(Debug, Clone, PartialEq)]
struct Call {
    service: String,
    entity_id: String,
    params: ServiceParams,
}

/// Platform whose covers move when told to, like the real thing
#[derive(Default)]
struct FakeHome {
    states: Mutex<Vec<EntityRecord>>,
    offline: AtomicBool,
    calls: Mutex<Vec<Call>>,
}

impl FakeHome {
    fn new(states: Vec<EntityRecord>) -> Self {
        Self {
            states: Mutex::new(states),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn position_of(&self, entity_id: &str) -> Option<u64> {
        self.calls()
            .iter()
            .rev()
            .find(|c| c.entity_id == entity_id)
            .and_then(|c| c.params.get("position").and_then(|p| p.as_u64()))
    }

    fn outage() -> Error {
        Error::Status {
            url: "http://fake/api/states".to_string(),
            status: 502,
        }
    }
}

#[async_trait]
impl HomeAssistant for FakeHome {
    async fn fetch_all_states(&self) -> Result<Vec<EntityRecord>, Error> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        Ok(self.states.lock().unwrap().clone())
    }

    async fn fetch_state(&self, entity_id: &str) -> Result<Option<EntityRecord>, Error> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Self::outage());
        }
        Ok(self
            .states
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.entity_id == entity_id)
            .cloned())
    }

    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        entity_id: &str,
        params: ServiceParams,
    ) -> Result<(), Error> {
        assert_eq!(domain, "cover");

        let position = params
            .get("position")
            .or_else(|| params.get("tilt_position"))
            .and_then(|p| p.as_u64())
            .unwrap_or_default();
        if let Some(record) = self
            .states
            .lock()
            .unwrap()
            .iter_mut()
            .find(|r| r.entity_id == entity_id)
        {
            record.state = if position == 0 { "closed" } else { "open" }.to_string();
            record.attributes = json!({ "current_position": position });
        }

        self.calls.lock().unwrap().push(Call {
            service: service.to_string(),
            entity_id: entity_id.to_string(),
            params,
        });
        Ok(())
    }
}

fn once() -> ControlConfig {
    ControlConfig {
        interval: Duration::ZERO,
        ..ControlConfig::default()
    }
}

fn thermostat(id: &str, mode: &str, target: f64) -> EntityRecord {
    EntityRecord::new(id, mode).with_attributes(json!({ "temperature": target }))
}

fn house(mode: &str, target: f64) -> Vec<EntityRecord> {
    vec![
        thermostat("climate.main_floor", mode, target),
        EntityRecord::new("binary_sensor.office_occupancy", "off"),
        EntityRecord::new("binary_sensor.office_2_occupancy", "on"),
        EntityRecord::new("sensor.office_temperature", "70.0"),
        EntityRecord::new("sensor.office_2_temperature", "unknown"),
        EntityRecord::new("sensor.office_3_temperature", "74.0"),
        EntityRecord::new("sensor.office_duct_temperature", "55.0"),
        EntityRecord::new("cover.office_vent", "open"),
        EntityRecord::new("cover.office_2_vent", "open"),
        EntityRecord::new("cover.office_7a28_vent", "open"),
        EntityRecord::new("binary_sensor.bedroom_occupancy", "off"),
        EntityRecord::new("sensor.bedroom_temperature", "80.0"),
        EntityRecord::new("cover.bedroom_vent", "open"),
        EntityRecord::new("binary_sensor.kitchen_occupancy", "on"),
        EntityRecord::new("sensor.kitchen_temperature", "71.0"),
    ]
}

async fn run(controller: &Controller<FakeHome>) -> CycleSummary {
    match controller.run_cycle().await {
        CycleReport::Completed(summary) => summary,
        CycleReport::Skipped { error } => panic!("cycle skipped: {}", error),
    }
}

#[tokio::test]
async fn test_vent_variants_share_a_room() {
    let controller = Controller::new(FakeHome::new(house("cool", 71.0)), once());
    let summary = run(&controller).await;

    let rooms: Vec<_> = summary.rooms.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(rooms, vec!["bedroom", "office"]);

    let office: Vec<_> = summary
        .decisions
        .iter()
        .filter(|d| d.vent_id.starts_with("cover.office"))
        .collect();
    assert_eq!(office.len(), 3);
    assert!(office.iter().all(|d| d.position == 100));

    let client = controller.client();
    assert_eq!(client.position_of("cover.office_vent"), Some(100));
    assert_eq!(client.position_of("cover.office_2_vent"), Some(100));
    assert_eq!(client.position_of("cover.office_7a28_vent"), Some(100));
    assert_eq!(client.position_of("cover.bedroom_vent"), Some(0));
}

#[tokio::test]
async fn test_duct_sensor_excluded_from_room_temperature() {
    let controller = Controller::new(FakeHome::new(house("heat", 70.0)), once());
    let summary = run(&controller).await;

    let office = summary.rooms.iter().find(|r| r.name == "office").unwrap();
    assert_eq!(office.temp, Some(72.0));
    assert!(office.occupied);
    assert_eq!(office.position, 0);
    assert_eq!(office.reason, "Too Hot");
    assert_eq!(
        office.to_string(),
        r#"office: occupied=true temp=72.0 position=0% reason="Too Hot""#
    );
}

#[tokio::test]
async fn test_dry_run_matches_live_run() {
    let live = Controller::new(FakeHome::new(house("cool", 71.0)), once());
    let dry = Controller::new(
        FakeHome::new(house("cool", 71.0)),
        ControlConfig {
            dry_run: true,
            ..once()
        },
    );

    let live_summary = run(&live).await;
    let dry_summary = run(&dry).await;

    assert_eq!(live_summary.rooms, dry_summary.rooms);
    assert_eq!(live_summary.decisions, dry_summary.decisions);
    assert_eq!(live.client().calls().len(), 4);
    assert!(dry.client().calls().is_empty());
    assert!(dry_summary.dry_run);
}

#[tokio::test]
async fn test_moved_vents_do_not_change_decisions() {
    let controller = Controller::new(FakeHome::new(house("cool", 71.0)), once());

    let first = run(&controller).await;
    let second = run(&controller).await;

    assert_eq!(first.decisions, second.decisions);
    assert_eq!(controller.client().calls().len(), 8);
}

#[tokio::test]
async fn test_outage_skips_cycle_then_recovers() {
    let controller = Controller::new(FakeHome::new(house("cool", 71.0)), once());

    controller.client().offline.store(true, Ordering::SeqCst);
    let report = controller.run_cycle().await;
    assert!(matches!(report, CycleReport::Skipped { .. }));
    assert!(controller.client().calls().is_empty());

    controller.client().offline.store(false, Ordering::SeqCst);
    let summary = run(&controller).await;
    assert_eq!(summary.dispatch.sent, 4);
}

#[tokio::test]
async fn test_heat_cool_leaves_occupied_rooms_open() {
    let mut states = house("cool", 71.0);
    states[0] = EntityRecord::new("climate.main_floor", "heat_cool")
        .with_attributes(json!({ "target_temp_high": 76, "target_temp_low": 68 }));

    let controller = Controller::new(FakeHome::new(states), once());
    let summary = run(&controller).await;

    assert_eq!(summary.thermostat.target_temp, Some(72.0));
    let office = summary.rooms.iter().find(|r| r.name == "office").unwrap();
    assert_eq!(office.position, 100);
    assert_eq!(office.reason, "Occupied, HVAC Off/Fan Only (heat_cool)");

    let bedroom = summary.rooms.iter().find(|r| r.name == "bedroom").unwrap();
    assert_eq!(bedroom.position, 0);
}

#[tokio::test]
async fn test_primary_thermostat_wins() {
    let mut states = house("cool", 71.0);
    states.push(thermostat("climate.upstairs", "heat", 75.0));

    let controller = Controller::new(
        FakeHome::new(states),
        ControlConfig {
            primary_thermostat: Some("climate.upstairs".to_string()),
            ..once()
        },
    );
    let summary = run(&controller).await;

    assert_eq!(
        summary.thermostat.entity_id.as_deref(),
        Some("climate.upstairs")
    );
    let office = summary.rooms.iter().find(|r| r.name == "office").unwrap();
    assert_eq!(office.reason, "Too Cold");
    assert_eq!(office.position, 100);
}

#[tokio::test]
async fn test_unavailable_thermostat_passed_over() {
    let mut states = house("cool", 71.0);
    states.insert(0, EntityRecord::new("climate.old_unit", "unavailable"));

    let controller = Controller::new(FakeHome::new(states), once());
    let summary = run(&controller).await;

    assert_eq!(
        summary.thermostat.entity_id.as_deref(),
        Some("climate.main_floor")
    );
}

#[tokio::test]
async fn test_tilt_actuation_sends_tilt_position() {
    let controller = Controller::new(
        FakeHome::new(house("cool", 71.0)),
        ControlConfig {
            actuation: Actuation::Tilt,
            ..once()
        },
    );
    run(&controller).await;

    let calls = controller.client().calls();
    assert_eq!(calls.len(), 4);
    for call in calls {
        assert_eq!(call.service, "set_cover_tilt_position");
        assert!(call.params.contains_key("tilt_position"));
    }
}
