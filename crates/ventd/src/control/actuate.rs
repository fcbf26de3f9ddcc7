use serde::Deserialize;
use strum::Display;
use tracing::debug;
use tracing::warn;

use super::policy::VentDecision;
use crate::hass::HomeAssistant;
use crate::hass::ServiceParams;

/// Which cover service moves a vent.
///
/// Damper integrations disagree: some expose the damper as a cover position,
/// others as a tilt.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Actuation {
    /// `cover.set_cover_position` with `position`
    #[default]
    Position,
    /// `cover.set_cover_tilt_position` with `tilt_position`
    Tilt,
}

impl Actuation {
    pub fn service(&self) -> &'static str {
        match self {
            Actuation::Position => "set_cover_position",
            Actuation::Tilt => "set_cover_tilt_position",
        }
    }

    pub fn parameter(&self) -> &'static str {
        match self {
            Actuation::Position => "position",
            Actuation::Tilt => "tilt_position",
        }
    }

    fn params(&self, position: u8) -> ServiceParams {
        let mut params = ServiceParams::new();
        params.insert(self.parameter().to_string(), position.into());
        params
    }
}

/// Outcome of sending one cycle's commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchResult {
    pub sent: usize,
    pub failed: usize,
}

/// Send one command per vent. A failing vent does not stop the others.
pub async fn dispatch<H: HomeAssistant + ?Sized>(
    client: &H,
    actuation: Actuation,
    decisions: &[VentDecision],
) -> DispatchResult {
    let mut result = DispatchResult::default();

    for decision in decisions {
        match client
            .call_service(
                "cover",
                actuation.service(),
                &decision.vent_id,
                actuation.params(decision.position),
            )
            .await
        {
            Ok(()) => {
                debug!("Set {} to {}%", decision.vent_id, decision.position);
                result.sent += 1;
            }
            Err(e) => {
                warn!(
                    "Failed to set {} to {}%: {}",
                    decision.vent_id, decision.position, e
                );
                result.failed += 1;
            }
        }
    }

    result
}
