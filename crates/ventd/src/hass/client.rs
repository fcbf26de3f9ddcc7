use async_trait::async_trait;

use super::EntityRecord;
use super::Result;

/// Service-call parameters, merged into the request body next to `entity_id`.
pub type ServiceParams = serde_json::Map<String, serde_json::Value>;

/// Read/write contract the control loop needs from the home-automation platform.
///
/// This trait allows for mocking the platform for testing purposes
#[async_trait]
pub trait HomeAssistant: Send + Sync {
    /// Fetch the current state of every entity
    async fn fetch_all_states(&self) -> Result<Vec<EntityRecord>>;

    /// Fetch one entity; `Ok(None)` when the platform does not know it
    async fn fetch_state(&self, entity_id: &str) -> Result<Option<EntityRecord>>;

    /// Invoke a platform service against a single entity
    ///
    /// Fire-and-forget from the caller's point of view: no retries.
    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        entity_id: &str,
        params: ServiceParams,
    ) -> Result<()>;
}

/// Service call recorded by [`MockHomeAssistant`]
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub entity_id: String,
    pub params: ServiceParams,
}

/// Mock platform for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockHomeAssistant {
    pub states: Vec<EntityRecord>,
    pub fail_fetch: bool,
    pub fail_entities: Vec<String>,
    pub calls: std::sync::Mutex<Vec<ServiceCall>>,
    pub fetch_count: std::sync::Mutex<usize>,
    pub single_fetches: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockHomeAssistant {
    /// Create a mock serving the given states
    pub fn new(states: Vec<EntityRecord>) -> Self {
        Self {
            states,
            ..Default::default()
        }
    }

    /// Service calls issued so far
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().unwrap().clone()
    }

    fn unreachable() -> super::Error {
        super::Error::Status {
            url: "mock://".to_string(),
            status: 503,
        }
    }
}

#[cfg(test)]
#[async_trait]
impl HomeAssistant for MockHomeAssistant {
    async fn fetch_all_states(&self) -> Result<Vec<EntityRecord>> {
        *self.fetch_count.lock().unwrap() += 1;
        if self.fail_fetch {
            return Err(Self::unreachable());
        }
        Ok(self.states.clone())
    }

    async fn fetch_state(&self, entity_id: &str) -> Result<Option<EntityRecord>> {
        self.single_fetches
            .lock()
            .unwrap()
            .push(entity_id.to_string());
        if self.fail_entities.iter().any(|e| e == entity_id) {
            return Err(Self::unreachable());
        }
        Ok(self
            .states
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
    ) -> Result<()> {
        self.calls.lock().unwrap().push(ServiceCall {
            domain: domain.to_string(),
            service: service.to_string(),
            entity_id: entity_id.to_string(),
            params,
        });
        if self.fail_entities.iter().any(|e| e == entity_id) {
            return Err(Self::unreachable());
        }
        Ok(())
    }
}
