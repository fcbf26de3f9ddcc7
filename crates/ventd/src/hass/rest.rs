use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use reqwest::StatusCode;
use tracing::debug;

use super::client::HomeAssistant;
use super::client::ServiceParams;
use super::EntityRecord;
use super::Error;
use super::Result;

/// Home Assistant REST API client
///
/// Talks to `/api/states` and `/api/services` with a long-lived access token.
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    /// Build a client for the instance at `url` (e.g. "http://homeassistant.local:8123")
    pub fn new(url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let base_url = url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::InvalidUrl(url.to_string()));
        }

        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| Error::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl HomeAssistant for RestClient {
    async fn fetch_all_states(&self) -> Result<Vec<EntityRecord>> {
        let url = self.url("/api/states");
        debug!(url = %url, "fetching all states");

        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Status {
                url,
                status: resp.status().as_u16(),
            });
        }

        Ok(resp.json().await?)
    }

    async fn fetch_state(&self, entity_id: &str) -> Result<Option<EntityRecord>> {
        let url = self.url(&format!("/api/states/{}", entity_id));

        let resp = self.http.get(&url).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(resp.json().await?)),
            s => Err(Error::Status {
                url,
                status: s.as_u16(),
            }),
        }
    }

    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        entity_id: &str,
        params: ServiceParams,
    ) -> Result<()> {
        let url = self.url(&format!("/api/services/{}/{}", domain, service));
        let body = service_body(entity_id, params);
        debug!(url = %url, body = %body, "calling service");

        let resp = self.http.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Status {
                url,
                status: resp.status().as_u16(),
            });
        }

        Ok(())
    }
}

/// Request body for a service call: the target entity plus service parameters
fn service_body(entity_id: &str, mut params: ServiceParams) -> serde_json::Value {
    params.insert(
        "entity_id".to_string(),
        serde_json::Value::String(entity_id.to_string()),
    );
    serde_json::Value::Object(params)
}
