//! Home Assistant platform contract.
//!
//! The control loop only needs a narrow slice of the platform: a bulk state
//! read, a single-entity read, and a service call. [`HomeAssistant`] is that
//! seam; [`RestClient`] implements it over the REST API.

mod client;
mod entity;
mod rest;

pub use client::HomeAssistant;
pub use client::ServiceParams;
#[cfg(test)]
pub use client::MockHomeAssistant;
#[cfg(test)]
pub use client::ServiceCall;
pub use entity::domain_of;
pub use entity::EntityRecord;
pub use entity::Snapshot;
pub use rest::RestClient;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid Home Assistant URL '{0}': expected http:// or https://")]
    InvalidUrl(String),

    #[error("Access token contains characters not allowed in an HTTP header")]
    InvalidToken,
}

pub type Result<T> = std::result::Result<T, Error>;
