pub mod config;
pub mod control;
pub mod hass;

pub use config::format_diagnostics;
pub use config::Config;
pub use config::ControlConfig;
pub use config::Diagnostic;
pub use config::LogLevel;
pub use control::Controller;
pub use control::CycleReport;
pub use hass::EntityRecord;
pub use hass::HomeAssistant;
pub use hass::RestClient;
