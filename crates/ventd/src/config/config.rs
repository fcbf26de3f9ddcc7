use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

use super::diagnostics::format_diagnostics;
use super::diagnostics::Diagnostic;
use super::diagnostics::Error;
use super::diagnostics::FieldLocation;
use super::diagnostics::LoadError;
use super::diagnostics::ValidationError;
use super::partial::PartialConfig;
use crate::control::policy::DEFAULT_DEADBAND;
use crate::control::Actuation;
use crate::control::SensorSource;

pub const DEFAULT_TOKEN_ENV: &str = "HASS_TOKEN";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_TARGET_TEMP: f64 = 22.0;

#[derive(Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub home_assistant: HomeAssistantConfig,
    pub control: ControlConfig,
}

/// Why a configuration could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("{}", format_diagnostics(.0))]
    Invalid(Vec<Diagnostic>),
}

// Deserialize so it can sit inside toml::Spanned in the partial config
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: LogLevel,

    /// Per-target levels, e.g. `"ventd::decision" = "warn"`
    pub overrides: BTreeMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Subscriber filter: the default level plus every override
    pub fn targets(&self) -> Targets {
        Targets::new()
            .with_default(LevelFilter::from(self.level))
            .with_targets(
                self.overrides
                    .iter()
                    .map(|(target, level)| (target.clone(), LevelFilter::from(*level))),
            )
    }
}

#[derive(Debug, Clone)]
pub struct HomeAssistantConfig {
    /// Base URL, e.g. `http://homeassistant.local:8123`
    pub url: String,

    /// Long-lived access token written directly in the config
    pub token: Option<String>,

    /// Environment variable holding the token when `token` is unset
    pub token_env: String,

    /// Per-request timeout
    pub timeout: Duration,
}

impl HomeAssistantConfig {
    /// Resolve the access token from the config, then the environment
    pub fn token(&self) -> Option<String> {
        self.token_with(|name| std::env::var(name).ok())
    }

    fn token_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        self.token
            .clone()
            .or_else(|| lookup(&self.token_env))
            .filter(|t| !t.trim().is_empty())
    }
}

/// Control loop settings
#[derive(Debug, Clone, PartialEq)]
pub struct ControlConfig {
    /// Time between the end of one cycle and the start of the next; zero runs once
    pub interval: Duration,

    /// Decide and log, but never actuate
    pub dry_run: bool,

    /// Preferred `climate.*` entity when several exist
    pub primary_thermostat: Option<String>,

    pub actuation: Actuation,
    pub sensor_source: SensorSource,

    /// Half-width of the balanced band around the setpoint
    pub deadband: f64,

    /// Target temperature assumed when no thermostat exists
    pub default_target_temp: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            dry_run: false,
            primary_thermostat: None,
            actuation: Actuation::default(),
            sensor_source: SensorSource::default(),
            deadband: DEFAULT_DEADBAND,
            default_target_temp: DEFAULT_TARGET_TEMP,
        }
    }
}

impl Config {
    /// Load configuration from one or more TOML files
    ///
    /// Imports are resolved, all files are merged first-wins and the result is
    /// validated. Returns the config together with any warnings; every error
    /// found is reported at once through [`ConfigError::Invalid`].
    pub fn from_files(paths: &[PathBuf]) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let configs = PartialConfig::load_with_imports(paths)?;
        let (partial, diagnostics) = PartialConfig::merge(configs);
        Self::from_partial(partial, diagnostics)
    }

    /// Convert a merged [`PartialConfig`], adding validation diagnostics
    pub fn from_partial(
        partial: PartialConfig,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Result<(Self, Vec<Diagnostic>), ConfigError> {
        let mut validator = Validator {
            origins: &partial.origins,
            errors: Vec::new(),
        };

        let logging = partial
            .logging
            .map(|logging| LoggingConfig {
                level: logging.level.map(|s| *s.get_ref()).unwrap_or_default(),
                overrides: logging
                    .overrides
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(target, level)| (target, level.into_inner()))
                    .collect(),
            })
            .unwrap_or_default();

        let ha = partial.home_assistant.unwrap_or_default();
        let url = match ha.url.map(|s| s.into_inner()) {
            Some(url) => {
                let trimmed = url.trim_end_matches('/').to_string();
                if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
                    validator.error(
                        "home_assistant.url",
                        format!("'{}' must start with http:// or https://", url),
                    );
                }
                trimmed
            }
            None => {
                validator.error("home_assistant.url", "url is required");
                String::new()
            }
        };
        let timeout = match ha.timeout_secs.map(|s| s.into_inner()) {
            Some(0) => {
                validator.error(
                    "home_assistant.timeout_secs",
                    "timeout must be at least 1 second",
                );
                DEFAULT_TIMEOUT
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_TIMEOUT,
        };
        let home_assistant = HomeAssistantConfig {
            url,
            token: ha.token.map(|s| s.into_inner()),
            token_env: ha
                .token_env
                .map(|s| s.into_inner())
                .unwrap_or_else(|| DEFAULT_TOKEN_ENV.to_string()),
            timeout,
        };

        let defaults = ControlConfig::default();
        let c = partial.control.unwrap_or_default();
        let primary_thermostat = c.primary_thermostat.map(|s| s.into_inner());
        if let Some(id) = &primary_thermostat {
            if !id.starts_with("climate.") {
                validator.error(
                    "control.primary_thermostat",
                    format!("'{}' is not a climate entity", id),
                );
            }
        }
        let deadband = c.deadband.map_or(defaults.deadband, |s| s.into_inner());
        if !deadband.is_finite() || deadband < 0.0 {
            validator.error("control.deadband", "deadband must be a finite number >= 0");
        }
        let default_target_temp = c
            .default_target_temp
            .map_or(defaults.default_target_temp, |s| s.into_inner());
        if !default_target_temp.is_finite() {
            validator.error(
                "control.default_target_temp",
                "default_target_temp must be a finite number",
            );
        }
        let control = ControlConfig {
            interval: c
                .interval_secs
                .map_or(defaults.interval, |s| Duration::from_secs(s.into_inner())),
            dry_run: c.dry_run.map_or(defaults.dry_run, |s| s.into_inner()),
            primary_thermostat,
            actuation: c.actuation.map_or(defaults.actuation, |s| s.into_inner()),
            sensor_source: c
                .sensor_source
                .map_or(defaults.sensor_source, |s| s.into_inner()),
            deadband,
            default_target_temp,
        };

        diagnostics.extend(
            validator
                .errors
                .into_iter()
                .map(|e| Diagnostic::Error(Error::Validation(e))),
        );

        if diagnostics.iter().any(Diagnostic::is_error) {
            return Err(ConfigError::Invalid(diagnostics));
        }

        Ok((
            Config {
                logging,
                home_assistant,
                control,
            },
            diagnostics,
        ))
    }
}

struct Validator<'a> {
    origins: &'a HashMap<String, FieldLocation>,
    errors: Vec<ValidationError>,
}

impl Validator<'_> {
    fn error(&mut self, field_path: &str, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field_path: field_path.to_string(),
            message: message.into(),
            location: self.origins.get(field_path).cloned(),
        });
    }
}
