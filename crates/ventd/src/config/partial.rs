use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use toml::Spanned;

use super::diagnostics::Diagnostic;
use super::diagnostics::Error;
use super::diagnostics::FieldLocation;
use super::diagnostics::LoadError;
use super::diagnostics::MergeError;
use super::diagnostics::SourceInfo;
use super::diagnostics::Warning;
use super::LogLevel;
use crate::control::Actuation;
use crate::control::SensorSource;

/// One config file as written, every field optional
#[derive(Debug, Default, Deserialize)]
pub struct PartialConfig {
    #[serde(default)]
    pub imports: Vec<String>,

    pub logging: Option<PartialLoggingConfig>,
    pub home_assistant: Option<PartialHomeAssistantConfig>,
    pub control: Option<PartialControlConfig>,

    /// Source of a single loaded file
    #[serde(skip)]
    pub source: Option<SourceInfo>,

    /// Where each field of a merged config came from, keyed by field path
    #[serde(skip)]
    pub origins: HashMap<String, FieldLocation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialLoggingConfig {
    pub level: Option<Spanned<LogLevel>>,
    pub overrides: Option<BTreeMap<String, Spanned<LogLevel>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialHomeAssistantConfig {
    pub url: Option<Spanned<String>>,
    pub token: Option<Spanned<String>>,
    pub token_env: Option<Spanned<String>>,
    pub timeout_secs: Option<Spanned<u64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialControlConfig {
    pub interval_secs: Option<Spanned<u64>>,
    pub dry_run: Option<Spanned<bool>>,
    pub primary_thermostat: Option<Spanned<String>>,
    pub actuation: Option<Spanned<Actuation>>,
    pub sensor_source: Option<Spanned<SensorSource>>,
    pub deadband: Option<Spanned<f64>>,
    pub default_target_temp: Option<Spanned<f64>>,
}

/// First-wins merge state shared by every field
struct Merger {
    origins: HashMap<String, FieldLocation>,
    diagnostics: Vec<Diagnostic>,
}

impl Merger {
    /// Keep `value` in `slot` unless an earlier file already set `field_path`
    fn field<T>(
        &mut self,
        field_path: &str,
        source: &SourceInfo,
        slot: &mut Option<Spanned<T>>,
        value: Option<Spanned<T>>,
    ) {
        let Some(value) = value else {
            return;
        };
        let location = FieldLocation::new(source, value.span());

        if let Some(first) = self.origins.get(field_path) {
            self.diagnostics.push(Diagnostic::Error(Error::Merge(MergeError {
                field_path: field_path.to_string(),
                message: format!("'{}' defined in multiple config files", field_path),
                conflicts: vec![first.clone(), location],
            })));
        } else {
            *slot = Some(value);
            self.origins.insert(field_path.to_string(), location);
        }
    }
}

impl PartialConfig {
    /// Load a single config file without processing imports
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|error| LoadError::Io {
            path: path.to_path_buf(),
            error,
        })?;

        let mut config: PartialConfig =
            toml::from_str(&content).map_err(|error| LoadError::Parse {
                path: path.to_path_buf(),
                error,
            })?;

        config.source = Some(SourceInfo {
            file_path: path.to_path_buf(),
            content,
        });

        Ok(config)
    }

    /// Load config files with import resolution
    ///
    /// Returns every loaded file in merge order: each file's imports come
    /// before the file itself.
    pub fn load_with_imports(paths: &[PathBuf]) -> Result<Vec<Self>, LoadError> {
        let mut stack = Vec::new();
        let mut all_configs = Vec::new();

        for path in paths {
            Self::load_recursive(path, &mut stack, &mut all_configs)?;
        }

        Ok(all_configs)
    }

    fn load_recursive(
        path: &Path,
        stack: &mut Vec<PathBuf>,
        configs: &mut Vec<Self>,
    ) -> Result<(), LoadError> {
        let canonical_path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if let Some(start) = stack.iter().position(|p| *p == canonical_path) {
            let mut cycle = stack[start..].to_vec();
            cycle.push(canonical_path.clone());
            return Err(LoadError::ImportCycle {
                path: canonical_path,
                cycle,
            });
        }

        stack.push(canonical_path);

        let config = Self::from_file(path)?;

        for import in &config.imports {
            let import_path = PathBuf::from(import);

            // Relative imports resolve against the importing file's directory
            let resolved = if import_path.is_absolute() {
                import_path
            } else {
                path.parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(import_path)
            };

            Self::load_recursive(&resolved, stack, configs)?;
        }

        configs.push(config);

        // Siblings may import the same file
        stack.pop();

        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.imports.is_empty()
            && self.logging.is_none()
            && self.home_assistant.is_none()
            && self.control.is_none()
    }

    /// Merge partial configs with first-wins semantics
    ///
    /// A field set by more than one file keeps its first value and produces a
    /// merge error. Merging continues so that every conflict is reported.
    pub fn merge<I>(configs: I) -> (Self, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = Self>,
    {
        let mut result = PartialConfig::default();
        let mut merger = Merger {
            origins: HashMap::new(),
            diagnostics: Vec::new(),
        };

        for config in configs {
            let source = config.source.clone().unwrap_or_else(|| SourceInfo {
                file_path: PathBuf::from("<unknown>"),
                content: String::new(),
            });

            if config.is_empty() {
                merger
                    .diagnostics
                    .push(Diagnostic::Warning(Warning::EmptyConfig {
                        file_path: source.file_path.clone(),
                    }));
            }

            result.imports.extend(config.imports);

            if let Some(logging) = config.logging {
                let into = result.logging.get_or_insert_with(Default::default);
                merger.field("logging.level", &source, &mut into.level, logging.level);

                for (target, level) in logging.overrides.unwrap_or_default() {
                    let overrides = into.overrides.get_or_insert_with(BTreeMap::new);
                    let mut slot = overrides.remove(&target);
                    merger.field(
                        &format!("logging.overrides.{}", target),
                        &source,
                        &mut slot,
                        Some(level),
                    );
                    if let Some(level) = slot {
                        overrides.insert(target, level);
                    }
                }
            }

            if let Some(ha) = config.home_assistant {
                let into = result.home_assistant.get_or_insert_with(Default::default);
                merger.field("home_assistant.url", &source, &mut into.url, ha.url);
                merger.field("home_assistant.token", &source, &mut into.token, ha.token);
                merger.field(
                    "home_assistant.token_env",
                    &source,
                    &mut into.token_env,
                    ha.token_env,
                );
                merger.field(
                    "home_assistant.timeout_secs",
                    &source,
                    &mut into.timeout_secs,
                    ha.timeout_secs,
                );
            }

            if let Some(control) = config.control {
                let into = result.control.get_or_insert_with(Default::default);
                merger.field(
                    "control.interval_secs",
                    &source,
                    &mut into.interval_secs,
                    control.interval_secs,
                );
                merger.field("control.dry_run", &source, &mut into.dry_run, control.dry_run);
                merger.field(
                    "control.primary_thermostat",
                    &source,
                    &mut into.primary_thermostat,
                    control.primary_thermostat,
                );
                merger.field(
                    "control.actuation",
                    &source,
                    &mut into.actuation,
                    control.actuation,
                );
                merger.field(
                    "control.sensor_source",
                    &source,
                    &mut into.sensor_source,
                    control.sensor_source,
                );
                merger.field(
                    "control.deadband",
                    &source,
                    &mut into.deadband,
                    control.deadband,
                );
                merger.field(
                    "control.default_target_temp",
                    &source,
                    &mut into.default_target_temp,
                    control.default_target_temp,
                );
            }
        }

        result.origins = merger.origins;
        (result, merger.diagnostics)
    }
}
