use std::ops::Range;
use std::path::PathBuf;

/// Source information for where a diagnostic came from
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub file_path: PathBuf,
    pub content: String,
}

/// Where a single field was set
#[derive(Debug, Clone)]
pub struct FieldLocation {
    pub file_path: PathBuf,
    pub span: Range<usize>,
    pub content: String,
}

impl FieldLocation {
    pub fn new(source: &SourceInfo, span: Range<usize>) -> Self {
        Self {
            file_path: source.file_path.clone(),
            span,
            content: source.content.clone(),
        }
    }

    fn file_id(&self) -> String {
        self.file_path.to_string_lossy().to_string()
    }
}

/// A diagnostic message that can be either a warning or an error
#[derive(Debug, Clone)]
pub enum Diagnostic {
    Warning(Warning),
    Error(Error),
}

/// Warning messages that don't prevent config loading
#[derive(Debug, Clone)]
pub enum Warning {
    EmptyConfig { file_path: PathBuf },
}

/// Error messages that indicate problems with the config
#[derive(Debug, Clone)]
pub enum Error {
    Merge(MergeError),
    Validation(ValidationError),
}

/// Same field set by more than one file
#[derive(Debug, Clone)]
pub struct MergeError {
    pub field_path: String,
    pub message: String,
    pub conflicts: Vec<FieldLocation>,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field_path: String,
    pub message: String,
    /// Where the offending value was written, if it was written at all
    pub location: Option<FieldLocation>,
}

/// Config loading failures that stop before merging
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read '{}': {error}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("Failed to parse '{}': {error}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        error: toml::de::Error,
    },
    #[error("Import cycle detected at '{}': {}", path.display(), render_cycle(cycle))]
    ImportCycle { path: PathBuf, cycle: Vec<PathBuf> },
}

fn render_cycle(cycle: &[PathBuf]) -> String {
    cycle
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::Error(_))
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Diagnostic::Warning(_))
    }
}

/// Format all diagnostics for display using Ariadne
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    use ariadne::Color;
    use ariadne::Label;
    use ariadne::Report;
    use ariadne::ReportKind;

    let mut output = Vec::new();

    for diagnostic in diagnostics {
        match diagnostic {
            Diagnostic::Warning(Warning::EmptyConfig { file_path }) => {
                let msg = format!(
                    "Warning: Config file '{}' is empty and has no effect\n",
                    file_path.display()
                );
                output.extend_from_slice(msg.as_bytes());
            }
            Diagnostic::Error(Error::Merge(merge_error)) => {
                let Some(first) = merge_error.conflicts.first() else {
                    let msg = format!(
                        "Merge conflict in field '{}': {}\n",
                        merge_error.field_path, merge_error.message
                    );
                    output.extend_from_slice(msg.as_bytes());
                    continue;
                };

                let mut report =
                    Report::build(ReportKind::Error, (first.file_id(), first.span.clone()))
                        .with_message(format!(
                            "Merge conflict in field '{}'",
                            merge_error.field_path
                        ))
                        .with_note(&merge_error.message);

                for (idx, conflict) in merge_error.conflicts.iter().enumerate() {
                    let (label_msg, color) = if idx == 0 {
                        ("first definition here", Color::Red)
                    } else {
                        ("conflicts with this definition", Color::Yellow)
                    };
                    report = report.with_label(
                        Label::new((conflict.file_id(), conflict.span.clone()))
                            .with_message(label_msg)
                            .with_color(color),
                    );
                }

                let sources = ariadne::sources(
                    merge_error
                        .conflicts
                        .iter()
                        .map(|c| (c.file_id(), c.content.clone())),
                );
                report.finish().write(sources, &mut output).ok();
            }
            Diagnostic::Error(Error::Validation(validation_error)) => {
                let Some(location) = &validation_error.location else {
                    let msg = format!(
                        "Validation error in '{}': {}\n",
                        validation_error.field_path, validation_error.message
                    );
                    output.extend_from_slice(msg.as_bytes());
                    continue;
                };

                Report::build(
                    ReportKind::Error,
                    (location.file_id(), location.span.clone()),
                )
                .with_message(format!(
                    "Validation error in '{}'",
                    validation_error.field_path
                ))
                .with_label(
                    Label::new((location.file_id(), location.span.clone()))
                        .with_message(&validation_error.message)
                        .with_color(Color::Red),
                )
                .finish()
                .write(
                    (location.file_id(), ariadne::Source::from(&location.content)),
                    &mut output,
                )
                .ok();
            }
        }
    }

    String::from_utf8_lossy(&output).to_string()
}
