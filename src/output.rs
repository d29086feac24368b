//! Output formatting for validation results.

use serde::Serialize;
use std::path::PathBuf;

use crate::cli::VerbosityLevel;
use crate::validator::ValidationOutcome;

/// Result of validating one file, as reported to the user.
#[derive(Debug, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ValidationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    pub fn is_valid(&self) -> bool {
        self.error.is_none() && self.outcome.as_ref().is_some_and(ValidationOutcome::is_valid)
    }
}

#[derive(Debug, Default, Serialize)]
pub struct Summary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub errors: usize,
}

impl Summary {
    pub fn from_reports(reports: &[FileReport]) -> Self {
        let mut summary = Summary {
            total: reports.len(),
            ..Summary::default()
        };
        for report in reports {
            if report.error.is_some() {
                summary.errors += 1;
            } else if report.is_valid() {
                summary.valid += 1;
            } else {
                summary.invalid += 1;
            }
        }
        summary
    }

    pub fn all_valid(&self) -> bool {
        self.invalid == 0 && self.errors == 0
    }
}

/// Simple output formatter for human-readable results
pub struct Output {
    verbosity: VerbosityLevel,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    #[cfg(test)]
    fn plain(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_colors: false,
        }
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_reports(&self, reports: &[FileReport]) -> String {
        let summary = Summary::from_reports(reports);
        let mut output = String::new();

        if self.verbosity == VerbosityLevel::Quiet {
            if !summary.all_valid() {
                output.push_str(&format!(
                    "Errors: {} Invalid: {}\n",
                    summary.errors, summary.invalid
                ));
            }
            return output;
        }

        for report in reports {
            if let Some(error) = &report.error {
                output.push_str(&format!(
                    "{} {}: {}\n",
                    self.colorize("error", "31"),
                    report.path.display(),
                    error
                ));
            } else if report.is_valid() {
                if self.verbosity >= VerbosityLevel::Verbose {
                    output.push_str(&format!(
                        "{} {}\n",
                        self.colorize("valid", "32"),
                        report.path.display()
                    ));
                }
            } else if let Some(outcome) = &report.outcome {
                output.push_str(&format!(
                    "{} {} (code {})\n",
                    self.colorize("invalid", "31"),
                    report.path.display(),
                    outcome.code
                ));
                for diagnostic in &outcome.diagnostics {
                    output.push_str(&format!("  {diagnostic}\n"));
                }
            }
        }

        output.push_str(&format!(
            "{} file(s): {} valid, {} invalid, {} error(s)\n",
            summary.total, summary.valid, summary.invalid, summary.errors
        ));
        output
    }

    pub fn format_json(&self, reports: &[FileReport]) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct JsonReport<'a> {
            summary: Summary,
            files: &'a [FileReport],
        }
        serde_json::to_string_pretty(&JsonReport {
            summary: Summary::from_reports(reports),
            files: reports,
        })
    }
}
