//! Structured validation diagnostics.
//!
//! One [`DiagnosticSink`] lives for exactly one validate call: libxml2's
//! structured error callback appends to it in emission order (document order
//! as the engine reports it, not severity order), and the orchestrator drains
//! it into the returned outcome.

use libc::c_int;
use serde::{Deserialize, Serialize};

/// Severity of a single diagnostic, mirroring libxml2's error levels.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[repr(u8)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None = 0,
    Warning = 1,
    Error = 2,
    Fatal = 3,
}

impl Severity {
    /// Map libxml2's `xmlErrorLevel` to a severity.
    pub(crate) fn from_level(level: c_int) -> Self {
        match level {
            1 => Severity::Warning,
            2 => Severity::Error,
            3 => Severity::Fatal,
            _ => Severity::None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::None => "none",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// One structured validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub line: u32,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at line {}: {}", self.severity, self.line, self.message)
    }
}

/// Ordered collector for the diagnostics of a single validate call.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    entries: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drain the sink, preserving emission order.
    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}
