//! Diagnostic normalization
//!
//! Turns analyzer findings into display-ready diagnostics: severity comes from the rule
//! registry, positions shift from the analyzer's 1-based coordinates to 0-based ones, and
//! the message gets a `[secbit:<tag>]` prefix so users can tell which check fired.
//!
//! Normalization is a pure one-to-one mapping. It never filters, merges or reorders, and
//! it never clamps coordinates; a finding at line 0 comes out at line -1. Only the final
//! conversion to LSP types saturates, because LSP positions are unsigned.

use crate::{
    proto::RawFinding,
    registry::{RuleRegistry, Severity},
};
use lsp_types::{NumberOrString, Position, Range};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DIAGNOSTIC_SOURCE: &str = "secbit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanRange {
    pub start_line: i64,
    pub start_column: i64,
    pub end_line: i64,
    pub end_column: i64,
}

impl SpanRange {
    pub fn from_one_based(finding: &RawFinding) -> Self {
        Self {
            start_line: finding.start_line - 1,
            start_column: finding.start_column - 1,
            end_line: finding.end_line - 1,
            end_column: finding.end_column - 1,
        }
    }

    pub fn to_lsp_range(&self) -> Range {
        Range {
            start: Position {
                line: to_lsp_coordinate(self.start_line),
                character: to_lsp_coordinate(self.start_column),
            },
            end: Position {
                line: to_lsp_coordinate(self.end_line),
                character: to_lsp_coordinate(self.end_column),
            },
        }
    }
}

fn to_lsp_coordinate(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub range: SpanRange,
    pub message: String,
    pub severity: Severity,
    pub tag: String,
}

impl Diagnostic {
    pub fn to_lsp(&self) -> lsp_types::Diagnostic {
        lsp_types::Diagnostic {
            range: self.range.to_lsp_range(),
            severity: Some(self.severity.to_lsp_severity()),
            code: Some(NumberOrString::String(self.tag.clone())),
            code_description: None,
            source: Some(DIAGNOSTIC_SOURCE.to_string()),
            message: self.message.clone(),
            related_information: None,
            tags: None,
            data: None,
        }
    }
}

pub fn format_message(tag: &str, description: &str) -> String {
    format!("[secbit:{}] {}", tag, description)
}

pub fn normalize(registry: &RuleRegistry, findings: &[RawFinding]) -> Vec<Diagnostic> {
    findings
        .iter()
        .map(|finding| {
            debug!("Processing [{}]", finding.tag);

            let severity = registry
                .lookup(&finding.tag)
                .map(|rule| rule.severity)
                .unwrap_or(Severity::Information);

            Diagnostic {
                range: SpanRange::from_one_based(finding),
                message: format_message(&finding.tag, &finding.description),
                severity,
                tag: finding.tag.clone(),
            }
        })
        .collect()
}

pub fn to_lsp_diagnostics(diagnostics: &[Diagnostic]) -> Vec<lsp_types::Diagnostic> {
    diagnostics.iter().map(Diagnostic::to_lsp).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticStats {
    pub total_count: usize,
    pub error_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
}

impl DiagnosticStats {
    pub fn from_diagnostics(diagnostics: &[Diagnostic]) -> Self {
        let mut stats = Self::default();

        for diagnostic in diagnostics {
            stats.total_count += 1;
            match diagnostic.severity {
                Severity::Error => stats.error_count += 1,
                Severity::Warning => stats.warning_count += 1,
                Severity::Information => stats.info_count += 1,
            }
        }

        stats
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        if self.error_count > 0 {
            Some(Severity::Error)
        } else if self.warning_count > 0 {
            Some(Severity::Warning)
        } else if self.info_count > 0 {
            Some(Severity::Information)
        } else {
            None
        }
    }
}
