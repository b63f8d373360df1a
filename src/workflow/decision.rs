//! Single-pass vs two-pass decision engine.
//!
//! This module scores how hard a document will be to extract in one request
//! and recommends two-pass processing when the score reaches the configured
//! threshold. Scoring is pure and deterministic.
//!
//! Signals and the points they contribute:
//!
//! | Signal                     | Points |
//! |----------------------------|--------|
//! | Document size band         | 0, 3, 5 or 6 |
//! | Employee header markers    | 0, 1 or 2 |
//! | Distinct employees         | 0, 1 or 2 |
//! | Tabular export, ≥ 2 people | 0 or 1 |
//!
//! Size dominates on purpose: it tracks employee count more reliably than
//! line-level heuristics do. The total is capped at 10.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;

use crate::config::DecisionConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::DecisionResult;

/// The highest possible complexity score.
pub const MAX_COMPLEXITY_SCORE: u8 = 10;

const MEDIUM_SIZE_POINTS: u8 = 3;
const LARGE_SIZE_POINTS: u8 = 5;
const VERY_LARGE_SIZE_POINTS: u8 = 6;
const TABULAR_POINTS: u8 = 1;

/// Employee header markers found in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderScan {
    /// Total header lines matched.
    pub marker_count: u32,
    /// Distinct employee values among the matched header lines.
    pub distinct_employees: u32,
}

/// Scores documents and recommends a processing strategy.
///
/// # Example
///
/// ```
/// use timesheet_ingest::config::DecisionConfig;
/// use timesheet_ingest::workflow::DecisionEngine;
///
/// let engine = DecisionEngine::new(&DecisionConfig::default()).unwrap();
///
/// let small = engine.decide("Employee: Jane Doe\n2026-01-15 09:00 IN\n", "week.txt");
/// assert!(!small.should_use_two_pass);
///
/// let big = "Employee: Jane Doe\n".to_string() + &"2026-01-15 09:00 IN\n".repeat(10_000);
/// assert!(engine.decide(&big, "week.txt").should_use_two_pass);
/// ```
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    config: DecisionConfig,
    header_marker: Regex,
}

impl DecisionEngine {
    /// Builds an engine from its configuration.
    ///
    /// Fails with `InvalidConfig` if the configuration is inconsistent or the
    /// header marker pattern does not compile.
    pub fn new(config: &DecisionConfig) -> EngineResult<Self> {
        config.validate()?;
        let header_marker =
            Regex::new(&config.header_marker_pattern).map_err(|e| EngineError::InvalidConfig {
                field: "decision.header_marker_pattern".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            config: config.clone(),
            header_marker,
        })
    }

    /// Scores a document and recommends single-pass or two-pass processing.
    pub fn decide(&self, document_text: &str, filename: &str) -> DecisionResult {
        let chars = document_text.chars().count();
        let scan = self.scan_headers(document_text);
        let mut score: u8 = 0;
        let mut fired = Vec::new();

        let size_points = self.size_points(chars);
        if size_points > 0 {
            score += size_points;
            fired.push(format!(
                "{} document ({} chars, +{})",
                self.size_label(chars),
                chars,
                size_points
            ));
        }

        let marker_points = tiered_points(
            scan.marker_count,
            self.config.marker_count_low,
            self.config.marker_count_high,
        );
        if marker_points > 0 {
            score += marker_points;
            fired.push(format!(
                "{} employee header markers (+{})",
                scan.marker_count, marker_points
            ));
        }

        let employee_points = tiered_points(
            scan.distinct_employees,
            self.config.employee_count_low,
            self.config.employee_count_high,
        );
        if employee_points > 0 {
            score += employee_points;
            fired.push(format!(
                "~{} distinct employees (+{})",
                scan.distinct_employees, employee_points
            ));
        }

        if scan.distinct_employees >= 2 && self.is_tabular(filename) {
            score += TABULAR_POINTS;
            fired.push(format!(
                "tabular export with multiple employees (+{})",
                TABULAR_POINTS
            ));
        }

        let complexity_score = score.min(MAX_COMPLEXITY_SCORE);
        let should_use_two_pass = complexity_score >= self.config.two_pass_threshold;

        let signals = if fired.is_empty() {
            format!("no complexity signals ({} chars)", chars)
        } else {
            fired.join("; ")
        };
        let reason = format!(
            "score {}/{} (threshold {}): {}",
            complexity_score, MAX_COMPLEXITY_SCORE, self.config.two_pass_threshold, signals
        );

        DecisionResult {
            complexity_score,
            should_use_two_pass,
            reason,
            estimated_employee_count: scan.distinct_employees,
        }
    }

    /// Counts employee header lines and the distinct employees they name.
    pub fn scan_headers(&self, document_text: &str) -> HeaderScan {
        let mut marker_count = 0u32;
        let mut distinct = HashSet::new();

        for captures in self.header_marker.captures_iter(document_text) {
            marker_count += 1;
            if let Some(value) = captures.get(1) {
                let normalized = normalize_header_value(value.as_str());
                if !normalized.is_empty() {
                    distinct.insert(normalized);
                }
            }
        }

        HeaderScan {
            marker_count,
            distinct_employees: distinct.len() as u32,
        }
    }

    fn size_points(&self, chars: usize) -> u8 {
        if chars >= self.config.very_large_document_chars {
            VERY_LARGE_SIZE_POINTS
        } else if chars >= self.config.large_document_chars {
            LARGE_SIZE_POINTS
        } else if chars >= self.config.medium_document_chars {
            MEDIUM_SIZE_POINTS
        } else {
            0
        }
    }

    fn size_label(&self, chars: usize) -> &'static str {
        if chars >= self.config.very_large_document_chars {
            "very large"
        } else if chars >= self.config.large_document_chars {
            "large"
        } else {
            "medium"
        }
    }

    fn is_tabular(&self, filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.config
                    .tabular_extensions
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(ext))
            })
    }
}

fn tiered_points(value: u32, low: u32, high: u32) -> u8 {
    if value >= high {
        2
    } else if value >= low {
        1
    } else {
        0
    }
}

fn normalize_header_value(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
