use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Qualitative severity attached to each reported vulnerability.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    #[default]
    Low,
}

impl Severity {
    /// Map a vendor-supplied severity label onto the closed set.
    ///
    /// Exact labels win; otherwise a case-insensitive substring check for
    /// `high` then `medium` is applied, and anything else becomes `Low`.
    pub fn normalize(label: &str) -> Self {
        let lowered = label.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            other if other.contains("high") => Self::High,
            other if other.contains("medium") => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn deserialize_severity<'de, D>(deserializer: D) -> Result<Severity, D::Error>
where
    D: Deserializer<'de>,
{
    // Vendors send free text, numbers or nothing at all; only strings carry a level.
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(label)) => Ok(Severity::normalize(&label)),
        _ => Ok(Severity::Low),
    }
}

/// A single issue reported against a line of the audited source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    /// 1-based line number.
    pub line: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default, deserialize_with = "deserialize_severity")]
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub line: u32,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedFix {
    pub line: u32,
    pub fix: String,
}

/// Structured findings for one source unit, in the order the vendor returned them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditResult {
    pub vulnerabilities: Vec<Vulnerability>,
    pub explanations: Vec<Explanation>,
    #[serde(rename = "suggestedFixes")]
    pub suggested_fixes: Vec<SuggestedFix>,
}

impl AuditResult {
    /// Validate line invariants for vendor-supplied findings.
    pub fn validate(&self) -> Result<(), AuditValidationError> {
        for (index, vulnerability) in self.vulnerabilities.iter().enumerate() {
            if vulnerability.line == 0 {
                return Err(AuditValidationError::NonPositiveLine {
                    index,
                    kind: vulnerability.kind.clone(),
                });
            }
        }
        Ok(())
    }

    /// The fixed sample result substituted whenever a live audit is unavailable.
    pub fn fallback() -> Self {
        Self {
            vulnerabilities: vec![
                Vulnerability {
                    line: 7,
                    kind: "Missing Input Validation".into(),
                    message: "The set(uint x) function does not validate input. This can lead to unintended values being stored.".into(),
                    severity: Severity::Medium,
                },
                Vulnerability {
                    line: 9,
                    kind: "Visibility".into(),
                    message: "The get() function is set as public, which may not be required if used internally.".into(),
                    severity: Severity::Low,
                },
            ],
            explanations: vec![
                Explanation {
                    line: 1,
                    explanation: "Specifies that this contract uses Solidity version 0.8.0 or greater.".into(),
                },
                Explanation {
                    line: 3,
                    explanation: "Declares a public unsigned integer variable named 'data'.".into(),
                },
                Explanation {
                    line: 6,
                    explanation: "Defines a function to set the value of 'data' without input validation.".into(),
                },
                Explanation {
                    line: 9,
                    explanation: "Defines a function to get the value of 'data'. The public visibility allows external calls.".into(),
                },
            ],
            suggested_fixes: vec![SuggestedFix {
                line: 7,
                fix: "Add an input validation check, e.g., require(x > 0, 'Value must be positive');".into(),
            }],
        }
    }

    /// Count of vulnerabilities per severity, highest first.
    pub fn severity_counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for vulnerability in &self.vulnerabilities {
            *counts.entry(vulnerability.severity).or_insert(0) += 1;
        }
        counts
    }
}

/// Invariant violations detected in a decoded audit result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditValidationError {
    #[error("vulnerability #{index} (`{kind}`) must reference a line >= 1")]
    NonPositiveLine { index: usize, kind: String },
}

/// Outcome of auditing a single repository file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Audited { result: AuditResult },
    Fallback { result: AuditResult, reason: String },
}

impl FileOutcome {
    pub fn result(&self) -> &AuditResult {
        match self {
            Self::Audited { result } | Self::Fallback { result, .. } => result,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Point-in-time view of a repository audit.
///
/// `results` has no ordering guarantee of its own; `file_order` carries the
/// discovery order and also lists files skipped for empty content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSnapshot {
    pub file_order: Vec<String>,
    pub results: BTreeMap<String, FileOutcome>,
}

impl AuditSnapshot {
    /// Iterate `(path, outcome)` in discovery order; skipped files yield `None`.
    pub fn ordered(&self) -> impl Iterator<Item = (&str, Option<&FileOutcome>)> {
        self.file_order
            .iter()
            .map(|path| (path.as_str(), self.results.get(path)))
    }

    pub fn fallback_count(&self) -> usize {
        self.results.values().filter(|o| o.is_fallback()).count()
    }
}
