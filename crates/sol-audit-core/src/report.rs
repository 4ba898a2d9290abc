use std::fmt::Write;

use colored::Colorize;
use serde::Serialize;

use crate::audit::{AuditResult, AuditSnapshot, FileOutcome, Severity};
use crate::single::SingleAudit;
use crate::store::AuditRecord;

/// Format styles supported by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

/// Render a single-file audit.
pub fn render_single(audit: &SingleAudit, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => {
            let mut out = String::new();
            if let Some(reason) = audit.fallback_reason() {
                writeln!(out, "{} {}", "Sample results:".yellow().bold(), reason)?;
                writeln!(out)?;
            }
            write_result(&mut out, audit.result(), "")?;
            Ok(out)
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(audit)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(audit)?),
    }
}

/// Render a repository snapshot, files in discovery order.
pub fn render_snapshot(snapshot: &AuditSnapshot, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_snapshot_human(snapshot),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&JsonSnapshot::from(snapshot))?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(&JsonSnapshot::from(snapshot))?),
    }
}

/// Render a user's audit history.
pub fn render_history(records: &[AuditRecord], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => {
            let mut out = String::new();
            if records.is_empty() {
                writeln!(out, "No saved audits.")?;
                return Ok(out);
            }
            for record in records {
                let counts = record.report.severity_counts();
                writeln!(
                    out,
                    "{id}  {at}  {lines} line(s)  high {high} / medium {medium} / low {low}",
                    id = record.id,
                    at = record.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    lines = record.source_code.lines().count(),
                    high = counts.get(&Severity::High).copied().unwrap_or(0),
                    medium = counts.get(&Severity::Medium).copied().unwrap_or(0),
                    low = counts.get(&Severity::Low).copied().unwrap_or(0),
                )?;
            }
            Ok(out)
        }
        OutputFormat::Json => Ok(serde_json::to_string_pretty(records)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(records)?),
    }
}

fn render_snapshot_human(snapshot: &AuditSnapshot) -> anyhow::Result<String> {
    let mut out = String::new();
    for (path, outcome) in snapshot.ordered() {
        match outcome {
            None => {
                writeln!(out, "== {path} (skipped: no content)")?;
            }
            Some(FileOutcome::Audited { result }) => {
                writeln!(out, "== {}", path.bold())?;
                write_result(&mut out, result, "  ")?;
            }
            Some(FileOutcome::Fallback { result, reason }) => {
                writeln!(out, "== {} {}", path.bold(), "(sample results)".yellow())?;
                writeln!(out, "  audit failed: {}", sanitize(reason))?;
                write_result(&mut out, result, "  ")?;
            }
        }
        writeln!(out)?;
    }
    writeln!(
        out,
        "{} file(s) listed, {} audited, {} with sample results",
        snapshot.file_order.len(),
        snapshot.results.len(),
        snapshot.fallback_count()
    )?;
    Ok(out)
}

fn write_result(out: &mut String, result: &AuditResult, indent: &str) -> anyhow::Result<()> {
    if result.vulnerabilities.is_empty() {
        writeln!(out, "{indent}No vulnerabilities reported.")?;
    } else {
        writeln!(out, "{indent}Vulnerabilities:")?;
        for vulnerability in &result.vulnerabilities {
            writeln!(
                out,
                "{indent}  - line {line:>4} {severity} {kind}: {message}",
                line = vulnerability.line,
                severity = severity_label(vulnerability.severity),
                kind = vulnerability.kind,
                message = sanitize(&vulnerability.message),
            )?;
        }
    }

    if !result.explanations.is_empty() {
        writeln!(out, "{indent}Explanations:")?;
        for explanation in &result.explanations {
            writeln!(
                out,
                "{indent}  - line {:>4}: {}",
                explanation.line,
                sanitize(&explanation.explanation)
            )?;
        }
    }

    if !result.suggested_fixes.is_empty() {
        writeln!(out, "{indent}Suggested fixes:")?;
        for fix in &result.suggested_fixes {
            writeln!(out, "{indent}  - line {:>4}: {}", fix.line, sanitize(&fix.fix))?;
        }
    }
    Ok(())
}

fn severity_label(severity: Severity) -> String {
    let label = format!("[{severity}]");
    match severity {
        Severity::High => label.red().bold().to_string(),
        Severity::Medium => label.yellow().to_string(),
        Severity::Low => label.blue().to_string(),
    }
}

fn sanitize(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '\n' | '\r' => ' ',
            _ => c,
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct JsonSnapshot<'a> {
    file_order: &'a [String],
    files: Vec<JsonFile<'a>>,
}

#[derive(Debug, Serialize)]
struct JsonFile<'a> {
    path: &'a str,
    #[serde(flatten)]
    outcome: Option<&'a FileOutcome>,
    skipped: bool,
}

impl<'a> From<&'a AuditSnapshot> for JsonSnapshot<'a> {
    fn from(snapshot: &'a AuditSnapshot) -> Self {
        Self {
            file_order: &snapshot.file_order,
            files: snapshot
                .ordered()
                .map(|(path, outcome)| JsonFile {
                    path,
                    outcome,
                    skipped: outcome.is_none(),
                })
                .collect(),
        }
    }
}
