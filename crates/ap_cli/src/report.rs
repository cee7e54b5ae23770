//! Output formatting for sweep reports
//!
//! JSON output is wrapped in a [`ReportEnvelope`] so consumers get the same
//! metadata for every command. Text output is a short human summary.

use ap_cloud::ScheduleParams;
use ap_sweep::{Outcome, OutcomeKind, SweepReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

pub const SWEEP_SCHEMA: &str = "autoprotect.sweep.v1";
pub const PLAN_SCHEMA: &str = "autoprotect.plan.v1";
pub const CONFIG_SCHEMA: &str = "autoprotect.config.v1";

/// Standard envelope for all JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEnvelope<T: Serialize> {
    /// Schema version identifier (e.g., "autoprotect.sweep.v1")
    pub schema_version: String,

    /// When this output was generated
    pub generated_at: DateTime<Utc>,

    /// The actual data payload
    pub data: T,

    /// Failures and other things worth a second look
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl<T: Serialize> ReportEnvelope<T> {
    /// Create a new envelope with the given schema and data
    pub fn new(schema_version: impl Into<String>, data: T) -> Self {
        Self {
            schema_version: schema_version.into(),
            generated_at: Utc::now(),
            data,
            warnings: Vec::new(),
        }
    }

    /// Add warnings
    #[must_use]
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Serialize to pretty JSON string
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|e| format!(r#"{{"error": "serialization failed: {e}"}}"#))
    }
}

/// Payload of the `plan` command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanData {
    pub now: DateTime<Utc>,
    pub schedule: ScheduleParams,
    pub description: String,
    pub min_age_days: u32,
    pub dry_run: bool,
}

fn location(outcome: &Outcome) -> String {
    let mut loc = if outcome.domain_name.is_empty() {
        outcome.domain_id.clone()
    } else {
        outcome.domain_name.clone()
    };
    if let Some(project) = &outcome.project_id {
        let _ = write!(loc, "/{project}");
    }
    if let Some(instance) = &outcome.instance_id {
        let _ = write!(loc, "/{instance}");
    }
    loc
}

/// One warning line per failed outcome
#[must_use]
pub fn failure_warnings(report: &SweepReport) -> Vec<String> {
    report
        .failures()
        .map(|o| {
            format!(
                "{} {}: {}",
                o.kind,
                location(o),
                o.error.as_deref().unwrap_or("unknown error")
            )
        })
        .collect()
}

/// Wrap a sweep report for JSON output
#[must_use]
pub fn sweep_envelope(report: &SweepReport) -> ReportEnvelope<&SweepReport> {
    ReportEnvelope::new(SWEEP_SCHEMA, report).with_warnings(failure_warnings(report))
}

/// Human-readable rendering of a sweep report
#[must_use]
pub fn render_text(report: &SweepReport) -> String {
    let mut out = String::new();
    let mode = if report.dry_run { " (dry run)" } else { "" };
    let _ = writeln!(out, "Sweep started {}{mode}", report.started_at.to_rfc3339());
    let _ = writeln!(
        out,
        "Domains: {} swept of {} listed, instances inspected: {}",
        report.domains_swept, report.domains_listed, report.instances_seen
    );

    for (kind, count) in &report.counts {
        let _ = writeln!(out, "  {kind:<18} {count}");
    }

    for outcome in &report.outcomes {
        match outcome.kind {
            OutcomeKind::Enrolled => {
                let _ = writeln!(
                    out,
                    "✓ enrolled {} ({}) job {}",
                    outcome.instance_name.as_deref().unwrap_or("?"),
                    location(outcome),
                    outcome.job_id.as_deref().unwrap_or("unknown")
                );
            }
            OutcomeKind::Planned => {
                let when = outcome
                    .schedule
                    .as_ref()
                    .map(|s| format!("{} {}", s.start_date, s.start_time))
                    .unwrap_or_default();
                let _ = writeln!(
                    out,
                    "→ would enroll {} ({}) starting {when}",
                    outcome.instance_name.as_deref().unwrap_or("?"),
                    location(outcome)
                );
            }
            kind if kind.is_failure() => {
                let _ = writeln!(
                    out,
                    "✗ {kind} {}: {}",
                    location(outcome),
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
            _ => {}
        }
    }

    if let Some(duration) = report.duration() {
        let _ = writeln!(out, "Finished in {}s", duration.num_seconds());
    }
    out
}
