//! Per-item sweep outcomes and the run summary

use ap_cloud::{Domain, InstanceDetail, InstanceSummary, Project, ScheduleParams};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What happened to one domain, project or instance during a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Instance already carries the enrollment marker
    Protected,
    /// Instance is younger than the age threshold
    TooYoung,
    /// A backup job was created
    Enrolled,
    /// Dry run: a backup job would have been created
    Planned,
    /// Job creation was attempted and failed
    EnrollmentFailed,
    /// Domain has no backup operator
    DomainSkipped,
    /// Operator lookup or project listing failed
    DomainFailed,
    /// Instance listing for a project failed
    ProjectFailed,
    /// Instance detail could not be fetched or read
    InspectFailed,
}

impl OutcomeKind {
    /// Whether this outcome counts as a failure
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(
            self,
            Self::EnrollmentFailed | Self::DomainFailed | Self::ProjectFailed | Self::InspectFailed
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Protected => "protected",
            Self::TooYoung => "too_young",
            Self::Enrolled => "enrolled",
            Self::Planned => "planned",
            Self::EnrollmentFailed => "enrollment_failed",
            Self::DomainSkipped => "domain_skipped",
            Self::DomainFailed => "domain_failed",
            Self::ProjectFailed => "project_failed",
            Self::InspectFailed => "inspect_failed",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub domain_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    fn for_domain(kind: OutcomeKind, domain: &Domain) -> Self {
        Self {
            kind,
            domain_id: domain.id.clone(),
            domain_name: domain.name.clone(),
            project_id: None,
            instance_id: None,
            instance_name: None,
            job_id: None,
            schedule: None,
            error: None,
        }
    }

    #[must_use]
    pub fn domain_skipped(domain: &Domain) -> Self {
        Self::for_domain(OutcomeKind::DomainSkipped, domain)
    }

    #[must_use]
    pub fn domain_failed(domain: &Domain, error: impl fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::for_domain(OutcomeKind::DomainFailed, domain)
        }
    }

    #[must_use]
    pub fn project_failed(domain: &Domain, project: &Project, error: impl fmt::Display) -> Self {
        Self {
            project_id: Some(project.id.clone()),
            error: Some(error.to_string()),
            ..Self::for_domain(OutcomeKind::ProjectFailed, domain)
        }
    }

    /// Outcome for an instance whose detail record was never read
    #[must_use]
    pub fn inspect_failed(
        domain: &Domain,
        project: &Project,
        instance: &InstanceSummary,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            project_id: Some(project.id.clone()),
            instance_id: Some(instance.id.clone()),
            instance_name: Some(instance.name.clone()),
            error: Some(error.to_string()),
            ..Self::for_domain(OutcomeKind::InspectFailed, domain)
        }
    }

    /// Outcome for an inspected instance
    #[must_use]
    pub fn instance(
        kind: OutcomeKind,
        domain: &Domain,
        project: &Project,
        vm: &InstanceDetail,
    ) -> Self {
        Self {
            project_id: Some(project.id.clone()),
            instance_id: Some(vm.id.clone()),
            instance_name: Some(vm.name.clone()),
            ..Self::for_domain(kind, domain)
        }
    }

    #[must_use]
    pub fn with_job_id(mut self, job_id: Option<String>) -> Self {
        self.job_id = job_id;
        self
    }

    #[must_use]
    pub fn with_schedule(mut self, schedule: ScheduleParams) -> Self {
        self.schedule = Some(schedule);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Summary of one sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    /// Domains listed by the directory, before allow-list filtering
    pub domains_listed: usize,
    /// Domains that passed the allow-list
    pub domains_swept: usize,
    /// Instances whose detail was requested
    pub instances_seen: usize,
    /// Outcome counts keyed by kind
    pub counts: BTreeMap<OutcomeKind, usize>,
    pub outcomes: Vec<Outcome>,
}

impl SweepReport {
    #[must_use]
    pub fn new(started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            started_at,
            finished_at: None,
            dry_run,
            domains_listed: 0,
            domains_swept: 0,
            instances_seen: 0,
            counts: BTreeMap::new(),
            outcomes: Vec::new(),
        }
    }

    /// Record an outcome
    pub fn add(&mut self, outcome: Outcome) {
        *self.counts.entry(outcome.kind).or_default() += 1;
        self.outcomes.push(outcome);
    }

    pub fn finish(&mut self, at: DateTime<Utc>) {
        self.finished_at = Some(at);
    }

    /// Number of outcomes of one kind
    #[must_use]
    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// All failed outcomes, in the order they were recorded
    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.kind.is_failure())
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.counts.keys().any(|k| k.is_failure())
    }

    /// Outcomes for one instance id
    pub fn for_instance<'a>(&'a self, instance_id: &'a str) -> impl Iterator<Item = &'a Outcome> {
        self.outcomes
            .iter()
            .filter(move |o| o.instance_id.as_deref() == Some(instance_id))
    }

    /// Elapsed wall time, once finished
    #[must_use]
    pub fn duration(&self) -> Option<chrono::TimeDelta> {
        self.finished_at.map(|f| f - self.started_at)
    }

    /// One-line human summary
    #[must_use]
    pub fn summary_line(&self) -> String {
        let counts: Vec<String> = self
            .counts
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!(
            "domains={}/{} instances={} {}",
            self.domains_swept,
            self.domains_listed,
            self.instances_seen,
            counts.join(" ")
        )
    }
}
