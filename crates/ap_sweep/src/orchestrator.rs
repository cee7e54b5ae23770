//! Sweep orchestrator
//!
//! Walks domains, then projects, then instances. Each instance is
//! classified and, when eligible, enrolled under the domain's backup
//! operator. Failures below the domain listing are recorded as outcomes and
//! the walk continues.

use ap_cloud::{
    ComputeInventory, Credential, Domain, EnrollmentClient, EnrollmentRequest, IdentityDirectory,
    InstanceDetail, InstanceSummary, Project,
};
use ap_config::ApConfig;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::classifier::{Protection, ProtectionClassifier};
use crate::clock::{Clock, SystemClock};
use crate::planner;
use crate::report::{Outcome, OutcomeKind, SweepReport};
use crate::resolver::{OperatorIdentity, resolve_operator};
use crate::SweepError;

/// Runs sweeps against one cloud
pub struct Sweeper {
    directory: Arc<dyn IdentityDirectory>,
    inventory: Arc<dyn ComputeInventory>,
    enrollment: Arc<dyn EnrollmentClient>,
    clock: Arc<dyn Clock>,
    config: ApConfig,
    classifier: ProtectionClassifier,
    dry_run: bool,
}

impl Sweeper {
    /// Create a sweeper using the system clock
    #[must_use]
    pub fn new(
        config: ApConfig,
        directory: Arc<dyn IdentityDirectory>,
        inventory: Arc<dyn ComputeInventory>,
        enrollment: Arc<dyn EnrollmentClient>,
    ) -> Self {
        let classifier =
            ProtectionClassifier::new(config.min_age(), config.sweep.marker_key.clone());
        let dry_run = config.sweep.dry_run;
        Self {
            directory,
            inventory,
            enrollment,
            clock: Arc::new(SystemClock),
            config,
            classifier,
            dry_run,
        }
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Force dry-run on or off, overriding the config
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run one full sweep.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::Plan`] if the schedule cannot be computed, before
    /// any external call, and [`SweepError::Directory`] if domains cannot be
    /// listed. Every other failure is recorded in the report.
    #[instrument(skip(self), fields(dry_run = self.dry_run))]
    pub async fn run(&self) -> Result<SweepReport, SweepError> {
        let started_at = self.clock.now();
        planner::plan(started_at, &self.config.schedule)?;

        info!("===== Start of autoprotect sweep =====");
        let mut report = SweepReport::new(started_at, self.dry_run);

        let domains = self
            .directory
            .list_domains()
            .await
            .map_err(SweepError::Directory)?;
        report.domains_listed = domains.len();

        for domain in &domains {
            if !self.config.sweep.allows_domain(&domain.id, &domain.name) {
                debug!(domain = %domain.name, domain_id = %domain.id, "Domain not in allow-list");
                continue;
            }
            report.domains_swept += 1;
            self.sweep_domain(domain, &mut report).await;
        }

        report.finish(self.clock.now());
        info!(
            enrolled = report.count(OutcomeKind::Enrolled),
            planned = report.count(OutcomeKind::Planned),
            failures = report.failures().count(),
            "===== End of autoprotect sweep: {} =====",
            report.summary_line()
        );
        Ok(report)
    }

    async fn sweep_domain(&self, domain: &Domain, report: &mut SweepReport) {
        info!(domain = %domain.name, domain_id = %domain.id, "Processing domain");

        let operator = match resolve_operator(
            self.directory.as_ref(),
            &domain.id,
            &self.config.operator.name,
        )
        .await
        {
            Ok(Some(operator)) => operator,
            Ok(None) => {
                info!(
                    domain = %domain.name,
                    operator = %self.config.operator.name,
                    "Backup operator not found in domain, skipping"
                );
                report.add(Outcome::domain_skipped(domain));
                return;
            }
            Err(e) => {
                warn!(domain = %domain.name, error = %e, "Failed to resolve backup operator");
                report.add(Outcome::domain_failed(domain, e));
                return;
            }
        };

        let projects = match self.directory.list_projects(&domain.id).await {
            Ok(projects) => projects,
            Err(e) => {
                warn!(domain = %domain.name, error = %e, "Failed to list projects");
                report.add(Outcome::domain_failed(domain, e));
                return;
            }
        };

        for project in &projects {
            self.sweep_project(domain, project, &operator, report).await;
        }
    }

    async fn sweep_project(
        &self,
        domain: &Domain,
        project: &Project,
        operator: &OperatorIdentity,
        report: &mut SweepReport,
    ) {
        debug!(project = %project.name, project_id = %project.id, "Processing project");

        let instances = match self.inventory.list_instances(&project.id).await {
            Ok(instances) => instances,
            Err(e) => {
                warn!(project_id = %project.id, error = %e, "Failed to list instances");
                report.add(Outcome::project_failed(domain, project, e));
                return;
            }
        };

        for instance in &instances {
            report.instances_seen += 1;
            let outcome = self
                .process_instance(domain, project, operator, instance)
                .await;
            report.add(outcome);
        }
    }

    async fn process_instance(
        &self,
        domain: &Domain,
        project: &Project,
        operator: &OperatorIdentity,
        instance: &InstanceSummary,
    ) -> Outcome {
        let vm = match self.inventory.get_instance(&instance.id).await {
            Ok(vm) => vm,
            Err(e) => {
                warn!(instance_id = %instance.id, error = %e, "Failed to fetch instance detail");
                return Outcome::inspect_failed(domain, project, instance, e);
            }
        };

        let now = self.clock.now();
        match self.classifier.classify(&vm, now) {
            Err(e) => {
                warn!(instance_id = %vm.id, error = %e, "Cannot classify instance");
                Outcome::instance(OutcomeKind::InspectFailed, domain, project, &vm).with_error(e)
            }
            Ok(Protection::TooYoung) => {
                info!(
                    vm = %vm.name,
                    instance_id = %vm.id,
                    min_age_days = self.config.sweep.min_age_days,
                    "Skipping instance younger than the age threshold"
                );
                Outcome::instance(OutcomeKind::TooYoung, domain, project, &vm)
            }
            Ok(Protection::Protected) => {
                info!(vm = %vm.name, instance_id = %vm.id, "Instance is protected");
                Outcome::instance(OutcomeKind::Protected, domain, project, &vm)
            }
            Ok(Protection::Eligible) => {
                info!(vm = %vm.name, instance_id = %vm.id, "Instance is NOT protected");
                self.enroll(domain, project, operator, &vm, now).await
            }
        }
    }

    async fn enroll(
        &self,
        domain: &Domain,
        project: &Project,
        operator: &OperatorIdentity,
        vm: &InstanceDetail,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Outcome {
        let schedule = match planner::plan(now, &self.config.schedule) {
            Ok(schedule) => schedule,
            Err(e) => {
                return Outcome::instance(OutcomeKind::EnrollmentFailed, domain, project, vm)
                    .with_error(e);
            }
        };

        if self.dry_run {
            info!(vm = %vm.name, instance_id = %vm.id, "Dry run, not creating workload");
            return Outcome::instance(OutcomeKind::Planned, domain, project, vm)
                .with_schedule(schedule);
        }

        let request = EnrollmentRequest {
            domain_id: domain.id.clone(),
            project_id: project.id.clone(),
            operator_id: operator.id.clone(),
            operator_name: operator.name.clone(),
            operator_credential: Credential::new(self.config.operator.password.clone()),
            instance_id: vm.id.clone(),
            instance_name: vm.name.clone(),
            description: self.config.sweep.description.clone(),
            schedule: schedule.clone(),
        };

        match self.enrollment.create_job(&request).await {
            Ok(handle) => Outcome::instance(OutcomeKind::Enrolled, domain, project, vm)
                .with_job_id(handle.job_id)
                .with_schedule(schedule),
            Err(e) => {
                warn!(vm = %vm.name, instance_id = %vm.id, error = %e, "Failed to create workload");
                Outcome::instance(OutcomeKind::EnrollmentFailed, domain, project, vm)
                    .with_schedule(schedule)
                    .with_error(e)
            }
        }
    }
}
