//! `workloadmgr` CLI adapter
//!
//! Implements [`EnrollmentClient`] by creating one workload per instance,
//! authenticated as the domain's backup operator.
//!
//! ## Integration Method
//! ```bash
//! workloadmgr --endpoint-type <iface> --os-auth-url <url> --os-domain-id <domain> \
//!     --os-tenant-id <project> --os-username <operator> --os-password <secret> \
//!     workload-create --display-name workload-<vm> --display-description <text> \
//!     --instance instance-id=<vm id> --jobschedule interval=<interval> ...
//! ```

use ap_config::CloudConfig;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{info, instrument};

use crate::executor::{CommandSpec, Executor};
use crate::{CloudError, EnrollmentClient, EnrollmentRequest, JobHandle};

static TABLE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\|\s*id\s*\|\s*([0-9A-Za-z\-]+)\s*\|").expect("id pattern is valid")
});

/// Pull the workload id out of the `| id | ... |` row of the CLI's table output
#[must_use]
pub fn extract_job_id(output: &str) -> Option<String> {
    TABLE_ID.captures(output).map(|c| c[1].to_string())
}

/// Backup-job client backed by the `workloadmgr` CLI
#[derive(Debug, Clone)]
pub struct WorkloadMgrCli {
    cloud: CloudConfig,
    executor: Executor,
}

impl WorkloadMgrCli {
    /// Create a client for the given cloud
    #[must_use]
    pub fn new(cloud: CloudConfig, executor: Executor) -> Self {
        Self { cloud, executor }
    }

    fn create_command(&self, request: &EnrollmentRequest) -> CommandSpec {
        let schedule = &request.schedule;
        CommandSpec::new(&self.cloud.workloadmgr_bin)
            .flag("--endpoint-type", &self.cloud.interface)
            .flag("--os-auth-url", &self.cloud.auth_url)
            .flag("--os-domain-id", &request.domain_id)
            .flag("--os-tenant-id", &request.project_id)
            .flag("--os-username", &request.operator_name)
            .flag("--os-password", request.operator_credential.expose())
            .arg("workload-create")
            .flag("--display-name", request.job_name())
            .flag("--display-description", &request.description)
            .flag("--instance", format!("instance-id={}", request.instance_id))
            .flag("--jobschedule", format!("interval={}", schedule.interval))
            .flag(
                "--jobschedule",
                format!("retention_policy_value={}", schedule.retention),
            )
            .flag(
                "--jobschedule",
                format!("start_date={}", schedule.start_date),
            )
            .flag(
                "--jobschedule",
                format!("start_time={}", schedule.start_time),
            )
            .flag(
                "--jobschedule",
                format!("enabled={}", if schedule.enabled { "True" } else { "False" }),
            )
    }
}

#[async_trait]
impl EnrollmentClient for WorkloadMgrCli {
    #[instrument(
        skip_all,
        fields(instance_id = %request.instance_id, project_id = %request.project_id)
    )]
    async fn create_job(&self, request: &EnrollmentRequest) -> Result<JobHandle, CloudError> {
        let output = self.executor.run_checked(&self.create_command(request)).await?;
        let job_id = extract_job_id(&output);

        info!(
            instance = %request.instance_name,
            instance_id = %request.instance_id,
            job_id = job_id.as_deref().unwrap_or("unknown"),
            "Created workload"
        );

        Ok(JobHandle { job_id, output })
    }
}
