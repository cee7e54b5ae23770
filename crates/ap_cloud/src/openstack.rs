//! `openstack` CLI adapter
//!
//! Implements [`IdentityDirectory`] and [`ComputeInventory`] on top of the
//! `openstack` command with `-f json` output.
//!
//! ## Integration Method
//! ```bash
//! openstack <auth flags> domain list -f json
//! openstack <auth flags> user list --domain <id> -f json
//! openstack <auth flags> project list --domain <id> -f json
//! openstack <auth flags> server list --project <id> -f json
//! openstack <auth flags> server show <id> -f json
//! ```

use ap_config::CloudConfig;
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::executor::{CommandSpec, Executor};
use crate::{
    CloudError, ComputeInventory, Domain, IdentityDirectory, InstanceDetail, InstanceSummary,
    Project, User,
};

/// Identity and compute client backed by the `openstack` CLI
#[derive(Debug, Clone)]
pub struct OpenStackCli {
    cloud: CloudConfig,
    executor: Executor,
}

impl OpenStackCli {
    /// Create a client for the given cloud
    #[must_use]
    pub fn new(cloud: CloudConfig, executor: Executor) -> Self {
        Self { cloud, executor }
    }

    /// Base command carrying the admin authentication flags
    fn base_command(&self) -> CommandSpec {
        CommandSpec::new(&self.cloud.openstack_bin)
            .flag("--os-interface", &self.cloud.interface)
            .flag("--os-password", &self.cloud.password)
            .flag(
                "--os-identity-api-version",
                &self.cloud.identity_api_version,
            )
            .flag("--os-domain-id", &self.cloud.domain_id)
            .flag("--os-project-id", &self.cloud.project_id)
            .flag("--os-auth-url", &self.cloud.auth_url)
            .flag("--os-username", &self.cloud.username)
            .flag("--os-region-name", &self.cloud.region_name)
    }

    /// Full command for a subcommand, with JSON output requested
    fn command<'a>(&self, subcommand: impl IntoIterator<Item = &'a str>) -> CommandSpec {
        self.base_command().args(subcommand).args(["-f", "json"])
    }
}

#[async_trait]
impl IdentityDirectory for OpenStackCli {
    #[instrument(skip(self))]
    async fn list_domains(&self) -> Result<Vec<Domain>, CloudError> {
        let domains: Vec<Domain> = self.executor.run_json(&self.command(["domain", "list"])).await?;
        debug!(count = domains.len(), "Listed domains");
        Ok(domains)
    }

    #[instrument(skip(self))]
    async fn list_users(&self, domain_id: &str) -> Result<Vec<User>, CloudError> {
        let spec = self.command(["user", "list", "--domain", domain_id]);
        self.executor.run_json(&spec).await
    }

    #[instrument(skip(self))]
    async fn list_projects(&self, domain_id: &str) -> Result<Vec<Project>, CloudError> {
        let spec = self.command(["project", "list", "--domain", domain_id]);
        self.executor.run_json(&spec).await
    }
}

#[async_trait]
impl ComputeInventory for OpenStackCli {
    #[instrument(skip(self))]
    async fn list_instances(&self, project_id: &str) -> Result<Vec<InstanceSummary>, CloudError> {
        let spec = self.command(["server", "list", "--project", project_id]);
        self.executor.run_json(&spec).await
    }

    #[instrument(skip(self))]
    async fn get_instance(&self, instance_id: &str) -> Result<InstanceDetail, CloudError> {
        let spec = self.command(["server", "show", instance_id]);
        self.executor.run_json(&spec).await
    }
}
