#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, Once};

use ap_cloud::{
    CloudError, ComputeInventory, Domain, EnrollmentClient, EnrollmentRequest, IdentityDirectory,
    InstanceDetail, InstanceSummary, JobHandle, Project, User,
};
use ap_config::ApConfig;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static INIT: Once = Once::new();

/// Initialize tracing once for integration tests.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer())
            .with(filter)
            .init();
    });
}

/// The instant every scenario runs at
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap()
}

pub const TEST_TOML: &str = r#"
[cloud]
auth_url = "https://keystone.example.com:5000/v3"
region_name = "RegionOne"
username = "admin"
password = "s3cret"
domain_id = "default"
project_id = "p-admin"

[operator]
name = "backup-admin"
password = "op-pass"

[schedule]
start_offset_days = 1
start_time = "02:00:00"
interval = "24hrs"
retention = 5
"#;

/// A valid config with the given age threshold
pub fn test_config(min_age_days: u32) -> ApConfig {
    let mut config = ApConfig::from_toml_str(TEST_TOML).unwrap();
    config.sweep.min_age_days = min_age_days;
    config
}

pub fn instance(id: &str, created: &str, protected: bool) -> InstanceDetail {
    let mut properties = BTreeMap::new();
    if protected {
        properties.insert("workload_id".to_string(), "w-existing".to_string());
    }
    InstanceDetail {
        id: id.to_string(),
        name: format!("{id}-name"),
        created: created.to_string(),
        properties,
        project_id: None,
    }
}

/// In-memory cloud that records every call
#[derive(Default)]
pub struct FakeCloud {
    domains: Vec<Domain>,
    users: HashMap<String, Vec<User>>,
    projects: HashMap<String, Vec<Project>>,
    instances: HashMap<String, Vec<InstanceSummary>>,
    details: HashMap<String, InstanceDetail>,
    failing_jobs: HashSet<String>,
    calls: Mutex<Vec<String>>,
    requests: Mutex<Vec<EnrollmentRequest>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domain(mut self, id: &str, users: &[(&str, &str)]) -> Self {
        self.domains.push(Domain {
            id: id.to_string(),
            name: format!("{id}-name"),
        });
        self.users.insert(
            id.to_string(),
            users
                .iter()
                .map(|(uid, name)| User {
                    id: (*uid).to_string(),
                    name: (*name).to_string(),
                })
                .collect(),
        );
        self
    }

    pub fn with_project(mut self, domain_id: &str, project_id: &str) -> Self {
        self.projects
            .entry(domain_id.to_string())
            .or_default()
            .push(Project {
                id: project_id.to_string(),
                name: format!("{project_id}-name"),
            });
        self
    }

    pub fn with_instance(mut self, project_id: &str, detail: InstanceDetail) -> Self {
        self.instances
            .entry(project_id.to_string())
            .or_default()
            .push(InstanceSummary {
                id: detail.id.clone(),
                name: detail.name.clone(),
            });
        self.details.insert(detail.id.clone(), detail);
        self
    }

    pub fn failing_job_for(mut self, instance_id: &str) -> Self {
        self.failing_jobs.insert(instance_id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<EnrollmentRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl IdentityDirectory for FakeCloud {
    async fn list_domains(&self) -> Result<Vec<Domain>, CloudError> {
        self.record("list_domains".to_string());
        Ok(self.domains.clone())
    }

    async fn list_users(&self, domain_id: &str) -> Result<Vec<User>, CloudError> {
        self.record(format!("list_users {domain_id}"));
        Ok(self.users.get(domain_id).cloned().unwrap_or_default())
    }

    async fn list_projects(&self, domain_id: &str) -> Result<Vec<Project>, CloudError> {
        self.record(format!("list_projects {domain_id}"));
        Ok(self.projects.get(domain_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ComputeInventory for FakeCloud {
    async fn list_instances(&self, project_id: &str) -> Result<Vec<InstanceSummary>, CloudError> {
        self.record(format!("list_instances {project_id}"));
        Ok(self.instances.get(project_id).cloned().unwrap_or_default())
    }

    async fn get_instance(&self, instance_id: &str) -> Result<InstanceDetail, CloudError> {
        self.record(format!("get_instance {instance_id}"));
        self.details
            .get(instance_id)
            .cloned()
            .ok_or_else(|| {
                CloudError::Other(format!("No server with a name or ID of '{instance_id}'"))
            })
    }
}

#[async_trait]
impl EnrollmentClient for FakeCloud {
    async fn create_job(&self, request: &EnrollmentRequest) -> Result<JobHandle, CloudError> {
        self.record(format!("create_job {}", request.instance_id));
        self.requests.lock().unwrap().push(request.clone());
        if self.failing_jobs.contains(&request.instance_id) {
            return Err(CloudError::CommandFailed {
                program: "workloadmgr".to_string(),
                exit_code: 1,
                stderr: "ERROR: quota exceeded".to_string(),
            });
        }
        Ok(JobHandle {
            job_id: Some(format!("job-{}", request.instance_id)),
            output: String::new(),
        })
    }
}
