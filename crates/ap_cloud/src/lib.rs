//! `ap_cloud` - Cloud clients for autoprotect
//!
//! This crate provides:
//! - The records returned by the identity and compute services
//! - The `IdentityDirectory`, `ComputeInventory` and `EnrollmentClient` traits
//! - CLI-backed implementations (`openstack`, `workloadmgr`)
//! - Command execution with explicit argument vectors and credential redaction
//!
//! # Client Design Principles
//!
//! 1. **One call per level**: every hierarchy level is fetched individually
//! 2. **Structured arguments**: no command string is ever built and re-split
//! 3. **Nothing secret in logs**: command lines and stderr are redacted
//! 4. **Timeout-bounded**: no external call can hang a sweep forever

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

pub mod executor;
pub mod openstack;
pub mod redact;
pub mod workloadmgr;

pub use executor::{CommandOutput, CommandSpec, Executor};
pub use openstack::OpenStackCli;
pub use workloadmgr::WorkloadMgrCli;

/// Errors from the cloud clients
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Command execution failed: {0}")]
    ExecutionError(String),

    #[error("{program} exited with code {exit_code}: {stderr}")]
    CommandFailed {
        program: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Failed to parse output: {0}")]
    ParseError(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Tool not available: {0}")]
    ToolNotFound(String),

    #[error("{0}")]
    Other(String),
}

/// A top-level tenancy boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    #[serde(rename = "ID", alias = "id")]
    pub id: String,
    #[serde(rename = "Name", alias = "name", default)]
    pub name: String,
}

/// A user account within a domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "ID", alias = "id")]
    pub id: String,
    #[serde(rename = "Name", alias = "name", default)]
    pub name: String,
}

/// A project within a domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(rename = "ID", alias = "id")]
    pub id: String,
    #[serde(rename = "Name", alias = "name", default)]
    pub name: String,
}

/// One row of an instance listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSummary {
    #[serde(rename = "ID", alias = "id")]
    pub id: String,
    #[serde(rename = "Name", alias = "name", default)]
    pub name: String,
}

/// Full detail record of one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDetail {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Creation timestamp as reported by the compute service (UTC, offset optional)
    #[serde(default)]
    pub created: String,

    /// Metadata properties, normalised to a map whatever shape the CLI printed
    #[serde(default, deserialize_with = "deserialize_properties")]
    pub properties: BTreeMap<String, String>,

    #[serde(default)]
    pub project_id: Option<String>,
}

impl InstanceDetail {
    /// Whether the property map holds the given key, whatever its value
    #[must_use]
    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }
}

static FLAT_PROPERTY: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"([A-Za-z0-9_.:\-]+)='((?:[^'\\]|\\.)*)'")
        .expect("property pattern is valid")
});

/// Parse the `key='value', other='x'` form older clients print for properties
#[must_use]
pub fn parse_flat_properties(raw: &str) -> BTreeMap<String, String> {
    FLAT_PROPERTY
        .captures_iter(raw)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect()
}

fn deserialize_properties<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect(),
        serde_json::Value::String(raw) => parse_flat_properties(&raw),
        _ => BTreeMap::new(),
    })
}

/// A secret that never shows up in `Debug` output
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for handing to the CLI
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(********)")
    }
}

/// Absolute schedule parameters for one backup job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleParams {
    /// First run date, `MM/DD/YY`
    pub start_date: String,
    /// First run time, `HH:MM AM|PM`
    pub start_time: String,
    /// Interval passed through from configuration
    pub interval: String,
    /// Snapshots to retain
    pub retention: u32,
    /// Always true for newly created jobs
    pub enabled: bool,
}

/// Everything the enrollment client needs to create one backup job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRequest {
    pub domain_id: String,
    pub project_id: String,
    pub operator_id: String,
    pub operator_name: String,
    pub operator_credential: Credential,
    pub instance_id: String,
    pub instance_name: String,
    pub description: String,
    pub schedule: ScheduleParams,
}

impl EnrollmentRequest {
    /// Display name given to the created job
    #[must_use]
    pub fn job_name(&self) -> String {
        format!("workload-{}", self.instance_name)
    }
}

/// Handle to a submitted backup job
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobHandle {
    /// Job id, when the CLI printed one
    pub job_id: Option<String>,
    /// Raw CLI output
    pub output: String,
}

/// Lists domains, users and projects
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// All domains visible to the admin identity
    async fn list_domains(&self) -> Result<Vec<Domain>, CloudError>;

    /// Users of one domain
    async fn list_users(&self, domain_id: &str) -> Result<Vec<User>, CloudError>;

    /// Projects of one domain
    async fn list_projects(&self, domain_id: &str) -> Result<Vec<Project>, CloudError>;
}

/// Lists instances and fetches their detail
#[async_trait]
pub trait ComputeInventory: Send + Sync {
    /// Instances of one project
    async fn list_instances(&self, project_id: &str) -> Result<Vec<InstanceSummary>, CloudError>;

    /// Full detail of one instance
    async fn get_instance(&self, instance_id: &str) -> Result<InstanceDetail, CloudError>;
}

/// Submits backup-job creation requests
#[async_trait]
pub trait EnrollmentClient: Send + Sync {
    /// Submit one job; success means the submission call returned without error
    async fn create_job(&self, request: &EnrollmentRequest) -> Result<JobHandle, CloudError>;
}
