//! ap_sweep - Backup auto-enrollment sweep
//!
//! This crate provides:
//! - Backup operator resolution per domain
//! - Age and protection classification of instances
//! - Schedule planning for new backup jobs
//! - The domain/project/instance sweep with per-item outcomes
//! - A file lease so only one sweep runs per host

use ap_cloud::CloudError;
use thiserror::Error;

pub mod classifier;
pub mod clock;
pub mod lease;
pub mod orchestrator;
pub mod planner;
pub mod report;
pub mod resolver;

pub use classifier::{ClassifyError, Protection, ProtectionClassifier, parse_created};
pub use clock::{Clock, FixedClock, SystemClock};
pub use lease::{LeaseError, LeaseState, SweepLease};
pub use orchestrator::Sweeper;
pub use planner::{PlanError, plan};
pub use report::{Outcome, OutcomeKind, SweepReport};
pub use resolver::{OperatorIdentity, resolve_operator};

/// Errors that abort a whole sweep
#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Domain listing failed: {0}")]
    Directory(CloudError),

    #[error("Schedule error: {0}")]
    Plan(#[from] PlanError),

    #[error("Lease error: {0}")]
    Lease(#[from] LeaseError),
}
