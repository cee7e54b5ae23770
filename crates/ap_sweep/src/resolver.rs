//! Backup operator lookup
//!
//! The operator is matched by display name, case-sensitively, against the
//! users of one domain. Absence is a normal result, not an error.

use ap_cloud::{CloudError, IdentityDirectory};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The backup-admin account of one domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorIdentity {
    pub id: String,
    pub name: String,
    pub domain_id: String,
}

/// Find the first user of `domain_id` named exactly `operator_name`.
///
/// # Errors
///
/// Returns the directory's [`CloudError`] when the user listing fails.
pub async fn resolve_operator(
    directory: &dyn IdentityDirectory,
    domain_id: &str,
    operator_name: &str,
) -> Result<Option<OperatorIdentity>, CloudError> {
    let users = directory.list_users(domain_id).await?;
    let found = users
        .into_iter()
        .find(|u| u.name == operator_name)
        .map(|u| OperatorIdentity {
            id: u.id,
            name: u.name,
            domain_id: domain_id.to_string(),
        });

    debug!(
        domain_id,
        operator = operator_name,
        found = found.is_some(),
        "Resolved backup operator"
    );
    Ok(found)
}
