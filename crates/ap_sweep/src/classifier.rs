//! Protection classifier
//!
//! Decides from an instance's detail record whether it needs enrollment.
//! Age is checked before protection, so a protected instance that is still
//! younger than the threshold reports as too young.

use ap_cloud::InstanceDetail;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("Unparsable creation timestamp '{value}': {reason}")]
    BadTimestamp { value: String, reason: String },
}

/// Protection state of one instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protection {
    /// Already enrolled in a backup job
    Protected,
    /// Younger than the age threshold
    TooYoung,
    /// Old enough and not enrolled
    Eligible,
}

/// Parse a compute `created` timestamp as UTC.
///
/// Accepts RFC 3339 with an offset, or `YYYY-MM-DDTHH:MM:SS[.frac]` with or
/// without a trailing `Z`.
///
/// # Errors
///
/// Returns [`ClassifyError::BadTimestamp`] when neither form matches.
pub fn parse_created(raw: &str) -> Result<DateTime<Utc>, ClassifyError> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|n| n.and_utc())
        .map_err(|e| ClassifyError::BadTimestamp {
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

/// Classifier configured with an age threshold and the enrollment marker key
#[derive(Debug, Clone)]
pub struct ProtectionClassifier {
    min_age: TimeDelta,
    marker_key: String,
}

impl ProtectionClassifier {
    #[must_use]
    pub fn new(min_age: TimeDelta, marker_key: impl Into<String>) -> Self {
        Self {
            min_age,
            marker_key: marker_key.into(),
        }
    }

    /// Classify one instance at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError`] when the instance's creation time cannot be read.
    pub fn classify(
        &self,
        vm: &InstanceDetail,
        now: DateTime<Utc>,
    ) -> Result<Protection, ClassifyError> {
        let created = parse_created(&vm.created)?;
        if now - created < self.min_age {
            return Ok(Protection::TooYoung);
        }
        if vm.has_property(&self.marker_key) {
            Ok(Protection::Protected)
        } else {
            Ok(Protection::Eligible)
        }
    }
}
