//! Model version identifiers
//!
//! A version is the UTC creation time of a training run rendered as
//! `v_<YYYYMMDD_HHMMSS>`. The fixed-width layout makes lexicographic order
//! match chronological order.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

const VERSION_PREFIX: &str = "v_";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^v_[0-9]{8}_[0-9]{6}$").unwrap());

/// Immutable identifier of one training run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelVersion(String);

impl ModelVersion {
    /// Version for a run created now
    pub fn generate() -> Self {
        Self::from_timestamp(Utc::now())
    }

    /// Version for a run created at `timestamp` (sub-second precision is dropped)
    pub fn from_timestamp(timestamp: DateTime<Utc>) -> Self {
        Self(format!(
            "{}{}",
            VERSION_PREFIX,
            timestamp.format(TIMESTAMP_FORMAT)
        ))
    }

    /// Parse and validate a version string
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();

        if !VERSION_PATTERN.is_match(&value) {
            return Err(DomainError::data(format!(
                "Invalid model version '{}': expected v_<YYYYMMDD_HHMMSS>",
                value
            )));
        }

        NaiveDateTime::parse_from_str(&value[VERSION_PREFIX.len()..], TIMESTAMP_FORMAT).map_err(
            |e| DomainError::data(format!("Invalid model version '{}': {}", value, e)),
        )?;

        Ok(Self(value))
    }

    /// Creation time encoded in the version
    pub fn created_at(&self) -> DateTime<Utc> {
        let naive =
            NaiveDateTime::parse_from_str(&self.0[VERSION_PREFIX.len()..], TIMESTAMP_FORMAT)
                .unwrap_or_default();
        Utc.from_utc_datetime(&naive)
    }

    /// The version one second later
    pub fn next(&self) -> Self {
        Self::from_timestamp(self.created_at() + Duration::seconds(1))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ModelVersion {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ModelVersion> for String {
    fn from(version: ModelVersion) -> Self {
        version.0
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
