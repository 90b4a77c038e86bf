//! Logical database targets.

use crate::error::{DbError, DbResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two databases this server can address.
///
/// The wire names (`master`, `datamgmt`) are what callers pass as the
/// `target` argument and what appears as the first segment of resource URIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum DatabaseTarget {
    /// Administrative database
    #[serde(rename = "master")]
    Master,
    /// Data-management database
    #[serde(rename = "datamgmt")]
    DataMgmt,
}

impl DatabaseTarget {
    pub const ALL: [DatabaseTarget; 2] = [DatabaseTarget::Master, DatabaseTarget::DataMgmt];

    /// Wire name used in arguments and URIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::DataMgmt => "datamgmt",
        }
    }

    /// Prefix of the environment variables configuring this target.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::Master => "MASTER_DB",
            Self::DataMgmt => "DATA_MGMT_DB",
        }
    }
}

impl fmt::Display for DatabaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseTarget {
    type Err = DbError;

    fn from_str(s: &str) -> DbResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "master" => Ok(Self::Master),
            "datamgmt" => Ok(Self::DataMgmt),
            other => Err(DbError::not_found(format!(
                "database target '{other}' (expected 'master' or 'datamgmt')"
            ))),
        }
    }
}
