//! Cache generation naming.

use serde::{Deserialize, Serialize};

/// Suffix appended to the version string to name the spreadsheet partition.
const DATA_SUFFIX: &str = "-csv";

/// A versioned set of partitions, identified by a single version string.
///
/// The main partition holds the app shell and same-origin assets; the data
/// partition holds spreadsheet exports. Both belong to exactly one
/// generation and are discarded together when the version changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Generation {
    version: String,
}

impl Generation {
    pub fn new(version: impl Into<String>) -> Self {
        Self { version: version.into() }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Partition name for shell documents and assets.
    pub fn main_partition(&self) -> &str {
        &self.version
    }

    /// Partition name for spreadsheet data.
    pub fn data_partition(&self) -> String {
        format!("{}{DATA_SUFFIX}", self.version)
    }

    /// Whether a partition name belongs to this generation.
    pub fn owns(&self, partition: &str) -> bool {
        partition == self.main_partition() || partition == self.data_partition()
    }
}
