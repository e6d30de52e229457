//! Partition identifiers shared by the write path, the store and change events.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The partition a stored resource lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionId {
    /// The unnamed default partition.
    Default,
    /// A numbered partition.
    Numbered(i32),
}

impl PartitionId {
    /// Numeric id, `None` for the unnamed default partition.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            PartitionId::Default => None,
            PartitionId::Numbered(id) => Some(*id),
        }
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionId::Default => write!(f, "default"),
            PartitionId::Numbered(id) => write!(f, "{id}"),
        }
    }
}

/// The partitions a read or search is allowed to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestPartition {
    /// Every partition.
    All,
    /// Exactly one partition.
    One(PartitionId),
}

impl RequestPartition {
    /// Check whether a resource stored in `partition` is visible.
    pub fn contains(&self, partition: &PartitionId) -> bool {
        match self {
            RequestPartition::All => true,
            RequestPartition::One(p) => p == partition,
        }
    }
}

impl From<PartitionId> for RequestPartition {
    fn from(partition: PartitionId) -> Self {
        RequestPartition::One(partition)
    }
}
