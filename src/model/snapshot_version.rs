use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::model::timestamp::Timestamp;

/// Monotonic server-assigned version establishing happens-before between
/// document states.
///
/// `SnapshotVersion::MIN` is the zero version: it marks state that has never
/// been confirmed by the server, and it is the version carried by manufactured
/// tombstones that must never enter the remote document cache.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SnapshotVersion(Timestamp);

impl SnapshotVersion {
    pub const MIN: SnapshotVersion = SnapshotVersion(Timestamp {
        seconds: 0,
        nanos: 0,
    });

    pub fn new(timestamp: Timestamp) -> Self {
        Self(timestamp)
    }

    pub fn from_seconds_and_nanos(seconds: i64, nanos: i32) -> Self {
        Self(Timestamp::new(seconds, nanos))
    }

    pub fn timestamp(&self) -> Timestamp {
        self.0
    }

    pub fn is_min(&self) -> bool {
        *self == Self::MIN
    }

    pub fn to_microseconds(&self) -> i64 {
        self.0.to_microseconds()
    }
}

impl Default for SnapshotVersion {
    fn default() -> Self {
        Self::MIN
    }
}

impl Display for SnapshotVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}", self.0.seconds, self.0.nanos)
    }
}
