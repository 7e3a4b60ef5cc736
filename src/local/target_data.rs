use crate::local::persistence::ListenSequenceNumber;
use crate::model::SnapshotVersion;
use crate::query::Query;
use crate::remote::TargetId;

/// Reason a target is being tracked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetPurpose {
    /// Server listen requested by a user query.
    Listen,
    /// Re-listen after the server's existence filter disagreed with the
    /// local membership set.
    ExistenceFilterMismatch,
    /// Targeted lookup resolving a limbo document.
    LimboResolution,
}

/// Persisted state of one server-side listen.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetData {
    target: Query,
    target_id: TargetId,
    purpose: TargetPurpose,
    sequence_number: ListenSequenceNumber,
    snapshot_version: SnapshotVersion,
    last_limbo_free_snapshot_version: SnapshotVersion,
    resume_token: Vec<u8>,
}

impl TargetData {
    pub fn new(
        target: Query,
        target_id: TargetId,
        purpose: TargetPurpose,
        sequence_number: ListenSequenceNumber,
    ) -> Self {
        Self {
            target,
            target_id,
            purpose,
            sequence_number,
            snapshot_version: SnapshotVersion::MIN,
            last_limbo_free_snapshot_version: SnapshotVersion::MIN,
            resume_token: Vec::new(),
        }
    }

    pub fn target(&self) -> &Query {
        &self.target
    }

    pub fn target_id(&self) -> TargetId {
        self.target_id
    }

    pub fn purpose(&self) -> TargetPurpose {
        self.purpose
    }

    pub fn sequence_number(&self) -> ListenSequenceNumber {
        self.sequence_number
    }

    pub fn snapshot_version(&self) -> SnapshotVersion {
        self.snapshot_version
    }

    pub fn last_limbo_free_snapshot_version(&self) -> SnapshotVersion {
        self.last_limbo_free_snapshot_version
    }

    pub fn resume_token(&self) -> &[u8] {
        &self.resume_token
    }

    pub fn with_sequence_number(&self, sequence_number: ListenSequenceNumber) -> Self {
        Self {
            sequence_number,
            ..self.clone()
        }
    }

    pub fn with_resume_token(
        &self,
        resume_token: Vec<u8>,
        snapshot_version: SnapshotVersion,
    ) -> Self {
        Self {
            resume_token,
            snapshot_version,
            ..self.clone()
        }
    }

    pub fn with_last_limbo_free_snapshot_version(&self, version: SnapshotVersion) -> Self {
        Self {
            last_limbo_free_snapshot_version: version,
            ..self.clone()
        }
    }
}
