use serde::{Deserialize, Serialize};
use std::fmt;

/// 1-based worker number, as the host counts its worker processes.
pub type WorkerId = u16;

/// Slot index inside one worker (the async id of a request).
pub type SlotId = u16;

/// Process-unique id of one interpreter instance.
pub type InstanceId = u64;

/// Coordinates of one execution slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotRef {
    pub worker: WorkerId,
    pub slot: SlotId,
}

impl SlotRef {
    pub fn new(worker: WorkerId, slot: SlotId) -> Self {
        Self { worker, slot }
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.worker, self.slot)
    }
}

/// Typed handle to a value kept alive inside one interpreter instance.
///
/// The host may store and copy a `StoredRef` freely (the RPC and signal tables
/// do), but it is only meaningful to the instance that created it. Resolution
/// compares `instance` against the resolving instance and rejects mismatches
/// rather than reading some other registry entry at the same index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoredRef {
    pub instance: InstanceId,
    pub owner: SlotRef,
    pub index: u32,
}

impl StoredRef {
    /// Registry index reserved for the cached application entry point.
    pub const ENTRY_POINT_INDEX: u32 = 0;

    pub fn is_entry_point(&self) -> bool {
        self.index == Self::ENTRY_POINT_INDEX
    }
}

impl fmt::Display for StoredRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref#{}@{}(slot {})", self.index, self.instance, self.owner)
    }
}
