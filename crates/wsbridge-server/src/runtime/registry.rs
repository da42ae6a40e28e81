//! Stored-reference registry
//!
//! Values that must outlive a single call (the cached entry point, signal
//! handlers, RPC functions) are kept here and handed out as typed
//! [`StoredRef`] handles. A registry belongs to exactly one interpreter
//! instance; every resolution checks the handle's instance id first.

use boa_engine::JsValue;
use wsbridge_common::protocol::{BridgeError, InstanceId, Result, SlotRef, StoredRef};

pub struct ReferenceRegistry {
    instance: InstanceId,
    owner: SlotRef,
    entries: Vec<Option<JsValue>>,
}

impl ReferenceRegistry {
    /// Creates an empty registry with the entry-point index reserved.
    pub fn new(instance: InstanceId, owner: SlotRef) -> Self {
        Self {
            instance,
            owner,
            entries: vec![None],
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Caches `value` under the reserved entry-point index.
    pub fn set_entry_point(&mut self, value: JsValue) -> StoredRef {
        self.entries[StoredRef::ENTRY_POINT_INDEX as usize] = Some(value);
        self.handle(StoredRef::ENTRY_POINT_INDEX)
    }

    /// Keeps `value` alive and returns a handle to it.
    pub fn store(&mut self, value: JsValue) -> StoredRef {
        let index = self.entries.len() as u32;
        self.entries.push(Some(value));
        self.handle(index)
    }

    /// Looks `handle` up in this registry.
    ///
    /// # Errors
    ///
    /// - `BridgeError::ForeignHandle` if the handle was created by another
    ///   instance
    /// - `BridgeError::DanglingHandle` if nothing is stored at its index
    pub fn resolve(&self, handle: StoredRef) -> Result<JsValue> {
        if handle.instance != self.instance {
            return Err(BridgeError::ForeignHandle {
                handle,
                instance: self.instance,
            });
        }
        self.entries
            .get(handle.index as usize)
            .and_then(|entry| entry.clone())
            .ok_or(BridgeError::DanglingHandle(handle))
    }

    /// Drops the value behind `handle`. Its index is never handed out again.
    pub fn release(&mut self, handle: StoredRef) {
        if handle.instance != self.instance {
            return;
        }
        if let Some(entry) = self.entries.get_mut(handle.index as usize) {
            *entry = None;
        }
    }

    /// Number of stored values, the reserved entry point included once set.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every stored value. Handles handed out earlier become dangling.
    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|entry| *entry = None);
    }

    fn handle(&self, index: u32) -> StoredRef {
        StoredRef {
            instance: self.instance,
            owner: self.owner,
            index,
        }
    }
}
