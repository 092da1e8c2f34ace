//! Per-slot finger metadata persistence

use std::collections::BTreeMap;

use parking_lot::RwLock;
use touchpass_types::{FingerRecord, LogicalFingerId};

use crate::error::Result;

/// Key-value store of finger records keyed by library slot
///
/// The sensor holds the templates; this holds what to do when one matches.
#[cfg_attr(test, mockall::automock)]
pub trait FingerStore: Send + Sync {
    /// Insert or replace the record for `slot`
    fn save(&self, slot: u16, record: &FingerRecord) -> Result<()>;

    fn load(&self, slot: u16) -> Result<Option<FingerRecord>>;

    /// Remove the record for `slot`; missing records are not an error
    fn delete(&self, slot: u16) -> Result<()>;

    /// Slot holding the record for `finger_id`, if any
    fn find_by_logical_id(&self, finger_id: LogicalFingerId) -> Result<Option<u16>>;

    /// All slots with a record, ascending
    fn slots(&self) -> Result<Vec<u16>>;

    /// Drop every record
    fn clear(&self) -> Result<()>;
}

/// In-memory [`FingerStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<u16, FingerRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl FingerStore for MemoryStore {
    fn save(&self, slot: u16, record: &FingerRecord) -> Result<()> {
        self.records.write().insert(slot, record.clone());
        Ok(())
    }

    fn load(&self, slot: u16) -> Result<Option<FingerRecord>> {
        Ok(self.records.read().get(&slot).cloned())
    }

    fn delete(&self, slot: u16) -> Result<()> {
        self.records.write().remove(&slot);
        Ok(())
    }

    fn find_by_logical_id(&self, finger_id: LogicalFingerId) -> Result<Option<u16>> {
        Ok(self
            .records
            .read()
            .iter()
            .find(|(_, record)| record.finger_id == finger_id)
            .map(|(slot, _)| *slot))
    }

    fn slots(&self) -> Result<Vec<u16>> {
        Ok(self.records.read().keys().copied().collect())
    }

    fn clear(&self) -> Result<()> {
        self.records.write().clear();
        Ok(())
    }
}
