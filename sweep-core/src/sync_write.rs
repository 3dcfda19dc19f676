//! Batched goal writes.
//!
//! Accumulates one encoded payload per servo and transmits them to a fixed
//! register as a single bus transaction. Batches are single-use: the
//! sequencer fills, commits, and clears the batch every cycle.

use core::fmt;

use heapless::Vec;

use crate::bus::{DeviceError, DeviceProtocol, Register, ServoId, SyncEntry};
use crate::codec::ENCODED_POSITION_LEN;
use crate::config::MAX_SERVOS;

/// Rejected insertion into the pending batch.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BatchError {
    /// The id already has a payload in the uncommitted batch.
    DuplicateId(ServoId),
    /// The bounded entry store is full.
    Capacity,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Pending multi-servo register write, committed as one frame.
pub struct SyncWriteBatch<const N: usize = MAX_SERVOS> {
    register: Register,
    entries: Vec<SyncEntry, N>,
}

impl<const N: usize> SyncWriteBatch<N> {
    /// Creates an empty batch addressing `register`.
    #[must_use]
    pub const fn new(register: Register) -> Self {
        Self {
            register,
            entries: Vec::new(),
        }
    }

    /// Queues `payload` for `id`, preserving insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::DuplicateId`] when the id already has a
    /// payload queued, or [`BatchError::Capacity`] when the store is full.
    pub fn add(
        &mut self,
        id: ServoId,
        payload: [u8; ENCODED_POSITION_LEN],
    ) -> Result<(), BatchError> {
        if self.entries.iter().any(|entry| entry.id == id) {
            return Err(BatchError::DuplicateId(id));
        }
        self.entries
            .push(SyncEntry { id, payload })
            .map_err(|_| BatchError::Capacity)
    }

    /// Transmits every queued entry as one transaction. A batch with no
    /// entries commits as a no-op.
    ///
    /// The entries stay queued on failure so the caller can inspect them;
    /// the sequencer clears the batch unconditionally either way.
    ///
    /// # Errors
    ///
    /// Propagates the transaction failure from the protocol handler.
    pub fn commit<P: DeviceProtocol>(&self, proto: &mut P) -> Result<(), DeviceError> {
        if self.entries.is_empty() {
            return Ok(());
        }
        proto.sync_write(self.register, &self.entries)
    }

    /// Drops all pending entries. Never fails.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[SyncEntry] {
        &self.entries
    }
}
