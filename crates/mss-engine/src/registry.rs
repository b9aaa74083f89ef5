//! Buffer registry: generation-checked handles plus an address index.
//!
//! The registry is the one process-wide mutable structure. Its lock is
//! held only to find, insert or remove an entry; byte copies run under
//! the entry's own locks after the registry lock is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use mss_core::{BufferId, MssError};

use crate::entry::BufferEntry;

struct Slot<T> {
    generation: u32,
    data: Option<T>,
}

/// Slot+generation table handing out [`BufferId`]s.
///
/// Removal bumps the slot generation, so a stale id never resolves. A
/// slot whose generation wraps to zero is retired instead of recycled.
pub(crate) struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    live: usize,
}

impl<T> HandleTable<T> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Insert the value built by `make` for the id it will live under.
    ///
    /// Returns `None` only when every one of the 2^32 slots is in use or
    /// retired.
    pub(crate) fn insert_with(&mut self, make: impl FnOnce(BufferId) -> T) -> Option<BufferId> {
        let slot_idx = match self.free_list.pop() {
            Some(idx) => idx,
            None => {
                let idx = u32::try_from(self.slots.len()).ok()?;
                self.slots.push(Slot {
                    generation: 0,
                    data: None,
                });
                idx
            }
        };
        let slot = &mut self.slots[slot_idx as usize];
        let id = BufferId::new(slot_idx, slot.generation);
        slot.data = Some(make(id));
        self.live += 1;
        Some(id)
    }

    pub(crate) fn get(&self, id: BufferId) -> Option<&T> {
        let slot = self.slots.get(id.slot() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.data.as_ref()
    }

    pub(crate) fn remove(&mut self, id: BufferId) -> Option<T> {
        let slot_idx = id.slot();
        let slot = self.slots.get_mut(slot_idx as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let value = slot.data.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        // A wrapped generation would match ids issued in the slot's first epoch.
        if slot.generation != 0 {
            self.free_list.push(slot_idx);
        }
        self.live -= 1;
        Some(value)
    }

    /// Remove every live value in slot order.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let ids: Vec<BufferId> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.data.is_some())
            .map(|(i, s)| BufferId::new(i as u32, s.generation))
            .collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }
}

struct RegistryInner {
    table: HandleTable<Arc<BufferEntry>>,
    by_address: HashMap<usize, BufferId>,
    closed: bool,
}

/// Maps [`BufferId`]s and active-buffer base addresses to entries.
pub(crate) struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                table: HandleTable::new(),
                by_address: HashMap::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryInner>, MssError> {
        self.inner.lock().map_err(|_| MssError::Internal {
            reason: "buffer registry poisoned".into(),
        })
    }

    /// Register a new entry built for the id it is assigned.
    ///
    /// Fails with `NotInitialized` once the registry has been drained.
    pub(crate) fn register(
        &self,
        build: impl FnOnce(BufferId) -> BufferEntry,
    ) -> Result<Arc<BufferEntry>, MssError> {
        let mut inner = self.lock()?;
        if inner.closed {
            return Err(MssError::NotInitialized);
        }
        let id = inner
            .table
            .insert_with(|id| Arc::new(build(id)))
            .ok_or_else(|| MssError::Internal {
                reason: "buffer handle space exhausted".into(),
            })?;
        let entry = match inner.table.get(id) {
            Some(entry) => Arc::clone(entry),
            None => {
                return Err(MssError::Internal {
                    reason: "inserted entry vanished".into(),
                })
            }
        };
        if inner.by_address.insert(entry.address(), id).is_some() {
            inner.table.remove(id);
            return Err(MssError::Internal {
                reason: format!("address {:#x} registered twice", entry.address()),
            });
        }
        Ok(entry)
    }

    pub(crate) fn lookup(&self, id: BufferId) -> Result<Arc<BufferEntry>, MssError> {
        self.lock()?
            .table
            .get(id)
            .cloned()
            .ok_or(MssError::NotFound { buffer: id })
    }

    pub(crate) fn lookup_address(&self, address: usize) -> Result<BufferId, MssError> {
        self.lock()?
            .by_address
            .get(&address)
            .copied()
            .ok_or(MssError::UnknownAddress { address })
    }

    /// Remove an entry; a second call for the same id reports `NotFound`.
    pub(crate) fn unregister(&self, id: BufferId) -> Result<Arc<BufferEntry>, MssError> {
        let mut inner = self.lock()?;
        let entry = inner
            .table
            .remove(id)
            .ok_or(MssError::NotFound { buffer: id })?;
        inner.by_address.remove(&entry.address());
        Ok(entry)
    }

    /// Close the registry and hand back every remaining entry.
    pub(crate) fn drain(&self) -> Vec<Arc<BufferEntry>> {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.closed = true;
        inner.by_address.clear();
        inner.table.drain()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().map(|inner| inner.table.len()).unwrap_or(0)
    }
}
