use std::collections::BTreeSet;

use crate::config::ScreenConfig;
use crate::errors::{InvalidHandleReason, Result, ScreenError};
use crate::record::{KindFilter, ResourceRecord, WindowKind};
use crate::registry::{Handle, MAX_GENERATION};

enum Slot {
    Vacant { generation: u32 },
    Occupied { generation: u32, record: Box<ResourceRecord> },
}

/// Slot table of all live records.
///
/// The table grows in fixed chunks and never shrinks. New records always take the lowest
/// free index, so handle numbers stay small and predictable for the host.
pub struct Registry {
    slots: Vec<Slot>,
    free: BTreeSet<u32>,
    live: usize,
    chunk_size: usize,
    max_records: Option<usize>,
}

impl Registry {
    pub fn new(chunk_size: usize, max_records: Option<usize>) -> Self {
        Self {
            slots: Vec::new(),
            free: BTreeSet::new(),
            live: 0,
            chunk_size: chunk_size.max(1),
            max_records,
        }
    }

    pub fn from_config(config: &ScreenConfig) -> Self {
        Self::new(config.registry_chunk_size, config.max_records)
    }

    /// Allocates the lowest free slot for a new, not yet valid, record of `kind`.
    pub fn allocate(&mut self, kind: WindowKind) -> Result<Handle> {
        if let Some(max) = self.max_records {
            if self.live >= max {
                return Err(ScreenError::CapacityExceeded(format!(
                    "maximum number of {max} open windows and textures reached"
                )));
            }
        }
        if self.free.is_empty() {
            self.grow()?;
        }

        let index = self
            .free
            .pop_first()
            .ok_or_else(|| ScreenError::CapacityExceeded("no free registry slot after growth".into()))?;
        let slot = &mut self.slots[index as usize];
        let generation = match slot {
            Slot::Vacant { generation } => *generation,
            Slot::Occupied { .. } => {
                return Err(ScreenError::CapacityExceeded(format!(
                    "free list points at occupied slot {index}"
                )))
            }
        };

        let handle = Handle::new(index, generation);
        *slot = Slot::Occupied {
            generation,
            record: Box::new(ResourceRecord::new(handle, kind)),
        };
        self.live += 1;
        Ok(handle)
    }

    fn grow(&mut self) -> Result<()> {
        let old = self.slots.len();
        let new = old + self.chunk_size;
        if new > u32::MAX as usize {
            return Err(ScreenError::CapacityExceeded(format!(
                "registry cannot grow beyond {old} slots"
            )));
        }
        self.slots.try_reserve_exact(self.chunk_size).map_err(|e| {
            ScreenError::CapacityExceeded(format!("growing registry to {new} slots failed: {e}"))
        })?;
        for index in old..new {
            self.slots.push(Slot::Vacant { generation: 0 });
            self.free.insert(index as u32);
        }
        log::debug!("Registry grown from {old} to {new} slots");
        Ok(())
    }

    /// Removes a record from the table, also freeing its deferred gamma table.
    ///
    /// Partially constructed records can be released as well. GPU objects are the
    /// responsibility of the caller and must already be gone.
    pub fn release(&mut self, handle: Handle) -> Result<Box<ResourceRecord>> {
        self.occupied(handle)?;

        let index = handle.index();
        let generation = handle.generation().saturating_add(1);
        let vacant = Slot::Vacant { generation };
        match std::mem::replace(&mut self.slots[index as usize], vacant) {
            Slot::Occupied { mut record, .. } => {
                record.pending_gamma.take();
                if generation > MAX_GENERATION {
                    // every handle of this slot stays stale from now on
                    log::warn!("Registry: slot {index} exhausted its generations and is retired");
                } else {
                    self.free.insert(index);
                }
                self.live -= 1;
                Ok(record)
            }
            Slot::Vacant { .. } => Err(ScreenError::InvalidHandle {
                handle,
                reason: InvalidHandleReason::Empty,
            }),
        }
    }

    fn occupied(&self, handle: Handle) -> Result<&ResourceRecord> {
        let slot = self.slots.get(handle.index() as usize).ok_or(ScreenError::InvalidHandle {
            handle,
            reason: InvalidHandleReason::OutOfRange,
        })?;
        match slot {
            Slot::Occupied { generation, record } if *generation == handle.generation() => Ok(record),
            Slot::Occupied { .. } => Err(ScreenError::InvalidHandle {
                handle,
                reason: InvalidHandleReason::Stale,
            }),
            Slot::Vacant { generation } => Err(ScreenError::InvalidHandle {
                handle,
                reason: if handle.generation() < *generation {
                    InvalidHandleReason::Stale
                } else {
                    InvalidHandleReason::Empty
                },
            }),
        }
    }

    fn occupied_mut(&mut self, handle: Handle) -> Result<&mut ResourceRecord> {
        self.occupied(handle)?;
        match &mut self.slots[handle.index() as usize] {
            Slot::Occupied { record, .. } => Ok(record),
            Slot::Vacant { .. } => Err(ScreenError::InvalidHandle {
                handle,
                reason: InvalidHandleReason::Empty,
            }),
        }
    }

    /// Resolves a handle to a fully constructed record.
    pub fn lookup(&self, handle: Handle) -> Result<&ResourceRecord> {
        let record = self.occupied(handle)?;
        if !record.is_valid() {
            log::error!("Window[{handle}]: lookup of partially constructed record");
            return Err(ScreenError::CorruptRecord { handle });
        }
        Ok(record)
    }

    pub fn lookup_mut(&mut self, handle: Handle) -> Result<&mut ResourceRecord> {
        let record = self.occupied_mut(handle)?;
        if !record.is_valid() {
            log::error!("Window[{handle}]: lookup of partially constructed record");
            return Err(ScreenError::CorruptRecord { handle });
        }
        Ok(record)
    }

    /// Access to a record while it is being populated, before it is marked valid.
    pub(crate) fn construct_mut(&mut self, handle: Handle) -> Result<&mut ResourceRecord> {
        self.occupied_mut(handle)
    }

    pub(crate) fn mark_valid(&mut self, handle: Handle) -> Result<()> {
        self.occupied_mut(handle)?.set_valid();
        Ok(())
    }

    /// True if `handle` refers to a live, fully constructed record.
    pub fn contains(&self, handle: Handle) -> bool {
        self.occupied(handle).map(|r| r.is_valid()).unwrap_or(false)
    }

    /// Snapshot of matching handles in ascending index order.
    ///
    /// The returned list is a copy: records may be opened or closed while iterating it, so
    /// every entry has to be looked up again before use.
    pub fn enumerate(&self, filter: KindFilter) -> Vec<Handle> {
        self.records()
            .filter(|r| r.is_valid() && filter.matches(r.kind()))
            .map(|r| r.handle())
            .collect()
    }

    pub fn count(&self, filter: KindFilter) -> usize {
        self.records()
            .filter(|r| r.is_valid() && filter.matches(r.kind()))
            .count()
    }

    fn records(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied { record, .. } => Some(record.as_ref()),
            Slot::Vacant { .. } => None,
        })
    }

    /// Number of occupied slots, including records still under construction.
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::from_config(&ScreenConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(reg: &mut Registry, kind: WindowKind) -> Handle {
        let h = reg.allocate(kind).unwrap();
        reg.mark_valid(h).unwrap();
        h
    }

    #[test]
    fn live_count_tracks_allocations_and_releases() {
        let mut reg = Registry::new(4, None);
        let a = open(&mut reg, WindowKind::Onscreen);
        let b = open(&mut reg, WindowKind::Texture);
        let c = open(&mut reg, WindowKind::Texture);
        assert_eq!(reg.live(), 3);
        assert_eq!(reg.count(KindFilter::Any), 3);
        assert_eq!(reg.count(KindFilter::Textures), 2);

        reg.release(b).unwrap();
        assert_eq!(reg.live(), 2);
        assert_eq!(reg.enumerate(KindFilter::Any), vec![a, c]);
        assert!(reg.live() <= reg.capacity());
    }

    #[test]
    fn allocation_picks_lowest_free_index() {
        let mut reg = Registry::new(8, None);
        let handles: Vec<_> = (0..5).map(|_| open(&mut reg, WindowKind::Texture)).collect();
        reg.release(handles[3]).unwrap();
        reg.release(handles[1]).unwrap();

        let reused = open(&mut reg, WindowKind::Texture);
        assert_eq!(reused.index(), 1);
        assert_eq!(reused.generation(), 1);
        assert_eq!(open(&mut reg, WindowKind::Texture).index(), 3);
        assert_eq!(open(&mut reg, WindowKind::Texture).index(), 5);
    }

    #[test]
    fn stale_and_unknown_handles_are_rejected() {
        let mut reg = Registry::new(2, None);
        let h = open(&mut reg, WindowKind::Offscreen);
        reg.release(h).unwrap();

        let err = reg.lookup(h).unwrap_err();
        assert!(matches!(err, ScreenError::InvalidHandle { reason: InvalidHandleReason::Stale, .. }));

        // reopening the slot must not resurrect the old handle
        let again = open(&mut reg, WindowKind::Offscreen);
        assert_eq!(again.index(), h.index());
        assert!(matches!(
            reg.lookup(h).unwrap_err(),
            ScreenError::InvalidHandle { reason: InvalidHandleReason::Stale, .. }
        ));

        let far = Handle::new(100, 0);
        assert!(matches!(
            reg.lookup(far).unwrap_err(),
            ScreenError::InvalidHandle { reason: InvalidHandleReason::OutOfRange, .. }
        ));
        assert!(matches!(
            reg.lookup(Handle::new(1, 0)).unwrap_err(),
            ScreenError::InvalidHandle { reason: InvalidHandleReason::Empty, .. }
        ));
        assert!(reg.release(h).is_err());
    }

    #[test]
    fn exhausted_slots_are_retired() {
        let mut reg = Registry::new(2, None);
        let first = open(&mut reg, WindowKind::Texture);
        reg.release(first).unwrap();
        reg.slots[0] = Slot::Vacant {
            generation: MAX_GENERATION,
        };

        let last = open(&mut reg, WindowKind::Texture);
        assert_eq!((last.index(), last.generation()), (0, MAX_GENERATION));
        reg.release(last).unwrap();

        let next = open(&mut reg, WindowKind::Texture);
        assert_eq!(next.index(), 1);
        assert!(matches!(
            reg.lookup(last),
            Err(ScreenError::InvalidHandle { reason: InvalidHandleReason::Stale, .. })
        ));
        assert!(matches!(
            reg.lookup(first),
            Err(ScreenError::InvalidHandle { reason: InvalidHandleReason::Stale, .. })
        ));
        assert_eq!(reg.capacity(), 2);
        assert_eq!(reg.live(), 1);
    }

    #[test]
    fn partially_constructed_records_are_corrupt_for_lookup() {
        let mut reg = Registry::new(2, None);
        let h = reg.allocate(WindowKind::Texture).unwrap();

        let err = reg.lookup(h).unwrap_err();
        assert!(matches!(err, ScreenError::CorruptRecord { .. }));
        assert!(err.is_fatal());
        assert!(reg.enumerate(KindFilter::Any).is_empty());

        // still releasable
        reg.release(h).unwrap();
        assert_eq!(reg.live(), 0);
    }

    #[test]
    fn growth_chunk_does_not_change_handles() {
        let script = |reg: &mut Registry| {
            let mut out = Vec::new();
            for i in 0..10 {
                let h = open(reg, WindowKind::Texture);
                out.push(h);
                if i % 3 == 2 {
                    reg.release(out[i - 1]).unwrap();
                }
            }
            (out, reg.enumerate(KindFilter::Any))
        };

        let mut small = Registry::new(2, None);
        let mut large = Registry::new(4096, None);
        assert_eq!(script(&mut small), script(&mut large));
        assert_eq!(small.capacity() % 2, 0);
        assert_eq!(large.capacity(), 4096);
    }

    #[test]
    fn capacity_grows_in_chunks_and_never_shrinks() {
        let mut reg = Registry::new(3, None);
        let handles: Vec<_> = (0..4).map(|_| open(&mut reg, WindowKind::Texture)).collect();
        assert_eq!(reg.capacity(), 6);
        for h in handles {
            reg.release(h).unwrap();
        }
        assert_eq!(reg.capacity(), 6);
    }

    #[test]
    fn record_limit_reports_capacity_exceeded() {
        let mut reg = Registry::new(4, Some(2));
        open(&mut reg, WindowKind::Texture);
        open(&mut reg, WindowKind::Texture);
        let err = reg.allocate(WindowKind::Texture).unwrap_err();
        assert!(matches!(err, ScreenError::CapacityExceeded(_)));
    }

    #[test]
    fn enumeration_is_a_snapshot() {
        let mut reg = Registry::new(4, None);
        for _ in 0..3 {
            open(&mut reg, WindowKind::Texture);
        }
        for h in reg.enumerate(KindFilter::Any) {
            // closing while walking the snapshot is fine
            reg.release(h).unwrap();
            open(&mut reg, WindowKind::Proxy);
        }
        assert_eq!(reg.count(KindFilter::Proxies), 3);
    }
}
