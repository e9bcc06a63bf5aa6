//! # Sync Points
//!
//! A sync point names the output of one recorded command. Each one owns the
//! completion event the command signals; later commands wait on it by
//! listing the sync point in their wait-list.
//!
//! The registry also keeps a flat list of every tracked native event, in
//! registration order. Finalization resets the whole list on the reset list
//! and makes the closing barrier wait on it.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;

use replay_core::Event;
use replay_hal::{Error, EventHandle, Result};

/// Dependency token for a recorded command
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SyncPoint(u32);

impl SyncPoint {
    /// Rebuild a sync point from its raw value
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw value
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SyncPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sp{}", self.0)
    }
}

/// Sync point to event mapping of one graph
#[derive(Debug, Default)]
pub struct SyncPointRegistry {
    events: HashMap<SyncPoint, Arc<Event>>,
    tracked: Vec<EventHandle>,
    next: u32,
}

impl SyncPointRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next registration will use
    #[inline]
    pub fn next(&self) -> SyncPoint {
        SyncPoint(self.next)
    }

    /// Bind `sync_point` to `event`
    ///
    /// Ids are handed out in order and never reused.
    pub fn register(&mut self, sync_point: SyncPoint, event: Arc<Event>) -> Result<()> {
        if sync_point != self.next() {
            return Err(Error::InvalidValue);
        }
        let next = self.next.checked_add(1).ok_or(Error::OutOfHostMemory)?;
        self.tracked.try_reserve(1)?;
        self.events.try_reserve(1).map_err(|_| Error::OutOfHostMemory)?;

        self.tracked.push(event.native());
        self.events.insert(sync_point, event);
        self.next = next;
        Ok(())
    }

    /// Events behind `wait_list`, in the same order
    pub fn resolve(&self, wait_list: &[SyncPoint]) -> Result<Vec<EventHandle>> {
        let mut out = Vec::new();
        out.try_reserve(wait_list.len())?;
        for sync_point in wait_list {
            let event = self.events.get(sync_point).ok_or_else(|| {
                log::debug!("unknown sync point {}", sync_point);
                Error::InvalidValue
            })?;
            out.push(event.native());
        }
        Ok(out)
    }

    /// Every tracked native event, in registration order
    #[inline]
    pub fn tracked(&self) -> &[EventHandle] {
        &self.tracked
    }

    /// Event bound to `sync_point`
    pub fn event(&self, sync_point: SyncPoint) -> Option<&Arc<Event>> {
        self.events.get(&sync_point)
    }

    /// Number of registered sync points
    #[inline]
    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    /// No sync point registered yet
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn test_register_and_resolve_in_order() {
        let fx = Fixture::new();
        let mut registry = SyncPointRegistry::new();
        let a = fx.context.create_event(false, false).unwrap();
        let b = fx.context.create_event(false, false).unwrap();

        let sp_a = registry.next();
        registry.register(sp_a, a.clone()).unwrap();
        let sp_b = registry.next();
        registry.register(sp_b, b.clone()).unwrap();

        assert_eq!(sp_a.raw() + 1, sp_b.raw());
        assert_eq!(registry.resolve(&[sp_b, sp_a]).unwrap(), [b.native(), a.native()]);
        assert_eq!(registry.tracked(), [a.native(), b.native()]);
        assert!(Arc::ptr_eq(registry.event(sp_a).unwrap(), &a));
    }

    #[test]
    fn test_unknown_sync_point_is_invalid_value() {
        let fx = Fixture::new();
        let mut registry = SyncPointRegistry::new();
        let event = fx.context.create_event(false, false).unwrap();
        registry.register(registry.next(), event).unwrap();
        assert_eq!(registry.resolve(&[SyncPoint::from_raw(7)]), Err(Error::InvalidValue));
    }

    #[test]
    fn test_ids_are_never_reused() {
        let fx = Fixture::new();
        let mut registry = SyncPointRegistry::new();
        let first = registry.next();
        registry
            .register(first, fx.context.create_event(false, false).unwrap())
            .unwrap();
        let stale = fx.context.create_event(false, false).unwrap();
        assert_eq!(registry.register(first, stale), Err(Error::InvalidValue));
        assert_ne!(registry.next(), first);
        assert_eq!(registry.len(), 1);
    }
}
