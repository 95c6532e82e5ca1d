//! # Watcher Registry
//!
//! Standing subscriptions to one message kind on one slot. Watch ids are
//! unique across the whole context so a caller can unregister without
//! remembering the slot. Lookups return matches in registration order.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::envelope::{MessageKind, NetworkEvent};
use crate::error::{NetworkError, Result};
use crate::types::{SlotId, WatchId};

/// An unsolicited event as seen by one watcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification<'a> {
    pub slot: SlotId,
    pub watch_id: WatchId,
    pub kind: MessageKind,
    pub result: &'a std::result::Result<NetworkEvent, NetworkError>,
}

impl Notification<'_> {
    /// Zero on success, otherwise the negated errno of the failure.
    pub fn status(&self) -> i32 {
        match self.result {
            Ok(_) => 0,
            Err(err) => err.code(),
        }
    }
}

pub type WatchFn = Arc<dyn Fn(&Notification<'_>) + Send + Sync + 'static>;

struct Watch {
    id: WatchId,
    slot: SlotId,
    kind: MessageKind,
    callback: WatchFn,
}

struct Registry {
    next_id: WatchId,
    watches: Vec<Watch>,
    open: bool,
}

/// Subscriptions for every slot of a context.
pub struct WatcherRegistry {
    slot_count: usize,
    inner: Mutex<Registry>,
}

impl WatcherRegistry {
    pub fn new(slot_count: usize) -> Self {
        WatcherRegistry {
            slot_count,
            inner: Mutex::new(Registry {
                next_id: 1,
                watches: Vec::new(),
                open: true,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribe `callback` to `kind` on `slot`. Returns a positive id.
    pub fn register<F>(&self, slot: SlotId, kind: MessageKind, callback: F) -> Result<WatchId>
    where
        F: Fn(&Notification<'_>) + Send + Sync + 'static,
    {
        if slot >= self.slot_count {
            return Err(NetworkError::InvalidArgument("slot out of range"));
        }
        let mut reg = self.lock();
        if !reg.open {
            return Err(NetworkError::NotInitialized);
        }
        let mut id = reg.next_id;
        while reg.watches.iter().any(|w| w.id == id) {
            id = next_watch_id(id);
        }
        reg.next_id = next_watch_id(id);
        reg.watches.push(Watch {
            id,
            slot,
            kind,
            callback: Arc::new(callback),
        });
        Ok(id)
    }

    /// Remove a subscription. Unknown or already-removed ids are `NotFound`.
    pub fn unregister(&self, watch_id: WatchId) -> Result<()> {
        let mut reg = self.lock();
        let pos = reg
            .watches
            .iter()
            .position(|w| w.id == watch_id)
            .ok_or(NetworkError::NotFound)?;
        reg.watches.remove(pos);
        Ok(())
    }

    /// Callbacks subscribed to `kind` on `slot`, in registration order.
    pub fn lookup(&self, slot: SlotId, kind: MessageKind) -> Vec<(WatchId, WatchFn)> {
        self.lock()
            .watches
            .iter()
            .filter(|w| w.slot == slot)
            .filter(|w| w.kind == kind)
            .map(|w| (w.id, w.callback.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every subscription and refuse new ones.
    pub fn close(&self) -> usize {
        let mut reg = self.lock();
        reg.open = false;
        let removed = reg.watches.len();
        reg.watches.clear();
        removed
    }
}

fn next_watch_id(id: WatchId) -> WatchId {
    if id >= i32::MAX as WatchId {
        1
    } else {
        id + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn ids_are_positive_and_unique_across_slots() {
        let reg = WatcherRegistry::new(2);
        let a = reg.register(0, MessageKind::RegistrationChanged, |_| {}).unwrap();
        let b = reg.register(1, MessageKind::RegistrationChanged, |_| {}).unwrap();
        assert!(a > 0);
        assert_ne!(a, b);
    }

    #[test]
    fn unregister_twice_is_not_found() {
        let reg = WatcherRegistry::new(1);
        let id = reg.register(0, MessageKind::SignalStrengthChanged, |_| {}).unwrap();
        assert_eq!(reg.unregister(id), Ok(()));
        assert_eq!(reg.unregister(id), Err(NetworkError::NotFound));
        assert_eq!(reg.unregister(9999), Err(NetworkError::NotFound));
    }

    #[test]
    fn lookup_filters_by_slot_then_kind() {
        let reg = WatcherRegistry::new(2);
        let a = reg.register(0, MessageKind::RegistrationChanged, |_| {}).unwrap();
        reg.register(0, MessageKind::SignalStrengthChanged, |_| {}).unwrap();
        reg.register(1, MessageKind::RegistrationChanged, |_| {}).unwrap();
        let b = reg.register(0, MessageKind::RegistrationChanged, |_| {}).unwrap();

        let ids: Vec<_> = reg
            .lookup(0, MessageKind::RegistrationChanged)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![a, b]);
        assert!(reg.lookup(1, MessageKind::CellInfoListChanged).is_empty());
    }

    #[test]
    fn lookup_returns_live_callbacks() {
        let hits = Arc::new(AtomicUsize::new(0));
        let reg = WatcherRegistry::new(1);
        let counter = hits.clone();
        reg.register(
            0,
            MessageKind::CellInfoListChanged,
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();
        let result = Ok(NetworkEvent::Done);
        for (watch_id, cb) in reg.lookup(0, MessageKind::CellInfoListChanged) {
            cb(&Notification {
                slot: 0,
                watch_id,
                kind: MessageKind::CellInfoListChanged,
                result: &result,
            });
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_slot_and_closed_registry() {
        let reg = WatcherRegistry::new(1);
        assert!(matches!(
            reg.register(1, MessageKind::RegistrationChanged, |_| {}),
            Err(NetworkError::InvalidArgument(_))
        ));
        reg.register(0, MessageKind::RegistrationChanged, |_| {}).unwrap();
        assert_eq!(reg.close(), 1);
        assert!(reg.is_empty());
        assert_eq!(
            reg.register(0, MessageKind::RegistrationChanged, |_| {}),
            Err(NetworkError::NotInitialized)
        );
    }

    #[test]
    fn id_wraps_to_one() {
        assert_eq!(next_watch_id(i32::MAX as WatchId), 1);
        assert_eq!(next_watch_id(7), 8);
    }
}
