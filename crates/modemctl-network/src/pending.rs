//! # Pending-Request Table
//!
//! Per-slot map from event id to the continuation of an outstanding request.
//! Each slot has its own lock so allocation and completion on one slot are
//! serialized without contending with other slots. Callbacks are never run
//! while a slot lock is held: every removal hands the entry back by value and
//! the caller completes it.
//!
//! A request that exceeds its timeout is completed with
//! [`NetworkError::TimedOut`] and left behind as a canceled tombstone, so a
//! response that shows up afterwards is recognised as late rather than
//! unknown. Tombstones still occupy their id until purged.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use quanta::Instant;

use crate::envelope::{MessageKind, NetworkEvent};
use crate::error::{NetworkError, Result};
use crate::types::{EventId, SlotId};

/// Outcome of one request, delivered exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub slot: SlotId,
    pub event_id: EventId,
    pub kind: MessageKind,
    pub result: std::result::Result<NetworkEvent, NetworkError>,
    /// Time from submission to completion.
    pub elapsed: Duration,
}

impl Completion {
    /// Zero on success, otherwise the negated errno of the failure.
    pub fn status(&self) -> i32 {
        match &self.result {
            Ok(_) => 0,
            Err(err) => err.code(),
        }
    }
}

pub type CompletionFn = Box<dyn FnOnce(Completion) + Send + 'static>;

/// Continuation of one in-flight request.
pub struct PendingRequest {
    kind: MessageKind,
    callback: Option<CompletionFn>,
    submitted_at: Instant,
    canceled: bool,
}

impl PendingRequest {
    /// Response kind the request expects.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    /// Whether the request was already completed by a timeout.
    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    /// Invoke the callback with `result`. Returns false for a tombstone,
    /// whose callback already ran.
    pub fn complete(
        mut self,
        slot: SlotId,
        event_id: EventId,
        result: std::result::Result<NetworkEvent, NetworkError>,
    ) -> bool {
        let Some(callback) = self.callback.take() else {
            return false;
        };
        callback(Completion {
            slot,
            event_id,
            kind: self.kind,
            result,
            elapsed: self.submitted_at.elapsed(),
        });
        true
    }
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("kind", &self.kind)
            .field("canceled", &self.canceled)
            .finish_non_exhaustive()
    }
}

struct SlotTable {
    next_id: EventId,
    entries: HashMap<EventId, PendingRequest>,
    open: bool,
}

/// Pending requests for every slot of a context.
pub struct PendingTable {
    slots: Vec<Mutex<SlotTable>>,
    max_event_id: EventId,
}

impl PendingTable {
    /// Table for slots `0..slot_count`; ids wrap to 0 after `max_event_id`.
    pub fn new(slot_count: usize, max_event_id: EventId) -> Self {
        let slots = (0..slot_count)
            .map(|_| {
                Mutex::new(SlotTable {
                    next_id: 0,
                    entries: HashMap::new(),
                    open: true,
                })
            })
            .collect();
        PendingTable {
            slots,
            max_event_id,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn lock(&self, slot: SlotId) -> Result<MutexGuard<'_, SlotTable>> {
        let table = self
            .slots
            .get(slot)
            .ok_or(NetworkError::InvalidArgument("slot out of range"))?;
        Ok(table.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Record a new request and allocate its event id. Ids increase within a
    /// slot, wrap after the configured maximum and skip ids still in use.
    pub fn insert(
        &self,
        slot: SlotId,
        kind: MessageKind,
        callback: CompletionFn,
    ) -> Result<EventId> {
        let mut table = self.lock(slot)?;
        if !table.open {
            return Err(NetworkError::NotInitialized);
        }
        let id_space = u64::from(self.max_event_id) + 1;
        if table.entries.len() as u64 >= id_space {
            return Err(NetworkError::Busy);
        }
        let event_id = loop {
            let candidate = table.next_id;
            table.next_id = if candidate >= self.max_event_id {
                0
            } else {
                candidate + 1
            };
            if !table.entries.contains_key(&candidate) {
                break candidate;
            }
        };
        table.entries.insert(
            event_id,
            PendingRequest {
                kind,
                callback: Some(callback),
                submitted_at: Instant::now(),
                canceled: false,
            },
        );
        Ok(event_id)
    }

    /// Remove and return the entry for `event_id`, tombstones included.
    pub fn take(&self, slot: SlotId, event_id: EventId) -> Option<PendingRequest> {
        self.lock(slot).ok()?.entries.remove(&event_id)
    }

    /// Remove every live entry of `slot`. Tombstones are discarded.
    pub fn drain(&self, slot: SlotId) -> Vec<(EventId, PendingRequest)> {
        match self.lock(slot) {
            Ok(mut table) => drain_live(&mut table),
            Err(_) => Vec::new(),
        }
    }

    /// Refuse further inserts on `slot` and drain it.
    pub fn close(&self, slot: SlotId) -> Vec<(EventId, PendingRequest)> {
        match self.lock(slot) {
            Ok(mut table) => {
                table.open = false;
                drain_live(&mut table)
            }
            Err(_) => Vec::new(),
        }
    }

    /// Accept inserts on `slot` again.
    pub fn reopen(&self, slot: SlotId) -> Result<()> {
        self.lock(slot)?.open = true;
        Ok(())
    }

    pub fn is_open(&self, slot: SlotId) -> bool {
        self.lock(slot).map(|t| t.open).unwrap_or(false)
    }

    /// Cancel live entries older than `timeout` and purge tombstones older
    /// than twice that. Returns the canceled entries with their callbacks,
    /// leaving tombstones in their place.
    pub fn expire(
        &self,
        slot: SlotId,
        timeout: Duration,
        now: Instant,
    ) -> Vec<(EventId, PendingRequest)> {
        let Ok(mut table) = self.lock(slot) else {
            return Vec::new();
        };
        let purge_after = timeout * 2;
        table.entries.retain(|_, entry| {
            !(entry.canceled && now.duration_since(entry.submitted_at) >= purge_after)
        });

        let mut expired = Vec::new();
        for (&event_id, entry) in table.entries.iter_mut() {
            if entry.canceled || now.duration_since(entry.submitted_at) < timeout {
                continue;
            }
            entry.canceled = true;
            expired.push((
                event_id,
                PendingRequest {
                    kind: entry.kind,
                    callback: entry.callback.take(),
                    submitted_at: entry.submitted_at,
                    canceled: true,
                },
            ));
        }
        expired.sort_by_key(|(id, _)| *id);
        expired
    }

    /// Live (non-tombstone) entries on `slot`.
    pub fn len(&self, slot: SlotId) -> usize {
        self.lock(slot)
            .map(|t| t.entries.values().filter(|e| !e.canceled).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, slot: SlotId) -> bool {
        self.len(slot) == 0
    }
}

fn drain_live(table: &mut SlotTable) -> Vec<(EventId, PendingRequest)> {
    let mut live: Vec<_> = table
        .entries
        .drain()
        .filter(|(_, entry)| !entry.canceled)
        .collect();
    live.sort_by_key(|(id, _)| *id);
    live
}
