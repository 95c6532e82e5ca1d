//! # Indication Router
//!
//! Single entry point for every envelope the transport delivers.
//!
//! ```text
//!   envelope ──event_id?──▶ PendingTable.take ──hit──▶ decode(entry kind) ──▶ callback, done
//!      │                          │
//!      │                        miss / late ──policy: drop──▶ discarded
//!      │                          │
//!      └────────── no id ─────────┴──▶ decode(envelope kind) ──▶ every watcher (slot, kind)
//! ```
//!
//! The correlated path never touches the watcher registry. No table lock is
//! held while a callback runs, and a panicking callback is contained so the
//! remaining watchers and the transport thread are unaffected.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use quanta::Instant;
use tracing::{debug, trace, warn};

use crate::config::{NetworkConfig, UnmatchedResponsePolicy};
use crate::envelope::{decode, Envelope, NetworkEvent};
use crate::error::NetworkError;
use crate::pending::{PendingRequest, PendingTable};
use crate::state::NetworkState;
use crate::types::{EventId, SlotId};
use crate::watch::{Notification, WatcherRegistry};

/// State shared between the context, the router handles given to the
/// transport, and the housekeeping thread.
pub(crate) struct Core {
    pub(crate) config: NetworkConfig,
    pub(crate) pending: PendingTable,
    pub(crate) watchers: WatcherRegistry,
    pub(crate) state: NetworkState,
    pub(crate) closed: AtomicBool,
}

impl Core {
    pub(crate) fn new(config: NetworkConfig) -> Self {
        Core {
            pending: PendingTable::new(config.slots, config.max_event_id),
            watchers: WatcherRegistry::new(config.slots),
            state: NetworkState::new(config.slots),
            closed: AtomicBool::new(false),
            config,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn route(&self, envelope: Envelope) {
        let slot = envelope.slot();
        if slot >= self.config.slots {
            trace!(slot, kind = ?envelope.kind(), "envelope for unknown slot dropped");
            return;
        }
        if !self.pending.is_open(slot) {
            trace!(slot, kind = ?envelope.kind(), "slot torn down; envelope dropped");
            return;
        }

        if let Some(event_id) = envelope.event_id() {
            match self.pending.take(slot, event_id) {
                Some(entry) if !entry.is_canceled() => {
                    self.complete_response(slot, event_id, entry, envelope);
                    return;
                }
                Some(_) => debug!(slot, event_id, "late response for timed-out request"),
                None => trace!(slot, event_id, "response matches no pending request"),
            }
            if self.config.unmatched_response == UnmatchedResponsePolicy::Drop {
                trace!(slot, event_id, kind = ?envelope.kind(), "unmatched response dropped");
                return;
            }
        }

        self.notify_watchers(envelope);
    }

    fn complete_response(
        &self,
        slot: SlotId,
        event_id: EventId,
        entry: PendingRequest,
        envelope: Envelope,
    ) {
        let kind = entry.kind();
        if envelope.kind() != kind {
            debug!(
                slot,
                event_id,
                expected = ?kind,
                received = ?envelope.kind(),
                "response kind differs from request; decoding as requested"
            );
        }
        let status = envelope.status();
        let result = decode(kind, status, envelope.into_payload(), &self.config.signal);
        self.observe(slot, &result);
        debug!(slot, event_id, ?kind, status, "request completed");
        complete_isolated(entry, slot, event_id, result);
    }

    fn notify_watchers(&self, envelope: Envelope) {
        let slot = envelope.slot();
        let kind = envelope.kind();
        let result = decode(kind, envelope.status(), envelope.into_payload(), &self.config.signal);
        self.observe(slot, &result);

        let watchers = self.watchers.lookup(slot, kind);
        if watchers.is_empty() {
            trace!(slot, ?kind, "unsolicited envelope has no watcher; dropped");
            return;
        }
        for (watch_id, callback) in watchers {
            let notification = Notification {
                slot,
                watch_id,
                kind,
                result: &result,
            };
            if panic::catch_unwind(AssertUnwindSafe(|| callback(&notification))).is_err() {
                warn!(slot, watch_id, ?kind, "watcher callback panicked");
            }
        }
    }

    fn observe(&self, slot: SlotId, result: &Result<NetworkEvent, NetworkError>) {
        if let Ok(event) = result {
            self.state.observe(slot, event);
        }
    }

    /// Complete every request older than `timeout` with `TimedOut`.
    pub(crate) fn expire_overdue(&self, timeout: Duration) -> usize {
        let now = Instant::now();
        let mut expired = 0;
        for slot in 0..self.config.slots {
            for (event_id, entry) in self.pending.expire(slot, timeout, now) {
                debug!(slot, event_id, kind = ?entry.kind(), "request timed out");
                complete_isolated(entry, slot, event_id, Err(NetworkError::TimedOut));
                expired += 1;
            }
        }
        expired
    }

    /// Close `slot` and fail everything pending on it with `Teardown`.
    pub(crate) fn teardown_slot(&self, slot: SlotId) -> usize {
        let drained = self.pending.close(slot);
        let count = drained.len();
        for (event_id, entry) in drained {
            complete_isolated(entry, slot, event_id, Err(NetworkError::Teardown));
        }
        self.state.clear(slot);
        count
    }
}

/// Run a completion callback, containing any panic.
pub(crate) fn complete_isolated(
    entry: PendingRequest,
    slot: SlotId,
    event_id: EventId,
    result: Result<NetworkEvent, NetworkError>,
) {
    let kind = entry.kind();
    if panic::catch_unwind(AssertUnwindSafe(|| entry.complete(slot, event_id, result))).is_err() {
        warn!(slot, event_id, ?kind, "completion callback panicked");
    }
}

/// Handle through which a transport delivers envelopes. Cheap to clone;
/// holds the context weakly, so envelopes arriving after the context is
/// gone are dropped.
#[derive(Clone)]
pub struct IndicationRouter {
    core: Weak<Core>,
}

impl IndicationRouter {
    pub(crate) fn new(core: &Arc<Core>) -> Self {
        IndicationRouter {
            core: Arc::downgrade(core),
        }
    }

    /// Route one envelope. Envelopes for the same slot must be delivered in
    /// the order received from the modem.
    pub fn deliver(&self, envelope: Envelope) {
        match self.core.upgrade() {
            Some(core) if !core.is_closed() => core.route(envelope),
            _ => trace!(
                slot = envelope.slot(),
                kind = ?envelope.kind(),
                "context closed; envelope dropped"
            ),
        }
    }

    /// Whether the owning context is still accepting envelopes.
    pub fn is_attached(&self) -> bool {
        self.core.upgrade().is_some_and(|core| !core.is_closed())
    }
}

impl std::fmt::Debug for IndicationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicationRouter")
            .field("attached", &self.is_attached())
            .finish()
    }
}
