//! The network context: one connection to the modem management layer.
//!
//! Owns the pending-request table, the watcher registry and the per-slot
//! state cache for every slot, plus an optional housekeeping thread that
//! times out overdue requests. All operations go through an explicit
//! [`NetworkContext`]; there is no global instance, so independent contexts
//! (two modems, or parallel tests) never interfere.
//!
//! Dropping the context shuts it down: every pending request is completed
//! with [`NetworkError::Teardown`] before memory is released.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::{debug, info};

use crate::config::NetworkConfig;
use crate::envelope::MessageKind;
use crate::error::{NetworkError, Result};
use crate::router::{complete_isolated, Core, IndicationRouter};
use crate::signal::SignalStrength;
use crate::transport::ModemTransport;
use crate::types::{NetworkType, RegistrationInfo, RegistrationState, SlotId, WatchId};
use crate::watch::Notification;

pub struct NetworkContext {
    pub(crate) core: Arc<Core>,
    pub(crate) transport: Arc<dyn ModemTransport>,
    housekeeper: Option<Housekeeper>,
}

impl NetworkContext {
    /// Create a context and attach it to `transport`.
    pub fn init(config: NetworkConfig, transport: Arc<dyn ModemTransport>) -> Result<Self> {
        if config.slots == 0 {
            return Err(NetworkError::InvalidArgument("context needs at least one slot"));
        }
        config
            .signal
            .validate()
            .map_err(|_| NetworkError::InvalidArgument("signal thresholds must be ascending"))?;

        let core = Arc::new(Core::new(config));
        transport.attach(IndicationRouter::new(&core))?;

        let housekeeper = core
            .config
            .request_timeout
            .map(|timeout| Housekeeper::spawn(Arc::downgrade(&core), timeout, core.config.sweep_interval));

        info!(
            slots = core.config.slots,
            request_timeout_ms = core.config.request_timeout.map(|t| t.as_millis() as u64),
            "network context initialized"
        );
        Ok(NetworkContext {
            core,
            transport,
            housekeeper,
        })
    }

    /// A router handle bound to this context.
    pub fn router(&self) -> IndicationRouter {
        IndicationRouter::new(&self.core)
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.core.config
    }

    pub fn slot_count(&self) -> usize {
        self.core.config.slots
    }

    pub fn is_initialized(&self) -> bool {
        !self.core.is_closed()
    }

    /// `slot` exists and is in service.
    pub(crate) fn check_slot(&self, slot: SlotId) -> Result<()> {
        self.check_slot_range(slot)?;
        if !self.core.pending.is_open(slot) {
            return Err(NetworkError::NotInitialized);
        }
        Ok(())
    }

    /// `slot` exists on a live context, torn down or not.
    fn check_slot_range(&self, slot: SlotId) -> Result<()> {
        if self.core.is_closed() {
            return Err(NetworkError::NotInitialized);
        }
        if slot >= self.core.config.slots {
            return Err(NetworkError::InvalidArgument("slot out of range"));
        }
        Ok(())
    }

    // ─── Watchers ───────────────────────────────────────────────────────

    /// Subscribe to `kind` on `slot`. Returns a positive watch id.
    pub fn register_watcher<F>(&self, slot: SlotId, kind: MessageKind, callback: F) -> Result<WatchId>
    where
        F: Fn(&Notification<'_>) + Send + Sync + 'static,
    {
        self.check_slot(slot)?;
        let watch_id = self.core.watchers.register(slot, kind, callback)?;
        debug!(slot, watch_id, ?kind, "watcher registered");
        Ok(watch_id)
    }

    pub fn unregister_watcher(&self, watch_id: WatchId) -> Result<()> {
        if self.core.is_closed() {
            return Err(NetworkError::NotInitialized);
        }
        self.core.watchers.unregister(watch_id)?;
        debug!(watch_id, "watcher unregistered");
        Ok(())
    }

    pub fn watch_count(&self) -> usize {
        self.core.watchers.len()
    }

    /// Requests on `slot` still awaiting a response.
    pub fn pending_count(&self, slot: SlotId) -> usize {
        self.core.pending.len(slot)
    }

    // ─── Synchronous accessors ──────────────────────────────────────────

    fn registration(&self, slot: SlotId) -> Result<RegistrationInfo> {
        self.check_slot(slot)?;
        self.core
            .state
            .registration(slot)
            .ok_or(NetworkError::NotInitialized)
    }

    /// Whether the CS domain is registered (home or roaming).
    pub fn is_voice_registered(&self, slot: SlotId) -> Result<bool> {
        Ok(self.registration(slot)?.reg_state.is_registered())
    }

    pub fn is_voice_emergency_only(&self, slot: SlotId) -> Result<bool> {
        Ok(self.registration(slot)?.emergency_only)
    }

    pub fn get_voice_network_type(&self, slot: SlotId) -> Result<NetworkType> {
        Ok(self.registration(slot)?.technology)
    }

    pub fn is_voice_roaming(&self, slot: SlotId) -> Result<bool> {
        Ok(self.registration(slot)?.reg_state == RegistrationState::RegisteredRoaming)
    }

    /// Display name of the registered operator.
    pub fn get_display_name(&self, slot: SlotId) -> Result<String> {
        Ok(self.registration(slot)?.operator_name)
    }

    pub fn get_mcc(&self, slot: SlotId) -> Result<String> {
        Ok(self.registration(slot)?.mcc)
    }

    pub fn get_mnc(&self, slot: SlotId) -> Result<String> {
        Ok(self.registration(slot)?.mnc)
    }

    pub fn get_signal_strength(&self, slot: SlotId) -> Result<SignalStrength> {
        self.check_slot(slot)?;
        self.core
            .state
            .signal(slot)
            .ok_or(NetworkError::NotInitialized)
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────

    /// Complete every overdue request with `TimedOut`. The housekeeping
    /// thread calls this periodically; returns the number expired.
    pub fn expire_overdue(&self) -> usize {
        match self.core.config.request_timeout {
            Some(timeout) if !self.core.is_closed() => self.core.expire_overdue(timeout),
            _ => 0,
        }
    }

    /// Take `slot` out of service: pending requests fail with `Teardown`,
    /// cached snapshots are forgotten, and until
    /// [`restore_slot`](Self::restore_slot) submissions, accessors and
    /// watcher registration return `NotInitialized` while envelopes for the
    /// slot are dropped. Returns the number of requests failed; zero if the
    /// slot was already down.
    pub fn teardown_slot(&self, slot: SlotId) -> Result<usize> {
        self.check_slot_range(slot)?;
        let failed = self.core.teardown_slot(slot);
        info!(slot, failed, "slot torn down");
        Ok(failed)
    }

    pub fn restore_slot(&self, slot: SlotId) -> Result<()> {
        self.check_slot_range(slot)?;
        self.core.pending.reopen(slot)?;
        info!(slot, "slot restored");
        Ok(())
    }

    /// Detach from the transport and fail everything still pending with
    /// `Teardown`. Idempotent.
    pub fn shutdown(&mut self) {
        if self.core.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.transport.detach();
        if let Some(housekeeper) = self.housekeeper.take() {
            housekeeper.stop();
        }

        let mut failed = 0;
        for slot in 0..self.core.config.slots {
            for (event_id, entry) in self.core.pending.close(slot) {
                complete_isolated(entry, slot, event_id, Err(NetworkError::Teardown));
                failed += 1;
            }
            self.core.state.clear(slot);
        }
        let watches = self.core.watchers.close();
        info!(failed, watches, "network context shut down");
    }
}

impl Drop for NetworkContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Background thread sweeping overdue requests.
struct Housekeeper {
    stop_tx: Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Housekeeper {
    fn spawn(core: Weak<Core>, timeout: Duration, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("modemctl-housekeeper".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let Some(core) = core.upgrade() else { break };
                        if core.is_closed() {
                            break;
                        }
                        core.expire_overdue(timeout);
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .expect("failed to spawn housekeeping thread");
        Housekeeper {
            stop_tx,
            handle: Some(handle),
        }
    }

    fn stop(mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            // A completion callback running on the sweeper may drop the context
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}
