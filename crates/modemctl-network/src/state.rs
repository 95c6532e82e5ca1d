//! Latest registration and signal snapshots per slot, refreshed by the router
//! and read by the synchronous accessors. A snapshot is replaced wholesale by
//! the next one, never patched.

use std::sync::{Mutex, MutexGuard};

use crate::envelope::NetworkEvent;
use crate::signal::SignalStrength;
use crate::types::{RegistrationInfo, SlotId};

#[derive(Debug, Default)]
struct SlotState {
    registration: Option<RegistrationInfo>,
    signal: Option<SignalStrength>,
}

pub struct NetworkState {
    slots: Vec<Mutex<SlotState>>,
}

impl NetworkState {
    pub fn new(slot_count: usize) -> Self {
        NetworkState {
            slots: (0..slot_count).map(|_| Mutex::default()).collect(),
        }
    }

    fn lock(&self, slot: SlotId) -> Option<MutexGuard<'_, SlotState>> {
        self.slots
            .get(slot)
            .map(|s| s.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Record `event` if it carries a snapshot this cache tracks.
    pub fn observe(&self, slot: SlotId, event: &NetworkEvent) {
        let Some(mut state) = self.lock(slot) else {
            return;
        };
        match event {
            NetworkEvent::Registration(info) => state.registration = Some(info.clone()),
            NetworkEvent::SignalStrength(s) => state.signal = Some(*s),
            _ => {}
        }
    }

    pub fn registration(&self, slot: SlotId) -> Option<RegistrationInfo> {
        self.lock(slot)?.registration.clone()
    }

    pub fn signal(&self, slot: SlotId) -> Option<SignalStrength> {
        self.lock(slot)?.signal
    }

    pub fn clear(&self, slot: SlotId) {
        if let Some(mut state) = self.lock(slot) {
            *state = SlotState::default();
        }
    }
}
