//! # Operation Dispatcher
//!
//! The asynchronous operations. Each one validates its arguments, records a
//! pending entry (allocating the event id) and only then hands the request to
//! the transport, so a response that races back before `send` returns is
//! still correlated.
//!
//! Two disjoint failure channels:
//! - `Err` from the call itself: nothing was accepted and the callback will
//!   never run.
//! - `Ok(event_id)`: the callback runs exactly once, with success, a
//!   transport error, a timeout, or `Teardown`.

use tracing::{debug, warn};

use crate::context::NetworkContext;
use crate::error::{NetworkError, Result};
use crate::pending::Completion;
use crate::transport::{ModemRequest, RequestParams};
use crate::types::{EventId, OperatorInfo, SlotId};

impl NetworkContext {
    /// Let the modem pick the network.
    pub fn select_auto<F>(&self, slot: SlotId, callback: F) -> Result<EventId>
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        self.submit(slot, RequestParams::SelectAuto, callback)
    }

    /// Register on `operator`, typically an entry from a previous scan.
    pub fn select_manual<F>(&self, slot: SlotId, operator: &OperatorInfo, callback: F) -> Result<EventId>
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        self.check_slot(slot)?;
        if !operator.is_selectable() {
            return Err(NetworkError::InvalidArgument("operator has no identifier"));
        }
        let params = RequestParams::SelectManual {
            operator_id: operator.id.trim().to_string(),
            mcc: operator.mcc.clone(),
            mnc: operator.mnc.clone(),
        };
        self.submit(slot, params, callback)
    }

    /// Scan for available operators.
    pub fn scan<F>(&self, slot: SlotId, callback: F) -> Result<EventId>
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        self.submit(slot, RequestParams::Scan, callback)
    }

    pub fn get_serving_cellinfos<F>(&self, slot: SlotId, callback: F) -> Result<EventId>
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        self.submit(slot, RequestParams::ServingCellInfo, callback)
    }

    pub fn get_neighbouring_cellinfos<F>(&self, slot: SlotId, callback: F) -> Result<EventId>
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        self.submit(slot, RequestParams::NeighbouringCellInfo, callback)
    }

    pub fn get_registration_info<F>(&self, slot: SlotId, callback: F) -> Result<EventId>
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        self.submit(slot, RequestParams::RegistrationInfo, callback)
    }

    /// Ask the modem to report the cell list every `period_ms` milliseconds.
    pub fn set_cell_info_list_rate<F>(&self, slot: SlotId, period_ms: u32, callback: F) -> Result<EventId>
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        self.submit(slot, RequestParams::SetCellInfoListRate { period_ms }, callback)
    }

    fn submit<F>(&self, slot: SlotId, params: RequestParams, callback: F) -> Result<EventId>
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        self.check_slot(slot)?;
        let kind = params.response_kind();
        let event_id = self.core.pending.insert(slot, kind, Box::new(callback))?;
        debug!(slot, event_id, ?kind, "request submitted");

        if let Err(err) = self.transport.send(ModemRequest {
            slot,
            event_id,
            params,
        }) {
            // Reclaim the entry so the failure is reported here only. If it is
            // gone or a tombstone, the callback already ran.
            match self.core.pending.take(slot, event_id) {
                Some(entry) if !entry.is_canceled() => {
                    warn!(slot, event_id, ?kind, error = %err, "transport refused request");
                    return Err(err.into());
                }
                _ => debug!(
                    slot,
                    event_id,
                    ?kind,
                    error = %err,
                    "request refused after its callback ran"
                ),
            }
        }
        Ok(event_id)
    }
}
