//! Boundary with the modem transport.
//!
//! The transport is a black box: it accepts a [`ModemRequest`] tagged with
//! `(slot, event_id)` and later hands envelopes, correlated or unsolicited, to
//! the [`IndicationRouter`] it was attached to. Delivery may happen on any
//! thread the transport owns. Envelopes for one slot must be delivered in the
//! order the modem produced them.

use serde::{Deserialize, Serialize};

use crate::envelope::MessageKind;
use crate::error::TransportError;
use crate::router::IndicationRouter;
use crate::types::{EventId, SlotId};

/// Technology-agnostic parameters of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RequestParams {
    SelectAuto,
    SelectManual {
        operator_id: String,
        mcc: String,
        mnc: String,
    },
    Scan,
    ServingCellInfo,
    NeighbouringCellInfo,
    RegistrationInfo,
    SetCellInfoListRate {
        period_ms: u32,
    },
}

impl RequestParams {
    /// Kind of the envelope that answers this request.
    pub fn response_kind(&self) -> MessageKind {
        match self {
            RequestParams::SelectAuto => MessageKind::SelectAuto,
            RequestParams::SelectManual { .. } => MessageKind::SelectManual,
            RequestParams::Scan => MessageKind::ScanResult,
            RequestParams::ServingCellInfo => MessageKind::ServingCellInfo,
            RequestParams::NeighbouringCellInfo => MessageKind::NeighbouringCellInfo,
            RequestParams::RegistrationInfo => MessageKind::RegistrationInfo,
            RequestParams::SetCellInfoListRate { .. } => MessageKind::CellInfoListRate,
        }
    }
}

/// A request on its way to the modem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemRequest {
    pub slot: SlotId,
    pub event_id: EventId,
    pub params: RequestParams,
}

pub trait ModemTransport: Send + Sync {
    /// Start delivering envelopes to `router`. Called once, by context init.
    fn attach(&self, router: IndicationRouter) -> Result<(), TransportError>;

    /// Queue a request without waiting for the modem's answer. The pending
    /// entry is recorded before this is called, so the response may be
    /// delivered to the router before `send` returns.
    fn send(&self, request: ModemRequest) -> Result<(), TransportError>;

    /// Stop delivering envelopes. Called once, by context shutdown.
    fn detach(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_kinds() {
        assert_eq!(RequestParams::Scan.response_kind(), MessageKind::ScanResult);
        assert_eq!(
            RequestParams::SetCellInfoListRate { period_ms: 1000 }.response_kind(),
            MessageKind::CellInfoListRate
        );
        assert!(!RequestParams::RegistrationInfo.response_kind().is_indication());
    }
}
