//! Event envelopes delivered by the modem transport, and the kind-directed
//! decode step that turns a payload into the value handed to callbacks.

use serde::{Deserialize, Serialize};

use crate::error::NetworkError;
use crate::signal::{SignalStrength, SignalThresholds};
use crate::types::{
    CellIdentity, EventId, OperatorInfo, RegistrationInfo, SlotId, MAX_CELL_INFO_LIST_SIZE,
    MAX_OPERATOR_INFO_LIST_SIZE,
};

/// Message class carried by an envelope. Response kinds answer a request;
/// indication kinds are unsolicited. Watchers may subscribe to either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    SelectAuto,
    SelectManual,
    ScanResult,
    ServingCellInfo,
    NeighbouringCellInfo,
    RegistrationInfo,
    CellInfoListRate,
    RegistrationChanged,
    SignalStrengthChanged,
    CellInfoListChanged,
}

impl MessageKind {
    pub fn is_indication(self) -> bool {
        matches!(
            self,
            MessageKind::RegistrationChanged
                | MessageKind::SignalStrengthChanged
                | MessageKind::CellInfoListChanged
        )
    }
}

/// Payload as produced by the transport, before validation and capping.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    None,
    Operators(Vec<OperatorInfo>),
    Cells(Vec<CellIdentity>),
    Registration(RegistrationInfo),
    Signal(SignalStrength),
}

/// One unit of transport data. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    slot: SlotId,
    event_id: Option<EventId>,
    kind: MessageKind,
    status: i32,
    payload: Payload,
}

impl Envelope {
    /// A response correlated to `event_id`.
    pub fn response(
        slot: SlotId,
        event_id: EventId,
        kind: MessageKind,
        status: i32,
        payload: Payload,
    ) -> Self {
        Envelope {
            slot,
            event_id: Some(event_id),
            kind,
            status,
            payload,
        }
    }

    /// An unsolicited indication with success status.
    pub fn indication(slot: SlotId, kind: MessageKind, payload: Payload) -> Self {
        Envelope {
            slot,
            event_id: None,
            kind,
            status: 0,
            payload,
        }
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn event_id(&self) -> Option<EventId> {
        self.event_id
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Zero on success, otherwise the transport's negated errno.
    pub fn status(&self) -> i32 {
        self.status
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub(crate) fn into_payload(self) -> Payload {
        self.payload
    }
}

/// Decoded value handed to callbacks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum NetworkEvent {
    /// Request acknowledged with no data.
    Done,
    Operators(Vec<OperatorInfo>),
    Cells(Vec<CellIdentity>),
    Registration(RegistrationInfo),
    SignalStrength(SignalStrength),
}

/// Decode `payload` as `kind`. A non-zero `status` short-circuits to a
/// transport error; list payloads are capped and text fields truncated.
pub fn decode(
    kind: MessageKind,
    status: i32,
    payload: Payload,
    thresholds: &SignalThresholds,
) -> Result<NetworkEvent, NetworkError> {
    if status != 0 {
        return Err(NetworkError::Transport { code: status });
    }
    match (kind, payload) {
        (
            MessageKind::SelectAuto | MessageKind::SelectManual | MessageKind::CellInfoListRate,
            Payload::None,
        ) => Ok(NetworkEvent::Done),
        (MessageKind::ScanResult, Payload::Operators(mut ops)) => {
            ops.truncate(MAX_OPERATOR_INFO_LIST_SIZE);
            ops.iter_mut().for_each(OperatorInfo::sanitize);
            Ok(NetworkEvent::Operators(ops))
        }
        (
            MessageKind::ServingCellInfo
            | MessageKind::NeighbouringCellInfo
            | MessageKind::CellInfoListChanged,
            Payload::Cells(mut cells),
        ) => {
            cells.truncate(MAX_CELL_INFO_LIST_SIZE);
            for cell in &mut cells {
                cell.sanitize();
                cell.signal_strength = thresholds.grade(cell.signal_strength);
            }
            Ok(NetworkEvent::Cells(cells))
        }
        (
            MessageKind::RegistrationInfo | MessageKind::RegistrationChanged,
            Payload::Registration(mut info),
        ) => {
            info.sanitize();
            Ok(NetworkEvent::Registration(info))
        }
        (MessageKind::SignalStrengthChanged, Payload::Signal(s)) => {
            Ok(NetworkEvent::SignalStrength(thresholds.grade(s)))
        }
        (kind, _) => Err(NetworkError::UnexpectedPayload { kind }),
    }
}
