//! # Network Data Model
//!
//! Registration snapshots, scan candidates and cell identities as they cross
//! the correlation boundary. All values are owned; a decode step produces a
//! fresh value for every delivery and nothing is shared with the transport.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::signal::SignalStrength;

/// Logical SIM slot index.
pub type SlotId = usize;
/// Correlation id of one in-flight request, unique per slot while pending.
pub type EventId = u32;
/// Handle of a standing subscription, unique per context while active.
pub type WatchId = u32;

pub const MAX_OPERATOR_INFO_LIST_SIZE: usize = 30;
pub const MAX_CELL_INFO_LIST_SIZE: usize = 30;
/// Cap on textual network fields, in bytes.
pub const MAX_NETWORK_INFO_LENGTH: usize = 100;
pub const MAX_MCC_LENGTH: usize = 3;
pub const MAX_MNC_LENGTH: usize = 3;

/// Truncate `text` to at most `max` bytes without splitting a character.
pub fn truncate_text(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

// ─── Registration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    NotRegistered,
    RegisteredHome,
    Searching,
    Denied,
    #[default]
    Unknown,
    RegisteredRoaming,
}

impl RegistrationState {
    pub fn is_registered(self) -> bool {
        matches!(
            self,
            RegistrationState::RegisteredHome | RegistrationState::RegisteredRoaming
        )
    }
}

/// Radio access technology of the serving network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    #[default]
    Unknown,
    Gsm,
    Gprs,
    Edge,
    Umts,
    Hsdpa,
    Hsupa,
    Hspa,
    Lte,
    Nr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoamingType {
    #[default]
    NotRoaming,
    Domestic,
    International,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    Automatic,
    Manual,
}

/// Network-supplied time (NITZ) in broken-down form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkTime {
    pub sec: u32,
    pub min: u32,
    pub hour: u32,
    pub mday: u32,
    /// Month, 1-12.
    pub mon: u32,
    pub year: i32,
    pub dst: bool,
    /// Offset from UTC in seconds.
    pub utcoff: i32,
}

impl NetworkTime {
    /// Local network time with its UTC offset, if the fields form a valid date.
    pub fn to_datetime(&self) -> Option<DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(self.utcoff)?;
        let naive = NaiveDate::from_ymd_opt(self.year, self.mon, self.mday)?
            .and_hms_opt(self.hour, self.min, self.sec)?;
        naive.and_local_timezone(offset).single()
    }
}

/// Snapshot of the current attach state of one slot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationInfo {
    pub reg_state: RegistrationState,
    pub technology: NetworkType,
    pub operator_name: String,
    pub mcc: String,
    pub mnc: String,
    /// Serving station description.
    pub station: String,
    pub nitz_time: Option<NetworkTime>,
    pub selection_mode: SelectionMode,
    pub emergency_only: bool,
    pub roaming_type: RoamingType,
    pub cell_id: u32,
    pub lac: u16,
    pub denial_reason: u16,
}

impl RegistrationInfo {
    pub(crate) fn sanitize(&mut self) {
        truncate_text(&mut self.operator_name, MAX_NETWORK_INFO_LENGTH);
        truncate_text(&mut self.station, MAX_NETWORK_INFO_LENGTH);
        truncate_text(&mut self.mcc, MAX_MCC_LENGTH);
        truncate_text(&mut self.mnc, MAX_MNC_LENGTH);
    }
}

// ─── Operators ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorStatus {
    #[default]
    Unknown,
    Available,
    Current,
    Forbidden,
}

/// Technology-specific detail attached to a scan candidate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "rat", rename_all = "snake_case")]
pub enum OperatorExtra {
    #[default]
    None,
    Gsm { lac: u16, cell_id: u32 },
    Umts { lac: u16, cell_id: u32, psc: u16 },
    Lte { tac: u32, cell_id: u32, earfcn: u32 },
    Nr { tac: u32, nci: u64, arfcn: u32 },
    /// Undecoded modem data, owned by this value.
    Opaque { data: Vec<u8> },
}

/// A candidate network returned by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorInfo {
    pub id: String,
    pub name: String,
    pub mcc: String,
    pub mnc: String,
    pub status: OperatorStatus,
    pub technology: String,
    pub extra: OperatorExtra,
}

impl OperatorInfo {
    /// Whether this entry can be handed to a manual selection.
    pub fn is_selectable(&self) -> bool {
        !self.id.trim().is_empty()
    }

    pub(crate) fn sanitize(&mut self) {
        truncate_text(&mut self.id, MAX_NETWORK_INFO_LENGTH);
        truncate_text(&mut self.name, MAX_NETWORK_INFO_LENGTH);
        truncate_text(&mut self.technology, MAX_NETWORK_INFO_LENGTH);
        truncate_text(&mut self.mcc, MAX_MCC_LENGTH);
        truncate_text(&mut self.mnc, MAX_MNC_LENGTH);
    }
}

// ─── Cells ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellType {
    #[default]
    None,
    Gsm,
    Umts,
    Lte,
    Nr,
}

/// One observed cell, serving or neighbouring.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CellIdentity {
    pub ci: i32,
    pub pci: i32,
    pub tac: i32,
    pub lac: i32,
    pub earfcn: i32,
    pub bandwidth: i32,
    pub bands: Vec<i32>,
    pub cell_type: CellType,
    pub registered: bool,
    pub mcc: String,
    pub mnc: String,
    pub alpha_long: String,
    pub alpha_short: String,
    pub signal_strength: SignalStrength,
}

impl CellIdentity {
    pub(crate) fn sanitize(&mut self) {
        self.bands.truncate(MAX_NETWORK_INFO_LENGTH);
        truncate_text(&mut self.mcc, MAX_MCC_LENGTH);
        truncate_text(&mut self.mnc, MAX_MNC_LENGTH);
        truncate_text(&mut self.alpha_long, MAX_NETWORK_INFO_LENGTH);
        truncate_text(&mut self.alpha_short, MAX_NETWORK_INFO_LENGTH);
    }
}
