//! Modem profile: what the simulated modem reports on each slot, how slowly
//! it answers and which requests it fails.
//!
//! Loaded from TOML:
//!
//! ```toml
//! seed = 7
//!
//! [[slots]]
//! response_delay_ms = 20
//! duplicate_responses = false
//!
//! [slots.registration]
//! reg_state = "registered_home"
//! technology = "lte"
//! operator_name = "Example"
//! mcc = "001"
//! mnc = "01"
//!
//! [slots.signal]
//! rsrp = -95
//! rsrq = -11
//!
//! [[slots.operators]]
//! id = "00101"
//! name = "Example"
//! status = "current"
//!
//! [slots.failures]
//! scan = 16
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context as _};
use serde::{Deserialize, Serialize};

use modemctl_network::types::{
    CellIdentity, CellType, NetworkType, OperatorExtra, OperatorInfo, OperatorStatus,
    RegistrationInfo, RegistrationState,
};
use modemctl_network::{RequestParams, SignalStrength};

const DEFAULT_RSRP_JITTER_DB: i32 = 3;
/// Width of the measurable RSRP range; wider jitter only saturates.
pub const MAX_RSRP_JITTER_DB: i32 = 96;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemProfile {
    /// Seed for the periodic cell-report jitter.
    pub seed: u64,
    pub slots: Vec<SlotProfile>,
}

impl Default for ModemProfile {
    fn default() -> Self {
        ModemProfile {
            seed: 0,
            slots: vec![SlotProfile::default()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotProfile {
    pub registration: RegistrationInfo,
    pub signal: SignalStrength,
    pub operators: Vec<OperatorInfo>,
    pub serving_cells: Vec<CellIdentity>,
    pub neighbouring_cells: Vec<CellIdentity>,
    pub response_delay_ms: u64,
    /// Request name (`scan`, `select_manual`, ...) to the errno it fails with.
    pub failures: BTreeMap<String, i32>,
    /// Answer every request twice with the same event id.
    pub duplicate_responses: bool,
    /// Maximum RSRP deviation applied to periodic cell reports.
    pub rsrp_jitter_db: i32,
}

impl Default for SlotProfile {
    fn default() -> Self {
        SlotProfile {
            registration: RegistrationInfo::default(),
            signal: SignalStrength::unknown(),
            operators: Vec::new(),
            serving_cells: Vec::new(),
            neighbouring_cells: Vec::new(),
            response_delay_ms: 0,
            failures: BTreeMap::new(),
            duplicate_responses: false,
            rsrp_jitter_db: DEFAULT_RSRP_JITTER_DB,
        }
    }
}

/// Name under which a request appears in `failures`.
pub fn request_name(params: &RequestParams) -> &'static str {
    match params {
        RequestParams::SelectAuto => "select_auto",
        RequestParams::SelectManual { .. } => "select_manual",
        RequestParams::Scan => "scan",
        RequestParams::ServingCellInfo => "serving_cell_info",
        RequestParams::NeighbouringCellInfo => "neighbouring_cell_info",
        RequestParams::RegistrationInfo => "registration_info",
        RequestParams::SetCellInfoListRate { .. } => "set_cell_info_list_rate",
    }
}

const REQUEST_NAMES: [&str; 7] = [
    "select_auto",
    "select_manual",
    "scan",
    "serving_cell_info",
    "neighbouring_cell_info",
    "registration_info",
    "set_cell_info_list_rate",
];

impl SlotProfile {
    /// Errno this slot fails `params` with, if any.
    pub fn failure_for(&self, params: &RequestParams) -> Option<i32> {
        self.failures.get(request_name(params)).copied()
    }
}

impl ModemProfile {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let profile: ModemProfile = toml::from_str(input).context("invalid modem profile TOML")?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading modem profile {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.slots.is_empty() {
            bail!("modem profile needs at least one slot");
        }
        for (slot, profile) in self.slots.iter().enumerate() {
            for (name, errno) in &profile.failures {
                if !REQUEST_NAMES.contains(&name.as_str()) {
                    bail!("slot {slot}: unknown request {name:?} in failures");
                }
                if *errno == 0 || *errno == i32::MIN {
                    bail!("slot {slot}: failure for {name} must be a non-zero errno, got {errno}");
                }
            }
            if !(0..=MAX_RSRP_JITTER_DB).contains(&profile.rsrp_jitter_db) {
                bail!(
                    "slot {slot}: rsrp_jitter_db must be within 0..={MAX_RSRP_JITTER_DB}, got {}",
                    profile.rsrp_jitter_db
                );
            }
        }
        Ok(())
    }

    /// Two slots: slot 0 registered on LTE with three visible operators,
    /// slot 1 still searching with a weak signal.
    pub fn demo() -> Self {
        let home = OperatorInfo {
            id: "00101".into(),
            name: "Modemctl Demo".into(),
            mcc: "001".into(),
            mnc: "01".into(),
            status: OperatorStatus::Current,
            technology: "LTE".into(),
            extra: OperatorExtra::Lte {
                tac: 0x1a2b,
                cell_id: 0x01_2345,
                earfcn: 1_300,
            },
        };
        let partner = OperatorInfo {
            id: "00102".into(),
            name: "Demo Partner".into(),
            mcc: "001".into(),
            mnc: "02".into(),
            status: OperatorStatus::Available,
            technology: "NR".into(),
            extra: OperatorExtra::Nr {
                tac: 0x2b3c,
                nci: 0x0_1234_5678,
                arfcn: 632_628,
            },
        };
        let barred = OperatorInfo {
            id: "00103".into(),
            name: "Barred Net".into(),
            mcc: "001".into(),
            mnc: "03".into(),
            status: OperatorStatus::Forbidden,
            technology: "GSM".into(),
            extra: OperatorExtra::Gsm {
                lac: 0x0101,
                cell_id: 4_321,
            },
        };

        let lte_cell = |ci: i32, pci: i32, rsrp: i32, registered: bool| CellIdentity {
            ci,
            pci,
            tac: 0x1a2b,
            earfcn: 1_300,
            bandwidth: 20_000,
            bands: vec![3],
            cell_type: CellType::Lte,
            registered,
            mcc: "001".into(),
            mnc: "01".into(),
            alpha_long: "Modemctl Demo".into(),
            alpha_short: "Demo".into(),
            signal_strength: SignalStrength {
                rsrp,
                rsrq: -11,
                rssnr: 12,
                cqi: 11,
                ..SignalStrength::unknown()
            },
            ..Default::default()
        };

        let registered = SlotProfile {
            registration: RegistrationInfo {
                reg_state: RegistrationState::RegisteredHome,
                technology: NetworkType::Lte,
                operator_name: home.name.clone(),
                mcc: home.mcc.clone(),
                mnc: home.mnc.clone(),
                station: "eNB 4660".into(),
                cell_id: 0x01_2345,
                lac: 0x1a2b,
                ..Default::default()
            },
            signal: SignalStrength {
                rssi: -67,
                rsrp: -92,
                rsrq: -11,
                rssnr: 12,
                cqi: 11,
                ..SignalStrength::unknown()
            },
            operators: vec![home, partner.clone(), barred],
            serving_cells: vec![lte_cell(0x01_2345, 101, -92, true)],
            neighbouring_cells: vec![
                lte_cell(0x01_2346, 102, -104, false),
                lte_cell(0x01_2347, 230, -117, false),
            ],
            response_delay_ms: 20,
            ..Default::default()
        };

        let searching = SlotProfile {
            registration: RegistrationInfo {
                reg_state: RegistrationState::Searching,
                ..Default::default()
            },
            signal: SignalStrength {
                rssi: -105,
                rsrp: -121,
                rsrq: -18,
                rssnr: -2,
                ..SignalStrength::unknown()
            },
            operators: vec![OperatorInfo {
                status: OperatorStatus::Available,
                ..partner
            }],
            response_delay_ms: 40,
            ..Default::default()
        };

        ModemProfile {
            seed: 7,
            slots: vec![registered, searching],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_is_valid() {
        let demo = ModemProfile::demo();
        demo.validate().unwrap();
        assert_eq!(demo.slots.len(), 2);
        assert!(demo.slots[0].registration.reg_state.is_registered());
        assert!(!demo.slots[1].registration.reg_state.is_registered());
    }

    #[test]
    fn parse_profile_toml() {
        let toml = r#"
            seed = 3

            [[slots]]
            response_delay_ms = 5
            duplicate_responses = true

            [slots.registration]
            reg_state = "registered_roaming"
            technology = "nr"
            operator_name = "Roam"
            mcc = "310"
            mnc = "260"

            [slots.signal]
            rsrp = -88

            [[slots.operators]]
            id = "310260"
            status = "current"

            [slots.failures]
            scan = 16
        "#;
        let profile = ModemProfile::from_toml_str(toml).unwrap();
        assert_eq!(profile.seed, 3);
        let slot = &profile.slots[0];
        assert!(slot.duplicate_responses);
        assert_eq!(slot.registration.technology, NetworkType::Nr);
        assert_eq!(slot.signal.rsrp, -88);
        assert_eq!(slot.signal.rsrq, SignalStrength::UNAVAILABLE);
        assert_eq!(slot.operators[0].status, OperatorStatus::Current);
        assert_eq!(slot.failure_for(&RequestParams::Scan), Some(16));
        assert_eq!(slot.failure_for(&RequestParams::RegistrationInfo), None);
        assert_eq!(slot.rsrp_jitter_db, DEFAULT_RSRP_JITTER_DB);
    }

    #[test]
    fn rejects_unknown_failure_and_empty_slots() {
        assert!(ModemProfile::from_toml_str("slots = []").is_err());
        let bad = r#"
            [[slots]]
            [slots.failures]
            reboot = 5
        "#;
        let err = ModemProfile::from_toml_str(bad).unwrap_err();
        assert!(err.to_string().contains("reboot"));
    }

    #[test]
    fn rejects_extreme_errno_and_jitter() {
        let min_errno = r#"
            [[slots]]
            [slots.failures]
            scan = -2147483648
        "#;
        assert!(ModemProfile::from_toml_str(min_errno).is_err());

        let mut profile = ModemProfile::demo();
        profile.slots[0].rsrp_jitter_db = i32::MAX;
        let err = profile.validate().unwrap_err();
        assert!(err.to_string().contains("rsrp_jitter_db"));
        profile.slots[0].rsrp_jitter_db = MAX_RSRP_JITTER_DB;
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn request_names_cover_every_request() {
        let all = [
            RequestParams::SelectAuto,
            RequestParams::SelectManual {
                operator_id: String::new(),
                mcc: String::new(),
                mnc: String::new(),
            },
            RequestParams::Scan,
            RequestParams::ServingCellInfo,
            RequestParams::NeighbouringCellInfo,
            RequestParams::RegistrationInfo,
            RequestParams::SetCellInfoListRate { period_ms: 0 },
        ];
        for params in &all {
            assert!(REQUEST_NAMES.contains(&request_name(params)));
        }
    }
}
