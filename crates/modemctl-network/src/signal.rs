//! # Signal-Strength Classification
//!
//! Maps raw RF metrics reported by the modem onto six qualitative levels.
//! Each metric is graded on its own against a [`SignalThresholds`] row; the
//! overall level is the weakest of the known RSRP, RSRQ and RS-SNR grades,
//! falling back to RSSI when none of those is measured. A reported value
//! outside its measurable range is clamped to the nearest bound; only the
//! [`SignalStrength::UNAVAILABLE`] sentinel makes a metric unknown.
//!
//! | Metric | Unit | Measurable range |
//! |--------|------|------------------|
//! | RSSI   | dBm  | -113 to -51      |
//! | RSRP   | dBm  | -140 to -44      |
//! | RSRQ   | dB   | -34 to 3         |
//! | RS-SNR | dB   | -20 to 30        |
//! | CQI    |      | 0 to 15 (not graded) |
//!
//! The classifier is pure: the level depends only on the metrics of the same
//! snapshot and the threshold table passed in.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Qualitative signal level, ordered from worst to best.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SignalLevel {
    #[default]
    Unknown,
    Poor,
    Moderate,
    Good,
    Great,
    Excellent,
}

const RSSI_RANGE: RangeInclusive<i32> = -113..=-51;
const RSRP_RANGE: RangeInclusive<i32> = -140..=-44;
const RSRQ_RANGE: RangeInclusive<i32> = -34..=3;
const RSSNR_RANGE: RangeInclusive<i32> = -20..=30;
const CQI_RANGE: RangeInclusive<i32> = 0..=15;

/// A signal-strength snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalStrength {
    pub rssi: i32,
    pub rsrp: i32,
    pub rsrq: i32,
    pub rssnr: i32,
    pub cqi: i32,
    pub level: SignalLevel,
}

impl SignalStrength {
    /// Sentinel for a metric the modem did not report.
    pub const UNAVAILABLE: i32 = i32::MAX;

    /// Snapshot with every metric unavailable.
    pub const fn unknown() -> Self {
        SignalStrength {
            rssi: Self::UNAVAILABLE,
            rsrp: Self::UNAVAILABLE,
            rsrq: Self::UNAVAILABLE,
            rssnr: Self::UNAVAILABLE,
            cqi: Self::UNAVAILABLE,
            level: SignalLevel::Unknown,
        }
    }

    /// Snapshot from raw metrics with its level derived from `thresholds`.
    pub fn measured(
        rssi: i32,
        rsrp: i32,
        rsrq: i32,
        rssnr: i32,
        cqi: i32,
        thresholds: &SignalThresholds,
    ) -> Self {
        let mut s = SignalStrength {
            rssi,
            rsrp,
            rsrq,
            rssnr,
            cqi,
            level: SignalLevel::Unknown,
        };
        s.level = thresholds.classify(&s);
        s
    }

    /// CQI if reported and in range.
    pub fn cqi(&self) -> Option<i32> {
        (self.cqi != Self::UNAVAILABLE && CQI_RANGE.contains(&self.cqi)).then_some(self.cqi)
    }
}

impl Default for SignalStrength {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Four ascending bounds: `< t[0]` Poor, `>= t[0]` Moderate, `>= t[1]` Good,
/// `>= t[2]` Great, `>= t[3]` Excellent.
pub type Thresholds = [i32; 4];

/// Threshold policy table, one row per graded metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalThresholds {
    pub rssi: Thresholds,
    pub rsrp: Thresholds,
    pub rsrq: Thresholds,
    pub rssnr: Thresholds,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        SignalThresholds {
            rssi: [-107, -103, -97, -89],
            rsrp: [-115, -105, -95, -85],
            rsrq: [-19, -17, -14, -12],
            rssnr: [-3, 1, 5, 13],
        }
    }
}

impl SignalThresholds {
    /// Check every row is strictly ascending.
    pub fn validate(&self) -> Result<(), String> {
        let rows = [
            ("rssi", &self.rssi),
            ("rsrp", &self.rsrp),
            ("rsrq", &self.rsrq),
            ("rssnr", &self.rssnr),
        ];
        for (name, row) in rows {
            if row.windows(2).any(|w| w[0] >= w[1]) {
                return Err(format!("signal thresholds for {name} must be ascending: {row:?}"));
            }
        }
        Ok(())
    }

    /// Derive the level of `s` from its own metrics.
    pub fn classify(&self, s: &SignalStrength) -> SignalLevel {
        let primary = [
            known(s.rsrp, &RSRP_RANGE).map(|v| grade(v, &self.rsrp)),
            known(s.rsrq, &RSRQ_RANGE).map(|v| grade(v, &self.rsrq)),
            known(s.rssnr, &RSSNR_RANGE).map(|v| grade(v, &self.rssnr)),
        ];
        if let Some(level) = primary.into_iter().flatten().min() {
            return level;
        }
        known(s.rssi, &RSSI_RANGE)
            .map(|v| grade(v, &self.rssi))
            .unwrap_or(SignalLevel::Unknown)
    }

    /// Return `s` with its level recomputed.
    pub fn grade(&self, mut s: SignalStrength) -> SignalStrength {
        s.level = self.classify(&s);
        s
    }
}

fn known(value: i32, range: &RangeInclusive<i32>) -> Option<i32> {
    (value != SignalStrength::UNAVAILABLE).then(|| value.clamp(*range.start(), *range.end()))
}

fn grade(value: i32, t: &Thresholds) -> SignalLevel {
    if value >= t[3] {
        SignalLevel::Excellent
    } else if value >= t[2] {
        SignalLevel::Great
    } else if value >= t[1] {
        SignalLevel::Good
    } else if value >= t[0] {
        SignalLevel::Moderate
    } else {
        SignalLevel::Poor
    }
}
