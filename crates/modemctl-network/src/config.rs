use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::signal::SignalThresholds;
use crate::types::EventId;

pub const DEFAULT_SLOTS: usize = 2;
pub const DEFAULT_MAX_EVENT_ID: EventId = 65_535;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;
const MIN_SWEEP_INTERVAL_MS: u64 = 10;

/// What the router does with a response whose event id matches no live
/// pending request (duplicate, or late after a timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedResponsePolicy {
    /// Treat it as an unsolicited envelope of the same kind.
    #[default]
    Unsolicited,
    /// Discard it.
    Drop,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkConfigInput {
    pub slots: Option<usize>,
    pub max_event_id: Option<EventId>,
    pub unmatched_response: Option<UnmatchedResponsePolicy>,
    pub request_timeout_ms: Option<u64>,
    pub sweep_interval_ms: Option<u64>,
    pub signal: Option<SignalThresholds>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    pub slots: usize,
    pub max_event_id: EventId,
    pub unmatched_response: UnmatchedResponsePolicy,
    /// `None` disables request timeouts.
    pub request_timeout: Option<Duration>,
    pub sweep_interval: Duration,
    pub signal: SignalThresholds,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            slots: DEFAULT_SLOTS,
            max_event_id: DEFAULT_MAX_EVENT_ID,
            unmatched_response: UnmatchedResponsePolicy::default(),
            request_timeout: Some(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)),
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
            signal: SignalThresholds::default(),
        }
    }
}

impl NetworkConfigInput {
    pub fn resolve(self) -> Result<NetworkConfig, String> {
        let slots = self.slots.unwrap_or(DEFAULT_SLOTS);
        if slots == 0 {
            return Err("slots must be at least 1".to_string());
        }

        let signal = self.signal.unwrap_or_default();
        signal.validate()?;

        let request_timeout = match self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        let sweep_interval = Duration::from_millis(
            self.sweep_interval_ms
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_MS)
                .max(MIN_SWEEP_INTERVAL_MS),
        );

        Ok(NetworkConfig {
            slots,
            max_event_id: self.max_event_id.unwrap_or(DEFAULT_MAX_EVENT_ID),
            unmatched_response: self.unmatched_response.unwrap_or_default(),
            request_timeout,
            sweep_interval,
            signal,
        })
    }
}

impl NetworkConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, String> {
        if input.trim().is_empty() {
            return Ok(NetworkConfig::default());
        }
        let parsed: NetworkConfigInput =
            toml::from_str(input).map_err(|e| format!("Invalid config TOML: {}", e))?;
        parsed.resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_default() {
        let cfg = NetworkConfig::from_toml_str("  \n").unwrap();
        assert_eq!(cfg, NetworkConfig::default());
    }

    #[test]
    fn parse_toml_config_basic() {
        let toml = r#"
            slots = 1
            max_event_id = 255
            unmatched_response = "drop"
            request_timeout_ms = 5000
            sweep_interval_ms = 1

            [signal]
            rsrp = [-110, -100, -90, -80]
        "#;

        let cfg = NetworkConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.slots, 1);
        assert_eq!(cfg.max_event_id, 255);
        assert_eq!(cfg.unmatched_response, UnmatchedResponsePolicy::Drop);
        assert_eq!(cfg.request_timeout, Some(Duration::from_secs(5)));
        // Clamped to the minimum
        assert_eq!(cfg.sweep_interval, Duration::from_millis(10));
        assert_eq!(cfg.signal.rsrp, [-110, -100, -90, -80]);
        // Unspecified rows keep their defaults
        assert_eq!(cfg.signal.rssnr, SignalThresholds::default().rssnr);
    }

    #[test]
    fn zero_timeout_disables() {
        let cfg = NetworkConfig::from_toml_str("request_timeout_ms = 0").unwrap();
        assert!(cfg.request_timeout.is_none());
    }

    #[test]
    fn rejects_zero_slots() {
        let err = NetworkConfig::from_toml_str("slots = 0").unwrap_err();
        assert!(err.contains("slots"));
    }

    #[test]
    fn rejects_bad_thresholds() {
        let err = NetworkConfig::from_toml_str("[signal]\nrssi = [-50, -60, -70, -80]").unwrap_err();
        assert!(err.contains("rssi"), "unexpected message: {err}");
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = NetworkConfig::from_toml_str("slots = [").unwrap_err();
        assert!(err.starts_with("Invalid config TOML"));
    }
}
