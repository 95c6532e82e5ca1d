//! Simulated cellular modem for exercising `modemctl-network` without
//! hardware.
//!
//! - [`profile`]: TOML modem profile and the built-in demo
//! - [`modem`]: [`SimModem`], a threaded [`ModemTransport`](modemctl_network::ModemTransport)

pub mod modem;
pub mod profile;

pub use modem::SimModem;
pub use profile::{ModemProfile, SlotProfile};
