//! # modemctl-network
//!
//! Network registration and cell search for a cellular modem control layer.
//!
//! Outbound requests (scan, manual/automatic selection, registration and
//! cell-info queries) are correlated with the modem's eventual responses by
//! `(slot, event_id)`, while unsolicited modem indications fan out to
//! per-slot watchers.
//!
//! ## Crate structure
//!
//! - [`context`]: [`NetworkContext`] lifecycle, accessors, watcher API
//! - [`dispatch`]: the asynchronous operations
//! - [`router`]: [`IndicationRouter`], entry point for transport envelopes
//! - [`pending`]: per-slot pending-request table
//! - [`watch`]: watcher registry
//! - [`envelope`]: envelopes, message kinds, payload decoding
//! - [`signal`]: signal-strength classification
//! - [`state`]: cached registration/signal snapshots
//! - [`transport`]: the modem transport seam
//! - [`types`]: registration, operator and cell data model
//! - [`config`]: TOML configuration
//! - [`error`]: error taxonomy

pub mod config;
pub mod context;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod pending;
pub mod router;
pub mod signal;
pub mod state;
pub mod transport;
pub mod types;
pub mod watch;

pub use config::{NetworkConfig, UnmatchedResponsePolicy};
pub use context::NetworkContext;
pub use envelope::{Envelope, MessageKind, NetworkEvent, Payload};
pub use error::{NetworkError, TransportError};
pub use pending::Completion;
pub use router::IndicationRouter;
pub use signal::{SignalLevel, SignalStrength, SignalThresholds};
pub use transport::{ModemRequest, ModemTransport, RequestParams};
pub use types::{EventId, SlotId, WatchId};
pub use watch::Notification;
