//! Error taxonomy shared by the dispatcher, the tables and the router.
//!
//! Every error has a negated-errno form ([`NetworkError::code`]) so callers
//! that speak the numeric convention get the same value on both failure
//! channels: the synchronous return of a submission and the status carried by
//! a completion callback.

use thiserror::Error;

use crate::envelope::MessageKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("context or slot not initialized")]
    NotInitialized,
    #[error("not found")]
    NotFound,
    #[error("modem transport failure (code {code})")]
    Transport { code: i32 },
    #[error("request canceled by teardown")]
    Teardown,
    #[error("request timed out")]
    TimedOut,
    #[error("no free event id")]
    Busy,
    #[error("payload does not match message kind {kind:?}")]
    UnexpectedPayload { kind: MessageKind },
}

impl NetworkError {
    /// Negated errno for this error. Transport codes are passed through as
    /// reported by the modem, forced negative; a code with no positive
    /// counterpart reads as -EIO.
    pub fn code(&self) -> i32 {
        match self {
            NetworkError::InvalidArgument(_) => -libc::EINVAL,
            NetworkError::NotInitialized => -libc::ENODEV,
            NetworkError::NotFound => -libc::ENOENT,
            NetworkError::Transport { code } => negated(*code),
            NetworkError::Teardown => -libc::ECANCELED,
            NetworkError::TimedOut => -libc::ETIMEDOUT,
            NetworkError::Busy => -libc::EBUSY,
            NetworkError::UnexpectedPayload { .. } => -libc::EPROTO,
        }
    }
}

/// Failure reported by a [`ModemTransport`](crate::transport::ModemTransport)
/// when it cannot accept a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("modem rejected request (errno {0})")]
    Rejected(i32),
    #[error("modem transport disconnected")]
    Disconnected,
}

impl TransportError {
    pub fn code(&self) -> i32 {
        match self {
            TransportError::Rejected(errno) => negated(*errno),
            TransportError::Disconnected => -libc::ENOTCONN,
        }
    }
}

impl From<TransportError> for NetworkError {
    fn from(err: TransportError) -> Self {
        NetworkError::Transport { code: err.code() }
    }
}

fn negated(errno: i32) -> i32 {
    errno.checked_abs().map_or(-libc::EIO, |e| -e)
}

pub type Result<T, E = NetworkError> = std::result::Result<T, E>;
