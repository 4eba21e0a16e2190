//! Error types for the BLE host.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors building an outbound [`Frame`](crate::hci::Frame).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Appending would exceed the frame capacity.
    #[error("frame overflow: {len} bytes exceeds capacity {capacity}")]
    Overflow {
        /// Length the frame would have reached.
        len: usize,
        /// Fixed frame capacity.
        capacity: usize,
    },
}

/// Errors encoding or decoding HCI packets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HciError {
    /// Not enough bytes for the structure being decoded.
    #[error("packet too short: expected {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum required length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Declared length disagrees with the bytes present.
    #[error("length mismatch: header declares {declared}, got {actual}")]
    LengthMismatch {
        /// Length declared in the header.
        declared: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// A parameter is outside its valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// Encoded packet does not fit in a frame.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Errors from the connection state machine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GapError {
    /// Operation is not valid in the current state.
    #[error("operation not allowed in state {0:?}")]
    InvalidState(crate::gap::GapState),

    /// Handle does not name the current connection.
    #[error("unknown connection handle {0}")]
    UnknownConnection(u16),

    /// Advertising or scan response payload too long.
    #[error("advertising data too long: {0} bytes (max 31)")]
    AdvertisingDataTooLong(usize),

    /// Advertising interval or channel map out of range.
    #[error("invalid advertising parameters: {0}")]
    InvalidAdvertisingParameters(&'static str),
}

/// Errors from L2CAP reassembly and fragmentation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum L2capError {
    /// Fragment too short to hold the L2CAP header.
    #[error("fragment too short: expected {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum required length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// Continuation fragment without a pending SDU.
    #[error("continuation fragment for handle {0} without a start fragment")]
    UnexpectedContinuation(u16),

    /// Fragments carried more bytes than the SDU header declared.
    #[error("SDU overflow: declared {declared} bytes, received {received}")]
    Overflow {
        /// Length declared by the L2CAP header.
        declared: usize,
        /// Bytes received so far.
        received: usize,
    },

    /// Declared SDU exceeds the reassembly limit.
    #[error("SDU too large: {0} bytes")]
    SduTooLarge(usize),

    /// Fragment size outside `1..=251`.
    #[error("invalid fragment size {0}")]
    InvalidFragmentSize(usize),
}

/// Top-level host errors.
#[derive(Debug, Error)]
pub enum HostError {
    /// The host is not running (never started, or stopped).
    #[error("host not running")]
    NotRunning,

    /// `start` called while already running.
    #[error("host already running")]
    AlreadyRunning,

    /// `start` called after `stop`.
    #[error("host stopped")]
    Stopped,

    /// Controller did not complete the reset in time.
    #[error("controller reset timed out after {0:?}")]
    ResetTimeout(Duration),

    /// Controller rejected the reset.
    #[error("controller reset failed with status {0:#04x}")]
    ResetFailed(u8),

    /// HCI error.
    #[error("hci error: {0}")]
    Hci(#[from] HciError),

    /// Connection state machine error.
    #[error("gap error: {0}")]
    Gap(#[from] GapError),

    /// L2CAP error.
    #[error("l2cap error: {0}")]
    L2cap(#[from] L2capError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// Check if this error reports a lifecycle misuse rather than a failure.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            HostError::NotRunning | HostError::AlreadyRunning | HostError::Stopped
        )
    }
}

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;

// Queue errors hand the rejected item back to the caller.

/// Blocking send on a closed queue.
#[derive(Error, Clone, PartialEq, Eq)]
#[error("sending on a closed queue")]
pub struct SendError<T>(pub T);

/// Non-blocking send failure.
#[derive(Error, Clone, PartialEq, Eq)]
pub enum TrySendError<T> {
    /// Queue at capacity.
    #[error("queue full")]
    Full(T),
    /// Queue closed.
    #[error("queue closed")]
    Closed(T),
}

impl<T> TrySendError<T> {
    /// Take back the rejected item.
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(item) | TrySendError::Closed(item) => item,
        }
    }

    /// Check if the queue was full.
    pub fn is_full(&self) -> bool {
        matches!(self, TrySendError::Full(_))
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SendError(..)")
    }
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => f.write_str("Full(..)"),
            TrySendError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

/// Non-blocking receive failure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// Nothing queued right now.
    #[error("queue empty")]
    Empty,
    /// Queue closed and drained.
    #[error("queue closed")]
    Closed,
}

/// Timed receive failure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeoutError {
    /// Nothing arrived before the deadline.
    #[error("timed out waiting on queue")]
    Timeout,
    /// Queue closed and drained.
    #[error("queue closed")]
    Closed,
}
