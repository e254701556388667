//! Error types for the hook pipeline, the wire codecs and the
//! dispatcher. Each is a small enum with a manual [`Display`] impl,
//! following the style of the original single-field `HookError`.

use std::fmt::{self, Display};

/// Raised by the hook pipeline: a fatal hook failed, a dependency graph
/// had a cycle, or a requested state has no registered hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookError(String);

impl HookError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for HookError {}

/// Raised while turning raw bytes into a typed [`crate::core::packet::Packet`].
/// Every variant corresponds to a "log and discard" path in the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Datagram shorter than the protocol's minimum frame size.
    TooShort { got: usize, min: usize },
    /// Datagram longer than the protocol's maximum frame size.
    TooLong { got: usize, max: usize },
    /// A fixed header field held a value outside its allowed set
    /// (bad opcode, bad htype, bad hlen, ...).
    BadHeader(&'static str),
    /// The BOOTP magic cookie was absent or wrong.
    BadCookie,
    /// Option 53 (Message-Type) was missing, malformed, or out of range.
    BadMessageType,
    /// An option's length field would overrun the remaining buffer.
    OptionOverrun { tag: u8 },
    /// Maximum-Message-Size or Interface-MTU failed the 576-byte floor check.
    BelowMtuFloor { option: u8, value: u16 },
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::TooShort { got, min } => {
                write!(f, "frame too short: {got} bytes, minimum {min}")
            }
            DecodeError::TooLong { got, max } => {
                write!(f, "frame too long: {got} bytes, maximum {max}")
            }
            DecodeError::BadHeader(field) => write!(f, "invalid header field: {field}"),
            DecodeError::BadCookie => write!(f, "missing or invalid BOOTP magic cookie"),
            DecodeError::BadMessageType => write!(f, "missing or invalid DHCP message type"),
            DecodeError::OptionOverrun { tag } => {
                write!(f, "option {tag} length overruns remaining buffer")
            }
            DecodeError::BelowMtuFloor { option, value } => {
                write!(f, "option {option} value {value} below the 576-byte floor")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Raised by the dispatcher's classification and admission paths.
/// None of these escape the main loop: they are all converted to a log
/// line plus a silent drop by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Sender has no entry in the client registry.
    UnknownClient,
    /// Authenticator/MAC verification against the shared secret failed.
    BadAuthenticator,
    /// A request/response code arrived on the wrong socket, or the code
    /// is deprecated/unrecognized.
    Rejected(&'static str),
    /// The request table already holds a live record for this tuple and
    /// the vectors matched (true retransmission) or the table is full.
    Duplicate,
    Overload,
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::UnknownClient => write!(f, "unknown client"),
            DispatchError::BadAuthenticator => write!(f, "authenticator verification failed"),
            DispatchError::Rejected(reason) => write!(f, "rejected: {reason}"),
            DispatchError::Duplicate => write!(f, "duplicate request"),
            DispatchError::Overload => write!(f, "request table overload"),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Raised while loading or reloading configuration. Fatal at startup,
/// logged-and-ignored (prior configuration kept) at reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ConfigError {}
