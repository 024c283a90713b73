//! Error types and the call-level error code table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::body::ErrorResponse;
use crate::span::Tracing;

/// Result type for frame and body codec operations.
pub type Result<T> = std::result::Result<T, FrameError>;

/// Structural protocol errors raised while reading or writing frames.
///
/// These are always fatal to the single frame (or handshake) being processed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("short read at offset {offset}: need {needed} bytes, {remaining} remaining")]
    ShortRead {
        needed: usize,
        remaining: usize,
        offset: usize,
    },

    #[error("short write at offset {offset}: need {needed} bytes, {remaining} remaining")]
    ShortWrite {
        needed: usize,
        remaining: usize,
        offset: usize,
    },

    #[error("invalid frame type: 0x{0:02x}")]
    InvalidFrameType(u8),

    #[error("invalid frame size: {0} (header alone is 16 bytes)")]
    InvalidFrameSize(u16),

    #[error("frame too large: {0} bytes (max 65535)")]
    FrameTooLarge(usize),

    #[error("invalid error code: 0x{code:02x}")]
    InvalidErrorCode { code: u8, tracing: Tracing },

    #[error("missing init header: {field}")]
    MissingInitHeader { field: &'static str },

    #[error("invalid utf-8 string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("string too long: {len} bytes (max {max})")]
    StringTooLong { len: usize, max: usize },

    #[error("too many headers: {0}")]
    TooManyHeaders(usize),

    #[error("too many args in one frame: {0} (max 3)")]
    TooManyArgs(usize),

    #[error("invalid checksum type: 0x{0:02x}")]
    InvalidChecksumType(u8),

    #[error("corrupt lazy frame: {0}")]
    CorruptLazyFrame(&'static str),

    #[error("frame has no body")]
    EmptyFrame,

    #[error("frame length mismatch: measured {expected}, wrote {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("call frame 0x{frame_id:08x}: {source}")]
    Call {
        frame_id: u32,
        #[source]
        source: Box<FrameError>,
    },
}

impl FrameError {
    /// Id of the call frame this error was raised for, if any.
    pub fn frame_id(&self) -> Option<u32> {
        match self {
            FrameError::Call { frame_id, .. } => Some(*frame_id),
            _ => None,
        }
    }

    /// The underlying error with any frame-id wrapper removed.
    pub fn root(&self) -> &FrameError {
        match self {
            FrameError::Call { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_short_read(&self) -> bool {
        matches!(self.root(), FrameError::ShortRead { .. })
    }
}

/// Error codes carried by ErrorResponse frames.
///
/// 0x00 is never a valid code.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    Timeout = 0x01,
    Cancelled = 0x02,
    Busy = 0x03,
    Declined = 0x04,
    UnexpectedError = 0x05,
    BadRequest = 0x06,
    NetworkError = 0x07,
    Unhealthy = 0x08,
    ProtocolError = 0xff,
}

impl ErrorCode {
    /// Every defined code, in wire order.
    pub const ALL: [ErrorCode; 9] = [
        ErrorCode::Timeout,
        ErrorCode::Cancelled,
        ErrorCode::Busy,
        ErrorCode::Declined,
        ErrorCode::UnexpectedError,
        ErrorCode::BadRequest,
        ErrorCode::NetworkError,
        ErrorCode::Unhealthy,
        ErrorCode::ProtocolError,
    ];

    /// Numeric wire value.
    pub const fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Symbolic code name.
    pub const fn name(&self) -> &'static str {
        match self {
            ErrorCode::Timeout => "Timeout",
            ErrorCode::Cancelled => "Cancelled",
            ErrorCode::Busy => "Busy",
            ErrorCode::Declined => "Declined",
            ErrorCode::UnexpectedError => "UnexpectedError",
            ErrorCode::BadRequest => "BadRequest",
            ErrorCode::NetworkError => "NetworkError",
            ErrorCode::Unhealthy => "Unhealthy",
            ErrorCode::ProtocolError => "ProtocolError",
        }
    }

    /// Stable error type string, suitable for matching at the application boundary.
    pub const fn error_type(&self) -> &'static str {
        match self {
            ErrorCode::Timeout => "skein.timeout",
            ErrorCode::Cancelled => "skein.cancelled",
            ErrorCode::Busy => "skein.busy",
            ErrorCode::Declined => "skein.declined",
            ErrorCode::UnexpectedError => "skein.unexpected",
            ErrorCode::BadRequest => "skein.bad-request",
            ErrorCode::NetworkError => "skein.network",
            ErrorCode::Unhealthy => "skein.unhealthy",
            ErrorCode::ProtocolError => "skein.protocol",
        }
    }

    /// Message used when the remote sent an empty one.
    pub const fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Timeout => "skein timeout",
            ErrorCode::Cancelled => "skein cancelled",
            ErrorCode::Busy => "skein busy",
            ErrorCode::Declined => "skein declined",
            ErrorCode::UnexpectedError => "skein unexpected error",
            ErrorCode::BadRequest => "skein bad request",
            ErrorCode::NetworkError => "skein network error",
            ErrorCode::Unhealthy => "skein unhealthy",
            ErrorCode::ProtocolError => "skein protocol error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for ErrorCode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0x01 => Ok(ErrorCode::Timeout),
            0x02 => Ok(ErrorCode::Cancelled),
            0x03 => Ok(ErrorCode::Busy),
            0x04 => Ok(ErrorCode::Declined),
            0x05 => Ok(ErrorCode::UnexpectedError),
            0x06 => Ok(ErrorCode::BadRequest),
            0x07 => Ok(ErrorCode::NetworkError),
            0x08 => Ok(ErrorCode::Unhealthy),
            0xff => Ok(ErrorCode::ProtocolError),
            other => Err(other),
        }
    }
}

impl FromStr for ErrorCode {
    type Err = UnknownErrorCode;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ErrorCode::ALL
            .iter()
            .find(|code| code.name() == s)
            .copied()
            .ok_or_else(|| UnknownErrorCode(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown error code name: {0}")]
pub struct UnknownErrorCode(String);

/// A remote call failure, surfaced to the application as a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{} ({}): {message}", code.name(), code.as_u8())]
pub struct CallError {
    pub code: ErrorCode,
    pub message: String,
    /// Id of the frame that carried the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_id: Option<u32>,
}

impl CallError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.is_empty() {
            code.default_message().to_string()
        } else {
            message
        };
        Self {
            code,
            message,
            original_id: None,
        }
    }

    /// Builds the application-facing error for an ErrorResponse frame.
    pub fn from_error_response(body: &ErrorResponse, frame_id: u32) -> Self {
        Self::new(body.code, body.message.clone()).with_original_id(frame_id)
    }

    pub fn with_original_id(mut self, id: u32) -> Self {
        self.original_id = Some(id);
        self
    }

    /// Symbolic kind, e.g. `Busy`.
    pub fn kind(&self) -> &'static str {
        self.code.name()
    }

    pub fn error_type(&self) -> &'static str {
        self.code.error_type()
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
