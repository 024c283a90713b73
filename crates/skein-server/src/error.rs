//! Error types for outbound responses.

use skein_core::FrameError;

use crate::argstream::ArgStreamError;
use crate::state::ResponseState;

/// Contract violations and delivery failures of a response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseError {
    #[error("response already started (state: {state})")]
    AlreadyStarted { state: ResponseState },

    #[error("response already done, attempted to {attempted}")]
    AlreadyDone { attempted: String },

    #[error("arg1 carries the response status and cannot be written")]
    Arg1Reserved,

    #[error("argument stream error: {0}")]
    ArgStream(#[from] ArgStreamError),

    #[error("outbound frame channel closed")]
    ChannelClosed,

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("invalid response config: {0}")]
    Config(String),
}

/// Result type for response operations
pub type Result<T> = std::result::Result<T, ResponseError>;
