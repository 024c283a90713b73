//! Streaming call responses for the Skein RPC transport.
//!
//! This crate turns a response's three arguments into an ordered sequence
//! of call-response frames:
//! - [`OutArgStream`] multiplexes arg1/arg2/arg3 into batches of parts
//! - [`ResponseCore`] owns the state machine, fragmentation and credits
//! - [`StreamingOutResponse`] ties the two together for application code

pub mod argstream;
pub mod config;
pub mod error;
pub mod response;
pub mod state;

pub use argstream::{ArgEvent, ArgIndex, ArgStreamError, OutArgStream};
pub use config::ResponseConfig;
pub use error::{ResponseError, Result};
pub use response::{ResponseCore, ResponseEvent, StreamingOutResponse};
pub use state::ResponseState;
