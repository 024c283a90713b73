//! Core types for the Skein RPC transport.
//!
//! This crate provides the pieces every connection shares:
//! - The 16-byte frame envelope and its type-dispatched bodies
//! - Lazy frames that defer body decoding for routing and forwarding
//! - Per-type object pools with a diagnostics registry
//! - The protocol and call-level error taxonomy
//! - Outbound credit accounting

pub mod body;
pub mod codec;
pub mod error;
pub mod flow_control;
pub mod framing;
pub mod lazy;
pub mod pool;
pub mod pools;
pub mod span;

pub use body::{Body, BodyCodec};
pub use error::{CallError, ErrorCode, FrameError};
pub use flow_control::CreditTracker;
pub use framing::{Frame, FrameHeader, FrameType};
pub use lazy::{LazyFrame, LazyFrameParser};
pub use pool::{Pool, PoolRegistry, PoolStats, Pooled, Reset};
pub use pools::FramePools;
pub use span::{Span, Tracing};
