//! Distributed tracing correlation carried on frame bodies.
//!
//! The tracing value is opaque to the transport: 25 bytes copied by value.
//! Span bookkeeping lives outside this crate and is consumed through [`Span`].

use crate::codec;
use crate::error::Result;

/// Encoded width of a tracing value.
pub const TRACING_SIZE: usize = 25;

/// Annotation recorded when a server sends its response.
pub const SERVER_SEND: &str = "ss";

/// Opaque 25-byte tracing value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tracing([u8; TRACING_SIZE]);

impl Tracing {
    pub const EMPTY: Tracing = Tracing([0u8; TRACING_SIZE]);

    pub const fn from_bytes(bytes: [u8; TRACING_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TRACING_SIZE] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; TRACING_SIZE]
    }

    pub fn read_from(buf: &[u8], offset: usize) -> Result<(usize, Self)> {
        let (offset, raw) = codec::read_bytes(buf, offset, TRACING_SIZE)?;
        let mut bytes = [0u8; TRACING_SIZE];
        bytes.copy_from_slice(raw);
        Ok((offset, Self(bytes)))
    }

    pub fn write_into(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        codec::write_bytes(&self.0, buf, offset)
    }
}

impl Default for Tracing {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl std::fmt::Debug for Tracing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tracing(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// A live span owned by the caller's tracer.
pub trait Span: Send {
    /// Record a timestamped annotation such as [`SERVER_SEND`].
    fn annotate(&mut self, label: &str);

    /// The wire value identifying this span.
    fn tracing(&self) -> Tracing;
}
