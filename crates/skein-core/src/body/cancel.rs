//! Cancel body: `ttl:4 tracing:25 why~2`

use super::BodyCodec;
use crate::codec;
use crate::error::Result;
use crate::pools::FramePools;
use crate::span::{Tracing, TRACING_SIZE};

/// Asks the peer to abandon an in-flight call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cancel {
    pub ttl: u32,
    pub tracing: Tracing,
    pub why: String,
}

impl Cancel {
    pub fn new(ttl: u32, tracing: Tracing, why: impl Into<String>) -> Self {
        Self {
            ttl,
            tracing,
            why: why.into(),
        }
    }
}

impl BodyCodec for Cancel {
    fn byte_length(&self) -> Result<usize> {
        Ok(4 + TRACING_SIZE + codec::str2_length(&self.why)?)
    }

    fn read_from(buf: &[u8], offset: usize, _pools: &mut FramePools) -> Result<(usize, Self)> {
        let (offset, ttl) = codec::read_u32(buf, offset)?;
        let (offset, tracing) = Tracing::read_from(buf, offset)?;
        let (offset, why) = codec::read_str2(buf, offset)?;
        Ok((offset, Self { ttl, tracing, why }))
    }

    fn write_into(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        let offset = codec::write_u32(self.ttl, buf, offset)?;
        let offset = self.tracing.write_into(buf, offset)?;
        codec::write_str2(&self.why, buf, offset)
    }
}
