//! Claim body: `ttl:4 tracing:25`

use super::BodyCodec;
use crate::codec;
use crate::error::Result;
use crate::pools::FramePools;
use crate::span::{Tracing, TRACING_SIZE};

/// Fixed-size claim on a call, used when racing duplicate requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Claim {
    pub ttl: u32,
    pub tracing: Tracing,
}

impl Claim {
    pub const SIZE: usize = 4 + TRACING_SIZE;

    pub fn new(ttl: u32, tracing: Tracing) -> Self {
        Self { ttl, tracing }
    }
}

impl BodyCodec for Claim {
    fn byte_length(&self) -> Result<usize> {
        Ok(Self::SIZE)
    }

    fn read_from(buf: &[u8], offset: usize, _pools: &mut FramePools) -> Result<(usize, Self)> {
        let (offset, ttl) = codec::read_u32(buf, offset)?;
        let (offset, tracing) = Tracing::read_from(buf, offset)?;
        Ok((offset, Self { ttl, tracing }))
    }

    fn write_into(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        let offset = codec::write_u32(self.ttl, buf, offset)?;
        self.tracing.write_into(buf, offset)
    }
}
