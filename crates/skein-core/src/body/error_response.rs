//! ErrorResponse body: `code:1 tracing:25 message~2`
//!
//! Decoded instances come from the connection's pool. The code is validated
//! after `code` and `tracing` are read and before the message is touched;
//! every failure path hands the half-built instance back to the pool.

use super::BodyCodec;
use crate::codec;
use crate::error::{CallError, ErrorCode, FrameError, Result};
use crate::framing::BODY_OFFSET;
use crate::lazy::LazyFrame;
use crate::pool::{Pooled, Reset};
use crate::pools::FramePools;
use crate::span::{Tracing, TRACING_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub tracing: Tracing,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, tracing: Tracing, message: impl Into<String>) -> Self {
        Self {
            code,
            tracing,
            message: message.into(),
        }
    }

    /// Surfaces this body as a typed application error.
    pub fn to_call_error(&self, frame_id: u32) -> CallError {
        CallError::from_error_response(self, frame_id)
    }

    fn fill_from(&mut self, buf: &[u8], offset: usize) -> Result<usize> {
        let (offset, raw_code) = codec::read_u8(buf, offset)?;
        let (offset, tracing) = Tracing::read_from(buf, offset)?;
        self.tracing = tracing;
        self.code = ErrorCode::try_from(raw_code)
            .map_err(|code| FrameError::InvalidErrorCode { code, tracing })?;
        let (offset, message) = codec::read_str2(buf, offset)?;
        self.message = message;
        Ok(offset)
    }
}

impl Default for ErrorResponse {
    fn default() -> Self {
        Self {
            code: ErrorCode::UnexpectedError,
            tracing: Tracing::EMPTY,
            message: String::new(),
        }
    }
}

impl Reset for ErrorResponse {
    fn reset(&mut self) {
        self.code = ErrorCode::UnexpectedError;
        self.tracing = Tracing::EMPTY;
        self.message.clear();
    }
}

impl BodyCodec for Pooled<ErrorResponse> {
    fn byte_length(&self) -> Result<usize> {
        Ok(1 + TRACING_SIZE + codec::str2_length(&self.message)?)
    }

    fn read_from(buf: &[u8], offset: usize, pools: &mut FramePools) -> Result<(usize, Self)> {
        let pool = pools.error_responses();
        let mut body = pool.get();
        match body.fill_from(buf, offset) {
            Ok(offset) => Ok((offset, body)),
            Err(err) => {
                pool.free(&mut body);
                Err(err)
            }
        }
    }

    fn write_into(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        let offset = codec::write_u8(self.code.as_u8(), buf, offset)?;
        let offset = self.tracing.write_into(buf, offset)?;
        codec::write_str2(&self.message, buf, offset)
    }
}

/// Field accessors that read straight from a lazy frame's bytes.
pub mod lazy {
    use super::*;

    pub const CODE_OFFSET: usize = BODY_OFFSET;
    pub const TRACING_OFFSET: usize = CODE_OFFSET + 1;
    pub const MESSAGE_OFFSET: usize = TRACING_OFFSET + TRACING_SIZE;

    fn view(frame: &LazyFrame) -> Result<&[u8]> {
        frame
            .as_bytes()
            .map(|bytes| bytes.as_ref())
            .ok_or(FrameError::CorruptLazyFrame("missing buffer"))
    }

    pub fn read_code(frame: &LazyFrame) -> Result<ErrorCode> {
        let (_, raw) = codec::read_u8(view(frame)?, CODE_OFFSET)?;
        ErrorCode::try_from(raw).map_err(|code| FrameError::InvalidErrorCode {
            code,
            tracing: read_tracing(frame).unwrap_or_default(),
        })
    }

    pub fn read_tracing(frame: &LazyFrame) -> Result<Tracing> {
        Tracing::read_from(view(frame)?, TRACING_OFFSET).map(|(_, tracing)| tracing)
    }

    pub fn read_message(frame: &LazyFrame) -> Result<String> {
        codec::read_str2(view(frame)?, MESSAGE_OFFSET).map(|(_, message)| message)
    }
}
