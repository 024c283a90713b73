//! Frame envelope for the Skein wire protocol.
//!
//! Frame format (all integers big-endian):
//!
//! ```text
//! 0      2      3      4          8                  16
//! +------+------+------+----------+------------------+----------
//! | size | type | 0x00 |    id    | 8 reserved bytes | body ...
//! +------+------+------+----------+------------------+----------
//! ```
//!
//! `size` counts the whole frame, header included.

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::body::Body;
use crate::codec;
use crate::error::{FrameError, Result};
use crate::pool::{Pooled, Reset};
use crate::pools::FramePools;

/// Header length; the body starts here.
pub const OVERHEAD: usize = 16;
/// Largest encodable frame.
pub const MAX_SIZE: usize = 0xffff;
pub const MAX_BODY_SIZE: usize = MAX_SIZE - OVERHEAD;
pub const MAX_ID: u32 = 0xffff_fffe;
/// Id of a frame that has not been assigned one yet.
pub const NULL_ID: u32 = 0xffff_ffff;

pub const SIZE_OFFSET: usize = 0;
pub const TYPE_OFFSET: usize = 2;
pub const ID_OFFSET: usize = 4;
pub const BODY_OFFSET: usize = OVERHEAD;

/// Frame type codes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    InitRequest = 0x01,
    InitResponse = 0x02,
    CallRequest = 0x03,
    CallResponse = 0x04,
    CallRequestCont = 0x13,
    CallResponseCont = 0x14,
    Cancel = 0xc0,
    Claim = 0xc1,
    PingRequest = 0xd0,
    PingResponse = 0xd1,
    ErrorResponse = 0xff,
}

impl FrameType {
    pub const fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub const fn name(&self) -> &'static str {
        match self {
            FrameType::InitRequest => "init req",
            FrameType::InitResponse => "init res",
            FrameType::CallRequest => "call req",
            FrameType::CallResponse => "call res",
            FrameType::CallRequestCont => "call req cont",
            FrameType::CallResponseCont => "call res cont",
            FrameType::Cancel => "cancel",
            FrameType::Claim => "claim",
            FrameType::PingRequest => "ping req",
            FrameType::PingResponse => "ping res",
            FrameType::ErrorResponse => "error",
        }
    }

    /// Types whose body belongs to a call; their decode errors carry the frame id.
    pub const fn is_call(&self) -> bool {
        matches!(
            self,
            FrameType::CallRequest
                | FrameType::CallResponse
                | FrameType::CallRequestCont
                | FrameType::CallResponseCont
                | FrameType::Cancel
                | FrameType::Claim
                | FrameType::ErrorResponse
        )
    }
}

impl TryFrom<u8> for FrameType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(FrameType::InitRequest),
            0x02 => Ok(FrameType::InitResponse),
            0x03 => Ok(FrameType::CallRequest),
            0x04 => Ok(FrameType::CallResponse),
            0x13 => Ok(FrameType::CallRequestCont),
            0x14 => Ok(FrameType::CallResponseCont),
            0xc0 => Ok(FrameType::Cancel),
            0xc1 => Ok(FrameType::Claim),
            0xd0 => Ok(FrameType::PingRequest),
            0xd1 => Ok(FrameType::PingResponse),
            0xff => Ok(FrameType::ErrorResponse),
            other => Err(FrameError::InvalidFrameType(other)),
        }
    }
}

/// Attaches the frame id to body errors of call-carrying frames.
pub(crate) fn tag_body_error(frame_type: FrameType, frame_id: u32, err: FrameError) -> FrameError {
    if frame_type.is_call() {
        FrameError::Call {
            frame_id,
            source: Box::new(err),
        }
    } else {
        err
    }
}

/// The fixed 16-byte header, read without touching the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub size: u16,
    pub frame_type: FrameType,
    pub id: u32,
}

impl FrameHeader {
    /// Reads the header at `offset`. The body need not be present yet.
    pub fn peek(buf: &[u8], offset: usize) -> Result<Self> {
        codec::read_bytes(buf, offset, OVERHEAD)?;
        let (_, size) = codec::read_u16(buf, offset + SIZE_OFFSET)?;
        if (size as usize) < OVERHEAD {
            return Err(FrameError::InvalidFrameSize(size));
        }
        let (_, raw_type) = codec::read_u8(buf, offset + TYPE_OFFSET)?;
        let (_, id) = codec::read_u32(buf, offset + ID_OFFSET)?;
        Ok(Self {
            size,
            frame_type: FrameType::try_from(raw_type)?,
            id,
        })
    }
}

/// A fully decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Total encoded length; set by decode and by `write_into`.
    pub size: u16,
    pub id: u32,
    pub body: Option<Body>,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            size: 0,
            id: NULL_ID,
            body: None,
        }
    }
}

impl Reset for Frame {
    fn reset(&mut self) {
        self.size = 0;
        self.id = NULL_ID;
        self.body = None;
    }
}

impl Frame {
    pub fn new(id: u32, body: Body) -> Self {
        Self {
            size: 0,
            id,
            body: Some(body),
        }
    }

    pub fn frame_type(&self) -> Option<FrameType> {
        self.body.as_ref().map(Body::frame_type)
    }

    pub fn body(&self) -> Result<&Body> {
        self.body.as_ref().ok_or(FrameError::EmptyFrame)
    }

    /// Length pre-pass: header plus encoded body.
    pub fn byte_length(&self) -> Result<usize> {
        Ok(OVERHEAD + self.body()?.byte_length()?)
    }

    /// Decodes one frame starting at `offset`.
    ///
    /// The body is decoded only within the `size` bytes the header declares;
    /// returns the offset just past the frame.
    pub fn read_from(
        buf: &[u8],
        offset: usize,
        pools: &mut FramePools,
    ) -> Result<(usize, Pooled<Frame>)> {
        let (next, size) = codec::read_u16(buf, offset)?;
        if (size as usize) < OVERHEAD {
            return Err(FrameError::InvalidFrameSize(size));
        }
        let (_, raw_type) = codec::read_u8(buf, next)?;
        let frame_type = FrameType::try_from(raw_type)?;
        let (_, id) = codec::read_u32(buf, offset + ID_OFFSET)?;

        let end = offset + size as usize;
        let result = if end > buf.len() {
            Err(FrameError::ShortRead {
                needed: size as usize,
                remaining: buf.len() - offset,
                offset,
            })
        } else {
            Body::read_from(frame_type, &buf[..end], offset + BODY_OFFSET, pools)
        };

        let body = match result {
            Ok((_, body)) => body,
            Err(err) => {
                debug!(
                    frame_type = frame_type.name(),
                    id,
                    error = %err,
                    "frame decode failed"
                );
                return Err(tag_body_error(frame_type, id, err));
            }
        };

        let mut frame = pools.frames().get();
        frame.size = size;
        frame.id = id;
        frame.body = Some(body);
        Ok((end, frame))
    }

    /// Decodes the frame at the start of `buf`.
    pub fn from_bytes(buf: &[u8], pools: &mut FramePools) -> Result<Pooled<Frame>> {
        Self::read_from(buf, 0, pools).map(|(_, frame)| frame)
    }

    /// Writes the frame at `offset` and backpatches the size field.
    ///
    /// Trusts the single write pass; see [`Frame::encode`] for the checked path.
    pub fn write_into(&mut self, buf: &mut [u8], offset: usize) -> Result<usize> {
        let body = self.body()?;
        let frame_type = body.frame_type();

        let next = codec::write_u8(frame_type.as_u8(), buf, offset + TYPE_OFFSET)?;
        let next = codec::write_u8(0, buf, next)?;
        let next = codec::write_u32(self.id, buf, next)?;
        let next = codec::write_zeros(8, buf, next)?;
        let end = body.write_into(buf, next)?;

        let len = end - offset;
        if len > MAX_SIZE {
            return Err(FrameError::FrameTooLarge(len));
        }
        codec::write_u16(len as u16, buf, offset + SIZE_OFFSET)?;
        self.size = len as u16;
        Ok(end)
    }

    /// Encodes into a freshly sized buffer, checking that the length
    /// pre-pass agrees with what was written.
    pub fn encode(&mut self) -> Result<Bytes> {
        let expected = self.byte_length()?;
        if expected > MAX_SIZE {
            return Err(FrameError::FrameTooLarge(expected));
        }
        let mut buf = vec![0u8; expected];
        let actual = self.write_into(&mut buf, 0)?;
        if actual != expected {
            return Err(FrameError::LengthMismatch { expected, actual });
        }
        Ok(Bytes::from(buf))
    }

    /// Appends the encoded frame to `dst`. On error `dst` is left as it was.
    pub fn encode_into(&mut self, dst: &mut BytesMut) -> Result<usize> {
        let expected = self.byte_length()?;
        if expected > MAX_SIZE {
            return Err(FrameError::FrameTooLarge(expected));
        }
        let start = dst.len();
        dst.resize(start + expected, 0);
        match self.write_into(&mut dst[start..], 0) {
            Ok(actual) if actual == expected => Ok(actual),
            Ok(actual) => {
                dst.truncate(start);
                Err(FrameError::LengthMismatch { expected, actual })
            }
            Err(err) => {
                dst.truncate(start);
                Err(err)
            }
        }
    }
}
