//! Frames whose body is decoded on demand.
//!
//! A [`LazyFrame`] reads only the header and keeps the frame's bytes as a
//! reference-counted [`Bytes`] view, so routing and forwarding never pay for
//! a body decode. [`LazyFrameParser`] cuts such views out of a connection's
//! receive buffer without copying.

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::body::{flags, Body};
use crate::codec;
use crate::error::{FrameError, Result};
use crate::framing::{
    tag_body_error, FrameType, BODY_OFFSET, ID_OFFSET, NULL_ID, OVERHEAD, TYPE_OFFSET,
};
use crate::pool::{Pooled, Reset};
use crate::pools::FramePools;

#[derive(Debug, Clone, PartialEq)]
pub struct LazyFrame {
    size: u16,
    frame_type: Option<FrameType>,
    id: u32,
    buffer: Option<Bytes>,
    body: Option<Body>,
}

impl Default for LazyFrame {
    fn default() -> Self {
        Self {
            size: 0,
            frame_type: None,
            id: NULL_ID,
            buffer: None,
            body: None,
        }
    }
}

impl Reset for LazyFrame {
    fn reset(&mut self) {
        self.size = 0;
        self.frame_type = None;
        self.id = NULL_ID;
        self.buffer = None;
        self.body = None;
    }
}

impl LazyFrame {
    /// Reads the header at `offset` and keeps a view of exactly `size` bytes.
    pub fn read_from(
        buf: &Bytes,
        offset: usize,
        pools: &mut FramePools,
    ) -> Result<(usize, Pooled<LazyFrame>)> {
        let (_, size) = codec::read_u16(buf, offset)?;
        if (size as usize) < OVERHEAD {
            return Err(FrameError::InvalidFrameSize(size));
        }
        let end = offset + size as usize;
        if end > buf.len() {
            return Err(FrameError::ShortRead {
                needed: size as usize,
                remaining: buf.len() - offset,
                offset,
            });
        }

        let view = buf.slice(offset..end);
        let (_, raw_type) = codec::read_u8(&view, TYPE_OFFSET)?;
        let frame_type = FrameType::try_from(raw_type)?;
        let (_, id) = codec::read_u32(&view, ID_OFFSET)?;

        let mut frame = pools.lazy_frames().get();
        frame.size = size;
        frame.frame_type = Some(frame_type);
        frame.id = id;
        frame.buffer = Some(view);
        Ok((end, frame))
    }

    pub fn size(&self) -> u16 {
        self.size
    }

    pub fn frame_type(&self) -> Option<FrameType> {
        self.frame_type
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn byte_length(&self) -> usize {
        self.size as usize
    }

    /// The frame's raw bytes, header included.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        self.buffer.as_ref()
    }

    /// The cached body, if [`LazyFrame::read_body`] has run.
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Decodes the body on first call and returns the cached value after.
    pub fn read_body(&mut self, pools: &mut FramePools) -> Result<&Body> {
        if self.body.is_none() {
            let view = self
                .buffer
                .as_ref()
                .ok_or(FrameError::CorruptLazyFrame("missing buffer"))?;
            let frame_type = self
                .frame_type
                .ok_or(FrameError::CorruptLazyFrame("missing frame type"))?;
            let (_, body) = Body::read_from(frame_type, view, BODY_OFFSET, pools)
                .map_err(|err| tag_body_error(frame_type, self.id, err))?;
            self.body = Some(body);
        }
        self.body
            .as_ref()
            .ok_or(FrameError::CorruptLazyFrame("body not decoded"))
    }

    pub(crate) fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    /// Copies the original bytes verbatim; the cached body is never re-encoded.
    pub fn write_into(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        let view = self
            .buffer
            .as_ref()
            .ok_or(FrameError::CorruptLazyFrame("missing buffer"))?;
        codec::write_bytes(view, buf, offset)
    }

    /// Rewrites the frame id, in the header bytes as well, for forwarding.
    pub fn set_id(&mut self, id: u32) -> Result<()> {
        let view = self
            .buffer
            .as_ref()
            .ok_or(FrameError::CorruptLazyFrame("missing buffer"))?;
        let mut owned = BytesMut::from(&view[..]);
        codec::write_u32(id, &mut owned, ID_OFFSET)?;
        self.buffer = Some(owned.freeze());
        self.id = id;
        Ok(())
    }

    /// True for frames that end their call: error responses and the last
    /// fragment of a call response.
    pub fn is_terminal(&self) -> bool {
        match self.frame_type {
            Some(FrameType::ErrorResponse) => true,
            Some(FrameType::CallResponse) | Some(FrameType::CallResponseCont) => self
                .buffer
                .as_ref()
                .and_then(|view| view.get(BODY_OFFSET))
                .is_some_and(|frame_flags| frame_flags & flags::MORE_FRAGMENTS == 0),
            _ => false,
        }
    }
}

/// Splits a connection's byte stream into lazy frames.
#[derive(Debug, Default)]
pub struct LazyFrameParser {
    buffer: BytesMut,
}

impl LazyFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add data to the parser buffer
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns the next whole frame, or `None` until enough bytes arrive.
    pub fn parse_frame(&mut self, pools: &mut FramePools) -> Result<Option<Pooled<LazyFrame>>> {
        if self.buffer.len() < 2 {
            return Ok(None);
        }
        let size = u16::from_be_bytes([self.buffer[0], self.buffer[1]]);
        if (size as usize) < OVERHEAD {
            return Err(FrameError::InvalidFrameSize(size));
        }
        if self.buffer.len() < size as usize {
            return Ok(None);
        }

        let bytes = self.buffer.split_to(size as usize).freeze();
        let (_, frame) = LazyFrame::read_from(&bytes, 0, pools)?;
        trace!(
            frame_type = ?frame.frame_type(),
            id = frame.id(),
            size,
            "parsed frame"
        );
        Ok(Some(frame))
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{error_response, CallResponse, ErrorResponse};
    use crate::error::ErrorCode;
    use crate::framing::Frame;
    use crate::span::{Tracing, TRACING_SIZE};

    fn error_frame_bytes(id: u32, message: &str) -> Bytes {
        let tracing = Tracing::from_bytes([0x5a; TRACING_SIZE]);
        let mut frame = Frame::new(
            id,
            Body::error_response(ErrorResponse::new(ErrorCode::Busy, tracing, message)),
        );
        frame.encode().unwrap()
    }

    #[test]
    fn test_write_before_read_body_is_verbatim() {
        let bytes = error_frame_bytes(5, "");
        assert_eq!(bytes.len(), OVERHEAD + 1 + TRACING_SIZE + 2);

        let mut pools = FramePools::new();
        let (offset, frame) = LazyFrame::read_from(&bytes, 0, &mut pools).unwrap();
        assert_eq!(offset, bytes.len());
        assert!(frame.body().is_none());

        let mut out = vec![0u8; frame.byte_length()];
        assert_eq!(frame.write_into(&mut out, 0).unwrap(), bytes.len());
        assert_eq!(out, bytes.to_vec());
    }

    #[test]
    fn test_read_body_decodes_once() {
        let bytes = error_frame_bytes(5, "overloaded");
        let mut pools = FramePools::new();
        let (_, mut frame) = LazyFrame::read_from(&bytes, 0, &mut pools).unwrap();

        match frame.read_body(&mut pools).unwrap() {
            Body::ErrorResponse(res) => assert_eq!(res.message, "overloaded"),
            other => panic!("unexpected body: {other:?}"),
        }
        frame.read_body(&mut pools).unwrap();
        assert_eq!(pools.error_responses().stats().newed, 1);

        pools.free_lazy_frame(&mut frame);
        assert!(pools.registry().leaks().is_empty());
    }

    #[test]
    fn test_missing_buffer_is_corrupt() {
        let mut pools = FramePools::new();
        let mut frame = LazyFrame::default();
        assert_eq!(
            frame.read_body(&mut pools).unwrap_err(),
            FrameError::CorruptLazyFrame("missing buffer")
        );
        let mut out = [0u8; 32];
        assert!(matches!(
            frame.write_into(&mut out, 0),
            Err(FrameError::CorruptLazyFrame(_))
        ));
    }

    #[test]
    fn test_write_into_small_buffer_is_short_write() {
        let bytes = error_frame_bytes(5, "x");
        let mut pools = FramePools::new();
        let (_, frame) = LazyFrame::read_from(&bytes, 0, &mut pools).unwrap();
        let mut out = vec![0u8; bytes.len() - 1];
        assert!(matches!(
            frame.write_into(&mut out, 0),
            Err(FrameError::ShortWrite { .. })
        ));
    }

    #[test]
    fn test_declared_size_beyond_buffer() {
        let mut raw = vec![0u8; 10];
        raw[1] = 20;
        raw[2] = FrameType::ErrorResponse.as_u8();
        let mut pools = FramePools::new();
        let err = LazyFrame::read_from(&Bytes::from(raw), 0, &mut pools).unwrap_err();
        assert!(err.is_short_read());
        assert_eq!(pools.lazy_frames().stats().outstanding, 0);
    }

    #[test]
    fn test_lazy_error_accessors() {
        let bytes = error_frame_bytes(5, "sick");
        let mut pools = FramePools::new();
        let (_, frame) = LazyFrame::read_from(&bytes, 0, &mut pools).unwrap();

        assert_eq!(error_response::lazy::read_code(&frame).unwrap(), ErrorCode::Busy);
        assert_eq!(
            error_response::lazy::read_tracing(&frame).unwrap(),
            Tracing::from_bytes([0x5a; TRACING_SIZE])
        );
        assert_eq!(error_response::lazy::read_message(&frame).unwrap(), "sick");
        assert!(frame.is_terminal());
        assert!(frame.body().is_none());
    }

    #[test]
    fn test_set_id_rewrites_header() {
        let bytes = error_frame_bytes(5, "");
        let mut pools = FramePools::new();
        let (_, mut frame) = LazyFrame::read_from(&bytes, 0, &mut pools).unwrap();
        frame.set_id(0x0a0b_0c0d).unwrap();

        assert_eq!(frame.id(), 0x0a0b_0c0d);
        let view = frame.as_bytes().unwrap();
        assert_eq!(&view[ID_OFFSET..ID_OFFSET + 4], &[0x0a, 0x0b, 0x0c, 0x0d]);
        // the receive buffer is untouched
        assert_eq!(&bytes[ID_OFFSET..ID_OFFSET + 4], &[0, 0, 0, 5]);
    }

    #[test]
    fn test_parser_waits_for_whole_frames() {
        let mut first = Frame::new(1, Body::CallResponse(CallResponse {
            flags: flags::MORE_FRAGMENTS,
            ..Default::default()
        }));
        let mut second = Frame::new(1, Body::PingResponse);
        let mut wire = first.encode().unwrap().to_vec();
        wire.extend_from_slice(&second.encode().unwrap());

        let mut pools = FramePools::new();
        let mut parser = LazyFrameParser::new();
        parser.feed(&wire[..3]);
        assert!(parser.parse_frame(&mut pools).unwrap().is_none());

        parser.feed(&wire[3..]);
        let call = parser.parse_frame(&mut pools).unwrap().unwrap();
        assert_eq!(call.frame_type(), Some(FrameType::CallResponse));
        assert!(!call.is_terminal());

        let ping = parser.parse_frame(&mut pools).unwrap().unwrap();
        assert_eq!(ping.frame_type(), Some(FrameType::PingResponse));
        assert!(parser.is_empty());
        assert!(parser.parse_frame(&mut pools).unwrap().is_none());
    }

    #[test]
    fn test_parser_rejects_undersized_header() {
        let mut pools = FramePools::new();
        let mut parser = LazyFrameParser::new();
        parser.feed(&[0x00, 0x04, 0x00, 0x00]);
        assert_eq!(
            parser.parse_frame(&mut pools).unwrap_err(),
            FrameError::InvalidFrameSize(4)
        );
    }
}
