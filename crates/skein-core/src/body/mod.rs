//! Frame body codecs.
//!
//! Every body type knows its own `(length, read, write)` triple through
//! [`BodyCodec`]; [`Body`] is the tagged union the frame envelope dispatches
//! on by frame type.

mod call;
mod cancel;
mod claim;
pub mod error_response;
mod init;

pub use call::{flags, CallCont, CallRequest, CallResponse, Checksum, ChecksumType, MAX_ARGS};
pub use cancel::Cancel;
pub use claim::Claim;
pub use error_response::ErrorResponse;
pub use init::{Init, InitRequest, InitResponse, PROTOCOL_VERSION, REQUIRED_INIT_HEADERS};

use crate::error::Result;
use crate::framing::FrameType;
use crate::pool::Pooled;
use crate::pools::FramePools;

/// The `(length, read, write)` triple of one body layout.
///
/// Offsets are absolute within `buf`; readers return the offset just past
/// what they consumed, writers the offset just past what they wrote.
pub trait BodyCodec: Sized {
    fn byte_length(&self) -> Result<usize>;

    /// Decodes a body. Bodies that allocate from `pools` release that
    /// allocation on every failure path before returning the error.
    fn read_from(buf: &[u8], offset: usize, pools: &mut FramePools) -> Result<(usize, Self)>;

    fn write_into(&self, buf: &mut [u8], offset: usize) -> Result<usize>;
}

/// A decoded frame body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    InitRequest(InitRequest),
    InitResponse(InitResponse),
    CallRequest(CallRequest),
    CallResponse(CallResponse),
    CallRequestCont(CallCont),
    CallResponseCont(CallCont),
    Cancel(Cancel),
    Claim(Claim),
    PingRequest,
    PingResponse,
    ErrorResponse(Pooled<ErrorResponse>),
}

impl Body {
    pub fn frame_type(&self) -> FrameType {
        match self {
            Body::InitRequest(_) => FrameType::InitRequest,
            Body::InitResponse(_) => FrameType::InitResponse,
            Body::CallRequest(_) => FrameType::CallRequest,
            Body::CallResponse(_) => FrameType::CallResponse,
            Body::CallRequestCont(_) => FrameType::CallRequestCont,
            Body::CallResponseCont(_) => FrameType::CallResponseCont,
            Body::Cancel(_) => FrameType::Cancel,
            Body::Claim(_) => FrameType::Claim,
            Body::PingRequest => FrameType::PingRequest,
            Body::PingResponse => FrameType::PingResponse,
            Body::ErrorResponse(_) => FrameType::ErrorResponse,
        }
    }

    /// Wraps a directly constructed error response.
    pub fn error_response(body: ErrorResponse) -> Self {
        Body::ErrorResponse(Pooled::new(body))
    }

    pub fn byte_length(&self) -> Result<usize> {
        match self {
            Body::InitRequest(body) | Body::InitResponse(body) => body.byte_length(),
            Body::CallRequest(body) => body.byte_length(),
            Body::CallResponse(body) => body.byte_length(),
            Body::CallRequestCont(body) | Body::CallResponseCont(body) => body.byte_length(),
            Body::Cancel(body) => body.byte_length(),
            Body::Claim(body) => body.byte_length(),
            Body::PingRequest | Body::PingResponse => Ok(0),
            Body::ErrorResponse(body) => body.byte_length(),
        }
    }

    /// Decodes the body registered for `frame_type`.
    pub fn read_from(
        frame_type: FrameType,
        buf: &[u8],
        offset: usize,
        pools: &mut FramePools,
    ) -> Result<(usize, Self)> {
        fn wrap<T>(
            res: Result<(usize, T)>,
            variant: impl FnOnce(T) -> Body,
        ) -> Result<(usize, Body)> {
            res.map(|(offset, body)| (offset, variant(body)))
        }

        match frame_type {
            FrameType::InitRequest => wrap(Init::read_from(buf, offset, pools), Body::InitRequest),
            FrameType::InitResponse => {
                wrap(Init::read_from(buf, offset, pools), Body::InitResponse)
            }
            FrameType::CallRequest => {
                wrap(CallRequest::read_from(buf, offset, pools), Body::CallRequest)
            }
            FrameType::CallResponse => {
                wrap(CallResponse::read_from(buf, offset, pools), Body::CallResponse)
            }
            FrameType::CallRequestCont => {
                wrap(CallCont::read_from(buf, offset, pools), Body::CallRequestCont)
            }
            FrameType::CallResponseCont => {
                wrap(CallCont::read_from(buf, offset, pools), Body::CallResponseCont)
            }
            FrameType::Cancel => wrap(Cancel::read_from(buf, offset, pools), Body::Cancel),
            FrameType::Claim => wrap(Claim::read_from(buf, offset, pools), Body::Claim),
            FrameType::PingRequest => Ok((offset, Body::PingRequest)),
            FrameType::PingResponse => Ok((offset, Body::PingResponse)),
            FrameType::ErrorResponse => wrap(
                Pooled::<ErrorResponse>::read_from(buf, offset, pools),
                Body::ErrorResponse,
            ),
        }
    }

    pub fn write_into(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        match self {
            Body::InitRequest(body) | Body::InitResponse(body) => body.write_into(buf, offset),
            Body::CallRequest(body) => body.write_into(buf, offset),
            Body::CallResponse(body) => body.write_into(buf, offset),
            Body::CallRequestCont(body) | Body::CallResponseCont(body) => {
                body.write_into(buf, offset)
            }
            Body::Cancel(body) => body.write_into(buf, offset),
            Body::Claim(body) => body.write_into(buf, offset),
            Body::PingRequest | Body::PingResponse => Ok(offset),
            Body::ErrorResponse(body) => body.write_into(buf, offset),
        }
    }
}
