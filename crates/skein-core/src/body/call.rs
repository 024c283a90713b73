//! Call-family bodies.
//!
//! ```text
//! CallRequest:      flags:1 ttl:4 tracing:25 service~1 nh:1 (hk~1 hv~1){nh} csumtype:1 (csum:4){0,1} (arg~2){0..3}
//! CallResponse:     flags:1 code:1 tracing:25 nh:1 (hk~1 hv~1){nh} csumtype:1 (csum:4){0,1} (arg~2){0..3}
//! Call*Cont:        flags:1 csumtype:1 (csum:4){0,1} (arg~2){0..3}
//! ```
//!
//! Args run to the end of the frame, so `read_from` expects `buf` to end
//! where the frame ends. The last arg of a frame with
//! [`flags::MORE_FRAGMENTS`] set continues as the first arg of the next frame.

use bytes::Bytes;

use super::BodyCodec;
use crate::codec::{self, Headers};
use crate::error::{FrameError, Result};
use crate::pools::FramePools;
use crate::span::{Tracing, TRACING_SIZE};

/// At most arg1, arg2 and arg3 appear in one frame.
pub const MAX_ARGS: usize = 3;

/// Call frame flag bits.
pub mod flags {
    /// More frames follow for this call.
    pub const MORE_FRAGMENTS: u8 = 0x01;
}

/// Checksum algorithms a call frame may declare.
#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ChecksumType {
    #[default]
    None = 0x00,
    Crc32 = 0x01,
    Farmhash32 = 0x02,
    Crc32C = 0x03,
}

impl TryFrom<u8> for ChecksumType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(ChecksumType::None),
            0x01 => Ok(ChecksumType::Crc32),
            0x02 => Ok(ChecksumType::Farmhash32),
            0x03 => Ok(ChecksumType::Crc32C),
            other => Err(FrameError::InvalidChecksumType(other)),
        }
    }
}

/// Checksum carried verbatim; verification belongs to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checksum {
    pub kind: ChecksumType,
    pub value: u32,
}

impl Checksum {
    pub fn byte_length(&self) -> usize {
        match self.kind {
            ChecksumType::None => 1,
            _ => 5,
        }
    }

    pub fn read_from(buf: &[u8], offset: usize) -> Result<(usize, Self)> {
        let (offset, raw) = codec::read_u8(buf, offset)?;
        let kind = ChecksumType::try_from(raw)?;
        if kind == ChecksumType::None {
            return Ok((offset, Self { kind, value: 0 }));
        }
        let (offset, value) = codec::read_u32(buf, offset)?;
        Ok((offset, Self { kind, value }))
    }

    pub fn write_into(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        let offset = codec::write_u8(self.kind as u8, buf, offset)?;
        match self.kind {
            ChecksumType::None => Ok(offset),
            _ => codec::write_u32(self.value, buf, offset),
        }
    }
}

fn args_length(args: &[Bytes]) -> Result<usize> {
    if args.len() > MAX_ARGS {
        return Err(FrameError::TooManyArgs(args.len()));
    }
    args.iter().try_fold(0, |acc, arg| {
        if arg.len() > u16::MAX as usize {
            return Err(FrameError::StringTooLong {
                len: arg.len(),
                max: u16::MAX as usize,
            });
        }
        Ok(acc + 2 + arg.len())
    })
}

fn read_args(buf: &[u8], mut offset: usize) -> Result<(usize, Vec<Bytes>)> {
    let mut args = Vec::with_capacity(MAX_ARGS);
    while offset < buf.len() {
        if args.len() == MAX_ARGS {
            return Err(FrameError::TooManyArgs(args.len() + 1));
        }
        let (next, len) = codec::read_u16(buf, offset)?;
        let (next, raw) = codec::read_bytes(buf, next, len as usize)?;
        args.push(Bytes::copy_from_slice(raw));
        offset = next;
    }
    Ok((offset, args))
}

fn write_args(args: &[Bytes], buf: &mut [u8], mut offset: usize) -> Result<usize> {
    args_length(args)?;
    for arg in args {
        offset = codec::write_u16(arg.len() as u16, buf, offset)?;
        offset = codec::write_bytes(arg, buf, offset)?;
    }
    Ok(offset)
}

/// First frame of an outbound call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRequest {
    pub flags: u8,
    pub ttl: u32,
    pub tracing: Tracing,
    pub service: String,
    pub headers: Headers,
    pub checksum: Checksum,
    pub args: Vec<Bytes>,
}

impl CallRequest {
    pub fn has_more_fragments(&self) -> bool {
        self.flags & flags::MORE_FRAGMENTS != 0
    }
}

impl BodyCodec for CallRequest {
    fn byte_length(&self) -> Result<usize> {
        Ok(1 + 4
            + TRACING_SIZE
            + codec::str1_length(&self.service)?
            + self.headers.length1()?
            + self.checksum.byte_length()
            + args_length(&self.args)?)
    }

    fn read_from(buf: &[u8], offset: usize, _pools: &mut FramePools) -> Result<(usize, Self)> {
        let (offset, flags) = codec::read_u8(buf, offset)?;
        let (offset, ttl) = codec::read_u32(buf, offset)?;
        let (offset, tracing) = Tracing::read_from(buf, offset)?;
        let (offset, service) = codec::read_str1(buf, offset)?;
        let (offset, headers) = Headers::read1(buf, offset)?;
        let (offset, checksum) = Checksum::read_from(buf, offset)?;
        let (offset, args) = read_args(buf, offset)?;
        Ok((
            offset,
            Self {
                flags,
                ttl,
                tracing,
                service,
                headers,
                checksum,
                args,
            },
        ))
    }

    fn write_into(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        let offset = codec::write_u8(self.flags, buf, offset)?;
        let offset = codec::write_u32(self.ttl, buf, offset)?;
        let offset = self.tracing.write_into(buf, offset)?;
        let offset = codec::write_str1(&self.service, buf, offset)?;
        let offset = self.headers.write1(buf, offset)?;
        let offset = self.checksum.write_into(buf, offset)?;
        write_args(&self.args, buf, offset)
    }
}

/// First frame of a call's response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallResponse {
    pub flags: u8,
    /// [`CallResponse::OK`] or [`CallResponse::NOT_OK`].
    pub code: u8,
    pub tracing: Tracing,
    pub headers: Headers,
    pub checksum: Checksum,
    pub args: Vec<Bytes>,
}

impl CallResponse {
    pub const OK: u8 = 0x00;
    pub const NOT_OK: u8 = 0x01;

    pub fn has_more_fragments(&self) -> bool {
        self.flags & flags::MORE_FRAGMENTS != 0
    }

    pub fn is_ok(&self) -> bool {
        self.code == Self::OK
    }
}

impl BodyCodec for CallResponse {
    fn byte_length(&self) -> Result<usize> {
        Ok(1 + 1
            + TRACING_SIZE
            + self.headers.length1()?
            + self.checksum.byte_length()
            + args_length(&self.args)?)
    }

    fn read_from(buf: &[u8], offset: usize, _pools: &mut FramePools) -> Result<(usize, Self)> {
        let (offset, flags) = codec::read_u8(buf, offset)?;
        let (offset, code) = codec::read_u8(buf, offset)?;
        let (offset, tracing) = Tracing::read_from(buf, offset)?;
        let (offset, headers) = Headers::read1(buf, offset)?;
        let (offset, checksum) = Checksum::read_from(buf, offset)?;
        let (offset, args) = read_args(buf, offset)?;
        Ok((
            offset,
            Self {
                flags,
                code,
                tracing,
                headers,
                checksum,
                args,
            },
        ))
    }

    fn write_into(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        let offset = codec::write_u8(self.flags, buf, offset)?;
        let offset = codec::write_u8(self.code, buf, offset)?;
        let offset = self.tracing.write_into(buf, offset)?;
        let offset = self.headers.write1(buf, offset)?;
        let offset = self.checksum.write_into(buf, offset)?;
        write_args(&self.args, buf, offset)
    }
}

/// Continuation frame of a call request or response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCont {
    pub flags: u8,
    pub checksum: Checksum,
    pub args: Vec<Bytes>,
}

impl CallCont {
    pub fn has_more_fragments(&self) -> bool {
        self.flags & flags::MORE_FRAGMENTS != 0
    }
}

impl BodyCodec for CallCont {
    fn byte_length(&self) -> Result<usize> {
        Ok(1 + self.checksum.byte_length() + args_length(&self.args)?)
    }

    fn read_from(buf: &[u8], offset: usize, _pools: &mut FramePools) -> Result<(usize, Self)> {
        let (offset, flags) = codec::read_u8(buf, offset)?;
        let (offset, checksum) = Checksum::read_from(buf, offset)?;
        let (offset, args) = read_args(buf, offset)?;
        Ok((
            offset,
            Self {
                flags,
                checksum,
                args,
            },
        ))
    }

    fn write_into(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        let offset = codec::write_u8(self.flags, buf, offset)?;
        let offset = self.checksum.write_into(buf, offset)?;
        write_args(&self.args, buf, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode<B: BodyCodec>(body: &B) -> Vec<u8> {
        let mut buf = vec![0u8; body.byte_length().unwrap()];
        let end = body.write_into(&mut buf, 0).unwrap();
        assert_eq!(end, buf.len());
        buf
    }

    #[test]
    fn test_call_request_round_trip() {
        let req = CallRequest {
            flags: flags::MORE_FRAGMENTS,
            ttl: 1500,
            tracing: Tracing::EMPTY,
            service: "inventory".to_string(),
            headers: [("as", "raw"), ("cn", "checkout")].into_iter().collect(),
            checksum: Checksum {
                kind: ChecksumType::Crc32,
                value: 0xdead_beef,
            },
            args: vec![Bytes::from_static(b"lookup"), Bytes::from_static(b"")],
        };
        let bytes = encode(&req);

        let mut pools = FramePools::new();
        let (offset, decoded) = CallRequest::read_from(&bytes, 0, &mut pools).unwrap();
        assert_eq!(offset, bytes.len());
        assert_eq!(decoded, req);
        assert!(decoded.has_more_fragments());
        assert_eq!(encode(&decoded), bytes);
    }

    #[test]
    fn test_call_response_layout() {
        let res = CallResponse {
            flags: 0,
            code: CallResponse::NOT_OK,
            args: vec![Bytes::new(), Bytes::from_static(b"h"), Bytes::from_static(b"body")],
            ..Default::default()
        };
        let bytes = encode(&res);
        // flags, code, tracing, nh=0, csumtype=0
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes[1], 0x01);
        assert_eq!(bytes[27], 0x00);
        assert_eq!(bytes[28], 0x00);
        assert_eq!(&bytes[29..31], &[0x00, 0x00]);

        let mut pools = FramePools::new();
        let (_, decoded) = CallResponse::read_from(&bytes, 0, &mut pools).unwrap();
        assert!(!decoded.is_ok());
        assert_eq!(decoded.args.len(), 3);
        assert_eq!(decoded.args[2], Bytes::from_static(b"body"));
    }

    #[test]
    fn test_cont_without_args() {
        let cont = CallCont::default();
        let bytes = encode(&cont);
        assert_eq!(bytes, vec![0x00, 0x00]);

        let mut pools = FramePools::new();
        let (_, decoded) = CallCont::read_from(&bytes, 0, &mut pools).unwrap();
        assert!(decoded.args.is_empty());
    }

    #[test]
    fn test_fourth_arg_is_rejected() {
        let mut bytes = vec![0x00, 0x00];
        for _ in 0..4 {
            bytes.extend([0x00, 0x01, b'x']);
        }
        let mut pools = FramePools::new();
        assert_eq!(
            CallCont::read_from(&bytes, 0, &mut pools).unwrap_err(),
            FrameError::TooManyArgs(4)
        );
    }

    #[test]
    fn test_truncated_arg_is_short_read() {
        let bytes = vec![0x00, 0x00, 0x00, 0x05, b'a', b'b'];
        let mut pools = FramePools::new();
        assert!(CallCont::read_from(&bytes, 0, &mut pools)
            .unwrap_err()
            .is_short_read());
    }

    #[test]
    fn test_unknown_checksum_type() {
        let bytes = vec![0x00, 0x09];
        let mut pools = FramePools::new();
        assert_eq!(
            CallCont::read_from(&bytes, 0, &mut pools).unwrap_err(),
            FrameError::InvalidChecksumType(0x09)
        );
    }
}
