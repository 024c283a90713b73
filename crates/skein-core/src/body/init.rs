//! InitRequest / InitResponse body: `version:2 nh:2 (hk~2 hv~2){nh}`
//!
//! Both directions share one layout and the same required-header guard,
//! applied on decode and on encode so that neither peer can accept or
//! produce a handshake without `host_port` and `process_name`.

use super::BodyCodec;
use crate::codec::{self, Headers};
use crate::error::{FrameError, Result};
use crate::pools::FramePools;

/// Protocol version sent in handshakes.
pub const PROTOCOL_VERSION: u16 = 2;

/// Headers every init body must carry.
pub const REQUIRED_INIT_HEADERS: [&str; 2] = ["host_port", "process_name"];

/// Handshake body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Init {
    pub version: u16,
    pub headers: Headers,
}

pub type InitRequest = Init;
pub type InitResponse = Init;

impl Init {
    /// A handshake carrying the required headers.
    pub fn new(host_port: impl Into<String>, process_name: impl Into<String>) -> Self {
        let mut headers = Headers::new();
        headers.insert("host_port", host_port);
        headers.insert("process_name", process_name);
        Self {
            version: PROTOCOL_VERSION,
            headers,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn host_port(&self) -> Option<&str> {
        self.headers.get("host_port")
    }

    pub fn process_name(&self) -> Option<&str> {
        self.headers.get("process_name")
    }
}

fn required_field_guard(headers: &Headers) -> Result<()> {
    match REQUIRED_INIT_HEADERS
        .iter()
        .find(|field| !headers.contains_key(field))
    {
        Some(field) => Err(FrameError::MissingInitHeader { field: *field }),
        None => Ok(()),
    }
}

impl BodyCodec for Init {
    fn byte_length(&self) -> Result<usize> {
        Ok(2 + self.headers.length2()?)
    }

    fn read_from(buf: &[u8], offset: usize, _pools: &mut FramePools) -> Result<(usize, Self)> {
        let (offset, version) = codec::read_u16(buf, offset)?;
        let (offset, headers) = Headers::read2(buf, offset)?;
        required_field_guard(&headers)?;
        Ok((offset, Self { version, headers }))
    }

    fn write_into(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        required_field_guard(&self.headers)?;
        let offset = codec::write_u16(self.version, buf, offset)?;
        self.headers.write2(buf, offset)
    }
}
