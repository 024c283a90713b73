//! Big-endian wire primitives shared by the frame and body codecs.
//!
//! Every reader takes `(buf, offset)` and returns `(new_offset, value)`;
//! every writer takes `(value, buf, offset)` and returns the new offset.
//! Nothing here reads or writes outside the slice it is given.

use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

#[inline]
fn ensure_read(buf: &[u8], offset: usize, needed: usize) -> Result<()> {
    let remaining = buf.len().saturating_sub(offset);
    if remaining < needed {
        return Err(FrameError::ShortRead {
            needed,
            remaining,
            offset,
        });
    }
    Ok(())
}

#[inline]
fn ensure_write(buf: &[u8], offset: usize, needed: usize) -> Result<()> {
    let remaining = buf.len().saturating_sub(offset);
    if remaining < needed {
        return Err(FrameError::ShortWrite {
            needed,
            remaining,
            offset,
        });
    }
    Ok(())
}

pub fn read_u8(buf: &[u8], offset: usize) -> Result<(usize, u8)> {
    ensure_read(buf, offset, 1)?;
    Ok((offset + 1, buf[offset]))
}

pub fn read_u16(buf: &[u8], offset: usize) -> Result<(usize, u16)> {
    ensure_read(buf, offset, 2)?;
    let value = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
    Ok((offset + 2, value))
}

pub fn read_u32(buf: &[u8], offset: usize) -> Result<(usize, u32)> {
    ensure_read(buf, offset, 4)?;
    let value = u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ]);
    Ok((offset + 4, value))
}

pub fn read_bytes(buf: &[u8], offset: usize, len: usize) -> Result<(usize, &[u8])> {
    ensure_read(buf, offset, len)?;
    Ok((offset + len, &buf[offset..offset + len]))
}

fn read_utf8(buf: &[u8], offset: usize, len: usize) -> Result<(usize, String)> {
    let (end, raw) = read_bytes(buf, offset, len)?;
    let value = std::str::from_utf8(raw).map_err(|_| FrameError::InvalidUtf8 { offset })?;
    Ok((end, value.to_string()))
}

/// `s~1`: u8 length prefix then UTF-8 bytes.
pub fn read_str1(buf: &[u8], offset: usize) -> Result<(usize, String)> {
    let (offset, len) = read_u8(buf, offset)?;
    read_utf8(buf, offset, len as usize)
}

/// `s~2`: u16 length prefix then UTF-8 bytes.
pub fn read_str2(buf: &[u8], offset: usize) -> Result<(usize, String)> {
    let (offset, len) = read_u16(buf, offset)?;
    read_utf8(buf, offset, len as usize)
}

pub fn write_u8(value: u8, buf: &mut [u8], offset: usize) -> Result<usize> {
    ensure_write(buf, offset, 1)?;
    buf[offset] = value;
    Ok(offset + 1)
}

pub fn write_u16(value: u16, buf: &mut [u8], offset: usize) -> Result<usize> {
    ensure_write(buf, offset, 2)?;
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
    Ok(offset + 2)
}

pub fn write_u32(value: u32, buf: &mut [u8], offset: usize) -> Result<usize> {
    ensure_write(buf, offset, 4)?;
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
    Ok(offset + 4)
}

pub fn write_bytes(value: &[u8], buf: &mut [u8], offset: usize) -> Result<usize> {
    ensure_write(buf, offset, value.len())?;
    buf[offset..offset + value.len()].copy_from_slice(value);
    Ok(offset + value.len())
}

/// Zero-fill `len` reserved bytes.
pub fn write_zeros(len: usize, buf: &mut [u8], offset: usize) -> Result<usize> {
    ensure_write(buf, offset, len)?;
    buf[offset..offset + len].fill(0);
    Ok(offset + len)
}

pub fn str1_length(value: &str) -> Result<usize> {
    check_len(value.len(), u8::MAX as usize)?;
    Ok(1 + value.len())
}

pub fn str2_length(value: &str) -> Result<usize> {
    check_len(value.len(), u16::MAX as usize)?;
    Ok(2 + value.len())
}

pub fn write_str1(value: &str, buf: &mut [u8], offset: usize) -> Result<usize> {
    check_len(value.len(), u8::MAX as usize)?;
    let offset = write_u8(value.len() as u8, buf, offset)?;
    write_bytes(value.as_bytes(), buf, offset)
}

pub fn write_str2(value: &str, buf: &mut [u8], offset: usize) -> Result<usize> {
    check_len(value.len(), u16::MAX as usize)?;
    let offset = write_u16(value.len() as u16, buf, offset)?;
    write_bytes(value.as_bytes(), buf, offset)
}

fn check_len(len: usize, max: usize) -> Result<()> {
    if len > max {
        return Err(FrameError::StringTooLong { len, max });
    }
    Ok(())
}

/// An ordered string header map.
///
/// Wire order is preserved so that a decoded map re-encodes to the same bytes.
/// Inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `nh:1 (k~1 v~1){nh}`
    pub fn length1(&self) -> Result<usize> {
        if self.0.len() > u8::MAX as usize {
            return Err(FrameError::TooManyHeaders(self.0.len()));
        }
        self.0.iter().try_fold(1, |acc, (k, v)| {
            Ok(acc + str1_length(k)? + str1_length(v)?)
        })
    }

    /// `nh:2 (k~2 v~2){nh}`
    pub fn length2(&self) -> Result<usize> {
        if self.0.len() > u16::MAX as usize {
            return Err(FrameError::TooManyHeaders(self.0.len()));
        }
        self.0.iter().try_fold(2, |acc, (k, v)| {
            Ok(acc + str2_length(k)? + str2_length(v)?)
        })
    }

    pub fn read1(buf: &[u8], offset: usize) -> Result<(usize, Self)> {
        let (mut offset, count) = read_u8(buf, offset)?;
        let mut headers = Headers::new();
        for _ in 0..count {
            let (next, key) = read_str1(buf, offset)?;
            let (next, value) = read_str1(buf, next)?;
            headers.insert(key, value);
            offset = next;
        }
        Ok((offset, headers))
    }

    pub fn read2(buf: &[u8], offset: usize) -> Result<(usize, Self)> {
        let (mut offset, count) = read_u16(buf, offset)?;
        let mut headers = Headers::new();
        for _ in 0..count {
            let (next, key) = read_str2(buf, offset)?;
            let (next, value) = read_str2(buf, next)?;
            headers.insert(key, value);
            offset = next;
        }
        Ok((offset, headers))
    }

    pub fn write1(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        if self.0.len() > u8::MAX as usize {
            return Err(FrameError::TooManyHeaders(self.0.len()));
        }
        let mut offset = write_u8(self.0.len() as u8, buf, offset)?;
        for (key, value) in &self.0 {
            offset = write_str1(key, buf, offset)?;
            offset = write_str1(value, buf, offset)?;
        }
        Ok(offset)
    }

    pub fn write2(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        if self.0.len() > u16::MAX as usize {
            return Err(FrameError::TooManyHeaders(self.0.len()));
        }
        let mut offset = write_u16(self.0.len() as u16, buf, offset)?;
        for (key, value) in &self.0 {
            offset = write_str2(key, buf, offset)?;
            offset = write_str2(value, buf, offset)?;
        }
        Ok(offset)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.insert(k, v);
        }
        headers
    }
}
