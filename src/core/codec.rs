//! Hand-written little-endian codec for the binary files under .refmerge/
//!
//! Every file has the same frame: a 4-byte magic, a `u32` version, the
//! payload, and a trailing SHA-256 of everything before it. Readers check
//! the magic and version before the checksum so that an old but intact
//! file is reported as a version mismatch rather than as corruption.

use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use thiserror::Error;

const CHECKSUM_LEN: usize = 32;
const HEADER_LEN: usize = 8;

/// Errors produced while decoding a framed file
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unsupported version {found} (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("{0}")]
    Corrupt(String),
}

/// Append-only byte buffer for encoding a framed file
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Start a new frame with the given magic and version
    pub fn new(magic: &[u8; 4], version: u32) -> Self {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(magic);
        buf.extend_from_slice(&version.to_le_bytes());
        Self { buf }
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u128(&mut self, v: u128) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a length-prefixed UTF-8 string
    pub fn str(&mut self, s: &str) {
        self.len(s.len());
        self.buf.extend_from_slice(s.as_bytes());
    }

    /// Write a collection length
    pub fn len(&mut self, n: usize) {
        // Collections in these files never approach u32::MAX entries
        self.u32(n as u32);
    }

    /// Append the checksum and return the finished bytes
    pub fn finish(mut self) -> Vec<u8> {
        let digest = Sha256::digest(&self.buf);
        self.buf.extend_from_slice(&digest);
        self.buf
    }
}

/// Cursor over the payload of a verified frame
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Verify magic, version and checksum, and return a reader over the payload
    pub fn open(bytes: &'a [u8], magic: &[u8; 4], version: u32) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(DecodeError::Corrupt(format!(
                "file too short ({} bytes)",
                bytes.len()
            )));
        }
        if &bytes[..4] != magic {
            return Err(DecodeError::Corrupt("bad magic".to_string()));
        }
        let mut found = [0u8; 4];
        found.copy_from_slice(&bytes[4..8]);
        let found = u32::from_le_bytes(found);
        if found != version {
            return Err(DecodeError::VersionMismatch {
                found,
                expected: version,
            });
        }

        let body_end = bytes.len() - CHECKSUM_LEN;
        let digest = Sha256::digest(&bytes[..body_end]);
        if digest.as_slice() != &bytes[body_end..] {
            return Err(DecodeError::Corrupt("checksum mismatch".to_string()));
        }

        Ok(Self {
            data: &bytes[HEADER_LEN..body_end],
            pos: 0,
        })
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                DecodeError::Corrupt(format!("unexpected end of data at offset {}", self.pos))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub fn u128(&mut self) -> Result<u128, DecodeError> {
        Ok(u128::from_le_bytes(self.array()?))
    }

    /// Read a collection length, rejecting counts the remaining bytes cannot hold
    pub fn len(&mut self, min_item_size: usize) -> Result<usize, DecodeError> {
        let n = self.u32()? as usize;
        let remaining = self.data.len() - self.pos;
        if n.saturating_mul(min_item_size.max(1)) > remaining {
            return Err(DecodeError::Corrupt(format!(
                "length {} exceeds remaining {} bytes",
                n, remaining
            )));
        }
        Ok(n)
    }

    pub fn str(&mut self) -> Result<String, DecodeError> {
        let n = self.u32()? as usize;
        let bytes = self.take(n)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| DecodeError::Corrupt("invalid UTF-8 string".to_string()))
    }

    /// Fail if any payload bytes were left unread
    pub fn finish(self) -> Result<(), DecodeError> {
        if self.pos != self.data.len() {
            return Err(DecodeError::Corrupt(format!(
                "{} trailing bytes",
                self.data.len() - self.pos
            )));
        }
        Ok(())
    }
}

/// Write a file atomically: write a sibling temp file, then rename it into place
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}
