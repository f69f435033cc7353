//! Big-endian binary reader/writer for the election wire format.
//!
//! Every integer is big-endian. Variable-length fields carry a `u32` length
//! prefix. Fixed-size fields (identities, hashes, signatures) are written raw.

use fedvote_types::{Identity, MessageHash, Signature, Timestamp};
use thiserror::Error;

/// Upper bound on any single length-prefixed field.
pub const MAX_FIELD_LEN: usize = 1 << 20;

/// Upper bound on the number of justification entries in one claim.
pub const MAX_JUSTIFICATION_ENTRIES: usize = 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("unknown message tag {0:#04x}")]
    UnknownTag(u8),

    #[error("unexpected message tag: expected {expected:#04x}, found {found:#04x}")]
    UnexpectedTag { expected: u8, found: u8 },

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    #[error("field length {len} exceeds maximum {max}")]
    FieldTooLong { len: usize, max: usize },

    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    #[error("justification entries may not carry their own justification")]
    NestedJustification,

    #[error("justification entry must be a vote or a level message, found tag {0:#04x}")]
    InvalidJustificationEntry(u8),
}

/// Append-only big-endian writer.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_timestamp(&mut self, ts: Timestamp) {
        self.put_u64(ts.as_millis());
    }

    pub fn put_identity(&mut self, id: &Identity) {
        self.buf.extend_from_slice(id.as_bytes());
    }

    pub fn put_hash(&mut self, hash: &MessageHash) {
        self.buf.extend_from_slice(hash.as_bytes());
    }

    pub fn put_signature(&mut self, sig: &Signature) {
        self.buf.extend_from_slice(sig.as_bytes());
    }

    /// Length-prefixed byte field.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a borrowed byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn peek_u8(&self) -> Result<u8, CodecError> {
        self.buf.get(self.pos).copied().ok_or(CodecError::Truncated {
            needed: 1,
            remaining: 0,
        })
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool, CodecError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidBool(other)),
        }
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    pub fn timestamp(&mut self) -> Result<Timestamp, CodecError> {
        Ok(Timestamp::new(self.u64()?))
    }

    pub fn identity(&mut self) -> Result<Identity, CodecError> {
        Ok(Identity::new(self.array()?))
    }

    pub fn hash(&mut self) -> Result<MessageHash, CodecError> {
        Ok(MessageHash::new(self.array()?))
    }

    pub fn signature(&mut self) -> Result<Signature, CodecError> {
        Ok(Signature(self.array()?))
    }

    /// Length-prefixed byte field.
    pub fn bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.u32()? as usize;
        if len > MAX_FIELD_LEN {
            return Err(CodecError::FieldTooLong {
                len,
                max: MAX_FIELD_LEN,
            });
        }
        Ok(self.take(len)?.to_vec())
    }

    /// Bytes consumed so far, starting at `start`.
    pub fn consumed_since(&self, start: usize) -> &'a [u8] {
        &self.buf[start..self.pos]
    }

    pub fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_big_endian() {
        let mut w = Writer::new();
        w.put_u32(0x0102_0304);
        w.put_u64(5);
        let bytes = w.into_bytes();
        assert_eq!(&bytes[..4], &[1, 2, 3, 4]);
        assert_eq!(&bytes[4..], &[0, 0, 0, 0, 0, 0, 0, 5]);
    }

    #[test]
    fn length_prefixed_roundtrip() {
        let mut w = Writer::new();
        w.put_bytes(b"missing eom");
        w.put_bytes(b"");
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.bytes().unwrap(), b"missing eom");
        assert_eq!(r.bytes().unwrap(), b"");
        assert!(r.finish().is_ok());
    }

    #[test]
    fn truncated_read_reports_sizes() {
        let mut r = Reader::new(&[0, 1]);
        assert_eq!(
            r.u32(),
            Err(CodecError::Truncated {
                needed: 4,
                remaining: 2
            })
        );
    }

    #[test]
    fn oversized_field_rejected() {
        let mut w = Writer::new();
        w.put_u32((MAX_FIELD_LEN + 1) as u32);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert!(matches!(r.bytes(), Err(CodecError::FieldTooLong { .. })));
    }

    #[test]
    fn invalid_bool_rejected() {
        let mut r = Reader::new(&[2]);
        assert_eq!(r.bool(), Err(CodecError::InvalidBool(2)));
    }

    #[test]
    fn trailing_bytes_detected() {
        let mut r = Reader::new(&[1, 2, 3]);
        r.u8().unwrap();
        assert_eq!(r.finish(), Err(CodecError::TrailingBytes(2)));
    }
}
