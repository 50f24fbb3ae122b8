//! # Basalt Canonical Codec
//!
//! A symmetric stream codec used for every value that is hashed, signed,
//! persisted or framed on the wire. Each domain type has exactly one
//! canonical encoding, and `decode(encode(x)) == x` is mandatory for all of
//! them.
//!
//! Encoding rules:
//! - fixed-width integers are little-endian
//! - booleans are a single byte, `0` or `1`
//! - byte sequences carry a `u32` little-endian length prefix
//! - `Option<T>` and enum variants carry a single-byte discriminator
//!
//! ## Example
//!
//! ```rust
//! use basalt_codec::{to_bytes, from_bytes};
//!
//! let value: u64 = 42;
//! let bytes = to_bytes(&value);
//! assert_eq!(from_bytes::<u64>(&bytes).unwrap(), 42);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while decoding a canonical byte stream.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// The stream ended before the requested number of bytes was available.
    #[error("unexpected end of input: wanted {wanted} more bytes, {available} available")]
    UnexpectedEof {
        /// Bytes the decoder tried to read.
        wanted: usize,
        /// Bytes actually left in the stream.
        available: usize,
    },

    /// A variant discriminator byte did not match any known variant.
    #[error("invalid discriminator {tag:#04x} for {type_name}")]
    InvalidTag {
        /// The offending byte.
        tag: u8,
        /// Type being decoded.
        type_name: &'static str,
    },

    /// A decoded value violated a constraint of its type.
    #[error("invalid value for {type_name}: {reason}")]
    InvalidValue {
        /// Type being decoded.
        type_name: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// A top-level decode left unconsumed bytes behind.
    #[error("{remaining} trailing bytes after decoding")]
    TrailingBytes {
        /// Bytes left over.
        remaining: usize,
    },
}

/// Types with a canonical byte encoding.
pub trait Encode {
    /// Appends the canonical encoding of `self` to the encoder.
    fn encode(&self, enc: &mut Encoder);
}

/// Types decodable from their canonical byte encoding.
pub trait Decode: Sized {
    /// Reads one value from the decoder, advancing its position.
    fn decode(dec: &mut Decoder<'_>) -> Result<Self>;
}

/// Encodes a value into a fresh byte vector.
pub fn to_bytes<T: Encode + ?Sized>(value: &T) -> Vec<u8> {
    let mut enc = Encoder::new();
    value.encode(&mut enc);
    enc.into_bytes()
}

/// Decodes a value from a byte slice, rejecting trailing garbage.
pub fn from_bytes<T: Decode>(bytes: &[u8]) -> Result<T> {
    let mut dec = Decoder::new(bytes);
    let value = T::decode(&mut dec)?;
    dec.finish()?;
    Ok(value)
}

/// An append-only byte sink implementing the canonical encoding rules.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    /// Creates an empty encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an encoder with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Consumes the encoder and returns the accumulated bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Writes a `u16` little-endian.
    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a `u32` little-endian.
    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a `u64` little-endian.
    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a boolean as one byte.
    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    /// Writes a length-prefixed byte sequence.
    pub fn write_bytes(&mut self, v: &[u8]) {
        self.write_u32(v.len() as u32);
        self.buf.extend_from_slice(v);
    }

    /// Writes raw bytes with no length prefix. Only for fixed-width fields
    /// whose length is part of the type.
    pub fn write_raw(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// Encodes a value in place.
    pub fn write<T: Encode + ?Sized>(&mut self, v: &T) {
        v.encode(self);
    }
}

/// A cursor over a byte slice implementing the canonical decoding rules.
#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether the whole input has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Errors unless the whole input has been consumed.
    pub fn finish(&self) -> Result<()> {
        if self.is_exhausted() {
            Ok(())
        } else {
            Err(Error::TrailingBytes {
                remaining: self.remaining(),
            })
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::UnexpectedEof {
                wanted: n,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a `u16` little-endian.
    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Reads a `u32` little-endian.
    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a `u64` little-endian.
    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Reads a boolean byte, rejecting anything but `0` and `1`.
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(Error::InvalidTag {
                tag,
                type_name: "bool",
            }),
        }
    }

    /// Reads a length-prefixed byte sequence.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Reads `n` raw bytes with no length prefix.
    pub fn read_raw(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Decodes a value in place.
    pub fn read<T: Decode>(&mut self) -> Result<T> {
        T::decode(self)
    }
}

impl Encode for u8 {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_u8(*self);
    }
}

impl Decode for u8 {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.read_u8()
    }
}

impl Encode for u16 {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_u16(*self);
    }
}

impl Decode for u16 {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.read_u16()
    }
}

impl Encode for u32 {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_u32(*self);
    }
}

impl Decode for u32 {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.read_u32()
    }
}

impl Encode for u64 {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_u64(*self);
    }
}

impl Decode for u64 {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.read_u64()
    }
}

impl Encode for bool {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_bool(*self);
    }
}

impl Decode for bool {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.read_bool()
    }
}

impl Encode for [u8] {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_bytes(self);
    }
}

impl Encode for Vec<u8> {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_bytes(self);
    }
}

impl Decode for Vec<u8> {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        dec.read_bytes()
    }
}

impl Encode for String {
    fn encode(&self, enc: &mut Encoder) {
        enc.write_bytes(self.as_bytes());
    }
}

impl Decode for String {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let bytes = dec.read_bytes()?;
        String::from_utf8(bytes).map_err(|e| Error::InvalidValue {
            type_name: "String",
            reason: e.to_string(),
        })
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, enc: &mut Encoder) {
        match self {
            None => enc.write_u8(0),
            Some(v) => {
                enc.write_u8(1);
                v.encode(enc);
            }
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        match dec.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(dec)?)),
            tag => Err(Error::InvalidTag {
                tag,
                type_name: "Option",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_little_endian() {
        assert_eq!(to_bytes(&0x1122u16), vec![0x22, 0x11]);
        assert_eq!(to_bytes(&0x11223344u32), vec![0x44, 0x33, 0x22, 0x11]);
        assert_eq!(
            to_bytes(&0x0102030405060708u64),
            vec![0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]
        );
    }

    #[test]
    fn bytes_round_trip() {
        let data = vec![1u8, 2, 3, 4, 5];
        let encoded = to_bytes(&data);
        assert_eq!(encoded[..4], [5, 0, 0, 0]);
        assert_eq!(from_bytes::<Vec<u8>>(&encoded).unwrap(), data);
    }

    #[test]
    fn option_round_trip() {
        let some: Option<u64> = Some(7);
        let none: Option<u64> = None;
        assert_eq!(from_bytes::<Option<u64>>(&to_bytes(&some)).unwrap(), some);
        assert_eq!(from_bytes::<Option<u64>>(&to_bytes(&none)).unwrap(), none);
    }

    #[test]
    fn truncated_input_is_rejected() {
        let encoded = to_bytes(&0x11223344u32);
        let err = from_bytes::<u32>(&encoded[..3]).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEof { .. }));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut encoded = to_bytes(&7u8);
        encoded.push(0xff);
        let err = from_bytes::<u8>(&encoded).unwrap_err();
        assert_eq!(err, Error::TrailingBytes { remaining: 1 });
    }

    #[test]
    fn bool_rejects_junk() {
        let err = from_bytes::<bool>(&[2]).unwrap_err();
        assert!(matches!(err, Error::InvalidTag { tag: 2, .. }));
    }

    #[test]
    fn string_must_be_utf8() {
        let mut enc = Encoder::new();
        enc.write_bytes(&[0xff, 0xfe]);
        let err = from_bytes::<String>(&enc.into_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
    }
}
