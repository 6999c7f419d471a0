//! Byte-level codec
//!
//! Little-endian fixed-width primitives, snapshot stream packing and the
//! optional whole-body zlib compression. Compression never changes decoded
//! content, only storage size.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use super::snapshot::{RECORD_SIZE, Snapshot};
use crate::error::CodecError;

/// Append-only little-endian writer
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Length-prefixed (u16) UTF-8 string; longer than 65535 bytes is an error
    pub fn str(&mut self, s: &str) -> Result<(), CodecError> {
        let len = u16::try_from(s.len()).map_err(|_| CodecError::TooLong {
            what: "string length",
            len: s.len(),
            max: u16::MAX as usize,
        })?;
        self.u16(len);
        self.buf.extend_from_slice(s.as_bytes());
        Ok(())
    }

    /// `n` as a u32 count or length field
    pub fn len_u32(&mut self, what: &'static str, n: usize) -> Result<(), CodecError> {
        let v = u32::try_from(n).map_err(|_| CodecError::TooLong {
            what,
            len: n,
            max: u32::MAX as usize,
        })?;
        self.u32(v);
        Ok(())
    }

    pub fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked little-endian reader over a byte slice
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::TooShort {
                needed: n,
                got: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.u8()? != 0)
    }

    pub fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    /// Length-prefixed UTF-8 string
    pub fn str(&mut self) -> Result<String, CodecError> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }
}

/// Pack snapshots back to back in tick order
pub fn encode_snapshots(snapshots: &[Snapshot]) -> Vec<u8> {
    let mut w = ByteWriter::with_capacity(snapshots.len() * RECORD_SIZE);
    for s in snapshots {
        s.write(&mut w);
    }
    w.into_inner()
}

/// Unpack a run of fixed-size snapshot records
///
/// A trailing partial record is an error, never silently dropped.
pub fn decode_snapshots(bytes: &[u8]) -> Result<Vec<Snapshot>, CodecError> {
    let tail = bytes.len() % RECORD_SIZE;
    if tail != 0 {
        return Err(CodecError::TooShort {
            needed: RECORD_SIZE,
            got: tail,
        });
    }
    bytes.chunks_exact(RECORD_SIZE).map(Snapshot::decode).collect()
}

/// zlib-compress a whole replay body
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::best());
    encoder.write_all(data).map_err(CodecError::Compress)?;
    encoder.finish().map_err(CodecError::Compress)
}

/// Expand a zlib body that must decompress to exactly `expected_len` bytes
pub fn decompress(data: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(expected_len);
    // Read at most one byte past the declared size to detect overlong streams
    ZlibDecoder::new(data)
        .take(expected_len as u64 + 1)
        .read_to_end(&mut out)
        .map_err(CodecError::Decompress)?;
    if out.len() != expected_len {
        return Err(CodecError::LengthMismatch {
            expected: expected_len,
            got: out.len(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[test]
    fn test_reader_rejects_short_input() {
        let mut r = ByteReader::new(&[1, 2, 3]);
        assert!(matches!(r.u32(), Err(CodecError::TooShort { needed: 4, got: 3 })));
        // Failed read does not consume
        assert_eq!(r.u8().ok(), Some(1));
    }

    #[test]
    fn test_string_prefix() {
        let mut w = ByteWriter::new();
        w.str("alice").unwrap();
        w.u32(0xDEAD_BEEF);
        let bytes = w.into_inner();
        assert_eq!(bytes.len(), 2 + 5 + 4);
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.str().ok().as_deref(), Some("alice"));
        assert_eq!(r.u32().ok(), Some(0xDEAD_BEEF));
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_oversized_string_rejected_whole() {
        let mut w = ByteWriter::new();
        let long = "é".repeat(40_000);
        assert!(matches!(
            w.str(&long),
            Err(CodecError::TooLong { len: 80_000, max: 65_535, .. })
        ));
        assert!(w.is_empty());

        let mut r = ByteReader::new(&[2, 0, 0xC3, 0x28]);
        assert!(matches!(r.str(), Err(CodecError::InvalidUtf8)));
    }

    #[test]
    fn test_compression_preserves_snapshots() {
        let snapshots: Vec<Snapshot> = (0..200)
            .map(|i| Snapshot::at(Vec2::new(i as f32 * 0.05, 1.0)))
            .collect();
        let raw = encode_snapshots(&snapshots);
        let packed = compress(&raw).unwrap();
        assert!(packed.len() < raw.len());
        let unpacked = decompress(&packed, raw.len()).unwrap();
        assert_eq!(decode_snapshots(&unpacked).unwrap(), snapshots);
    }

    #[test]
    fn test_corrupt_stream_fails() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
        let packed = compress(&data).unwrap();
        let broken = &packed[..packed.len() / 2];
        assert!(decompress(broken, 1000).is_err());
        assert!(matches!(
            decompress(&packed, 999),
            Err(CodecError::LengthMismatch { expected: 999, .. })
        ));
    }

    #[test]
    fn test_partial_record_rejected() {
        let raw = encode_snapshots(&[Snapshot::default(), Snapshot::default()]);
        assert!(matches!(
            decode_snapshots(&raw[..raw.len() - 1]),
            Err(CodecError::TooShort { .. })
        ));
    }
}
