//! Fixed-layout binary codec shared by every header variant
//!
//! All multi-byte integers are big-endian. Floating point fields are written
//! as fixed-point u32 values (see [`encode_fixed`]). Each header declares its
//! exact serialized size; writing or reading a different number of bytes is a
//! bug in the header implementation and trips a debug assertion.

use crate::error::{ProtocolError, Result};
use crate::header::HeaderKind;
use crate::types::{decode_fixed, encode_fixed, NodeAddress, Position};

/// A fixed-size header that can be written to and read from the wire
pub trait Header: Sized {
    /// Which header this is (used for stack checks and error reporting)
    const KIND: HeaderKind;

    /// Exact number of bytes written by [`Header::encode`]
    const SERIALIZED_SIZE: usize;

    /// Write all fields in wire order
    fn encode(&self, writer: &mut Writer);

    /// Read all fields in wire order
    fn decode(reader: &mut Reader<'_>) -> Result<Self>;

    /// Serialize to a freshly allocated buffer
    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::with_capacity(Self::SERIALIZED_SIZE);
        self.encode(&mut writer);
        let bytes = writer.into_bytes();

        debug_assert_eq!(
            bytes.len(),
            Self::SERIALIZED_SIZE,
            "{} header size mismatch",
            Self::KIND
        );

        bytes
    }

    /// Deserialize from the start of `bytes`; trailing bytes are ignored
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SERIALIZED_SIZE {
            return Err(ProtocolError::Truncated {
                header: Self::KIND,
                expected: Self::SERIALIZED_SIZE,
                actual: bytes.len(),
            });
        }

        let mut reader = Reader::new(Self::KIND, &bytes[..Self::SERIALIZED_SIZE]);
        let header = Self::decode(&mut reader)?;

        debug_assert_eq!(
            reader.position(),
            Self::SERIALIZED_SIZE,
            "{} header size mismatch",
            Self::KIND
        );

        Ok(header)
    }

    /// Serialized size of this header
    fn serialized_size(&self) -> usize {
        Self::SERIALIZED_SIZE
    }
}

/// Big-endian byte writer
#[derive(Debug, Default)]
pub struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    pub fn with_capacity(capacity: usize) -> Self {
        Writer {
            bytes: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_address(&mut self, address: NodeAddress) {
        self.put_u16(address.as_u16());
    }

    /// Write a real value as fixed-point (x1000, rounded half up)
    pub fn put_fixed(&mut self, value: f64) {
        self.put_u32(encode_fixed(value));
    }

    pub fn put_position(&mut self, position: &Position) {
        self.put_fixed(position.x);
        self.put_fixed(position.y);
        self.put_fixed(position.z);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Big-endian byte reader over a borrowed slice
#[derive(Debug)]
pub struct Reader<'a> {
    kind: HeaderKind,
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(kind: HeaderKind, bytes: &'a [u8]) -> Self {
        Reader {
            kind,
            bytes,
            offset: 0,
        }
    }

    /// Number of bytes consumed so far
    pub fn position(&self) -> usize {
        self.offset
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.offset + N;
        if end > self.bytes.len() {
            return Err(ProtocolError::Truncated {
                header: self.kind,
                expected: end,
                actual: self.bytes.len(),
            });
        }

        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.offset..end]);
        self.offset = end;
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take::<2>()?))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take::<4>()?))
    }

    pub fn get_address(&mut self) -> Result<NodeAddress> {
        Ok(NodeAddress::new(self.get_u16()?))
    }

    pub fn get_fixed(&mut self) -> Result<f64> {
        Ok(decode_fixed(self.get_u32()?))
    }

    pub fn get_position(&mut self) -> Result<Position> {
        let x = self.get_fixed()?;
        let y = self.get_fixed()?;
        let z = self.get_fixed()?;
        Ok(Position { x, y, z })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_is_big_endian() {
        let mut writer = Writer::default();
        writer.put_u16(0x0102);
        writer.put_u32(0x0304_0506);
        writer.put_address(NodeAddress::new(0x0708));
        assert_eq!(
            writer.into_bytes(),
            vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
        );
    }

    #[test]
    fn test_fixed_point_on_the_wire() {
        let mut writer = Writer::default();
        writer.put_fixed(1.5);
        assert_eq!(writer.into_bytes(), 1500u32.to_be_bytes().to_vec());
    }

    #[test]
    fn test_position_coordinates_must_be_non_negative() {
        let mut writer = Writer::default();
        writer.put_position(&Position::new(12.5, -3.25, 0.0));
        let bytes = writer.into_bytes();

        let mut reader = Reader::new(HeaderKind::DepthRouting, &bytes);
        let decoded = reader.get_position().unwrap();
        assert_eq!(decoded.x, 12.5);
        assert_eq!(decoded.y, 0.0);
        assert_eq!(decoded.z, 0.0);
    }

    #[test]
    fn test_reader_reports_truncation() {
        let bytes = [0x00, 0x01, 0x02];
        let mut reader = Reader::new(HeaderKind::Common, &bytes);
        assert_eq!(reader.get_u16().unwrap(), 1);
        let err = reader.get_u32().unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Truncated {
                header: HeaderKind::Common,
                expected: 6,
                actual: 3,
            }
        );
    }

    #[test]
    fn test_reader_position_tracks_consumed_bytes() {
        let bytes = [0u8; 16];
        let mut reader = Reader::new(HeaderKind::DepthRouting, &bytes);
        reader.get_position().unwrap();
        reader.get_u8().unwrap();
        assert_eq!(reader.position(), 13);
    }
}
