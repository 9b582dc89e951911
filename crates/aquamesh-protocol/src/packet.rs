//! Packets: an owned body buffer plus an explicit stack of header records
//!
//! Headers are pushed as a packet moves down through the protocol layers and
//! popped in reverse order on the way up. On the wire the most recently pushed
//! header comes first, followed by the earlier ones and finally the payload.

use std::fmt;

use crate::codec::Header;
use crate::error::{ProtocolError, Result};
use crate::header::{AnyHeader, HeaderKind};

/// Maximum payload carried by a single packet
pub const MAX_PAYLOAD_SIZE: usize = 4096;

/// A serialized header together with its kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    kind: HeaderKind,
    bytes: Vec<u8>,
}

impl HeaderRecord {
    pub fn kind(&self) -> HeaderKind {
        self.kind
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet {
    /// Header stack, top of stack last
    headers: Vec<HeaderRecord>,

    /// Unparsed bytes: payload, or a whole received frame before headers are popped
    body: Vec<u8>,
}

impl Packet {
    /// Create a packet carrying `payload`
    pub fn new(payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Packet {
            headers: Vec::new(),
            body: payload,
        })
    }

    /// Packet with no payload, used for control messages
    pub fn empty() -> Self {
        Packet::default()
    }

    /// Wrap received wire bytes; headers are parsed lazily by [`Packet::pop_header`]
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(ProtocolError::EmptyPacket);
        }

        Ok(Packet {
            headers: Vec::new(),
            body: bytes.to_vec(),
        })
    }

    /// Push a header on top of the stack
    pub fn push_header<H: Header>(&mut self, header: &H) {
        self.headers.push(HeaderRecord {
            kind: H::KIND,
            bytes: header.to_bytes(),
        });
    }

    /// Remove and decode the top header
    pub fn pop_header<H: Header>(&mut self) -> Result<H> {
        match self.headers.last() {
            Some(record) => {
                if record.kind != H::KIND {
                    return Err(ProtocolError::HeaderMismatch {
                        expected: H::KIND,
                        found: record.kind,
                    });
                }
                let header = H::from_bytes(&record.bytes)?;
                self.headers.pop();
                Ok(header)
            }
            None => {
                let header = self.peek_wire::<H>()?;
                self.body.drain(..H::SERIALIZED_SIZE);
                Ok(header)
            }
        }
    }

    /// Decode the top header without removing it
    pub fn peek_header<H: Header>(&self) -> Result<H> {
        match self.headers.last() {
            Some(record) if record.kind != H::KIND => Err(ProtocolError::HeaderMismatch {
                expected: H::KIND,
                found: record.kind,
            }),
            Some(record) => H::from_bytes(&record.bytes),
            None => self.peek_wire::<H>(),
        }
    }

    fn peek_wire<H: Header>(&self) -> Result<H> {
        if self.body.is_empty() {
            return Err(ProtocolError::EmptyPacket);
        }
        H::from_bytes(&self.body)
    }

    /// Decode every pushed header, top first
    pub fn headers(&self) -> Result<Vec<AnyHeader>> {
        self.headers
            .iter()
            .rev()
            .map(|record| AnyHeader::decode(record.kind, &record.bytes))
            .collect()
    }

    pub fn header_records(&self) -> &[HeaderRecord] {
        &self.headers
    }

    /// Bytes below the header stack
    pub fn payload(&self) -> &[u8] {
        &self.body
    }

    /// Total size on the wire
    pub fn len(&self) -> usize {
        self.headers.iter().map(|r| r.bytes.len()).sum::<usize>() + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize headers (top first) followed by the body
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for record in self.headers.iter().rev() {
            out.extend_from_slice(&record.bytes);
        }
        out.extend_from_slice(&self.body);
        out
    }

    /// Hex dump of the wire form
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_wire())
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet({} headers, {} bytes)",
            self.headers.len(),
            self.len()
        )
    }
}
