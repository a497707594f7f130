//! Field-level encoding shared by every message kind: big-endian `u32`s, length-prefixed strings
//! and blobs, single-byte booleans, and identifiers as `(id hex, hostname)` string pairs.

use crate::chord::types::{Identifier, RingId};
use crate::error::MessageError;
use bytes::{Buf, BufMut, BytesMut};

pub(crate) fn put_string(buf: &mut BytesMut, value: &str) {
    put_blob(buf, value.as_bytes());
}

pub(crate) fn put_blob(buf: &mut BytesMut, value: &[u8]) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value);
}

pub(crate) fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(value as u8);
}

pub(crate) fn put_ring_id(buf: &mut BytesMut, id: RingId) {
    put_string(buf, &id.to_hex());
}

pub(crate) fn put_identifier(buf: &mut BytesMut, peer: &Identifier) {
    put_ring_id(buf, peer.id);
    put_string(buf, &peer.hostname);
}

/// Cursor over one encoded message.
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn need(&self, len: usize) -> Result<(), MessageError> {
        if self.buf.remaining() < len {
            return Err(MessageError::Truncated {
                needed: len - self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub(crate) fn u32(&mut self) -> Result<u32, MessageError> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub(crate) fn bool(&mut self) -> Result<bool, MessageError> {
        self.need(1)?;
        match self.buf.get_u8() {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(MessageError::InvalidFormat(format!(
                "boolean byte {:#04x}",
                other
            ))),
        }
    }

    pub(crate) fn blob(&mut self) -> Result<Vec<u8>, MessageError> {
        let len = self.u32()? as usize;
        self.need(len)?;
        let value = self.buf[..len].to_vec();
        self.buf.advance(len);
        Ok(value)
    }

    pub(crate) fn string(&mut self) -> Result<String, MessageError> {
        String::from_utf8(self.blob()?)
            .map_err(|e| MessageError::InvalidFormat(format!("string is not UTF-8: {}", e)))
    }

    pub(crate) fn ring_id(&mut self) -> Result<RingId, MessageError> {
        let hex = self.string()?;
        RingId::from_hex(&hex).map_err(|e| MessageError::InvalidFormat(e.to_string()))
    }

    pub(crate) fn identifier(&mut self) -> Result<Identifier, MessageError> {
        let id = self.ring_id()?;
        let hostname = self.string()?;
        Ok(Identifier::new(hostname, id))
    }

    /// Fails when bytes are left over after the last field.
    pub(crate) fn finish(self) -> Result<(), MessageError> {
        if self.buf.has_remaining() {
            return Err(MessageError::InvalidFormat(format!(
                "{} trailing bytes",
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}
