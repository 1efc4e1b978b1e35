// STDB - State Tree Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Binary trace format
//!
//! A trace is a header followed by a flat sequence of records:
//!
//! ```text
//! header : "STTR" | u16 version | u64 cycles/s | str platform | str app | str build config
//! record : u16 uid | u32 payload length | payload
//! ```
//!
//! Record uid `0` is an event declaration binding a uid to a `(logger, event)`
//! name pair. Every other record refers to a previously declared uid, so a
//! consumer can route records by name without knowing the uids in advance.
//!
//! All integers are little-endian. Strings are `u16` length-prefixed UTF-8,
//! arrays are `u16` count-prefixed.
//!
//! [`RecordReader`] decodes incrementally: it accepts arbitrary chunks and
//! keeps incomplete tails until more bytes arrive, which is what reading a
//! trace that is still being written requires.

mod schema;

pub use schema::*;

use std::{collections::HashMap, io::Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::types::SessionMetadata;

/// Magic bytes at the start of every trace
pub const MAGIC: &[u8; 4] = b"STTR";
/// Current format version
pub const VERSION: u16 = 1;
/// Record uid reserved for event declarations
pub const DECLARATION_UID: u16 = 0;

const RECORD_HEADER_LEN: usize = 2 + 4;

/// Errors produced while encoding or decoding traces
#[derive(Debug, Error)]
pub enum WireError {
    /// The stream does not start with [`MAGIC`]
    #[error("invalid trace magic")]
    BadMagic,
    /// The stream was written with an unknown format version
    #[error("unsupported trace version {0}")]
    UnsupportedVersion(u16),
    /// Not enough bytes to decode the value
    #[error("truncated data: {needed} more bytes needed")]
    Truncated {
        /// Number of missing bytes
        needed: usize,
    },
    /// A string was not valid UTF-8
    #[error("invalid utf-8 string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    /// An enum field had an unknown discriminant
    #[error("invalid {field} discriminant {value}")]
    InvalidDiscriminant {
        /// Field being decoded
        field: &'static str,
        /// Raw value
        value: u8,
    },
    /// Too many event kinds were declared
    #[error("event uid space exhausted")]
    UidExhausted,
    /// A record is timestamped before the last record of the same timeline
    #[error("record at {time}s precedes the previous record at {last}s")]
    OutOfOrder {
        /// Record time in seconds
        time: f64,
        /// Time of the last recorded entry
        last: f64,
    },
    /// Underlying I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Trace header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceHeader {
    /// Frequency of the cycle counter used for record timestamps
    pub cycles_per_second: u64,
    /// Session metadata
    pub metadata: SessionMetadata,
}

impl Default for TraceHeader {
    fn default() -> Self {
        Self { cycles_per_second: 1_000_000, metadata: SessionMetadata::default() }
    }
}

impl TraceHeader {
    /// Convert a cycle timestamp to seconds
    pub fn cycle_to_seconds(&self, cycle: u64) -> f64 {
        if self.cycles_per_second == 0 {
            return 0.0;
        }
        cycle as f64 / self.cycles_per_second as f64
    }

    /// Append the encoded header to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(MAGIC);
        buf.put_u16_le(VERSION);
        buf.put_u64_le(self.cycles_per_second);
        let mut payload = PayloadWriter::new();
        payload
            .string(&self.metadata.platform)
            .string(&self.metadata.app_name)
            .string(&self.metadata.build_config);
        buf.put_slice(&payload.finish());
    }

    /// Decode a header from the start of `data`, returning it with the number of bytes used
    pub fn decode(data: &[u8]) -> Result<(Self, usize), WireError> {
        let mut reader = PayloadReader::new(Bytes::copy_from_slice(data));
        let magic = reader.bytes(MAGIC.len())?;
        if magic.as_ref() != MAGIC {
            return Err(WireError::BadMagic);
        }
        let version = reader.u16()?;
        if version != VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }
        let cycles_per_second = reader.u64()?;
        let metadata = SessionMetadata {
            platform: reader.string()?,
            app_name: reader.string()?,
            build_config: reader.string()?,
        };
        let used = data.len() - reader.remaining();
        Ok((Self { cycles_per_second, metadata }, used))
    }
}

/// Binds a record uid to an event name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDeclaration {
    /// Uid used by records of this event
    pub uid: u16,
    /// Logger (event group) name
    pub logger: String,
    /// Event name
    pub event: String,
}

/// One framed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Declaration of a new event kind
    Declaration(EventDeclaration),
    /// An event record
    Event {
        /// Declared uid
        uid: u16,
        /// Raw payload
        payload: Bytes,
    },
}

/// Incremental record decoder
#[derive(Debug, Default)]
pub struct RecordReader {
    buf: BytesMut,
    header: Option<TraceHeader>,
}

impl RecordReader {
    /// Create an empty reader
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Header, once enough bytes have been fed to decode it
    pub fn header(&self) -> Option<&TraceHeader> {
        self.header.as_ref()
    }

    /// Number of buffered bytes not yet consumed
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete record.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Errors other than
    /// truncation are fatal for the stream (bad magic or version); a record
    /// whose declaration payload is malformed is returned as an error after
    /// being consumed, so decoding can continue past it.
    pub fn next_record(&mut self) -> Result<Option<Record>, WireError> {
        if self.header.is_none() {
            match TraceHeader::decode(&self.buf) {
                Ok((header, used)) => {
                    self.buf.advance(used);
                    self.header = Some(header);
                }
                Err(WireError::Truncated { .. }) => return Ok(None),
                Err(e) => return Err(e),
            }
        }

        if self.buf.len() < RECORD_HEADER_LEN {
            return Ok(None);
        }
        let mut peek = &self.buf[..RECORD_HEADER_LEN];
        let uid = peek.get_u16_le();
        let len = peek.get_u32_le() as usize;
        if self.buf.len() < RECORD_HEADER_LEN + len {
            return Ok(None);
        }

        self.buf.advance(RECORD_HEADER_LEN);
        let payload = self.buf.split_to(len).freeze();

        if uid == DECLARATION_UID {
            let mut reader = PayloadReader::new(payload);
            let declaration = EventDeclaration {
                uid: reader.u16()?,
                logger: reader.string()?,
                event: reader.string()?,
            };
            Ok(Some(Record::Declaration(declaration)))
        } else {
            Ok(Some(Record::Event { uid, payload }))
        }
    }
}

/// Cursor over a record payload
#[derive(Debug, Clone)]
pub struct PayloadReader {
    data: Bytes,
}

impl PayloadReader {
    /// Wrap a payload
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.data.remaining()
    }

    fn ensure(&self, size: usize) -> Result<(), WireError> {
        if self.data.remaining() < size {
            Err(WireError::Truncated { needed: size - self.data.remaining() })
        } else {
            Ok(())
        }
    }

    /// Read raw bytes
    pub fn bytes(&mut self, len: usize) -> Result<Bytes, WireError> {
        self.ensure(len)?;
        Ok(self.data.split_to(len))
    }

    /// Read a `u8`
    pub fn u8(&mut self) -> Result<u8, WireError> {
        self.ensure(1)?;
        Ok(self.data.get_u8())
    }

    /// Read a `u16`
    pub fn u16(&mut self) -> Result<u16, WireError> {
        self.ensure(2)?;
        Ok(self.data.get_u16_le())
    }

    /// Read a `u32`
    pub fn u32(&mut self) -> Result<u32, WireError> {
        self.ensure(4)?;
        Ok(self.data.get_u32_le())
    }

    /// Read a `u64`
    pub fn u64(&mut self) -> Result<u64, WireError> {
        self.ensure(8)?;
        Ok(self.data.get_u64_le())
    }

    /// Read an `i32`
    pub fn i32(&mut self) -> Result<i32, WireError> {
        self.ensure(4)?;
        Ok(self.data.get_i32_le())
    }

    /// Read an `f32`
    pub fn f32(&mut self) -> Result<f32, WireError> {
        self.ensure(4)?;
        Ok(self.data.get_f32_le())
    }

    /// Read a boolean stored as `u8`
    pub fn bool(&mut self) -> Result<bool, WireError> {
        Ok(self.u8()? != 0)
    }

    /// Read a length-prefixed string
    pub fn string(&mut self) -> Result<String, WireError> {
        let len = self.u16()? as usize;
        let raw = self.bytes(len)?;
        Ok(String::from_utf8(raw.to_vec())?)
    }

    /// Read a count-prefixed array of `u16`
    pub fn u16_array(&mut self) -> Result<Vec<u16>, WireError> {
        let count = self.u16()? as usize;
        self.ensure(count * 2)?;
        Ok((0..count).map(|_| self.data.get_u16_le()).collect())
    }
}

/// Builder for record payloads
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: BytesMut,
}

impl PayloadWriter {
    /// Create an empty payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a `u8`
    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    /// Write a `u16`
    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16_le(value);
        self
    }

    /// Write a `u32`
    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    /// Write a `u64`
    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64_le(value);
        self
    }

    /// Write an `i32`
    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32_le(value);
        self
    }

    /// Write an `f32`
    pub fn f32(&mut self, value: f32) -> &mut Self {
        self.buf.put_f32_le(value);
        self
    }

    /// Write a boolean as `u8`
    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.u8(value as u8)
    }

    /// Write a length-prefixed string, truncated to the longest prefix that fits
    pub fn string(&mut self, value: &str) -> &mut Self {
        let mut end = value.len().min(u16::MAX as usize);
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        self.buf.put_u16_le(end as u16);
        self.buf.put_slice(&value.as_bytes()[..end]);
        self
    }

    /// Write a count-prefixed array of `u16`, truncated to `u16::MAX` items
    pub fn u16_array(&mut self, values: &[u16]) -> &mut Self {
        let values = &values[..values.len().min(u16::MAX as usize)];
        self.buf.put_u16_le(values.len() as u16);
        for value in values {
            self.buf.put_u16_le(*value);
        }
        self
    }

    /// Finish the payload
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Writes a trace: header, lazily declared events and records.
#[derive(Debug)]
pub struct TraceWriter<W: Write> {
    out: W,
    declared: HashMap<(String, String), u16>,
    next_uid: u16,
}

impl<W: Write> TraceWriter<W> {
    /// Write the header and return a writer for records
    pub fn new(mut out: W, header: &TraceHeader) -> Result<Self, WireError> {
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        out.write_all(&buf)?;
        Ok(Self { out, declared: HashMap::new(), next_uid: DECLARATION_UID + 1 })
    }

    /// Write a typed record
    pub fn write<R: WireRecord>(&mut self, record: &R) -> Result<(), WireError> {
        let mut payload = PayloadWriter::new();
        record.encode(&mut payload);
        self.write_raw(R::LOGGER, R::EVENT, &payload.finish())
    }

    /// Write a raw payload for `(logger, event)`, declaring the event on first use
    pub fn write_raw(&mut self, logger: &str, event: &str, payload: &[u8]) -> Result<(), WireError> {
        let uid = self.declare(logger, event)?;
        self.write_frame(uid, payload)
    }

    fn declare(&mut self, logger: &str, event: &str) -> Result<u16, WireError> {
        let key = (logger.to_string(), event.to_string());
        if let Some(uid) = self.declared.get(&key) {
            return Ok(*uid);
        }

        let uid = self.next_uid;
        self.next_uid = uid.checked_add(1).ok_or(WireError::UidExhausted)?;

        let mut payload = PayloadWriter::new();
        payload.u16(uid).string(logger).string(event);
        self.write_frame(DECLARATION_UID, &payload.finish())?;
        self.declared.insert(key, uid);
        Ok(uid)
    }

    fn write_frame(&mut self, uid: u16, payload: &[u8]) -> Result<(), WireError> {
        let mut buf = BytesMut::with_capacity(RECORD_HEADER_LEN + payload.len());
        buf.put_u16_le(uid);
        buf.put_u32_le(payload.len() as u32);
        buf.put_slice(payload);
        self.out.write_all(&buf)?;
        Ok(())
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) -> Result<(), WireError> {
        self.out.flush()?;
        Ok(())
    }

    /// Mutable access to the underlying writer
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    /// Get the underlying writer back
    pub fn into_inner(self) -> W {
        self.out
    }
}
