// Copyright 2020 Joyent, Inc.

//! OP_MSG framing for command documents
//!
//! Connections treat requests and replies as opaque byte buffers. The only
//! thing a connection needs from this module is [`frame_length`] so that it
//! can tell where one reply ends.

use std::convert::TryInto;
use std::sync::atomic::{AtomicI32, Ordering};

use bson::Document;
use thiserror::Error;

pub const OP_MSG: i32 = 2013;
pub const HEADER_LENGTH: usize = 16;
/// The largest message a server will send or accept.
pub const MAX_MESSAGE_SIZE: usize = 48_000_000;

const CHECKSUM_PRESENT: u32 = 1;
const CHECKSUM_LENGTH: usize = 4;
const SECTION_BODY: u8 = 0;
const SECTION_DOCUMENT_SEQUENCE: u8 = 1;

static NEXT_REQUEST_ID: AtomicI32 = AtomicI32::new(1);

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("message length {0} is out of bounds")]
    InvalidLength(i64),
    #[error("message is truncated")]
    Truncated,
    #[error("unsupported opcode {0}")]
    UnsupportedOpCode(i32),
    #[error("unknown section kind {0}")]
    UnknownSection(u8),
    #[error("message has no body section")]
    MissingBody,
    #[error("reply answers request {actual}, expected {expected}")]
    ResponseMismatch { expected: i32, actual: i32 },
    #[error("BSON encoding failed")]
    Encode(#[from] bson::ser::Error),
    #[error("BSON decoding failed")]
    Decode(#[from] bson::de::Error),
}

/// Validate the little-endian length prefix that starts every message and
/// return the total message length, prefix included.
pub fn frame_length(prefix: [u8; 4]) -> Result<usize, ProtocolError> {
    let length = i32::from_le_bytes(prefix);
    if length < HEADER_LENGTH as i32 || length as i64 > MAX_MESSAGE_SIZE as i64
    {
        return Err(ProtocolError::InvalidLength(i64::from(length)));
    }
    Ok(length as usize)
}

fn next_request_id() -> i32 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// One OP_MSG message carrying a single body document.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub request_id: i32,
    pub response_to: i32,
    pub flags: u32,
    pub document: Document,
}

impl Message {
    /// Build a command addressed at `database`.
    pub fn command(database: &str, mut command: Document) -> Self {
        command.insert("$db", database);
        Message {
            request_id: next_request_id(),
            response_to: 0,
            flags: 0,
            document: command,
        }
    }

    /// Build the reply to this message.
    pub fn reply_to(&self, document: Document) -> Self {
        Message {
            request_id: next_request_id(),
            response_to: self.request_id,
            flags: 0,
            document,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut body = Vec::new();
        self.document.to_writer(&mut body)?;

        let length = HEADER_LENGTH + 4 + 1 + body.len();
        if length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::InvalidLength(length as i64));
        }

        let mut buf = Vec::with_capacity(length);
        buf.extend_from_slice(&(length as i32).to_le_bytes());
        buf.extend_from_slice(&self.request_id.to_le_bytes());
        buf.extend_from_slice(&self.response_to.to_le_bytes());
        buf.extend_from_slice(&OP_MSG.to_le_bytes());
        // Checksums are never written.
        buf.extend_from_slice(&(self.flags & !CHECKSUM_PRESENT).to_le_bytes());
        buf.push(SECTION_BODY);
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_LENGTH + 4 {
            return Err(ProtocolError::Truncated);
        }
        let length = frame_length(read_prefix(bytes, 0)?)?;
        if bytes.len() < length {
            return Err(ProtocolError::Truncated);
        }

        let request_id = read_i32(bytes, 4)?;
        let response_to = read_i32(bytes, 8)?;
        let op_code = read_i32(bytes, 12)?;
        if op_code != OP_MSG {
            return Err(ProtocolError::UnsupportedOpCode(op_code));
        }
        let flags = u32::from_le_bytes(read_prefix(bytes, 16)?);

        let mut end = length;
        if flags & CHECKSUM_PRESENT != 0 {
            end = end
                .checked_sub(CHECKSUM_LENGTH)
                .ok_or(ProtocolError::Truncated)?;
        }

        let mut document = None;
        let mut pos = HEADER_LENGTH + 4;
        while pos < end {
            let kind = bytes[pos];
            pos += 1;
            let size = read_i32(bytes, pos)?;
            if size < 5 || pos + size as usize > end {
                return Err(ProtocolError::InvalidLength(i64::from(size)));
            }
            match kind {
                SECTION_BODY => {
                    let mut section = &bytes[pos..pos + size as usize];
                    document = Some(Document::from_reader(&mut section)?);
                }
                // Document sequences only appear in bulk write requests.
                SECTION_DOCUMENT_SEQUENCE => {}
                other => return Err(ProtocolError::UnknownSection(other)),
            }
            pos += size as usize;
        }

        Ok(Message {
            request_id,
            response_to,
            flags,
            document: document.ok_or(ProtocolError::MissingBody)?,
        })
    }
}

fn read_prefix(bytes: &[u8], at: usize) -> Result<[u8; 4], ProtocolError> {
    bytes
        .get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .ok_or(ProtocolError::Truncated)
}

fn read_i32(bytes: &[u8], at: usize) -> Result<i32, ProtocolError> {
    read_prefix(bytes, at).map(i32::from_le_bytes)
}
