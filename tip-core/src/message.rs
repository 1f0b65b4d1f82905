// Messages exchanged between the coordinator and the workers
//
// Wire format: [tag: u8][fields...], integers as varints, strings and
// collections length-prefixed. Decoding never needs outside type information.

use crate::hit_index::ReadHitIndex;
use crate::phase::Phase;
use std::io::{self, Cursor, Read};
use tip_common::varint::{put_str, put_varint, read_string, read_varint};
use tip_common::{ErrorKind, Result, TipError};

const TAG_START: u8 = 1;
const TAG_TRIGGER: u8 = 2;
const TAG_ACK: u8 = 3;
const TAG_PARTIAL_INDEX: u8 = 4;
const TAG_PARTIAL_LINES: u8 = 5;
const TAG_FAILURE: u8 = 6;
const TAG_ABORT: u8 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Coordinator -> workers: start `phase` over `total` records
    Start { phase: Phase, total: u64 },

    /// Coordinator -> workers: start `phase`, no parameter needed
    Trigger(Phase),

    /// Worker -> coordinator: `phase` finished, outputs are on disk
    Ack(Phase),

    /// Worker -> coordinator: read hit index of the worker's line range
    PartialIndex(ReadHitIndex),

    /// Worker -> coordinator: formatted output lines of the worker's line range
    PartialLines(Vec<String>),

    /// Worker -> coordinator: the worker hit a fatal error
    Failure { kind: ErrorKind, message: String },

    /// Coordinator -> workers: stop, the run has failed
    Abort,
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Message::Start { .. } => "start",
            Message::Trigger(_) => "trigger",
            Message::Ack(_) => "ack",
            Message::PartialIndex(_) => "partial-index",
            Message::PartialLines(_) => "partial-lines",
            Message::Failure { .. } => "failure",
            Message::Abort => "abort",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Message::Start { phase, total } => {
                buf.push(TAG_START);
                buf.push(phase.code());
                put_varint(&mut buf, *total);
            }
            Message::Trigger(phase) => {
                buf.push(TAG_TRIGGER);
                buf.push(phase.code());
            }
            Message::Ack(phase) => {
                buf.push(TAG_ACK);
                buf.push(phase.code());
            }
            Message::PartialIndex(index) => {
                buf.push(TAG_PARTIAL_INDEX);
                put_varint(&mut buf, index.len() as u64);
                for (read_id, targets) in index.iter() {
                    put_str(&mut buf, read_id);
                    put_varint(&mut buf, targets.len() as u64);
                    for target in targets.iter() {
                        put_str(&mut buf, target);
                    }
                }
            }
            Message::PartialLines(lines) => {
                buf.push(TAG_PARTIAL_LINES);
                put_varint(&mut buf, lines.len() as u64);
                for line in lines {
                    put_str(&mut buf, line);
                }
            }
            Message::Failure { kind, message } => {
                buf.push(TAG_FAILURE);
                buf.push(kind.code());
                put_str(&mut buf, message);
            }
            Message::Abort => buf.push(TAG_ABORT),
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let message = Self::read_from(&mut cursor)
            .map_err(|e| TipError::protocol(format!("undecodable message: {e}")))?;
        if cursor.position() as usize != bytes.len() {
            return Err(TipError::protocol(format!(
                "{} message has {} trailing bytes",
                message.name(),
                bytes.len() - cursor.position() as usize
            )));
        }
        Ok(message)
    }

    fn read_from(reader: &mut Cursor<&[u8]>) -> io::Result<Self> {
        let message = match read_u8(reader)? {
            TAG_START => {
                let phase = read_phase(reader)?;
                let (total, _) = read_varint(reader)?;
                Message::Start { phase, total }
            }
            TAG_TRIGGER => Message::Trigger(read_phase(reader)?),
            TAG_ACK => Message::Ack(read_phase(reader)?),
            TAG_PARTIAL_INDEX => {
                let (reads, _) = read_varint(reader)?;
                let mut index = ReadHitIndex::new();
                for _ in 0..reads {
                    let read_id = read_string(reader)?;
                    let (targets, _) = read_varint(reader)?;
                    if targets == 0 {
                        return Err(invalid("read without targets in partial index"));
                    }
                    for _ in 0..targets {
                        index.insert(&read_id, &read_string(reader)?);
                    }
                }
                Message::PartialIndex(index)
            }
            TAG_PARTIAL_LINES => {
                let (count, _) = read_varint(reader)?;
                let mut lines = Vec::new();
                for _ in 0..count {
                    lines.push(read_string(reader)?);
                }
                Message::PartialLines(lines)
            }
            TAG_FAILURE => {
                let code = read_u8(reader)?;
                let kind = ErrorKind::from_code(code)
                    .ok_or_else(|| invalid(format!("unknown error kind {code}")))?;
                Message::Failure {
                    kind,
                    message: read_string(reader)?,
                }
            }
            TAG_ABORT => Message::Abort,
            other => return Err(invalid(format!("unknown message tag {other}"))),
        };
        Ok(message)
    }
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    Ok(byte[0])
}

fn read_phase<R: Read>(reader: &mut R) -> io::Result<Phase> {
    let code = read_u8(reader)?;
    Phase::from_code(code).ok_or_else(|| invalid(format!("unknown phase {code}")))
}
