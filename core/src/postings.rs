//! `postings.bin` encodings.
//!
//! - **Fixed**: `u32` count, then `count` x `u32` doc ids (big-endian).
//! - **Compact**: varint count, then varint deltas between consecutive ids. The
//!   running previous id starts at 0, so the first delta is the first id.

use crate::{DocId, Token};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

/// A u64 varint never needs more than 10 bytes.
const MAX_VARINT_BYTES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostingsEncoding {
    Fixed,
    #[default]
    Compact,
}

impl FromStr for PostingsEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "compact" | "varint" => Ok(Self::Compact),
            other => Err(format!("unknown postings encoding {other:?} (expected fixed|compact)")),
        }
    }
}

impl fmt::Display for PostingsEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fixed => "fixed",
            Self::Compact => "compact",
        })
    }
}

/// Passes writes through and counts bytes, which is where postings offsets
/// come from.
pub struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self { Self { inner, count: 0 } }
    pub fn position(&self) -> u64 { self.count }
    pub fn into_inner(self) -> W { self.inner }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> { self.inner.flush() }
}

pub fn write_varint<W: Write>(writer: &mut W, mut value: u64) -> io::Result<()> {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            return writer.write_u8(byte);
        }
        writer.write_u8(byte | 0x80)?;
    }
}

pub fn read_varint<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut result = 0u64;
    for i in 0..MAX_VARINT_BYTES {
        let byte = reader.read_u8()?;
        result |= ((byte & 0x7F) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(io::Error::new(io::ErrorKind::InvalidData, "varint too long"))
}

/// Writes one posting list. `ids` must be sorted ascending.
pub fn encode_posting_list<W: Write>(writer: &mut W, ids: &[DocId], encoding: PostingsEncoding) -> io::Result<()> {
    debug_assert!(ids.windows(2).all(|w| w[0] < w[1]), "posting list must be strictly ascending");
    match encoding {
        PostingsEncoding::Fixed => {
            writer.write_u32::<BigEndian>(ids.len() as u32)?;
            for id in ids {
                writer.write_u32::<BigEndian>(*id)?;
            }
        }
        PostingsEncoding::Compact => {
            write_varint(writer, ids.len() as u64)?;
            let mut prev = 0;
            for id in ids {
                write_varint(writer, (id - prev) as u64)?;
                prev = *id;
            }
        }
    }
    Ok(())
}

pub fn decode_posting_list<R: Read>(reader: &mut R, encoding: PostingsEncoding) -> io::Result<Vec<DocId>> {
    match encoding {
        PostingsEncoding::Fixed => {
            let count = reader.read_u32::<BigEndian>()? as usize;
            let mut ids = Vec::with_capacity(count.min(1 << 16));
            for _ in 0..count {
                ids.push(reader.read_u32::<BigEndian>()?);
            }
            Ok(ids)
        }
        PostingsEncoding::Compact => {
            let count = read_varint(reader)? as usize;
            let mut ids = Vec::with_capacity(count.min(1 << 16));
            let mut prev: u64 = 0;
            for _ in 0..count {
                prev += read_varint(reader)?;
                let id = DocId::try_from(prev)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "doc id overflows u32"))?;
                ids.push(id);
            }
            Ok(ids)
        }
    }
}

/// Postings pass: writes every list in the given order and returns each token
/// with the byte offset its entry starts at.
pub fn write_postings<W: Write>(
    writer: &mut CountingWriter<W>,
    postings: &[(Token, Vec<DocId>)],
    encoding: PostingsEncoding,
) -> io::Result<Vec<(Token, u64)>> {
    let mut offsets = Vec::with_capacity(postings.len());
    for (token, ids) in postings {
        offsets.push((token.clone(), writer.position()));
        encode_posting_list(writer, ids, encoding)?;
    }
    Ok(offsets)
}
