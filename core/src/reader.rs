//! Decoders for segment files. They load whole files and exist to verify what
//! the writers produced; there is no query path here.

use crate::flat::FLAT_MAGIC;
use crate::postings::{decode_posting_list, PostingsEncoding};
use crate::trie::{NodeId, TokenTrie, TrieNode, NO_OFFSET};
use crate::{DocId, Token};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{self, Cursor, Read};

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn at_end(cursor: &Cursor<&[u8]>) -> bool {
    cursor.position() as usize >= cursor.get_ref().len()
}

pub fn read_str<R: Read>(reader: &mut R) -> io::Result<String> {
    let len = reader.read_u16::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| invalid(e.to_string()))
}

/// Decodes the posting list whose entry starts at `offset` in `postings.bin`.
pub fn read_postings_at(postings: &[u8], offset: u64, encoding: PostingsEncoding) -> io::Result<Vec<DocId>> {
    let start = usize::try_from(offset).map_err(|_| invalid("offset out of range"))?;
    if start >= postings.len() {
        return Err(invalid(format!("offset {offset} past end of postings ({} bytes)", postings.len())));
    }
    decode_posting_list(&mut Cursor::new(&postings[start..]), encoding)
}

pub fn read_sorted_dictionary(bytes: &[u8]) -> io::Result<Vec<(Token, u64)>> {
    let mut cursor = Cursor::new(bytes);
    let mut entries = Vec::new();
    while !at_end(&cursor) {
        let token = read_str(&mut cursor)?;
        let offset = cursor.read_u64::<BigEndian>()?;
        entries.push((Token::new(token), offset));
    }
    Ok(entries)
}

pub fn read_fixed_width_dictionary(bytes: &[u8], width: usize) -> io::Result<Vec<(Token, u64)>> {
    let entry_len = width + 8;
    if bytes.len() % entry_len != 0 {
        return Err(invalid(format!("{} bytes is not a multiple of entry size {entry_len}", bytes.len())));
    }
    bytes
        .chunks_exact(entry_len)
        .map(|entry| {
            let (raw, offset) = entry.split_at(width);
            let end = raw.iter().position(|b| *b == 0).unwrap_or(width);
            let token = std::str::from_utf8(&raw[..end]).map_err(|e| invalid(e.to_string()))?;
            let offset = u64::from_be_bytes(offset.try_into().map_err(|_| invalid("short offset"))?);
            Ok((Token::from(token), offset))
        })
        .collect()
}

/// Rebuilds the arena from its pre-order serialization.
pub fn read_trie(bytes: &[u8]) -> io::Result<TokenTrie> {
    let mut cursor = Cursor::new(bytes);
    let mut nodes: Vec<TrieNode> = Vec::new();
    // (parent, children still to read)
    let mut pending: Vec<(NodeId, u32)> = Vec::new();
    loop {
        let label = cursor.read_u8()?;
        let terminal = cursor.read_u8()? != 0;
        let offset = if terminal {
            let raw = cursor.read_u64::<BigEndian>()?;
            (raw != NO_OFFSET).then_some(raw)
        } else {
            None
        };
        let child_count = cursor.read_u32::<BigEndian>()?;

        let id = nodes.len() as NodeId;
        nodes.push(TrieNode::decoded(label, terminal, offset));
        if let Some((parent, remaining)) = pending.last_mut() {
            nodes[*parent as usize].push_child(label, id);
            *remaining -= 1;
        }
        if child_count > 0 {
            pending.push((id, child_count));
        }
        while matches!(pending.last(), Some((_, 0))) {
            pending.pop();
        }
        if pending.is_empty() {
            break;
        }
    }
    if !at_end(&cursor) {
        return Err(invalid("trailing bytes after trie"));
    }
    Ok(TokenTrie::from_nodes(nodes))
}

pub fn read_doc_table(bytes: &[u8]) -> io::Result<Vec<String>> {
    let mut cursor = Cursor::new(bytes);
    let count = cursor.read_u32::<BigEndian>()?;
    (0..count).map(|_| read_str(&mut cursor)).collect()
}

pub fn read_flat_index(bytes: &[u8]) -> io::Result<Vec<(Token, Vec<String>)>> {
    let mut cursor = Cursor::new(bytes);
    let magic = cursor.read_u32::<BigEndian>()?;
    if magic != FLAT_MAGIC {
        return Err(invalid(format!("bad magic {magic:#010x}")));
    }
    let tokens = cursor.read_u32::<BigEndian>()?;
    let mut entries = Vec::new();
    for _ in 0..tokens {
        let token = Token::new(read_str(&mut cursor)?);
        let count = cursor.read_u32::<BigEndian>()?;
        let urls = (0..count).map(|_| read_str(&mut cursor)).collect::<io::Result<Vec<_>>>()?;
        entries.push((token, urls));
    }
    Ok(entries)
}
