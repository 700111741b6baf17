//! Single-file index: one `index.bin` holding every token with its URLs inline.
//!
//! Layout (big-endian): `u32 magic`, `u32 token count`, then per token in
//! ascending order: string token, `u32 url count`, URLs in doc id order.
//! Strings are `u16` length + UTF-8 bytes.

use crate::persist::{write_file, write_str, IndexWriter, SegmentError, WriteSummary};
use crate::{DocIdDictionary, InvertedIndex};
use byteorder::{BigEndian, WriteBytesExt};
use std::fs::create_dir_all;
use std::io::{self, Write};
use std::path::Path;

/// "Cyph"
pub const FLAT_MAGIC: u32 = 0x4379_7068;
pub const FLAT_FILE_NAME: &str = "index.bin";

#[derive(Debug, Clone, Copy, Default)]
pub struct FlatFileWriter;

impl IndexWriter for FlatFileWriter {
    fn write(&self, index: &InvertedIndex, dictionary: &DocIdDictionary, dest: &Path) -> Result<WriteSummary, SegmentError> {
        create_dir_all(dest).map_err(|source| SegmentError::Io { path: dest.to_path_buf(), source })?;
        let path = dest.join(FLAT_FILE_NAME);
        let postings = index.sorted_postings();
        let addresses = dictionary.all_addresses_in_id_order();

        let (_, bytes_written) = write_file(&path, |w| {
            w.write_u32::<BigEndian>(FLAT_MAGIC)?;
            w.write_u32::<BigEndian>(postings.len() as u32)?;
            for (token, ids) in &postings {
                write_str(w, token.as_str())?;
                w.write_u32::<BigEndian>(ids.len() as u32)?;
                for id in ids {
                    let address = addresses.get(*id as usize).ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidData, format!("doc id {id} has no address"))
                    })?;
                    write_str(w, address.as_str())?;
                }
            }
            Ok(())
        })?;

        tracing::info!(path = %path.display(), num_tokens = postings.len(), "flat index written");
        Ok(WriteSummary {
            num_docs: addresses.len(),
            num_tokens: postings.len(),
            bytes_written,
            skipped_fixed_width: 0,
        })
    }
}

pub const TEXT_FILE_NAME: &str = "index.txt";

/// Human-readable dump for eyeballing a crawl: a `Token: ` line per token
/// followed by one `------Url: ...-----` line per document.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFileWriter;

impl IndexWriter for TextFileWriter {
    fn write(&self, index: &InvertedIndex, dictionary: &DocIdDictionary, dest: &Path) -> Result<WriteSummary, SegmentError> {
        create_dir_all(dest).map_err(|source| SegmentError::Io { path: dest.to_path_buf(), source })?;
        let path = dest.join(TEXT_FILE_NAME);
        let postings = index.sorted_postings();
        let addresses = dictionary.all_addresses_in_id_order();

        let (_, bytes_written) = write_file(&path, |w| {
            for (token, ids) in &postings {
                writeln!(w, "Token: {token}")?;
                for id in ids {
                    match addresses.get(*id as usize) {
                        Some(address) => writeln!(w, "------Url: {address}-----")?,
                        None => writeln!(w, "------Url: <unknown doc {id}>-----")?,
                    }
                }
            }
            Ok(())
        })?;

        tracing::info!(path = %path.display(), num_tokens = postings.len(), "text index written");
        Ok(WriteSummary {
            num_docs: addresses.len(),
            num_tokens: postings.len(),
            bytes_written,
            skipped_fixed_width: 0,
        })
    }
}
