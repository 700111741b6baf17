use crate::flat::{FlatFileWriter, TextFileWriter};
use crate::postings::{write_postings, CountingWriter, PostingsEncoding};
use crate::trie::TokenTrie;
use crate::{Address, DocIdDictionary, InvertedIndex, Token};
use byteorder::{BigEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{create_dir_all, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const SEGMENT_VERSION: u32 = 1;
pub const DEFAULT_FIXED_WIDTH: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode segment manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub num_docs: u32,
    pub num_tokens: u32,
    pub postings_encoding: PostingsEncoding,
    pub fixed_width: usize,
    pub skipped_fixed_width: u32,
    pub created_at: String,
}

/// File names inside a segment directory.
pub struct SegmentPaths {
    pub root: PathBuf,
}

impl SegmentPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn postings(&self) -> PathBuf { self.root.join("postings.bin") }
    pub fn token_dict(&self) -> PathBuf { self.root.join("token_dict.bin") }
    pub fn token_dict_fixed_width(&self) -> PathBuf { self.root.join("token_dict_fixedwidth.bin") }
    pub fn token_dict_trie(&self) -> PathBuf { self.root.join("token_dict_trie.bin") }
    pub fn doc_table(&self) -> PathBuf { self.root.join("doc_table.bin") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub num_docs: usize,
    pub num_tokens: usize,
    pub bytes_written: u64,
    pub skipped_fixed_width: usize,
}

/// Persists a finished index. Any error means the destination is invalid and
/// should be discarded by the caller.
pub trait IndexWriter: Send + Sync {
    fn write(&self, index: &InvertedIndex, dictionary: &DocIdDictionary, dest: &Path) -> Result<WriteSummary, SegmentError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Segment,
    /// Single `index.bin` with tokens and their URLs inline.
    Flat,
    /// `index.txt` for reading by eye.
    Text,
}

impl OutputFormat {
    pub fn writer(self, encoding: PostingsEncoding, fixed_width: usize) -> Box<dyn IndexWriter> {
        match self {
            Self::Segment => Box::new(SegmentWriter { encoding, fixed_width }),
            Self::Flat => Box::new(FlatFileWriter),
            Self::Text => Box::new(TextFileWriter),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "segment" => Ok(Self::Segment),
            "flat" | "single" => Ok(Self::Flat),
            "text" | "txt" => Ok(Self::Text),
            other => Err(format!("unknown output format {other:?} (expected segment|flat|text)")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Segment => "segment",
            Self::Flat => "flat",
            Self::Text => "text",
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SegmentWriter {
    pub encoding: PostingsEncoding,
    pub fixed_width: usize,
}

impl Default for SegmentWriter {
    fn default() -> Self {
        Self { encoding: PostingsEncoding::default(), fixed_width: DEFAULT_FIXED_WIDTH }
    }
}

impl IndexWriter for SegmentWriter {
    fn write(&self, index: &InvertedIndex, dictionary: &DocIdDictionary, dest: &Path) -> Result<WriteSummary, SegmentError> {
        let paths = SegmentPaths::new(dest);
        create_dir_all(&paths.root).map_err(|source| SegmentError::Io { path: paths.root.clone(), source })?;

        // Order matters: every later file reuses the offsets from postings.bin.
        let postings = index.sorted_postings();
        let (offsets, postings_bytes) =
            write_file(&paths.postings(), |w| write_postings(w, &postings, self.encoding))?;
        drop(postings);

        let (_, dict_bytes) = write_file(&paths.token_dict(), |w| write_sorted_dictionary(w, &offsets))?;
        let (skipped, fixed_bytes) = write_file(&paths.token_dict_fixed_width(), |w| {
            write_fixed_width_dictionary(w, &offsets, self.fixed_width)
        })?;

        let trie = TokenTrie::build(offsets.iter().map(|(token, offset)| (token, *offset)));
        let (_, trie_bytes) = write_file(&paths.token_dict_trie(), |w| trie.write_to(w))?;

        let addresses = dictionary.all_addresses_in_id_order();
        let num_docs = addresses.len();
        let (_, doc_bytes) = write_file(&paths.doc_table(), |w| write_doc_table(w, &addresses))?;
        drop(addresses);

        let meta = MetaFile {
            version: SEGMENT_VERSION,
            num_docs: num_docs as u32,
            num_tokens: offsets.len() as u32,
            postings_encoding: self.encoding,
            fixed_width: self.fixed_width,
            skipped_fixed_width: skipped as u32,
            created_at: now_rfc3339(),
        };
        save_meta(&paths, &meta)?;

        let summary = WriteSummary {
            num_docs,
            num_tokens: offsets.len(),
            bytes_written: postings_bytes + dict_bytes + fixed_bytes + trie_bytes + doc_bytes,
            skipped_fixed_width: skipped,
        };
        tracing::info!(
            dir = %paths.root.display(),
            num_docs,
            num_tokens = summary.num_tokens,
            trie_nodes = trie.len(),
            encoding = %self.encoding,
            "segment written"
        );
        Ok(summary)
    }
}

/// Creates `path`, runs `body` against a buffered counting writer and flushes.
/// Returns the body's value and the number of bytes written.
pub(crate) fn write_file<T>(
    path: &Path,
    body: impl FnOnce(&mut CountingWriter<BufWriter<File>>) -> io::Result<T>,
) -> Result<(T, u64), SegmentError> {
    let run = || -> io::Result<(T, u64)> {
        let mut writer = CountingWriter::new(BufWriter::new(File::create(path)?));
        let value = body(&mut writer)?;
        writer.flush()?;
        let written = writer.position();
        writer.into_inner().into_inner().map_err(|e| e.into_error())?.sync_all()?;
        Ok((value, written))
    };
    run().map_err(|source| {
        tracing::error!(path = %path.display(), error = %source, "segment file write failed");
        SegmentError::Io { path: path.to_path_buf(), source }
    })
}

/// `u16` byte length followed by the UTF-8 bytes.
pub fn write_str<W: Write>(writer: &mut W, s: &str) -> io::Result<()> {
    let len = u16::try_from(s.len()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("string of {} bytes exceeds u16 length prefix", s.len()))
    })?;
    writer.write_u16::<BigEndian>(len)?;
    writer.write_all(s.as_bytes())
}

/// `token_dict.bin`: `(string, u64 offset)*` in ascending token order.
pub fn write_sorted_dictionary<W: Write>(writer: &mut W, offsets: &[(Token, u64)]) -> io::Result<()> {
    debug_assert!(offsets.windows(2).all(|w| w[0].0 < w[1].0));
    for (token, offset) in offsets {
        write_str(writer, token.as_str())?;
        writer.write_u64::<BigEndian>(*offset)?;
    }
    Ok(())
}

/// `token_dict_fixedwidth.bin`: each entry is `width` zero-padded token bytes
/// and a `u64` offset. Tokens longer than `width` are left out of this file only.
/// Returns how many were left out.
pub fn write_fixed_width_dictionary<W: Write>(writer: &mut W, offsets: &[(Token, u64)], width: usize) -> io::Result<usize> {
    let padding = vec![0u8; width];
    let mut skipped = 0;
    for (token, offset) in offsets {
        let bytes = token.as_bytes();
        if bytes.len() > width {
            tracing::warn!(token = %token, len = bytes.len(), width, "token too long for fixed-width dictionary, skipping");
            skipped += 1;
            continue;
        }
        writer.write_all(bytes)?;
        writer.write_all(&padding[bytes.len()..])?;
        writer.write_u64::<BigEndian>(*offset)?;
    }
    Ok(skipped)
}

/// `doc_table.bin`: `u32` count, then each address in doc id order.
pub fn write_doc_table<W: Write>(writer: &mut W, addresses: &[Address]) -> io::Result<()> {
    writer.write_u32::<BigEndian>(addresses.len() as u32)?;
    for address in addresses {
        write_str(writer, address.as_str())?;
    }
    Ok(())
}

pub fn save_meta(paths: &SegmentPaths, meta: &MetaFile) -> Result<(), SegmentError> {
    let json = serde_json::to_string_pretty(meta)?;
    write_file(&paths.meta(), |w| w.write_all(json.as_bytes()))?;
    Ok(())
}

pub fn load_meta(paths: &SegmentPaths) -> anyhow::Result<MetaFile> {
    let buf = std::fs::read_to_string(paths.meta())?;
    Ok(serde_json::from_str(&buf)?)
}

pub(crate) fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
