//! Section archive: a flat, sequential tar stream mapping names to bytes.
//!
//! # Reading
//! [`SectionArchive`] holds the decrypted archive bytes and extracts every
//! entry into a name → bytes map on first access.  The map is cached for the
//! lifetime of the handle and only ever handed out by shared reference.
//! Duplicate names resolve to the last entry in the stream.
//!
//! # Writing
//! [`SectionWriter`] appends one regular-file entry per section (mode `0600`,
//! mtime 0) and returns the finished stream from [`SectionWriter::finish`],
//! which consumes the writer.
//!
//! Names are plain strings; a `/` inside a name (`messages/<id>`) is only a
//! naming convention, no directory entries are read or written.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::OnceLock;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tar::{EntryType, Header};
use thiserror::Error;

/// Mode bits written on every output entry.
pub const SECTION_MODE: u32 = 0o600;

pub type Sections = HashMap<String, Vec<u8>>;

#[derive(Error, Debug)]
pub enum SectionError {
    #[error("no section found for {0}")]
    NotFound(String),
    #[error("failed to decode section {name}")]
    Decode {
        name:   String,
        #[source]
        source: rmp_serde::decode::Error,
    },
    #[error("failed to decode json section {name}")]
    Json {
        name:   String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read section archive")]
    Archive(#[source] io::Error),
    #[error("failed to write section {name}")]
    Write {
        name:   String,
        #[source]
        source: io::Error,
    },
    #[error("failed to finish section archive")]
    Finish(#[source] io::Error),
}

// ── Read seam ───────────────────────────────────────────────────────────────

/// Read access to extracted sections.
pub trait SectionSource {
    fn section(&self, name: &str) -> Option<&[u8]>;

    fn contains(&self, name: &str) -> bool {
        self.section(name).is_some()
    }
}

impl SectionSource for Sections {
    fn section(&self, name: &str) -> Option<&[u8]> {
        self.get(name).map(Vec::as_slice)
    }
}

/// Fetch a section, failing with [`SectionError::NotFound`] when absent.
pub fn require<'a, S: SectionSource + ?Sized>(src: &'a S, name: &str) -> Result<&'a [u8], SectionError> {
    src.section(name)
        .ok_or_else(|| SectionError::NotFound(name.to_owned()))
}

/// Decode a MessagePack section into `T`.
///
/// Absence and malformed content are reported as different variants so that
/// callers can tolerate one and abort on the other.
pub fn decode_section<T, S>(src: &S, name: &str) -> Result<T, SectionError>
where
    T: DeserializeOwned,
    S: SectionSource + ?Sized,
{
    let bytes = require(src, name)?;
    rmp_serde::from_slice(bytes).map_err(|source| SectionError::Decode {
        name: name.to_owned(),
        source,
    })
}

/// Decode a gzip-compressed JSON section into `T`.
pub fn decode_json_gz_section<T, S>(src: &S, name: &str) -> Result<T, SectionError>
where
    T: DeserializeOwned,
    S: SectionSource + ?Sized,
{
    let bytes = require(src, name)?;
    serde_json::from_reader(GzDecoder::new(bytes)).map_err(|source| SectionError::Json {
        name: name.to_owned(),
        source,
    })
}

// ── SectionArchive ──────────────────────────────────────────────────────────

pub struct SectionArchive {
    raw:      Vec<u8>,
    sections: OnceLock<Sections>,
}

impl SectionArchive {
    pub fn new(raw: Vec<u8>) -> Self {
        Self { raw, sections: OnceLock::new() }
    }

    /// All sections, extracted on first call and cached afterwards.
    pub fn sections(&self) -> Result<&Sections, SectionError> {
        if let Some(sections) = self.sections.get() {
            return Ok(sections);
        }
        let extracted = extract(&self.raw)?;
        Ok(self.sections.get_or_init(|| extracted))
    }

    pub fn get(&self, name: &str) -> Result<&[u8], SectionError> {
        require(self.sections()?, name)
    }

    /// Section names in sorted order.
    pub fn names(&self) -> Result<Vec<&str>, SectionError> {
        let mut names: Vec<&str> = self.sections()?.keys().map(String::as_str).collect();
        names.sort_unstable();
        Ok(names)
    }

    /// Size of the raw archive in bytes.
    pub fn size(&self) -> usize {
        self.raw.len()
    }
}

/// Decode a tar stream into a name → bytes map.  Empty input is an empty map.
pub fn extract(raw: &[u8]) -> Result<Sections, SectionError> {
    let mut sections = Sections::new();
    if raw.is_empty() {
        return Ok(sections);
    }

    let mut archive = tar::Archive::new(raw);
    for entry in archive.entries().map_err(SectionError::Archive)? {
        let mut entry = entry.map_err(SectionError::Archive)?;
        let name = entry
            .path()
            .map_err(SectionError::Archive)?
            .to_string_lossy()
            .into_owned();
        // the declared size is untrusted; never reserve past the input
        let hint = entry.size().min(raw.len() as u64) as usize;
        let mut data = Vec::with_capacity(hint);
        entry.read_to_end(&mut data).map_err(SectionError::Archive)?;
        sections.insert(name, data);
    }
    Ok(sections)
}

// ── SectionWriter ───────────────────────────────────────────────────────────

pub struct SectionWriter {
    builder: tar::Builder<Vec<u8>>,
}

impl Default for SectionWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionWriter {
    pub fn new() -> Self {
        Self { builder: tar::Builder::new(Vec::new()) }
    }

    /// Append one entry holding `data` verbatim.
    pub fn write_section(&mut self, name: &str, data: &[u8]) -> Result<(), SectionError> {
        let write_err = |source: io::Error| SectionError::Write { name: name.to_owned(), source };

        let mut header = Header::new_ustar();
        header.set_path(name).map_err(write_err)?;
        header.set_entry_type(EntryType::Regular);
        header.set_mode(SECTION_MODE);
        header.set_size(data.len() as u64);
        header.set_mtime(0);
        header.set_cksum();
        self.builder.append(&header, data).map_err(write_err)
    }

    /// Append one entry holding the gzip-compressed JSON encoding of `value`.
    pub fn write_json_gz_section<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> Result<(), SectionError> {
        let mut json = serde_json::to_vec(value).map_err(|source| SectionError::Json {
            name: name.to_owned(),
            source,
        })?;
        json.push(b'\n');

        let write_err = |source: io::Error| SectionError::Write { name: name.to_owned(), source };
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(&json).map_err(write_err)?;
        let compressed = gz.finish().map_err(write_err)?;
        self.write_section(name, &compressed)
    }

    /// Close the archive and return its bytes.
    pub fn finish(self) -> Result<Vec<u8>, SectionError> {
        self.builder.into_inner().map_err(SectionError::Finish)
    }
}
