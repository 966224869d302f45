//! Outer envelope of a legacy backup file.
//!
//! Layout (bit-exact, no length fields):
//!
//! | Offset | Size | Field        |
//! |--------|------|--------------|
//! | 0      | 6    | magic `iblaef` |
//! | 6      | 32   | SHA-256 of `payload` |
//! | 38     | 16   | encryptor id (ASCII, space padded) |
//! | 54     | ..   | payload      |
//!
//! The checksum covers the payload exactly as stored, i.e. the ciphertext when
//! the file is encrypted.  It proves byte integrity of the stored payload, not
//! authenticity of the decrypted archive.

use std::io::{self, Read, Seek, SeekFrom};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::crypto::{id_to_string, CryptoError, Encryptor, ENCRYPTOR_ID_LEN};

pub const MAGIC_LEN: usize = 6;
pub const MAGIC: &[u8; MAGIC_LEN] = b"iblaef";
pub const CHECKSUM_LEN: usize = 32;
/// Size of the fixed header preceding the payload.
pub const HEADER_LEN: usize = MAGIC_LEN + CHECKSUM_LEN + ENCRYPTOR_ID_LEN;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("block is too small ({0} bytes, header needs {HEADER_LEN})")]
    TooSmall(usize),
    #[error("invalid magic: {0}")]
    InvalidMagic(String),
    #[error("invalid checksum: expected {expected}, payload hashes to {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("invalid encryptor: block declares {declared:?}, got {supplied:?}")]
    InvalidEncryptor { declared: String, supplied: String },
    #[error("decryption failed")]
    Decrypt(#[source] CryptoError),
    #[error("encryption failed")]
    Encrypt(#[source] CryptoError),
    #[error("error reading envelope header")]
    Io(#[from] io::Error),
}

/// A parsed, not yet validated, envelope borrowing from the input buffer.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeBlock<'a> {
    pub magic:     &'a [u8],
    pub checksum:  &'a [u8],
    pub encryptor: &'a [u8],
    pub payload:   &'a [u8],
}

impl<'a> EnvelopeBlock<'a> {
    /// Slice `block` at the fixed header offsets.
    pub fn parse(block: &'a [u8]) -> Result<Self, EnvelopeError> {
        if block.len() < HEADER_LEN {
            return Err(EnvelopeError::TooSmall(block.len()));
        }
        let (magic, rest)        = block.split_at(MAGIC_LEN);
        let (checksum, rest)     = rest.split_at(CHECKSUM_LEN);
        let (encryptor, payload) = rest.split_at(ENCRYPTOR_ID_LEN);
        Ok(Self { magic, checksum, encryptor, payload })
    }

    /// Check the magic and the checksum of the stored payload.
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if self.magic != MAGIC {
            return Err(EnvelopeError::InvalidMagic(
                String::from_utf8_lossy(self.magic).into_owned(),
            ));
        }
        let actual = Sha256::digest(self.payload);
        if actual.as_slice() != self.checksum {
            return Err(EnvelopeError::ChecksumMismatch {
                expected: hex::encode(self.checksum),
                actual:   hex::encode(actual),
            });
        }
        Ok(())
    }

    /// Decrypt the payload.  `encryptor` must be the one the block declares.
    pub fn decrypt(&self, encryptor: &dyn Encryptor) -> Result<Vec<u8>, EnvelopeError> {
        if encryptor.id().as_slice() != self.encryptor {
            return Err(EnvelopeError::InvalidEncryptor {
                declared: self.encryptor_name(),
                supplied: id_to_string(encryptor.id()),
            });
        }
        encryptor.decrypt(self.payload).map_err(EnvelopeError::Decrypt)
    }

    /// Declared encryptor id without its padding.
    pub fn encryptor_name(&self) -> String {
        id_to_string(self.encryptor)
    }
}

/// Read only the fixed header to learn the declared encryptor id.
///
/// The reader is returned to the position it had on entry.  Nothing but the
/// encryptor id of the result is meaningful: the header has not been validated.
pub fn peek_encryptor<R: Read + Seek>(reader: &mut R) -> Result<[u8; ENCRYPTOR_ID_LEN], EnvelopeError> {
    let start = reader.stream_position()?;
    let mut header = [0u8; HEADER_LEN];
    let read = read_up_to(reader, &mut header);
    reader.seek(SeekFrom::Start(start))?;
    let read = read?;
    if read < HEADER_LEN {
        return Err(EnvelopeError::TooSmall(read));
    }
    peek_bytes(&header)
}

/// Slice variant of [`peek_encryptor`].
pub fn peek_bytes(data: &[u8]) -> Result<[u8; ENCRYPTOR_ID_LEN], EnvelopeError> {
    let block = EnvelopeBlock::parse(data.get(..HEADER_LEN).unwrap_or(data))?;
    let mut id = [0u8; ENCRYPTOR_ID_LEN];
    id.copy_from_slice(block.encryptor);
    Ok(id)
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Encrypt `plaintext` and wrap it in a valid envelope.
pub fn seal(encryptor: &dyn Encryptor, plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let payload = encryptor.encrypt(plaintext).map_err(EnvelopeError::Encrypt)?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&Sha256::digest(&payload));
    out.extend_from_slice(encryptor.id());
    out.extend_from_slice(&payload);
    Ok(out)
}
