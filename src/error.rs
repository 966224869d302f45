use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::envelope::EnvelopeError;
use crate::meta::MetaError;
use crate::section::SectionError;

/// States of a single conversion, in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    EnvelopeParsed,
    Decrypted,
    SectionsExtracted,
    MetadataValidated,
    OptionsMigrated,
    GuildValidated,
    ChannelsValidated,
    MessagesMigrated,
    AssetsCollected,
    Packaged,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::EnvelopeParsed    => "envelope_parsed",
            Stage::Decrypted         => "decrypted",
            Stage::SectionsExtracted => "sections_extracted",
            Stage::MetadataValidated => "metadata_validated",
            Stage::OptionsMigrated   => "options_migrated",
            Stage::GuildValidated    => "guild_validated",
            Stage::ChannelsValidated => "channels_validated",
            Stage::MessagesMigrated  => "messages_migrated",
            Stage::AssetsCollected   => "assets_collected",
            Stage::Packaged          => "packaged",
        })
    }
}

/// Coarse classification of a [`ConvertError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedEnvelope,
    IntegrityFailure,
    UnknownEncryptor,
    MissingSecret,
    DecryptionFailure,
    MissingOrInvalidMetadata,
    ProtocolMismatch,
    TypeMismatch,
    FormatVersionMismatch,
    MissingSection,
    SectionDecodeFailure,
    DataInvariantViolation,
    AssetRetrievalFailure,
    ArchiveBuildFailure,
    Io,
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("failed to read envelope header")]
    Peek(#[source] EnvelopeError),
    #[error("failed to select encryptor")]
    Encryptor(#[source] CryptoError),
    #[error("failed to open autoencrypted file for conversion")]
    Open(#[source] EnvelopeError),
    #[error("failed to read sections")]
    Sections(#[source] SectionError),
    #[error("failed to parse metadata")]
    Metadata(#[source] MetaError),
    #[error("failed to get backup_opts")]
    Options(#[source] SectionError),
    #[error("failed to get core data")]
    Guild(#[source] SectionError),
    #[error("guild data is invalid [id is empty], likely an internal decoding error")]
    EmptyGuildId,
    #[error("sanity check failed during legacy backups migration: guild has no channels")]
    NoChannels,
    #[error("failed to get messages for channel {channel}")]
    Messages {
        channel: String,
        #[source]
        source:  SectionError,
    },
    #[error("unknown guild asset: {0}")]
    UnknownAsset(String),
    #[error("failed to get guild asset {section}")]
    AssetMissing {
        section: &'static str,
        #[source]
        source:  SectionError,
    },
    #[error("guild asset {0} is empty, likely an internal error")]
    AssetEmpty(&'static str),
    #[error("failed to build output archive")]
    Build(#[source] SectionError),
    #[error("failed to read {}", .path.display())]
    Read {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {}", .path.display())]
    Write {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::Peek(e) | ConvertError::Open(e) => envelope_kind(e),
            ConvertError::Encryptor(e) => crypto_kind(e),
            ConvertError::Sections(_) => ErrorKind::SectionDecodeFailure,
            ConvertError::Metadata(e) => match e {
                MetaError::Missing | MetaError::Unmarshal(_) => ErrorKind::MissingOrInvalidMetadata,
                MetaError::InvalidProtocol(_)           => ErrorKind::ProtocolMismatch,
                MetaError::InvalidType { .. }           => ErrorKind::TypeMismatch,
                MetaError::InvalidFormatVersion { .. }  => ErrorKind::FormatVersionMismatch,
            },
            ConvertError::Options(e)
            | ConvertError::Guild(e)
            | ConvertError::Messages { source: e, .. } => match e {
                SectionError::NotFound(_) => ErrorKind::MissingSection,
                _ => ErrorKind::SectionDecodeFailure,
            },
            ConvertError::EmptyGuildId
            | ConvertError::NoChannels
            | ConvertError::UnknownAsset(_) => ErrorKind::DataInvariantViolation,
            ConvertError::AssetMissing { .. } | ConvertError::AssetEmpty(_) => ErrorKind::AssetRetrievalFailure,
            ConvertError::Build(_) => ErrorKind::ArchiveBuildFailure,
            ConvertError::Read { .. } | ConvertError::Write { .. } => ErrorKind::Io,
        }
    }

    /// The stage the conversion was trying to reach when it failed.
    pub fn failed_stage(&self) -> Stage {
        match self {
            ConvertError::Peek(_) | ConvertError::Encryptor(_) | ConvertError::Read { .. } => Stage::EnvelopeParsed,
            ConvertError::Open(EnvelopeError::Decrypt(_) | EnvelopeError::InvalidEncryptor { .. }) => Stage::Decrypted,
            ConvertError::Open(_) => Stage::EnvelopeParsed,
            ConvertError::Sections(_) => Stage::SectionsExtracted,
            ConvertError::Metadata(_) => Stage::MetadataValidated,
            ConvertError::Options(_) => Stage::OptionsMigrated,
            ConvertError::Guild(_) | ConvertError::EmptyGuildId => Stage::GuildValidated,
            ConvertError::NoChannels => Stage::ChannelsValidated,
            ConvertError::Messages { .. } => Stage::MessagesMigrated,
            ConvertError::UnknownAsset(_)
            | ConvertError::AssetMissing { .. }
            | ConvertError::AssetEmpty(_) => Stage::AssetsCollected,
            ConvertError::Build(_) | ConvertError::Write { .. } => Stage::Packaged,
        }
    }
}

fn envelope_kind(e: &EnvelopeError) -> ErrorKind {
    match e {
        EnvelopeError::TooSmall(_) | EnvelopeError::InvalidMagic(_) => ErrorKind::MalformedEnvelope,
        EnvelopeError::ChecksumMismatch { .. } => ErrorKind::IntegrityFailure,
        EnvelopeError::InvalidEncryptor { .. } => ErrorKind::UnknownEncryptor,
        EnvelopeError::Decrypt(c) | EnvelopeError::Encrypt(c) => crypto_kind(c),
        EnvelopeError::Io(_) => ErrorKind::Io,
    }
}

fn crypto_kind(e: &CryptoError) -> ErrorKind {
    match e {
        CryptoError::MissingKey => ErrorKind::MissingSecret,
        CryptoError::UnknownEncryptor(_) | CryptoError::InvalidId { .. } => ErrorKind::UnknownEncryptor,
        _ => ErrorKind::DecryptionFailure,
    }
}
