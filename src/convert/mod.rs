//! Legacy backup → converted backup, end to end.
//!
//! ```no_run
//! use legacyconv::convert::{convert, ConvertOptions};
//!
//! let legacy = std::fs::read("backup.iblfile")?;
//! let opts = ConvertOptions { password: Some("hunter2".into()) };
//! let converted = convert(&legacy, &opts)?;
//! std::fs::write("backup.arb1", converted)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Pipeline (linear, first error wins, nothing is written on failure):
//! envelope parsed → decrypted → sections extracted → metadata validated →
//! options migrated → guild validated → channels validated → messages
//! migrated → assets collected → packaged.

pub mod migrate;
pub mod package;

use std::io::Cursor;
use std::path::Path;

use tracing::{debug, error, info};

use crate::crypto::{id_to_string, EncryptorRegistry};
use crate::envelope::{peek_encryptor, EnvelopeBlock};
use crate::error::{ConvertError, Stage};
use crate::meta::{Meta, BACKUP_TYPE, FORMAT_VERSION, PROTOCOL};
use crate::section::{SectionArchive, SectionSource};

pub use migrate::{migrate, select_assets, MigratedBackup};
pub use package::package;

pub const BACKUP_OPTS_SECTION: &str = "backup_opts";
pub const GUILD_SECTION:       &str = "core/guild";
pub const MESSAGES_PREFIX:     &str = "messages/";
pub const CORE_SECTION:        &str = "core.json.gz";

pub fn messages_section(channel_id: &str) -> String {
    format!("{MESSAGES_PREFIX}{channel_id}")
}

/// Caller-supplied settings for one conversion.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Secret for password-encrypted backups.
    pub password: Option<String>,
}

/// Convert a legacy backup using the process-wide encryptor registry.
pub fn convert(data: &[u8], opts: &ConvertOptions) -> Result<Vec<u8>, ConvertError> {
    convert_with(data, opts, EncryptorRegistry::global())
}

/// Convert a legacy backup, resolving its encryptor in `registry`.
pub fn convert_with(
    data:     &[u8],
    opts:     &ConvertOptions,
    registry: &EncryptorRegistry,
) -> Result<Vec<u8>, ConvertError> {
    let result = open(data, opts, registry).and_then(|archive| {
        let sections = archive.sections().map_err(ConvertError::Sections)?;
        debug!(stage = %Stage::SectionsExtracted, sections = sections.len());
        convert_sections(sections)
    });
    if let Err(e) = &result {
        error!(stage = %e.failed_stage(), kind = ?e.kind(), "conversion failed: {e}");
    }
    result
}

/// Select the encryptor, then parse, validate and decrypt the envelope.
fn open(data: &[u8], opts: &ConvertOptions, registry: &EncryptorRegistry) -> Result<SectionArchive, ConvertError> {
    let declared = peek_encryptor(&mut Cursor::new(data)).map_err(ConvertError::Peek)?;
    let encryptor = registry
        .resolve(&declared, opts.password.as_deref())
        .map_err(ConvertError::Encryptor)?;

    let block = EnvelopeBlock::parse(data).map_err(ConvertError::Open)?;
    block.validate().map_err(ConvertError::Open)?;
    debug!(stage = %Stage::EnvelopeParsed, encryptor = %id_to_string(&declared), payload = block.payload.len());

    let archive = SectionArchive::new(block.decrypt(encryptor.as_ref()).map_err(ConvertError::Open)?);
    debug!(stage = %Stage::Decrypted, bytes = archive.size());
    Ok(archive)
}

/// Gate on the metadata header, then migrate and package.
///
/// No section other than `meta` is read until every gate has passed.
pub fn convert_sections<S: SectionSource + ?Sized>(src: &S) -> Result<Vec<u8>, ConvertError> {
    let meta = Meta::parse_and_validate(src, PROTOCOL).map_err(ConvertError::Metadata)?;
    meta.expect(BACKUP_TYPE, FORMAT_VERSION).map_err(ConvertError::Metadata)?;
    debug!(stage = %Stage::MetadataValidated, created_at = %meta.created_at);

    let migrated = migrate(src)?;
    let out = package(&migrated)?;
    info!(
        stage    = %Stage::Packaged,
        guild    = %migrated.core.guild.id,
        channels = migrated.core.channels.len(),
        messages = migrated.message_count(),
        assets   = migrated.assets.len(),
        bytes    = out.len(),
        "converted legacy backup"
    );
    Ok(out)
}

/// Read `input`, convert it, and write the result to `output`.
///
/// `output` is only created once the conversion has succeeded.
pub fn convert_file(input: &Path, output: &Path, opts: &ConvertOptions) -> Result<(), ConvertError> {
    let data = std::fs::read(input).map_err(|source| ConvertError::Read {
        path: input.to_owned(),
        source,
    })?;
    let converted = convert(&data, opts)?;
    std::fs::write(output, converted).map_err(|source| ConvertError::Write {
        path: output.to_owned(),
        source,
    })
}
