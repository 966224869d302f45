//! [`MigratedBackup`] → plain (unencrypted) section archive.
//!
//! Output entries, in order: one raw entry per requested asset, then
//! `core.json.gz`.  No envelope is applied to the output.

use crate::error::ConvertError;
use crate::section::SectionWriter;

use super::migrate::MigratedBackup;
use super::CORE_SECTION;

pub fn package(migrated: &MigratedBackup) -> Result<Vec<u8>, ConvertError> {
    let mut writer = SectionWriter::new();
    for (asset, data) in &migrated.assets {
        writer
            .write_section(asset.output_section(), data)
            .map_err(ConvertError::Build)?;
    }
    writer
        .write_json_gz_section(CORE_SECTION, &migrated.core)
        .map_err(ConvertError::Build)?;
    writer.finish().map_err(ConvertError::Build)
}
