//! The `meta` section: protocol, file type and format version gates.
//!
//! Nothing else in an archive is decoded until the header has been loaded and
//! every gate has matched exactly.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::section::SectionSource;

/// Reserved section name holding the JSON header.
pub const META_SECTION: &str = "meta";
/// The exact protocol every readable file declares.
pub const PROTOCOL: &str = "frostpaw-rev7";
/// File type of a legacy server backup.
pub const BACKUP_TYPE: &str = "backup.server";
/// The only legacy backup format version this crate converts.
pub const FORMAT_VERSION: &str = "a1";

#[derive(Error, Debug)]
pub enum MetaError {
    #[error("no metadata present")]
    Missing,
    #[error("failed to unmarshal meta")]
    Unmarshal(#[source] serde_json::Error),
    #[error("invalid protocol: {0}")]
    InvalidProtocol(String),
    #[error("invalid file type: {found} (expected {expected})")]
    InvalidType { found: String, expected: String },
    #[error("invalid file format version: {found} (expected {expected})")]
    InvalidFormatVersion { found: String, expected: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// Absent in some headers; decodes to the Unix epoch.
    #[serde(rename = "c", default)]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "p", default)]
    pub protocol: String,
    /// Allows breaking changes to one file type without a protocol bump.
    #[serde(rename = "v", default, skip_serializing_if = "String::is_empty")]
    pub format_version: String,
    #[serde(rename = "t", default)]
    pub kind: String,
    #[serde(rename = "m", default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

impl Meta {
    /// Header for a new file of `kind` at `format_version`, stamped now.
    pub fn new(kind: &str, format_version: &str) -> Self {
        Self {
            created_at:     Utc::now(),
            protocol:       PROTOCOL.to_owned(),
            format_version: format_version.to_owned(),
            kind:           kind.to_owned(),
            extra:          HashMap::new(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode the `meta` section without checking any gate.
    pub fn load<S: SectionSource + ?Sized>(src: &S) -> Result<Self, MetaError> {
        let raw = src.section(META_SECTION).ok_or(MetaError::Missing)?;
        serde_json::from_slice(raw).map_err(MetaError::Unmarshal)
    }

    /// Load the header and require `protocol` to match exactly.
    pub fn parse_and_validate<S: SectionSource + ?Sized>(src: &S, protocol: &str) -> Result<Self, MetaError> {
        let meta = Self::load(src)?;
        if meta.protocol != protocol {
            return Err(MetaError::InvalidProtocol(meta.protocol));
        }
        Ok(meta)
    }

    /// Require an exact file type and format version.
    pub fn expect(&self, kind: &str, format_version: &str) -> Result<(), MetaError> {
        if self.kind != kind {
            return Err(MetaError::InvalidType {
                found:    self.kind.clone(),
                expected: kind.to_owned(),
            });
        }
        if self.format_version != format_version {
            return Err(MetaError::InvalidFormatVersion {
                found:    self.format_version.clone(),
                expected: format_version.to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::Sections;

    fn with_meta(raw: &[u8]) -> Sections {
        let mut sections = Sections::new();
        sections.insert(META_SECTION.to_owned(), raw.to_vec());
        sections
    }

    #[test]
    fn decodes_wire_names() {
        let sections = with_meta(
            br#"{"c":"2023-05-01T12:00:00Z","p":"frostpaw-rev7","v":"a1","t":"backup.server","m":{"k":"v"}}"#,
        );
        let meta = Meta::parse_and_validate(&sections, PROTOCOL).unwrap();
        assert_eq!(meta.kind, BACKUP_TYPE);
        assert_eq!(meta.format_version, FORMAT_VERSION);
        assert_eq!(meta.extra.get("k").map(String::as_str), Some("v"));
        meta.expect(BACKUP_TYPE, FORMAT_VERSION).unwrap();
    }

    #[test]
    fn optional_fields_default() {
        let sections = with_meta(br#"{"c":"2023-05-01T12:00:00Z","p":"frostpaw-rev7","t":"backup.server"}"#);
        let meta = Meta::load(&sections).unwrap();
        assert!(meta.format_version.is_empty());
        assert!(meta.extra.is_empty());
        assert!(matches!(
            meta.expect(BACKUP_TYPE, FORMAT_VERSION),
            Err(MetaError::InvalidFormatVersion { .. })
        ));
    }

    #[test]
    fn missing_and_malformed() {
        assert!(matches!(Meta::load(&Sections::new()), Err(MetaError::Missing)));
        assert!(matches!(Meta::load(&with_meta(b"{not json")), Err(MetaError::Unmarshal(_))));
    }

    #[test]
    fn wrong_protocol() {
        let mut meta = Meta::new(BACKUP_TYPE, FORMAT_VERSION);
        meta.protocol = "frostpaw-rev6".into();
        let sections = with_meta(&meta.to_bytes().unwrap());
        let err = Meta::parse_and_validate(&sections, PROTOCOL).unwrap_err();
        assert!(matches!(err, MetaError::InvalidProtocol(p) if p == "frostpaw-rev6"));
    }

    #[test]
    fn absent_fields_fail_their_gate() {
        let no_protocol = with_meta(br#"{"c":"2023-05-01T12:00:00Z","v":"a1","t":"backup.server"}"#);
        let err = Meta::parse_and_validate(&no_protocol, PROTOCOL).unwrap_err();
        assert!(matches!(err, MetaError::InvalidProtocol(p) if p.is_empty()));

        let no_type = with_meta(br#"{"c":"2023-05-01T12:00:00Z","p":"frostpaw-rev7","v":"a1"}"#);
        let meta = Meta::parse_and_validate(&no_type, PROTOCOL).unwrap();
        assert!(matches!(meta.expect(BACKUP_TYPE, FORMAT_VERSION), Err(MetaError::InvalidType { .. })));

        let no_created = with_meta(br#"{"p":"frostpaw-rev7","v":"a1","t":"backup.server"}"#);
        let meta = Meta::parse_and_validate(&no_created, PROTOCOL).unwrap();
        assert_eq!(meta.created_at, DateTime::<Utc>::default());
        meta.expect(BACKUP_TYPE, FORMAT_VERSION).unwrap();
    }

    #[test]
    fn wrong_type() {
        let meta = Meta::new("backup.user", FORMAT_VERSION);
        assert!(matches!(meta.expect(BACKUP_TYPE, FORMAT_VERSION), Err(MetaError::InvalidType { .. })));
    }
}
