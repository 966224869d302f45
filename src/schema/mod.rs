//! Record shapes read from legacy sections and written to converted backups.
//!
//! Discord guild, channel and message objects are externally defined; only the
//! fields the conversion depends on are typed, everything else is carried in
//! a [`Record`] untouched.

pub mod backup;
pub mod legacy;
pub mod value;

use serde::{Deserialize, Deserializer, Serialize};

pub use backup::{BackupCreateOpts, CoreBackupData};
pub use legacy::{BackupMessage, OldBackupCreateOpts};
pub use value::{Record, Value};

/// Guild keys that the new schema does not keep on the guild record.
pub const GUILD_TRANSIENT_KEYS: [&str; 4] = ["threads", "members", "presences", "voice_states"];
/// Message key dropped during conversion.
pub const ATTACHMENTS_KEY: &str = "attachments";

/// Deserialize a nil as `T::default()`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Guild / Channel / Message ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Guild {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// Null entries are kept so the caller decides how to treat them.
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<Option<Channel>>,
    #[serde(flatten)]
    pub rest: Record,
}

impl Guild {
    /// Drop the channel list and the member/presence/thread/voice-state data.
    pub fn strip_transient(&mut self) {
        self.channels.clear();
        for key in GUILD_TRANSIENT_KEYS {
            self.rest.remove(key);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(flatten)]
    pub rest: Record,
}

impl Channel {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_owned(), rest: Record::new() }
    }
}

/// An opaque message object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(pub Record);

impl Message {
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn strip_attachments(&mut self) {
        self.0.remove(ATTACHMENTS_KEY);
    }
}

// ── Assets ──────────────────────────────────────────────────────────────────

/// Guild image assets that may accompany a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GuildAsset {
    Icon,
    Banner,
    Splash,
}

impl GuildAsset {
    pub const ALL: [GuildAsset; 3] = [GuildAsset::Icon, GuildAsset::Banner, GuildAsset::Splash];

    /// Name used in new-style options.
    pub fn keyword(self) -> &'static str {
        match self {
            GuildAsset::Icon   => "icon",
            GuildAsset::Banner => "banner",
            GuildAsset::Splash => "splash",
        }
    }

    /// Name used in legacy options.
    pub fn legacy_name(self) -> &'static str {
        match self {
            GuildAsset::Icon   => "guildIcon",
            GuildAsset::Banner => "guildBanner",
            GuildAsset::Splash => "guildSplash",
        }
    }

    /// Section holding the asset in a legacy archive.
    pub fn legacy_section(self) -> &'static str {
        match self {
            GuildAsset::Icon   => "assets/guildIcon",
            GuildAsset::Banner => "assets/guildBanner",
            GuildAsset::Splash => "assets/guildSplash",
        }
    }

    /// Section holding the asset in a converted archive.
    pub fn output_section(self) -> &'static str {
        match self {
            GuildAsset::Icon   => "assets/icon.jpg",
            GuildAsset::Banner => "assets/banner.jpg",
            GuildAsset::Splash => "assets/splash.jpg",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.keyword() == s)
    }

    pub fn from_legacy(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.legacy_name() == s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guild_keeps_unknown_fields() {
        let packed = rmp_serde::to_vec_named(&serde_json::json!({
            "id": "g1",
            "name": "Test Guild",
            "channels": [{ "id": "c1", "name": "general" }, null, { "id": "" }],
            "members": [{ "user": { "id": "u1" } }],
            "voice_states": [],
        }))
        .unwrap();
        let mut guild: Guild = rmp_serde::from_slice(&packed).unwrap();
        assert_eq!(guild.id, "g1");
        assert_eq!(guild.channels.len(), 3);
        assert!(guild.channels[1].is_none());
        assert_eq!(guild.channels[0].as_ref().unwrap().rest["name"], Value::from("general"));

        guild.strip_transient();
        let json = serde_json::to_value(&guild).unwrap();
        assert_eq!(json, serde_json::json!({ "id": "g1", "name": "Test Guild" }));
    }

    #[test]
    fn null_guild_id_is_empty() {
        let packed = rmp_serde::to_vec_named(&serde_json::json!({ "id": null })).unwrap();
        let guild: Guild = rmp_serde::from_slice(&packed).unwrap();
        assert!(guild.id.is_empty());
    }

    #[test]
    fn message_attachments_stripped() {
        let packed = rmp_serde::to_vec_named(&serde_json::json!({
            "id": "m1",
            "content": "hi",
            "attachments": [{ "id": "a1" }],
        }))
        .unwrap();
        let mut msg: Message = rmp_serde::from_slice(&packed).unwrap();
        assert_eq!(msg.id(), Some("m1"));
        msg.strip_attachments();
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            serde_json::json!({ "id": "m1", "content": "hi" })
        );
    }

    #[test]
    fn asset_names() {
        for asset in GuildAsset::ALL {
            assert_eq!(GuildAsset::from_keyword(asset.keyword()), Some(asset));
            assert_eq!(GuildAsset::from_legacy(asset.legacy_name()), Some(asset));
        }
        assert_eq!(GuildAsset::from_keyword("guildIcon"), None);
        assert_eq!(GuildAsset::from_legacy("icon"), None);
    }
}
