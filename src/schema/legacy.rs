//! Record shapes stored in legacy (`frostpaw-rev7`, `a1`) backups.
//!
//! Legacy options were written with Go field names as keys; the camelCase
//! spelling is accepted too.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::backup::BackupCreateOpts;
use super::{null_as_default, GuildAsset, Message};

/// Options a legacy backup was created with (`backup_opts` section).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OldBackupCreateOpts {
    /// Channels to back up messages from.
    #[serde(rename = "Channels", alias = "channels", default, deserialize_with = "null_as_default")]
    pub channels: Vec<String>,
    #[serde(rename = "PerChannel", alias = "perChannel", default)]
    pub per_channel: i64,
    #[serde(rename = "MaxMessages", alias = "maxMessages", default)]
    pub max_messages: i64,
    #[serde(rename = "BackupMessages", alias = "backupMessages", default)]
    pub backup_messages: bool,
    /// `guildIcon`, `guildBanner`, `guildSplash`.
    #[serde(rename = "BackupGuildAssets", alias = "backupGuildAssets", default, deserialize_with = "null_as_default")]
    pub backup_guild_assets: Vec<String>,
    #[serde(rename = "IgnoreMessageBackupErrors", alias = "ignoreMessageBackupErrors", default)]
    pub ignore_message_backup_errors: bool,
    #[serde(rename = "RolloverLeftovers", alias = "rolloverLeftovers", default)]
    pub rollover_leftovers: bool,
    /// Per-channel overrides of `per_channel`.
    #[serde(rename = "SpecialAllocations", alias = "specialAllocations", default, deserialize_with = "null_as_default")]
    pub special_allocations: BTreeMap<String, i64>,
}

impl OldBackupCreateOpts {
    /// Map onto the new options shape.
    ///
    /// Legacy asset names are renamed; anything unrecognised is dropped here
    /// without error.  The ignore-errors and rollover flags have no
    /// counterpart in the new shape.
    pub fn to_new(&self) -> BackupCreateOpts {
        let backup_guild_assets = self
            .backup_guild_assets
            .iter()
            .filter_map(|name| GuildAsset::from_legacy(name))
            .map(|asset| asset.keyword().to_owned())
            .collect();

        BackupCreateOpts {
            channels:            self.channels.clone(),
            per_channel:         self.per_channel,
            max_messages:        self.max_messages,
            backup_messages:     self.backup_messages,
            backup_guild_assets,
            special_allocations: self.special_allocations.clone(),
        }
    }
}

/// One entry of a `messages/<channelId>` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupMessage {
    #[serde(default)]
    pub message: Option<Message>,
}
