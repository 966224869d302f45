//! Record shapes of the converted backup (`core.json.gz`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Channel, Guild, Message};

/// Options a backup was created with, in the new naming.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupCreateOpts {
    pub channels:            Vec<String>,
    pub per_channel:         i64,
    pub max_messages:        i64,
    pub backup_messages:     bool,
    /// `icon`, `banner`, `splash`.
    pub backup_guild_assets: Vec<String>,
    pub special_allocations: BTreeMap<String, i64>,
}

/// The single record carried by a converted backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreBackupData {
    pub guild:              Guild,
    pub channels:           Vec<Channel>,
    pub messages:           BTreeMap<String, Vec<Message>>,
    pub options:            BackupCreateOpts,
    /// Channel id → number of messages kept for that channel.
    pub channel_allocation: BTreeMap<String, usize>,
}
