//! Legacy sections → [`CoreBackupData`].
//!
//! Steps run in a fixed order and stop at the first error.  The only tolerated
//! gaps are a channel without a `messages/<id>` section (or with no usable
//! messages in it) and an unrecognised legacy asset name in the options.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::{ConvertError, Stage};
use crate::schema::{
    BackupMessage, Channel, CoreBackupData, Guild, GuildAsset, Message, OldBackupCreateOpts,
};
use crate::section::{decode_section, SectionError, SectionSource};

use super::{messages_section, BACKUP_OPTS_SECTION, GUILD_SECTION};

/// A converted backup ready to be packaged.
#[derive(Debug, Clone, PartialEq)]
pub struct MigratedBackup {
    pub core:   CoreBackupData,
    /// Requested assets in icon, banner, splash order.
    pub assets: Vec<(GuildAsset, Vec<u8>)>,
}

impl MigratedBackup {
    pub fn message_count(&self) -> usize {
        self.core.channel_allocation.values().sum()
    }
}

pub fn migrate<S: SectionSource + ?Sized>(src: &S) -> Result<MigratedBackup, ConvertError> {
    let old_opts: OldBackupCreateOpts =
        decode_section(src, BACKUP_OPTS_SECTION).map_err(ConvertError::Options)?;
    let options = old_opts.to_new();
    debug!(stage = %Stage::OptionsMigrated, assets = ?options.backup_guild_assets);

    let mut guild: Guild = decode_section(src, GUILD_SECTION).map_err(ConvertError::Guild)?;
    if guild.id.is_empty() {
        return Err(ConvertError::EmptyGuildId);
    }
    debug!(stage = %Stage::GuildValidated, guild = %guild.id);

    let channels: Vec<Channel> = guild
        .channels
        .drain(..)
        .flatten()
        .filter(|c| !c.id.is_empty())
        .collect();
    if channels.is_empty() {
        return Err(ConvertError::NoChannels);
    }
    guild.strip_transient();
    debug!(stage = %Stage::ChannelsValidated, channels = channels.len());

    let mut messages = BTreeMap::new();
    let mut channel_allocation = BTreeMap::new();
    for channel in &channels {
        let Some(kept) = channel_messages(src, &channel.id)? else {
            continue;
        };
        channel_allocation.insert(channel.id.clone(), kept.len());
        messages.insert(channel.id.clone(), kept);
    }
    debug!(stage = %Stage::MessagesMigrated, channels_with_messages = messages.len());

    let mut assets = Vec::new();
    for asset in select_assets(&options.backup_guild_assets)? {
        assets.push((asset, read_asset(src, asset)?));
    }
    debug!(stage = %Stage::AssetsCollected, assets = assets.len());

    Ok(MigratedBackup {
        core: CoreBackupData {
            guild,
            channels,
            messages,
            options,
            channel_allocation,
        },
        assets,
    })
}

/// Messages kept for one channel, or `None` when the channel contributes none.
///
/// A missing section is skipped; a section that fails to decode aborts.
fn channel_messages<S: SectionSource + ?Sized>(
    src: &S,
    channel_id: &str,
) -> Result<Option<Vec<Message>>, ConvertError> {
    let name = messages_section(channel_id);
    let wrappers: Option<Vec<Option<BackupMessage>>> = match decode_section(src, &name) {
        Ok(wrappers) => wrappers,
        Err(SectionError::NotFound(_)) => {
            debug!(channel = channel_id, "no message section, skipping channel");
            return Ok(None);
        }
        Err(source) => {
            return Err(ConvertError::Messages { channel: channel_id.to_owned(), source });
        }
    };

    let kept: Vec<Message> = wrappers
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .filter_map(|wrapper| wrapper.message)
        .map(|mut message| {
            message.strip_attachments();
            message
        })
        .collect();

    if kept.is_empty() {
        debug!(channel = channel_id, "no usable messages, skipping channel");
        return Ok(None);
    }
    Ok(Some(kept))
}

/// Resolve new-style asset keywords.  Any keyword outside icon/banner/splash
/// is an error here, even though the legacy remap drops unknown names.
pub fn select_assets(keywords: &[String]) -> Result<Vec<GuildAsset>, ConvertError> {
    let mut selected = BTreeSet::new();
    for keyword in keywords {
        let asset = GuildAsset::from_keyword(keyword)
            .ok_or_else(|| ConvertError::UnknownAsset(keyword.clone()))?;
        selected.insert(asset);
    }
    Ok(selected.into_iter().collect())
}

fn read_asset<S: SectionSource + ?Sized>(src: &S, asset: GuildAsset) -> Result<Vec<u8>, ConvertError> {
    let section = asset.legacy_section();
    let bytes = src.section(section).ok_or_else(|| ConvertError::AssetMissing {
        section,
        source: SectionError::NotFound(section.to_owned()),
    })?;
    if bytes.is_empty() {
        return Err(ConvertError::AssetEmpty(section));
    }
    Ok(bytes.to_vec())
}
