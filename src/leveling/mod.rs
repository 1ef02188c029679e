//! Guild leveling on top of the [`DataStore`]
//!
//! The managers read and write user records, settings and ranks through
//! the store. [`Leveling`] ties them together: it turns chat messages
//! into XP, derives events from each change and broadcasts them.

pub mod events;
pub mod leaderboard;
pub mod level;
pub mod ranks;
pub mod record;
pub mod settings;
pub mod total_xp;
pub mod users;
pub mod xp;

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::{Config, LevelingOptions};
use crate::error::StoreResult;
use crate::storage::DataStore;

pub use events::{LevelingEvent, Progress};
pub use leaderboard::LeaderboardEntry;
pub use level::LevelManager;
pub use ranks::{Rank, RanksManager};
pub use record::UserRecord;
pub use settings::{GuildSettings, SettingKey, SettingsManager};
pub use total_xp::TotalXpManager;
pub use users::UserManager;
pub use xp::XpManager;

const EVENT_CAPACITY: usize = 256;

/// A chat message seen by the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub guild_id: String,
    pub user_id: String,
    pub channel_id: String,
}

impl MessageEvent {
    pub fn new(guild_id: impl Into<String>, user_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            user_id: user_id.into(),
            channel_id: channel_id.into(),
        }
    }
}

pub struct Leveling {
    store: Arc<DataStore>,
    events: broadcast::Sender<LevelingEvent>,
    pub users: UserManager,
    pub xp: XpManager,
    pub levels: LevelManager,
    pub total_xp: TotalXpManager,
    pub settings: SettingsManager,
    pub ranks: RanksManager,
}

impl Leveling {
    pub fn new(store: Arc<DataStore>, options: LevelingOptions) -> Self {
        let settings = SettingsManager::new(store.clone(), options);
        let users = UserManager::new(store.clone(), settings.clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            xp: XpManager::new(store.clone(), users.clone()),
            levels: LevelManager::new(users.clone()),
            total_xp: TotalXpManager::new(users.clone()),
            ranks: RanksManager::new(store.clone()),
            settings,
            users,
            events,
            store,
        }
    }

    /// Open and load the configured store
    pub async fn open(config: &Config) -> StoreResult<Self> {
        let store = DataStore::open(config).await?;
        Ok(Self::new(Arc::new(store), config.leveling.clone()))
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.store
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LevelingEvent> {
        self.events.subscribe()
    }

    /// Derive events from `progress`, including ranks crossed on the way
    /// up, and broadcast them
    ///
    /// Having no subscribers is not an error.
    pub fn publish(&self, progress: &Progress) -> StoreResult<Vec<LevelingEvent>> {
        let mut events = progress.events();
        if progress.leveled_up() {
            let reached = self.ranks.reached_between(
                &progress.guild_id,
                progress.previous.level,
                progress.current.level,
            )?;
            events.extend(reached.into_iter().map(|rank| LevelingEvent::RankReached {
                guild_id: progress.guild_id.clone(),
                user_id: progress.user_id.clone(),
                rank,
            }));
        }
        for event in &events {
            if self.events.send(event.clone()).is_err() {
                debug!("no subscribers for leveling event");
            }
        }
        Ok(events)
    }

    /// Grant message XP to the author
    ///
    /// Nothing happens when leveling is disabled for the guild, the user
    /// or channel is ignored, or `filter` rejects the message. The amount
    /// is the guild's `xp` scaled by the guild and user multipliers.
    pub async fn handle_message<F>(&self, event: &MessageEvent, filter: F) -> StoreResult<Vec<LevelingEvent>>
    where
        F: FnOnce(&MessageEvent) -> bool,
    {
        let settings = self.settings.get(&event.guild_id)?;
        if !settings.status
            || settings.ignored_users.contains(&event.user_id)
            || settings.ignored_channels.contains(&event.channel_id)
            || !filter(event)
        {
            return Ok(Vec::new());
        }

        let (record, _) = self.users.get_or_create(&event.guild_id, &event.user_id).await?;
        let amount = (settings.xp as f64 * settings.multiplier * record.multiplier).round();
        if amount < 1.0 {
            return Ok(Vec::new());
        }

        let progress = self
            .xp
            .add(&event.guild_id, &event.user_id, amount as u64)
            .await?;
        if progress.leveled_up() {
            info!(
                "{} reached level {} in guild {}",
                event.user_id, progress.current.level, event.guild_id
            );
        }
        self.publish(&progress)
    }

    /// Users of a guild ordered by level then lifetime XP
    pub fn leaderboard(&self, guild_id: &str, limit: Option<usize>) -> StoreResult<Vec<LeaderboardEntry>> {
        Ok(leaderboard::rank(self.users.list(guild_id)?, limit))
    }

    /// Delete a user's record
    pub async fn reset_user(&self, guild_id: &str, user_id: &str) -> StoreResult<bool> {
        Ok(!self.users.reset(guild_id, user_id).await?.previous.is_null())
    }

    /// Delete everything stored for a guild, settings and ranks included
    pub async fn reset_guild(&self, guild_id: &str) -> StoreResult<bool> {
        record::validate_id("guild", guild_id)?;
        Ok(!self.store.delete(guild_id).await?.previous.is_null())
    }
}
