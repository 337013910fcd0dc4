//! `serenity` gateway handler (spec §4.7): single user-gateway
//! connection, guild enumeration on connect, five tracked event kinds.

use std::sync::Arc;

use chrono::Utc;
use scribe_core::ids;
use scribe_store::{CreateMessageOptions, MessageStore};
use scribe_sync::{EventBus, SyncEvent};
use serenity::async_trait;
use serenity::model::channel::{GuildChannel, Message, Reaction, ReactionType};
use serenity::model::event::MessageUpdateEvent;
use serenity::model::gateway::Ready;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use serenity::model::channel::ChannelType;
use serenity::prelude::{Context, EventHandler};
use tracing::{info, warn};

use crate::content::{self, DiscordMessageData, EmbedData, Placement};

/// Shared counters the handler bumps; the owning [`DiscordSyncService`]
/// reads the same `Arc`s to answer `get_stats()`.
pub struct IngestSink {
    pub store: Arc<MessageStore>,
    pub bus: EventBus,
    pub account_id: tokio::sync::RwLock<String>,
    pub messages_processed: std::sync::atomic::AtomicU64,
    pub errors: std::sync::atomic::AtomicU64,
    pub last_sync: tokio::sync::Mutex<Option<chrono::DateTime<Utc>>>,
    /// Guild count from the most recent `ready` handshake (spec §4.7
    /// "on connect, enumerate guilds to set `guildsProcessed`").
    pub guilds_processed: std::sync::atomic::AtomicU64,
}

impl IngestSink {
    async fn ingest(&self, data: DiscordMessageData) {
        use std::sync::atomic::Ordering;
        let account_id = self.account_id.read().await.clone();
        let Some(input) = content::to_message_input(&account_id, &data) else {
            return; // empty content after assembly, nothing to archive
        };
        match self.store.create_message(input, CreateMessageOptions { skip_thread_update: false }) {
            Ok(message) => {
                self.messages_processed.fetch_add(1, Ordering::SeqCst);
                *self.last_sync.lock().await = Some(Utc::now());
                self.bus.publish(SyncEvent::Message(message));
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::SeqCst);
                warn!(error = %e, "discord: failed to store message");
            }
        }
    }
}

pub struct DiscordHandler {
    pub sink: Arc<IngestSink>,
}

fn placement_for(ctx: &Context, guild_id: Option<GuildId>, channel_id: ChannelId) -> Placement {
    let is_dm = guild_id.is_none();
    let is_thread = guild_id
        .and_then(|gid| ctx.cache.guild(gid))
        .and_then(|guild| guild.channels.get(&channel_id).cloned())
        .map(|ch| matches!(ch.kind, ChannelType::PublicThread | ChannelType::PrivateThread | ChannelType::NewsThread))
        .unwrap_or(false);

    if is_thread {
        Placement::Thread { thread_id: channel_id.get() }
    } else if is_dm {
        Placement::Dm { channel_id: channel_id.get() }
    } else {
        Placement::Channel { channel_id: channel_id.get() }
    }
}

/// Label a reaction for the `reaction:<label>` tag (spec §4.7): the
/// unicode emoji itself, or a custom emoji's name (falling back to its
/// snowflake if somehow unnamed).
fn reaction_label(reaction_type: &ReactionType) -> String {
    match reaction_type {
        ReactionType::Unicode(emoji) => emoji.clone(),
        ReactionType::Custom { name, id, .. } => name.clone().unwrap_or_else(|| id.to_string()),
        other => other.to_string(),
    }
}

fn to_reaction_counts(msg: &Message) -> Vec<(String, u64)> {
    msg.reactions.iter().map(|r| (reaction_label(&r.reaction_type), r.count)).collect()
}

fn to_embed_data(msg: &Message) -> Vec<EmbedData> {
    msg.embeds
        .iter()
        .map(|e| EmbedData {
            title: e.title.clone(),
            description: e.description.clone(),
            fields: e.fields.iter().map(|f| (f.name.clone(), f.value.clone())).collect(),
        })
        .collect()
}

fn message_data(ctx: &Context, msg: &Message) -> DiscordMessageData {
    DiscordMessageData {
        message_id: msg.id.get(),
        guild_id: msg.guild_id.map(|g| g.get()),
        channel_id: msg.channel_id.get(),
        placement: placement_for(ctx, msg.guild_id, msg.channel_id),
        author_id: msg.author.id.get(),
        author_name: msg.author.name.clone(),
        from_self: msg.author.id == ctx.cache.current_user().id,
        created_at: msg.timestamp.unix_timestamp() * 1000,
        content: msg.content.clone(),
        embeds: to_embed_data(msg),
        attachment_urls: msg.attachments.iter().map(|a| a.url.clone()).collect(),
        reaction_counts: to_reaction_counts(msg),
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(name = %ready.user.name, guilds = ready.guilds.len(), "discord: gateway connected");
        let account_id = ids::account_id_discord(&ready.user.id.get().to_string());
        *self.sink.account_id.write().await = account_id;
        self.sink.guilds_processed.store(ready.guilds.len() as u64, std::sync::atomic::Ordering::SeqCst);
    }

    async fn message(&self, ctx: Context, new_message: Message) {
        if new_message.author.bot {
            return;
        }
        self.sink.ingest(message_data(&ctx, &new_message)).await;
    }

    async fn message_update(&self, ctx: Context, _old: Option<Message>, new: Option<Message>, event: MessageUpdateEvent) {
        // Treated as a new message for re-indexing (spec §4.7); if the
        // cache didn't give us the full new message, fetch it.
        let full = match new {
            Some(m) => Some(m),
            None => ctx.http.get_message(event.channel_id, event.id).await.ok(),
        };
        if let Some(msg) = full {
            if !msg.author.bot {
                self.sink.ingest(message_data(&ctx, &msg)).await;
            }
        }
    }

    async fn message_delete(&self, _ctx: Context, channel_id: ChannelId, deleted_message_id: MessageId, _guild_id: Option<GuildId>) {
        // Log-only; deletes do not retract the archived event (spec §3, §4.7).
        info!(channel = %channel_id, message = %deleted_message_id, "discord: message deleted upstream, archive entry retained");
    }

    async fn reaction_add(&self, _ctx: Context, reaction: Reaction) {
        info!(message = %reaction.message_id, emoji = %reaction.emoji, "discord: reaction added");
    }

    async fn reaction_remove(&self, _ctx: Context, reaction: Reaction) {
        info!(message = %reaction.message_id, emoji = %reaction.emoji, "discord: reaction removed");
    }

    async fn thread_create(&self, _ctx: Context, thread: GuildChannel) {
        let thread_id = ids::thread_id_discord_thread(&thread.id.get().to_string());
        let source = scribe_core::ThreadSourceRef {
            platform: scribe_core::Platform::Discord,
            platform_id: Some(thread.id.get().to_string()),
            room_id: thread.parent_id.map(|p| p.get().to_string()),
        };
        if let Err(e) = self.sink.store.get_or_create_thread(&thread_id, scribe_core::ThreadType::Topic, source, Utc::now().timestamp_millis()) {
            warn!(error = %e, "discord: failed to register new thread");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::model::id::EmojiId;

    #[test]
    fn reaction_label_uses_unicode_emoji_directly() {
        assert_eq!(reaction_label(&ReactionType::Unicode("\u{1F44D}".to_string())), "\u{1F44D}");
    }

    #[test]
    fn reaction_label_prefers_custom_emoji_name_over_id() {
        let custom = ReactionType::Custom { animated: false, id: EmojiId::new(42), name: Some("pepehands".to_string()) };
        assert_eq!(reaction_label(&custom), "pepehands");
    }

    #[test]
    fn reaction_label_falls_back_to_id_when_custom_name_missing() {
        let custom = ReactionType::Custom { animated: false, id: EmojiId::new(42), name: None };
        assert_eq!(reaction_label(&custom), "42");
    }
}
