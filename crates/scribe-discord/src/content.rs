//! Pure message translation, decoupled from `serenity`'s types so the
//! assembly rules are unit-testable without a gateway connection (spec
//! §4.7).

use scribe_core::ids;
use scribe_core::types::{tag_keys, DIRECTION_INCOMING, DIRECTION_OUTGOING};
use scribe_core::{AuthorRef, MessageInput, MessageKind, MessageRefs, Platform, SourceRef};

#[derive(Debug, Clone, Default)]
pub struct EmbedData {
    pub title: Option<String>,
    pub description: Option<String>,
    pub fields: Vec<(String, String)>,
}

impl EmbedData {
    fn flatten(&self) -> String {
        let mut parts = Vec::new();
        if let Some(t) = &self.title {
            parts.push(t.clone());
        }
        if let Some(d) = &self.description {
            parts.push(d.clone());
        }
        for (name, value) in &self.fields {
            parts.push(format!("{name}: {value}"));
        }
        parts.join("\n")
    }
}

/// Where the message's thread ID comes from (spec §4.7's three-way
/// selection order).
#[derive(Debug, Clone, Copy)]
pub enum Placement {
    Thread { thread_id: u64 },
    Dm { channel_id: u64 },
    Channel { channel_id: u64 },
}

#[derive(Debug, Clone)]
pub struct DiscordMessageData {
    pub message_id: u64,
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub placement: Placement,
    pub author_id: u64,
    pub author_name: String,
    pub from_self: bool,
    pub created_at: i64,
    pub content: String,
    pub embeds: Vec<EmbedData>,
    pub attachment_urls: Vec<String>,
    pub reaction_counts: Vec<(String, u64)>,
}

fn thread_id_for(placement: Placement) -> String {
    match placement {
        Placement::Thread { thread_id } => ids::thread_id_discord_thread(&thread_id.to_string()),
        Placement::Dm { channel_id } => ids::thread_id_discord_dm(&channel_id.to_string()),
        Placement::Channel { channel_id } => ids::thread_id_discord_channel(&channel_id.to_string()),
    }
}

/// Assemble body content: raw text, else first embed's flattened
/// title+description+fields, else attachment links (spec §4.7).
/// Returns `None` if all three are empty — the message is dropped.
fn assemble_content(data: &DiscordMessageData) -> Option<String> {
    if !data.content.is_empty() {
        return Some(data.content.clone());
    }
    if let Some(embed) = data.embeds.first() {
        let flattened = embed.flatten();
        if !flattened.is_empty() {
            return Some(flattened);
        }
    }
    if !data.attachment_urls.is_empty() {
        return Some(data.attachment_urls.join("\n"));
    }
    None
}

/// Canonical web URL for a message (spec §4.7).
pub fn message_url(data: &DiscordMessageData) -> String {
    let guild_segment = data.guild_id.map(|g| g.to_string()).unwrap_or_else(|| "@me".to_string());
    format!("https://discord.com/channels/{guild_segment}/{}/{}", data.channel_id, data.message_id)
}

pub fn to_message_input(account_id: &str, data: &DiscordMessageData) -> Option<MessageInput> {
    let content = assemble_content(data)?;

    let author = if data.from_self {
        AuthorRef { name: Some("Me".to_string()), handle: Some(data.author_id.to_string()), did: None }
    } else {
        AuthorRef { name: Some(data.author_name.clone()), handle: Some(data.author_id.to_string()), did: None }
    };

    let mut tags = vec![(
        tag_keys::DIRECTION.to_string(),
        if data.from_self { DIRECTION_OUTGOING } else { DIRECTION_INCOMING }.to_string(),
    )];
    for (emoji, count) in &data.reaction_counts {
        tags.push((format!("reaction:{emoji}"), count.to_string()));
    }

    Some(MessageInput {
        kind: MessageKind::Discord,
        account_id: account_id.to_string(),
        author,
        created_at: data.created_at,
        content,
        title: None,
        visibility: None,
        refs: MessageRefs { thread_id: Some(thread_id_for(data.placement)), ..Default::default() },
        source: SourceRef {
            platform: Platform::Discord,
            platform_id: Some(data.message_id.to_string()),
            url: Some(message_url(data)),
            ..Default::default()
        },
        tags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(content: &str) -> DiscordMessageData {
        DiscordMessageData {
            message_id: 1,
            guild_id: Some(42),
            channel_id: 7,
            placement: Placement::Channel { channel_id: 7 },
            author_id: 99,
            author_name: "alice".to_string(),
            from_self: false,
            created_at: 1_700_000_000_000,
            content: content.to_string(),
            embeds: Vec::new(),
            attachment_urls: Vec::new(),
            reaction_counts: Vec::new(),
        }
    }

    #[test]
    fn raw_text_wins_over_embed_and_attachments() {
        let mut data = base("hello");
        data.embeds.push(EmbedData { title: Some("t".into()), ..Default::default() });
        let input = to_message_input("disc_acct", &data).unwrap();
        assert_eq!(input.content, "hello");
    }

    #[test]
    fn embed_used_when_text_empty() {
        let mut data = base("");
        data.embeds.push(EmbedData {
            title: Some("Release Notes".to_string()),
            description: Some("v1.2.3".to_string()),
            fields: vec![("Breaking".to_string(), "none".to_string())],
        });
        let input = to_message_input("disc_acct", &data).unwrap();
        assert!(input.content.contains("Release Notes"));
        assert!(input.content.contains("v1.2.3"));
        assert!(input.content.contains("Breaking: none"));
    }

    #[test]
    fn attachment_links_used_as_last_resort() {
        let mut data = base("");
        data.attachment_urls.push("https://cdn.discord.com/a.png".to_string());
        let input = to_message_input("disc_acct", &data).unwrap();
        assert_eq!(input.content, "https://cdn.discord.com/a.png");
    }

    #[test]
    fn fully_empty_message_is_dropped() {
        assert!(to_message_input("disc_acct", &base("")).is_none());
    }

    #[test]
    fn thread_id_selection_order() {
        let mut data = base("hi");
        data.placement = Placement::Thread { thread_id: 55 };
        assert_eq!(to_message_input("a", &data).unwrap().refs.thread_id.unwrap(), "discord_thread_55");

        data.placement = Placement::Dm { channel_id: 7 };
        assert_eq!(to_message_input("a", &data).unwrap().refs.thread_id.unwrap(), "discord_dm_7");

        data.placement = Placement::Channel { channel_id: 7 };
        assert_eq!(to_message_input("a", &data).unwrap().refs.thread_id.unwrap(), "discord_channel_7");
    }

    #[test]
    fn message_url_uses_at_me_for_dms() {
        let mut data = base("hi");
        data.guild_id = None;
        assert_eq!(message_url(&data), "https://discord.com/channels/@me/7/1");
    }

    #[test]
    fn message_url_uses_guild_id_for_guild_messages() {
        let data = base("hi");
        assert_eq!(message_url(&data), "https://discord.com/channels/42/7/1");
    }
}
