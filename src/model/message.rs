use serde::Deserialize;

use super::{ChannelId, EmojiId, GuildId, MessageId, UserId};

/// A user mention embedded in a message's `mentions` array.
#[derive(Debug, Clone, Deserialize)]
pub struct Mention {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
}

/// An embed as carried on a message, reduced to the fields the formatter
/// and the author-framed relay embed care about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Embed {
    /// Present unless the embed is a bare attachment link.
    #[serde(default)]
    pub main_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "type", default)]
    pub embed_type: String,
    #[serde(default)]
    pub hidden: bool,
}

/// A sticker attached to a message.
#[derive(Debug, Clone, Deserialize)]
pub struct Sticker {
    pub name: String,
    pub format_type: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollOption {
    pub answer: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub me_voted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Poll {
    pub question: String,
    pub options: Vec<PollOption>,
    /// Unix timestamp (seconds) the poll closes.
    pub expires: i64,
}

/// Present when the message is a slash-command invocation echo.
#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    pub username: String,
    pub command: String,
}

/// A normalized chat message, as produced by gateway event decoding and
/// consumed by the formatter and the relay loops.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    #[serde(default)]
    pub guild_id: Option<GuildId>,

    pub user_id: UserId,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub avatar_id: Option<String>,

    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub mentions: Vec<Mention>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub stickers: Vec<Sticker>,
    #[serde(default)]
    pub poll: Option<Poll>,
    #[serde(default)]
    pub interaction: Option<Interaction>,
    #[serde(default)]
    pub referenced_message: Option<Box<Message>>,
}

impl Message {
    /// `nick → global_name → username → "Unknown"`, per the author display
    /// fallback chain.
    pub fn author_display_name(&self) -> &str {
        self.nick
            .as_deref()
            .or(self.global_name.as_deref())
            .unwrap_or_else(|| {
                if self.username.is_empty() {
                    "Unknown"
                } else {
                    self.username.as_str()
                }
            })
    }

    /// `https://<cdn>/avatars/<user_id>/<avatar_id>.webp?size=80`, or `None`
    /// if the author has no avatar set.
    pub fn avatar_url(&self, cdn_host: &str) -> Option<String> {
        self.avatar_id.as_ref().map(|avatar_id| {
            format!(
                "https://{}/avatars/{}/{}.webp?size=80",
                cdn_host, self.user_id, avatar_id
            )
        })
    }

    /// Whether any mention in this message targets `user_id` — used to
    /// decide `reply_ping` for messages that reference this one.
    pub fn mentions_user(&self, user_id: UserId) -> bool {
        self.mentions.iter().any(|m| m.id == user_id)
    }
}

/// A `MESSAGE_DELETE` event payload.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDelete {
    pub id: MessageId,
    pub channel_id: ChannelId,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
}

/// A normalized reaction event (`MESSAGE_REACTION_ADD`/`_REMOVE`).
#[derive(Debug, Clone, Deserialize)]
pub struct Reaction {
    pub id: MessageId,
    pub channel_id: ChannelId,
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    pub user_id: UserId,
    pub emoji: String,
    #[serde(default)]
    pub emoji_id: Option<EmojiId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(nick: Option<&str>, global: Option<&str>, username: &str) -> Message {
        Message {
            id: MessageId(1),
            channel_id: ChannelId(1),
            guild_id: None,
            user_id: UserId(1),
            username: username.to_string(),
            global_name: global.map(String::from),
            nick: nick.map(String::from),
            avatar_id: None,
            content: String::new(),
            mentions: vec![],
            embeds: vec![],
            stickers: vec![],
            poll: None,
            interaction: None,
            referenced_message: None,
        }
    }

    #[test]
    fn author_display_name_prefers_nick() {
        let m = msg(Some("nicky"), Some("Global"), "user");
        assert_eq!(m.author_display_name(), "nicky");
    }

    #[test]
    fn author_display_name_falls_back_to_global_name() {
        let m = msg(None, Some("Global"), "user");
        assert_eq!(m.author_display_name(), "Global");
    }

    #[test]
    fn author_display_name_falls_back_to_username() {
        let m = msg(None, None, "user");
        assert_eq!(m.author_display_name(), "user");
    }

    #[test]
    fn avatar_url_is_none_without_avatar_id() {
        let m = msg(None, None, "user");
        assert_eq!(m.avatar_url("cdn.example.com"), None);
    }

    #[test]
    fn avatar_url_formats_webp_at_size_80() {
        let mut m = msg(None, None, "user");
        m.avatar_id = Some("abc123".to_string());
        assert_eq!(
            m.avatar_url("cdn.example.com").unwrap(),
            "https://cdn.example.com/avatars/1/abc123.webp?size=80"
        );
    }
}
