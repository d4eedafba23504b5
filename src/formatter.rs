//! Rewrites normalized message content into plain text that renders
//! meaningfully on the opposite backend.

use std::collections::HashMap;

use regex::Regex;
use std::sync::OnceLock;

use crate::model::{ChannelId, Embed, Message, Poll, RoleId, Sticker};

fn emoji_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<a?:(\w+):\d+>").unwrap())
}

fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<@!?(\d+)>").unwrap())
}

fn role_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<@&(\d+)>").unwrap())
}

fn channel_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https://discord\.com/channels/\d+/(\d+)(?:/(\d+))?").unwrap())
}

fn channel_mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<#(\d+)>").unwrap())
}

/// `<a?:name:id>` -> `:name:`.
pub fn replace_discord_emoji(content: &str) -> String {
    emoji_re().replace_all(content, ":$1:").into_owned()
}

/// `<@id>` -> `@username` from `mentions`; unresolved ids are left as-is.
pub fn replace_mentions(content: &str, mentions: &[crate::model::Mention]) -> String {
    mention_re()
        .replace_all(content, |caps: &regex::Captures| {
            let id: u64 = caps[1].parse().unwrap_or(0);
            match mentions.iter().find(|m| m.id.0 == id) {
                Some(m) => format!("@{}", m.username),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// `<@&id>` -> `@role_name`, or `@unknown_role` if `id` isn't in `roles`.
pub fn replace_roles(content: &str, roles: &HashMap<RoleId, String>) -> String {
    role_re()
        .replace_all(content, |caps: &regex::Captures| {
            let id: u64 = caps[1].parse().unwrap_or(0);
            match roles.get(&RoleId(id)) {
                Some(name) => format!("@{}", name),
                None => "@unknown_role".to_string(),
            }
        })
        .into_owned()
}

/// `https://discord.com/channels/G/C[/M]` -> `<#C>`, with a trailing
/// `>MSG` marker when a message id was present in the URL.
pub fn replace_discord_url(content: &str) -> String {
    channel_url_re()
        .replace_all(content, |caps: &regex::Captures| match caps.get(2) {
            Some(message_id) => format!("<#{}>>{}", &caps[1], message_id.as_str()),
            None => format!("<#{}>", &caps[1]),
        })
        .into_owned()
}

/// `<#id>` -> `#channel_name`, or `@unknown_channel` if unresolved.
///
/// The fallback uses `@`, not `#` -- a literal quirk carried over
/// unchanged, matching the asymmetry with [`replace_roles`].
pub fn replace_channels(content: &str, channels: &HashMap<ChannelId, String>) -> String {
    channel_mention_re()
        .replace_all(content, |caps: &regex::Captures| {
            let id: u64 = caps[1].parse().unwrap_or(0);
            match channels.get(&ChannelId(id)) {
                Some(name) => format!("#{}", name),
                None => "@unknown_channel".to_string(),
            }
        })
        .into_owned()
}

fn rewrite_content(content: &str, mentions: &[crate::model::Mention], roles: &HashMap<RoleId, String>, channels: &HashMap<ChannelId, String>) -> String {
    let content = replace_discord_emoji(content);
    let content = replace_mentions(&content, mentions);
    let content = replace_roles(&content, roles);
    let content = replace_discord_url(&content);
    replace_channels(&content, channels)
}

/// The part of an embed/sticker `type` string before the first `/`.
fn clean_type(embed_type: &str) -> &str {
    embed_type.split('/').next().unwrap_or(embed_type)
}

fn format_poll(poll: &Poll, now_unix: i64) -> String {
    let total: u64 = poll.options.iter().map(|o| o.count).sum();
    let mut out = String::new();
    let status = if poll.expires > now_unix { "ongoing" } else { "ended" };
    out.push_str(&format!("> *Poll ({}):*\n", status));
    out.push_str(&format!("> {}\n", poll.question));
    for option in &poll.options {
        let marker = if option.me_voted { '*' } else { '-' };
        let pct = if total == 0 { 0 } else { ((option.count as f64 / total as f64) * 100.0).round() as u64 };
        out.push_str(&format!(">   {} {} ({} votes, {}%)\n", marker, option.answer, option.count, pct));
    }
    let verb = if status == "ongoing" { "Ends" } else { "Ended" };
    out.push_str(&format!("> {} <t:{}:R>", verb, poll.expires));
    out
}

fn embed_line(embed: &Embed, content_so_far: &str) -> Option<String> {
    let url = embed.url.as_ref()?;
    if embed.hidden || content_so_far.contains(url.as_str()) {
        return None;
    }
    let prefix = clean_type(&embed.embed_type);
    Some(if embed.main_url.is_none() {
        format!("[({} attachment)]({})", prefix, url)
    } else if embed.embed_type == "rich" {
        format!("(rich embed):\n{}", url)
    } else {
        format!("[({} embed)]({})", prefix, url)
    })
}

fn sticker_line(sticker: &Sticker) -> String {
    match sticker.format_type {
        1 => format!("[(png sticker)]({})", sticker.name),
        2 => format!("[(apng sticker)]({})", sticker.name),
        3 => format!("(lottie sticker: {})", sticker.name),
        _ => format!("[(gif sticker)]({})", sticker.name),
    }
}

/// Renders a normalized message's full content, including the interaction
/// prefix, poll override, text rewriting, and appended embed/sticker lines.
/// Returns an empty string if there's nothing to show; callers substitute
/// `*Unknown message content*` in that case.
pub fn build_message(msg: &Message, roles: &HashMap<RoleId, String>, channels: &HashMap<ChannelId, String>, now_unix: i64) -> String {
    let mut out = String::new();

    if let Some(interaction) = &msg.interaction {
        out.push_str(&format!("\u{256d}\u{2500}\u{2500}\u{2919} {} used [{}]\n", interaction.username, interaction.command));
    }

    let body = match &msg.poll {
        Some(poll) => format_poll(poll, now_unix),
        None => rewrite_content(&msg.content, &msg.mentions, roles, channels),
    };
    out.push_str(&body);

    for embed in &msg.embeds {
        if let Some(line) = embed_line(embed, &out) {
            out.push('\n');
            out.push_str(&line);
        }
    }
    for sticker in &msg.stickers {
        out.push('\n');
        out.push_str(&sticker_line(sticker));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mention, PollOption, UserId};

    #[test]
    fn emoji_round_trip() {
        assert_eq!(replace_discord_emoji("x<:foo:123>y"), "x:foo:y");
    }

    #[test]
    fn animated_emoji_round_trip() {
        assert_eq!(replace_discord_emoji("<a:wave:987>"), ":wave:");
    }

    #[test]
    fn mention_resolves_known_user() {
        let mentions = vec![Mention { id: UserId(42), username: "ada".into(), global_name: None }];
        assert_eq!(replace_mentions("<@42>", &mentions), "@ada");
    }

    #[test]
    fn mention_leaves_unknown_id_unchanged() {
        assert_eq!(replace_mentions("<@99>", &[]), "<@99>");
    }

    #[test]
    fn role_falls_back_to_unknown_role() {
        assert_eq!(replace_roles("<@&7>", &HashMap::new()), "@unknown_role");
    }

    #[test]
    fn role_resolves_known_role() {
        let mut roles = HashMap::new();
        roles.insert(RoleId(7), "moderators".to_string());
        assert_eq!(replace_roles("<@&7>", &roles), "@moderators");
    }

    #[test]
    fn channel_url_rewrites_with_message_marker() {
        assert_eq!(replace_discord_url("https://discord.com/channels/1/2/3"), "<#2>>3");
    }

    #[test]
    fn channel_url_without_message_id() {
        assert_eq!(replace_discord_url("https://discord.com/channels/1/2"), "<#2>");
    }

    #[test]
    fn channel_mention_falls_back_with_at_prefix() {
        assert_eq!(replace_channels("<#5>", &HashMap::new()), "@unknown_channel");
    }

    #[test]
    fn poll_with_zero_votes_renders_zero_percent() {
        let poll = Poll {
            question: "Q?".into(),
            options: vec![PollOption { answer: "A".into(), count: 0, me_voted: false }],
            expires: 100,
        };
        let rendered = format_poll(&poll, 0);
        assert!(rendered.contains("(0 votes, 0%)"));
    }

    #[test]
    fn poll_percentages_round_to_nearest() {
        let poll = Poll {
            question: "Q?".into(),
            options: vec![
                PollOption { answer: "A".into(), count: 1, me_voted: true },
                PollOption { answer: "B".into(), count: 3, me_voted: false },
            ],
            expires: 9_999_999_999,
        };
        let rendered = format_poll(&poll, 0);
        assert!(rendered.contains("> *Poll (ongoing):*"));
        assert!(rendered.contains("A (1 votes, 25%)"));
        assert!(rendered.contains("B (3 votes, 75%)"));
        assert!(rendered.contains("Ends <t:9999999999:R>"));
    }

    #[test]
    fn ended_poll_uses_ended_wording() {
        let poll = Poll { question: "Q?".into(), options: vec![], expires: 0 };
        let rendered = format_poll(&poll, 1000);
        assert!(rendered.starts_with("> *Poll (ended):*"));
        assert!(rendered.contains("Ended <t:0:R>"));
    }

    #[test]
    fn empty_message_renders_empty_string() {
        let msg = Message {
            id: crate::model::MessageId(1),
            channel_id: crate::model::ChannelId(1),
            guild_id: None,
            user_id: UserId(1),
            username: "a".into(),
            global_name: None,
            nick: None,
            avatar_id: None,
            content: String::new(),
            mentions: vec![],
            embeds: vec![],
            stickers: vec![],
            poll: None,
            interaction: None,
            referenced_message: None,
        };
        assert_eq!(build_message(&msg, &HashMap::new(), &HashMap::new(), 0), "");
    }

    #[test]
    fn interaction_prefix_uses_the_exact_glyphs() {
        let msg = Message {
            id: crate::model::MessageId(1),
            channel_id: crate::model::ChannelId(1),
            guild_id: None,
            user_id: UserId(1),
            username: "a".into(),
            global_name: None,
            nick: None,
            avatar_id: None,
            content: String::new(),
            mentions: vec![],
            embeds: vec![],
            stickers: vec![],
            poll: None,
            interaction: Some(crate::model::Interaction { username: "ada".into(), command: "ping".into() }),
            referenced_message: None,
        };
        let rendered = build_message(&msg, &HashMap::new(), &HashMap::new(), 0);
        assert!(rendered.starts_with("\u{256d}\u{2500}\u{2500}\u{2919} ada used [ping]\n"));
    }
}
