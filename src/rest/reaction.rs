use crate::model::{ChannelId, EmojiId, MessageId};

use super::RestClient;

fn emoji_path_segment(name: &str, id: Option<EmojiId>) -> String {
    let raw = match id {
        Some(id) => format!("{}:{}", name, id),
        None => name.to_string(),
    };
    urlencoding::encode(&raw).into_owned()
}

/// Reaction extensions for [`RestClient`].
///
/// Not currently called by the bridge engine -- reaction mirroring is
/// unimplemented -- but the wire surface is specified and exercised by
/// tests.
pub trait ReactionExt {
    async fn send_reaction(&self, channel_id: ChannelId, message_id: MessageId, emoji_name: &str, emoji_id: Option<EmojiId>) -> bool;

    async fn remove_reaction(&self, channel_id: ChannelId, message_id: MessageId, emoji_name: &str, emoji_id: Option<EmojiId>) -> bool;
}

impl ReactionExt for RestClient {
    async fn send_reaction(&self, channel_id: ChannelId, message_id: MessageId, emoji_name: &str, emoji_id: Option<EmojiId>) -> bool {
        let emoji = emoji_path_segment(emoji_name, emoji_id);
        let path = format!(
            "/channels/{}/messages/{}/reactions/{}/@me?location=Message&type=0",
            channel_id, message_id, emoji
        );
        matches!(
            self.request(reqwest::Method::PUT, &path).send().await,
            Ok(response) if response.status() == reqwest::StatusCode::NO_CONTENT
        )
    }

    async fn remove_reaction(&self, channel_id: ChannelId, message_id: MessageId, emoji_name: &str, emoji_id: Option<EmojiId>) -> bool {
        let emoji = emoji_path_segment(emoji_name, emoji_id);
        let path = format!(
            "/channels/{}/messages/{}/reactions/{}/0/@me?location=Message&burst=false",
            channel_id, message_id, emoji
        );
        matches!(
            self.request(reqwest::Method::DELETE, &path).send().await,
            Ok(response) if response.status() == reqwest::StatusCode::NO_CONTENT
        )
    }
}
