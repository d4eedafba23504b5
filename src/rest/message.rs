use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::CheckStatus;
use crate::model::{ChannelId, GuildId, Message, MessageId};

use super::{generate_nonce, RestClient};

/// Which page of a channel's message history to fetch.
pub enum GetMessages {
    MostRecent,
    Before(MessageId),
    After(MessageId),
    Around(MessageId),
}

#[derive(Debug, Deserialize)]
struct MessageCreated {
    id: MessageId,
}

/// Message-sending and -history extensions for [`RestClient`].
pub trait MessageExt {
    async fn get_messages(&self, channel_id: ChannelId, limit: u16, query: GetMessages) -> Option<Vec<Message>>;

    #[allow(clippy::too_many_arguments)]
    async fn send_message(
        &self,
        channel_id: ChannelId,
        content: &str,
        embeds: &[Value],
        reply_id: Option<MessageId>,
        reply_channel_id: Option<ChannelId>,
        reply_guild_id: Option<GuildId>,
        reply_ping: bool,
    ) -> Option<MessageId>;

    async fn send_update_message(&self, channel_id: ChannelId, message_id: MessageId, content: &str, embeds: &[Value]) -> bool;

    async fn send_delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Option<bool>;
}

impl MessageExt for RestClient {
    async fn get_messages(&self, channel_id: ChannelId, limit: u16, query: GetMessages) -> Option<Vec<Message>> {
        let mut path = format!("/channels/{}/messages?limit={}", channel_id, limit);
        match query {
            GetMessages::MostRecent => {}
            GetMessages::Before(id) => path.push_str(&format!("&before={}", id)),
            GetMessages::After(id) => path.push_str(&format!("&after={}", id)),
            GetMessages::Around(id) => path.push_str(&format!("&around={}", id)),
        }

        let response = self.request(reqwest::Method::GET, &path).send().await.check_status().await.ok()?;
        response.json().await.ok()
    }

    async fn send_message(
        &self,
        channel_id: ChannelId,
        content: &str,
        embeds: &[Value],
        reply_id: Option<MessageId>,
        reply_channel_id: Option<ChannelId>,
        reply_guild_id: Option<GuildId>,
        reply_ping: bool,
    ) -> Option<MessageId> {
        let mut body = json!({
            "content": content,
            "embeds": embeds,
            "nonce": generate_nonce().to_string(),
        });

        if let Some(reply_id) = reply_id {
            body["message_reference"] = json!({
                "message_id": reply_id,
                "channel_id": reply_channel_id,
                "guild_id": reply_guild_id,
            });
            if !reply_ping {
                body["allowed_mentions"] = json!({ "parse": ["users", "roles", "everyone"], "replied_user": false });
            }
        }

        let response = self
            .request(reqwest::Method::POST, &format!("/channels/{}/messages", channel_id))
            .json(&body)
            .send()
            .await
            .check_status()
            .await
            .ok()?;
        let created: MessageCreated = response.json().await.ok()?;
        Some(created.id)
    }

    async fn send_update_message(&self, channel_id: ChannelId, message_id: MessageId, content: &str, embeds: &[Value]) -> bool {
        let body = json!({ "content": content, "embeds": embeds });
        let path = format!("/channels/{}/messages/{}", channel_id, message_id);
        matches!(
            self.request(reqwest::Method::PATCH, &path).json(&body).send().await,
            Ok(response) if response.status() == reqwest::StatusCode::OK
        )
    }

    async fn send_delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Option<bool> {
        let path = format!("/channels/{}/messages/{}", channel_id, message_id);
        let response = self.request(reqwest::Method::DELETE, &path).send().await.ok()?;
        Some(response.status() == reqwest::StatusCode::NO_CONTENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn before_after_around_absent_means_only_limit_in_query() {
        let channel_id = ChannelId(1);
        let path = format!("/channels/{}/messages?limit={}", channel_id, 50);
        assert_eq!(path, "/channels/1/messages?limit=50");
    }

    #[test]
    fn before_appends_query_param() {
        let channel_id = ChannelId(1);
        let mut path = format!("/channels/{}/messages?limit={}", channel_id, 50);
        path.push_str(&format!("&before={}", MessageId(5)));
        assert_eq!(path, "/channels/1/messages?limit=50&before=5");
    }
}
