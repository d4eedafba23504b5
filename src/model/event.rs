use serde::Deserialize;
use serde_json::Value;

use crate::serial::Eq;

use super::{ChannelId, EmojiId, GuildId, Message, MessageDelete, MessageId, Reaction, UserId};

/// The decoded contents of a `HELLO` (op 10) frame.
#[derive(Debug, Clone, Deserialize)]
pub struct HelloPayload {
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
}

fn default_heartbeat_interval() -> u64 {
    41_250
}

/// A frame received from the gateway, discriminated by its `op` field.
///
/// Mirrors the wire protocol directly; [`Event`] is the normalized shape the
/// rest of the bridge actually operates on.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ReceivedMessage {
    Dispatch {
        #[serde(rename = "op")]
        _op: Eq<0>,
        t: String,
        s: u64,
        d: Value,
    },
    Heartbeat {
        #[serde(rename = "op")]
        _op: Eq<1>,
    },
    Reconnect {
        #[serde(rename = "op")]
        _op: Eq<7>,
    },
    InvalidSession {
        #[serde(rename = "op")]
        _op: Eq<9>,
        #[serde(default)]
        d: bool,
    },
    Hello {
        #[serde(rename = "op")]
        _op: Eq<10>,
        d: HelloPayload,
    },
    HeartbeatAck {
        #[serde(rename = "op")]
        _op: Eq<11>,
    },
}

/// The normalized event shape placed in a gateway's event buffer.
#[derive(Debug, Clone)]
pub enum Event {
    MessageCreate(Message),
    MessageUpdate(Message),
    MessageDelete(MessageDelete),
    ReactionAdd(Reaction),
    ReactionRemove(Reaction),
    Ready {
        session_id: String,
        resume_gateway_url: Option<String>,
        user_id: UserId,
    },
    Resumed,
}

#[derive(Debug, Deserialize)]
struct RawReactionUser {
    id: UserId,
}

#[derive(Debug, Deserialize)]
struct RawReactionMember {
    user: RawReactionUser,
}

#[derive(Debug, Deserialize)]
struct RawEmoji {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    id: Option<EmojiId>,
}

/// `MESSAGE_REACTION_ADD`/`MESSAGE_REACTION_REMOVE` payload, tolerant of
/// both the Discord shape (`member.user.id`) and the Spacebar shape
/// (top-level `user_id`).
#[derive(Debug, Deserialize)]
struct RawReaction {
    message_id: MessageId,
    channel_id: ChannelId,
    #[serde(default)]
    guild_id: Option<GuildId>,
    #[serde(default)]
    user_id: Option<UserId>,
    #[serde(default)]
    member: Option<RawReactionMember>,
    emoji: RawEmoji,
}

impl RawReaction {
    fn into_reaction(self) -> Option<Reaction> {
        let user_id = self.member.map(|m| m.user.id).or(self.user_id)?;
        Some(Reaction {
            id: self.message_id,
            channel_id: self.channel_id,
            guild_id: self.guild_id,
            user_id,
            emoji: self.emoji.name.unwrap_or_default(),
            emoji_id: self.emoji.id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawReactionAddMany {
    message_id: MessageId,
    channel_id: ChannelId,
    #[serde(default)]
    guild_id: Option<GuildId>,
    users: Vec<UserId>,
    emoji: RawEmoji,
}

#[derive(Debug, Deserialize)]
struct RawReady {
    session_id: String,
    #[serde(default)]
    resume_gateway_url: Option<String>,
    user: RawReadyUser,
}

#[derive(Debug, Deserialize)]
struct RawReadyUser {
    id: UserId,
}

/// Normalizes a dispatch (`t`, `d`) pair into zero or more [`Event`]s.
/// `MESSAGE_REACTION_ADD_MANY` fans out into one `ReactionAdd` per user.
/// Unrecognized event types decode to an empty vec; the caller logs and
/// moves on rather than treating this as a protocol error.
pub fn decode_dispatch(event_type: &str, data: Value) -> Vec<Event> {
    let event = match event_type {
        "READY" => serde_json::from_value::<RawReady>(data).ok().map(|r| Event::Ready {
            session_id: r.session_id,
            resume_gateway_url: r.resume_gateway_url,
            user_id: r.user.id,
        }),
        "RESUMED" => Some(Event::Resumed),
        "MESSAGE_CREATE" => serde_json::from_value::<Message>(data).ok().map(Event::MessageCreate),
        "MESSAGE_UPDATE" => serde_json::from_value::<Message>(data).ok().map(Event::MessageUpdate),
        "MESSAGE_DELETE" => serde_json::from_value::<MessageDelete>(data).ok().map(Event::MessageDelete),
        "MESSAGE_REACTION_ADD" => serde_json::from_value::<RawReaction>(data)
            .ok()
            .and_then(RawReaction::into_reaction)
            .map(Event::ReactionAdd),
        "MESSAGE_REACTION_REMOVE" => serde_json::from_value::<RawReaction>(data)
            .ok()
            .and_then(RawReaction::into_reaction)
            .map(Event::ReactionRemove),
        "MESSAGE_REACTION_ADD_MANY" => {
            return serde_json::from_value::<RawReactionAddMany>(data)
                .map(|many| {
                    many.users
                        .into_iter()
                        .map(|user_id| {
                            Event::ReactionAdd(Reaction {
                                id: many.message_id,
                                channel_id: many.channel_id,
                                guild_id: many.guild_id,
                                user_id,
                                emoji: many.emoji.name.clone().unwrap_or_default(),
                                emoji_id: many.emoji.id,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
        }
        _ => None,
    };
    event.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hello_frame_decodes() {
        let frame: ReceivedMessage = serde_json::from_value(json!({
            "op": 10,
            "d": {"heartbeat_interval": 41250}
        }))
        .unwrap();
        match frame {
            ReceivedMessage::Hello { d, .. } => assert_eq!(d.heartbeat_interval, 41250),
            _ => panic!("expected Hello"),
        }
    }

    #[test]
    fn reaction_add_many_fans_out_per_user() {
        let events = decode_dispatch(
            "MESSAGE_REACTION_ADD_MANY",
            json!({
                "message_id": "1",
                "channel_id": "2",
                "users": ["10", "11"],
                "emoji": {"name": "👍"}
            }),
        );
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, Event::ReactionAdd(_))));
    }

    #[test]
    fn reaction_add_prefers_member_user_over_top_level_user_id() {
        let events = decode_dispatch(
            "MESSAGE_REACTION_ADD",
            json!({
                "message_id": "1",
                "channel_id": "2",
                "user_id": "999",
                "member": {"user": {"id": "5"}},
                "emoji": {"name": "👍"}
            }),
        );
        match &events[0] {
            Event::ReactionAdd(r) => assert_eq!(r.user_id, UserId(5)),
            _ => panic!("expected ReactionAdd"),
        }
    }

    #[test]
    fn reaction_add_falls_back_to_top_level_user_id() {
        let events = decode_dispatch(
            "MESSAGE_REACTION_ADD",
            json!({
                "message_id": "1",
                "channel_id": "2",
                "user_id": "999",
                "emoji": {"name": "👍"}
            }),
        );
        match &events[0] {
            Event::ReactionAdd(r) => assert_eq!(r.user_id, UserId(999)),
            _ => panic!("expected ReactionAdd"),
        }
    }

    #[test]
    fn unknown_event_type_decodes_to_nothing() {
        assert!(decode_dispatch("SOME_FUTURE_EVENT", json!({})).is_empty());
    }
}
