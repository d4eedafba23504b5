//! The bridge engine: two symmetric relay loops, one per direction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::formatter::build_message;
use crate::gateway::GatewaySession;
use crate::model::{ChannelId, Event, GuildId, Message, MessageDelete, MessageId, UserId};
use crate::pairstore::{pair_id, PairStore};
use crate::rest::{MessageExt, RestClient};

const UNKNOWN_CONTENT: &str = "*Unknown message content*";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Everything one relay direction `X -> Y` needs: X's gateway and pair
/// store, Y's REST client and pair store (the latter only ever read, for
/// cross-side reply resolution), and the configured channel mapping.
pub struct RelayDirection {
    pub name: &'static str,
    pub source_gateway: Arc<GatewaySession>,
    pub source_cdn_host: String,
    pub source_pair_store: PairStore,
    pub target_rest: RestClient,
    pub target_pair_store: PairStore,
    pub target_guild_id: Option<GuildId>,
    pub channel_map: HashMap<ChannelId, ChannelId>,
}

/// Runs both relay loops until `run` is cleared, returning when both have
/// exited (either from a fatal gateway error or cancellation).
pub async fn run(a_to_b: RelayDirection, b_to_a: RelayDirection, run: Arc<AtomicBool>) {
    let run_a = run.clone();
    let run_b = run.clone();
    let (ra, rb) = tokio::join!(
        tokio::spawn(relay_loop(a_to_b, run_a)),
        tokio::spawn(relay_loop(b_to_a, run_b)),
    );
    if let Err(e) = ra {
        tracing::error!(error = %e, "relay loop A->B panicked");
    }
    if let Err(e) = rb {
        tracing::error!(error = %e, "relay loop B->A panicked");
    }
}

async fn relay_loop(dir: RelayDirection, run: Arc<AtomicBool>) {
    while run.load(Ordering::SeqCst) {
        while let Some(event) = dir.source_gateway.poll_event().await {
            handle_event(&dir, event).await;
        }

        if let Some(reason) = dir.source_gateway.fatal_error().await {
            tracing::error!(direction = dir.name, reason, "gateway reported a fatal error, stopping bridge");
            run.store(false, Ordering::SeqCst);
            return;
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn handle_event(dir: &RelayDirection, event: Event) {
    let my_id = dir.source_gateway.my_id().await;

    match event {
        Event::MessageCreate(msg) => {
            if should_skip(dir, msg.channel_id, msg.user_id, my_id) {
                return;
            }
            relay_create(dir, &msg).await;
        }
        Event::MessageUpdate(msg) => {
            if should_skip(dir, msg.channel_id, msg.user_id, my_id) {
                return;
            }
            relay_update(dir, &msg).await;
        }
        Event::MessageDelete(del) => {
            if !dir.channel_map.contains_key(&del.channel_id) {
                return;
            }
            relay_delete(dir, &del).await;
        }
        // Reaction mirroring is unimplemented; see the design notes.
        Event::ReactionAdd(_) | Event::ReactionRemove(_) => {}
        Event::Ready { .. } | Event::Resumed => {}
    }
}

fn should_skip(dir: &RelayDirection, channel_id: ChannelId, user_id: UserId, my_id: Option<UserId>) -> bool {
    if !is_bridged_channel(&dir.channel_map, channel_id) {
        tracing::warn!(direction = dir.name, %channel_id, "event in a channel with no configured pair");
        return true;
    }
    is_echo(user_id, my_id)
}

fn is_bridged_channel(channel_map: &HashMap<ChannelId, ChannelId>, channel_id: ChannelId) -> bool {
    channel_map.contains_key(&channel_id)
}

/// No self-echo: an event authored by the bridge bot itself is never
/// re-mirrored, which is what breaks the A->B->A loop.
fn is_echo(user_id: UserId, my_id: Option<UserId>) -> bool {
    my_id == Some(user_id)
}

struct ReplyTarget {
    message_id: MessageId,
    ping: bool,
}

async fn resolve_reply(dir: &RelayDirection, msg: &Message, src_channel: ChannelId, tgt_channel: ChannelId, my_id: Option<UserId>) -> Option<ReplyTarget> {
    let referenced = msg.referenced_message.as_ref()?;
    let ping = my_id.is_some_and(|id| referenced.mentions_user(id));

    let resolved = if my_id == Some(referenced.user_id) {
        // The replied-to message is itself a mirror this side authored;
        // the other direction's table knows what it originated from.
        let reverse_pair = pair_id(tgt_channel, src_channel);
        dir.target_pair_store.get_source(&reverse_pair, &referenced.id.to_string()).await
    } else {
        let forward_pair = pair_id(src_channel, tgt_channel);
        dir.source_pair_store.get_target(&forward_pair, &referenced.id.to_string()).await
    }?;

    resolved.parse::<u64>().ok().map(|id| ReplyTarget { message_id: MessageId(id), ping })
}

fn author_embed(msg: &Message, cdn_host: &str) -> Value {
    let description = build_message(msg, &HashMap::new(), &HashMap::new(), chrono::Utc::now().timestamp());
    let description = if description.is_empty() { UNKNOWN_CONTENT.to_string() } else { description };

    let mut author = json!({ "name": msg.author_display_name() });
    if let Some(icon_url) = msg.avatar_url(cdn_host) {
        author["icon_url"] = Value::String(icon_url);
    }

    json!({ "type": "rich", "author": author, "description": description })
}

async fn relay_create(dir: &RelayDirection, msg: &Message) {
    let src_channel = msg.channel_id;
    let Some(&tgt_channel) = dir.channel_map.get(&src_channel) else { return };
    let my_id = dir.source_gateway.my_id().await;

    let reply = resolve_reply(dir, msg, src_channel, tgt_channel, my_id).await;
    let embed = author_embed(msg, &dir.source_cdn_host);

    let target_id = dir
        .target_rest
        .send_message(
            tgt_channel,
            "",
            std::slice::from_ref(&embed),
            reply.as_ref().map(|r| r.message_id),
            Some(tgt_channel),
            dir.target_guild_id,
            reply.as_ref().map_or(true, |r| r.ping),
        )
        .await;

    if let Some(target_id) = target_id {
        let pair = pair_id(src_channel, tgt_channel);
        dir.source_pair_store.add_pair(&pair, &msg.id.to_string(), &target_id.to_string()).await;
    }
}

async fn relay_update(dir: &RelayDirection, msg: &Message) {
    let src_channel = msg.channel_id;
    let Some(&tgt_channel) = dir.channel_map.get(&src_channel) else { return };

    let pair = pair_id(src_channel, tgt_channel);
    let Some(target_id) = dir.source_pair_store.get_target(&pair, &msg.id.to_string()).await else {
        return;
    };
    let Ok(target_id) = target_id.parse::<u64>() else { return };

    let embed = author_embed(msg, &dir.source_cdn_host);
    dir.target_rest
        .send_update_message(tgt_channel, MessageId(target_id), "", std::slice::from_ref(&embed))
        .await;
}

async fn relay_delete(dir: &RelayDirection, del: &MessageDelete) {
    let src_channel = del.channel_id;
    let Some(&tgt_channel) = dir.channel_map.get(&src_channel) else { return };

    let pair = pair_id(src_channel, tgt_channel);
    let Some(target_id) = dir.source_pair_store.get_target(&pair, &del.id.to_string()).await else {
        return;
    };
    let Ok(target_id) = target_id.parse::<u64>() else { return };

    dir.target_rest.send_delete_message(tgt_channel, MessageId(target_id)).await;
    dir.source_pair_store.delete_pair(&pair, &del.id.to_string()).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_authored_events_are_an_echo() {
        assert!(is_echo(UserId(9), Some(UserId(9))));
        assert!(!is_echo(UserId(9), Some(UserId(10))));
        assert!(!is_echo(UserId(9), None));
    }

    #[test]
    fn unconfigured_channel_is_not_bridged() {
        let mut map = HashMap::new();
        map.insert(ChannelId(1), ChannelId(2));
        assert!(is_bridged_channel(&map, ChannelId(1)));
        assert!(!is_bridged_channel(&map, ChannelId(99)));
    }

    #[tokio::test]
    async fn reply_to_self_originated_mirror_uses_reverse_pair_store() {
        let source = PairStore::connect("sqlite::memory:").await.unwrap();
        let target = PairStore::connect("sqlite::memory:").await.unwrap();

        let forward_pair = pair_id(ChannelId(1), ChannelId(2));
        let reverse_pair = pair_id(ChannelId(2), ChannelId(1));
        source.create_table(&forward_pair).await.unwrap();
        target.create_table(&reverse_pair).await.unwrap();

        // "101" on the source side is itself a mirror of "55" from the
        // target side, recorded in the target's own pair store.
        target.add_pair(&reverse_pair, "55", "101").await;

        let me = UserId(42);
        let mut referenced = sample_message(MessageId(101));
        referenced.user_id = me;

        let mut msg = sample_message(MessageId(102));
        msg.referenced_message = Some(Box::new(referenced));

        let dir = RelayDirection {
            name: "test",
            source_gateway: test_gateway(),
            source_cdn_host: "cdn.example.invalid".into(),
            source_pair_store: source,
            target_rest: RestClient::new("example.invalid", "t").unwrap(),
            target_pair_store: target,
            target_guild_id: None,
            channel_map: HashMap::new(),
        };

        let resolved = resolve_reply(&dir, &msg, ChannelId(1), ChannelId(2), Some(me)).await.unwrap();
        assert_eq!(resolved.message_id, MessageId(55));
    }

    #[tokio::test]
    async fn reply_to_foreign_message_uses_forward_pair_store() {
        let source = PairStore::connect("sqlite::memory:").await.unwrap();
        let target = PairStore::connect("sqlite::memory:").await.unwrap();

        let forward_pair = pair_id(ChannelId(1), ChannelId(2));
        source.create_table(&forward_pair).await.unwrap();
        source.add_pair(&forward_pair, "101", "200").await;

        let referenced = sample_message(MessageId(101));
        let mut msg = sample_message(MessageId(102));
        msg.referenced_message = Some(Box::new(referenced));

        let dir = RelayDirection {
            name: "test",
            source_gateway: test_gateway(),
            source_cdn_host: "cdn.example.invalid".into(),
            source_pair_store: source,
            target_rest: RestClient::new("example.invalid", "t").unwrap(),
            target_pair_store: target,
            target_guild_id: None,
            channel_map: HashMap::new(),
        };

        let resolved = resolve_reply(&dir, &msg, ChannelId(1), ChannelId(2), Some(UserId(42))).await.unwrap();
        assert_eq!(resolved.message_id, MessageId(200));
    }

    fn test_gateway() -> Arc<GatewaySession> {
        GatewaySession::new(
            crate::gateway::EndpointConfig {
                name: "test".into(),
                api_host: "example.invalid".into(),
                cdn_host: "example.invalid".into(),
                token: "t".into(),
                compress: false,
                supports_presence: false,
                custom_status: None,
                custom_status_emoji: None,
            },
            reqwest::Client::new(),
        )
    }

    fn sample_message(id: MessageId) -> Message {
        Message {
            id,
            channel_id: ChannelId(1),
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
        }
    }
}
