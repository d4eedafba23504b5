//! The gateway client: one resilient WebSocket session per endpoint.

mod heartbeat;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{Error, Result};
use crate::io::Inflater;
use crate::model::{Event, ReceivedMessage, UserId};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

const GATEWAY_VERSION: u8 = 9;
/// 1536 = GUILD_MESSAGES | DIRECT_MESSAGES.
const GATEWAY_INTENTS: u64 = 1536;

/// Static configuration for one backend endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub name: String,
    pub api_host: String,
    pub cdn_host: String,
    pub token: String,
    /// Whether to request `compress=zlib-stream`. Enabled for Discord,
    /// disabled for Spacebar.
    pub compress: bool,
    /// Whether this endpoint honors a custom-status presence update.
    /// Discord does; Spacebar does not.
    pub supports_presence: bool,
    pub custom_status: Option<String>,
    pub custom_status_emoji: Option<Value>,
}

/// A durable gateway session to one endpoint.
///
/// All mutable state lives behind atomics or a mutex so the receiver,
/// heartbeater, and the bridge's relay loop (reading `ready`/`my_id`/the
/// event buffer) can all observe it without a supervisor-owned message bus.
pub struct GatewaySession {
    config: EndpointConfig,
    http: reqwest::Client,

    run: AtomicBool,
    ready: AtomicBool,
    resumable: AtomicBool,
    heartbeat_received: AtomicBool,
    sequence: Arc<AtomicU64>,

    session_id: Mutex<Option<String>>,
    resume_gateway_url: Mutex<Option<String>>,
    gateway_url: Mutex<Option<String>>,
    my_id: Mutex<Option<UserId>>,
    error: Mutex<Option<String>>,

    events: Mutex<VecDeque<Event>>,
}

enum Disposition {
    ReconnectImmediate,
    Reconnect,
    WaitOnline,
    Dead,
}

impl GatewaySession {
    pub fn new(config: EndpointConfig, http: reqwest::Client) -> Arc<Self> {
        Arc::new(GatewaySession {
            config,
            http,
            run: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            resumable: AtomicBool::new(false),
            heartbeat_received: AtomicBool::new(true),
            sequence: Arc::new(AtomicU64::new(0)),
            session_id: Mutex::new(None),
            resume_gateway_url: Mutex::new(None),
            gateway_url: Mutex::new(None),
            my_id: Mutex::new(None),
            error: Mutex::new(None),
            events: Mutex::new(VecDeque::new()),
        })
    }

    /// Spawns the supervisor task owning this session's receiver and
    /// heartbeater for its whole lifetime, restarting both deterministically
    /// on every reconnect.
    pub fn spawn(self: &Arc<Self>) {
        let session = self.clone();
        tokio::spawn(async move { session.run().await });
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub async fn my_id(&self) -> Option<UserId> {
        *self.my_id.lock().await
    }

    pub async fn fatal_error(&self) -> Option<String> {
        self.error.lock().await.clone()
    }

    pub fn stop(&self) {
        self.run.store(false, Ordering::SeqCst);
    }

    /// Pops the oldest buffered event, or `None`. Never blocks.
    pub async fn poll_event(&self) -> Option<Event> {
        self.events.lock().await.pop_front()
    }

    async fn run(self: Arc<Self>) {
        while self.run.load(Ordering::SeqCst) {
            let can_resume = self.resumable.swap(false, Ordering::SeqCst) && self.session_id.lock().await.is_some();

            let result = if can_resume {
                self.resume_and_receive().await
            } else {
                self.identify_and_receive().await
            };

            let disposition = match result {
                Ok(()) => Disposition::ReconnectImmediate,
                Err(e) => self.classify(&e),
            };

            match disposition {
                Disposition::ReconnectImmediate => continue,
                Disposition::Reconnect => tokio::time::sleep(Duration::from_millis(500)).await,
                Disposition::WaitOnline => self.wait_online().await,
                Disposition::Dead => {
                    *self.error.lock().await = Some(format!("{} token is invalid", self.config.name));
                    self.run.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
        self.ready.store(false, Ordering::SeqCst);
    }

    fn classify(&self, err: &Error) -> Disposition {
        match err {
            Error::Closed(Some(4004), _) => {
                tracing::error!(endpoint = %self.config.name, "{} token is invalid", self.config.name);
                Disposition::Dead
            }
            Error::Closed(Some(code @ (4000 | 4009)), _) => {
                tracing::warn!(endpoint = %self.config.name, code = *code, "gateway closed resumably");
                self.resumable.store(true, Ordering::SeqCst);
                Disposition::ReconnectImmediate
            }
            Error::Reqwest(e) if e.is_connect() || e.is_timeout() => Disposition::WaitOnline,
            Error::Protocol("resume failed") => Disposition::ReconnectImmediate,
            other => {
                tracing::warn!(endpoint = %self.config.name, error = %other, "gateway session ended, reconnecting");
                Disposition::Reconnect
            }
        }
    }

    async fn wait_online(&self) {
        tracing::warn!(endpoint = %self.config.name, "waiting for network connectivity");
        loop {
            tokio::time::sleep(Duration::from_secs(5)).await;
            if self.fetch_gateway_url().await.is_ok() {
                return;
            }
            if !self.run.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    async fn fetch_gateway_url(&self) -> Result<String> {
        let url = format!("https://{}/api/v{}/gateway", self.config.api_host, GATEWAY_VERSION);
        let response = self.http.get(&url).send().await?;
        let body: std::collections::BTreeMap<String, String> = response.json().await?;
        let gateway_url = body
            .get("url")
            .cloned()
            .ok_or(Error::Protocol("gateway response missing url"))?;
        *self.gateway_url.lock().await = Some(gateway_url.clone());
        Ok(gateway_url)
    }

    /// Spacebar has no presence concept; only Discord gets an activities
    /// array built from `custom_status`.
    fn activities(&self) -> Value {
        if !self.config.supports_presence {
            return json!([]);
        }
        match &self.config.custom_status {
            Some(status) => json!([{
                "name": status,
                "type": 4,
                "state": status,
                "emoji": self.config.custom_status_emoji,
            }]),
            None => json!([]),
        }
    }

    fn build_ws_url(base: &str, compress: bool) -> String {
        if compress {
            format!("{base}?v={GATEWAY_VERSION}&encoding=json&compress=zlib-stream")
        } else {
            format!("{base}?v={GATEWAY_VERSION}&encoding=json")
        }
    }

    async fn connect_ws(&self, base_url: &str) -> Result<(WsSink, SplitStream<WsStream>)> {
        let url = Self::build_ws_url(base_url, self.config.compress);
        let (stream, _response) = connect_async(&url).await?;
        Ok(stream.split())
    }

    /// Fresh connect: fetch a gateway URL (unless cached), open the socket,
    /// wait for HELLO, identify, and run the receive loop until disconnect.
    async fn identify_and_receive(self: &Arc<Self>) -> Result<()> {
        let base_url = match self.gateway_url.lock().await.clone() {
            Some(url) => url,
            None => self.fetch_gateway_url().await?,
        };

        let (mut sink, mut stream) = self.connect_ws(&base_url).await?;
        let interval_ms = self.await_hello(&mut stream).await?;

        let identify = json!({
            "op": 2,
            "d": {
                "token": self.config.token,
                "properties": { "os": "linux", "browser": "endcord", "device": "endcord" },
                "intents": GATEWAY_INTENTS,
                "presence": { "status": "online", "since": 0, "activities": self.activities(), "afk": false },
            }
        });
        sink.send(Message::Text(identify.to_string())).await?;

        self.sequence.store(0, Ordering::SeqCst);
        self.receive_loop(sink, stream, interval_ms).await
    }

    /// Resume: reopen at `resume_gateway_url` (falling back to
    /// `gateway_url`), discard HELLO, send the resume payload, and inspect
    /// the next opcode. Any failure here means "fall through to a fresh
    /// identify", signalled by `Error::Protocol("resume failed")`.
    async fn resume_and_receive(self: &Arc<Self>) -> Result<()> {
        let base_url = self
            .resume_gateway_url
            .lock()
            .await
            .clone()
            .or(self.gateway_url.lock().await.clone())
            .ok_or(Error::Protocol("resume failed"))?;

        let (session_id, sequence) = {
            let session_id = self.session_id.lock().await.clone();
            match session_id {
                Some(id) => (id, self.sequence.load(Ordering::SeqCst)),
                None => return Err(Error::Protocol("resume failed")),
            }
        };

        let (mut sink, mut stream) = self
            .connect_ws(&base_url)
            .await
            .map_err(|_| Error::Protocol("resume failed"))?;
        let interval_ms = self
            .await_hello(&mut stream)
            .await
            .map_err(|_| Error::Protocol("resume failed"))?;

        let resume = json!({
            "op": 6,
            "d": { "token": self.config.token, "session_id": session_id, "seq": sequence }
        });
        sink.send(Message::Text(resume.to_string()))
            .await
            .map_err(|_| Error::Protocol("resume failed"))?;

        self.receive_loop(sink, stream, interval_ms).await
    }

    async fn await_hello(&self, stream: &mut SplitStream<WsStream>) -> Result<u64> {
        let mut inflater = Inflater::new();
        loop {
            let frame = Self::read_frame(stream, &mut inflater).await?;
            let Some(text) = frame else { continue };
            match serde_json::from_str::<ReceivedMessage>(&text) {
                Ok(ReceivedMessage::Hello { d, .. }) => return Ok(d.heartbeat_interval),
                Ok(_) => return Err(Error::Protocol("expected HELLO as first frame")),
                Err(_) => return Err(Error::Protocol("malformed frame while awaiting HELLO")),
            }
        }
    }

    async fn read_frame(stream: &mut SplitStream<WsStream>, inflater: &mut Inflater) -> Result<Option<String>> {
        loop {
            let message = match stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(Error::from(e)),
                None => return Err(Error::Closed(None, "stream ended".to_string())),
            };
            match message {
                Message::Text(text) => return Ok(Some(text)),
                Message::Binary(bytes) => return inflater.process(&bytes),
                Message::Close(frame) => return Err(close_to_error(frame)),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    async fn receive_loop(
        self: &Arc<Self>,
        sink: WsSink,
        mut stream: SplitStream<WsStream>,
        interval_ms: u64,
    ) -> Result<()> {
        let sink = Arc::new(Mutex::new(sink));
        self.heartbeat_received.store(true, Ordering::SeqCst);

        let (kill_tx, kill_rx) = tokio::sync::oneshot::channel();
        let hb_sink = sink.clone();
        let hb_sequence = self.sequence.clone();
        let hb_received = Arc::new(AtomicBool::new(true));
        let hb_resumable = Arc::new(AtomicBool::new(false));
        let heartbeat_task = tokio::spawn(heartbeat::run(
            hb_sink,
            interval_ms,
            hb_sequence,
            hb_received.clone(),
            hb_resumable.clone(),
            kill_rx,
        ));

        let mut inflater = Inflater::new();
        let result = self.pump_frames(&mut stream, &mut inflater, &sink, &hb_received).await;

        let _ = kill_tx.send(());
        heartbeat_task.abort();
        if hb_resumable.load(Ordering::SeqCst) {
            self.resumable.store(true, Ordering::SeqCst);
        }
        result
    }

    async fn pump_frames(
        self: &Arc<Self>,
        stream: &mut SplitStream<WsStream>,
        inflater: &mut Inflater,
        sink: &Arc<Mutex<WsSink>>,
        heartbeat_received: &Arc<AtomicBool>,
    ) -> Result<()> {
        loop {
            if !self.run.load(Ordering::SeqCst) {
                return Ok(());
            }
            let text = match Self::read_frame(stream, inflater).await {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(e) => return Err(e),
            };

            let parsed: ReceivedMessage = match serde_json::from_str(&text) {
                Ok(p) => p,
                Err(_) => continue,
            };

            match parsed {
                ReceivedMessage::Dispatch { t, s, d, .. } => {
                    self.sequence.store(s, Ordering::SeqCst);
                    self.handle_dispatch(&t, d).await;
                }
                ReceivedMessage::Heartbeat { .. } => {
                    let seq = self.sequence.load(Ordering::SeqCst);
                    let payload = json!({ "op": 1, "d": seq });
                    let _ = sink.lock().await.send(Message::Text(payload.to_string())).await;
                }
                ReceivedMessage::HeartbeatAck { .. } => {
                    heartbeat_received.store(true, Ordering::SeqCst);
                }
                ReceivedMessage::Reconnect { .. } => {
                    self.resumable.store(true, Ordering::SeqCst);
                    return Ok(());
                }
                ReceivedMessage::InvalidSession { .. } => {
                    return Ok(());
                }
                ReceivedMessage::Hello { .. } => continue,
            }
        }
    }

    async fn handle_dispatch(&self, event_type: &str, data: Value) {
        for event in crate::model::decode_dispatch(event_type, data) {
            match &event {
                Event::Ready { session_id, resume_gateway_url, user_id } => {
                    *self.session_id.lock().await = Some(session_id.clone());
                    *self.resume_gateway_url.lock().await = resume_gateway_url.clone();
                    *self.my_id.lock().await = Some(*user_id);
                    self.ready.store(true, Ordering::SeqCst);
                }
                Event::Resumed => {
                    self.ready.store(true, Ordering::SeqCst);
                }
                _ => {}
            }
            self.events.lock().await.push_back(event);
        }
    }
}

fn close_to_error(frame: Option<CloseFrame<'static>>) -> Error {
    match frame {
        Some(frame) => {
            let code: u16 = frame.code.into();
            Error::Closed(Some(code), frame.reason.to_string())
        }
        None => Error::Closed(None, String::new()),
    }
}
