use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use rand::Rng;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;

use super::WsSink;

/// Sleeps in 1-second ticks, sending `{op:1, d:sequence}` every
/// `interval * jitter` seconds where `jitter` is uniform on `[0.2, 0.8]`.
///
/// If a heartbeat is about to be sent but the previous one was never
/// acknowledged, `resumable` is set and the task exits so the supervisor
/// can reconnect.
pub(super) async fn run(
    sink: Arc<Mutex<WsSink>>,
    interval_ms: u64,
    sequence: Arc<AtomicU64>,
    heartbeat_received: Arc<AtomicBool>,
    resumable: Arc<AtomicBool>,
    mut kill: tokio::sync::oneshot::Receiver<()>,
) {
    loop {
        let jitter = 0.8 - 0.6 * rand::thread_rng().gen::<f64>();
        let delay = Duration::from_millis((interval_ms as f64 * jitter) as u64);

        tokio::select! {
            _ = &mut kill => return,
            _ = sleep_in_one_second_ticks(delay) => {}
        }

        if !heartbeat_received.swap(false, Ordering::SeqCst) {
            resumable.store(true, Ordering::SeqCst);
            return;
        }

        let seq = sequence.load(Ordering::SeqCst);
        let payload = serde_json::json!({ "op": 1, "d": seq });
        let mut guard = sink.lock().await;
        if guard.send(Message::Text(payload.to_string())).await.is_err() {
            resumable.store(true, Ordering::SeqCst);
            return;
        }
    }
}

/// Sleeps for `total`, but in 1-second increments so a kill signal racing
/// with a long heartbeat interval is still observed promptly elsewhere.
async fn sleep_in_one_second_ticks(total: Duration) {
    let mut remaining = total;
    let tick = Duration::from_secs(1);
    while remaining > tick {
        tokio::time::sleep(tick).await;
        remaining -= tick;
    }
    tokio::time::sleep(remaining).await;
}
