//! Push channel: one websocket per subscription, joined to a single topic.
//!
//! A lost socket is redialed and the topic rejoined with capped exponential
//! backoff until the subscription is closed. Loss and recovery are reported
//! through the status callback.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use futures::{stream::SplitStream, SinkExt, StreamExt};
use shared::{
    domain::Message,
    protocol::{channel_topic, RealtimeEvent, RealtimeFrame, ReplyStatus},
};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::{types::GatewayConfig, ChannelStatus, InsertCallback, StatusCallback};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const JOIN_REPLY_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_BASE: Duration = Duration::from_millis(500);
const RECONNECT_CAP: Duration = Duration::from_secs(30);

type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

pub(crate) struct RealtimeSubscription {
    topic: String,
    shutdown: oneshot::Sender<()>,
    supervisor: JoinHandle<()>,
}

impl RealtimeSubscription {
    pub(crate) fn topic(&self) -> &str {
        &self.topic
    }

    /// Leaves the topic and waits for the channel task to stop, so no status
    /// is reported afterwards. The writer drains the leave frame and closes
    /// the socket on its own.
    pub(crate) async fn close(self) {
        if self.shutdown.send(()).is_err() {
            debug!(topic = %self.topic, "realtime: channel task already gone");
        }
        if let Err(err) = self.supervisor.await {
            warn!(topic = %self.topic, "realtime: channel task failed: {err}");
        }
    }
}

/// Everything a channel task needs to redial.
struct Channel {
    config: GatewayConfig,
    topic: String,
    refs: Arc<AtomicU64>,
    on_insert: InsertCallback,
    on_status: StatusCallback,
}

/// One joined websocket.
struct Session {
    outbound: mpsc::UnboundedSender<RealtimeFrame>,
    inbound: WsReader,
    heartbeat: JoinHandle<()>,
}

impl Session {
    /// Dropping the last sender lets the writer close the socket.
    fn end(self) {
        self.heartbeat.abort();
    }

    fn leave(self, topic: &str, refs: &AtomicU64) {
        if self
            .outbound
            .send(RealtimeFrame::leave(topic, next_ref(refs)))
            .is_err()
        {
            debug!(topic, "realtime: writer already gone");
        }
        self.end();
    }
}

fn next_ref(refs: &AtomicU64) -> String {
    (refs.fetch_add(1, Ordering::Relaxed) + 1).to_string()
}

/// Delay before redial number `attempt` (zero based).
pub(crate) fn reconnect_delay(attempt: u32) -> Duration {
    RECONNECT_BASE
        .saturating_mul(1u32 << attempt.min(16))
        .min(RECONNECT_CAP)
}

/// Joins the topic once, failing if that is impossible, then keeps the
/// channel alive in a background task.
pub(crate) async fn open_insert_subscription(
    config: &GatewayConfig,
    on_insert: InsertCallback,
    on_status: StatusCallback,
) -> Result<RealtimeSubscription> {
    let topic = channel_topic(&config.channel);
    let refs = Arc::new(AtomicU64::new(0));
    let session = dial(config, &topic, &refs).await?;

    let (shutdown, shutdown_rx) = oneshot::channel();
    let channel = Channel {
        config: config.clone(),
        topic: topic.clone(),
        refs,
        on_insert,
        on_status,
    };
    let supervisor = tokio::spawn(supervise(channel, session, shutdown_rx));

    Ok(RealtimeSubscription {
        topic,
        shutdown,
        supervisor,
    })
}

async fn dial(config: &GatewayConfig, topic: &str, refs: &Arc<AtomicU64>) -> Result<Session> {
    let ws_url = config.realtime_url()?;
    let (ws_stream, _) = connect_async(ws_url.as_str())
        .await
        .with_context(|| format!("failed to connect websocket: {}", redact(&ws_url)))?;
    let (mut ws_writer, mut inbound) = ws_stream.split();

    let join_ref = next_ref(refs);
    let join = RealtimeFrame::join_inserts(topic, &config.table, join_ref.clone());
    ws_writer
        .send(WsMessage::Text(serde_json::to_string(&join)?))
        .await
        .context("failed to send channel join")?;

    tokio::time::timeout(JOIN_REPLY_TIMEOUT, await_join_reply(&mut inbound, topic, &join_ref))
        .await
        .map_err(|_| anyhow!("timed out waiting for channel join reply"))??;

    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<RealtimeFrame>();
    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if let Err(err) = ws_writer.send(WsMessage::Text(text)).await {
                warn!("realtime: send failed: {err}");
                break;
            }
        }
        let _ = ws_writer.close().await;
    });

    let heartbeat = {
        let outbound = outbound.clone();
        let refs = Arc::clone(refs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if outbound.send(RealtimeFrame::heartbeat(next_ref(&refs))).is_err() {
                    break;
                }
            }
        })
    };

    Ok(Session {
        outbound,
        inbound,
        heartbeat,
    })
}

async fn supervise(channel: Channel, mut session: Session, mut shutdown: oneshot::Receiver<()>) {
    loop {
        let lost = tokio::select! {
            _ = &mut shutdown => None,
            reason = read_until_lost(&mut session.inbound, &channel) => Some(reason),
        };
        let Some(reason) = lost else {
            session.leave(&channel.topic, &channel.refs);
            return;
        };
        session.end();
        warn!(topic = %channel.topic, "realtime: channel lost: {reason}");
        (channel.on_status.as_ref())(ChannelStatus::Lost(reason));

        session = match redial(&channel, &mut shutdown).await {
            Some(session) => session,
            None => return,
        };
        info!(topic = %channel.topic, "realtime: channel rejoined");
        (channel.on_status.as_ref())(ChannelStatus::Restored);
    }
}

/// Redials until a join succeeds. `None` once the subscription is closed.
async fn redial(channel: &Channel, shutdown: &mut oneshot::Receiver<()>) -> Option<Session> {
    let mut attempt = 0;
    loop {
        let delay = reconnect_delay(attempt);
        attempt += 1;
        tokio::select! {
            _ = &mut *shutdown => return None,
            _ = tokio::time::sleep(delay) => {}
        }
        let dialed = tokio::select! {
            _ = &mut *shutdown => return None,
            dialed = dial(&channel.config, &channel.topic, &channel.refs) => dialed,
        };
        match dialed {
            Ok(session) => return Some(session),
            Err(err) => warn!(
                topic = %channel.topic,
                attempt,
                next_delay_ms = reconnect_delay(attempt).as_millis() as u64,
                "realtime: rejoin failed: {err:#}"
            ),
        }
    }
}

/// Delivers inserts until the socket or the channel goes away, and says why.
async fn read_until_lost(inbound: &mut WsReader, channel: &Channel) -> String {
    while let Some(msg) = inbound.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<RealtimeFrame>(&text) {
                Ok(frame) => {
                    let table = &channel.config.table;
                    if !dispatch_frame(&frame, &channel.topic, table, &channel.on_insert) {
                        return format!("server sent {:?}", frame.event);
                    }
                }
                Err(err) => warn!("realtime: invalid frame: {err}"),
            },
            Ok(WsMessage::Close(_)) => return "server closed the socket".to_string(),
            Ok(_) => {}
            Err(err) => return format!("receive failed: {err}"),
        }
    }
    "socket ended".to_string()
}

async fn await_join_reply<S>(reader: &mut S, topic: &str, join_ref: &str) -> Result<()>
where
    S: futures::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg) = reader.next().await {
        let text = match msg.context("websocket receive failed during join")? {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };
        let Ok(frame) = serde_json::from_str::<RealtimeFrame>(&text) else {
            continue;
        };
        if frame.topic != topic || frame.reference.as_deref() != Some(join_ref) {
            continue;
        }
        return match frame.reply_payload() {
            Some(reply) if reply.status == ReplyStatus::Ok => Ok(()),
            Some(reply) => Err(anyhow!(
                "channel join rejected ({:?}): {}",
                reply.status,
                reply.response
            )),
            None => Err(anyhow!("unexpected {:?} frame in reply to join", frame.event)),
        };
    }
    Err(anyhow!("websocket closed before channel join reply"))
}

/// Returns `false` once the channel is no longer usable.
fn dispatch_frame(frame: &RealtimeFrame, topic: &str, table: &str, callback: &InsertCallback) -> bool {
    if frame.topic != topic {
        return true;
    }
    match frame.event {
        RealtimeEvent::PostgresChanges => {
            let payload = match frame.changes_payload() {
                Some(Ok(payload)) => payload,
                Some(Err(err)) => {
                    warn!("realtime: malformed change payload: {err}");
                    return true;
                }
                None => return true,
            };
            match payload.inserted_record::<Message>(table) {
                Some(Ok(message)) => {
                    info!(id = message.id.0, "realtime: insert received");
                    (callback.as_ref())(message);
                }
                Some(Err(err)) => warn!("realtime: malformed inserted row: {err}"),
                None => {}
            }
            true
        }
        RealtimeEvent::PhxError | RealtimeEvent::PhxClose => {
            warn!(topic, event = ?frame.event, "realtime: channel closed by server");
            false
        }
        _ => true,
    }
}

fn redact(url: &url::Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}
