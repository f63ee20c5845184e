//! Socket.IO client over a WebSocket transport
//!
//! Connection sequence: WebSocket handshake, Engine.IO OPEN, Socket.IO
//! CONNECT for the namespace. After that a reader task answers heartbeats and
//! dispatches events to the registry while a writer task drains the outbound
//! queue.

use super::packet::{EnginePacket, Handshake, SocketPacket, SocketPacketKind};
use super::registry::{HandlerRegistry, Subscription};
use super::{ChannelError, ProgressChannel};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};
use url::Url;

/// Upper bound for each connection step
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for the writer to flush the goodbye packets
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Turn an HTTP(S) endpoint into the Engine.IO WebSocket URL
pub fn websocket_url(endpoint: &str) -> Result<Url, ChannelError> {
    let invalid = |reason: &str| ChannelError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };

    let mut url = Url::parse(endpoint).map_err(|e| invalid(&e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(invalid("scheme must be http, https, ws or wss")),
    };
    // The Engine.IO path is fixed; a namespace goes through `--namespace`
    if !matches!(url.path(), "" | "/") {
        return Err(invalid("endpoint must not have a path, set the namespace instead"));
    }
    url.set_scheme(scheme)
        .map_err(|_| invalid("cannot switch to a websocket scheme"))?;
    url.set_path("/socket.io/");
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");
    url.set_fragment(None);

    Ok(url)
}

/// A connected Socket.IO namespace
pub struct SocketIoChannel {
    namespace: String,
    handshake: Handshake,
    registry: Arc<HandlerRegistry>,
    outgoing: mpsc::UnboundedSender<Message>,
    connected: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl SocketIoChannel {
    /// Connect to `endpoint` and join `namespace`
    pub async fn connect(endpoint: &str, namespace: &str) -> Result<Self, ChannelError> {
        Self::connect_with_timeout(endpoint, namespace, HANDSHAKE_TIMEOUT).await
    }

    /// Like [`SocketIoChannel::connect`], bounding each connection step by `step_timeout`
    pub async fn connect_with_timeout(
        endpoint: &str,
        namespace: &str,
        step_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let url = websocket_url(endpoint)?;
        info!(%url, namespace, "connecting to progress channel");

        let (ws, _response) = timeout(step_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| ChannelError::Timeout("websocket connection"))?
            .map_err(|source| ChannelError::Connect {
                url: url.to_string(),
                source,
            })?;
        let (mut sink, mut stream) = ws.split();

        let handshake = timeout(step_timeout, read_open(&mut stream))
            .await
            .map_err(|_| ChannelError::Timeout("engine.io open packet"))??;
        debug!(sid = %handshake.sid, ping_interval = handshake.ping_interval, "engine.io session opened");

        send_packet(&mut sink, EnginePacket::Message(SocketPacket::connect(namespace))).await?;
        timeout(step_timeout, await_connect(&mut stream, &mut sink, namespace))
            .await
            .map_err(|_| ChannelError::Timeout("namespace connect"))??;
        info!(namespace, "progress channel connected");

        let registry = HandlerRegistry::new();
        let connected = Arc::new(AtomicBool::new(true));
        let (outgoing, rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(run_writer(sink, rx));

        // Server pings every ping_interval and gives us ping_timeout to answer;
        // silence longer than both means the peer is gone.
        let heartbeat = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
        let reader = tokio::spawn(run_reader(
            stream,
            ReaderContext {
                namespace: namespace.to_string(),
                registry: Arc::clone(&registry),
                outgoing: outgoing.clone(),
                connected: Arc::clone(&connected),
                heartbeat,
            },
        ));

        Ok(Self {
            namespace: namespace.to_string(),
            handshake,
            registry,
            outgoing,
            connected,
            reader: Some(reader),
            writer: Some(writer),
        })
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Leave the namespace and close the socket
    pub async fn disconnect(mut self) {
        if self.is_connected() {
            let goodbye = EnginePacket::Message(SocketPacket::disconnect(&self.namespace));
            let _ = self.outgoing.send(Message::Text(goodbye.encode()));
            let _ = self.outgoing.send(Message::Close(None));
        }
        self.connected.store(false, Ordering::SeqCst);

        if let Some(writer) = self.writer.take() {
            if timeout(SHUTDOWN_GRACE, writer).await.is_err() {
                warn!("writer did not finish within grace period");
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.registry.clear();
        info!(namespace = %self.namespace, "progress channel disconnected");
    }
}

impl Drop for SocketIoChannel {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

impl ProgressChannel for SocketIoChannel {
    fn emit(&self, event: &str, payload: &str) -> Result<(), ChannelError> {
        if !self.is_connected() {
            return Err(ChannelError::Closed);
        }
        let packet = SocketPacket::event(
            &self.namespace,
            event,
            vec![Value::String(payload.to_string())],
        );
        debug!(event, payload, "emit");
        self.outgoing
            .send(Message::Text(EnginePacket::Message(packet).encode()))
            .map_err(|_| ChannelError::Closed)
    }

    fn subscribe(&self, event: &str) -> Subscription {
        self.registry.subscribe(event)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handshake helpers
// ─────────────────────────────────────────────────────────────────────────────

async fn send_packet<K>(sink: &mut K, packet: EnginePacket) -> Result<(), ChannelError>
where
    K: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    sink.send(Message::Text(packet.encode())).await?;
    Ok(())
}

async fn read_open<S>(stream: &mut S) -> Result<Handshake, ChannelError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame? {
            Message::Text(text) => {
                return match EnginePacket::decode(&text)? {
                    EnginePacket::Open(handshake) => Ok(handshake),
                    other => Err(ChannelError::Handshake(format!(
                        "expected open packet, got {:?}",
                        other
                    ))),
                };
            }
            Message::Close(_) => break,
            _ => continue,
        }
    }
    Err(ChannelError::Handshake(
        "connection closed before open packet".to_string(),
    ))
}

async fn await_connect<S, K>(stream: &mut S, sink: &mut K, namespace: &str) -> Result<(), ChannelError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    K: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(frame) = stream.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match EnginePacket::decode(&text)? {
            EnginePacket::Ping(data) => send_packet(sink, EnginePacket::Pong(data)).await?,
            EnginePacket::Message(packet) if packet.namespace == namespace => match packet.kind {
                SocketPacketKind::Connect => return Ok(()),
                SocketPacketKind::ConnectError => {
                    return Err(ChannelError::Refused {
                        namespace: namespace.to_string(),
                        message: packet.error_message().unwrap_or_default(),
                    })
                }
                _ => debug!(?packet, "ignoring packet before namespace connect"),
            },
            EnginePacket::Close => break,
            other => debug!(?other, "ignoring packet before namespace connect"),
        }
    }
    Err(ChannelError::Closed)
}

// ─────────────────────────────────────────────────────────────────────────────
// Background tasks
// ─────────────────────────────────────────────────────────────────────────────

async fn run_writer<K>(mut sink: K, mut rx: mpsc::UnboundedReceiver<Message>)
where
    K: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(message) = rx.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            warn!(error = %e, "failed to write to progress channel");
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

struct ReaderContext {
    namespace: String,
    registry: Arc<HandlerRegistry>,
    outgoing: mpsc::UnboundedSender<Message>,
    connected: Arc<AtomicBool>,
    heartbeat: Duration,
}

async fn run_reader<S>(mut stream: S, ctx: ReaderContext)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let frame = match timeout(ctx.heartbeat, stream.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                warn!(error = %e, "progress channel read failed");
                break;
            }
            Ok(None) => {
                info!("progress channel closed by peer");
                break;
            }
            Err(_) => {
                warn!("no heartbeat from peer, treating channel as lost");
                break;
            }
        };

        match frame {
            Message::Text(text) => {
                if !handle_text(&ctx, &text) {
                    break;
                }
            }
            Message::Close(_) => {
                info!("progress channel closed by peer");
                break;
            }
            Message::Binary(_) => warn!("ignoring binary frame"),
            _ => {}
        }
    }

    ctx.connected.store(false, Ordering::SeqCst);
    // Ends every subscription so listeners can observe the loss
    ctx.registry.clear();
}

/// Returns `false` once the peer has ended the session
fn handle_text(ctx: &ReaderContext, text: &str) -> bool {
    let packet = match EnginePacket::decode(text) {
        Ok(packet) => packet,
        Err(e) => {
            warn!(error = %e, frame = text, "skipping undecodable frame");
            return true;
        }
    };

    match packet {
        EnginePacket::Ping(data) => {
            let _ = ctx
                .outgoing
                .send(Message::Text(EnginePacket::Pong(data).encode()));
            true
        }
        EnginePacket::Close => {
            info!("engine.io session closed by peer");
            false
        }
        EnginePacket::Message(packet) if packet.namespace == ctx.namespace => {
            match packet.kind {
                SocketPacketKind::Event => {
                    if let Some((name, args)) = packet.as_event() {
                        let payload = payload_text(args.first());
                        let delivered = ctx.registry.dispatch(name, &payload);
                        debug!(event = name, delivered, "inbound event");
                    }
                    true
                }
                SocketPacketKind::Disconnect => {
                    info!(namespace = %ctx.namespace, "namespace disconnected by peer");
                    false
                }
                _ => {
                    debug!(?packet, "ignoring packet");
                    true
                }
            }
        }
        other => {
            debug!(?other, "ignoring packet");
            true
        }
    }
}

/// Inbound payloads are free text. Non-string JSON is kept as its JSON text.
fn payload_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
