//! Integration tests for the installer client
//!
//! A local WebSocket listener plays the remote installer, speaking the
//! Socket.IO text protocol the way a real server would.

use futures_util::{SinkExt, StreamExt};
use model_installer::{
    ChannelError, InstallerView, MemoryChannel, ProgressChannel, SocketIoChannel, INSTALL_EVENT,
    PROGRESS_EVENT, SEED_MESSAGE,
};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type PeerSocket = WebSocketStream<TcpStream>;

const OPEN: &str =
    r#"0{"sid":"peer-sid","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

const WAIT: Duration = Duration::from_secs(5);

/// Start a one-connection peer running `script`; returns the HTTP endpoint
async fn spawn_peer<F, Fut, T>(script: F) -> (String, Arc<Mutex<Option<String>>>, JoinHandle<T>)
where
    F: FnOnce(PeerSocket) -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send,
    T: Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let request_uri = Arc::new(Mutex::new(None));
    let seen_uri = Arc::clone(&request_uri);

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_hdr_async(
            stream,
            move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                *seen_uri.lock().unwrap() = Some(req.uri().to_string());
                Ok(resp)
            },
        )
        .await
        .unwrap();
        script(ws).await
    });

    (format!("http://{}", addr), request_uri, handle)
}

async fn send(ws: &mut PeerSocket, text: &str) {
    ws.send(Message::Text(text.to_string())).await.unwrap();
}

async fn next_text(ws: &mut PeerSocket) -> Option<String> {
    while let Some(frame) = ws.next().await {
        match frame {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

/// OPEN, then accept the namespace CONNECT
async fn accept_session(ws: &mut PeerSocket, namespace_prefix: &str) {
    send(ws, OPEN).await;
    let connect = next_text(ws).await.unwrap();
    assert_eq!(connect, format!("40{}", namespace_prefix));
    send(ws, &format!("40{}{{\"sid\":\"ns-sid\"}}", namespace_prefix)).await;
}

async fn recv_line(sub: &mut model_installer::Subscription) -> Option<String> {
    tokio::time::timeout(WAIT, sub.recv()).await.expect("timed out waiting for progress")
}

#[tokio::test]
async fn test_install_round_trip_over_socket() {
    let (endpoint, request_uri, peer) = spawn_peer(|mut ws| async move {
        accept_session(&mut ws, "").await;

        let request = next_text(&mut ws).await.unwrap();

        send(&mut ws, "2").await;
        let pong = next_text(&mut ws).await.unwrap();

        send(&mut ws, r#"42["progress","Downloading weights..."]"#).await;
        send(&mut ws, r#"42["progress","Installation complete"]"#).await;

        let goodbye = next_text(&mut ws).await;
        (request, pong, goodbye)
    })
    .await;

    let channel = SocketIoChannel::connect(&endpoint, "/").await.unwrap();
    assert!(channel.is_connected());
    assert_eq!(channel.handshake().sid, "peer-sid");

    let mut progress = channel.subscribe(PROGRESS_EVENT);
    let mut view = InstallerView::new();
    view.set_model_name("llama3");
    view.start_install(&channel).unwrap();

    assert!(view.is_installing());
    assert_eq!(view.progress(), &[SEED_MESSAGE.to_string()]);

    while view.is_installing() {
        let line = recv_line(&mut progress).await.unwrap();
        view.on_progress_message(line);
    }

    assert_eq!(
        view.progress(),
        &[
            "Generating installation commands...".to_string(),
            "Downloading weights...".to_string(),
            "Installation complete".to_string(),
        ]
    );

    drop(progress);
    channel.disconnect().await;

    let (request, pong, goodbye) = tokio::time::timeout(WAIT, peer).await.unwrap().unwrap();
    assert_eq!(request, r#"42["install_model","llama3"]"#);
    assert_eq!(pong, "3");
    assert_eq!(goodbye.as_deref(), Some("41"));

    let uri = request_uri.lock().unwrap().clone().unwrap();
    assert!(uri.starts_with("/socket.io/"));
    assert!(uri.contains("EIO=4"));
    assert!(uri.contains("transport=websocket"));
}

#[tokio::test]
async fn test_custom_namespace() {
    let (endpoint, _, peer) = spawn_peer(|mut ws| async move {
        accept_session(&mut ws, "/models,").await;
        let request = next_text(&mut ws).await.unwrap();
        // Events for other namespaces must not reach subscribers
        send(&mut ws, r#"42["progress","wrong namespace"]"#).await;
        send(&mut ws, r#"42/models,["progress","Installation complete"]"#).await;
        let _ = next_text(&mut ws).await;
        request
    })
    .await;

    let channel = SocketIoChannel::connect(&endpoint, "/models").await.unwrap();
    let mut progress = channel.subscribe(PROGRESS_EVENT);
    channel.emit(INSTALL_EVENT, "phi3").unwrap();

    assert_eq!(recv_line(&mut progress).await.as_deref(), Some("Installation complete"));

    drop(progress);
    channel.disconnect().await;
    let request = tokio::time::timeout(WAIT, peer).await.unwrap().unwrap();
    assert_eq!(request, r#"42/models,["install_model","phi3"]"#);
}

#[tokio::test]
async fn test_connect_error_is_reported() {
    let (endpoint, _, _peer) = spawn_peer(|mut ws| async move {
        send(&mut ws, OPEN).await;
        let _ = next_text(&mut ws).await;
        send(&mut ws, r#"44{"message":"Not authorized"}"#).await;
        let _ = next_text(&mut ws).await;
    })
    .await;

    let err = SocketIoChannel::connect(&endpoint, "/").await.err().unwrap();
    match err {
        ChannelError::Refused { namespace, message } => {
            assert_eq!(namespace, "/");
            assert_eq!(message, "Not authorized");
        }
        other => panic!("expected refusal, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_fails() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = SocketIoChannel::connect(&format!("http://{}", addr), "/").await;
    assert!(matches!(result, Err(ChannelError::Connect { .. })));
}

#[tokio::test]
async fn test_silent_peer_times_out_waiting_for_open() {
    let (endpoint, _, peer) = spawn_peer(|mut ws| async move {
        // Never sends OPEN; holds the socket until the client gives up
        next_text(&mut ws).await
    })
    .await;

    let result =
        SocketIoChannel::connect_with_timeout(&endpoint, "/", Duration::from_millis(200)).await;
    assert!(matches!(
        result.err(),
        Some(ChannelError::Timeout("engine.io open packet"))
    ));

    assert_eq!(tokio::time::timeout(WAIT, peer).await.unwrap().unwrap(), None);
}

#[tokio::test]
async fn test_unanswered_namespace_connect_times_out() {
    let (endpoint, _, peer) = spawn_peer(|mut ws| async move {
        send(&mut ws, OPEN).await;
        let connect = next_text(&mut ws).await;
        let _ = next_text(&mut ws).await;
        connect
    })
    .await;

    let result =
        SocketIoChannel::connect_with_timeout(&endpoint, "/", Duration::from_millis(200)).await;
    assert!(matches!(
        result.err(),
        Some(ChannelError::Timeout("namespace connect"))
    ));

    let connect = tokio::time::timeout(WAIT, peer).await.unwrap().unwrap();
    assert_eq!(connect.as_deref(), Some("40"));
}

#[tokio::test]
async fn test_missed_heartbeat_ends_subscriptions() {
    let (endpoint, _, peer) = spawn_peer(|mut ws| async move {
        send(
            &mut ws,
            r#"0{"sid":"peer-sid","upgrades":[],"pingInterval":100,"pingTimeout":100,"maxPayload":1000000}"#,
        )
        .await;
        let _ = next_text(&mut ws).await;
        send(&mut ws, r#"40{"sid":"ns-sid"}"#).await;
        // No pings from here on
        next_text(&mut ws).await
    })
    .await;

    let channel = SocketIoChannel::connect(&endpoint, "/").await.unwrap();
    let mut progress = channel.subscribe(PROGRESS_EVENT);

    assert_eq!(recv_line(&mut progress).await, None);
    assert!(!channel.is_connected());
    assert!(matches!(
        channel.emit(INSTALL_EVENT, "llama3"),
        Err(ChannelError::Closed)
    ));

    drop(progress);
    drop(channel);
    assert_eq!(tokio::time::timeout(WAIT, peer).await.unwrap().unwrap(), None);
}

#[tokio::test]
async fn test_peer_close_leaves_view_installing() {
    let (endpoint, _, peer) = spawn_peer(|mut ws| async move {
        accept_session(&mut ws, "").await;
        let _ = next_text(&mut ws).await;
        send(&mut ws, r#"42["progress","Downloading weights..."]"#).await;
        ws.close(None).await.unwrap();
    })
    .await;

    let channel = SocketIoChannel::connect(&endpoint, "/").await.unwrap();
    let mut progress = channel.subscribe(PROGRESS_EVENT);
    let mut view = InstallerView::new();
    view.set_model_name("llama3");
    view.start_install(&channel).unwrap();

    while let Some(line) = recv_line(&mut progress).await {
        view.on_progress_message(line);
    }

    // No transition on disconnect
    assert!(view.is_installing());
    assert_eq!(view.progress().len(), 2);
    assert!(!channel.is_connected());
    assert!(matches!(
        channel.emit(INSTALL_EVENT, "again"),
        Err(ChannelError::Closed)
    ));

    peer.await.unwrap();
}

#[tokio::test]
async fn test_structured_payload_is_appended_as_text() {
    let (endpoint, _, peer) = spawn_peer(|mut ws| async move {
        accept_session(&mut ws, "").await;
        let _ = next_text(&mut ws).await;
        send(&mut ws, "not a packet at all").await;
        send(&mut ws, r#"42["progress",{"percent":40}]"#).await;
        send(&mut ws, r#"42["status","ignored"]"#).await;
        send(&mut ws, r#"42["progress","Installation complete: model x ready"]"#).await;
        let _ = next_text(&mut ws).await;
    })
    .await;

    let channel = SocketIoChannel::connect(&endpoint, "/").await.unwrap();
    let mut progress = channel.subscribe(PROGRESS_EVENT);
    let mut view = InstallerView::new();
    view.set_model_name("x");
    view.start_install(&channel).unwrap();

    while view.is_installing() {
        let line = recv_line(&mut progress).await.unwrap();
        view.on_progress_message(line);
    }

    assert_eq!(
        &view.progress()[1..],
        &[
            r#"{"percent":40}"#.to_string(),
            "Installation complete: model x ready".to_string(),
        ]
    );

    drop(progress);
    channel.disconnect().await;
    peer.await.unwrap();
}

#[tokio::test]
async fn test_single_handler_per_mount() {
    let channel = MemoryChannel::new();

    // Mount, unmount, mount again
    let first = channel.subscribe(PROGRESS_EVENT);
    drop(first);
    let mut second = channel.subscribe(PROGRESS_EVENT);

    assert_eq!(channel.handler_count(PROGRESS_EVENT), 1);
    assert_eq!(channel.inject(PROGRESS_EVENT, "Downloading weights..."), 1);
    assert_eq!(second.try_recv().as_deref(), Some("Downloading weights..."));
    assert!(second.try_recv().is_none());
}

#[tokio::test]
async fn test_memory_channel_scenario() {
    let channel = MemoryChannel::new();
    let mut progress = channel.subscribe(PROGRESS_EVENT);
    let mut view = InstallerView::new();

    view.set_model_name("llama3");
    view.start_install(&channel).unwrap();
    assert_eq!(
        channel.emitted(),
        vec![(INSTALL_EVENT.to_string(), "llama3".to_string())]
    );

    channel.inject(PROGRESS_EVENT, "Downloading weights...");
    channel.inject(PROGRESS_EVENT, "Installation complete");
    while let Some(line) = progress.try_recv() {
        view.on_progress_message(line);
    }

    assert!(!view.is_installing());
    assert_eq!(view.progress().len(), 3);
}
