use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use diagnose_relay::config::RelayConfig;
use diagnose_relay::present::PresentationSink;
use diagnose_relay::session::controls::{ControlSurface, ControlView};
use diagnose_relay::session::{ControlInput, RelaySession, SessionState};
use diagnose_relay::transport::websocket::{WebSocketChannel, WebSocketConfig};
use diagnose_relay::transport::{ChannelError, ChannelEvent, CommandChannel, ConnectionError};
use diagnose_relay::{Command, DiagnosticEvent};

/// What the fake backend pushes once it hears `start` (or right away).
#[derive(Clone)]
struct Backend {
    frames: Arc<Vec<String>>,
    wait_for_start: bool,
    received: mpsc::UnboundedSender<String>,
}

async fn backend_socket(ws: WebSocketUpgrade, State(backend): State<Backend>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_backend(socket, backend))
}

async fn serve_backend(mut socket: WebSocket, backend: Backend) {
    let mut pushed = false;
    if !backend.wait_for_start {
        push_frames(&mut socket, &backend).await;
        pushed = true;
    }
    while let Some(Ok(message)) = socket.recv().await {
        let WsMessage::Text(text) = message else {
            continue;
        };
        let _ = backend.received.send(text.clone());
        if text == "start" && !pushed {
            push_frames(&mut socket, &backend).await;
            pushed = true;
        }
    }
}

async fn push_frames(socket: &mut WebSocket, backend: &Backend) {
    for frame in backend.frames.iter() {
        if socket.send(WsMessage::Text(frame.clone())).await.is_err() {
            return;
        }
    }
}

async fn spawn_backend(
    frames: Vec<String>,
    wait_for_start: bool,
) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let (received_tx, received_rx) = mpsc::unbounded_channel();
    let backend = Backend {
        frames: Arc::new(frames),
        wait_for_start,
        received: received_tx,
    };
    let router = Router::new()
        .route("/", get(backend_socket))
        .with_state(backend);
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    (addr, received_rx)
}

fn trace_frame(target: &str, lineno: u64) -> String {
    serde_json::json!({
        "id": lineno,
        "filename": "/srv/app.py",
        "lineno": lineno,
        "targetId": target,
        "cb_rts": [],
    })
    .to_string()
}

#[derive(Clone, Default)]
struct RecordingSink(Arc<Mutex<Vec<String>>>);

impl RecordingSink {
    fn targets(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl PresentationSink for RecordingSink {
    fn highlight(&mut self, event: &DiagnosticEvent) {
        self.0.lock().unwrap().push(event.target_id.clone());
    }
}

#[derive(Clone, Default)]
struct RecordingSurface(Arc<Mutex<Vec<ControlView>>>);

impl ControlSurface for RecordingSurface {
    fn render(&mut self, view: &ControlView) {
        self.0.lock().unwrap().push(*view);
    }
}

async fn next_event(inbound: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
    timeout(Duration::from_secs(5), inbound.recv())
        .await
        .expect("event timeout")
        .expect("inbound open")
}

#[tokio::test]
async fn relays_events_in_order_between_start_and_stop() {
    let _ = tracing_subscriber::fmt::try_init();
    let (addr, mut received) = spawn_backend(
        vec![
            trace_frame("a", 1),
            "{not json".to_string(),
            trace_frame("b", 2),
            trace_frame("c", 3),
        ],
        true,
    )
    .await;

    let config = RelayConfig::new("127.0.0.1", addr.port(), 20).expect("config");
    let sink = RecordingSink::default();
    let surface = RecordingSurface::default();
    let session = RelaySession::connect(&config, Box::new(sink.clone()), Box::new(surface.clone()))
        .await
        .expect("connect");
    assert_eq!(session.controller().state(), SessionState::Idle);

    let (controls_tx, controls_rx) = mpsc::channel(8);
    let run = tokio::spawn(session.run(controls_rx));
    controls_tx.send(ControlInput::Start).await.unwrap();

    timeout(Duration::from_secs(5), async {
        while sink.targets().len() < 3 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("events presented");

    controls_tx.send(ControlInput::Stop).await.unwrap();
    let report = timeout(Duration::from_secs(5), run)
        .await
        .expect("run timeout")
        .expect("run task");

    assert_eq!(sink.targets(), vec!["a", "b", "c"]);
    assert_eq!(report.session.state, SessionState::Stopped);
    assert_eq!(report.session.presented, 3);
    assert_eq!(report.channel.received, 3);
    assert_eq!(report.channel.malformed, 1);

    let mut commands = Vec::new();
    while commands.len() < 2 {
        let command = timeout(Duration::from_secs(5), received.recv())
            .await
            .expect("backend command timeout")
            .expect("backend open");
        commands.push(command);
    }
    assert_eq!(commands, vec!["start", "stop"]);

    let views = surface.0.lock().unwrap().clone();
    assert!(!views.first().expect("initial render").stop_enabled);
    let last = views.last().expect("final render");
    assert!(!last.toggle_enabled && !last.stop_enabled);
}

#[tokio::test]
async fn malformed_payload_is_dropped_and_channel_stays_usable() {
    let (addr, mut received) = spawn_backend(
        vec![
            trace_frame("first", 10),
            r#"{"lineno": 11}"#.to_string(),
            trace_frame("second", 12),
        ],
        false,
    )
    .await;

    let (mut channel, mut inbound) = WebSocketChannel::connect(&WebSocketConfig::new(
        "localhost",
        addr.port(),
    ))
    .await
    .expect("connect");

    let ChannelEvent::Event(first) = next_event(&mut inbound).await else {
        panic!("expected first event");
    };
    let ChannelEvent::Event(second) = next_event(&mut inbound).await else {
        panic!("expected second event");
    };
    assert_eq!(first.target_id, "first");
    assert_eq!(second.target_id, "second");
    assert_eq!(second.lineno(), Some(12));
    assert!(inbound.try_recv().is_err());

    channel.send(Command::Start).expect("channel still open");
    let command = timeout(Duration::from_secs(5), received.recv())
        .await
        .expect("backend command timeout")
        .expect("backend open");
    assert_eq!(command, "start");

    let stats = channel.stats();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.malformed, 1);

    channel.close().await;
    assert_eq!(
        channel.send(Command::Stop),
        Err(ChannelError::Closed {
            command: Command::Stop
        })
    );
}

#[tokio::test]
async fn unreachable_backend_fails_at_construction() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener bind");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);

    let config = RelayConfig::new("127.0.0.1", port, 500).expect("config");
    let result = RelaySession::connect(
        &config,
        Box::new(RecordingSink::default()),
        Box::new(RecordingSurface::default()),
    )
    .await;
    assert!(matches!(result, Err(ConnectionError::Handshake { .. })));
}
