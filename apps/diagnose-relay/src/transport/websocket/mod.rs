use diagnose_proto::{Command, decode_event};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};
use url::Url;

use super::{
    ChannelError, ChannelEvent, ChannelStats, ChannelStatsSnapshot, CommandChannel,
    ConnectionError,
};

pub mod config;
pub use config::WebSocketConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Persistent duplex channel to the diagnostics backend.
pub struct WebSocketChannel {
    url: Url,
    tx: Option<mpsc::UnboundedSender<Command>>,
    open: Arc<AtomicBool>,
    stats: Arc<ChannelStats>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl WebSocketChannel {
    /// Open the channel. Returns only after the handshake succeeded, so a
    /// channel that exists is a channel that was open at least once.
    pub async fn connect(
        config: &WebSocketConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ChannelEvent>), ConnectionError> {
        let url = config.build_url()?;
        let (ws_stream, _) =
            connect_async(url.as_str())
                .await
                .map_err(|source| ConnectionError::Handshake {
                    url: url.to_string(),
                    source: Box::new(source),
                })?;
        info!(target: "diagnose::channel", %url, "backend channel open");

        let (ws_sender, ws_receiver) = ws_stream.split();
        let (tx_out, rx_out) = mpsc::unbounded_channel::<Command>();
        let (tx_in, rx_in) = mpsc::unbounded_channel::<ChannelEvent>();

        let open = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(ChannelStats::default());

        let writer = tokio::spawn(write_commands(ws_sender, rx_out, open.clone()));
        let reader = tokio::spawn(read_events(
            ws_receiver,
            tx_in,
            open.clone(),
            stats.clone(),
        ));

        Ok((
            Self {
                url,
                tx: Some(tx_out),
                open,
                stats,
                reader: Some(reader),
                writer: Some(writer),
            },
            rx_in,
        ))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn stats(&self) -> ChannelStatsSnapshot {
        self.stats.snapshot()
    }

    /// Close the channel. Commands queued before the call are still flushed
    /// to the backend; anything sent afterwards fails with `Closed`.
    pub async fn close(&mut self) {
        self.open.store(false, Ordering::SeqCst);
        self.tx.take();

        if let Some(writer) = self.writer.take() {
            if tokio::time::timeout(CLOSE_GRACE, writer).await.is_err() {
                warn!(target: "diagnose::channel", url = %self.url, "writer did not flush before close");
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        debug!(target: "diagnose::channel", url = %self.url, "backend channel closed");
    }
}

impl CommandChannel for WebSocketChannel {
    fn send(&self, command: Command) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed { command });
        }
        let tx = self.tx.as_ref().ok_or(ChannelError::Closed { command })?;
        tx.send(command)
            .map_err(|_| ChannelError::Closed { command })
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        if let Some(task) = self.writer.take() {
            task.abort();
        }
        if let Some(task) = self.reader.take() {
            task.abort();
        }
    }
}

async fn write_commands(
    mut ws_sender: SplitSink<WsStream, Message>,
    mut rx_out: mpsc::UnboundedReceiver<Command>,
    open: Arc<AtomicBool>,
) {
    while let Some(command) = rx_out.recv().await {
        debug!(target: "diagnose::channel", %command, "sending command");
        if let Err(err) = ws_sender
            .send(Message::Text(command.as_str().to_string()))
            .await
        {
            warn!(target: "diagnose::channel", %command, error = %err, "command send failed");
            open.store(false, Ordering::SeqCst);
            return;
        }
    }
    let _ = ws_sender.close().await;
}

async fn read_events(
    mut ws_receiver: SplitStream<WsStream>,
    tx_in: mpsc::UnboundedSender<ChannelEvent>,
    open: Arc<AtomicBool>,
    stats: Arc<ChannelStats>,
) {
    while let Some(frame) = ws_receiver.next().await {
        let payload = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(err) => {
                    stats.record_malformed();
                    warn!(target: "diagnose::channel", error = %err, "dropping non-utf8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                debug!(target: "diagnose::channel", ?frame, "backend sent close");
                break;
            }
            Ok(_) => continue,
            Err(err) => {
                warn!(target: "diagnose::channel", error = %err, "channel read failed");
                break;
            }
        };

        match decode_event(&payload) {
            Ok(event) => {
                stats.record_received();
                trace!(target: "diagnose::channel", target_id = %event.target_id, "event received");
                if tx_in.send(ChannelEvent::Event(event)).is_err() {
                    break;
                }
            }
            Err(err) => {
                stats.record_malformed();
                warn!(
                    target: "diagnose::channel",
                    error = %err,
                    bytes = payload.len(),
                    "dropping malformed event payload"
                );
            }
        }
    }

    open.store(false, Ordering::SeqCst);
    let _ = tx_in.send(ChannelEvent::Closed);
}
