use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::controls::ControlSurface;
use super::{Controller, SessionSnapshot, SessionState};
use crate::config::RelayConfig;
use crate::present::PresentationSink;
use crate::transport::websocket::WebSocketChannel;
use crate::transport::{ChannelEvent, ChannelStatsSnapshot, CommandChannel, ConnectionError};

/// A click on the control surface, a status request, or the user leaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlInput {
    Start,
    Pause,
    Resume,
    Toggle,
    Stop,
    Status,
    /// Stop an active session, then end the loop whatever the state.
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown control `{0}` (expected start, pause, resume, toggle, stop, status or quit)")]
pub struct UnknownControl(pub String);

impl FromStr for ControlInput {
    type Err = UnknownControl;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(ControlInput::Start),
            "pause" => Ok(ControlInput::Pause),
            "resume" => Ok(ControlInput::Resume),
            "" | "toggle" => Ok(ControlInput::Toggle),
            "stop" => Ok(ControlInput::Stop),
            "quit" | "q" => Ok(ControlInput::Quit),
            "status" | "s" => Ok(ControlInput::Status),
            other => Err(UnknownControl(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayReport {
    pub session: SessionSnapshot,
    pub channel: ChannelStatsSnapshot,
}

/// One relay session against a live backend: the controller plus the
/// inbound half of its channel.
pub struct RelaySession {
    controller: Controller<WebSocketChannel>,
    inbound: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl RelaySession {
    /// Open the backend channel and build the controller. A channel that
    /// cannot be opened means no session at all, so this fails right here.
    pub async fn connect(
        config: &RelayConfig,
        sink: Box<dyn PresentationSink>,
        surface: Box<dyn ControlSurface>,
    ) -> Result<Self, ConnectionError> {
        let (channel, inbound) = WebSocketChannel::connect(&config.websocket()).await?;
        let controller = Controller::new(channel, config.interval, sink, surface);
        Ok(Self {
            controller,
            inbound,
        })
    }

    pub fn controller(&self) -> &Controller<WebSocketChannel> {
        &self.controller
    }

    /// Drive the session until it stops or the control inputs end, then
    /// close the channel after the final command is flushed.
    pub async fn run(mut self, mut controls: mpsc::Receiver<ControlInput>) -> RelayReport {
        let session = drive(&mut self.controller, &mut self.inbound, &mut controls).await;
        let channel = self.controller.channel().stats();
        self.controller.channel_mut().close().await;
        let report = RelayReport { session, channel };
        info!(
            target: "diagnose::session",
            presented = report.session.presented,
            received = report.channel.received,
            malformed = report.channel.malformed,
            "relay session finished"
        );
        report
    }
}

/// The single cooperative loop: arrivals, consumer ticks and control inputs
/// are handled one at a time on the caller's task. Returns once the session
/// is stopped, or on `Quit`/closed inputs, which stop an active session and
/// leave an idle one as it is.
pub async fn drive<C: CommandChannel>(
    controller: &mut Controller<C>,
    inbound: &mut mpsc::UnboundedReceiver<ChannelEvent>,
    controls: &mut mpsc::Receiver<ControlInput>,
) -> SessionSnapshot {
    let mut inbound_open = true;

    while controller.state() != SessionState::Stopped {
        tokio::select! {
            biased;

            input = controls.recv() => match input {
                Some(ControlInput::Quit) => {
                    quit(controller);
                    break;
                }
                Some(input) => apply_input(controller, input),
                None => {
                    debug!(target: "diagnose::session", "control inputs closed");
                    quit(controller);
                    break;
                }
            },
            event = inbound.recv(), if inbound_open => match event {
                Some(event) => controller.on_channel_event(event),
                None => inbound_open = false,
            },
            () = controller.next_tick() => {
                controller.tick();
            }
        }
    }

    controller.snapshot()
}

fn quit<C: CommandChannel>(controller: &mut Controller<C>) {
    if matches!(
        controller.state(),
        SessionState::Running | SessionState::Paused
    ) {
        apply_input(controller, ControlInput::Stop);
    }
}

fn apply_input<C: CommandChannel>(controller: &mut Controller<C>, input: ControlInput) {
    let result = match input {
        ControlInput::Start => controller.start(),
        ControlInput::Pause => controller.pause(),
        ControlInput::Resume => controller.resume(),
        ControlInput::Toggle => controller.toggle().map(|_| ()),
        ControlInput::Stop => controller.stop(),
        ControlInput::Status => {
            controller.report_status();
            Ok(())
        }
        ControlInput::Quit => {
            quit(controller);
            Ok(())
        }
    };
    if let Err(err) = result {
        warn!(target: "diagnose::session", ?input, error = %err, "control input rejected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::TickInterval;
    use crate::session::controls::ControlView;
    use crate::transport::mock::MockChannel;
    use diagnose_proto::{Command, DiagnosticEvent};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::sleep;

    #[derive(Clone, Default)]
    struct RecordingSink(Arc<Mutex<Vec<String>>>);

    impl PresentationSink for RecordingSink {
        fn highlight(&mut self, event: &DiagnosticEvent) {
            self.0.lock().unwrap().push(event.target_id.clone());
        }
    }

    struct QuietSurface;

    impl ControlSurface for QuietSurface {
        fn render(&mut self, _view: &ControlView) {}
    }

    struct Running {
        inbound: mpsc::UnboundedSender<ChannelEvent>,
        controls: mpsc::Sender<ControlInput>,
        channel: MockChannel,
        sink: RecordingSink,
        task: tokio::task::JoinHandle<SessionSnapshot>,
    }

    fn spawn_driver(interval_ms: u64) -> Running {
        let channel = MockChannel::new();
        let sink = RecordingSink::default();
        let mut controller = Controller::new(
            channel.clone(),
            TickInterval::from_millis(interval_ms).unwrap(),
            Box::new(sink.clone()),
            Box::new(QuietSurface),
        );
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        let (controls_tx, mut controls_rx) = mpsc::channel(8);
        let task = tokio::spawn(async move {
            drive(&mut controller, &mut inbound_rx, &mut controls_rx).await
        });
        Running {
            inbound: inbound_tx,
            controls: controls_tx,
            channel,
            sink,
            task,
        }
    }

    fn push(running: &Running, targets: &[&str]) {
        for target in targets {
            running
                .inbound
                .send(ChannelEvent::Event(DiagnosticEvent::new(*target)))
                .unwrap();
        }
    }

    #[test]
    fn parses_control_lines() {
        assert_eq!("start".parse(), Ok(ControlInput::Start));
        assert_eq!(" PAUSE ".parse(), Ok(ControlInput::Pause));
        assert_eq!("".parse(), Ok(ControlInput::Toggle));
        assert_eq!("stop".parse(), Ok(ControlInput::Stop));
        assert_eq!("q".parse(), Ok(ControlInput::Quit));
        assert_eq!("status".parse(), Ok(ControlInput::Status));
        assert_eq!(
            "rewind".parse::<ControlInput>(),
            Err(UnknownControl("rewind".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn paces_events_at_the_tick_interval() {
        let running = spawn_driver(500);
        running.controls.send(ControlInput::Start).await.unwrap();
        push(&running, &["a", "b", "c"]);

        sleep(Duration::from_millis(1100)).await;
        assert_eq!(*running.sink.0.lock().unwrap(), vec!["a", "b"]);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(*running.sink.0.lock().unwrap(), vec!["a", "b", "c"]);

        running.controls.send(ControlInput::Stop).await.unwrap();
        let snapshot = running.task.await.unwrap();
        assert_eq!(snapshot.state, SessionState::Stopped);
        assert_eq!(snapshot.presented, 3);
        assert_eq!(running.channel.sent(), vec![Command::Start, Command::Stop]);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_holds_events_until_resume() {
        let running = spawn_driver(500);
        running.controls.send(ControlInput::Start).await.unwrap();
        push(&running, &["a", "b"]);
        running.controls.send(ControlInput::Pause).await.unwrap();
        push(&running, &["c"]);

        sleep(Duration::from_secs(5)).await;
        assert!(running.sink.0.lock().unwrap().is_empty());

        running.controls.send(ControlInput::Toggle).await.unwrap();
        sleep(Duration::from_millis(1600)).await;
        assert_eq!(*running.sink.0.lock().unwrap(), vec!["a", "b", "c"]);

        drop(running.controls);
        let snapshot = running.task.await.unwrap();
        assert_eq!(snapshot.state, SessionState::Stopped);
        assert_eq!(running.channel.sent(), vec![Command::Start, Command::Stop]);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_controls_while_idle_sends_nothing() {
        let running = spawn_driver(500);
        push(&running, &["a"]);
        sleep(Duration::from_millis(10)).await;
        drop(running.controls);

        let snapshot = running.task.await.unwrap();
        assert_eq!(snapshot.state, SessionState::Idle);
        assert_eq!(snapshot.pending, 1);
        assert!(running.channel.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn quit_ends_the_loop_from_any_state() {
        let running = spawn_driver(500);
        running.controls.send(ControlInput::Quit).await.unwrap();
        let snapshot = running.task.await.unwrap();
        assert_eq!(snapshot.state, SessionState::Idle);

        let running = spawn_driver(500);
        running.controls.send(ControlInput::Start).await.unwrap();
        running.controls.send(ControlInput::Quit).await.unwrap();
        let snapshot = running.task.await.unwrap();
        assert_eq!(snapshot.state, SessionState::Stopped);
        assert_eq!(running.channel.sent(), vec![Command::Start, Command::Stop]);
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_draining_after_backend_closes() {
        let running = spawn_driver(200);
        running.controls.send(ControlInput::Start).await.unwrap();
        push(&running, &["a", "b"]);
        running.inbound.send(ChannelEvent::Closed).unwrap();
        drop(running.inbound);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(*running.sink.0.lock().unwrap(), vec!["a", "b"]);

        running.controls.send(ControlInput::Stop).await.unwrap();
        let snapshot = running.task.await.unwrap();
        assert_eq!(snapshot.presented, 2);
    }
}
