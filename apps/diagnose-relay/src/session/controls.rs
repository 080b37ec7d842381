use std::io::{self, Write};
use tracing::{info, warn};

use super::{SessionSnapshot, SessionState};

/// Label on the start/pause toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleLabel {
    Start,
    Pause,
    Resume,
}

impl ToggleLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            ToggleLabel::Start => "start",
            ToggleLabel::Pause => "pause",
            ToggleLabel::Resume => "resume",
        }
    }
}

/// What the control surface should show. Derived from the session state
/// alone, so it can never advertise an action the lifecycle forbids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlView {
    pub toggle: ToggleLabel,
    pub toggle_enabled: bool,
    pub stop_enabled: bool,
}

impl ControlView {
    pub fn for_state(state: SessionState) -> Self {
        match state {
            SessionState::Idle => Self {
                toggle: ToggleLabel::Start,
                toggle_enabled: true,
                stop_enabled: false,
            },
            SessionState::Running => Self {
                toggle: ToggleLabel::Pause,
                toggle_enabled: true,
                stop_enabled: true,
            },
            SessionState::Paused => Self {
                toggle: ToggleLabel::Resume,
                toggle_enabled: true,
                stop_enabled: true,
            },
            SessionState::Stopped => Self {
                toggle: ToggleLabel::Start,
                toggle_enabled: false,
                stop_enabled: false,
            },
        }
    }
}

/// The start/pause toggle and stop control the user clicks. Owned outside
/// the controller; the controller only pushes new views into it.
pub trait ControlSurface: Send {
    fn render(&mut self, view: &ControlView);

    fn report(&mut self, _snapshot: &SessionSnapshot) {}
}

/// Prints the available triggers after every change.
pub struct TerminalSurface<W: Write + Send> {
    out: W,
}

impl TerminalSurface<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> TerminalSurface<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, line: &str) {
        if let Err(err) = writeln!(self.out, "{line}").and_then(|()| self.out.flush()) {
            warn!(target: "diagnose::controls", error = %err, "failed to write controls");
        }
    }
}

impl<W: Write + Send> ControlSurface for TerminalSurface<W> {
    fn render(&mut self, view: &ControlView) {
        info!(
            target: "diagnose::controls",
            toggle = view.toggle.as_str(),
            toggle_enabled = view.toggle_enabled,
            stop_enabled = view.stop_enabled,
            "controls updated"
        );
        let line = render_line(view);
        self.write_line(&line);
    }

    fn report(&mut self, snapshot: &SessionSnapshot) {
        match serde_json::to_string(snapshot) {
            Ok(json) => self.write_line(&format!("[status] {json}")),
            Err(err) => warn!(target: "diagnose::controls", error = %err, "failed to encode status"),
        }
    }
}

pub fn render_line(view: &ControlView) -> String {
    let toggle = if view.toggle_enabled {
        format!("[{}]", view.toggle.as_str())
    } else {
        format!("({})", view.toggle.as_str())
    };
    let stop = if view.stop_enabled { "[stop]" } else { "(stop)" };
    format!("controls: {toggle} {stop} [status]")
}
