use diagnose_proto::DiagnosticEvent;
use std::io::{self, Write};
use tracing::warn;

/// Applies the visual emphasis for one event. Called synchronously from the
/// consumer tick; must not reach back into the session.
pub trait PresentationSink: Send {
    fn highlight(&mut self, event: &DiagnosticEvent);
}

/// Writes one line per highlighted event.
pub struct TerminalSink<W: Write + Send> {
    out: W,
}

impl TerminalSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> PresentationSink for TerminalSink<W> {
    fn highlight(&mut self, event: &DiagnosticEvent) {
        let line = format_highlight(event);
        if let Err(err) = writeln!(self.out, "{line}").and_then(|()| self.out.flush()) {
            warn!(target: "diagnose::present", error = %err, "failed to write highlight");
        }
    }
}

pub fn format_highlight(event: &DiagnosticEvent) -> String {
    match (event.filename(), event.lineno()) {
        (Some(file), Some(line)) => format!("→ {}  {file}:{line}", event.target_id),
        (Some(file), None) => format!("→ {}  {file}", event.target_id),
        _ => format!("→ {}", event.target_id),
    }
}
