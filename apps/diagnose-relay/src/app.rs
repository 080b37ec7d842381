use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::error::CliError;
use crate::present::TerminalSink;
use crate::session::controls::TerminalSurface;
use crate::session::{ControlInput, RelaySession};
use crate::telemetry::logging;

const CONTROL_QUEUE: usize = 16;

pub async fn run(cli: Cli) -> Result<(), CliError> {
    logging::init(&cli.logging.to_config())?;
    let config = cli.relay_config()?;

    info!(
        target: "diagnose::app",
        host = %config.host,
        port = config.port,
        interval_ms = config.interval.period().as_millis() as u64,
        "connecting to diagnose backend"
    );
    let session = RelaySession::connect(
        &config,
        Box::new(TerminalSink::stdout()),
        Box::new(TerminalSurface::stderr()),
    )
    .await?;

    let (controls_tx, controls_rx) = mpsc::channel(CONTROL_QUEUE);
    if cli.autostart {
        let _ = controls_tx.send(ControlInput::Start).await;
    }
    let interrupt_tx = controls_tx.clone();
    let stdin_task = tokio::spawn(forward_controls(
        BufReader::new(tokio::io::stdin()),
        controls_tx,
    ));
    let interrupt_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = interrupt_tx.send(ControlInput::Quit).await;
        }
    });

    let report = session.run(controls_rx).await;
    stdin_task.abort();
    interrupt_task.abort();

    eprintln!(
        "session {}: presented {} of {} events, {} malformed dropped",
        report.session.state,
        report.session.presented,
        report.channel.received,
        report.channel.malformed
    );
    Ok(())
}

/// Turn control lines into inputs. Stops at end of input without closing
/// the session; other senders (e.g. Ctrl-C) may still be attached.
pub async fn forward_controls<R>(reader: R, tx: mpsc::Sender<ControlInput>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match line.parse::<ControlInput>() {
                Ok(input) => {
                    if tx.send(input).await.is_err() {
                        break;
                    }
                }
                Err(err) => eprintln!("{err}"),
            },
            Ok(None) => break,
            Err(err) => {
                warn!(target: "diagnose::app", error = %err, "failed to read controls");
                break;
            }
        }
    }
}
