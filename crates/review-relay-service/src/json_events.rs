//! JSON event-ingestion provider.
//!
//! The administrative/test protocol: newline-delimited JSON objects on
//! stdin, one normalized event each, in the tagged shape the event model
//! serializes to. Malformed lines are logged and skipped; unresolvable
//! revisions flow through the orchestrator and fail the affected event
//! rather than the process. EOF and cancellation both end the watch
//! cleanly.

use review_relay_core::Event;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

#[cfg(test)]
#[path = "json_events_tests.rs"]
mod tests;

/// Provider name stamped onto ingested events.
pub const PROVIDER: &str = "json";

/// Watch stdin for events until EOF or cancellation.
pub async fn watch_stdin(
    events: mpsc::Sender<Event>,
    shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    info!("starting watcher");
    watch_lines(BufReader::new(tokio::io::stdin()), events, shutdown).await
}

/// Watch any line-oriented reader for events.
pub async fn watch_lines<R>(
    reader: R,
    events: mpsc::Sender<Event>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            // EOF: clean stop
            return Ok(());
        };

        if line.trim().is_empty() {
            continue;
        }

        let event = match serde_json::from_str::<Event>(&line) {
            Ok(event) => event.with_provider(PROVIDER),
            Err(err) => {
                error!(error = %err, "invalid event line");
                continue;
            }
        };

        if events.send(event).await.is_err() {
            // orchestrator gone: nothing left to deliver to
            return Ok(());
        }
    }
}
