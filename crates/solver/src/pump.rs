//! Drives an upstream event-stream body through the line splitter and
//! the `done`-event parser.
//!
//! Each complete line is forwarded to the subscriber channel before it is
//! parsed, so the subscriber sees every line in order up to and including
//! the one that ends the `done` event. A subscriber that goes away does
//! not stop the read: the upstream is drained until the `done` event so
//! the result can still be filed.

use std::fmt::Display;
use std::time::Duration;

use futures::{Stream, StreamExt};
use loadplan_core::event_stream::{
    forwarded_line, EventStreamParser, LineSplitter, ParseStep, TerminalEvent,
};
use tokio::sync::mpsc;

use crate::api::SolverError;

/// How a pumped stream ended.
#[derive(Debug)]
pub enum StreamOutcome {
    /// A `done` event was seen and closed.
    Terminal(TerminalEvent),
    /// The upstream ended without a `done` event.
    Ended,
    /// The subscriber went away and the upstream then ended without a
    /// `done` event.
    ClientGone,
    /// Reading the upstream failed or stalled.
    Failed(SolverError),
}

/// Read `upstream` to completion or until the `done` event closes.
///
/// `idle` bounds the wait for each chunk, including while draining after
/// the subscriber is gone. Lines are sent to `lines` with exactly one
/// trailing `\n`.
pub async fn pump<S, B, E>(
    upstream: S,
    lines: mpsc::Sender<String>,
    idle: Duration,
) -> StreamOutcome
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut upstream = std::pin::pin!(upstream);
    let mut splitter = LineSplitter::new();
    let mut parser = EventStreamParser::new();
    let mut subscriber = Some(lines);

    loop {
        let next = match tokio::time::timeout(idle, upstream.next()).await {
            Ok(next) => next,
            Err(_) => return StreamOutcome::Failed(SolverError::IdleTimeout(idle)),
        };

        match next {
            Some(Ok(chunk)) => {
                for line in splitter.push(chunk.as_ref()) {
                    if let Some(event) = forward(&mut subscriber, &mut parser, &line).await {
                        return StreamOutcome::Terminal(event);
                    }
                }
            }
            Some(Err(e)) => return StreamOutcome::Failed(SolverError::Stream(e.to_string())),
            None => {
                if let Some(tail) = splitter.finish() {
                    if let Some(event) = forward(&mut subscriber, &mut parser, &tail).await {
                        return StreamOutcome::Terminal(event);
                    }
                }
                return match (parser.finish(), subscriber) {
                    (Some(event), _) => StreamOutcome::Terminal(event),
                    (None, Some(_)) => StreamOutcome::Ended,
                    (None, None) => StreamOutcome::ClientGone,
                };
            }
        }
    }
}

/// Forward one line while the subscriber is there, then feed it to the
/// parser. Returns the terminal event once the `done` event closes.
async fn forward(
    subscriber: &mut Option<mpsc::Sender<String>>,
    parser: &mut EventStreamParser,
    line: &str,
) -> Option<TerminalEvent> {
    if let Some(lines) = subscriber.as_ref() {
        if lines.send(forwarded_line(line)).await.is_err() {
            tracing::debug!("Stream subscriber gone, draining upstream for the done event");
            *subscriber = None;
        }
    }
    match parser.push_line(line) {
        ParseStep::Continue => None,
        ParseStep::Terminal(event) => Some(event),
    }
}
