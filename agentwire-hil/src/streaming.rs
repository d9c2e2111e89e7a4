//! Decoding of the resume stream
//!
//! The resume stream is a second SSE connection, separate from the primary
//! chat stream. It has its own [`FrameReader`] and recognizes four event
//! types; everything else is logged and skipped.

use agentwire_core::frame::{Frame, FrameReader};
use agentwire_core::{invoke_guarded, RawEvent};
use futures::{Stream, StreamExt};

use crate::error::ExecutionError;

/// One recognized event of the resume stream
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeStreamEvent {
    /// Execution picked up again
    ResumeStart {
        thread_id: Option<String>,
        action: Option<String>,
    },
    /// Graph progress, in the same envelope as the primary stream
    GraphUpdate(RawEvent),
    /// Message progress, in the same envelope as the primary stream
    MessageStream(RawEvent),
    /// Execution stopped again (finished, failed or re-interrupted)
    ResumeEnd {
        thread_id: Option<String>,
        status: Option<String>,
    },
}

impl ResumeStreamEvent {
    /// Recognize a decoded envelope; `None` for other event types
    pub fn from_raw(raw: RawEvent) -> Option<Self> {
        let owned = |name: &str| raw.field_str(name).map(str::to_string);
        let event = match raw.event_type.as_str() {
            "resume_start" => ResumeStreamEvent::ResumeStart {
                thread_id: owned("thread_id"),
                action: owned("action"),
            },
            "resume_end" => ResumeStreamEvent::ResumeEnd {
                thread_id: owned("thread_id"),
                status: owned("status"),
            },
            "graph_update" => ResumeStreamEvent::GraphUpdate(raw.clone()),
            "message_stream" => ResumeStreamEvent::MessageStream(raw.clone()),
            _ => return None,
        };
        Some(event)
    }

    /// The envelope, for events the primary router also understands
    ///
    /// Pass it to [`agentwire_core::SseParser::dispatch`] to run interrupt
    /// detection on resumed output.
    pub fn raw(&self) -> Option<&RawEvent> {
        match self {
            ResumeStreamEvent::GraphUpdate(raw) | ResumeStreamEvent::MessageStream(raw) => {
                Some(raw)
            }
            _ => None,
        }
    }
}

/// Receives resume stream events
///
/// Implemented for closures over [`ResumeStreamEvent`].
pub trait ResumeCallbacks: Send + Sync {
    fn on_event(&self, event: &ResumeStreamEvent);

    /// A frame could not be decoded; the stream continues
    fn on_error(&self, _message: &str) {}
}

impl<F> ResumeCallbacks for F
where
    F: Fn(&ResumeStreamEvent) + Send + Sync,
{
    fn on_event(&self, event: &ResumeStreamEvent) {
        self(event)
    }
}

/// What a finished resume stream looked like
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeStreamSummary {
    /// Recognized events delivered
    pub events: usize,
    /// Well-formed events of other types
    pub ignored: usize,
    /// Frames that were not valid JSON envelopes
    pub failed: usize,
    /// Whether a `resume_end` event arrived
    pub resume_ended: bool,
    /// Whether the stream ended with `[DONE]` rather than a bare close
    pub done_received: bool,
}

/// Read a resume stream to the end
///
/// Stops at `[DONE]` or when the connection closes. A transport failure is
/// reported to `callbacks` and returned.
pub async fn consume_resume_stream<S, B>(
    stream: S,
    callbacks: &dyn ResumeCallbacks,
) -> Result<ResumeStreamSummary, ExecutionError>
where
    S: Stream<Item = Result<B, ExecutionError>>,
    B: AsRef<[u8]>,
{
    let mut reader = FrameReader::new();
    let mut summary = ResumeStreamSummary::default();
    futures::pin_mut!(stream);

    loop {
        let frames = match stream.next().await {
            Some(Ok(chunk)) => reader.feed(chunk.as_ref()),
            Some(Err(e)) => {
                log::error!("Resume stream failed: {}", e);
                let message = e.to_string();
                invoke_guarded("resume on_error", || callbacks.on_error(&message));
                return Err(e);
            }
            None => {
                let tail = reader.finish();
                deliver(&tail, callbacks, &mut summary);
                return Ok(summary);
            }
        };
        if deliver(&frames, callbacks, &mut summary) {
            return Ok(summary);
        }
    }
}

/// Returns `true` once `[DONE]` is seen
fn deliver(
    frames: &[Frame],
    callbacks: &dyn ResumeCallbacks,
    summary: &mut ResumeStreamSummary,
) -> bool {
    for frame in frames {
        let payload = match frame {
            Frame::Done => {
                summary.done_received = true;
                return true;
            }
            Frame::Data(payload) => payload,
        };

        let raw = match serde_json::from_str::<RawEvent>(payload) {
            Ok(raw) => raw,
            Err(e) => {
                summary.failed += 1;
                let message = format!("Failed to decode resume frame: {}", e);
                log::debug!("{}", message);
                invoke_guarded("resume on_error", || callbacks.on_error(&message));
                continue;
            }
        };

        let event_type = raw.event_type.clone();
        match ResumeStreamEvent::from_raw(raw) {
            Some(event) => {
                summary.events += 1;
                if matches!(event, ResumeStreamEvent::ResumeEnd { .. }) {
                    summary.resume_ended = true;
                }
                invoke_guarded("resume on_event", || callbacks.on_event(&event));
            }
            None => {
                summary.ignored += 1;
                log::debug!("Ignoring resume stream event '{}'", event_type);
            }
        }
    }
    false
}
