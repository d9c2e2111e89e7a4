//! Driving a parser from a live byte stream

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use parking_lot::Mutex;

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::{Frame, FrameReader};
use crate::hooks::SseCallbacks;
use crate::router::events::StreamEvent;
use crate::router::{ParseOutcome, SseParser};

/// What a finished stream looked like
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Data frames handed to the parser
    pub frames: usize,
    /// Frames the parser could not decode
    pub failed_frames: usize,
    /// Whether the stream ended with `[DONE]` rather than a bare close
    pub done_received: bool,
    /// Concatenated primary content
    pub content: String,
}

/// Read `stream` to the end, routing every frame through `parser`
///
/// Stops at the `[DONE]` sentinel or when the stream closes, whichever comes
/// first, and emits [`StreamEvent::StreamEnded`] in both cases. A transport
/// error is reported through [`StreamEvent::Error`] and returned; the frame
/// buffer is dropped on every exit path.
///
/// # Example
/// ```
/// use agentwire_core::{consume_stream, SseCallbacks, SseParser};
///
/// # tokio_test::block_on(async {
/// let chunks = vec![
///     Ok::<_, std::io::Error>(b"data: {\"type\":\"content\",\"content\":\"He\"}\nda".to_vec()),
///     Ok(b"ta: {\"type\":\"content\",\"content\":\"llo\"}\n".to_vec()),
/// ];
/// let summary = consume_stream(futures::stream::iter(chunks), &SseParser::new(), &SseCallbacks::new())
///     .await
///     .unwrap();
/// assert_eq!(summary.content, "Hello");
/// assert!(!summary.done_received);
/// # });
/// ```
pub async fn consume_stream<S, B, E>(
    stream: S,
    parser: &SseParser,
    callbacks: &SseCallbacks,
) -> ProtocolResult<StreamSummary>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let content = Arc::new(Mutex::new(String::new()));
    let tee = tee_content(callbacks, content.clone());

    let mut reader = FrameReader::new();
    let mut summary = StreamSummary::default();
    futures::pin_mut!(stream);

    loop {
        let frames = match stream.next().await {
            Some(Ok(chunk)) => reader.feed(chunk.as_ref()),
            Some(Err(e)) => {
                let err = ProtocolError::Stream(e.to_string());
                log::error!("{}", err);
                tee.emit(&StreamEvent::Error(err.to_string()));
                return Err(err);
            }
            None => {
                log::debug!("Stream closed without [DONE]");
                deliver(&reader.finish(), parser, &tee, &mut summary);
                break;
            }
        };
        if deliver(&frames, parser, &tee, &mut summary) {
            break;
        }
    }

    summary.content = std::mem::take(&mut *content.lock());
    tee.emit(&StreamEvent::StreamEnded {
        done_received: summary.done_received,
    });
    Ok(summary)
}

/// [`consume_stream`] for one thread's stream, holding its slot in `streams`
///
/// Fails with [`ProtocolError::StreamConflict`] before reading anything if
/// another stream for `thread_id` is open. The slot is released when reading
/// stops, including on error or when the future is dropped.
pub async fn consume_thread_stream<S, B, E>(
    thread_id: &str,
    streams: &ActiveStreams,
    stream: S,
    parser: &SseParser,
    callbacks: &SseCallbacks,
) -> ProtocolResult<StreamSummary>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let _lease = streams.open(thread_id)?;
    consume_stream(stream, parser, callbacks).await
}

/// Route frames in order; returns `true` once `[DONE]` is seen
fn deliver(
    frames: &[Frame],
    parser: &SseParser,
    callbacks: &SseCallbacks,
    summary: &mut StreamSummary,
) -> bool {
    for frame in frames {
        match frame {
            Frame::Done => {
                summary.done_received = true;
                return true;
            }
            Frame::Data(payload) => {
                summary.frames += 1;
                if parser.parse(payload, callbacks) == ParseOutcome::Failed {
                    summary.failed_frames += 1;
                }
            }
        }
    }
    false
}

fn tee_content(callbacks: &SseCallbacks, content: Arc<Mutex<String>>) -> SseCallbacks {
    let downstream = callbacks.stream().cloned();
    let tee = SseCallbacks::new().with_stream(move |event: &StreamEvent| {
        if let StreamEvent::Content(text) = event {
            content.lock().push_str(text);
        }
        if let Some(hook) = &downstream {
            hook.on_event(event);
        }
    });
    match callbacks.hil() {
        Some(hil) => tee.with_hil_arc(hil.clone()),
        None => tee,
    }
}

/// Registry of thread ids that currently have a stream being read
///
/// At most one stream per thread: the primary chat stream and a resume stream
/// for the same thread may not be consumed at the same time. Clones share the
/// same registry.
#[derive(Clone, Default)]
pub struct ActiveStreams {
    open: Arc<Mutex<HashSet<String>>>,
}

impl ActiveStreams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `thread_id` until the returned lease is dropped
    pub fn open(&self, thread_id: &str) -> ProtocolResult<StreamLease> {
        let mut open = self.open.lock();
        if !open.insert(thread_id.to_string()) {
            return Err(ProtocolError::StreamConflict(thread_id.to_string()));
        }
        Ok(StreamLease {
            open: self.open.clone(),
            thread_id: thread_id.to_string(),
        })
    }

    /// Whether a stream for `thread_id` is being read
    pub fn is_open(&self, thread_id: &str) -> bool {
        self.open.lock().contains(thread_id)
    }

    /// Number of threads with an open stream
    pub fn len(&self) -> usize {
        self.open.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.lock().is_empty()
    }
}

impl fmt::Debug for ActiveStreams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.open.lock().iter()).finish()
    }
}

/// Claim on one thread's stream slot, released on drop
#[derive(Debug)]
pub struct StreamLease {
    open: Arc<Mutex<HashSet<String>>>,
    thread_id: String,
}

impl StreamLease {
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        self.open.lock().remove(&self.thread_id);
    }
}
