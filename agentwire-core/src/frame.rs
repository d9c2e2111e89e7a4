//! Line-oriented frame decoding for `text/event-stream` bodies
//!
//! The transport delivers bytes in arbitrary chunks. [`FrameReader`] buffers
//! them, splits on newlines, and yields one [`Frame`] per complete `data:`
//! line. A chunk boundary that falls inside a line (or inside a multi-byte
//! UTF-8 sequence) is carried over to the next call.
//!
//! ```
//! use agentwire_core::frame::{Frame, FrameReader};
//!
//! let mut reader = FrameReader::new();
//! assert!(reader.feed(b"data: {\"type\":\"st").is_empty());
//! let frames = reader.feed(b"art\"}\ndata: [DONE]\n");
//! assert_eq!(
//!     frames,
//!     vec![Frame::Data(r#"{"type":"start"}"#.to_string()), Frame::Done]
//! );
//! ```

/// Payload that marks the end of a stream
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &str = "data:";

/// One decoded frame from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Payload of a `data: <payload>` line, prefix stripped and trimmed
    Data(String),
    /// The `[DONE]` sentinel
    Done,
}

impl Frame {
    /// Returns the payload text for data frames
    pub fn payload(&self) -> Option<&str> {
        match self {
            Frame::Data(payload) => Some(payload),
            Frame::Done => None,
        }
    }
}

/// Incremental splitter from byte chunks to frames
///
/// One reader per open stream. The reader never shares its buffer, so the
/// primary chat stream and a resume stream each need their own instance.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: Vec<u8>,
    lines_seen: usize,
}

impl FrameReader {
    /// Create an empty reader
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            if let Some(frame) = self.decode_line(start, end) {
                frames.push(frame);
            }
            start = end + 1;
        }
        self.buffer.drain(..start);

        frames
    }

    /// Flush a trailing line left without a newline when the stream closed
    pub fn finish(&mut self) -> Vec<Frame> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let end = self.buffer.len();
        let frame = self.decode_line(0, end);
        self.buffer.clear();
        frame.into_iter().collect()
    }

    /// Number of bytes waiting for a line terminator
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Number of complete lines processed so far (data or not)
    pub fn lines_seen(&self) -> usize {
        self.lines_seen
    }

    fn decode_line(&mut self, start: usize, end: usize) -> Option<Frame> {
        self.lines_seen += 1;
        let mut bytes = &self.buffer[start..end];
        if let Some(stripped) = bytes.strip_suffix(b"\r") {
            bytes = stripped;
        }
        // Lossy decode: a bad byte sequence must not cost us the frame.
        let line = String::from_utf8_lossy(bytes);
        parse_line(&line)
    }
}

/// Interpret a single line of an event stream
///
/// Returns `None` for comments, `event:`/`id:` fields, blank lines and empty
/// `data:` lines.
pub fn parse_line(line: &str) -> Option<Frame> {
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload.is_empty() {
        return None;
    }
    if payload == DONE_SENTINEL {
        return Some(Frame::Done);
    }
    Some(Frame::Data(payload.to_string()))
}

/// Split a complete body into frames in one call
pub fn split_frames(body: &[u8]) -> Vec<Frame> {
    let mut reader = FrameReader::new();
    let mut frames = reader.feed(body);
    frames.extend(reader.finish());
    frames
}
