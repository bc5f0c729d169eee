//! The engine's multiplexed log stream format.
//!
//! When a container runs without a TTY, its stdout and stderr are carried over
//! a single byte stream as a sequence of length-prefixed frames:
//!
//! ```text
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! | stream |  reserved (ignored)      |      payload length (u32, BE)     |
//! +--------+--------+--------+--------+--------+--------+--------+--------+
//! | payload ...                                                           |
//! ```
//!
//! Stream 1 is stdout and stream 2 is stderr. Frames of any other stream type
//! are skipped. There are no separators between frames.
//!
//! [`demultiplex`] splits a complete buffer and stops silently at the first
//! incomplete frame. [`FrameDecoder`] does the same over a sequence of chunks,
//! carrying a partial frame over until the rest of it arrives.

use bytes::{Buf, Bytes, BytesMut};

/// Length of a frame header in bytes.
pub const HEADER_LEN: usize = 8;

/// Output stream a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StreamType {
    Stdout = 1,
    Stderr = 2,
}

impl StreamType {
    /// Maps a header byte to a stream; `None` for anything but 1 and 2.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(StreamType::Stdout),
            2 => Some(StreamType::Stderr),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamType::Stdout => "stdout",
            StreamType::Stderr => "stderr",
        }
    }
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Borrowed frames
// ---------------------------------------------------------------------------

/// One complete frame borrowed from a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFrame<'a> {
    /// Header byte 0, as sent.
    pub stream_type: u8,
    pub payload: &'a [u8],
}

impl<'a> LogFrame<'a> {
    /// The stream this frame belongs to, if it is stdout or stderr.
    pub fn stream(&self) -> Option<StreamType> {
        StreamType::from_byte(self.stream_type)
    }

    /// Total bytes this frame occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }
}

/// Reads the frame at the start of `buf`, or `None` if it is incomplete.
pub fn split_frame(buf: &[u8]) -> Option<LogFrame<'_>> {
    let header = buf.get(..HEADER_LEN)?;
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    let end = HEADER_LEN.checked_add(usize::try_from(len).ok()?)?;
    let payload = buf.get(HEADER_LEN..end)?;
    Some(LogFrame {
        stream_type: header[0],
        payload,
    })
}

/// Iterator over the complete frames of a buffer.
///
/// Stops at the end of the buffer or at the first incomplete frame;
/// [`Frames::remainder`] then holds the unconsumed bytes.
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    rest: &'a [u8],
}

impl<'a> Frames<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { rest: buf }
    }

    /// Bytes not yet consumed as complete frames.
    pub fn remainder(&self) -> &'a [u8] {
        self.rest
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = LogFrame<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = split_frame(self.rest)?;
        self.rest = &self.rest[frame.encoded_len()..];
        Some(frame)
    }
}

/// Splits `buffer` into stdout and stderr payloads, in frame order.
///
/// Each complete stdout frame's payload is passed to `on_stdout` and each
/// stderr payload to `on_stderr`; other stream types are skipped. A truncated
/// trailing frame is discarded without error. Returns the number of bytes
/// consumed as complete frames.
pub fn demultiplex<O, E>(buffer: &[u8], mut on_stdout: O, mut on_stderr: E) -> usize
where
    O: FnMut(&[u8]),
    E: FnMut(&[u8]),
{
    let mut frames = Frames::new(buffer);
    for frame in frames.by_ref() {
        match frame.stream() {
            Some(StreamType::Stdout) => on_stdout(frame.payload),
            Some(StreamType::Stderr) => on_stderr(frame.payload),
            None => {}
        }
    }
    buffer.len() - frames.remainder().len()
}

/// Writes `payload` in wire format.
///
/// A payload longer than `u32::MAX` bytes is written as several consecutive
/// frames of the same stream type, which demultiplex back to the same bytes.
pub fn encode_frame(stream_type: u8, payload: &[u8]) -> Vec<u8> {
    encode_chunked(stream_type, payload, u32::MAX)
}

fn encode_chunked(stream_type: u8, payload: &[u8], max_len: u32) -> Vec<u8> {
    let limit = max_len.max(1) as usize;
    let frames = payload.len().div_ceil(limit).max(1);
    let mut out = Vec::with_capacity(frames * HEADER_LEN + payload.len());
    let mut write = |chunk: &[u8]| {
        // chunk.len() <= limit <= u32::MAX
        out.extend_from_slice(&[stream_type, 0, 0, 0]);
        out.extend_from_slice(&(chunk.len() as u32).to_be_bytes());
        out.extend_from_slice(chunk);
    };
    if payload.is_empty() {
        write(payload);
    }
    for chunk in payload.chunks(limit) {
        write(chunk);
    }
    out
}

// ---------------------------------------------------------------------------
// Incremental decoding
// ---------------------------------------------------------------------------

/// A frame whose payload has been split off a [`FrameDecoder`] buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedFrame {
    pub stream_type: u8,
    pub payload: Bytes,
}

impl OwnedFrame {
    pub fn stream(&self) -> Option<StreamType> {
        StreamType::from_byte(self.stream_type)
    }
}

/// Reassembles frames that arrive split across arbitrary chunk boundaries.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk read from the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Removes and returns the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Option<OwnedFrame> {
        let (stream_type, len) = {
            let frame = split_frame(&self.buf)?;
            (frame.stream_type, frame.encoded_len())
        };
        let mut raw = self.buf.split_to(len);
        raw.advance(HEADER_LEN);
        Some(OwnedFrame {
            stream_type,
            payload: raw.freeze(),
        })
    }

    /// Number of buffered bytes that do not yet form a complete frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Out {
        Stdout(Vec<u8>),
        Stderr(Vec<u8>),
    }

    fn collect(buf: &[u8]) -> (Vec<Out>, usize) {
        let out = std::cell::RefCell::new(Vec::new());
        let consumed = demultiplex(
            buf,
            |p| out.borrow_mut().push(Out::Stdout(p.to_vec())),
            |p| out.borrow_mut().push(Out::Stderr(p.to_vec())),
        );
        (out.into_inner(), consumed)
    }

    #[test]
    fn test_empty_buffer() {
        let (out, consumed) = collect(&[]);
        assert!(out.is_empty());
        assert_eq!(consumed, 0);
    }

    #[test]
    fn test_interleaved_frames_keep_order() {
        let mut buf = encode_frame(1, b"hello");
        buf.extend(encode_frame(2, b"bye"));
        buf.extend(encode_frame(1, b""));
        buf.extend(encode_frame(2, &[0, 0xff, 0, 0xfe]));
        buf.extend(encode_frame(1, b"world\n"));

        let (out, consumed) = collect(&buf);
        assert_eq!(
            out,
            vec![
                Out::Stdout(b"hello".to_vec()),
                Out::Stderr(b"bye".to_vec()),
                Out::Stdout(Vec::new()),
                Out::Stderr(vec![0, 0xff, 0, 0xfe]),
                Out::Stdout(b"world\n".to_vec()),
            ]
        );
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn test_oversized_payload_spans_frames() {
        let wire = encode_chunked(2, b"abcdefg", 3);
        assert_eq!(wire.len(), 3 * HEADER_LEN + 7);
        assert_eq!(&wire[..HEADER_LEN], &[2, 0, 0, 0, 0, 0, 0, 3]);

        let (out, consumed) = collect(&wire);
        assert_eq!(
            out,
            vec![
                Out::Stderr(b"abc".to_vec()),
                Out::Stderr(b"def".to_vec()),
                Out::Stderr(b"g".to_vec()),
            ]
        );
        assert_eq!(consumed, wire.len());
        assert_eq!(encode_chunked(1, b"", 3), encode_frame(1, b""));
    }

    #[test]
    fn test_reserved_bytes_are_ignored() {
        let mut buf = encode_frame(1, b"abc");
        buf[1] = 0xaa;
        buf[2] = 0xbb;
        buf[3] = 0xcc;
        let (out, _) = collect(&buf);
        assert_eq!(out, vec![Out::Stdout(b"abc".to_vec())]);
    }

    #[test]
    fn test_unknown_stream_types_are_skipped() {
        let mut buf = encode_frame(0, b"stdin?");
        buf.extend(encode_frame(3, b"system"));
        buf.extend(encode_frame(2, b"err"));

        let (out, consumed) = collect(&buf);
        assert_eq!(out, vec![Out::Stderr(b"err".to_vec())]);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn test_truncation_mid_header() {
        let mut buf = encode_frame(1, b"one");
        let whole = buf.len();
        buf.extend_from_slice(&[2, 0, 0, 0, 0]);

        let (out, consumed) = collect(&buf);
        assert_eq!(out, vec![Out::Stdout(b"one".to_vec())]);
        assert_eq!(consumed, whole);
    }

    #[test]
    fn test_truncation_mid_payload() {
        let mut buf = encode_frame(2, b"first");
        let whole = buf.len();
        let second = encode_frame(1, b"second frame");
        buf.extend_from_slice(&second[..second.len() - 4]);

        let (out, consumed) = collect(&buf);
        assert_eq!(out, vec![Out::Stderr(b"first".to_vec())]);
        assert_eq!(consumed, whole);
    }

    #[test]
    fn test_huge_declared_length_is_incomplete() {
        let buf = [1u8, 0, 0, 0, 0xff, 0xff, 0xff, 0xff, b'x'];
        let (out, consumed) = collect(&buf);
        assert!(out.is_empty());
        assert_eq!(consumed, 0);
    }

    #[test]
    fn test_decoder_reassembles_split_frames() {
        let mut wire = encode_frame(1, b"hello");
        wire.extend(encode_frame(2, b"bye"));

        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for byte in &wire {
            decoder.push(std::slice::from_ref(byte));
            while let Some(frame) = decoder.next_frame() {
                frames.push(frame);
            }
        }

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].stream(), Some(StreamType::Stdout));
        assert_eq!(frames[0].payload.as_ref(), b"hello");
        assert_eq!(frames[1].stream(), Some(StreamType::Stderr));
        assert_eq!(frames[1].payload.as_ref(), b"bye");
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_decoder_holds_partial_frame() {
        let wire = encode_frame(1, b"partial");
        let mut decoder = FrameDecoder::new();
        decoder.push(&wire[..10]);
        assert!(decoder.next_frame().is_none());
        assert_eq!(decoder.pending(), 10);

        decoder.push(&wire[10..]);
        assert_eq!(decoder.next_frame().unwrap().payload.as_ref(), b"partial");
    }
}
