use std::io::{self, Write};

use super::BodyStreamError;

/// Terminal chunk of a chunked body (no trailers).
pub const FINAL_CHUNK: &[u8] = b"0\r\n\r\n";

/// Smallest on-wire chunk that still fits one byte of data.
const MIN_CHUNK_LENGTH: usize = 6;

/// Destination of request body bytes.
///
/// `start_streaming` is called once when a buffered body gives up buffering
/// and starts writing chunks, so the sink can put the request head on the
/// wire before the first chunk.
pub trait RequestSink: Write {
    fn start_streaming(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl RequestSink for Vec<u8> {}

impl<S: RequestSink + ?Sized> RequestSink for &mut S {
    fn start_streaming(&mut self) -> io::Result<()> {
        (**self).start_streaming()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputState {
    Open,
    Closed,
    Failed,
}

#[derive(Debug)]
enum BodyStrategy {
    FixedLength {
        declared: u64,
        written: u64,
    },
    Chunked(ChunkFramer),
    Retryable {
        limit: Option<usize>,
        buffer: Vec<u8>,
    },
    Buffered {
        threshold: Option<usize>,
        chunk_length: usize,
        buffer: Vec<u8>,
        streaming: Option<ChunkFramer>,
    },
}

#[derive(Debug)]
struct ChunkFramer {
    capacity: usize,
    pending: Vec<u8>,
}

impl ChunkFramer {
    fn new(chunk_length: usize) -> Self {
        let capacity = chunk_data_capacity(chunk_length);
        Self {
            capacity,
            pending: Vec::with_capacity(capacity),
        }
    }

    fn write<S: RequestSink + ?Sized>(&mut self, sink: &mut S, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            let room = self.capacity - self.pending.len();
            let take = room.min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.pending.len() == self.capacity {
                self.emit(sink)?;
            }
        }
        Ok(())
    }

    /// Moves the pending data into `frame` as one complete chunk.
    fn frame_pending(&mut self, frame: &mut Vec<u8>) {
        if self.pending.is_empty() {
            return;
        }
        frame.extend_from_slice(format!("{:x}\r\n", self.pending.len()).as_bytes());
        frame.append(&mut self.pending);
        frame.extend_from_slice(b"\r\n");
    }

    /// Writes the pending chunk with a single write to the sink.
    fn emit<S: RequestSink + ?Sized>(&mut self, sink: &mut S) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut frame = Vec::with_capacity(self.pending.len() + 12);
        self.frame_pending(&mut frame);
        sink.write_all(&frame)
    }

    fn flush<S: RequestSink + ?Sized>(&mut self, sink: &mut S) -> io::Result<()> {
        self.emit(sink)?;
        sink.flush()
    }

    fn finish<S: RequestSink + ?Sized>(&mut self, sink: &mut S) -> io::Result<()> {
        let mut frame = Vec::with_capacity(self.pending.len() + 12 + FINAL_CHUNK.len());
        self.frame_pending(&mut frame);
        frame.extend_from_slice(FINAL_CHUNK);
        sink.write_all(&frame)?;
        sink.flush()
    }
}

fn hex_len(value: usize) -> usize {
    let mut digits = 1;
    let mut rest = value >> 4;
    while rest > 0 {
        digits += 1;
        rest >>= 4;
    }
    digits
}

/// Largest data length whose framed chunk (`size\r\n` + data + `\r\n`) fits
/// in `chunk_length` bytes, never less than one.
#[must_use]
pub fn chunk_data_capacity(chunk_length: usize) -> usize {
    let chunk_length = chunk_length.max(MIN_CHUNK_LENGTH);
    let mut data = chunk_length - 4;
    while data > 1 && hex_len(data) + 4 + data > chunk_length {
        data -= 1;
    }
    data.max(1)
}

/// Request body writer: one of four framing strategies picked before the
/// first byte is written.
///
/// - fixed length: bytes go straight to the sink, counted against the declared length
/// - chunked: bytes are framed as chunks sized to `chunk_length` on the wire
/// - retryable: bytes stay in memory (optionally capped) so the body can be replayed
/// - buffered: bytes stay in memory until an optional threshold, then switch to chunked
#[derive(Debug)]
pub struct RequestBody {
    strategy: BodyStrategy,
    state: OutputState,
}

impl RequestBody {
    #[must_use]
    pub fn fixed_length(declared: u64) -> Self {
        Self::with(BodyStrategy::FixedLength {
            declared,
            written: 0,
        })
    }

    #[must_use]
    pub fn chunked(chunk_length: usize) -> Self {
        Self::with(BodyStrategy::Chunked(ChunkFramer::new(chunk_length)))
    }

    #[must_use]
    pub fn retryable(limit: Option<usize>) -> Self {
        Self::with(BodyStrategy::Retryable {
            limit,
            buffer: Vec::new(),
        })
    }

    #[must_use]
    pub fn buffered(threshold: Option<usize>, chunk_length: usize) -> Self {
        Self::with(BodyStrategy::Buffered {
            threshold,
            chunk_length,
            buffer: Vec::new(),
            streaming: None,
        })
    }

    fn with(strategy: BodyStrategy) -> Self {
        Self {
            strategy,
            state: OutputState::Open,
        }
    }

    fn ensure_open(&self) -> io::Result<()> {
        match self.state {
            OutputState::Open => Ok(()),
            OutputState::Closed | OutputState::Failed => Err(BodyStreamError::StreamClosed.into()),
        }
    }

    /// Accepts `data` into the body.
    ///
    /// # Errors
    /// Fails once closed, on any length violation, and on sink errors. Any
    /// failure leaves the body unusable.
    pub fn write_to<S: RequestSink + ?Sized>(&mut self, sink: &mut S, data: &[u8]) -> io::Result<()> {
        self.ensure_open()?;
        let outcome = self.write_inner(sink, data);
        if outcome.is_err() {
            self.state = OutputState::Failed;
        }
        outcome
    }

    fn write_inner<S: RequestSink + ?Sized>(&mut self, sink: &mut S, data: &[u8]) -> io::Result<()> {
        match &mut self.strategy {
            BodyStrategy::FixedLength { declared, written } => {
                let incoming = data.len() as u64;
                if *written + incoming > *declared {
                    return Err(BodyStreamError::ExceededDeclaredLength(*declared).into());
                }
                sink.write_all(data)?;
                *written += incoming;
                Ok(())
            }
            BodyStrategy::Chunked(framer) => framer.write(sink, data),
            BodyStrategy::Retryable { limit, buffer } => {
                if let Some(limit) = *limit {
                    if buffer.len() + data.len() > limit {
                        return Err(BodyStreamError::ContentLengthExceeded(limit).into());
                    }
                }
                buffer.extend_from_slice(data);
                Ok(())
            }
            BodyStrategy::Buffered {
                threshold,
                chunk_length,
                buffer,
                streaming,
            } => {
                if let Some(framer) = streaming {
                    return framer.write(sink, data);
                }

                buffer.extend_from_slice(data);
                match *threshold {
                    Some(limit) if buffer.len() > limit => {
                        tracing::debug!(
                            "Buffered request body passed {limit} bytes, switching to chunked streaming"
                        );
                        sink.start_streaming()?;
                        let mut framer = ChunkFramer::new(*chunk_length);
                        framer.write(sink, buffer.as_slice())?;
                        buffer.clear();
                        *streaming = Some(framer);
                        Ok(())
                    }
                    _ => Ok(()),
                }
            }
        }
    }

    /// Pushes any pending chunk to the sink and flushes it.
    ///
    /// # Errors
    /// Fails once closed, or on sink errors.
    pub fn flush_to<S: RequestSink + ?Sized>(&mut self, sink: &mut S) -> io::Result<()> {
        self.ensure_open()?;
        match &mut self.strategy {
            BodyStrategy::Chunked(framer)
            | BodyStrategy::Buffered {
                streaming: Some(framer),
                ..
            } => framer.flush(sink),
            BodyStrategy::FixedLength { .. } => sink.flush(),
            BodyStrategy::Retryable { .. } | BodyStrategy::Buffered { .. } => Ok(()),
        }
    }

    /// Finishes the body: validates lengths and writes the final chunk where
    /// framing requires it. Closing twice is a no-op.
    ///
    /// # Errors
    /// Fails when a declared length was not met, or on sink errors.
    pub fn close_to<S: RequestSink + ?Sized>(&mut self, sink: &mut S) -> io::Result<()> {
        match self.state {
            OutputState::Closed => return Ok(()),
            OutputState::Failed => return Err(BodyStreamError::StreamClosed.into()),
            OutputState::Open => {}
        }

        let outcome = match &mut self.strategy {
            BodyStrategy::FixedLength { declared, written } => {
                if written == declared {
                    sink.flush()
                } else {
                    Err(BodyStreamError::LengthMismatch {
                        declared: *declared,
                        actual: *written,
                    }
                    .into())
                }
            }
            BodyStrategy::Chunked(framer)
            | BodyStrategy::Buffered {
                streaming: Some(framer),
                ..
            } => framer.finish(sink),
            BodyStrategy::Retryable {
                limit: Some(limit),
                buffer,
            } if buffer.len() < *limit => Err(BodyStreamError::ContentLengthUnderflow {
                declared: *limit,
                actual: buffer.len(),
            }
            .into()),
            BodyStrategy::Retryable { .. } | BodyStrategy::Buffered { .. } => Ok(()),
        };

        self.state = if outcome.is_ok() {
            OutputState::Closed
        } else {
            OutputState::Failed
        };
        outcome
    }

    /// True when the whole body sits in memory and can be replayed.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        matches!(
            self.strategy,
            BodyStrategy::Retryable { .. } | BodyStrategy::Buffered { streaming: None, .. }
        )
    }

    /// True when the body goes on the wire with chunked framing.
    #[must_use]
    pub fn is_chunked(&self) -> bool {
        matches!(
            self.strategy,
            BodyStrategy::Chunked(_)
                | BodyStrategy::Buffered {
                    streaming: Some(_),
                    ..
                }
        )
    }

    /// True only when the body may be sent again for a follow-up request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_cached() && self.state != OutputState::Failed
    }

    /// Declared length for fixed bodies, buffered length for in-memory bodies,
    /// `None` once chunked.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        match &self.strategy {
            BodyStrategy::FixedLength { declared, .. } => Some(*declared),
            BodyStrategy::Retryable { buffer, .. }
            | BodyStrategy::Buffered {
                buffer,
                streaming: None,
                ..
            } => Some(buffer.len() as u64),
            BodyStrategy::Chunked(_) | BodyStrategy::Buffered { .. } => None,
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == OutputState::Closed
    }

    /// Replays an in-memory body to `out`.
    ///
    /// # Errors
    /// Fails for streamed bodies, which no longer hold their bytes, or on
    /// write errors.
    pub fn write_to_socket<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        match &self.strategy {
            BodyStrategy::Retryable { buffer, .. }
            | BodyStrategy::Buffered {
                buffer,
                streaming: None,
                ..
            } => out.write_all(buffer),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "request body was streamed and cannot be replayed",
            )),
        }
    }
}

/// `Write` adapter pairing a [`RequestBody`] with the sink it drains into.
///
/// Dropping the writer without calling [`BodyWriter::close`] leaves the body
/// open, which marks the connection as unusable on release.
pub struct BodyWriter<'a, S: RequestSink> {
    body: &'a mut RequestBody,
    sink: S,
}

impl<'a, S: RequestSink> BodyWriter<'a, S> {
    pub fn new(body: &'a mut RequestBody, sink: S) -> Self {
        Self { body, sink }
    }

    /// Closes the underlying body.
    ///
    /// # Errors
    /// See [`RequestBody::close_to`].
    pub fn close(&mut self) -> io::Result<()> {
        self.body.close_to(&mut self.sink)
    }
}

impl<S: RequestSink> Write for BodyWriter<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.write_to(&mut self.sink, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.body.flush_to(&mut self.sink)
    }
}
