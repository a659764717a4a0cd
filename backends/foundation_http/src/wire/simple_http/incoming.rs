use std::io::{self, Read};

use super::{read_headers, read_line, BodyStreamError, CacheInterposer, HttpHeaders, SimpleMethod};

/// Byte source a response body is read from.
///
/// `release` hands the underlying connection back once the body is done
/// with; `force_close` demands the socket be closed instead of recycled.
pub trait BodySource: Read {
    fn release(&mut self, force_close: bool);
}

impl<T: BodySource + ?Sized> BodySource for Box<T> {
    fn release(&mut self, force_close: bool) {
        (**self).release(force_close);
    }
}

/// Source with no connection behind it, used for bodies served from a cache.
pub struct DetachedSource<R>(pub R);

impl<R: Read> Read for DetachedSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read> BodySource for DetachedSource<R> {
    fn release(&mut self, _force_close: bool) {}
}

/// How the end of a response body is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    Empty,
    Chunked,
    FixedLength(u64),
    UntilEof,
}

/// Whether a response to `method` with status `code` can carry a body at all.
#[must_use]
pub fn has_response_body(method: &SimpleMethod, code: u16) -> bool {
    if method.forbids_response_body() {
        return false;
    }
    !((100..200).contains(&code) || code == 204 || code == 304)
}

/// Picks the framing for a response body, in order: no body, chunked
/// transfer coding, a valid `Content-Length`, read until EOF.
#[must_use]
pub fn select_framing(method: &SimpleMethod, code: u16, headers: &HttpHeaders) -> BodyFraming {
    if !has_response_body(method, code) {
        return BodyFraming::Empty;
    }

    if headers
        .get("Transfer-Encoding")
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("chunked"))
    {
        return BodyFraming::Chunked;
    }

    match headers
        .get("Content-Length")
        .and_then(|value| value.trim().parse::<u64>().ok())
    {
        Some(length) => BodyFraming::FixedLength(length),
        None => BodyFraming::UntilEof,
    }
}

#[derive(Debug)]
enum ReadState {
    FixedLength {
        remaining: u64,
    },
    Chunked {
        remaining: Option<u64>,
        no_more_chunks: bool,
    },
    UntilEof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Reading,
    Finished,
    Failed,
    Closed,
}

/// Response body reader.
///
/// Every byte handed to the caller is mirrored into the [`CacheInterposer`].
/// A clean end of input commits the cache entry and releases the source; a
/// short read, a read error, or an early `close` aborts the entry and forces
/// the source closed.
pub struct ResponseBody<S: BodySource> {
    source: S,
    state: ReadState,
    cache: CacheInterposer,
    progress: Progress,
    completed: bool,
}

impl<S: BodySource> ResponseBody<S> {
    pub fn new(source: S, framing: BodyFraming, cache: CacheInterposer) -> Self {
        tracing::debug!("Reading response body with {framing:?} framing");
        let state = match framing {
            BodyFraming::Empty => ReadState::FixedLength { remaining: 0 },
            BodyFraming::FixedLength(remaining) => ReadState::FixedLength { remaining },
            BodyFraming::Chunked => ReadState::Chunked {
                remaining: None,
                no_more_chunks: false,
            },
            BodyFraming::UntilEof => ReadState::UntilEof,
        };

        let mut body = Self {
            source,
            state,
            cache,
            progress: Progress::Reading,
            completed: false,
        };
        if matches!(body.state, ReadState::FixedLength { remaining: 0 }) {
            body.end_of_input(false);
        }
        body
    }

    /// True once the body was read to its natural end.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn source_ref(&self) -> &S {
        &self.source
    }

    fn end_of_input(&mut self, force_close: bool) {
        self.progress = Progress::Finished;
        self.completed = true;
        self.cache.commit();
        self.source.release(force_close);
    }

    fn unexpected_end_of_input(&mut self) {
        tracing::warn!("Response body ended unexpectedly, closing connection");
        self.progress = Progress::Failed;
        self.cache.abort();
        self.source.release(true);
    }

    fn read_source(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.source.read(buf) {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.unexpected_end_of_input();
                    return Err(err);
                }
                Ok(read) => return Ok(read),
            }
        }
    }

    fn read_fixed(&mut self, buf: &mut [u8], remaining: u64) -> io::Result<usize> {
        let wanted = usize::try_from(remaining).map_or(buf.len(), |left| left.min(buf.len()));
        let read = self.read_source(&mut buf[..wanted])?;
        if read == 0 {
            self.unexpected_end_of_input();
            return Err(BodyStreamError::UnexpectedEndOfStream.into());
        }

        self.cache.mirror(&buf[..read]);
        let left = remaining - read as u64;
        self.state = ReadState::FixedLength { remaining: left };
        if left == 0 {
            self.end_of_input(false);
        }
        Ok(read)
    }

    /// Reads the next chunk header, returning its size. Consumes the CRLF
    /// after the previous chunk first when there was one.
    fn next_chunk_size(&mut self, after_chunk: bool) -> io::Result<u64> {
        if after_chunk {
            self.read_line_or_fail()?;
        }

        let line = self.read_line_or_fail()?;
        let size = line.split(';').next().unwrap_or_default().trim();
        match u64::from_str_radix(size, 16) {
            Ok(size) => Ok(size),
            Err(_) => {
                self.unexpected_end_of_input();
                Err(BodyStreamError::InvalidChunkSize(line).into())
            }
        }
    }

    fn read_line_or_fail(&mut self) -> io::Result<String> {
        match read_line(&mut self.source) {
            Ok(Some(line)) => Ok(line),
            Ok(None) => {
                self.unexpected_end_of_input();
                Err(BodyStreamError::UnexpectedEndOfStream.into())
            }
            Err(err) => {
                self.unexpected_end_of_input();
                Err(err)
            }
        }
    }

    fn read_chunked(&mut self, buf: &mut [u8], remaining: Option<u64>) -> io::Result<usize> {
        let remaining = match remaining {
            Some(left) if left > 0 => left,
            previous => {
                let size = self.next_chunk_size(previous.is_some())?;
                if size == 0 {
                    self.state = ReadState::Chunked {
                        remaining: Some(0),
                        no_more_chunks: true,
                    };
                    let mut trailers = HttpHeaders::new();
                    if let Err(err) = read_headers(&mut self.source, &mut trailers) {
                        self.unexpected_end_of_input();
                        return Err(err);
                    }
                    if !trailers.is_empty() {
                        tracing::debug!("Discarding {} chunked trailer fields", trailers.len());
                    }
                    self.end_of_input(false);
                    return Ok(0);
                }
                size
            }
        };

        let wanted = usize::try_from(remaining).map_or(buf.len(), |left| left.min(buf.len()));
        let read = self.read_source(&mut buf[..wanted])?;
        if read == 0 {
            self.unexpected_end_of_input();
            return Err(BodyStreamError::UnexpectedEndOfStream.into());
        }

        self.cache.mirror(&buf[..read]);
        self.state = ReadState::Chunked {
            remaining: Some(remaining - read as u64),
            no_more_chunks: false,
        };
        Ok(read)
    }

    fn read_until_eof(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.read_source(buf)?;
        if read == 0 {
            self.end_of_input(true);
            return Ok(0);
        }
        self.cache.mirror(&buf[..read]);
        Ok(read)
    }

    /// Reads a single byte through the bulk read path.
    ///
    /// # Errors
    /// Same as [`Read::read`].
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Discards up to `count` bytes, returning how many were skipped.
    ///
    /// # Errors
    /// Same as [`Read::read`].
    pub fn skip(&mut self, count: u64) -> io::Result<u64> {
        let mut scratch = [0u8; 4096];
        let mut skipped = 0u64;
        while skipped < count {
            let wanted = usize::try_from(count - skipped)
                .map_or(scratch.len(), |left| left.min(scratch.len()));
            let read = self.read(&mut scratch[..wanted])?;
            if read == 0 {
                break;
            }
            skipped += read as u64;
        }
        Ok(skipped)
    }

    /// Closes the body. Closing before the natural end aborts the cache
    /// entry and forces the connection closed. Safe to call repeatedly.
    pub fn close(&mut self) {
        match self.progress {
            Progress::Closed => return,
            Progress::Reading => {
                tracing::debug!("Response body closed before end of input");
                self.unexpected_end_of_input();
            }
            Progress::Finished | Progress::Failed => {}
        }
        self.progress = Progress::Closed;
    }
}

impl<S: BodySource> Read for ResponseBody<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.progress {
            Progress::Closed => return Err(BodyStreamError::StreamClosed.into()),
            Progress::Failed => return Err(BodyStreamError::UnexpectedEndOfStream.into()),
            Progress::Finished => return Ok(0),
            Progress::Reading => {}
        }
        if buf.is_empty() {
            return Ok(0);
        }

        match self.state {
            ReadState::FixedLength { remaining } => self.read_fixed(buf, remaining),
            ReadState::Chunked {
                no_more_chunks: true,
                ..
            } => Ok(0),
            ReadState::Chunked { remaining, .. } => self.read_chunked(buf, remaining),
            ReadState::UntilEof => self.read_until_eof(buf),
        }
    }
}

impl<S: BodySource> Drop for ResponseBody<S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<S: BodySource> core::fmt::Debug for ResponseBody<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBody")
            .field("state", &self.state)
            .field("progress", &self.progress)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
