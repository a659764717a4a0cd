use derive_more::From;
use std::io;

pub type Result<T, E> = std::result::Result<T, E>;

/// Failures raised while reading the status line and header block of a
/// response.
#[derive(From, Debug)]
pub enum HttpReaderError {
    /// The line starts with the protocol token but its status code could not be parsed.
    #[from(ignore)]
    InvalidStatusLine(String),

    /// The stream ended before a status line was received.
    EndOfStreamBeforeStatusLine,

    #[from(ignore)]
    LineReadFailed(io::Error),
}

impl From<io::Error> for HttpReaderError {
    fn from(value: io::Error) -> Self {
        Self::LineReadFailed(value)
    }
}

impl std::error::Error for HttpReaderError {}

impl core::fmt::Display for HttpReaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidStatusLine(line) => write!(f, "invalid status line: {line:?}"),
            Self::EndOfStreamBeforeStatusLine => {
                write!(f, "unexpected end of stream before status line")
            }
            Self::LineReadFailed(err) => write!(f, "failed to read line: {err}"),
        }
    }
}

impl From<HttpReaderError> for io::Error {
    fn from(value: HttpReaderError) -> Self {
        match value {
            HttpReaderError::LineReadFailed(err) => err,
            HttpReaderError::EndOfStreamBeforeStatusLine => {
                io::Error::new(io::ErrorKind::UnexpectedEof, value)
            }
            HttpReaderError::InvalidStatusLine(_) => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

/// Failures raised by request and response body streams.
///
/// Body streams implement `std::io::Read` / `std::io::Write`, so these reach
/// callers wrapped in an `io::Error`; use [`BodyStreamError::from_io`] to
/// recover the original value.
#[derive(From, Debug, Clone, PartialEq, Eq)]
pub enum BodyStreamError {
    /// Any operation attempted after `close()`.
    StreamClosed,

    /// A write would push a fixed-length body past its declared length.
    #[from(ignore)]
    ExceededDeclaredLength(u64),

    /// A fixed-length body was closed with a different number of bytes than declared.
    #[from(ignore)]
    LengthMismatch { declared: u64, actual: u64 },

    /// A buffered body was given more bytes than its `Content-Length` limit.
    #[from(ignore)]
    ContentLengthExceeded(usize),

    /// A buffered body was closed before reaching its `Content-Length` limit.
    #[from(ignore)]
    ContentLengthUnderflow { declared: usize, actual: usize },

    /// The peer ended the stream before the framing said the body was complete.
    UnexpectedEndOfStream,

    #[from(ignore)]
    InvalidChunkSize(String),
}

impl BodyStreamError {
    /// Recovers a `BodyStreamError` carried inside an `io::Error`, if any.
    #[must_use]
    pub fn from_io(err: &io::Error) -> Option<&BodyStreamError> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<BodyStreamError>())
    }

    fn kind(&self) -> io::ErrorKind {
        match self {
            Self::UnexpectedEndOfStream => io::ErrorKind::UnexpectedEof,
            Self::InvalidChunkSize(_) => io::ErrorKind::InvalidData,
            Self::ExceededDeclaredLength(_)
            | Self::LengthMismatch { .. }
            | Self::ContentLengthExceeded(_)
            | Self::ContentLengthUnderflow { .. } => io::ErrorKind::InvalidInput,
            Self::StreamClosed => io::ErrorKind::Other,
        }
    }
}

impl std::error::Error for BodyStreamError {}

impl core::fmt::Display for BodyStreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StreamClosed => write!(f, "stream closed"),
            Self::ExceededDeclaredLength(declared) => {
                write!(f, "declared fixed content length of {declared} bytes exceeded")
            }
            Self::LengthMismatch { declared, actual } => write!(
                f,
                "actual length of {actual} did not match declared fixed length of {declared}"
            ),
            Self::ContentLengthExceeded(limit) => {
                write!(f, "exceeded content-length limit of {limit} bytes")
            }
            Self::ContentLengthUnderflow { declared, actual } => write!(
                f,
                "content-length underflow: wrote {actual} of {declared} declared bytes"
            ),
            Self::UnexpectedEndOfStream => write!(f, "unexpected end of stream"),
            Self::InvalidChunkSize(line) => write!(f, "invalid chunk size line: {line:?}"),
        }
    }
}

impl From<BodyStreamError> for io::Error {
    fn from(value: BodyStreamError) -> Self {
        io::Error::new(value.kind(), value)
    }
}
