//! Response body handed to callers.
//!
//! A body arrives either as sent or gzip-compressed, when the exchange
//! asked for gzip on the caller's behalf. Cache entries always receive the
//! bytes as they were framed on the wire; decoding happens above that.

use std::io::{self, Read};

use flate2::read::GzDecoder;

use crate::wire::simple_http::{BodySource, ResponseBody};

/// Framed body reading from the network or from a cached entry.
pub type RawBody = ResponseBody<Box<dyn BodySource + Send>>;

pub enum ExchangeBody {
    Identity(RawBody),
    Gzip(GzDecoder<RawBody>),
}

impl ExchangeBody {
    #[must_use]
    pub fn identity(body: RawBody) -> Self {
        Self::Identity(body)
    }

    #[must_use]
    pub fn gzip(body: RawBody) -> Self {
        Self::Gzip(GzDecoder::new(body))
    }

    fn raw(&self) -> &RawBody {
        match self {
            Self::Identity(body) => body,
            Self::Gzip(decoder) => decoder.get_ref(),
        }
    }

    fn raw_mut(&mut self) -> &mut RawBody {
        match self {
            Self::Identity(body) => body,
            Self::Gzip(decoder) => decoder.get_mut(),
        }
    }

    #[must_use]
    pub fn is_decoding(&self) -> bool {
        matches!(self, Self::Gzip(_))
    }

    /// True once the framed body was read to its natural end.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.raw().is_complete()
    }

    /// Reads a single byte.
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

    /// Discards up to `count` decoded bytes, returning how many were skipped.
    ///
    /// # Errors
    /// Same as [`Read::read`].
    pub fn skip(&mut self, count: u64) -> io::Result<u64> {
        io::copy(&mut self.by_ref().take(count), &mut io::sink())
    }

    /// Closes the framed body; see [`ResponseBody::close`].
    pub fn close(&mut self) {
        self.raw_mut().close();
    }
}

impl Read for ExchangeBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Identity(body) => body.read(buf),
            Self::Gzip(decoder) => {
                let read = decoder.read(buf)?;
                if read == 0 && !buf.is_empty() {
                    // The gzip stream can end before its framing does.
                    let raw = decoder.get_mut();
                    io::copy(raw, &mut io::sink())?;
                }
                Ok(read)
            }
        }
    }
}

impl core::fmt::Debug for ExchangeBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeBody")
            .field("gzip", &self.is_decoding())
            .field("body", self.raw())
            .finish()
    }
}
