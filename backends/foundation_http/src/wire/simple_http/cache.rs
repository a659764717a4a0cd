use std::io::{self, Read, Write};

use url::Url;

use super::{FieldMap, HttpHeaders, SimpleMethod};

/// Status codes whose responses may be stored.
pub const CACHEABLE_STATUS_CODES: [u16; 5] = [200, 203, 206, 301, 410];

#[must_use]
pub fn is_cacheable_status(code: u16) -> bool {
    CACHEABLE_STATUS_CODES.contains(&code)
}

/// A stored response handed back by a [`ResponseCache`].
///
/// `headers` must carry the status line so the exchange can report the
/// stored status without touching the network.
pub struct CachedResponse {
    pub headers: HttpHeaders,
    pub body: Box<dyn Read + Send>,
}

impl core::fmt::Debug for CachedResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedResponse")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// What a cache gets to see when deciding whether to store a response.
#[derive(Debug, Clone, Copy)]
pub struct CacheContext<'a> {
    pub method: &'a SimpleMethod,
    pub request_headers: &'a FieldMap,
    pub response_headers: &'a HttpHeaders,
    pub code: u16,
}

/// Entry being written while a response body is read.
pub trait CacheRequest: Send {
    /// Sink receiving every body byte delivered to the caller.
    fn body(&mut self) -> &mut dyn Write;

    /// The body was read to completion; make the entry visible.
    ///
    /// # Errors
    /// Implementations report storage failures; the entry is dropped either way.
    fn commit(self: Box<Self>) -> io::Result<()>;

    /// Discard everything written so far.
    fn abort(self: Box<Self>);
}

/// Pluggable response cache.
pub trait ResponseCache: Send + Sync {
    fn get(
        &self,
        uri: &Url,
        method: &SimpleMethod,
        request_headers: &FieldMap,
    ) -> Option<CachedResponse>;

    fn put(&self, uri: &Url, context: &CacheContext<'_>) -> Option<Box<dyn CacheRequest>>;
}

/// Mirrors body bytes into a cache entry: commits on a clean end of input,
/// aborts on anything else. A passthrough interposer does nothing.
#[derive(Default)]
pub struct CacheInterposer {
    entry: Option<Box<dyn CacheRequest>>,
}

impl CacheInterposer {
    #[must_use]
    pub fn passthrough() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new(entry: Box<dyn CacheRequest>) -> Self {
        Self { entry: Some(entry) }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.entry.is_some()
    }

    /// Copies `data` into the entry. A failing sink aborts the entry; the
    /// caller's read is unaffected.
    pub fn mirror(&mut self, data: &[u8]) {
        let Some(entry) = self.entry.as_mut() else {
            return;
        };
        let written = entry.body().write_all(data);
        if let Err(err) = written {
            tracing::warn!("Cache body write failed, aborting entry: {err}");
            self.abort();
        }
    }

    pub fn commit(&mut self) {
        if let Some(entry) = self.entry.take() {
            if let Err(err) = entry.commit() {
                tracing::warn!("Cache entry commit failed: {err}");
            }
        }
    }

    pub fn abort(&mut self) {
        if let Some(entry) = self.entry.take() {
            tracing::debug!("Aborting cache entry");
            entry.abort();
        }
    }
}

impl core::fmt::Debug for CacheInterposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInterposer")
            .field("active", &self.is_active())
            .finish()
    }
}
