use std::collections::HashMap;
use std::io::{self, Cursor, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use foundation_http::wire::simple_http::{
    CacheContext, CacheRequest, CachedResponse, FieldMap, HttpHeaders, ResponseCache,
    SimpleMethod,
};
use url::Url;

/// Counters kept by [`MemoryResponseCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub commits: usize,
    pub aborts: usize,
}

#[derive(Default)]
struct Store {
    entries: HashMap<String, (HttpHeaders, Vec<u8>)>,
    stats: CacheStats,
}

fn lock(store: &Mutex<Store>) -> MutexGuard<'_, Store> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Response cache keyed by URL, storing GET responses only.
#[derive(Clone, Default)]
pub struct MemoryResponseCache {
    store: Arc<Mutex<Store>>,
}

impl MemoryResponseCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an entry. `headers` should carry a status line.
    pub fn insert(&self, uri: &str, headers: HttpHeaders, body: impl Into<Vec<u8>>) {
        lock(&self.store)
            .entries
            .insert(uri.to_string(), (headers, body.into()));
    }

    /// Stored body for `uri`, if committed.
    #[must_use]
    pub fn stored_body(&self, uri: &str) -> Option<Vec<u8>> {
        lock(&self.store)
            .entries
            .get(uri)
            .map(|(_, body)| body.clone())
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        lock(&self.store).stats
    }
}

impl ResponseCache for MemoryResponseCache {
    fn get(
        &self,
        uri: &Url,
        method: &SimpleMethod,
        _request_headers: &FieldMap,
    ) -> Option<CachedResponse> {
        if *method != SimpleMethod::GET {
            return None;
        }

        let mut store = lock(&self.store);
        let found = store.entries.get(uri.as_str()).cloned();
        match found {
            Some((headers, body)) => {
                store.stats.hits += 1;
                Some(CachedResponse {
                    headers,
                    body: Box::new(Cursor::new(body)),
                })
            }
            None => {
                store.stats.misses += 1;
                None
            }
        }
    }

    fn put(&self, uri: &Url, context: &CacheContext<'_>) -> Option<Box<dyn CacheRequest>> {
        if *context.method != SimpleMethod::GET {
            return None;
        }
        Some(Box::new(MemoryCacheEntry {
            key: uri.to_string(),
            headers: context.response_headers.clone(),
            buffer: Vec::new(),
            store: Arc::clone(&self.store),
        }))
    }
}

struct MemoryCacheEntry {
    key: String,
    headers: HttpHeaders,
    buffer: Vec<u8>,
    store: Arc<Mutex<Store>>,
}

impl CacheRequest for MemoryCacheEntry {
    fn body(&mut self) -> &mut dyn Write {
        &mut self.buffer
    }

    fn commit(self: Box<Self>) -> io::Result<()> {
        let MemoryCacheEntry {
            key,
            headers,
            buffer,
            store,
        } = *self;
        let mut store = lock(&store);
        store.stats.commits += 1;
        store.entries.insert(key, (headers, buffer));
        Ok(())
    }

    fn abort(self: Box<Self>) {
        lock(&self.store).stats.aborts += 1;
    }
}
