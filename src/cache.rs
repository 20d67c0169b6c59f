//! Process-wide reuse of constructed transports.
//!
//! Building a pooled transport is expensive and each one owns its own
//! connection pool, so clients built from equivalent configs should share
//! one. The cache keys transports by the config fingerprint computed in
//! [`TransportConfig`](crate::transport::TransportConfig); configs carrying
//! opaque hooks have no fingerprint and bypass the cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::Error;
use crate::transport::RoundTripper;

/// Fingerprint-keyed cache of decorated round trippers.
#[derive(Default)]
pub struct TransportCache {
    inner: Mutex<HashMap<String, Arc<dyn RoundTripper>>>,
}

impl TransportCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached transport for `key`, constructing it with `make`
    /// on first use.
    ///
    /// Construction happens under the cache lock, so concurrent lookups of
    /// the same key observe exactly one construction. A failed construction
    /// is not cached and the error is returned to the caller.
    pub fn get_or_create<F>(&self, key: &str, make: F) -> Result<Arc<dyn RoundTripper>, Error>
    where
        F: FnOnce() -> Result<Arc<dyn RoundTripper>, Error>,
    {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(rt) = map.get(key) {
            return Ok(rt.clone());
        }
        let rt = make()?;
        map.insert(key.to_owned(), rt.clone());
        Ok(rt)
    }

    /// Number of cached transports.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
