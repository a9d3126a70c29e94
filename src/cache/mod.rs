//! Memoisation of portal results.
//!
//! [`ResultCache::get_or_compute`] returns a previously stored result for a key, or runs
//! the computation and persists its successful result before returning it.

pub mod error;
pub mod key;
pub mod store;

use crate::cache::error::CacheError;
use crate::cache::key::CacheKey;
use crate::cache::store::CacheStore;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;

pub struct ResultCache<S> {
    store: S,
}

impl<S: CacheStore> ResultCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the cached value for `key`, computing and storing it on a miss.
    ///
    /// Errors from `compute` are returned unchanged and nothing is stored. A cached
    /// entry that no longer decodes is treated as a miss and overwritten.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &CacheKey, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let path = key.path();
        if let Some(bytes) = self.store.load(&path).await? {
            match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    info!("Cache hit for {}", path);
                    return Ok(value);
                }
                Err(e) => warn!(
                    "{}; recomputing",
                    CacheError::Decode(path.clone(), e)
                ),
            }
        } else {
            info!("Cache miss for {}", path);
        }

        let value = compute().await?;
        let bytes = serde_json::to_vec(&value).map_err(|e| CacheError::Encode(path.clone(), e))?;
        self.store.store(&path, bytes).await?;
        Ok(value)
    }
}
