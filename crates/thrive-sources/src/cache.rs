//! In-memory get-or-compute cache for fetched observations.
//!
//! Within one process a given cache key is fetched at most once: concurrent
//! callers coalesce onto the in-flight fetch and share the resulting
//! `Arc<Vec<RawObservation>>`. Failed fetches are NOT cached, so a later
//! caller gets a fresh attempt.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use thrive_types::RawObservation;

type CachedRows = Arc<Vec<RawObservation>>;

// ---------------------------------------------------------------------------
// ResponseCache
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ResponseCache {
    cells: Mutex<HashMap<String, Arc<OnceCell<CachedRows>>>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached rows for `key`, fetching them if absent.
    ///
    /// The map lock is held only to look up the cell; the fetch itself runs
    /// outside it so unrelated keys never serialize on each other.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> thrive_types::Result<CachedRows>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = thrive_types::Result<Vec<RawObservation>>>,
    {
        let cell = {
            let mut cells = self.cells.lock().await;
            cells
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let rows = cell
            .get_or_try_init(|| async {
                tracing::debug!(key, "cache miss, fetching");
                fetch().await.map(Arc::new)
            })
            .await?;
        Ok(rows.clone())
    }

    /// Number of keys with a completed fetch.
    pub async fn len(&self) -> usize {
        let cells = self.cells.lock().await;
        cells.values().filter(|c| c.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
