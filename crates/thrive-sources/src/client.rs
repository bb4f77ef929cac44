//! The fetch facade the engine talks to.
//!
//! `SourceClient` owns one adapter per source kind plus the offline
//! synthesizer, and wraps every fetch in the shared cache and retry layers:
//!
//!   fetch → cache (one upstream call per key) → retry → adapter
//!
//! Offline mode swaps the adapter dispatch for the synthetic generator while
//! keeping the cache and retry path identical.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thrive_config::{Config, Credentials};
use thrive_types::{County, RawObservation, SourceKind, ThriveError};

use crate::{
    execute_with_retry, BackoffPolicy, BeaAdapter, BlsAdapter, CensusAdapter, DynSource,
    ResponseCache, SourceAdapter, SourceQuery, SyntheticSource,
};

// ---------------------------------------------------------------------------
// SourceClient
// ---------------------------------------------------------------------------

pub struct SourceClient {
    sources: HashMap<SourceKind, DynSource>,
    synthetic: DynSource,
    cache: ResponseCache,
    offline: bool,
    max_attempts: usize,
    backoff: BackoffPolicy,
}

impl SourceClient {
    pub fn builder() -> SourceClientBuilder {
        SourceClientBuilder::new()
    }

    /// Build a client wired per the run configuration.
    pub fn from_config(config: &Config, credentials: Credentials) -> thrive_types::Result<Self> {
        Self::builder()
            .offline(config.settings.offline)
            .counties(config.county_roster())
            .credentials(credentials)
            .max_attempts(config.settings.max_attempts)
            .request_timeout(Duration::from_millis(config.settings.request_timeout_ms))
            .build()
    }

    /// Replace the adapter for one source kind.
    pub fn register_source(&mut self, kind: SourceKind, adapter: impl SourceAdapter + 'static) {
        self.sources.insert(kind, DynSource::new(adapter));
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Fetch one measure-year, through the cache and the retry loop.
    ///
    /// Repeat calls for the same cache key return the same shared rows
    /// without touching the upstream again.
    pub async fn fetch(
        &self,
        query: &SourceQuery,
    ) -> thrive_types::Result<Arc<Vec<RawObservation>>> {
        let key = query.cache_key();
        self.cache
            .get_or_fetch(&key, || {
                execute_with_retry(
                    || self.fetch_once(query),
                    self.max_attempts,
                    &self.backoff,
                    &query.measure,
                )
            })
            .await
    }

    async fn fetch_once(&self, query: &SourceQuery) -> thrive_types::Result<Vec<RawObservation>> {
        if self.offline {
            return self.synthetic.fetch(query).await;
        }
        let kind = query.kind();
        let source = self.sources.get(&kind).ok_or_else(|| {
            ThriveError::Config(format!(
                "no adapter registered for source '{}'",
                kind.as_str()
            ))
        })?;
        source.fetch(query).await
    }
}

// ---------------------------------------------------------------------------
// SourceClientBuilder
// ---------------------------------------------------------------------------

pub struct SourceClientBuilder {
    offline: bool,
    counties: Vec<County>,
    credentials: Credentials,
    timeout: Duration,
    max_attempts: usize,
    backoff: BackoffPolicy,
}

impl SourceClientBuilder {
    fn new() -> Self {
        Self {
            offline: false,
            counties: Vec::new(),
            credentials: Credentials::default(),
            timeout: Duration::from_secs(30),
            max_attempts: 5,
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// The full county roster, used for BLS series expansion and for the
    /// synthetic generator.
    pub fn counties(mut self, counties: Vec<County>) -> Self {
        self.counties = counties;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn build(self) -> thrive_types::Result<SourceClient> {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ThriveError::Other(format!("failed to build HTTP client: {e}")))?;

        let mut sources = HashMap::new();
        sources.insert(
            SourceKind::Census,
            DynSource::new(CensusAdapter::new(
                http.clone(),
                self.credentials.census.clone(),
            )),
        );
        sources.insert(
            SourceKind::Bea,
            DynSource::new(BeaAdapter::new(http.clone(), self.credentials.bea.clone())),
        );
        sources.insert(
            SourceKind::Bls,
            DynSource::new(BlsAdapter::new(
                http,
                self.credentials.bls.clone(),
                self.counties.clone(),
            )),
        );

        Ok(SourceClient {
            sources,
            synthetic: DynSource::new(SyntheticSource::new(self.counties)),
            cache: ResponseCache::new(),
            offline: self.offline,
            max_attempts: self.max_attempts,
            backoff: self.backoff,
        })
    }
}

impl Default for SourceClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
