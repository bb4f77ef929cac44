//! Statistical source clients with retry, caching, and offline synthesis.
//!
//! Provides the `SourceAdapter` trait, `DynSource` wrapper, per-source
//! adapters (census tabular, BEA regional accounts, BLS time series), the
//! deterministic offline generator, and `SourceClient` for routing queries
//! through the shared cache and retry layers.

mod adapter;
mod bea;
mod bls;
mod cache;
mod census;
mod client;
mod query;
mod retry;
mod synthetic;

pub use adapter::*;
pub use bea::BeaAdapter;
pub use bls::BlsAdapter;
pub use cache::ResponseCache;
pub use census::CensusAdapter;
pub use client::*;
pub use query::*;
pub use retry::*;
pub use synthetic::SyntheticSource;
