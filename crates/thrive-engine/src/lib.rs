//! The Thriving Index pipeline: resolution, aggregation, standardization,
//! composition, validation, and artifact writing.
//!
//! This crate implements everything between fetched observations and the
//! final CSV tables, plus the [`runner::PipelineRunner`] that drives a
//! complete year's build end to end.

pub mod aggregate;
pub mod artifacts;
pub mod compose;
pub mod events;
pub mod extract;
pub mod peers;
pub mod resolve;
pub mod runner;
pub mod standardize;
pub mod validation;

pub use aggregate::aggregate;
pub use artifacts::{ArtifactWriter, YearOutputs};
pub use compose::compose;
pub use events::{EventEmitter, RunEvent};
pub use extract::{extract_rows, CountyValue};
pub use peers::{IdentityPeers, PeerStrategy, TablePeers};
pub use resolve::{
    normalize_county_name, pad_fips, RegionResolver, ResolvedRow, Resolution,
};
pub use runner::{PipelineRunner, RunReport};
pub use standardize::standardize;
pub use validation::{validate, validate_or_raise, CheckRule, Diagnostic, Severity};
