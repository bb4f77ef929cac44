//! Deterministic synthetic observations for offline runs.
//!
//! The generator is seeded from the query's cache key, so a given
//! measure-year always yields the same rows regardless of process, machine,
//! or wall clock. Values vary across counties, variables, and years, which
//! keeps downstream standardization non-degenerate.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{QueryDetail, SourceAdapter, SourceQuery};
use thrive_types::{County, GeoKeyStrategy, RawObservation};

// ---------------------------------------------------------------------------
// SyntheticSource
// ---------------------------------------------------------------------------

pub struct SyntheticSource {
    counties: Vec<County>,
}

impl SyntheticSource {
    pub fn new(counties: Vec<County>) -> Self {
        Self { counties }
    }

    /// The geo key a synthetic row gets, per the query's strategy.
    ///
    /// Counties missing the field the strategy needs produce no row; the
    /// resolver would never match them anyway.
    fn geo_key_for(&self, county: &County, strategy: GeoKeyStrategy) -> Option<String> {
        match strategy {
            GeoKeyStrategy::Fips => county.fips.as_ref().map(|f| format!("{f:0>5}")),
            GeoKeyStrategy::Name => county.name.clone(),
        }
    }
}

fn seed_for(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// A per-variable scale in [100, 100_000], stable across runs.
fn magnitude_for(variable: &str) -> f64 {
    let mut hasher = DefaultHasher::new();
    variable.hash(&mut hasher);
    10f64.powi(2 + (hasher.finish() % 4) as i32)
}

fn variables_for(detail: &QueryDetail) -> Vec<String> {
    match detail {
        QueryDetail::Census { variables, .. } => variables.clone(),
        QueryDetail::Bea { .. } => vec!["DataValue".to_string()],
        QueryDetail::Bls { .. } => vec!["value".to_string()],
    }
}

#[async_trait]
impl SourceAdapter for SyntheticSource {
    async fn fetch(&self, query: &SourceQuery) -> thrive_types::Result<Vec<RawObservation>> {
        let mut rng = StdRng::seed_from_u64(seed_for(&query.cache_key()));
        let variables = variables_for(&query.detail);

        let mut rows = Vec::with_capacity(self.counties.len());
        for county in &self.counties {
            // Draws happen for every county in roster order so the stream
            // stays aligned even when a county produces no row.
            let draws: Vec<f64> = variables
                .iter()
                .map(|_| rng.gen_range(0.5..1.5))
                .collect();

            let Some(geo_key) = self.geo_key_for(county, query.geo) else {
                tracing::debug!(
                    measure = %query.measure,
                    ?county,
                    "county lacks the field the geo strategy needs, skipping"
                );
                continue;
            };

            let mut row = RawObservation::new(geo_key, query.year);
            for (variable, draw) in variables.iter().zip(draws) {
                let value = (draw * magnitude_for(variable) * 10.0).round() / 10.0;
                row = row.with_value(variable.clone(), serde_json::json!(value));
            }
            rows.push(row);
        }

        tracing::debug!(
            measure = %query.measure,
            rows = rows.len(),
            "synthesized offline observations"
        );
        Ok(rows)
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
