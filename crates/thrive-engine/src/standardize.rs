//! Peer-group standardization.
//!
//! Each aggregated value is scored against the other members of its
//! (measure, peer group) pool: `z = (value - pool_mean) / pool_stddev`
//! with the sample (n-1) standard deviation, then rescaled to
//! `index_value = 100 + 100*z` so that 100 means "at the peer mean".
//!
//! Degenerate pools have defined fallbacks instead of NaN arithmetic:
//! a pool with at most one usable value, or with zero spread, scores its
//! valued rows at the neutral z = 0. Missing values stay missing through
//! every branch and never acquire a score.

use std::collections::{BTreeMap, HashMap};

use thrive_types::{MeasureRow, PeerAssignment, StandardizedRow};

/// Spread below this is treated as a constant pool.
const DEGENERATE_STDDEV: f64 = 1e-9;

/// Standardize aggregated rows within their (measure, peer group) pools.
///
/// Regions without an assignment fall back to a singleton pool. Output is
/// ordered by (measure, region_id).
pub fn standardize(rows: &[MeasureRow], assignments: &[PeerAssignment]) -> Vec<StandardizedRow> {
    let group_of: HashMap<&str, &str> = assignments
        .iter()
        .map(|a| (a.region_id.as_str(), a.peer_group.as_str()))
        .collect();

    let mut pools: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        let group = group_of
            .get(row.region_id.as_str())
            .copied()
            .unwrap_or(row.region_id.as_str());
        pools
            .entry((row.measure.clone(), group.to_string()))
            .or_default()
            .push(i);
    }

    let mut scores: Vec<Option<f64>> = vec![None; rows.len()];
    for ((measure, group), members) in &pools {
        let valued: Vec<(usize, f64)> = members
            .iter()
            .filter_map(|&i| rows[i].value.map(|v| (i, v)))
            .collect();

        match pool_stats(&valued) {
            PoolStats::Empty => {}
            PoolStats::Degenerate => {
                tracing::debug!(measure, group, "degenerate pool, scoring neutral");
                for (i, _) in valued {
                    scores[i] = Some(0.0);
                }
            }
            PoolStats::Spread { mean, stddev } => {
                for (i, v) in valued {
                    scores[i] = Some((v - mean) / stddev);
                }
            }
        }
    }

    let mut out: Vec<StandardizedRow> = rows
        .iter()
        .zip(scores)
        .map(|(row, z)| StandardizedRow::from_measure(row, z))
        .collect();
    out.sort_by(|a, b| {
        (a.measure.as_str(), a.region_id.as_str()).cmp(&(b.measure.as_str(), b.region_id.as_str()))
    });
    out
}

enum PoolStats {
    /// No usable values at all.
    Empty,
    /// One value, or no spread between values.
    Degenerate,
    Spread { mean: f64, stddev: f64 },
}

fn pool_stats(valued: &[(usize, f64)]) -> PoolStats {
    let n = valued.len();
    if n == 0 {
        return PoolStats::Empty;
    }
    if n == 1 {
        return PoolStats::Degenerate;
    }

    let mean = valued.iter().map(|(_, v)| v).sum::<f64>() / n as f64;
    let variance = valued
        .iter()
        .map(|(_, v)| (v - mean).powi(2))
        .sum::<f64>()
        / (n - 1) as f64;
    let stddev = variance.sqrt();
    if stddev <= DEGENERATE_STDDEV {
        return PoolStats::Degenerate;
    }
    PoolStats::Spread { mean, stddev }
}
