//! Extraction of typed county values from raw observations.
//!
//! This is the first step after a fetch: each raw row is reduced to the one
//! value (and optional weight) the measure declares. Unparseable and
//! suppressed cells become missing values here; a variable that no row
//! carries at all is a configuration fault and fails fast instead.

use thrive_config::MeasureSpec;
use thrive_types::{RawObservation, ThriveError};

/// One county's contribution to a measure, still keyed by raw geography.
#[derive(Debug, Clone, PartialEq)]
pub struct CountyValue {
    pub geo_key: String,
    pub value: Option<f64>,
    pub weight: Option<f64>,
}

/// Reduce raw observations to per-county values for one measure.
///
/// A missing or unparseable cell yields `value: None` for that county.
/// If the declared value variable appears in NO row of a non-empty batch,
/// the measure is misconfigured for this dataset and a `Config` error is
/// returned rather than a silently all-missing measure.
pub fn extract_rows(
    observations: &[RawObservation],
    measure: &MeasureSpec,
) -> thrive_types::Result<Vec<CountyValue>> {
    let value_variable = measure.value_variable();
    if value_variable.is_empty() {
        return Err(ThriveError::Config(format!(
            "measure '{}' declares no value variable",
            measure.id
        )));
    }

    if !observations.is_empty()
        && !observations.iter().any(|o| o.has_variable(value_variable))
    {
        return Err(ThriveError::Config(format!(
            "variable '{}' is absent from every row fetched for measure '{}'",
            value_variable, measure.id
        )));
    }

    let weight_variable = measure.weight_variable();
    let rows = observations
        .iter()
        .map(|obs| CountyValue {
            geo_key: obs.geo_key.clone(),
            value: obs.value_of(value_variable),
            weight: weight_variable.and_then(|w| obs.value_of(w)),
        })
        .collect();
    Ok(rows)
}
