//! Reduction of region-keyed county rows to one value per region.
//!
//! Missing member values never fail an aggregation; they are excluded from
//! the reduction, and a region whose members are all missing aggregates to
//! missing (never zero). Regions are emitted in id order so downstream
//! tables and artifacts are deterministically ordered.

use std::collections::BTreeMap;

use crate::ResolvedRow;
use thrive_config::MeasureSpec;
use thrive_types::{AggregationMode, MeasureRow};

/// Aggregate resolved rows into one `MeasureRow` per region.
///
/// Only regions present in the input appear in the output; a region with
/// rows but no usable values gets an explicit missing value.
pub fn aggregate(rows: &[ResolvedRow], measure: &MeasureSpec, year: i32) -> Vec<MeasureRow> {
    let mut groups: BTreeMap<(String, String), Vec<&ResolvedRow>> = BTreeMap::new();
    for row in rows {
        groups
            .entry((row.region_id.clone(), row.region_name.clone()))
            .or_default()
            .push(row);
    }

    groups
        .into_iter()
        .map(|((region_id, region_name), members)| {
            let value = reduce(&members, measure.mode);
            MeasureRow {
                region_id,
                region_name,
                measure: measure.id.clone(),
                year,
                value,
            }
        })
        .collect()
}

fn reduce(members: &[&ResolvedRow], mode: AggregationMode) -> Option<f64> {
    match mode {
        AggregationMode::Sum => {
            let present: Vec<f64> = members.iter().filter_map(|r| r.value).collect();
            if present.is_empty() {
                return None;
            }
            Some(present.iter().sum())
        }
        AggregationMode::Mean => {
            let present: Vec<f64> = members.iter().filter_map(|r| r.value).collect();
            if present.is_empty() {
                return None;
            }
            Some(present.iter().sum::<f64>() / present.len() as f64)
        }
        AggregationMode::WeightedMean => {
            // Only members with both value and weight qualify.
            let pairs: Vec<(f64, f64)> = members
                .iter()
                .filter_map(|r| Some((r.value?, r.weight?)))
                .collect();
            let total_weight: f64 = pairs.iter().map(|(_, w)| w).sum();
            if pairs.is_empty() || total_weight == 0.0 {
                return None;
            }
            Some(pairs.iter().map(|(v, w)| v * w).sum::<f64>() / total_weight)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thrive_types::{GeoKeyStrategy, SourceKind};

    fn measure(mode: AggregationMode) -> MeasureSpec {
        MeasureSpec {
            id: "m".into(),
            component: "c".into(),
            source: SourceKind::Bea,
            mode,
            geo_key: GeoKeyStrategy::Fips,
            dataset: None,
            variables: vec![],
            value_variable: None,
            weight_variable: None,
            table: Some("CAINC1".into()),
            line_code: Some("3".into()),
            series_pattern: None,
        }
    }

    fn row(region: &str, value: Option<f64>, weight: Option<f64>) -> ResolvedRow {
        ResolvedRow {
            region_id: region.into(),
            region_name: format!("{region} name"),
            value,
            weight,
        }
    }

    #[test]
    fn sum_is_exact_over_present_values() {
        let rows = vec![
            row("r1", Some(10_000.0), None),
            row("r1", Some(5_000.0), None),
            row("r2", Some(7.0), None),
        ];
        let out = aggregate(&rows, &measure(AggregationMode::Sum), 2022);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].region_id, "r1");
        assert_eq!(out[0].value, Some(15_000.0));
        assert_eq!(out[1].value, Some(7.0));
        assert_eq!(out[0].measure, "m");
        assert_eq!(out[0].year, 2022);
    }

    #[test]
    fn sum_ignores_missing_members() {
        let rows = vec![
            row("r1", Some(10.0), None),
            row("r1", None, None),
            row("r1", Some(5.0), None),
        ];
        let out = aggregate(&rows, &measure(AggregationMode::Sum), 2022);
        assert_eq!(out[0].value, Some(15.0));
    }

    #[test]
    fn all_missing_aggregates_to_missing_not_zero() {
        let rows = vec![row("r1", None, None), row("r1", None, None)];
        for mode in [
            AggregationMode::Sum,
            AggregationMode::Mean,
            AggregationMode::WeightedMean,
        ] {
            let out = aggregate(&rows, &measure(mode), 2022);
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].value, None, "mode {mode:?}");
        }
    }

    #[test]
    fn mean_over_present_values() {
        let rows = vec![
            row("r1", Some(10.0), None),
            row("r1", None, None),
            row("r1", Some(30.0), None),
        ];
        let out = aggregate(&rows, &measure(AggregationMode::Mean), 2022);
        assert_eq!(out[0].value, Some(20.0));
    }

    #[test]
    fn weighted_mean_weights_by_denominator() {
        // 10% of 100_000 and 30% of 10_000 blend to 11.8%, far from the
        // naive 20% simple mean.
        let rows = vec![
            row("r1", Some(10.0), Some(100_000.0)),
            row("r1", Some(30.0), Some(10_000.0)),
        ];
        let out = aggregate(&rows, &measure(AggregationMode::WeightedMean), 2022);
        let value = out[0].value.unwrap();
        assert!((value - 11.818181818).abs() < 1e-6);
        assert!((value - 20.0).abs() > 1.0);
    }

    #[test]
    fn weighted_mean_requires_both_value_and_weight() {
        let rows = vec![
            row("r1", Some(10.0), Some(100.0)),
            row("r1", Some(99.0), None),
            row("r1", None, Some(500.0)),
        ];
        let out = aggregate(&rows, &measure(AggregationMode::WeightedMean), 2022);
        assert_eq!(out[0].value, Some(10.0));
    }

    #[test]
    fn zero_total_weight_is_missing() {
        let rows = vec![row("r1", Some(10.0), Some(0.0))];
        let out = aggregate(&rows, &measure(AggregationMode::WeightedMean), 2022);
        assert_eq!(out[0].value, None);
    }

    #[test]
    fn regions_emit_in_id_order() {
        let rows = vec![
            row("zebra", Some(1.0), None),
            row("alpha", Some(2.0), None),
            row("mid", Some(3.0), None),
        ];
        let out = aggregate(&rows, &measure(AggregationMode::Sum), 2022);
        let ids: Vec<&str> = out.iter().map(|r| r.region_id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "mid", "zebra"]);
    }

    #[test]
    fn empty_input_aggregates_to_empty() {
        let out = aggregate(&[], &measure(AggregationMode::Sum), 2022);
        assert!(out.is_empty());
    }
}
