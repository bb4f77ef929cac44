//! Component and overall index composition.
//!
//! Standardized measure indices roll up twice: measures belonging to the
//! same component average into a `component_index`, and a region's
//! component indices average into its overall `thriving_index`. Both
//! averages are unweighted and skip missing inputs rather than counting
//! them as zero. A region/component pair with no surviving inputs
//! produces no row at all.

use std::collections::BTreeMap;

use thrive_types::{AggregateScore, ComponentScore, StandardizedRow};

/// Roll standardized rows up into component and overall scores.
///
/// `component_map` assigns each measure id to a component; rows for
/// measures outside the map are dropped with a warning.
pub fn compose(
    standardized: &[StandardizedRow],
    component_map: &BTreeMap<String, String>,
) -> (Vec<ComponentScore>, Vec<AggregateScore>) {
    let mut pools: BTreeMap<(String, String), (String, i32, Vec<f64>)> = BTreeMap::new();

    for row in standardized {
        let Some(component) = component_map.get(&row.measure) else {
            tracing::warn!(
                measure = %row.measure,
                "measure has no component assignment, excluding from composition"
            );
            continue;
        };
        let Some(index_value) = row.index_value else {
            continue;
        };
        pools
            .entry((row.region_id.clone(), component.clone()))
            .or_insert_with(|| (row.region_name.clone(), row.year, Vec::new()))
            .2
            .push(index_value);
    }

    let mut components = Vec::with_capacity(pools.len());
    let mut overall: BTreeMap<String, (String, i32, Vec<f64>)> = BTreeMap::new();
    for ((region_id, component), (region_name, year, values)) in pools {
        let component_index = mean(&values);
        overall
            .entry(region_id.clone())
            .or_insert_with(|| (region_name.clone(), year, Vec::new()))
            .2
            .push(component_index);
        components.push(ComponentScore {
            region_id,
            region_name,
            component,
            year,
            component_index,
        });
    }

    let aggregate = overall
        .into_iter()
        .map(|(region_id, (region_name, year, indices))| AggregateScore {
            region_id,
            region_name,
            year,
            thriving_index: mean(&indices),
        })
        .collect();

    (components, aggregate)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
