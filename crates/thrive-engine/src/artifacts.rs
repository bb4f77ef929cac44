//! CSV artifact writing.
//!
//! Every run persists five artifact families under the output directory:
//!
//! - `raw_<measure>_<year>.csv`: fetched observations, one row per
//!   geo key and variable
//! - `measures_<year>.csv`: aggregated region values
//! - `standardized_<year>.csv`: peer-relative z-scores and index values
//! - `components_<year>.csv`: component indices
//! - `thriving_index_<year>.csv`: the overall index
//!
//! Rows are sorted before writing so reruns over the same inputs produce
//! byte-identical files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thrive_types::{
    AggregateScore, ComponentScore, MeasureRow, RawObservation, Result, StandardizedRow,
};

// ---------------------------------------------------------------------------
// YearOutputs: the assembled tables for one run
// ---------------------------------------------------------------------------

/// Every derived table produced by a single year's run.
#[derive(Debug, Clone, Default)]
pub struct YearOutputs {
    pub year: i32,
    pub measures: Vec<MeasureRow>,
    pub standardized: Vec<StandardizedRow>,
    pub components: Vec<ComponentScore>,
    pub aggregate: Vec<AggregateScore>,
}

// ---------------------------------------------------------------------------
// ArtifactWriter
// ---------------------------------------------------------------------------

/// Writes run artifacts as CSV files under a single output directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    out_dir: PathBuf,
}

/// One fetched variable cell in the long-format raw artifact.
#[derive(Debug, Serialize)]
struct RawRecord<'a> {
    geo_key: &'a str,
    year: i32,
    variable: &'a str,
    value: String,
}

impl ArtifactWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self { out_dir: out_dir.into() }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Write the fetched observations for one measure.
    pub fn write_raw(
        &self,
        measure: &str,
        year: i32,
        observations: &[RawObservation],
    ) -> Result<PathBuf> {
        let mut rows: Vec<RawRecord<'_>> = observations
            .iter()
            .flat_map(|obs| {
                obs.values.iter().map(|(variable, value)| RawRecord {
                    geo_key: &obs.geo_key,
                    year: obs.year,
                    variable,
                    value: render_cell(value),
                })
            })
            .collect();
        rows.sort_by(|a, b| (a.geo_key, a.variable).cmp(&(b.geo_key, b.variable)));
        self.write_table(format!("raw_{measure}_{year}.csv"), &rows)
    }

    /// Write the four derived tables and return their paths in write order.
    pub fn write_tables(&self, outputs: &YearOutputs) -> Result<Vec<PathBuf>> {
        let year = outputs.year;

        let mut measures = outputs.measures.clone();
        measures.sort_by(|a, b| {
            (a.measure.as_str(), a.region_id.as_str())
                .cmp(&(b.measure.as_str(), b.region_id.as_str()))
        });

        let mut standardized = outputs.standardized.clone();
        standardized.sort_by(|a, b| {
            (a.measure.as_str(), a.region_id.as_str())
                .cmp(&(b.measure.as_str(), b.region_id.as_str()))
        });

        let mut components = outputs.components.clone();
        components.sort_by(|a, b| {
            (a.region_id.as_str(), a.component.as_str())
                .cmp(&(b.region_id.as_str(), b.component.as_str()))
        });

        let mut aggregate = outputs.aggregate.clone();
        aggregate.sort_by(|a, b| a.region_id.cmp(&b.region_id));

        Ok(vec![
            self.write_table(format!("measures_{year}.csv"), &measures)?,
            self.write_table(format!("standardized_{year}.csv"), &standardized)?,
            self.write_table(format!("components_{year}.csv"), &components)?,
            self.write_table(format!("thriving_index_{year}.csv"), &aggregate)?,
        ])
    }

    fn write_table<T: Serialize>(&self, file_name: String, rows: &[T]) -> Result<PathBuf> {
        fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join(file_name);
        let mut writer = csv::Writer::from_path(&path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        tracing::debug!(path = %path.display(), rows = rows.len(), "wrote artifact");
        Ok(path)
    }
}

/// Render a raw JSON cell for CSV output without JSON string quoting.
fn render_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
