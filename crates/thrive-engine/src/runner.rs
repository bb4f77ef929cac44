//! Pipeline runner: the end-to-end index build for one year.
//!
//! Drives the full stage lifecycle: fetch, standardize, compose, write,
//! validate. Fetching covers extraction, region resolution, and
//! aggregation for each measure; a failed measure is recorded and the
//! remaining measures are still attempted so one outage surfaces every
//! broken measure at once. Artifacts are written before validation runs,
//! and stay on disk when validation fails.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use thrive_config::{Config, MeasureSpec};
use thrive_sources::{SourceClient, SourceQuery};
use thrive_types::{MeasureRow, RawObservation, Result, ThriveError};
use uuid::Uuid;

use crate::aggregate::aggregate;
use crate::artifacts::{ArtifactWriter, YearOutputs};
use crate::compose::compose;
use crate::events::{EventEmitter, RunEvent};
use crate::extract::extract_rows;
use crate::peers;
use crate::resolve::RegionResolver;
use crate::standardize::standardize;
use crate::validation::{validate_or_raise, Severity};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Owns the config and source client and drives complete runs.
pub struct PipelineRunner {
    config: Config,
    client: SourceClient,
    emitter: EventEmitter,
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub year: i32,
    pub started_at: DateTime<Utc>,
    /// Regions that received an overall index.
    pub regions: usize,
    pub measures_fetched: usize,
    /// Unmatched row counts per measure, only measures that had any.
    pub unmatched: BTreeMap<String, usize>,
    pub artifacts: Vec<PathBuf>,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

/// Everything `build` accumulates for the report.
struct BuildOutcome {
    regions: usize,
    measures_fetched: usize,
    unmatched: BTreeMap<String, usize>,
    artifacts: Vec<PathBuf>,
    warnings: Vec<String>,
}

/// One measure's fetch, carried through resolution and aggregation.
struct MeasureFetch {
    observations: Arc<Vec<RawObservation>>,
    rows: Vec<MeasureRow>,
    unmatched: usize,
}

// ---------------------------------------------------------------------------
// PipelineRunner
// ---------------------------------------------------------------------------

impl PipelineRunner {
    pub fn new(config: Config, client: SourceClient) -> Self {
        Self {
            config,
            client,
            emitter: EventEmitter::default(),
        }
    }

    /// The run's event emitter, for subscribing before `run` is called.
    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    /// Execute a complete run for one year.
    pub async fn run(&self, year: i32) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();

        self.emitter.emit(RunEvent::RunStarted {
            run_id: run_id.to_string(),
            year,
            measures: self.config.measures.len(),
        });
        tracing::info!(
            %run_id,
            year,
            offline = self.client.is_offline(),
            measures = self.config.measures.len(),
            "starting index build"
        );

        match self.build(year).await {
            Ok(outcome) => {
                let duration_ms = clock.elapsed().as_millis() as u64;
                self.emitter.emit(RunEvent::RunCompleted {
                    run_id: run_id.to_string(),
                    year,
                    artifacts: outcome.artifacts.len(),
                    duration_ms,
                });
                tracing::info!(
                    %run_id,
                    regions = outcome.regions,
                    artifacts = outcome.artifacts.len(),
                    duration_ms,
                    "index build complete"
                );
                Ok(RunReport {
                    run_id,
                    year,
                    started_at,
                    regions: outcome.regions,
                    measures_fetched: outcome.measures_fetched,
                    unmatched: outcome.unmatched,
                    artifacts: outcome.artifacts,
                    warnings: outcome.warnings,
                    duration_ms,
                })
            }
            Err(e) => {
                self.emitter.emit(RunEvent::RunFailed {
                    run_id: run_id.to_string(),
                    error: e.to_string(),
                });
                tracing::error!(%run_id, error = %e, "index build failed");
                Err(e)
            }
        }
    }

    async fn build(&self, year: i32) -> Result<BuildOutcome> {
        let resolver = RegionResolver::new(&self.config.regions)?;
        let mut warnings: Vec<String> = Vec::new();

        // Stage: fetch (covers extraction, resolution, and aggregation)
        let stage = self.begin_stage("fetch");
        let mut measures_table: Vec<MeasureRow> = Vec::new();
        let mut raw_tables: Vec<(String, Arc<Vec<RawObservation>>)> = Vec::new();
        let mut unmatched: BTreeMap<String, usize> = BTreeMap::new();
        let mut failed: Vec<String> = Vec::new();

        for measure in &self.config.measures {
            match self.fetch_measure(measure, year, &resolver).await {
                Ok(fetch) => {
                    self.emitter.emit(RunEvent::FetchCompleted {
                        measure: measure.id.clone(),
                        rows: fetch.observations.len(),
                    });
                    if fetch.unmatched > 0 {
                        self.emitter.emit(RunEvent::RowsUnmatched {
                            measure: measure.id.clone(),
                            count: fetch.unmatched,
                        });
                        tracing::warn!(
                            measure = %measure.id,
                            count = fetch.unmatched,
                            "rows matched no configured region"
                        );
                        warnings.push(format!(
                            "measure '{}': {} rows matched no configured region",
                            measure.id, fetch.unmatched
                        ));
                        unmatched.insert(measure.id.clone(), fetch.unmatched);
                    }
                    raw_tables.push((measure.id.clone(), fetch.observations));
                    measures_table.extend(fetch.rows);
                }
                Err(e) => {
                    self.emitter.emit(RunEvent::FetchFailed {
                        measure: measure.id.clone(),
                        error: e.to_string(),
                    });
                    tracing::error!(measure = %measure.id, error = %e, "measure fetch failed");
                    failed.push(measure.id.clone());
                }
            }
        }
        self.end_stage("fetch", stage);

        if !failed.is_empty() {
            return Err(ThriveError::FetchFailed { measures: failed });
        }

        // Stage: standardize
        let stage = self.begin_stage("standardize");
        let region_ids = self.config.region_ids();
        let strategy = peers::from_config(&self.config.peers);
        let assignments = strategy.assign(&region_ids);
        tracing::debug!(strategy = strategy.name(), regions = assignments.len(), "peer groups assigned");
        let standardized = standardize(&measures_table, &assignments);
        self.end_stage("standardize", stage);

        // Stage: compose
        let stage = self.begin_stage("compose");
        let (components, overall) = compose(&standardized, &self.config.component_map());
        self.end_stage("compose", stage);

        let outputs = YearOutputs {
            year,
            measures: measures_table,
            standardized,
            components,
            aggregate: overall,
        };

        // Stage: write artifacts
        let stage = self.begin_stage("write_artifacts");
        let writer = ArtifactWriter::new(&self.config.settings.output_dir);
        let mut artifacts = Vec::new();
        for (measure_id, observations) in &raw_tables {
            artifacts.push(writer.write_raw(measure_id, year, observations)?);
        }
        artifacts.extend(writer.write_tables(&outputs)?);
        self.end_stage("write_artifacts", stage);

        // Stage: validate (artifacts are already on disk and stay there)
        let stage = self.begin_stage("validate");
        let diagnostics = validate_or_raise(&outputs, &region_ids)?;
        for d in diagnostics.iter().filter(|d| d.severity == Severity::Warning) {
            tracing::warn!(rule = %d.rule, "{}", d.message);
            warnings.push(d.message.clone());
        }
        self.end_stage("validate", stage);

        Ok(BuildOutcome {
            regions: outputs.aggregate.len(),
            measures_fetched: raw_tables.len(),
            unmatched,
            artifacts,
            warnings,
        })
    }

    /// Fetch one measure and reduce it to region rows.
    async fn fetch_measure(
        &self,
        measure: &MeasureSpec,
        year: i32,
        resolver: &RegionResolver,
    ) -> Result<MeasureFetch> {
        let query = SourceQuery::for_measure(measure, year)?;
        let observations = self.client.fetch(&query).await?;
        let counties = extract_rows(&observations, measure)?;
        let resolution = resolver.resolve(counties, measure.geo_key);
        let rows = aggregate(&resolution.rows, measure, year);
        Ok(MeasureFetch {
            observations,
            rows,
            unmatched: resolution.unmatched,
        })
    }

    fn begin_stage(&self, stage: &str) -> Instant {
        self.emitter.emit(RunEvent::StageStarted { stage: stage.into() });
        tracing::debug!(stage, "stage started");
        Instant::now()
    }

    fn end_stage(&self, stage: &str, clock: Instant) {
        let duration_ms = clock.elapsed().as_millis() as u64;
        self.emitter.emit(RunEvent::StageCompleted {
            stage: stage.into(),
            duration_ms,
        });
        tracing::debug!(stage, duration_ms, "stage completed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
