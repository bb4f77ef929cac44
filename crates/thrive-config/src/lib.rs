//! Declarative configuration for Thriving Index runs.
//!
//! One TOML file declares everything a run needs: run settings, the
//! region → member-county table, the measure catalog (which also carries the
//! measure → component mapping), optional explicit peer groups, and optional
//! weight overrides. The file is loaded once per process and the resulting
//! [`Config`] is immutable for the duration of the run.
//!
//! API credentials are NOT part of the file; they come from the environment
//! via [`Credentials::from_env`]. A missing credential is a warning, not an
//! error; requests proceed unauthenticated and normal failure handling
//! applies if the source rejects them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thrive_types::{
    AggregationMode, County, GeoKeyStrategy, Result, SourceKind, ThriveError,
};

/// Default config path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "thrive.toml";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Run-wide settings with sensible defaults; every field may be omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Route all source calls to the deterministic synthetic generator.
    pub offline: bool,
    /// Directory the CSV artifacts are written to.
    pub output_dir: PathBuf,
    /// Total fetch attempts per source call (first try included).
    pub max_attempts: usize,
    /// Per-request timeout; exceeding it counts as a transient failure.
    pub request_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            offline: false,
            output_dir: PathBuf::from("output"),
            max_attempts: 5,
            request_timeout_ms: 30_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

/// One multi-county region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSpec {
    pub id: String,
    pub name: String,
    pub counties: Vec<County>,
}

// ---------------------------------------------------------------------------
// Measures
// ---------------------------------------------------------------------------

/// One entry of the measure catalog.
///
/// The source-specific fields are flat and optional; [`Config::validate`]
/// enforces that the fields required by `source` are present, so an invalid
/// catalog fails at load time rather than at fetch or aggregation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureSpec {
    pub id: String,
    /// Component this measure rolls up into.
    pub component: String,
    pub source: SourceKind,
    pub mode: AggregationMode,
    #[serde(default)]
    pub geo_key: GeoKeyStrategy,

    // census
    #[serde(default)]
    pub dataset: Option<String>,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub value_variable: Option<String>,
    #[serde(default)]
    pub weight_variable: Option<String>,

    // bea
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub line_code: Option<String>,

    // bls
    #[serde(default)]
    pub series_pattern: Option<String>,
}

impl MeasureSpec {
    /// The observation variable holding this measure's value.
    ///
    /// Census measures must declare it; BEA and BLS rows carry a single
    /// well-known value variable that can be overridden but rarely is.
    pub fn value_variable(&self) -> &str {
        match (&self.value_variable, self.source) {
            (Some(v), _) => v,
            (None, SourceKind::Bea) => "DataValue",
            (None, SourceKind::Bls) => "value",
            (None, SourceKind::Census) => "",
        }
    }

    /// The observation variable holding the aggregation weight, if any.
    pub fn weight_variable(&self) -> Option<&str> {
        self.weight_variable.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

/// Optional component/measure weight overrides.
///
/// Parsed and carried so the composer has the extension point in hand, but
/// the reference composition is unweighted and does not apply them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeightsConfig {
    #[serde(default)]
    pub components: BTreeMap<String, f64>,
    #[serde(default)]
    pub measures: BTreeMap<String, f64>,
}

impl WeightsConfig {
    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.measures.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// The full run configuration, loaded once and immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub regions: Vec<RegionSpec>,
    #[serde(default)]
    pub measures: Vec<MeasureSpec>,
    /// Explicit region → peer-group table; unlisted regions self-peer.
    #[serde(default)]
    pub peers: BTreeMap<String, String>,
    #[serde(default)]
    pub weights: WeightsConfig,
}

impl Config {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ThriveError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml(&text)?;
        tracing::info!(
            path = %path.display(),
            regions = config.regions.len(),
            measures = config.measures.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parse and validate config from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation run at load time, before anything is fetched.
    pub fn validate(&self) -> Result<()> {
        if self.regions.is_empty() {
            return Err(ThriveError::Config("no regions configured".into()));
        }
        if self.measures.is_empty() {
            return Err(ThriveError::Config("no measures configured".into()));
        }

        let mut region_ids = BTreeSet::new();
        for region in &self.regions {
            if region.id.trim().is_empty() {
                return Err(ThriveError::Config("region with empty id".into()));
            }
            if !region_ids.insert(region.id.as_str()) {
                return Err(ThriveError::Config(format!(
                    "duplicate region id '{}'",
                    region.id
                )));
            }
            if region.counties.is_empty() {
                return Err(ThriveError::Config(format!(
                    "region '{}' has no member counties",
                    region.id
                )));
            }
            for county in &region.counties {
                if county.name.is_none() && county.fips.is_none() {
                    return Err(ThriveError::Config(format!(
                        "region '{}' has a county with neither name nor fips",
                        region.id
                    )));
                }
            }
        }

        let mut measure_ids = BTreeSet::new();
        for measure in &self.measures {
            if !measure_ids.insert(measure.id.as_str()) {
                return Err(ThriveError::Config(format!(
                    "duplicate measure id '{}'",
                    measure.id
                )));
            }
            self.validate_measure(measure)?;
        }

        for region_id in self.peers.keys() {
            if !region_ids.contains(region_id.as_str()) {
                tracing::warn!(region_id, "peer table entry for unknown region");
            }
        }
        for measure_id in self.weights.measures.keys() {
            if !measure_ids.contains(measure_id.as_str()) {
                tracing::warn!(measure_id, "weight override for unknown measure");
            }
        }

        Ok(())
    }

    fn validate_measure(&self, measure: &MeasureSpec) -> Result<()> {
        let id = &measure.id;
        match measure.source {
            SourceKind::Census => {
                if measure.dataset.is_none() {
                    return Err(ThriveError::Config(format!(
                        "census measure '{id}' is missing 'dataset'"
                    )));
                }
                if measure.variables.is_empty() {
                    return Err(ThriveError::Config(format!(
                        "census measure '{id}' declares no variables"
                    )));
                }
                let value = measure.value_variable.as_deref().ok_or_else(|| {
                    ThriveError::Config(format!(
                        "census measure '{id}' is missing 'value_variable'"
                    ))
                })?;
                if !measure.variables.iter().any(|v| v == value) {
                    return Err(ThriveError::Config(format!(
                        "census measure '{id}': value_variable '{value}' is not in 'variables'"
                    )));
                }
                if let Some(weight) = measure.weight_variable() {
                    if !measure.variables.iter().any(|v| v == weight) {
                        return Err(ThriveError::Config(format!(
                            "census measure '{id}': weight_variable '{weight}' is not in 'variables'"
                        )));
                    }
                }
            }
            SourceKind::Bea => {
                if measure.table.is_none() || measure.line_code.is_none() {
                    return Err(ThriveError::Config(format!(
                        "bea measure '{id}' requires 'table' and 'line_code'"
                    )));
                }
            }
            SourceKind::Bls => {
                let pattern = measure.series_pattern.as_deref().ok_or_else(|| {
                    ThriveError::Config(format!(
                        "bls measure '{id}' is missing 'series_pattern'"
                    ))
                })?;
                if !pattern.contains("{fips}") {
                    return Err(ThriveError::Config(format!(
                        "bls measure '{id}': series_pattern has no {{fips}} placeholder"
                    )));
                }
            }
        }

        if measure.mode == AggregationMode::WeightedMean && measure.weight_variable.is_none() {
            return Err(ThriveError::Config(format!(
                "measure '{id}' uses weighted_mean but declares no 'weight_variable'"
            )));
        }

        Ok(())
    }

    /// Every configured county, in region order. Used for BLS series
    /// expansion and for the offline synthetic generator.
    pub fn county_roster(&self) -> Vec<County> {
        self.regions
            .iter()
            .flat_map(|r| r.counties.iter().cloned())
            .collect()
    }

    /// All configured region ids, in declaration order.
    pub fn region_ids(&self) -> Vec<String> {
        self.regions.iter().map(|r| r.id.clone()).collect()
    }

    /// The static measure → component mapping.
    pub fn component_map(&self) -> BTreeMap<String, String> {
        self.measures
            .iter()
            .map(|m| (m.id.clone(), m.component.clone()))
            .collect()
    }

    pub fn measure(&self, id: &str) -> Option<&MeasureSpec> {
        self.measures.iter().find(|m| m.id == id)
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Per-source API credentials resolved from the environment.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub census: Option<String>,
    pub bea: Option<String>,
    pub bls: Option<String>,
}

impl Credentials {
    /// Read `CENSUS_API_KEY` / `BEA_API_KEY` / `BLS_API_KEY`.
    ///
    /// Absence of a key logs a warning and leaves the field `None`; the
    /// corresponding requests go out unauthenticated.
    pub fn from_env() -> Self {
        Self {
            census: read_credential("CENSUS_API_KEY", "census"),
            bea: read_credential("BEA_API_KEY", "bea"),
            bls: read_credential("BLS_API_KEY", "bls"),
        }
    }

    pub fn for_source(&self, kind: SourceKind) -> Option<&str> {
        match kind {
            SourceKind::Census => self.census.as_deref(),
            SourceKind::Bea => self.bea.as_deref(),
            SourceKind::Bls => self.bls.as_deref(),
        }
    }
}

fn read_credential(var: &str, source: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => {
            tracing::warn!(
                source,
                env_var = var,
                "no API credential configured; requests will proceed unauthenticated"
            );
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
