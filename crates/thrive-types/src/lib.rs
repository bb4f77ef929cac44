//! Shared types and errors for the Thriving Index engine.
//!
//! This crate provides the foundational types used across all other Thrive crates:
//! - `ThriveError`: unified error taxonomy
//! - `RawObservation`: one county-level row as returned by an external source
//! - `MeasureRow` / `StandardizedRow` / `ComponentScore` / `AggregateScore`:
//!   the pipeline's output tables
//! - `SourceKind` / `GeoKeyStrategy` / `AggregationMode`: configuration enums

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Unified error type for all Thrive subsystems.
///
/// `Display`, `Error`, and the `From` conversions are written by hand because
/// several variants carry a plain-data field named `source` (the external
/// source's name), which `#[derive(thiserror::Error)]` would insist on
/// treating as the error's cause.
#[derive(Debug)]
pub enum ThriveError {
    // === Source Errors ===
    /// "Source {source} returned HTTP {status}: {message}"
    SourceError {
        source: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    /// "Rate limited by {source}, retry after {retry_after_ms}ms"
    RateLimited {
        source: String,
        retry_after_ms: u64,
    },

    /// "Authentication failed for source {source}"
    AuthError { source: String },

    /// "Retries exhausted for '{measure}' after {attempts} attempts: {cause}"
    RetriesExhausted {
        measure: String,
        attempts: usize,
        cause: String,
    },

    // === Pipeline Errors ===
    /// "Fetch failed for {n} measure(s): {comma-separated list}"
    FetchFailed { measures: Vec<String> },

    /// "Configuration error: {0}"
    Config(String),

    /// "Output validation failed: {0}"
    Validation(String),

    // === Generic ===
    /// "IO error: {0}"
    Io(std::io::Error),

    /// "JSON error: {0}"
    Json(serde_json::Error),

    /// "CSV error: {0}"
    Csv(csv::Error),

    /// "TOML error: {0}"
    Toml(toml::de::Error),

    /// "{0}"
    Other(String),
}

impl std::fmt::Display for ThriveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThriveError::SourceError {
                source,
                status,
                message,
                ..
            } => write!(f, "Source {source} returned HTTP {status}: {message}"),
            ThriveError::RateLimited {
                source,
                retry_after_ms,
            } => write!(f, "Rate limited by {source}, retry after {retry_after_ms}ms"),
            ThriveError::AuthError { source } => {
                write!(f, "Authentication failed for source {source}")
            }
            ThriveError::RetriesExhausted {
                measure,
                attempts,
                cause,
            } => write!(
                f,
                "Retries exhausted for '{measure}' after {attempts} attempts: {cause}"
            ),
            ThriveError::FetchFailed { measures } => write!(
                f,
                "Fetch failed for {} measure(s): {}",
                measures.len(),
                measures.join(", ")
            ),
            ThriveError::Config(msg) => write!(f, "Configuration error: {msg}"),
            ThriveError::Validation(msg) => write!(f, "Output validation failed: {msg}"),
            ThriveError::Io(err) => write!(f, "IO error: {err}"),
            ThriveError::Json(err) => write!(f, "JSON error: {err}"),
            ThriveError::Csv(err) => write!(f, "CSV error: {err}"),
            ThriveError::Toml(err) => write!(f, "TOML error: {err}"),
            ThriveError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ThriveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ThriveError::Io(err) => Some(err),
            ThriveError::Json(err) => Some(err),
            ThriveError::Csv(err) => Some(err),
            ThriveError::Toml(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ThriveError {
    fn from(err: std::io::Error) -> Self {
        ThriveError::Io(err)
    }
}

impl From<serde_json::Error> for ThriveError {
    fn from(err: serde_json::Error) -> Self {
        ThriveError::Json(err)
    }
}

impl From<csv::Error> for ThriveError {
    fn from(err: csv::Error) -> Self {
        ThriveError::Csv(err)
    }
}

impl From<toml::de::Error> for ThriveError {
    fn from(err: toml::de::Error) -> Self {
        ThriveError::Toml(err)
    }
}

impl ThriveError {
    /// Returns `true` if the error is transient and the call may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ThriveError::RateLimited { .. } | ThriveError::SourceError { retryable: true, .. }
        )
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ThriveError::AuthError { .. } | ThriveError::Config(_) | ThriveError::Validation(_)
        )
    }
}

/// A convenience alias for `Result<T, ThriveError>`.
pub type Result<T> = std::result::Result<T, ThriveError>;

// ---------------------------------------------------------------------------
// Configuration enums
// ---------------------------------------------------------------------------

/// External statistical source a measure is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Census,
    Bea,
    Bls,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Census => "census",
            SourceKind::Bea => "bea",
            SourceKind::Bls => "bls",
        }
    }
}

/// How a raw row's geography key joins to the region table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoKeyStrategy {
    /// Join on the 5-digit county FIPS code (zero-padded, no name cleaning).
    #[default]
    Fips,
    /// Join on the cleaned, uppercased county name.
    Name,
}

/// Reduction applied when rolling member counties up to a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Extensive measures: regional value = sum of member values.
    Sum,
    /// Intensive measures: unweighted arithmetic mean of member values.
    Mean,
    /// Intensive measures: Σ(value·weight) / Σ(weight) over members with both.
    WeightedMean,
}

// ---------------------------------------------------------------------------
// Raw value parsing
// ---------------------------------------------------------------------------

/// Values at or below this are ACS-style suppression sentinels, not data.
const SUPPRESSION_FLOOR: f64 = -200_000_000.0;

/// Parse a raw source cell into a numeric value.
///
/// Returns `None` for anything that is not usable data: empty strings,
/// `(NA)` / `null` / `-` placeholders, unparseable text, and the large
/// negative sentinel codes census tables use for suppressed cells.
/// Numeric strings may carry thousands separators.
pub fn parse_value(raw: &serde_json::Value) -> Option<f64> {
    let parsed = match raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || matches!(s, "(NA)" | "(D)" | "(L)" | "null" | "-" | "N/A") {
                return None;
            }
            s.replace(',', "").parse::<f64>().ok()
        }
        _ => None,
    };
    parsed.filter(|v| v.is_finite() && *v > SUPPRESSION_FLOOR)
}

// ---------------------------------------------------------------------------
// RawObservation: one county row from an external source
// ---------------------------------------------------------------------------

/// One county-level row as returned by a source, keyed by an unvalidated
/// geography string (FIPS code or county name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub geo_key: String,
    pub year: i32,
    /// Source variable name → raw cell (string or number).
    pub values: BTreeMap<String, serde_json::Value>,
}

impl RawObservation {
    pub fn new(geo_key: impl Into<String>, year: i32) -> Self {
        Self {
            geo_key: geo_key.into(),
            year,
            values: BTreeMap::new(),
        }
    }

    /// Insert a raw variable cell, builder-style.
    pub fn with_value(mut self, variable: impl Into<String>, raw: serde_json::Value) -> Self {
        self.values.insert(variable.into(), raw);
        self
    }

    /// Look up a variable and parse it as a numeric value.
    pub fn value_of(&self, variable: &str) -> Option<f64> {
        self.values.get(variable).and_then(parse_value)
    }

    /// Whether the row carries the named variable at all (parsed or not).
    pub fn has_variable(&self, variable: &str) -> bool {
        self.values.contains_key(variable)
    }
}

/// A county as declared in the region configuration: name and/or FIPS code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct County {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub fips: Option<String>,
}

impl County {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            fips: None,
        }
    }

    /// Attach a FIPS code, builder-style.
    pub fn with_fips(mut self, fips: impl Into<String>) -> Self {
        self.fips = Some(fips.into());
        self
    }
}

// ---------------------------------------------------------------------------
// MeasureRow: the atomic unit after aggregation
// ---------------------------------------------------------------------------

/// One aggregated value per (region, measure, year).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureRow {
    pub region_id: String,
    pub region_name: String,
    pub measure: String,
    pub year: i32,
    pub value: Option<f64>,
}

// ---------------------------------------------------------------------------
// StandardizedRow: MeasureRow plus peer-relative score
// ---------------------------------------------------------------------------

/// A measure row standardized against its peer group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizedRow {
    pub region_id: String,
    pub region_name: String,
    pub measure: String,
    pub year: i32,
    pub value: Option<f64>,
    pub z: Option<f64>,
    pub index_value: Option<f64>,
}

impl StandardizedRow {
    /// Attach a z-score to a measure row; `index_value = 100 + 100*z`.
    pub fn from_measure(row: &MeasureRow, z: Option<f64>) -> Self {
        Self {
            region_id: row.region_id.clone(),
            region_name: row.region_name.clone(),
            measure: row.measure.clone(),
            year: row.year,
            value: row.value,
            z,
            index_value: z.map(|z| 100.0 + 100.0 * z),
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentScore / AggregateScore: the composed index tables
// ---------------------------------------------------------------------------

/// Mean index value across a component's measures for one region/year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore {
    pub region_id: String,
    pub region_name: String,
    pub component: String,
    pub year: i32,
    pub component_index: f64,
}

/// The overall Thriving Index for one region/year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateScore {
    pub region_id: String,
    pub region_name: String,
    pub year: i32,
    pub thriving_index: f64,
}

// ---------------------------------------------------------------------------
// PeerAssignment: region to peer group
// ---------------------------------------------------------------------------

/// Membership of a region in a standardization peer group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAssignment {
    pub region_id: String,
    pub peer_group: String,
}

impl PeerAssignment {
    /// The default assignment: a region is its own peer group.
    pub fn identity(region_id: impl Into<String>) -> Self {
        let region_id = region_id.into();
        Self {
            peer_group: region_id.clone(),
            region_id,
        }
    }
}
