//! Output validation: check rules and diagnostics.
//!
//! Runs built-in rules over the assembled [`YearOutputs`] after artifacts
//! are written. Call [`validate`] for advisory diagnostics or
//! [`validate_or_raise`] to fail the run when any `Error`-severity issue
//! is present. Written files stay in place either way so a failed run can
//! be inspected.

use crate::artifacts::YearOutputs;

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub region_id: Option<String>,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

// ---------------------------------------------------------------------------
// CheckRule trait
// ---------------------------------------------------------------------------

pub trait CheckRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, outputs: &YearOutputs) -> Vec<Diagnostic>;
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct OverallIndexPresentRule;
impl CheckRule for OverallIndexPresentRule {
    fn name(&self) -> &str { "overall_index_present" }
    fn apply(&self, outputs: &YearOutputs) -> Vec<Diagnostic> {
        if outputs.aggregate.is_empty() {
            vec![Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: format!("Run for {} produced no overall index rows", outputs.year),
                region_id: None,
                fix: Some("Check that measures fetched rows and counties matched regions".into()),
            }]
        } else {
            vec![]
        }
    }
}

struct FiniteOverallIndexRule;
impl CheckRule for FiniteOverallIndexRule {
    fn name(&self) -> &str { "finite_overall_index" }
    fn apply(&self, outputs: &YearOutputs) -> Vec<Diagnostic> {
        outputs
            .aggregate
            .iter()
            .filter(|row| !row.thriving_index.is_finite())
            .map(|row| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: format!(
                    "Region '{}' has non-finite thriving_index {}",
                    row.region_id, row.thriving_index
                ),
                region_id: Some(row.region_id.clone()),
                fix: Some("Inspect the region's standardized inputs for bad values".into()),
            })
            .collect()
    }
}

struct FiniteComponentIndexRule;
impl CheckRule for FiniteComponentIndexRule {
    fn name(&self) -> &str { "finite_component_index" }
    fn apply(&self, outputs: &YearOutputs) -> Vec<Diagnostic> {
        outputs
            .components
            .iter()
            .filter(|row| !row.component_index.is_finite())
            .map(|row| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: format!(
                    "Region '{}' component '{}' has non-finite index {}",
                    row.region_id, row.component, row.component_index
                ),
                region_id: Some(row.region_id.clone()),
                fix: Some("Inspect the component's standardized inputs for bad values".into()),
            })
            .collect()
    }
}

struct RegionCoverageRule {
    expected: Vec<String>,
}
impl CheckRule for RegionCoverageRule {
    fn name(&self) -> &str { "region_coverage" }
    fn apply(&self, outputs: &YearOutputs) -> Vec<Diagnostic> {
        self.expected
            .iter()
            .filter(|id| !outputs.aggregate.iter().any(|row| &row.region_id == *id))
            .map(|id| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Warning,
                message: format!("Configured region '{id}' has no overall index row"),
                region_id: Some(id.clone()),
                fix: Some(format!("Confirm counties for '{id}' appear in the source data")),
            })
            .collect()
    }
}

struct StandardizedPresentRule;
impl CheckRule for StandardizedPresentRule {
    fn name(&self) -> &str { "standardized_present" }
    fn apply(&self, outputs: &YearOutputs) -> Vec<Diagnostic> {
        let scored = outputs
            .standardized
            .iter()
            .filter(|row| row.index_value.is_some())
            .count();
        if !outputs.standardized.is_empty() && scored == 0 {
            vec![Diagnostic {
                rule: self.name().into(),
                severity: Severity::Warning,
                message: "No standardized row carries an index value".into(),
                region_id: None,
                fix: Some("Check whether every aggregated value came back missing".into()),
            }]
        } else {
            vec![]
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all built-in check rules and return collected diagnostics.
///
/// `expected_regions` are the configured region ids; regions absent from
/// the overall index table are flagged as warnings.
pub fn validate(outputs: &YearOutputs, expected_regions: &[String]) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn CheckRule>> = vec![
        Box::new(OverallIndexPresentRule),
        Box::new(FiniteOverallIndexRule),
        Box::new(FiniteComponentIndexRule),
        Box::new(RegionCoverageRule { expected: expected_regions.to_vec() }),
        Box::new(StandardizedPresentRule),
    ];

    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(outputs));
    }
    diagnostics
}

/// Run all check rules; return `Err` if any `Error`-severity diagnostic found.
pub fn validate_or_raise(
    outputs: &YearOutputs,
    expected_regions: &[String],
) -> thrive_types::Result<Vec<Diagnostic>> {
    let diagnostics = validate(outputs, expected_regions);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    if !errors.is_empty() {
        let messages: Vec<_> = errors.iter().map(|d| d.message.clone()).collect();
        return Err(thrive_types::ThriveError::Validation(messages.join("; ")));
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
