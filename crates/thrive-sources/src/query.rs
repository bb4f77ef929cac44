//! Source-agnostic fetch requests.
//!
//! A [`SourceQuery`] captures everything an adapter needs to pull one
//! measure-year of county observations. Its [`cache_key`](SourceQuery::cache_key)
//! is the identity used for request coalescing and for seeding the offline
//! synthetic generator, so two queries that would hit the same upstream
//! endpoint with the same parameters must produce the same key.

use thrive_config::MeasureSpec;
use thrive_types::{GeoKeyStrategy, Result, SourceKind, ThriveError};

// ---------------------------------------------------------------------------
// SourceQuery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SourceQuery {
    /// Measure id, used for logging and retry-exhaustion reporting.
    pub measure: String,
    pub year: i32,
    /// How downstream resolution will key the returned observations.
    pub geo: GeoKeyStrategy,
    pub detail: QueryDetail,
}

/// The source-specific request parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryDetail {
    Census {
        dataset: String,
        variables: Vec<String>,
    },
    Bea {
        table: String,
        line_code: String,
    },
    Bls {
        series_pattern: String,
    },
}

impl SourceQuery {
    /// Build the query for one catalog entry.
    ///
    /// The catalog is validated at load time, so missing source fields here
    /// indicate a construction path that bypassed [`thrive_config::Config`].
    pub fn for_measure(measure: &MeasureSpec, year: i32) -> Result<Self> {
        let detail = match measure.source {
            SourceKind::Census => QueryDetail::Census {
                dataset: measure
                    .dataset
                    .clone()
                    .ok_or_else(|| missing_field(&measure.id, "dataset"))?,
                variables: measure.variables.clone(),
            },
            SourceKind::Bea => QueryDetail::Bea {
                table: measure
                    .table
                    .clone()
                    .ok_or_else(|| missing_field(&measure.id, "table"))?,
                line_code: measure
                    .line_code
                    .clone()
                    .ok_or_else(|| missing_field(&measure.id, "line_code"))?,
            },
            SourceKind::Bls => QueryDetail::Bls {
                series_pattern: measure
                    .series_pattern
                    .clone()
                    .ok_or_else(|| missing_field(&measure.id, "series_pattern"))?,
            },
        };
        Ok(Self {
            measure: measure.id.clone(),
            year,
            geo: measure.geo_key,
            detail,
        })
    }

    pub fn kind(&self) -> SourceKind {
        match self.detail {
            QueryDetail::Census { .. } => SourceKind::Census,
            QueryDetail::Bea { .. } => SourceKind::Bea,
            QueryDetail::Bls { .. } => SourceKind::Bls,
        }
    }

    /// Canonical request identity.
    ///
    /// Built from the upstream parameters, not the measure id, so two
    /// measures that request identical data share one upstream call.
    pub fn cache_key(&self) -> String {
        match &self.detail {
            QueryDetail::Census { dataset, variables } => {
                format!("census:{}:{}:{}", dataset, variables.join(","), self.year)
            }
            QueryDetail::Bea { table, line_code } => {
                format!("bea:{}:{}:{}", table, line_code, self.year)
            }
            QueryDetail::Bls { series_pattern } => {
                format!("bls:{}:{}", series_pattern, self.year)
            }
        }
    }
}

fn missing_field(measure: &str, field: &str) -> ThriveError {
    ThriveError::Config(format!("measure '{measure}' is missing '{field}'"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use thrive_types::AggregationMode;

    fn census_measure() -> MeasureSpec {
        MeasureSpec {
            id: "poverty_rate".into(),
            component: "economic_wellbeing".into(),
            source: SourceKind::Census,
            mode: AggregationMode::Mean,
            geo_key: GeoKeyStrategy::Fips,
            dataset: Some("acs/acs5/subject".into()),
            variables: vec!["S1701_C03_001E".into()],
            value_variable: Some("S1701_C03_001E".into()),
            weight_variable: None,
            table: None,
            line_code: None,
            series_pattern: None,
        }
    }

    #[test]
    fn census_query_from_measure() {
        let query = SourceQuery::for_measure(&census_measure(), 2022).unwrap();
        assert_eq!(query.kind(), SourceKind::Census);
        assert_eq!(query.measure, "poverty_rate");
        assert_eq!(query.year, 2022);
        assert_eq!(
            query.cache_key(),
            "census:acs/acs5/subject:S1701_C03_001E:2022"
        );
    }

    #[test]
    fn bea_query_cache_key() {
        let mut measure = census_measure();
        measure.id = "personal_income".into();
        measure.source = SourceKind::Bea;
        measure.table = Some("CAINC1".into());
        measure.line_code = Some("3".into());
        let query = SourceQuery::for_measure(&measure, 2021).unwrap();
        assert_eq!(query.kind(), SourceKind::Bea);
        assert_eq!(query.cache_key(), "bea:CAINC1:3:2021");
    }

    #[test]
    fn bls_query_cache_key() {
        let mut measure = census_measure();
        measure.id = "unemployment".into();
        measure.source = SourceKind::Bls;
        measure.series_pattern = Some("LAUCN{fips}0000000003".into());
        let query = SourceQuery::for_measure(&measure, 2020).unwrap();
        assert_eq!(query.kind(), SourceKind::Bls);
        assert_eq!(query.cache_key(), "bls:LAUCN{fips}0000000003:2020");
    }

    #[test]
    fn same_parameters_share_a_cache_key() {
        let mut a = census_measure();
        let mut b = census_measure();
        b.id = "poverty_rate_copy".into();
        a.geo_key = GeoKeyStrategy::Fips;
        b.geo_key = GeoKeyStrategy::Fips;

        let qa = SourceQuery::for_measure(&a, 2022).unwrap();
        let qb = SourceQuery::for_measure(&b, 2022).unwrap();
        assert_eq!(qa.cache_key(), qb.cache_key());
    }

    #[test]
    fn missing_source_field_is_config_error() {
        let mut measure = census_measure();
        measure.source = SourceKind::Bea;
        let err = SourceQuery::for_measure(&measure, 2022).unwrap_err();
        assert!(matches!(err, ThriveError::Config(_)));
        assert!(err.to_string().contains("table"));
    }
}
