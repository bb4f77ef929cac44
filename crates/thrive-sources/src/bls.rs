//! BLS-style labor statistics time-series adapter.
//!
//! Unlike the tabular sources, the API takes an explicit list of series ids,
//! so the adapter expands the measure's series pattern over the configured
//! county roster and POSTs the ids in chunks. Each returned series is
//! annualized: the `M13` annual-average period wins when present, otherwise
//! the monthly observations for the year are averaged.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;

use crate::{QueryDetail, SourceAdapter, SourceQuery};
use thrive_types::{parse_value, County, GeoKeyStrategy, RawObservation, ThriveError};

/// Upstream cap on series ids per request.
const MAX_SERIES_PER_REQUEST: usize = 50;

// ---------------------------------------------------------------------------
// BlsAdapter
// ---------------------------------------------------------------------------

pub struct BlsAdapter {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    counties: Vec<County>,
}

impl BlsAdapter {
    pub fn new(client: reqwest::Client, api_key: Option<String>, counties: Vec<County>) -> Self {
        Self {
            client,
            api_key,
            base_url: "https://api.bls.gov".to_string(),
            counties,
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

// ---------------------------------------------------------------------------
// Series expansion
// ---------------------------------------------------------------------------

/// Expand the pattern over every roster county that has a FIPS code.
fn build_series_ids(pattern: &str, counties: &[County]) -> Vec<String> {
    counties
        .iter()
        .filter_map(|c| c.fips.as_ref())
        .map(|fips| pattern.replace("{fips}", &format!("{fips:0>5}")))
        .collect()
}

/// Recover the county FIPS from a series id by position of the `{fips}`
/// placeholder in the pattern.
fn fips_from_series_id(series_id: &str, pattern: &str) -> Option<String> {
    let prefix_len = pattern.find("{fips}")?;
    series_id.get(prefix_len..prefix_len + 5).map(String::from)
}

fn build_request_body(series_ids: &[String], year: i32, api_key: Option<&str>) -> serde_json::Value {
    let mut body = json!({
        "seriesid": series_ids,
        "startyear": year.to_string(),
        "endyear": year.to_string(),
    });
    if let Some(key) = api_key {
        body["registrationkey"] = json!(key);
    }
    body
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

fn parse_rows(
    body: &serde_json::Value,
    query: &SourceQuery,
    counties: &[County],
) -> thrive_types::Result<Vec<RawObservation>> {
    let QueryDetail::Bls { series_pattern } = &query.detail else {
        return Err(ThriveError::Config(format!(
            "measure '{}' routed to bls without bls parameters",
            query.measure
        )));
    };

    let status = body["status"].as_str().unwrap_or("");
    if status != "REQUEST_SUCCEEDED" {
        let messages: Vec<&str> = body["message"]
            .as_array()
            .map(|m| m.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();
        return Err(ThriveError::SourceError {
            source: "bls".into(),
            status: 200,
            message: format!("status {status}: {}", messages.join("; ")),
            retryable: false,
        });
    }

    let names_by_fips: HashMap<&str, &str> = counties
        .iter()
        .filter_map(|c| Some((c.fips.as_deref()?, c.name.as_deref()?)))
        .collect();

    let Some(series_list) = body["Results"]["series"].as_array() else {
        return Ok(Vec::new());
    };

    let mut rows = Vec::with_capacity(series_list.len());
    for series in series_list {
        let Some(series_id) = series["seriesID"].as_str() else {
            continue;
        };
        let Some(fips) = fips_from_series_id(series_id, series_pattern) else {
            continue;
        };
        let Some(value) = annual_value(&series["data"], query.year) else {
            continue;
        };

        let geo_key = match query.geo {
            GeoKeyStrategy::Fips => fips,
            GeoKeyStrategy::Name => {
                let Some(name) = names_by_fips.get(fips.as_str()) else {
                    continue;
                };
                name.to_string()
            }
        };
        rows.push(
            RawObservation::new(geo_key, query.year)
                .with_value("value", json!(value)),
        );
    }
    Ok(rows)
}

/// Annualize one series: prefer the `M13` annual average, else the mean of
/// the year's parseable monthly observations.
fn annual_value(data: &serde_json::Value, year: i32) -> Option<f64> {
    let entries = data.as_array()?;
    let year_str = year.to_string();
    let for_year: Vec<&serde_json::Value> = entries
        .iter()
        .filter(|e| e["year"].as_str() == Some(year_str.as_str()))
        .collect();

    if let Some(annual) = for_year
        .iter()
        .find(|e| e["period"].as_str() == Some("M13"))
        .and_then(|e| parse_value(&e["value"]))
    {
        return Some(annual);
    }

    let monthly: Vec<f64> = for_year
        .iter()
        .filter(|e| {
            matches!(e["period"].as_str(), Some(p) if p.starts_with('M') && p != "M13")
        })
        .filter_map(|e| parse_value(&e["value"]))
        .collect();
    if monthly.is_empty() {
        return None;
    }
    Some(monthly.iter().sum::<f64>() / monthly.len() as f64)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_error(status: reqwest::StatusCode, body: &str) -> ThriveError {
    let status_u16 = status.as_u16();
    match status_u16 {
        429 => {
            let retry_ms = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v["retry_after"].as_f64())
                .map(|s| (s * 1000.0) as u64)
                .unwrap_or(1000);
            ThriveError::RateLimited {
                source: "bls".into(),
                retry_after_ms: retry_ms,
            }
        }
        401 | 403 => ThriveError::AuthError {
            source: "bls".into(),
        },
        s if (500..600).contains(&s) => ThriveError::SourceError {
            source: "bls".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => ThriveError::SourceError {
            source: "bls".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: false,
        },
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v["message"]
                .as_array()
                .map(|m| m.iter().filter_map(|s| s.as_str()).collect::<Vec<_>>().join("; "))
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string())
}

// ---------------------------------------------------------------------------
// SourceAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl SourceAdapter for BlsAdapter {
    async fn fetch(&self, query: &SourceQuery) -> thrive_types::Result<Vec<RawObservation>> {
        let QueryDetail::Bls { series_pattern } = &query.detail else {
            return Err(ThriveError::Config(format!(
                "measure '{}' routed to bls without bls parameters",
                query.measure
            )));
        };

        let series_ids = build_series_ids(series_pattern, &self.counties);
        if series_ids.is_empty() {
            tracing::warn!(
                measure = %query.measure,
                "no roster county has a FIPS code, nothing to request"
            );
            return Ok(Vec::new());
        }

        let mut rows = Vec::new();
        for chunk in series_ids.chunks(MAX_SERIES_PER_REQUEST) {
            let body = build_request_body(chunk, query.year, self.api_key.as_deref());

            let resp = self
                .client
                .post(format!("{}/publicAPI/v2/timeseries/data/", self.base_url))
                .json(&body)
                .send()
                .await
                .map_err(|e| ThriveError::SourceError {
                    source: "bls".into(),
                    status: 0,
                    message: e.to_string(),
                    retryable: true,
                })?;

            let status = resp.status();
            let response_body = resp.text().await.map_err(|e| ThriveError::SourceError {
                source: "bls".into(),
                status: 0,
                message: e.to_string(),
                retryable: true,
            })?;

            if !status.is_success() {
                return Err(map_error(status, &response_body));
            }

            let json: serde_json::Value =
                serde_json::from_str(&response_body).map_err(|e| ThriveError::SourceError {
                    source: "bls".into(),
                    status: status.as_u16(),
                    message: format!("Failed to parse response JSON: {e}"),
                    retryable: false,
                })?;

            rows.extend(parse_rows(&json, query, &self.counties)?);
        }
        Ok(rows)
    }

    fn name(&self) -> &str {
        "bls"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const PATTERN: &str = "LAUCN{fips}0000000003";

    fn roster() -> Vec<County> {
        vec![
            County::named("Autauga").with_fips("01001"),
            County::named("Baldwin").with_fips("01003"),
        ]
    }

    fn make_query() -> SourceQuery {
        SourceQuery {
            measure: "unemployment_rate".into(),
            year: 2022,
            geo: GeoKeyStrategy::Fips,
            detail: QueryDetail::Bls {
                series_pattern: PATTERN.into(),
            },
        }
    }

    fn canned_response() -> serde_json::Value {
        json!({
            "status": "REQUEST_SUCCEEDED",
            "message": [],
            "Results": {
                "series": [
                    {
                        "seriesID": "LAUCN010010000000003",
                        "data": [
                            {"year": "2022", "period": "M13", "periodName": "Annual", "value": "2.6"},
                            {"year": "2022", "period": "M12", "periodName": "December", "value": "2.2"}
                        ]
                    },
                    {
                        "seriesID": "LAUCN010030000000003",
                        "data": [
                            {"year": "2022", "period": "M01", "periodName": "January", "value": "3.0"},
                            {"year": "2022", "period": "M02", "periodName": "February", "value": "4.0"},
                            {"year": "2021", "period": "M13", "periodName": "Annual", "value": "9.9"}
                        ]
                    }
                ]
            }
        })
    }

    #[test]
    fn series_ids_expand_over_roster() {
        let ids = build_series_ids(PATTERN, &roster());
        assert_eq!(
            ids,
            vec!["LAUCN010010000000003", "LAUCN010030000000003"]
        );
    }

    #[test]
    fn series_ids_skip_counties_without_fips() {
        let mut counties = roster();
        counties.push(County::named("Nameless"));
        assert_eq!(build_series_ids(PATTERN, &counties).len(), 2);
    }

    #[test]
    fn fips_recovered_from_series_id() {
        assert_eq!(
            fips_from_series_id("LAUCN010010000000003", PATTERN),
            Some("01001".to_string())
        );
        assert_eq!(fips_from_series_id("LAU", PATTERN), None);
    }

    #[test]
    fn request_body_carries_year_and_key() {
        let ids = build_series_ids(PATTERN, &roster());
        let body = build_request_body(&ids, 2022, Some("reg-key"));
        assert_eq!(body["startyear"], "2022");
        assert_eq!(body["endyear"], "2022");
        assert_eq!(body["registrationkey"], "reg-key");
        assert_eq!(body["seriesid"].as_array().unwrap().len(), 2);

        let anonymous = build_request_body(&ids, 2022, None);
        assert!(anonymous.get("registrationkey").is_none());
    }

    #[test]
    fn annual_period_wins_over_monthly() {
        let rows = parse_rows(&canned_response(), &make_query(), &roster()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].geo_key, "01001");
        assert_eq!(rows[0].value_of("value"), Some(2.6));
    }

    #[test]
    fn monthly_mean_when_no_annual_period() {
        let rows = parse_rows(&canned_response(), &make_query(), &roster()).unwrap();
        assert_eq!(rows[1].geo_key, "01003");
        assert_eq!(rows[1].value_of("value"), Some(3.5));
    }

    #[test]
    fn other_years_are_ignored() {
        let data = json!([
            {"year": "2021", "period": "M13", "value": "9.9"}
        ]);
        assert_eq!(annual_value(&data, 2022), None);
    }

    #[test]
    fn unparseable_values_are_skipped() {
        let data = json!([
            {"year": "2022", "period": "M01", "value": "-"},
            {"year": "2022", "period": "M02", "value": "4.0"}
        ]);
        assert_eq!(annual_value(&data, 2022), Some(4.0));
    }

    #[test]
    fn name_strategy_maps_fips_back_to_county_name() {
        let mut query = make_query();
        query.geo = GeoKeyStrategy::Name;
        let rows = parse_rows(&canned_response(), &query, &roster()).unwrap();
        assert_eq!(rows[0].geo_key, "Autauga");
    }

    #[test]
    fn failed_status_is_fatal() {
        let body = json!({
            "status": "REQUEST_NOT_PROCESSED",
            "message": ["Series does not exist"]
        });
        let err = parse_rows(&body, &make_query(), &roster()).unwrap_err();
        match &err {
            ThriveError::SourceError { retryable, message, .. } => {
                assert!(!retryable);
                assert!(message.contains("Series does not exist"));
            }
            other => panic!("expected SourceError, got {other:?}"),
        }
    }

    #[test]
    fn error_mapping_503_retryable() {
        let err = map_error(reqwest::StatusCode::SERVICE_UNAVAILABLE, "down");
        assert!(err.is_retryable());
    }
}
