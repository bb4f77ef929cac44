//! Census-style tabular API adapter.
//!
//! One GET per measure-year returns every county in the nation as a JSON
//! array of arrays whose first row is the column header. Rows are keyed by
//! the concatenated state+county FIPS code or by the NAME column, per the
//! query's geo strategy.

use async_trait::async_trait;

use crate::{QueryDetail, SourceAdapter, SourceQuery};
use thrive_types::{GeoKeyStrategy, RawObservation, ThriveError};

// ---------------------------------------------------------------------------
// CensusAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CensusAdapter {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl CensusAdapter {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: "https://api.census.gov".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }
}

// ---------------------------------------------------------------------------
// Request building
// ---------------------------------------------------------------------------

fn build_url(base_url: &str, query: &SourceQuery, api_key: Option<&str>) -> thrive_types::Result<String> {
    let QueryDetail::Census { dataset, variables } = &query.detail else {
        return Err(ThriveError::Config(format!(
            "measure '{}' routed to census without census parameters",
            query.measure
        )));
    };

    let mut url = format!(
        "{}/data/{}/{}?get=NAME,{}&for=county:*&in=state:*",
        base_url,
        query.year,
        dataset,
        variables.join(",")
    );
    if let Some(key) = api_key {
        url.push_str("&key=");
        url.push_str(key);
    }
    Ok(url)
}

// ---------------------------------------------------------------------------
// Response parsing (header-row table → RawObservation)
// ---------------------------------------------------------------------------

fn parse_rows(
    body: &serde_json::Value,
    query: &SourceQuery,
) -> thrive_types::Result<Vec<RawObservation>> {
    let QueryDetail::Census { variables, .. } = &query.detail else {
        return Err(ThriveError::Config(format!(
            "measure '{}' routed to census without census parameters",
            query.measure
        )));
    };

    let table = body.as_array().ok_or_else(|| ThriveError::SourceError {
        source: "census".into(),
        status: 200,
        message: "response is not a JSON array".into(),
        retryable: false,
    })?;
    let Some((header, data)) = table.split_first() else {
        return Ok(Vec::new());
    };

    let columns: Vec<&str> = header
        .as_array()
        .map(|cells| cells.iter().filter_map(|c| c.as_str()).collect())
        .unwrap_or_default();
    let column_index = |name: &str| columns.iter().position(|c| *c == name);

    // Geography columns are appended by the API; their absence means the
    // dataset cannot be joined to counties at all.
    let state_idx = column_index("state").ok_or_else(|| missing_column("state"))?;
    let county_idx = column_index("county").ok_or_else(|| missing_column("county"))?;
    let name_idx = column_index("NAME");

    let mut rows = Vec::with_capacity(data.len());
    for cells in data.iter().filter_map(|r| r.as_array()) {
        let geo_key = match query.geo {
            GeoKeyStrategy::Fips => {
                let state = cells.get(state_idx).and_then(|c| c.as_str()).unwrap_or("");
                let county = cells.get(county_idx).and_then(|c| c.as_str()).unwrap_or("");
                if state.is_empty() || county.is_empty() {
                    continue;
                }
                format!("{state:0>2}{county:0>3}")
            }
            GeoKeyStrategy::Name => {
                let Some(name) = name_idx
                    .and_then(|i| cells.get(i))
                    .and_then(|c| c.as_str())
                else {
                    continue;
                };
                name.to_string()
            }
        };

        let mut row = RawObservation::new(geo_key, query.year);
        for variable in variables {
            if let Some(cell) = column_index(variable).and_then(|i| cells.get(i)) {
                row = row.with_value(variable.clone(), cell.clone());
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

fn missing_column(name: &str) -> ThriveError {
    ThriveError::SourceError {
        source: "census".into(),
        status: 200,
        message: format!("response header has no '{name}' column"),
        retryable: false,
    }
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
                source: "census".into(),
                retry_after_ms: retry_ms,
            }
        }
        401 | 403 => ThriveError::AuthError {
            source: "census".into(),
        },
        s if (500..600).contains(&s) => ThriveError::SourceError {
            source: "census".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => ThriveError::SourceError {
            source: "census".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: false,
        },
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"].as_str().map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}

// ---------------------------------------------------------------------------
// SourceAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl SourceAdapter for CensusAdapter {
    async fn fetch(&self, query: &SourceQuery) -> thrive_types::Result<Vec<RawObservation>> {
        let url = build_url(&self.base_url, query, self.api_key.as_deref())?;

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ThriveError::SourceError {
                source: "census".into(),
                status: 0,
                message: e.to_string(),
                retryable: true,
            })?;

        let status = resp.status();
        let response_body = resp.text().await.map_err(|e| ThriveError::SourceError {
            source: "census".into(),
            status: 0,
            message: e.to_string(),
            retryable: true,
        })?;

        if !status.is_success() {
            return Err(map_error(status, &response_body));
        }

        let json: serde_json::Value =
            serde_json::from_str(&response_body).map_err(|e| ThriveError::SourceError {
                source: "census".into(),
                status: status.as_u16(),
                message: format!("Failed to parse response JSON: {e}"),
                retryable: false,
            })?;

        parse_rows(&json, query)
    }

    fn name(&self) -> &str {
        "census"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
