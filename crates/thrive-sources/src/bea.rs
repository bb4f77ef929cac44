//! BEA-style regional economic accounts adapter.
//!
//! One GET per table/line-code/year returns county records under
//! `BEAAPI.Results.Data`. The API reports most failures inside an `Error`
//! node on an HTTP 200 response, so parsing checks for it before anything
//! else. Data values arrive as strings with thousands separators.

use async_trait::async_trait;

use crate::{QueryDetail, SourceAdapter, SourceQuery};
use thrive_types::{GeoKeyStrategy, RawObservation, ThriveError};

// ---------------------------------------------------------------------------
// BeaAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct BeaAdapter {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl BeaAdapter {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: "https://apps.bea.gov".to_string(),
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
    let QueryDetail::Bea { table, line_code } = &query.detail else {
        return Err(ThriveError::Config(format!(
            "measure '{}' routed to bea without bea parameters",
            query.measure
        )));
    };

    let mut url = format!(
        "{}/api/data?method=GetData&datasetname=Regional&TableName={}&LineCode={}&GeoFips=COUNTY&Year={}&ResultFormat=JSON",
        base_url, table, line_code, query.year
    );
    if let Some(key) = api_key {
        url.push_str("&UserID=");
        url.push_str(key);
    }
    Ok(url)
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

fn parse_rows(
    body: &serde_json::Value,
    query: &SourceQuery,
) -> thrive_types::Result<Vec<RawObservation>> {
    if let Some(error) = find_error_node(body) {
        return Err(ThriveError::SourceError {
            source: "bea".into(),
            status: 200,
            message: describe_error_node(error),
            retryable: false,
        });
    }

    // An absent Data node is how the API reports "no records", not a fault.
    let Some(records) = body["BEAAPI"]["Results"]["Data"].as_array() else {
        return Ok(Vec::new());
    };

    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let geo_key = match query.geo {
            GeoKeyStrategy::Fips => {
                let Some(fips) = record["GeoFips"].as_str() else {
                    continue;
                };
                format!("{:0>5}", fips.trim())
            }
            GeoKeyStrategy::Name => {
                let Some(name) = record["GeoName"].as_str() else {
                    continue;
                };
                name.to_string()
            }
        };
        rows.push(
            RawObservation::new(geo_key, query.year)
                .with_value("DataValue", record["DataValue"].clone()),
        );
    }
    Ok(rows)
}

fn find_error_node(body: &serde_json::Value) -> Option<&serde_json::Value> {
    [&body["BEAAPI"]["Results"]["Error"], &body["BEAAPI"]["Error"]]
        .into_iter()
        .find(|node| !node.is_null())
}

fn describe_error_node(error: &serde_json::Value) -> String {
    error["APIErrorDescription"]
        .as_str()
        .map(String::from)
        .unwrap_or_else(|| error.to_string())
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
                source: "bea".into(),
                retry_after_ms: retry_ms,
            }
        }
        401 | 403 => ThriveError::AuthError {
            source: "bea".into(),
        },
        s if (500..600).contains(&s) => ThriveError::SourceError {
            source: "bea".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => ThriveError::SourceError {
            source: "bea".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: false,
        },
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| find_error_node(&v).map(describe_error_node))
        .unwrap_or_else(|| body.trim().to_string())
}

// ---------------------------------------------------------------------------
// SourceAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl SourceAdapter for BeaAdapter {
    async fn fetch(&self, query: &SourceQuery) -> thrive_types::Result<Vec<RawObservation>> {
        let url = build_url(&self.base_url, query, self.api_key.as_deref())?;

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ThriveError::SourceError {
                source: "bea".into(),
                status: 0,
                message: e.to_string(),
                retryable: true,
            })?;

        let status = resp.status();
        let response_body = resp.text().await.map_err(|e| ThriveError::SourceError {
            source: "bea".into(),
            status: 0,
            message: e.to_string(),
            retryable: true,
        })?;

        if !status.is_success() {
            return Err(map_error(status, &response_body));
        }

        let json: serde_json::Value =
            serde_json::from_str(&response_body).map_err(|e| ThriveError::SourceError {
                source: "bea".into(),
                status: status.as_u16(),
                message: format!("Failed to parse response JSON: {e}"),
                retryable: false,
            })?;

        parse_rows(&json, query)
    }

    fn name(&self) -> &str {
        "bea"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
