//! The adapter seam every statistical source implements.

use async_trait::async_trait;

use crate::SourceQuery;
use thrive_types::RawObservation;

// ---------------------------------------------------------------------------
// SourceAdapter
// ---------------------------------------------------------------------------

/// One upstream statistical API.
///
/// `fetch` performs a single attempt with no retry of its own; retry and
/// caching live in [`crate::SourceClient`]. Errors must carry an accurate
/// `is_retryable` classification since the retry loop keys off it.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self, query: &SourceQuery) -> thrive_types::Result<Vec<RawObservation>>;
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// DynSource
// ---------------------------------------------------------------------------

pub struct DynSource(Box<dyn SourceAdapter>);

impl DynSource {
    pub fn new(adapter: impl SourceAdapter + 'static) -> Self {
        Self(Box::new(adapter))
    }

    pub async fn fetch(&self, query: &SourceQuery) -> thrive_types::Result<Vec<RawObservation>> {
        self.0.fetch(query).await
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QueryDetail;
    use std::collections::HashMap;
    use thrive_types::{GeoKeyStrategy, SourceKind};

    struct MockSource;

    #[async_trait]
    impl SourceAdapter for MockSource {
        async fn fetch(
            &self,
            query: &SourceQuery,
        ) -> thrive_types::Result<Vec<RawObservation>> {
            Ok(vec![RawObservation::new("01001", query.year)
                .with_value("DataValue", serde_json::json!(42.0))])
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn make_query() -> SourceQuery {
        SourceQuery {
            measure: "income".into(),
            year: 2022,
            geo: GeoKeyStrategy::Fips,
            detail: QueryDetail::Bea {
                table: "CAINC1".into(),
                line_code: "3".into(),
            },
        }
    }

    #[tokio::test]
    async fn dyn_source_fetch() {
        let source = DynSource::new(MockSource);
        let rows = source.fetch(&make_query()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].geo_key, "01001");
        assert_eq!(rows[0].year, 2022);
    }

    #[test]
    fn dyn_source_metadata() {
        let source = DynSource::new(MockSource);
        assert_eq!(source.name(), "mock");
    }

    #[tokio::test]
    async fn dyn_source_in_hashmap() {
        let mut sources: HashMap<SourceKind, DynSource> = HashMap::new();
        sources.insert(SourceKind::Bea, DynSource::new(MockSource));

        let source = sources.get(&SourceKind::Bea).unwrap();
        let rows = source.fetch(&make_query()).await.unwrap();
        assert_eq!(rows[0].value_of("DataValue"), Some(42.0));
    }
}
