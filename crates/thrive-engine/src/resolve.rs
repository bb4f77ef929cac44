//! County-to-region resolution.
//!
//! Source rows arrive keyed by raw county geography (FIPS string or county
//! name). The resolver owns the lookup tables built from the region config
//! and turns county values into region-keyed rows:
//!
//! - FIPS strategy: zero-pad to five digits, no name cleaning.
//! - Name strategy: uppercase, cut at the first comma, strip a trailing
//!   designator (County, Parish, Borough, Census Area, Municipality,
//!   City and Borough).
//!
//! Within one batch the first occurrence of a geo key wins; repeats are
//! dropped so a duplicated API row cannot double-count. Rows matching no
//! configured region are counted, not fatal.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::CountyValue;
use thrive_config::RegionSpec;
use thrive_types::{GeoKeyStrategy, ThriveError};

// ---------------------------------------------------------------------------
// Geo key normalization
// ---------------------------------------------------------------------------

/// Zero-pad a FIPS code to the five-digit county form.
pub fn pad_fips(raw: &str) -> String {
    format!("{:0>5}", raw.trim())
}

/// Canonical form of a county name for matching.
pub fn normalize_county_name(raw: &str) -> String {
    static SUFFIX: OnceLock<Regex> = OnceLock::new();
    let suffix = SUFFIX.get_or_init(|| {
        Regex::new(r"\s+(COUNTY|PARISH|BOROUGH|CENSUS AREA|MUNICIPALITY|CITY AND BOROUGH)$")
            .unwrap()
    });

    let upper = raw.to_uppercase();
    let before_comma = upper.split(',').next().unwrap_or("").trim();
    suffix.replace(before_comma, "").trim().to_string()
}

// ---------------------------------------------------------------------------
// RegionResolver
// ---------------------------------------------------------------------------

/// A region-keyed row ready for aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRow {
    pub region_id: String,
    pub region_name: String,
    pub value: Option<f64>,
    pub weight: Option<f64>,
}

/// The outcome of resolving one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub rows: Vec<ResolvedRow>,
    /// Rows whose geography matched no configured region.
    pub unmatched: usize,
}

#[derive(Debug)]
pub struct RegionResolver {
    by_fips: HashMap<String, (String, String)>,
    by_name: HashMap<String, (String, String)>,
}

impl RegionResolver {
    /// Build the lookup tables.
    ///
    /// A county claimed by two regions would silently double-count every
    /// measure, so collisions are a configuration error.
    pub fn new(regions: &[RegionSpec]) -> thrive_types::Result<Self> {
        let mut by_fips: HashMap<String, (String, String)> = HashMap::new();
        let mut by_name: HashMap<String, (String, String)> = HashMap::new();

        for region in regions {
            let target = (region.id.clone(), region.name.clone());
            for county in &region.counties {
                if let Some(fips) = &county.fips {
                    let key = pad_fips(fips);
                    if let Some((other, _)) = by_fips.get(&key) {
                        if *other != region.id {
                            return Err(ThriveError::Config(format!(
                                "county fips '{key}' is claimed by regions '{other}' and '{}'",
                                region.id
                            )));
                        }
                    }
                    by_fips.insert(key, target.clone());
                }
                if let Some(name) = &county.name {
                    let key = normalize_county_name(name);
                    if key.is_empty() {
                        continue;
                    }
                    if let Some((other, _)) = by_name.get(&key) {
                        if *other != region.id {
                            return Err(ThriveError::Config(format!(
                                "county name '{key}' is claimed by regions '{other}' and '{}'",
                                region.id
                            )));
                        }
                    }
                    by_name.insert(key, target.clone());
                }
            }
        }

        Ok(Self { by_fips, by_name })
    }

    /// Resolve one batch of county values under the given strategy.
    pub fn resolve(&self, counties: Vec<CountyValue>, strategy: GeoKeyStrategy) -> Resolution {
        let mut seen: HashSet<String> = HashSet::new();
        let mut rows = Vec::new();
        let mut unmatched = 0usize;

        for county in counties {
            let (key, target) = match strategy {
                GeoKeyStrategy::Fips => {
                    let key = pad_fips(&county.geo_key);
                    let target = self.by_fips.get(&key);
                    (key, target)
                }
                GeoKeyStrategy::Name => {
                    let key = normalize_county_name(&county.geo_key);
                    let target = self.by_name.get(&key);
                    (key, target)
                }
            };

            let Some((region_id, region_name)) = target else {
                unmatched += 1;
                continue;
            };
            if !seen.insert(key) {
                continue;
            }
            rows.push(ResolvedRow {
                region_id: region_id.clone(),
                region_name: region_name.clone(),
                value: county.value,
                weight: county.weight,
            });
        }

        Resolution { rows, unmatched }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use thrive_types::County;

    fn two_regions() -> Vec<RegionSpec> {
        vec![
            RegionSpec {
                id: "river".into(),
                name: "River Region".into(),
                counties: vec![
                    County::named("Autauga").with_fips("01001"),
                    County::named("Elmore").with_fips("01051"),
                ],
            },
            RegionSpec {
                id: "gulf".into(),
                name: "Gulf Coast".into(),
                counties: vec![County::named("Baldwin").with_fips("01003")],
            },
        ]
    }

    fn county(geo_key: &str, value: f64) -> CountyValue {
        CountyValue {
            geo_key: geo_key.into(),
            value: Some(value),
            weight: None,
        }
    }

    #[test]
    fn normalization_handles_census_style_names() {
        assert_eq!(normalize_county_name("Autauga County, Alabama"), "AUTAUGA");
        assert_eq!(normalize_county_name("St. Bernard Parish, Louisiana"), "ST. BERNARD");
        assert_eq!(
            normalize_county_name("Juneau City and Borough, Alaska"),
            "JUNEAU"
        );
        assert_eq!(
            normalize_county_name("Valdez-Cordova Census Area, Alaska"),
            "VALDEZ-CORDOVA"
        );
        assert_eq!(normalize_county_name("autauga"), "AUTAUGA");
        assert_eq!(normalize_county_name("  Elmore County  "), "ELMORE");
    }

    #[test]
    fn pad_fips_widens_to_five_digits() {
        assert_eq!(pad_fips("1001"), "01001");
        assert_eq!(pad_fips("01001"), "01001");
        assert_eq!(pad_fips(" 1001 "), "01001");
    }

    #[test]
    fn fips_strategy_matches_padded_keys() {
        let resolver = RegionResolver::new(&two_regions()).unwrap();
        let resolution = resolver.resolve(
            vec![county("01001", 10.0), county("1003", 20.0)],
            GeoKeyStrategy::Fips,
        );
        assert_eq!(resolution.unmatched, 0);
        assert_eq!(resolution.rows.len(), 2);
        assert_eq!(resolution.rows[0].region_id, "river");
        assert_eq!(resolution.rows[1].region_id, "gulf");
        assert_eq!(resolution.rows[1].value, Some(20.0));
    }

    #[test]
    fn name_strategy_matches_normalized_names() {
        let resolver = RegionResolver::new(&two_regions()).unwrap();
        let resolution = resolver.resolve(
            vec![county("Autauga County, Alabama", 1.0)],
            GeoKeyStrategy::Name,
        );
        assert_eq!(resolution.rows.len(), 1);
        assert_eq!(resolution.rows[0].region_id, "river");
        assert_eq!(resolution.rows[0].region_name, "River Region");
    }

    #[test]
    fn unmatched_rows_are_counted_not_fatal() {
        let resolver = RegionResolver::new(&two_regions()).unwrap();
        let resolution = resolver.resolve(
            vec![
                county("01001", 1.0),
                county("56045", 2.0),
                county("99999", 3.0),
            ],
            GeoKeyStrategy::Fips,
        );
        assert_eq!(resolution.rows.len(), 1);
        assert_eq!(resolution.unmatched, 2);
    }

    #[test]
    fn duplicate_geo_keys_keep_first_occurrence() {
        let resolver = RegionResolver::new(&two_regions()).unwrap();
        let resolution = resolver.resolve(
            vec![county("01001", 10.0), county("01001", 99.0)],
            GeoKeyStrategy::Fips,
        );
        assert_eq!(resolution.rows.len(), 1);
        assert_eq!(resolution.rows[0].value, Some(10.0));
        assert_eq!(resolution.unmatched, 0);
    }

    #[test]
    fn county_claimed_twice_is_config_error() {
        let mut regions = two_regions();
        regions[1]
            .counties
            .push(County::named("Autauga").with_fips("01001"));
        let err = RegionResolver::new(&regions).unwrap_err();
        assert!(matches!(err, ThriveError::Config(_)));
        assert!(err.to_string().contains("01001"));
    }

    #[test]
    fn same_name_in_two_regions_is_config_error() {
        let mut regions = two_regions();
        regions[1].counties.push(County::named("Autauga County"));
        let err = RegionResolver::new(&regions).unwrap_err();
        assert!(err.to_string().contains("AUTAUGA"));
    }

    #[test]
    fn missing_values_survive_resolution() {
        let resolver = RegionResolver::new(&two_regions()).unwrap();
        let resolution = resolver.resolve(
            vec![CountyValue {
                geo_key: "01001".into(),
                value: None,
                weight: Some(500.0),
            }],
            GeoKeyStrategy::Fips,
        );
        assert_eq!(resolution.rows[0].value, None);
        assert_eq!(resolution.rows[0].weight, Some(500.0));
    }
}
