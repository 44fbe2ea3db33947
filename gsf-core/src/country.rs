use crate::error::{DataLoadError, Result};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Embedded ISO-3166 registry: alpha_2, alpha_3, name, official_name, common_name.
pub static COUNTRIES_CSV: &str = include_str!("../../fixtures/countries.csv");

/// Embedded tz database `zone.tab` (country code, coordinates, zone, comment).
pub static ZONE_TAB: &str = include_str!("../../fixtures/zone.tab");

/// An ISO-3166 country.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Country {
    pub alpha_2: String,
    pub alpha_3: String,
    /// ISO short name, e.g. "Viet Nam"
    pub name: String,
    pub official_name: Option<String>,
    /// Everyday name where it differs from the ISO one, e.g. "Vietnam"
    pub common_name: Option<String>,
}

impl Country {
    /// Parse a CSV string of countries.
    ///
    /// Expected CSV columns: alpha_2, alpha_3, name, official_name, common_name
    pub fn parse_country_csv(csv_object: &str) -> Result<Vec<Country>> {
        let mut country_list: Vec<Country> = Vec::new();
        let mut rdr = ReaderBuilder::new()
            .delimiter(b',')
            .has_headers(true)
            .flexible(true)
            .from_reader(csv_object.as_bytes());
        for (line, row) in rdr.records().enumerate() {
            let record = row?;
            let required = |idx: usize, field: &str| -> Result<String> {
                match record.get(idx).map(str::trim) {
                    Some(value) if !value.is_empty() => Ok(value.to_string()),
                    _ => Err(DataLoadError::Malformed {
                        dataset: "country registry".to_string(),
                        reason: format!("row {} has no {}", line + 1, field),
                    }),
                }
            };
            let optional = |idx: usize| -> Option<String> {
                record
                    .get(idx)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
            };
            country_list.push(Country {
                alpha_2: required(0, "alpha_2")?,
                alpha_3: required(1, "alpha_3")?,
                name: required(2, "name")?,
                official_name: optional(3),
                common_name: optional(4),
            });
        }
        Ok(country_list)
    }

    /// Case-insensitive match against codes and every known name.
    fn matches(&self, query: &str) -> bool {
        [Some(&self.alpha_2), Some(&self.alpha_3), Some(&self.name)]
            .into_iter()
            .chain([self.official_name.as_ref(), self.common_name.as_ref()])
            .flatten()
            .any(|candidate| candidate.eq_ignore_ascii_case(query))
    }
}

/// Countries plus the tz zones each one uses, in `zone.tab` order.
#[derive(Debug, Clone, Default)]
pub struct CountryRegistry {
    countries: Vec<Country>,
    zones: HashMap<String, Vec<String>>,
}

impl CountryRegistry {
    pub fn new(countries: Vec<Country>, zone_tab: &str) -> Self {
        Self {
            countries,
            zones: parse_zone_tab(zone_tab),
        }
    }

    /// Registry built from the embedded fixtures.
    pub fn embedded() -> Result<Self> {
        Ok(Self::new(Country::parse_country_csv(COUNTRIES_CSV)?, ZONE_TAB))
    }

    /// Find a country by code or any of its names, ignoring case.
    pub fn lookup(&self, query: &str) -> Option<&Country> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        self.countries.iter().find(|c| c.matches(query))
    }

    pub fn by_alpha_3(&self, alpha_3: &str) -> Option<&Country> {
        self.countries
            .iter()
            .find(|c| c.alpha_3.eq_ignore_ascii_case(alpha_3))
    }

    /// Zones of a country in canonical order; empty when it has none.
    pub fn zones(&self, alpha_2: &str) -> &[String] {
        self.zones.get(alpha_2).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }
}

/// Group the zones of a `zone.tab` file by country code, keeping file order.
pub fn parse_zone_tab(zone_tab: &str) -> HashMap<String, Vec<String>> {
    let mut zones: HashMap<String, Vec<String>> = HashMap::new();
    for line in zone_tab.lines() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        if let (Some(code), Some(_coordinates), Some(zone)) = (fields.next(), fields.next(), fields.next()) {
            zones
                .entry(code.trim().to_string())
                .or_default()
                .push(zone.trim().to_string());
        }
    }
    zones
}
