use crate::error::{DataLoadError, Result};
use csv::{ReaderBuilder, StringRecord, Writer};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, io, path::Path};

/// Embedded capacities curated by hand for countries the Ember extract misses.
pub static MANUAL_CAPACITIES_CSV: &str = include_str!("../../fixtures/manual_capacities.csv");

/// Ember yearly electricity data, long format.
pub const EMBER_YEARLY_URL: &str =
    "https://storage.googleapis.com/emb-prod-bkt-publicdata/public-downloads/yearly_full_release_long_format.csv";

/// Column names of the capacity dataset, in the order they are written.
pub const CAPACITY_COLUMNS: [&str; 4] = ["country_code", "capacity_gw", "country_name", "source"];

const DATASET: &str = "capacity table";

/// Installed solar capacity of one country.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct CapacityRecord {
    /// ISO-3166 alpha-3 code
    pub country_code: String,
    pub country_name: String,
    /// Installed nameplate capacity in gigawatts
    pub capacity_gw: f64,
    /// Where the figure comes from (e.g. "Ember")
    pub source: String,
}

/// Capacity records keyed by alpha-3 code.
///
/// Iteration is in ascending code order. When a code is inserted twice the
/// later record replaces the earlier one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapacityTable {
    records: BTreeMap<String, CapacityRecord>,
}

impl CapacityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from records in declaration order; later duplicates win.
    pub fn from_records<I: IntoIterator<Item = CapacityRecord>>(records: I) -> Self {
        let mut table = Self::new();
        for record in records {
            table.insert(record);
        }
        table
    }

    /// Insert a record, returning the one it replaced.
    pub fn insert(&mut self, record: CapacityRecord) -> Option<CapacityRecord> {
        self.records.insert(record.country_code.clone(), record)
    }

    /// Load the capacity dataset from a CSV file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let csv_object = std::fs::read_to_string(path).map_err(|source| DataLoadError::Missing {
            path: path.display().to_string(),
            source,
        })?;
        let table = Self::from_csv_str(&csv_object)?;
        info!("Loaded {} capacity records from {}", table.len(), path.display());
        Ok(table)
    }

    /// The embedded hand-curated capacities.
    pub fn manual() -> Result<Self> {
        Self::from_csv_str(MANUAL_CAPACITIES_CSV)
    }

    /// Parse a CSV string of capacity data.
    ///
    /// Columns are located by header name: country_code, capacity_gw,
    /// country_name, source. Rows without a country code are skipped.
    pub fn from_csv_str(csv_object: &str) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(b',')
            .has_headers(true)
            .flexible(true)
            .from_reader(csv_object.as_bytes());
        let headers = rdr.headers()?.clone();
        let code_idx = column_index(&headers, "country_code")?;
        let capacity_idx = column_index(&headers, "capacity_gw")?;
        let name_idx = column_index(&headers, "country_name")?;
        let source_idx = column_index(&headers, "source")?;

        let mut table = Self::new();
        for (line, row) in rdr.records().enumerate() {
            let rho = row?;
            let country_code = rho.get(code_idx).unwrap_or_default().trim();
            if country_code.is_empty() {
                debug!("Skipping capacity row {} without a country code", line + 1);
                continue;
            }
            let capacity_gw = parse_capacity(rho.get(capacity_idx).unwrap_or_default(), line + 1)?;
            let record = CapacityRecord {
                country_code: country_code.to_string(),
                country_name: rho.get(name_idx).unwrap_or_default().trim().to_string(),
                capacity_gw,
                source: rho.get(source_idx).unwrap_or_default().trim().to_string(),
            };
            if let Some(previous) = table.insert(record) {
                debug!(
                    "Duplicate capacity for {}: {} GW replaced",
                    previous.country_code, previous.capacity_gw
                );
            }
        }
        Ok(table)
    }

    /// Extract solar capacity for `year` from the Ember long-format release.
    ///
    /// Keeps rows where Year is `year`, Category is "Capacity" and Variable
    /// is "Solar". Aggregate areas have no ISO 3 code and are dropped.
    pub fn from_ember_csv(csv_object: &str, year: i32) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(csv_object.as_bytes());
        let headers = rdr.headers()?.clone();
        let column = |name: &str| ember_column_index(&headers, name);
        let (year_idx, category_idx, variable_idx) = (column("Year")?, column("Category")?, column("Variable")?);
        let (code_idx, area_idx, value_idx) = (column("ISO 3 code")?, column("Area")?, column("Value")?);

        let mut table = Self::new();
        for (line, row) in rdr.records().enumerate() {
            let rho = row?;
            let field = |idx: usize| rho.get(idx).unwrap_or_default().trim();
            if field(year_idx).parse::<i32>().ok() != Some(year)
                || field(category_idx) != "Capacity"
                || field(variable_idx) != "Solar"
                || field(code_idx).is_empty()
            {
                continue;
            }
            table.insert(CapacityRecord {
                country_code: field(code_idx).to_string(),
                country_name: field(area_idx).to_string(),
                capacity_gw: parse_capacity(field(value_idx), line + 1)?,
                source: "Ember".to_string(),
            });
        }
        info!("Extracted {} Ember solar capacities for {}", table.len(), year);
        Ok(table)
    }

    /// Apply `other` on top of this table; its records replace ours.
    pub fn merge(&mut self, other: CapacityTable) {
        for (_, record) in other.records {
            self.insert(record);
        }
    }

    pub fn get(&self, country_code: &str) -> Option<&CapacityRecord> {
        self.records.get(country_code)
    }

    /// Capacity of a country, 0 when unknown.
    pub fn capacity_gw(&self, country_code: &str) -> f64 {
        self.get(country_code).map_or(0.0, |r| r.capacity_gw)
    }

    pub fn contains(&self, country_code: &str) -> bool {
        self.records.contains_key(country_code)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapacityRecord> {
        self.records.values()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Sum of installed capacity over every record, in GW.
    pub fn total_capacity(&self) -> f64 {
        self.records.values().map(|r| r.capacity_gw).sum()
    }

    /// "CODE - Name" labels for a country picker, in code order.
    pub fn selector_labels(&self) -> Vec<String> {
        self.records
            .values()
            .map(|r| format!("{} - {}", r.country_code, r.country_name))
            .collect()
    }

    /// Write the table in the dataset's own CSV format.
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut wtr = Writer::from_writer(writer);
        wtr.write_record(CAPACITY_COLUMNS)?;
        for r in self.records.values() {
            let capacity = r.capacity_gw.to_string();
            wtr.write_record([
                r.country_code.as_str(),
                capacity.as_str(),
                r.country_name.as_str(),
                r.source.as_str(),
            ])?;
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}

/// The code part of a "CODE - Name" selector label; a bare code passes through.
pub fn code_from_selector_label(label: &str) -> &str {
    label.split(" - ").next().unwrap_or(label).trim()
}

fn column_index(headers: &StringRecord, column: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(column))
        .ok_or_else(|| DataLoadError::MissingColumn {
            dataset: DATASET.to_string(),
            column: column.to_string(),
        })
}

fn ember_column_index(headers: &StringRecord, column: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| DataLoadError::MissingColumn {
            dataset: "Ember release".to_string(),
            column: column.to_string(),
        })
}

fn parse_capacity(ess: &str, line: usize) -> Result<f64> {
    let ess_lowered = ess.trim().to_lowercase();
    let value = match ess_lowered.as_str() {
        "" | "nan" | "null" | "n/a" | "na" => 0.0,
        s => s.parse::<f64>().map_err(|_| DataLoadError::Malformed {
            dataset: DATASET.to_string(),
            reason: format!("row {}: capacity '{}' is not a number", line, ess.trim()),
        })?,
    };
    if !value.is_finite() || value < 0.0 {
        return Err(DataLoadError::Malformed {
            dataset: DATASET.to_string(),
            reason: format!("row {}: capacity {} is out of range", line, value),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "country_code,capacity_gw,country_name,source\n";

    #[test]
    fn test_last_declared_duplicate_wins() {
        let csv_data = format!(
            "{}DEU,80.0,Germany,Ember\nFRA,20.0,France,Ember\nDEU,99.5,Germany,Manual\n",
            HEADER
        );
        let table = CapacityTable::from_csv_str(&csv_data).unwrap();
        assert_eq!(table.len(), 2);
        let deu = table.get("DEU").unwrap();
        assert_eq!(deu.capacity_gw, 99.5);
        assert_eq!(deu.source, "Manual");
    }

    #[test]
    fn test_columns_found_by_name() {
        let csv_data = "source,country_name,capacity_gw,country_code\nEmber,Spain,32.1,ESP\n";
        let table = CapacityTable::from_csv_str(csv_data).unwrap();
        assert_eq!(table.capacity_gw("ESP"), 32.1);
        assert_eq!(table.get("ESP").unwrap().country_name, "Spain");
    }

    #[test]
    fn test_missing_column_is_a_load_error() {
        let csv_data = "country_code,capacity_gw,country_name\nDEU,80.0,Germany\n";
        match CapacityTable::from_csv_str(csv_data) {
            Err(DataLoadError::MissingColumn { column, .. }) => assert_eq!(column, "source"),
            other => panic!("expected MissingColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_codes_skipped_and_blank_capacity_is_zero() {
        let csv_data = format!("{},5.0,World,Ember\nTKM,,Turkmenistan,x\n", HEADER);
        let table = CapacityTable::from_csv_str(&csv_data).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.capacity_gw("TKM"), 0.0);
    }

    #[test]
    fn test_bad_capacity_is_malformed() {
        let csv_data = format!("{}DEU,lots,Germany,Ember\n", HEADER);
        assert!(matches!(
            CapacityTable::from_csv_str(&csv_data),
            Err(DataLoadError::Malformed { .. })
        ));
        let negative = format!("{}DEU,-1,Germany,Ember\n", HEADER);
        assert!(CapacityTable::from_csv_str(&negative).is_err());
    }

    #[test]
    fn test_missing_file_is_a_load_error() {
        let result = CapacityTable::load("/definitely/not/here.csv");
        assert!(matches!(result, Err(DataLoadError::Missing { .. })));
    }

    #[test]
    fn test_total_capacity() {
        let csv_data = format!("{}AAA,2,A,x\nBBB,3,B,x\nCCC,5,C,x\n", HEADER);
        let table = CapacityTable::from_csv_str(&csv_data).unwrap();
        assert!((table.total_capacity() - 10.0).abs() < 1e-12);
        assert_eq!(table.codes().collect::<Vec<_>>(), vec!["AAA", "BBB", "CCC"]);
    }

    #[test]
    fn test_merge_overrides() {
        let mut base = CapacityTable::from_csv_str(&format!("{}UKR,0.5,Ukraine,Ember\nPOL,17,Poland,Ember\n", HEADER)).unwrap();
        let overrides = CapacityTable::from_csv_str(&format!("{}UKR,1.2,Ukraine,Wikipedia\n", HEADER)).unwrap();
        base.merge(overrides);
        assert_eq!(base.len(), 2);
        assert_eq!(base.capacity_gw("UKR"), 1.2);
        assert_eq!(base.get("UKR").unwrap().source, "Wikipedia");
    }

    #[test]
    fn test_manual_capacities_embedded() {
        let table = CapacityTable::manual().unwrap();
        assert_eq!(table.len(), 44);
        assert_eq!(table.capacity_gw("UZB"), 3.8);
        assert_eq!(table.capacity_gw("TKM"), 0.0);
    }

    #[test]
    fn test_ember_extract() {
        let csv_data = "\
Area,ISO 3 code,Year,Area type,Category,Subcategory,Variable,Unit,Value
Germany,DEU,2023,Country,Capacity,Fuel,Solar,GW,82.1
Germany,DEU,2024,Country,Capacity,Fuel,Solar,GW,99.3
Germany,DEU,2024,Country,Capacity,Fuel,Wind,GW,72.0
Germany,DEU,2024,Country,Electricity generation,Fuel,Solar,TWh,72.2
World,,2024,Region,Capacity,Fuel,Solar,GW,1865.0
Kenya,KEN,2024,Country,Capacity,Fuel,Solar,GW,
";
        let table = CapacityTable::from_ember_csv(csv_data, 2024).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.capacity_gw("DEU"), 99.3);
        assert_eq!(table.get("DEU").unwrap().source, "Ember");
        assert_eq!(table.capacity_gw("KEN"), 0.0);
        assert!(matches!(
            CapacityTable::from_ember_csv("Area,Year\nX,2024\n", 2024),
            Err(DataLoadError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_selector_labels_round_trip() {
        let table = CapacityTable::from_csv_str(&format!("{}USA,100,United States of America,Ember\n", HEADER)).unwrap();
        let labels = table.selector_labels();
        assert_eq!(labels, vec!["USA - United States of America".to_string()]);
        assert_eq!(code_from_selector_label(&labels[0]), "USA");
        assert_eq!(code_from_selector_label("FRA"), "FRA");
    }

    #[test]
    fn test_write_csv_reloads() {
        let table = CapacityTable::from_csv_str(&format!("{}CHL,11.5,Chile,Ember\n", HEADER)).unwrap();
        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("country_code,capacity_gw,country_name,source"));
        assert_eq!(CapacityTable::from_csv_str(&text).unwrap(), table);
    }
}
