//! Preprocessed per-county EV dataset loading and forecast seeding.

use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::features::LAG_COUNT;
use crate::forecast::{ForecastError, ForecastSeed};
use crate::reconcile::Observation;

pub const COUNTY_COLUMN: &str = "County";
pub const COUNTY_CODE_COLUMN: &str = "county_encoded";
pub const EV_TOTAL_COLUMN: &str = "Electric Vehicle (EV) Total";
pub const MONTHS_COLUMN: &str = "months_since_start";
pub const DATE_COLUMN: &str = "Date";

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%B %d %Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvRecord {
    pub county: String,
    pub county_encoded: i64,
    pub ev_total: f64,
    pub months_since_start: i64,
    pub date: NaiveDate,
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("dataset is missing required column '{0}'")]
    MissingColumn(&'static str),
    #[error("row {row}: failed to parse field {field} value '{value}'")]
    ParseField {
        row: usize,
        field: &'static str,
        value: String,
    },
    #[error("county '{0}' not found in dataset")]
    CountyNotFound(String),
    #[error("county '{county}' has {got} observations, need at least {needed}")]
    InsufficientHistory {
        county: String,
        needed: usize,
        got: usize,
    },
    #[error("invalid forecast seed: {0}")]
    Seed(#[from] ForecastError),
}

#[derive(Debug, Clone, Copy)]
struct ColumnIndex {
    county: usize,
    county_encoded: usize,
    ev_total: usize,
    months_since_start: usize,
    date: usize,
}

impl ColumnIndex {
    fn from_headers(headers: &StringRecord) -> Result<Self, DatasetError> {
        let find = |name: &'static str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or(DatasetError::MissingColumn(name))
        };

        Ok(Self {
            county: find(COUNTY_COLUMN)?,
            county_encoded: find(COUNTY_CODE_COLUMN)?,
            ev_total: find(EV_TOTAL_COLUMN)?,
            months_since_start: find(MONTHS_COLUMN)?,
            date: find(DATE_COLUMN)?,
        })
    }
}

/// Loaded dataset, owned by the caller and passed to each forecast run.
///
/// Records are kept sorted by county, then date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvDataset {
    records: Vec<EvRecord>,
}

impl EvDataset {
    pub fn from_records(mut records: Vec<EvRecord>) -> Self {
        records.sort_by(|a, b| a.county.cmp(&b.county).then(a.date.cmp(&b.date)));
        Self { records }
    }

    /// Parses CSV with a header row. Rows with a blank county are skipped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let columns = ColumnIndex::from_headers(reader.headers()?)?;

        let mut records = Vec::new();
        let mut skipped_rows = 0u64;
        for (idx, record) in reader.records().enumerate() {
            let record = record?;
            // header is line 1
            let row = idx + 2;
            match parse_ev_record(&record, &columns, row)? {
                Some(parsed) => records.push(parsed),
                None => skipped_rows += 1,
            }
        }

        if skipped_rows > 0 {
            debug!(
                component = "dataset",
                event = "dataset.load.rows_skipped",
                skipped_rows = skipped_rows,
                reason = "blank_county"
            );
        }

        Ok(Self::from_records(records))
    }

    pub fn records(&self) -> &[EvRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted unique county names.
    pub fn counties(&self) -> Vec<&str> {
        self.records
            .iter()
            .map(|r| r.county.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn county_series(&self, county: &str) -> Result<CountySeries<'_>, DatasetError> {
        let start = self.records.partition_point(|r| r.county.as_str() < county);
        let end = self.records.partition_point(|r| r.county.as_str() <= county);
        if start == end {
            return Err(DatasetError::CountyNotFound(county.to_string()));
        }

        Ok(CountySeries {
            county: &self.records[start].county,
            records: &self.records[start..end],
        })
    }
}

/// One county's records in ascending date order. Never empty.
#[derive(Debug, Clone, Copy)]
pub struct CountySeries<'a> {
    county: &'a str,
    records: &'a [EvRecord],
}

impl<'a> CountySeries<'a> {
    pub fn county(&self) -> &'a str {
        self.county
    }

    pub fn records(&self) -> &'a [EvRecord] {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Encoding of the county's first row.
    pub fn county_code(&self) -> i64 {
        self.records.first().map(|r| r.county_encoded).unwrap_or(0)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.records.iter().map(|r| r.date).max()
    }

    pub fn max_months_since_start(&self) -> Option<i64> {
        self.records.iter().map(|r| r.months_since_start).max()
    }

    pub fn observations(&self) -> Vec<Observation> {
        self.records
            .iter()
            .map(|r| Observation {
                date: r.date,
                count: r.ev_total,
            })
            .collect()
    }

    /// Seed from the last `window_len` totals; the cumulative window is the
    /// running sum of those totals only.
    pub fn forecast_seed(&self, window_len: usize) -> Result<ForecastSeed, DatasetError> {
        let (Some(last_date), Some(time_index)) = (self.last_date(), self.max_months_since_start())
        else {
            return Err(self.insufficient(LAG_COUNT));
        };
        if self.records.len() < LAG_COUNT {
            return Err(self.insufficient(LAG_COUNT));
        }

        let start = self.records.len().saturating_sub(window_len);
        let recent: Vec<f64> = self.records[start..].iter().map(|r| r.ev_total).collect();

        info!(
            component = "dataset",
            event = "dataset.seed.built",
            county = self.county,
            window_len = recent.len(),
            time_index = time_index,
            last_date = %last_date
        );

        Ok(ForecastSeed::from_recent(
            &recent,
            time_index,
            self.county_code(),
            last_date,
        )?)
    }

    fn insufficient(&self, needed: usize) -> DatasetError {
        DatasetError::InsufficientHistory {
            county: self.county.to_string(),
            needed,
            got: self.records.len(),
        }
    }
}

pub fn load_dataset(path: &Path) -> Result<EvDataset, DatasetError> {
    let file = fs::File::open(path)?;
    let dataset = EvDataset::from_reader(file)?;

    info!(
        component = "dataset",
        event = "dataset.load.finish",
        path = %path.display(),
        records = dataset.len(),
        counties = dataset.counties().len()
    );

    Ok(dataset)
}

fn parse_ev_record(
    record: &StringRecord,
    columns: &ColumnIndex,
    row: usize,
) -> Result<Option<EvRecord>, DatasetError> {
    let county = record.get(columns.county).unwrap_or_default().trim();
    if county.is_empty() {
        return Ok(None);
    }

    Ok(Some(EvRecord {
        county: county.to_string(),
        county_encoded: parse_integer(record, columns.county_encoded, row, COUNTY_CODE_COLUMN)?,
        ev_total: parse_f64(record, columns.ev_total, row, EV_TOTAL_COLUMN)?,
        months_since_start: parse_integer(record, columns.months_since_start, row, MONTHS_COLUMN)?,
        date: parse_date(record, columns.date, row)?,
    }))
}

fn field<'r>(record: &'r StringRecord, idx: usize) -> &'r str {
    record.get(idx).unwrap_or_default().trim()
}

fn parse_error(row: usize, field: &'static str, value: &str) -> DatasetError {
    DatasetError::ParseField {
        row,
        field,
        value: value.to_string(),
    }
}

fn parse_f64(
    record: &StringRecord,
    idx: usize,
    row: usize,
    name: &'static str,
) -> Result<f64, DatasetError> {
    let raw = field(record, idx);
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| parse_error(row, name, raw))
}

/// Accepts `12` as well as float-formatted integers such as `12.0`.
fn parse_integer(
    record: &StringRecord,
    idx: usize,
    row: usize,
    name: &'static str,
) -> Result<i64, DatasetError> {
    let raw = field(record, idx);
    if let Ok(value) = raw.parse::<i64>() {
        return Ok(value);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 => Ok(value as i64),
        _ => Err(parse_error(row, name, raw)),
    }
}

fn parse_date(record: &StringRecord, idx: usize, row: usize) -> Result<NaiveDate, DatasetError> {
    let raw = field(record, idx);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
        .ok_or_else(|| parse_error(row, DATE_COLUMN, raw))
}
