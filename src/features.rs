//! Per-step feature derivation from the rolling raw and cumulative windows.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;
pub const FEATURE_COUNT: usize = 9;
pub const LAG_COUNT: usize = 3;
pub const SLOPE_POINTS: usize = 6;

pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "months_since_start",
    "county_encoded",
    "ev_total_lag1",
    "ev_total_lag2",
    "ev_total_lag3",
    "ev_total_roll_mean_3",
    "ev_total_pct_change_1",
    "ev_total_pct_change_3",
    "ev_growth_slope",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeatureError {
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    SchemaFingerprintMismatch { expected: String, actual: String },
}

/// Fixed-length FIFO of the most recent raw values, oldest first.
///
/// The length is set by the initial values and never changes: every
/// [`RollingWindow::slide`] evicts the oldest entry and appends the newest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingWindow {
    values: VecDeque<f64>,
}

impl RollingWindow {
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.values.back().copied()
    }

    /// `lag(1)` is the most recent value, `lag(2)` the one before it.
    pub fn lag(&self, k: usize) -> Option<f64> {
        if k == 0 || k > self.values.len() {
            return None;
        }
        self.values.get(self.values.len() - k).copied()
    }

    pub fn slide(&mut self, value: f64) {
        if self.values.is_empty() {
            return;
        }
        self.values.pop_front();
        self.values.push_back(value);
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }
}

/// Sliding window of running totals, kept in step with a [`RollingWindow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingCumulative {
    window: RollingWindow,
}

impl RollingCumulative {
    /// Running sums of `raw`, starting from zero.
    pub fn from_raw(raw: impl IntoIterator<Item = f64>) -> Self {
        let mut total = 0.0;
        Self::from_totals(raw.into_iter().map(|value| {
            total += value;
            total
        }))
    }

    pub fn from_totals(totals: impl IntoIterator<Item = f64>) -> Self {
        Self {
            window: RollingWindow::from_values(totals),
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.window.last()
    }

    /// Appends `last + increment` and evicts the oldest total.
    pub fn slide_by(&mut self, increment: f64) {
        let next = self.window.last().unwrap_or(0.0) + increment;
        self.window.slide(next);
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.window.iter()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.window.to_vec()
    }
}

/// Predictor input for one future step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub months_since_start: i64,
    pub county_encoded: i64,
    pub ev_total_lag1: f64,
    pub ev_total_lag2: f64,
    pub ev_total_lag3: f64,
    pub ev_total_roll_mean_3: f64,
    pub ev_total_pct_change_1: f64,
    pub ev_total_pct_change_3: f64,
    pub ev_growth_slope: f64,
}

impl FeatureVector {
    /// Values in [`FEATURE_COLUMNS`] order.
    pub fn values(&self) -> [f64; FEATURE_COUNT] {
        [
            self.months_since_start as f64,
            self.county_encoded as f64,
            self.ev_total_lag1,
            self.ev_total_lag2,
            self.ev_total_lag3,
            self.ev_total_roll_mean_3,
            self.ev_total_pct_change_1,
            self.ev_total_pct_change_3,
            self.ev_growth_slope,
        ]
    }

    pub fn is_finite(&self) -> bool {
        self.values().iter().all(|v| v.is_finite())
    }
}

/// Builds the feature vector for the step at `time_index`.
///
/// `window` must hold at least [`LAG_COUNT`] values; missing lags read as 0.
/// The slope is 0 unless `cumulative` holds at least [`SLOPE_POINTS`] totals.
pub fn derive_features(
    window: &RollingWindow,
    cumulative: &RollingCumulative,
    time_index: i64,
    county_id: i64,
) -> FeatureVector {
    debug_assert!(window.len() >= LAG_COUNT);

    let lag1 = window.lag(1).unwrap_or(0.0);
    let lag2 = window.lag(2).unwrap_or(0.0);
    let lag3 = window.lag(3).unwrap_or(0.0);

    FeatureVector {
        months_since_start: time_index,
        county_encoded: county_id,
        ev_total_lag1: lag1,
        ev_total_lag2: lag2,
        ev_total_lag3: lag3,
        ev_total_roll_mean_3: (lag1 + lag2 + lag3) / LAG_COUNT as f64,
        ev_total_pct_change_1: pct_change(lag1, lag2),
        ev_total_pct_change_3: pct_change(lag1, lag3),
        ev_growth_slope: trend_slope(&cumulative.to_vec()),
    }
}

/// Relative change from `base` to `current`; 0 when `base` is 0.
pub fn pct_change(current: f64, base: f64) -> f64 {
    if base == 0.0 {
        0.0
    } else {
        (current - base) / base
    }
}

/// Least-squares slope of the last [`SLOPE_POINTS`] values against `0..n`.
pub fn trend_slope(values: &[f64]) -> f64 {
    if values.len() < SLOPE_POINTS {
        return 0.0;
    }

    let tail = &values[values.len() - SLOPE_POINTS..];
    let n = tail.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = tail.iter().sum::<f64>() / n;

    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    for (i, y) in tail.iter().enumerate() {
        let dx = i as f64 - mean_x;
        ss_xy += dx * (y - mean_y);
        ss_xx += dx * dx;
    }

    ss_xy / ss_xx
}

pub fn build_feature_schema() -> FeatureSchema {
    let columns: Vec<String> = FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect();
    let fingerprint = schema_fingerprint(FEATURE_SCHEMA_VERSION, &columns);

    debug!(
        component = "features",
        event = "features.schema.built",
        version = FEATURE_SCHEMA_VERSION,
        column_count = columns.len(),
        fingerprint = fingerprint
    );

    FeatureSchema {
        version: FEATURE_SCHEMA_VERSION,
        fingerprint,
        columns,
    }
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeatureSchema,
) -> Result<(), FeatureError> {
    if expected_version != actual.version {
        return Err(FeatureError::SchemaVersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }

    if !expected_fingerprint.eq_ignore_ascii_case(&actual.fingerprint) {
        return Err(FeatureError::SchemaFingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }

    Ok(())
}

fn schema_fingerprint(version: u32, columns: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{version};"));
    hasher.update("columns:");
    for column in columns {
        hasher.update(column.as_bytes());
        hasher.update(":f64;");
    }
    hex::encode(hasher.finalize())
}
