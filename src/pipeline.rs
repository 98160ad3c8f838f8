//! One-county forecast run: dataset lookup, recursive forecast, reconciliation.

use std::env;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::dataset::{DatasetError, EvDataset};
use crate::features::{LAG_COUNT, SLOPE_POINTS};
use crate::forecast::{forecast, ForecastError, ForecastPoint, Predictor};
use crate::reconcile::{reconcile, Reconciliation};

pub const DEFAULT_HORIZON_MONTHS: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastConfig {
    pub horizon: usize,
    pub window_len: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon: DEFAULT_HORIZON_MONTHS,
            window_len: SLOPE_POINTS,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid forecast config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Forecast(#[from] ForecastError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyForecast {
    pub county: String,
    pub county_code: i64,
    pub horizon: usize,
    pub points: Vec<ForecastPoint>,
    pub reconciliation: Reconciliation,
    pub narrative: String,
}

/// Reads `EVCAST_HORIZON` and `EVCAST_WINDOW_LEN`; unparsable or zero
/// values keep the defaults.
pub fn forecast_config_from_env() -> ForecastConfig {
    let mut config = ForecastConfig::default();

    if let Some(horizon) = env_usize("EVCAST_HORIZON") {
        config.horizon = horizon;
    }
    if let Some(window_len) = env_usize("EVCAST_WINDOW_LEN") {
        config.window_len = window_len;
    }

    config
}

pub fn validate_config(cfg: &ForecastConfig) -> Result<(), PipelineError> {
    if cfg.horizon == 0 {
        return Err(PipelineError::InvalidConfig(
            "horizon must be > 0".to_string(),
        ));
    }
    if cfg.window_len < LAG_COUNT {
        return Err(PipelineError::InvalidConfig(format!(
            "window_len must be >= {LAG_COUNT}"
        )));
    }
    Ok(())
}

pub fn run_county_forecast<P>(
    dataset: &EvDataset,
    county: &str,
    predictor: &P,
    cfg: &ForecastConfig,
) -> Result<CountyForecast, PipelineError>
where
    P: Predictor + ?Sized,
{
    validate_config(cfg)?;

    let series = dataset.county_series(county)?;
    let seed = series.forecast_seed(cfg.window_len)?;
    let run = forecast(&seed, cfg.horizon, predictor)?;
    let reconciliation = reconcile(&series.observations(), &run.points);
    let narrative = reconciliation.summary.narrative(series.county(), cfg.horizon);

    info!(
        component = "pipeline",
        event = "pipeline.county.finish",
        county = series.county(),
        county_code = series.county_code(),
        horizon = cfg.horizon,
        trajectory_points = reconciliation.trajectory.points.len()
    );

    Ok(CountyForecast {
        county: series.county().to_string(),
        county_code: series.county_code(),
        horizon: cfg.horizon,
        points: run.points,
        reconciliation,
        narrative,
    })
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
}
