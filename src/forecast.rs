//! Recursive multi-step forecasting over a rolling feature window.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::features::{
    derive_features, FeatureVector, RollingCumulative, RollingWindow, LAG_COUNT,
};

/// Anything that maps one feature vector to a single numeric prediction.
///
/// Closures of the form `Fn(&FeatureVector) -> Result<f64, PredictorError>`
/// implement this trait directly.
pub trait Predictor {
    fn predict(&self, features: &FeatureVector) -> Result<f64, PredictorError>;
}

impl<F> Predictor for F
where
    F: Fn(&FeatureVector) -> Result<f64, PredictorError>,
{
    fn predict(&self, features: &FeatureVector) -> Result<f64, PredictorError> {
        self(features)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PredictorError {
    pub message: String,
}

impl PredictorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("insufficient history: need at least {needed} observations, got {got}")]
    InsufficientHistory { needed: usize, got: usize },
    #[error("window length mismatch: raw window has {window} values, cumulative has {cumulative}")]
    WindowMismatch { window: usize, cumulative: usize },
    #[error("forecast date overflow: {last_date} + {months} months")]
    DateOverflow { last_date: NaiveDate, months: usize },
    #[error("predictor failed at step {step}: {source}")]
    Predictor {
        step: usize,
        #[source]
        source: PredictorError,
    },
    #[error("predictor returned non-finite value {value} at step {step}")]
    NonFinitePrediction { step: usize, value: f64 },
}

/// Starting state of one forecast run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeed {
    pub window: RollingWindow,
    pub cumulative: RollingCumulative,
    pub time_index: i64,
    pub county_id: i64,
    pub last_date: NaiveDate,
}

impl ForecastSeed {
    pub fn new(
        window: RollingWindow,
        cumulative: RollingCumulative,
        time_index: i64,
        county_id: i64,
        last_date: NaiveDate,
    ) -> Result<Self, ForecastError> {
        if window.len() < LAG_COUNT {
            return Err(ForecastError::InsufficientHistory {
                needed: LAG_COUNT,
                got: window.len(),
            });
        }
        if window.len() != cumulative.len() {
            return Err(ForecastError::WindowMismatch {
                window: window.len(),
                cumulative: cumulative.len(),
            });
        }

        Ok(Self {
            window,
            cumulative,
            time_index,
            county_id,
            last_date,
        })
    }

    /// Seed whose cumulative window is the running sum of `recent`.
    pub fn from_recent(
        recent: &[f64],
        time_index: i64,
        county_id: i64,
        last_date: NaiveDate,
    ) -> Result<Self, ForecastError> {
        Self::new(
            RollingWindow::from_values(recent.iter().copied()),
            RollingCumulative::from_raw(recent.iter().copied()),
            time_index,
            county_id,
            last_date,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub predicted: i64,
}

/// Output of [`forecast`]: the emitted points plus the state after the last step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRun {
    pub points: Vec<ForecastPoint>,
    pub raw_predictions: Vec<f64>,
    pub window: RollingWindow,
    pub cumulative: RollingCumulative,
    pub time_index: i64,
}

pub fn forecast<P>(
    seed: &ForecastSeed,
    horizon: usize,
    predictor: &P,
) -> Result<ForecastRun, ForecastError>
where
    P: Predictor + ?Sized,
{
    info!(
        component = "forecast",
        event = "forecast.run.start",
        county_id = seed.county_id,
        horizon = horizon,
        window_len = seed.window.len(),
        start_time_index = seed.time_index,
        last_date = %seed.last_date
    );

    let mut window = seed.window.clone();
    let mut cumulative = seed.cumulative.clone();
    let mut time_index = seed.time_index;
    let mut points = Vec::with_capacity(horizon);
    let mut raw_predictions = Vec::with_capacity(horizon);

    for step in 1..=horizon {
        let date = add_months(seed.last_date, step)?;
        time_index += 1;

        let features = derive_features(&window, &cumulative, time_index, seed.county_id);
        let prediction = match predictor.predict(&features) {
            Ok(value) if value.is_finite() => value,
            Ok(value) => {
                warn!(
                    component = "forecast",
                    event = "forecast.run.aborted",
                    county_id = seed.county_id,
                    step = step,
                    reason = "non_finite_prediction"
                );
                return Err(ForecastError::NonFinitePrediction { step, value });
            }
            Err(source) => {
                warn!(
                    component = "forecast",
                    event = "forecast.run.aborted",
                    county_id = seed.county_id,
                    step = step,
                    reason = "predictor_error",
                    error = %source
                );
                return Err(ForecastError::Predictor { step, source });
            }
        };

        let predicted = prediction.round_ties_even() as i64;
        debug!(
            component = "forecast",
            event = "forecast.step",
            step = step,
            date = %date,
            time_index = time_index,
            prediction = prediction,
            predicted = predicted,
            growth_slope = features.ev_growth_slope
        );

        points.push(ForecastPoint { date, predicted });
        raw_predictions.push(prediction);
        window.slide(prediction);
        cumulative.slide_by(prediction);
    }

    info!(
        component = "forecast",
        event = "forecast.run.finish",
        county_id = seed.county_id,
        points = points.len(),
        end_time_index = time_index
    );

    Ok(ForecastRun {
        points,
        raw_predictions,
        window,
        cumulative,
        time_index,
    })
}

/// `date` advanced by `months` calendar months, clamped to the month end.
pub fn add_months(date: NaiveDate, months: usize) -> Result<NaiveDate, ForecastError> {
    let overflow = || ForecastError::DateOverflow {
        last_date: date,
        months,
    };
    let months_u32 = u32::try_from(months).map_err(|_| overflow())?;
    date.checked_add_months(Months::new(months_u32))
        .ok_or_else(overflow)
}
