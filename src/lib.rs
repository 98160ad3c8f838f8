//! County-level EV registration forecasting.
//!
//! - feature derivation over rolling raw and cumulative windows
//! - recursive multi-step forecasting with an injected predictor
//! - historical/forecast trajectory reconciliation and growth summary
//! - preprocessed dataset loading and a JSON linear-model predictor

mod dataset;
mod features;
mod forecast;
mod model;
mod observability;
mod pipeline;
mod reconcile;

pub use dataset::{
    load_dataset, CountySeries, DatasetError, EvDataset, EvRecord, COUNTY_CODE_COLUMN,
    COUNTY_COLUMN, DATE_COLUMN, EV_TOTAL_COLUMN, MONTHS_COLUMN,
};
pub use features::{
    assert_schema_compatible, build_feature_schema, derive_features, pct_change, trend_slope,
    FeatureError, FeatureSchema, FeatureVector, RollingCumulative, RollingWindow, FEATURE_COLUMNS,
    FEATURE_COUNT, FEATURE_SCHEMA_VERSION, LAG_COUNT, SLOPE_POINTS,
};
pub use forecast::{
    add_months, forecast, ForecastError, ForecastPoint, ForecastRun, ForecastSeed, Predictor,
    PredictorError,
};
pub use model::{load_linear_model, LinearModel, LinearModelFile, ModelError};
pub use observability::{
    init_logging, log_app_start, log_inputs_selected, logging_config_from_env, LogFormat,
    LoggingConfig, LoggingInitError,
};
pub use pipeline::{
    forecast_config_from_env, run_county_forecast, validate_config, CountyForecast,
    ForecastConfig, PipelineError, DEFAULT_HORIZON_MONTHS,
};
pub use reconcile::{
    reconcile, summarize_growth, GrowthOutcome, GrowthSummary, Observation, PointSource,
    Reconciliation, Trajectory, TrajectoryPoint, Trend,
};
