use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use evcast::{
    load_dataset, load_linear_model, run_county_forecast, DatasetError, ForecastConfig,
    GrowthOutcome, LinearModel, ModelError, PipelineError, PointSource, FEATURE_COUNT,
};
use tempfile::{tempdir, NamedTempFile};

const FIXTURE_PATH: &str = "tests/fixtures/ev_sample.csv";

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date expected")
}

/// lag1 + 10, written to disk in the model file format.
fn write_lag1_plus_ten_model(path: &Path) {
    let mut weights = [0.0; FEATURE_COUNT];
    weights[2] = 1.0;
    let file = LinearModel::new(10.0, weights).to_file();
    let body = serde_json::to_string_pretty(&file).expect("model file should serialize");
    fs::write(path, body).expect("model file should be written");
}

#[test]
fn fixture_loads_sorted_with_blank_counties_dropped() {
    let dataset = load_dataset(Path::new(FIXTURE_PATH)).expect("fixture load should succeed");

    assert_eq!(dataset.len(), 14);
    assert_eq!(dataset.counties(), vec!["Adams", "King", "Yakima"]);

    let king = dataset.county_series("King").expect("King is present");
    assert_eq!(king.len(), 8);
    assert_eq!(king.county_code(), 17);
    assert_eq!(king.last_date(), Some(date(2023, 8, 31)));
    assert_eq!(king.max_months_since_start(), Some(7));
    let totals: Vec<f64> = king.observations().iter().map(|o| o.count).collect();
    assert_eq!(
        totals,
        vec![100.0, 110.0, 120.0, 130.0, 140.0, 150.0, 160.0, 170.0]
    );
}

#[test]
fn missing_file_is_an_io_error() {
    let temp = tempdir().expect("temp dir should be created");
    let err = load_dataset(&temp.path().join("absent.csv")).expect_err("load should fail");
    assert!(matches!(err, DatasetError::Io(_)));
}

#[test]
fn csv_without_required_columns_is_rejected() {
    let mut file = NamedTempFile::new().expect("temp file should be created");
    writeln!(file, "Date,County,EV Total").expect("header should be written");
    writeln!(file, "2023-01-31,King,10").expect("row should be written");

    let err = load_dataset(file.path()).expect_err("load should fail");
    assert!(matches!(err, DatasetError::MissingColumn("county_encoded")));
}

#[test]
fn model_file_round_trips_through_disk() {
    let temp = tempdir().expect("temp dir should be created");
    let model_path = temp.path().join("model.json");
    write_lag1_plus_ten_model(&model_path);

    let model = load_linear_model(&model_path).expect("model should load");
    assert_eq!(model.intercept(), 10.0);
    assert_eq!(model.weights()[2], 1.0);

    fs::write(&model_path, "{ not json").expect("model file should be overwritten");
    assert!(matches!(
        load_linear_model(&model_path),
        Err(ModelError::Json(_))
    ));
}

#[test]
fn county_pipeline_end_to_end() {
    let temp = tempdir().expect("temp dir should be created");
    let model_path = temp.path().join("model.json");
    write_lag1_plus_ten_model(&model_path);

    let dataset = load_dataset(Path::new(FIXTURE_PATH)).expect("fixture load should succeed");
    let model = load_linear_model(&model_path).expect("model should load");
    let cfg = ForecastConfig {
        horizon: 3,
        window_len: 6,
    };

    let out = run_county_forecast(&dataset, "King", &model, &cfg).expect("pipeline succeeds");

    let dates: Vec<NaiveDate> = out.points.iter().map(|p| p.date).collect();
    assert_eq!(
        dates,
        vec![date(2023, 9, 30), date(2023, 10, 31), date(2023, 11, 30)]
    );
    let predicted: Vec<i64> = out.points.iter().map(|p| p.predicted).collect();
    assert_eq!(predicted, vec![180, 190, 200]);

    let trajectory = &out.reconciliation.trajectory;
    assert_eq!(trajectory.points.len(), 11);
    assert_eq!(trajectory.points[7].source, PointSource::Historical);
    assert_eq!(trajectory.points[8].source, PointSource::Forecast);
    assert_eq!(trajectory.points[7].cumulative, 1080.0);
    assert_eq!(trajectory.points[8].cumulative, 1260.0);
    assert_eq!(trajectory.points[10].cumulative, 1650.0);

    assert_eq!(
        out.narrative,
        "EV adoption in King is projected to increase by 52.78% in the next 3 months."
    );

    let json = serde_json::to_value(&out).expect("report should serialize");
    assert_eq!(json["points"][0]["date"], "2023-09-30");
    assert_eq!(json["reconciliation"]["summary"]["status"], "computed");
}

#[test]
fn zero_total_county_reports_undefined_growth() {
    let dataset = load_dataset(Path::new(FIXTURE_PATH)).expect("fixture load should succeed");
    let always_five = |_: &evcast::FeatureVector| -> Result<f64, evcast::PredictorError> { Ok(5.0) };

    let out = run_county_forecast(&dataset, "Adams", &always_five, &ForecastConfig::default())
        .expect("pipeline succeeds");

    assert_eq!(out.points.len(), 36);
    assert_eq!(
        out.reconciliation.summary,
        GrowthOutcome::Undefined {
            forecast_total: 180.0
        }
    );
    assert_eq!(
        out.narrative,
        "Historical EV total is zero, cannot compute forecast."
    );
}

#[test]
fn short_or_unknown_counties_fail_before_forecasting() {
    let dataset = load_dataset(Path::new(FIXTURE_PATH)).expect("fixture load should succeed");
    let never = |_: &evcast::FeatureVector| -> Result<f64, evcast::PredictorError> {
        panic!("predictor must not be called")
    };

    let err = run_county_forecast(&dataset, "Yakima", &never, &ForecastConfig::default())
        .expect_err("two observations are not enough");
    assert!(matches!(
        err,
        PipelineError::Dataset(DatasetError::InsufficientHistory { got: 2, .. })
    ));

    let err = run_county_forecast(&dataset, "Spokane", &never, &ForecastConfig::default())
        .expect_err("unknown county");
    assert!(matches!(
        err,
        PipelineError::Dataset(DatasetError::CountyNotFound(_))
    ));
}
