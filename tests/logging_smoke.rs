use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use evcast::{
    forecast, load_dataset, log_app_start, log_inputs_selected, reconcile, FeatureVector,
    ForecastSeed, LoggingConfig, Observation, PredictorError,
};
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

fn sample_seed() -> ForecastSeed {
    ForecastSeed::from_recent(
        &[100.0, 110.0, 120.0, 130.0, 140.0, 150.0],
        72,
        17,
        NaiveDate::from_ymd_opt(2024, 1, 31).expect("valid date"),
    )
    .expect("seed is valid")
}

#[test]
fn forecast_run_emits_start_and_finish_events() {
    let logs = capture_logs(Level::INFO, || {
        let predictor = |fv: &FeatureVector| -> Result<f64, PredictorError> {
            Ok(fv.ev_total_lag1 + 1.0)
        };
        let run = forecast(&sample_seed(), 3, &predictor).expect("forecast succeeds");
        assert_eq!(run.points.len(), 3);
    });

    assert!(logs.contains("\"event\":\"forecast.run.start\""));
    assert!(logs.contains("\"event\":\"forecast.run.finish\""));
    assert!(!logs.contains("\"event\":\"forecast.step\""));
}

#[test]
fn forecast_steps_are_logged_at_debug() {
    let logs = capture_logs(Level::DEBUG, || {
        let predictor = |_: &FeatureVector| -> Result<f64, PredictorError> { Ok(1.0) };
        forecast(&sample_seed(), 2, &predictor).expect("forecast succeeds");
    });

    assert_eq!(logs.matches("\"event\":\"forecast.step\"").count(), 2);
}

#[test]
fn predictor_failure_logs_aborted_run() {
    let logs = capture_logs(Level::INFO, || {
        let predictor =
            |_: &FeatureVector| -> Result<f64, PredictorError> { Err(PredictorError::new("boom")) };
        forecast(&sample_seed(), 5, &predictor).expect_err("predictor error should bubble up");
    });

    assert!(logs.contains("\"event\":\"forecast.run.aborted\""));
    assert!(logs.contains("\"reason\":\"predictor_error\""));
    assert!(!logs.contains("\"event\":\"forecast.run.finish\""));
}

#[test]
fn undefined_growth_emits_warning_event() {
    let logs = capture_logs(Level::INFO, || {
        let history = [Observation {
            date: NaiveDate::from_ymd_opt(2024, 1, 31).expect("valid date"),
            count: 0.0,
        }];
        reconcile(&history, &[]);
    });

    assert!(logs.contains("\"event\":\"reconcile.summary.undefined\""));
    assert!(logs.contains("\"level\":\"WARN\""));
}

#[test]
fn lifecycle_and_dataset_helpers_emit_baseline_events() {
    let logs = capture_logs(Level::INFO, || {
        let cfg = LoggingConfig::default();
        log_app_start(&cfg);
        log_inputs_selected(
            Path::new("tests/fixtures/ev_sample.csv"),
            Path::new("model.json"),
            None,
        );
        load_dataset(Path::new("tests/fixtures/ev_sample.csv")).expect("fixture loads");
    });

    assert!(logs.contains("\"event\":\"app.start\""));
    assert!(logs.contains("\"event\":\"inputs.selected\""));
    assert!(logs.contains("\"mode\":\"list_counties\""));
    assert!(logs.contains("\"event\":\"dataset.load.finish\""));
}
