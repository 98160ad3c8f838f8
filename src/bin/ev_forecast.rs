use std::path::PathBuf;

use evcast::{
    forecast_config_from_env, init_logging, load_dataset, load_linear_model, log_app_start,
    log_inputs_selected, logging_config_from_env, run_county_forecast,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let dataset_path = std::env::var("EVCAST_DATASET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("preprocessed_ev_data.csv"));
    let model_path = std::env::var("EVCAST_MODEL")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("forecasting_ev_model.json"));
    let county = std::env::var("EVCAST_COUNTY")
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty());

    log_inputs_selected(&dataset_path, &model_path, county.as_deref());

    let dataset = load_dataset(&dataset_path)?;

    // No county selected: print the choices and stop.
    let Some(county) = county else {
        for name in dataset.counties() {
            println!("{name}");
        }
        return Ok(());
    };

    let model = load_linear_model(&model_path)?;
    let cfg = forecast_config_from_env();
    let result = run_county_forecast(&dataset, &county, &model, &cfg)?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
