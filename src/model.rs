//! Linear regression predictor loaded from a JSON model file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::features::{
    assert_schema_compatible, build_feature_schema, FeatureError, FeatureVector, FEATURE_COLUMNS,
    FEATURE_COUNT,
};
use crate::forecast::{Predictor, PredictorError};

/// On-disk model format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModelFile {
    pub schema_version: u32,
    pub feature_fingerprint: String,
    pub intercept: f64,
    pub coefficients: BTreeMap<String, f64>,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("model JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("model feature schema is incompatible: {0}")]
    Schema(#[from] FeatureError),
    #[error("model has no coefficient for feature '{0}'")]
    MissingCoefficient(String),
    #[error("model has a coefficient for unknown feature '{0}'")]
    UnknownFeature(String),
    #[error("model parameter '{0}' is not finite")]
    NonFiniteParameter(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    intercept: f64,
    weights: [f64; FEATURE_COUNT],
}

impl LinearModel {
    /// `weights` follow [`FEATURE_COLUMNS`] order.
    pub fn new(intercept: f64, weights: [f64; FEATURE_COUNT]) -> Self {
        Self { intercept, weights }
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn weights(&self) -> &[f64; FEATURE_COUNT] {
        &self.weights
    }

    pub fn from_file(file: &LinearModelFile) -> Result<Self, ModelError> {
        let schema = build_feature_schema();
        assert_schema_compatible(file.schema_version, &file.feature_fingerprint, &schema)?;

        if let Some(unknown) = file
            .coefficients
            .keys()
            .find(|name| !FEATURE_COLUMNS.contains(&name.as_str()))
        {
            return Err(ModelError::UnknownFeature(unknown.clone()));
        }

        let mut weights = [0.0; FEATURE_COUNT];
        for (slot, column) in weights.iter_mut().zip(FEATURE_COLUMNS) {
            let weight = *file
                .coefficients
                .get(column)
                .ok_or_else(|| ModelError::MissingCoefficient(column.to_string()))?;
            if !weight.is_finite() {
                return Err(ModelError::NonFiniteParameter(column.to_string()));
            }
            *slot = weight;
        }
        if !file.intercept.is_finite() {
            return Err(ModelError::NonFiniteParameter("intercept".to_string()));
        }

        Ok(Self::new(file.intercept, weights))
    }

    pub fn to_file(&self) -> LinearModelFile {
        let schema = build_feature_schema();
        LinearModelFile {
            schema_version: schema.version,
            feature_fingerprint: schema.fingerprint,
            intercept: self.intercept,
            coefficients: FEATURE_COLUMNS
                .iter()
                .zip(self.weights)
                .map(|(name, weight)| (name.to_string(), weight))
                .collect(),
        }
    }
}

impl Predictor for LinearModel {
    fn predict(&self, features: &FeatureVector) -> Result<f64, PredictorError> {
        let value = features
            .values()
            .iter()
            .zip(self.weights)
            .fold(self.intercept, |acc, (x, w)| acc + x * w);
        if value.is_finite() {
            Ok(value)
        } else {
            Err(PredictorError::new(format!(
                "linear model produced non-finite output {value}"
            )))
        }
    }
}

pub fn load_linear_model(path: &Path) -> Result<LinearModel, ModelError> {
    let raw = fs::read_to_string(path)?;
    let file: LinearModelFile = serde_json::from_str(&raw)?;
    let model = LinearModel::from_file(&file)?;

    info!(
        component = "model",
        event = "model.load.finish",
        path = %path.display(),
        schema_version = file.schema_version,
        fingerprint = %file.feature_fingerprint,
        intercept = model.intercept
    );

    Ok(model)
}
