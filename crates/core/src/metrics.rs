//! Model-quality document attached to registered model packages.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::DataError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: f64,
    pub standard_deviation: String,
}

/// `{"regression_metrics": {"rmse": {"value": .., "standard_deviation": "NaN"}}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelQualityReport {
    pub regression_metrics: BTreeMap<String, MetricValue>,
}

impl ModelQualityReport {
    /// Build the report from training-job final metrics such as `test:rmse`.
    ///
    /// Only `test:` metrics are kept; the prefix is stripped and
    /// `absolute_loss` is reported as `mae`.
    pub fn from_final_metrics<'a>(metrics: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        let regression_metrics = metrics
            .into_iter()
            .filter_map(|(name, value)| {
                let metric = name.strip_prefix("test:")?;
                let metric = match metric {
                    "absolute_loss" => "mae",
                    other => other,
                };
                Some((
                    metric.to_owned(),
                    MetricValue { value, standard_deviation: "NaN".to_owned() },
                ))
            })
            .collect();

        Self { regression_metrics }
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        self.regression_metrics.get(metric).map(|metric| metric.value)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "regression_metrics": self.regression_metrics })
    }

    pub fn write_to(&self, path: &Path) -> Result<(), DataError> {
        let payload = serde_json::to_vec_pretty(self)
            .map_err(|source| DataError::Json { path: path.to_path_buf(), source })?;
        fs::write(path, payload)
            .map_err(|source| DataError::WriteFile { path: path.to_path_buf(), source })
    }
}
