//! Engine configuration
//!
//! Settings come from an optional file named by `FPE_CONFIG_FILE`, overlaid
//! by `FPE_*` environment variables. Nested keys use a double underscore,
//! e.g. `FPE_ANOMALY_THRESHOLDS__CPU_USAGE=85`.

use anyhow::{Context, Result};
use engine_lib::config::{
    AnomalyThresholds, DEFAULT_COMPONENTS, DEFAULT_CONFIDENCE_THRESHOLD,
    DEFAULT_PREDICTION_HORIZON_MINUTES, DEFAULT_RETRAIN_INTERVAL_HOURS, DEFAULT_WINDOW_SIZE,
};
use engine_lib::history::HistoryConfig;
use engine_lib::{EngineError, EngineOptions, ModelConfig, ModelKind};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "FPE";
pub const CONFIG_FILE_VAR: &str = "FPE_CONFIG_FILE";

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// Name attached to log events
    #[serde(default = "default_instance")]
    pub instance: String,

    /// Port for the HTTP API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Model kind name; legacy names such as `random_forest` are accepted
    #[serde(default = "default_model_type")]
    pub model_type: String,

    /// Per-component model kind overrides
    #[serde(default)]
    pub component_models: BTreeMap<String, String>,

    #[serde(default = "default_components")]
    pub components: Vec<String>,

    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default = "default_prediction_horizon")]
    pub prediction_horizon_minutes: u64,

    #[serde(default = "default_retrain_interval")]
    pub retrain_interval_hours: u64,

    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    #[serde(default)]
    pub anomaly_thresholds: AnomalyThresholds,

    #[serde(default = "default_prediction_interval")]
    pub prediction_interval_secs: u64,

    #[serde(default = "default_retrain_check_interval")]
    pub retrain_check_interval_secs: u64,

    #[serde(default = "default_alert_dedup_window")]
    pub alert_dedup_window_secs: u64,

    #[serde(default = "default_max_metric_samples")]
    pub max_metric_samples: usize,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "failure-engine".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_model_type() -> String {
    ModelKind::TreeEnsemble.to_string()
}

fn default_components() -> Vec<String> {
    DEFAULT_COMPONENTS.iter().map(|c| c.to_string()).collect()
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

fn default_prediction_horizon() -> u64 {
    DEFAULT_PREDICTION_HORIZON_MINUTES
}

fn default_retrain_interval() -> u64 {
    DEFAULT_RETRAIN_INTERVAL_HOURS
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_prediction_interval() -> u64 {
    300
}

fn default_retrain_check_interval() -> u64 {
    3600
}

fn default_alert_dedup_window() -> u64 {
    15 * 60
}

fn default_max_metric_samples() -> usize {
    engine_lib::history::MAX_METRIC_SAMPLES
}

/// Environment source with the engine's prefix and list handling
pub fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("components")
}

impl EngineSettings {
    /// Load from `FPE_CONFIG_FILE` (if set) and the process environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_VAR).ok();
        Self::from_sources(file.as_deref().map(Path::new), environment())
    }

    /// Load from an optional file overlaid by the given environment source
    pub fn from_sources(file: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings: EngineSettings = builder
            .add_source(env)
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        settings.engine_options()?;
        Ok(settings)
    }

    /// Validated model configuration
    pub fn model_config(&self) -> Result<ModelConfig, EngineError> {
        let component_models = self
            .component_models
            .iter()
            .map(|(component, kind)| Ok((component.clone(), kind.parse::<ModelKind>()?)))
            .collect::<Result<BTreeMap<_, _>, EngineError>>()?;

        let config = ModelConfig {
            model_type: self.model_type.parse()?,
            component_models,
            components: self
                .components
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            window_size: self.window_size,
            prediction_horizon_minutes: self.prediction_horizon_minutes,
            retrain_interval_hours: self.retrain_interval_hours,
            confidence_threshold: self.confidence_threshold,
            anomaly_thresholds: self.anomaly_thresholds.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Runtime options, checked against the model window
    pub fn engine_options(&self) -> Result<EngineOptions, EngineError> {
        let model = self.model_config()?;
        let options = EngineOptions {
            instance: self.instance.clone(),
            prediction_interval: Duration::from_secs(self.prediction_interval_secs.max(1)),
            retrain_check_interval: Duration::from_secs(self.retrain_check_interval_secs.max(1)),
            alert_dedup_window: Duration::from_secs(self.alert_dedup_window_secs),
            history: HistoryConfig {
                max_metrics: self.max_metric_samples,
                ..Default::default()
            },
        };
        options.history.validate_for_window(model.window_size)?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::from_sources(None, env(&[])).unwrap();
        assert_eq!(settings.api_port, 8080);
        assert_eq!(settings.window_size, 60);

        let model = settings.model_config().unwrap();
        assert_eq!(model.model_type, ModelKind::TreeEnsemble);
        assert_eq!(model.components.len(), 5);
        assert_eq!(model.confidence_threshold, 0.7);
    }

    #[test]
    fn test_environment_overrides() {
        let settings = EngineSettings::from_sources(
            None,
            env(&[
                ("FPE_API_PORT", "9191"),
                ("FPE_WINDOW_SIZE", "30"),
                ("FPE_CONFIDENCE_THRESHOLD", "0.6"),
                ("FPE_COMPONENTS", "system,network"),
                ("FPE_MODEL_TYPE", "xgboost"),
                ("FPE_ANOMALY_THRESHOLDS__CPU_USAGE", "85"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.api_port, 9191);
        let model = settings.model_config().unwrap();
        assert_eq!(model.window_size, 30);
        assert_eq!(model.confidence_threshold, 0.6);
        assert_eq!(model.components, vec!["system", "network"]);
        assert_eq!(model.model_type, ModelKind::GradientBoosted);
        assert_eq!(model.anomaly_thresholds.cpu_usage, 85.0);
        assert_eq!(model.anomaly_thresholds.memory_usage, 95.0);
    }

    #[test]
    fn test_file_layered_under_environment() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
window_size = 120
confidence_threshold = 0.8
components = ["fleet", "sensors"]

[component_models]
sensors = "isolation_forest"
"#
        )
        .unwrap();

        let settings =
            EngineSettings::from_sources(Some(file.path()), env(&[("FPE_WINDOW_SIZE", "90")]))
                .unwrap();
        let model = settings.model_config().unwrap();

        assert_eq!(model.window_size, 90);
        assert_eq!(model.confidence_threshold, 0.8);
        assert_eq!(model.model_for("sensors"), ModelKind::AnomalyScore);
        assert_eq!(model.model_for("fleet"), ModelKind::TreeEnsemble);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(
            EngineSettings::from_sources(None, env(&[("FPE_CONFIDENCE_THRESHOLD", "1.5")]))
                .is_err()
        );
        assert!(EngineSettings::from_sources(None, env(&[("FPE_WINDOW_SIZE", "1")])).is_err());
        assert!(EngineSettings::from_sources(None, env(&[("FPE_MODEL_TYPE", "svm")])).is_err());
    }

    #[test]
    fn test_window_must_fit_history_cap() {
        let err = EngineSettings::from_sources(None, env(&[("FPE_WINDOW_SIZE", "2000")]))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("exceeds max_metric_samples"));

        assert!(
            EngineSettings::from_sources(None, env(&[("FPE_MAX_METRIC_SAMPLES", "0")])).is_err()
        );
        // Room for the window but not for a training set
        assert!(EngineSettings::from_sources(
            None,
            env(&[("FPE_WINDOW_SIZE", "60"), ("FPE_MAX_METRIC_SAMPLES", "120")])
        )
        .is_err());
        assert!(EngineSettings::from_sources(
            None,
            env(&[("FPE_WINDOW_SIZE", "60"), ("FPE_MAX_METRIC_SAMPLES", "159")])
        )
        .is_ok());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let missing = Path::new("/nonexistent/fpe.toml");
        assert!(EngineSettings::from_sources(Some(missing), env(&[])).is_err());
    }

    #[test]
    fn test_engine_options() {
        let settings = EngineSettings::from_sources(
            None,
            env(&[("FPE_PREDICTION_INTERVAL_SECS", "60"), ("FPE_INSTANCE", "edge-7")]),
        )
        .unwrap();
        let options = settings.engine_options().unwrap();
        assert_eq!(options.prediction_interval, Duration::from_secs(60));
        assert_eq!(options.instance, "edge-7");
        assert_eq!(options.history.max_metrics, 1440);
    }
}
