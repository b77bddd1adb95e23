//! TOML configuration for the analyzer.
//!
//! A layered model: compiled-in defaults, an optional TOML file (explicit
//! path, `PERFANALYZER_CONFIG`, or `./perfanalyzer.toml`), then a handful of
//! environment overrides for the backend endpoints and credentials.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Environment variable naming a config file to load.
pub const CONFIG_ENV: &str = "PERFANALYZER_CONFIG";

/// Config file looked up in the working directory when nothing else is given.
pub const DEFAULT_CONFIG_FILE: &str = "perfanalyzer.toml";

/// Placeholder substituted with [`AnomalyQuery::threshold`] when rendering.
pub const THRESHOLD_PLACEHOLDER: &str = "{threshold}";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("at least one anomaly query must be configured")]
    NoQueries,
    #[error("duplicate anomaly query id '{0}'")]
    DuplicateQuery(String),
    #[error("anomaly query '{id}' has an empty {field}")]
    EmptyField { id: String, field: &'static str },
    #[error("invalid report cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },
    #[error("webhook delivery requires a url")]
    MissingWebhookUrl,
    #[error("file delivery requires a path")]
    MissingFilePath,
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the analyzer process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl AnalyzerConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded analyzer configuration");
        Ok(config)
    }

    /// Resolve the effective configuration.
    ///
    /// An explicit path must load; the env-var and working-directory
    /// candidates fall back to defaults with a warning. Environment overrides
    /// are applied last and the result is validated.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(&env_path);
            match Self::load(&path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "{} set but file could not be loaded, trying fallback",
                        CONFIG_ENV
                    );
                }
            }
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// Apply backend overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PROMETHEUS_URL") {
            self.metrics.base_url = url;
        }
        if let Some(key) = lookup("AI_API_KEY") {
            self.ai.api_key = key;
        }
        if let Some(url) = lookup("AI_BASE_URL") {
            self.ai.base_url = url;
        }
        if let Some(model) = lookup("AI_MODEL_NAME") {
            self.ai.model = model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metrics.timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("metrics.timeout_secs"));
        }
        if self.ai.timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("ai.timeout_secs"));
        }
        if self.detection.interval_secs == 0 {
            return Err(ConfigError::ZeroDuration("detection.interval_secs"));
        }
        if self.report.interval_secs == 0 {
            return Err(ConfigError::ZeroDuration("report.interval_secs"));
        }
        if self.report.timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("report.timeout_secs"));
        }

        if self.detection.queries.is_empty() {
            return Err(ConfigError::NoQueries);
        }
        let mut seen = HashSet::new();
        for q in &self.detection.queries {
            if q.id.trim().is_empty() {
                return Err(ConfigError::EmptyField {
                    id: q.id.clone(),
                    field: "id",
                });
            }
            if q.expr.trim().is_empty() {
                return Err(ConfigError::EmptyField {
                    id: q.id.clone(),
                    field: "expr",
                });
            }
            if q.category.trim().is_empty() {
                return Err(ConfigError::EmptyField {
                    id: q.id.clone(),
                    field: "category",
                });
            }
            if !seen.insert(q.id.as_str()) {
                return Err(ConfigError::DuplicateQuery(q.id.clone()));
            }
        }

        if let Some(expr) = &self.report.cron {
            cron::Schedule::from_str(expr).map_err(|e| ConfigError::InvalidCron {
                expr: expr.clone(),
                reason: e.to_string(),
            })?;
        }

        match &self.report.delivery {
            DeliveryConfig::Webhook { url } if url.trim().is_empty() => {
                Err(ConfigError::MissingWebhookUrl)
            }
            DeliveryConfig::File { path } if path.as_os_str().is_empty() => {
                Err(ConfigError::MissingFilePath)
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics backend
// ---------------------------------------------------------------------------

/// Prometheus-compatible metrics backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9090".to_string(),
            timeout_secs: 10,
        }
    }
}

impl MetricsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Completion backend
// ---------------------------------------------------------------------------

/// OpenAI-compatible chat completion backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    /// System persona sent with every generation request.
    pub persona: String,
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: String::new(),
            model: "llama-3.1-8b-instant".to_string(),
            persona: "You are an experienced performance engineer for HTTP services. \
                      You give short, actionable advice in 1-2 sentences."
                .to_string(),
            timeout_secs: 30,
        }
    }
}

impl AiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// One anomaly query evaluated on every detection tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyQuery {
    pub id: String,
    /// Classification tag carried onto every insight, e.g. `latency`.
    pub category: String,
    /// Query-language expression, optionally containing `{threshold}`.
    pub expr: String,
    #[serde(default)]
    pub threshold: f64,
}

impl AnomalyQuery {
    pub fn new(id: &str, category: &str, expr: &str, threshold: f64) -> Self {
        Self {
            id: id.to_string(),
            category: category.to_string(),
            expr: expr.to_string(),
            threshold,
        }
    }

    /// The expression sent to the backend, with the threshold substituted.
    pub fn render(&self) -> String {
        if self.expr.contains(THRESHOLD_PLACEHOLDER) {
            self.expr
                .replace(THRESHOLD_PLACEHOLDER, &self.threshold.to_string())
        } else {
            self.expr.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub interval_secs: u64,
    pub queries: Vec<AnomalyQuery>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            queries: default_queries(),
        }
    }
}

impl DetectionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Endpoints with p95 latency over the threshold, and endpoints with any
/// server errors, both over a one minute window.
pub fn default_queries() -> Vec<AnomalyQuery> {
    vec![
        AnomalyQuery::new(
            "p95-latency",
            "latency",
            "histogram_quantile(0.95, sum(rate(http_server_requests_seconds_bucket{application=\"performance-demo\"}[1m])) by (le, uri, method)) > {threshold}",
            0.1,
        ),
        AnomalyQuery::new(
            "server-errors",
            "error-rate",
            "sum(rate(http_server_requests_seconds_count{application=\"performance-demo\",outcome=\"SERVER_ERROR\"}[1m])) by (uri, method) > {threshold}",
            0.0,
        ),
    ]
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Fixed reporting period, used when `cron` is unset.
    pub interval_secs: u64,
    /// Cron expression (seconds field first) that takes precedence over
    /// `interval_secs`, e.g. `0 0 9 * * Mon`.
    pub cron: Option<String>,
    /// Upper bound on a single delivery attempt.
    pub timeout_secs: u64,
    pub delivery: DeliveryConfig,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            interval_secs: 120,
            cron: None,
            timeout_secs: 15,
            delivery: DeliveryConfig::Log,
        }
    }
}

impl ReportConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where finished reports are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryConfig {
    /// Write the report body to the log.
    #[default]
    Log,
    /// POST the report as JSON.
    Webhook { url: String },
    /// Append the report body to a file.
    File { path: PathBuf },
}

// ---------------------------------------------------------------------------
// Status API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8081".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AnalyzerConfig::default();
        assert_eq!(cfg.validate(), Ok(()));
        assert_eq!(cfg.detection.queries.len(), 2);
        assert_eq!(cfg.detection.interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_render_substitutes_threshold() {
        let q = AnomalyQuery::new("q", "latency", "foo{a=\"b\"} > {threshold}", 0.25);
        assert_eq!(q.render(), "foo{a=\"b\"} > 0.25");

        let verbatim = AnomalyQuery::new("q", "latency", "up == 0", 1.0);
        assert_eq!(verbatim.render(), "up == 0");
    }

    #[test]
    fn test_default_queries_render_thresholds() {
        let queries = default_queries();
        assert!(queries[0].render().ends_with("> 0.1"));
        assert!(queries[1].render().ends_with("> 0"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[detection]
interval_secs = 5

[[detection.queries]]
id = "slow"
category = "latency"
expr = "latency > {{threshold}}"
threshold = 0.5

[report]
cron = "0 */2 * * * *"

[report.delivery]
kind = "webhook"
url = "http://hooks.local/report"
"#
        )
        .unwrap();

        let cfg = AnalyzerConfig::load(file.path()).unwrap();
        assert_eq!(cfg.detection.interval_secs, 5);
        assert_eq!(cfg.detection.queries.len(), 1);
        assert_eq!(cfg.detection.queries[0].render(), "latency > 0.5");
        assert_eq!(cfg.metrics.base_url, "http://localhost:9090");
        assert_eq!(
            cfg.report.delivery,
            DeliveryConfig::Webhook {
                url: "http://hooks.local/report".to_string()
            }
        );
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = AnalyzerConfig::default();
        cfg.apply_env_overrides(|key| match key {
            "PROMETHEUS_URL" => Some("http://prom:9090".to_string()),
            "AI_API_KEY" => Some("sk-test".to_string()),
            "AI_MODEL_NAME" => Some("test-model".to_string()),
            _ => None,
        });
        assert_eq!(cfg.metrics.base_url, "http://prom:9090");
        assert_eq!(cfg.ai.api_key, "sk-test");
        assert_eq!(cfg.ai.model, "test-model");
        assert_eq!(cfg.ai.base_url, AiConfig::default().base_url);
    }

    #[test]
    fn test_rejects_duplicate_query_ids() {
        let mut cfg = AnalyzerConfig::default();
        cfg.detection.queries[1].id = cfg.detection.queries[0].id.clone();
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::DuplicateQuery("p95-latency".to_string()))
        );
    }

    #[test]
    fn test_rejects_empty_query_list_and_zero_interval() {
        let mut cfg = AnalyzerConfig::default();
        cfg.detection.queries.clear();
        assert_eq!(cfg.validate(), Err(ConfigError::NoQueries));

        let mut cfg = AnalyzerConfig::default();
        cfg.report.interval_secs = 0;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroDuration("report.interval_secs"))
        );
    }

    #[test]
    fn test_rejects_bad_cron() {
        let mut cfg = AnalyzerConfig::default();
        cfg.report.cron = Some("every tuesday".to_string());
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidCron { .. })
        ));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut cfg = AnalyzerConfig::default();
        cfg.ai.api_key = "sk-secret".to_string();
        let rendered = toml::to_string(&cfg).unwrap();
        assert!(!rendered.contains("sk-secret"));
    }
}
