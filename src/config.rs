use crate::labels::{LabelAliases, LabelError, LabelSpec};
use crate::registry::RegistryError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Environment variable naming a YAML file to load when no inline
/// configuration is given
pub const CONFIG_FILE_ENV: &str = "LOG_METRICS_CONFIG_FILE";

pub const DEFAULT_PORT: u16 = 9091;
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

static METRIC_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").expect("valid metric name regex"));
static LABEL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid label name regex"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse metric configuration from {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("No metric configuration given and LOG_METRICS_CONFIG_FILE is not set")]
    Missing,
    #[error("Metric type '{kind}' of metric '{metric}' is not supported")]
    UnsupportedMetricType { metric: String, kind: String },
    #[error("Metric '{0}' is defined more than once")]
    DuplicateMetric(String),
    #[error("Invalid metric name '{0}'")]
    InvalidMetricName(String),
    #[error("Invalid label name '{label}' in metric '{metric}'")]
    InvalidLabelName { metric: String, label: String },
    #[error("Label '{label}' is declared twice in metric '{metric}'")]
    DuplicateLabel { metric: String, label: String },
    #[error("Invalid label in metric '{metric}': {source}")]
    Label {
        metric: String,
        #[source]
        source: LabelError,
    },
    #[error("Failed to register metric: {0}")]
    Registry(#[from] RegistryError),
}

/// Supported metric kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
}

impl FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "counter" => Ok(MetricType::Counter),
            _ => Err(s.to_string()),
        }
    }
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
        }
    }
}

/// A metric configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Job name, exposed as the `job` default label value
    pub job: Option<String>,
    pub metrics: Vec<MetricDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: String,
    pub help: Option<String>,
    pub filter: String,
    pub labels: Vec<LabelDefinition>,
    /// Shorthand labels written as `"{Property}"`; the label name is derived
    /// from the property
    pub tags: Vec<String>,
}

impl Default for MetricDefinition {
    fn default() -> Self {
        Self {
            name: String::new(),
            metric_type: "counter".to_string(),
            help: None,
            filter: String::new(),
            labels: Vec::new(),
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelDefinition {
    #[serde(default)]
    pub name: Option<String>,
    pub value: String,
}

/// A validated metric definition, immutable for the process lifetime
#[derive(Debug, Clone)]
pub struct MetricSpec {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    pub filter: String,
    pub labels: Vec<LabelSpec>,
}

impl MetricSpec {
    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.clone()).collect()
    }
}

/// Parse a configuration document.
///
/// Accepts either a bare sequence of metric definitions or a mapping with
/// `job` and `metrics` keys.
pub fn parse_config(yaml: &str, origin: &str) -> Result<MetricsConfig, ConfigError> {
    let parse_err = |source| ConfigError::Parse {
        origin: origin.to_string(),
        source,
    };

    let value: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(parse_err)?;
    match value {
        serde_yaml::Value::Null => Ok(MetricsConfig::default()),
        serde_yaml::Value::Sequence(_) => {
            let metrics = serde_yaml::from_value(value).map_err(parse_err)?;
            Ok(MetricsConfig { job: None, metrics })
        }
        other => serde_yaml::from_value(other).map_err(parse_err),
    }
}

pub fn load_config_from_path(path: &Path) -> Result<MetricsConfig, ConfigError> {
    let path_display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path_display.clone(),
        source,
    })?;

    parse_config(&raw, &format!("'{}'", path_display))
}

impl MetricsConfig {
    /// Validate every definition.
    ///
    /// Definitions with an empty name or filter are skipped with a warning;
    /// unsupported types, duplicate names and invalid names are fatal.
    pub fn validate(&self, aliases: &LabelAliases) -> Result<Vec<MetricSpec>, ConfigError> {
        let mut seen = HashSet::new();
        let mut specs = Vec::with_capacity(self.metrics.len());

        for def in &self.metrics {
            if def.name.trim().is_empty() || def.filter.trim().is_empty() {
                tracing::warn!(
                    metric = %def.name,
                    "skipping metric definition with missing name or filter"
                );
                continue;
            }

            let name = def.name.trim().to_string();
            let metric_type =
                def.metric_type
                    .parse::<MetricType>()
                    .map_err(|kind| ConfigError::UnsupportedMetricType {
                        metric: name.clone(),
                        kind,
                    })?;

            if !METRIC_NAME_RE.is_match(&name) {
                return Err(ConfigError::InvalidMetricName(name));
            }
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateMetric(name));
            }

            let labels = def.label_specs(&name, aliases)?;

            specs.push(MetricSpec {
                help: def
                    .help
                    .clone()
                    .filter(|h| !h.trim().is_empty())
                    .unwrap_or_else(|| format!("Metric for {}", name)),
                name,
                metric_type,
                filter: def.filter.clone(),
                labels,
            });
        }

        Ok(specs)
    }
}

impl MetricDefinition {
    fn label_specs(
        &self,
        metric: &str,
        aliases: &LabelAliases,
    ) -> Result<Vec<LabelSpec>, ConfigError> {
        let explicit = self
            .labels
            .iter()
            .map(|l| LabelSpec::resolve(l.name.as_deref(), &l.value, aliases));
        let shorthand = self.tags.iter().map(|tag| {
            let property = tag.trim().trim_matches(['{', '}']);
            LabelSpec::resolve(None, &format!("{{{}}}", property), aliases)
        });

        let mut labels: Vec<LabelSpec> = Vec::new();
        for label in explicit.chain(shorthand) {
            let label = label.map_err(|source| ConfigError::Label {
                metric: metric.to_string(),
                source,
            })?;

            if !LABEL_NAME_RE.is_match(&label.name) {
                return Err(ConfigError::InvalidLabelName {
                    metric: metric.to_string(),
                    label: label.name,
                });
            }
            if labels.iter().any(|l| l.name == label.name) {
                return Err(ConfigError::DuplicateLabel {
                    metric: metric.to_string(),
                    label: label.name,
                });
            }
            labels.push(label);
        }

        Ok(labels)
    }
}

/// Host-level settings for one running exporter
#[derive(Debug, Clone)]
pub struct AppSettings {
    /// Inline YAML metric configuration
    pub configuration: Option<String>,
    /// Path to a YAML metric configuration
    pub config_file: Option<PathBuf>,
    pub listen_host: String,
    pub port: u16,
    /// Path the metrics are served under
    pub url: Option<String>,
    /// When set, scrapes must send `Authorization: Bearer <token>`
    pub bearer_token: Option<String>,
    /// Overrides the job name of the configuration document
    pub job: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            configuration: None,
            config_file: None,
            listen_host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            url: None,
            bearer_token: None,
            job: None,
        }
    }
}

impl AppSettings {
    /// Load the metric configuration: inline YAML first, then the configured
    /// file, then the file named by [`CONFIG_FILE_ENV`]
    pub fn load_metrics_config(&self) -> Result<MetricsConfig, ConfigError> {
        if let Some(yaml) = self.configuration.as_deref().filter(|y| !y.trim().is_empty()) {
            return parse_config(yaml, "inline configuration");
        }

        if let Some(path) = &self.config_file {
            return load_config_from_path(path);
        }

        match std::env::var_os(CONFIG_FILE_ENV) {
            Some(path) if !path.is_empty() => load_config_from_path(Path::new(&path)),
            _ => Err(ConfigError::Missing),
        }
    }

    /// The scrape path with a leading slash and no trailing slash
    pub fn metrics_path(&self) -> String {
        let raw = self
            .url
            .as_deref()
            .map(|u| u.trim().trim_matches('/'))
            .filter(|u| !u.is_empty());

        match raw {
            Some(path) => format!("/{}", path),
            None => DEFAULT_METRICS_PATH.to_string(),
        }
    }

    /// The bearer token, if authentication is enabled
    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
