//! Host adapter
//!
//! The host that delivers events drives the exporter through three calls:
//! [`MetricsPlugin::initialize`] when it attaches, [`MetricsPlugin::handle_event`]
//! for every event and [`MetricsPlugin::shutdown`] when it detaches.

use crate::config::{AppSettings, ConfigError};
use crate::event::LogEvent;
use crate::labels::{DefaultLabelValues, LabelAliases};
use crate::pipeline::{IngestReport, MetricPipeline};
use crate::registry::MetricRegistry;
use crate::server::{ScrapeEndpoint, ScrapeServer, ScrapeServerFactory, ServerError};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error("The exporter is already initialized")]
    AlreadyInitialized,
}

pub trait MetricsPlugin {
    fn initialize(&mut self, settings: &AppSettings) -> Result<(), AppError>;
    fn handle_event(&self, event: &LogEvent) -> IngestReport;
    fn shutdown(&mut self);
}

/// Counts matching events into labeled counters and serves them for scraping
pub struct MetricsApp {
    aliases: LabelAliases,
    defaults: DefaultLabelValues,
    registry: Arc<MetricRegistry>,
    server_factory: Box<dyn ScrapeServerFactory>,
    pipeline: Option<MetricPipeline>,
    server: Option<Box<dyn ScrapeServer>>,
}

impl MetricsApp {
    pub fn new(server_factory: Box<dyn ScrapeServerFactory>) -> Self {
        Self {
            aliases: LabelAliases::default(),
            defaults: DefaultLabelValues::from_environment(),
            registry: Arc::new(MetricRegistry::new()),
            server_factory,
            pipeline: None,
            server: None,
        }
    }

    pub fn with_aliases(mut self, aliases: LabelAliases) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_defaults(mut self, defaults: DefaultLabelValues) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    pub fn pipeline(&self) -> Option<&MetricPipeline> {
        self.pipeline.as_ref()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().and_then(|s| s.local_addr())
    }
}

impl MetricsPlugin for MetricsApp {
    fn initialize(&mut self, settings: &AppSettings) -> Result<(), AppError> {
        if self.pipeline.is_some() {
            return Err(AppError::AlreadyInitialized);
        }

        let config = settings.load_metrics_config()?;
        let specs = config.validate(&self.aliases)?;

        let mut defaults = self.defaults.clone();
        if let Some(job) = settings.job.as_ref().or(config.job.as_ref()) {
            defaults = defaults.with("job", job.clone());
        }

        let pipeline = MetricPipeline::build(specs, Arc::new(defaults), Arc::clone(&self.registry))?;
        info!(
            metrics = pipeline.metrics().len(),
            rejected = pipeline.rejected().len(),
            "metric configuration loaded"
        );

        let endpoint = ScrapeEndpoint {
            addr: format!("{}:{}", settings.listen_host, settings.port),
            path: settings.metrics_path(),
            bearer_token: settings.bearer_token().map(str::to_string),
        };
        self.server = Some(
            self.server_factory
                .start(endpoint, Arc::clone(&self.registry))?,
        );
        self.pipeline = Some(pipeline);

        Ok(())
    }

    /// Events arriving before initialization are ignored
    fn handle_event(&self, event: &LogEvent) -> IngestReport {
        self.pipeline
            .as_ref()
            .map(|p| p.handle_event(event))
            .unwrap_or_default()
    }

    fn shutdown(&mut self) {
        if let Some(server) = self.server.take() {
            server.stop();
        }
        self.pipeline = None;
    }
}

impl Drop for MetricsApp {
    fn drop(&mut self) {
        self.shutdown();
    }
}
