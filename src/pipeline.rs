//! Event ingestion
//!
//! For every incoming event each configured metric runs independently:
//! filter, then render labels, then increment. A failure in one metric is
//! logged and never stops the others.

use crate::config::{ConfigError, MetricSpec};
use crate::event::LogEvent;
use crate::filter::{CompiledFilter, FilterParseError};
use crate::labels::{DefaultLabelValues, LabelOutcome, LabelRenderer};
use crate::registry::{Counter, MetricRegistry, RegistryError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// What happened to one metric for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The filter did not match
    NoMatch,
    /// The filter matched but a label could not be resolved
    Skipped { label: String },
    /// The counter was incremented; holds the new series count
    Incremented(u64),
}

/// A metric whose filter failed to compile and which never fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedMetric {
    pub name: String,
    pub filter: String,
    pub error: FilterParseError,
}

/// A metric ready for ingestion: compiled filter, label renderer and counter
#[derive(Debug)]
pub struct CompiledMetric {
    spec: MetricSpec,
    filter: CompiledFilter,
    labels: LabelRenderer,
    counter: Arc<Counter>,
}

impl CompiledMetric {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn observe(&self, event: &LogEvent) -> Result<Observation, IngestError> {
        if !self.filter.matches(event) {
            return Ok(Observation::NoMatch);
        }

        match self.labels.render(event) {
            LabelOutcome::Skip { label } => Ok(Observation::Skipped { label }),
            LabelOutcome::Ready(values) => {
                let count = self.counter.increment(&values)?;
                Ok(Observation::Incremented(count))
            }
        }
    }
}

/// Per-event tally across all metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub matched: usize,
    pub incremented: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl std::ops::AddAssign for IngestReport {
    fn add_assign(&mut self, other: Self) {
        self.matched += other.matched;
        self.incremented += other.incremented;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// The configured metrics and the registry they count into
#[derive(Debug)]
pub struct MetricPipeline {
    metrics: Vec<CompiledMetric>,
    rejected: Vec<RejectedMetric>,
    registry: Arc<MetricRegistry>,
}

impl MetricPipeline {
    /// Compile every metric and register its counter.
    ///
    /// Metrics whose filter does not compile are logged, recorded as rejected
    /// and left out; the rest are unaffected. Registry conflicts are fatal.
    pub fn build(
        specs: Vec<MetricSpec>,
        defaults: Arc<DefaultLabelValues>,
        registry: Arc<MetricRegistry>,
    ) -> Result<Self, ConfigError> {
        let mut metrics = Vec::with_capacity(specs.len());
        let mut rejected = Vec::new();

        for spec in specs {
            let filter = match CompiledFilter::compile(&spec.filter) {
                Ok(filter) => filter,
                Err(e) => {
                    error!(metric = %spec.name, filter = %spec.filter, error = %e, "filter does not compile; metric disabled");
                    rejected.push(RejectedMetric {
                        name: spec.name,
                        filter: spec.filter,
                        error: e,
                    });
                    continue;
                }
            };

            let counter = registry.create_counter(&spec.name, &spec.help, &spec.label_names())?;
            let labels = LabelRenderer::new(spec.labels.clone(), Arc::clone(&defaults));

            metrics.push(CompiledMetric {
                spec,
                filter,
                labels,
                counter,
            });
        }

        Ok(Self {
            metrics,
            rejected,
            registry,
        })
    }

    pub fn metrics(&self) -> &[CompiledMetric] {
        &self.metrics
    }

    pub fn rejected(&self) -> &[RejectedMetric] {
        &self.rejected
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Run one event through every metric
    pub fn handle_event(&self, event: &LogEvent) -> IngestReport {
        let mut report = IngestReport::default();

        for metric in &self.metrics {
            match metric.observe(event) {
                Ok(Observation::NoMatch) => {}
                Ok(Observation::Skipped { label }) => {
                    report.matched += 1;
                    report.skipped += 1;
                    debug!(metric = %metric.name(), %label, "label unresolved; observation skipped");
                }
                Ok(Observation::Incremented(count)) => {
                    report.matched += 1;
                    report.incremented += 1;
                    debug!(metric = %metric.name(), count, "counter incremented");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(metric = %metric.name(), error = %e, "error updating metric");
                }
            }
        }

        report
    }
}
