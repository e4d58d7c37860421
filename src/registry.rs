//! Counter registry
//!
//! Counters are created once from configuration and incremented concurrently
//! by the ingestion path while the scrape endpoint reads snapshots.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Counter '{name}' is already registered with labels {existing:?}, not {requested:?}")]
    Conflict {
        name: String,
        existing: Vec<String>,
        requested: Vec<String>,
    },

    #[error("Counter '{name}' declares label '{label}' more than once")]
    DuplicateLabel { name: String, label: String },

    #[error("Unknown counter '{0}'")]
    UnknownCounter(String),

    #[error("Missing value for label '{label}' of counter '{name}'")]
    MissingLabel { name: String, label: String },
}

/// A monotonically increasing counter partitioned by label values
#[derive(Debug)]
pub struct Counter {
    name: String,
    help: String,
    label_names: Vec<String>,
    series: RwLock<HashMap<Vec<String>, Arc<AtomicU64>>>,
}

impl Counter {
    fn new(name: String, help: String, label_names: Vec<String>) -> Self {
        Self {
            name,
            help,
            label_names,
            series: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Order the supplied values by the declared label names, or report the
    /// first declared label without a value
    fn label_tuple(&self, values: &BTreeMap<String, String>) -> Result<Vec<String>, RegistryError> {
        self.label_names
            .iter()
            .map(|label| {
                values
                    .get(label)
                    .cloned()
                    .ok_or_else(|| RegistryError::MissingLabel {
                        name: self.name.clone(),
                        label: label.clone(),
                    })
            })
            .collect()
    }

    /// Increment the series for `values` by one, returning the new count
    pub fn increment(&self, values: &BTreeMap<String, String>) -> Result<u64, RegistryError> {
        let key = self.label_tuple(values)?;

        if let Some(cell) = self.series.read().get(&key) {
            return Ok(cell.fetch_add(1, Ordering::Relaxed) + 1);
        }

        // Two first-use increments can race here; `entry` makes the loser
        // reuse the winner's cell.
        let cell = self
            .series
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone();
        Ok(cell.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Current count of one series, zero if never observed
    pub fn get(&self, values: &BTreeMap<String, String>) -> u64 {
        self.label_tuple(values)
            .ok()
            .and_then(|key| {
                self.series
                    .read()
                    .get(&key)
                    .map(|c| c.load(Ordering::Relaxed))
            })
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let mut series: Vec<SeriesSnapshot> = self
            .series
            .read()
            .iter()
            .map(|(labels, cell)| SeriesSnapshot {
                label_values: labels.clone(),
                value: cell.load(Ordering::Relaxed),
            })
            .collect();
        series.sort_by(|a, b| a.label_values.cmp(&b.label_values));

        CounterSnapshot {
            name: self.name.clone(),
            help: self.help.clone(),
            label_names: self.label_names.clone(),
            series,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSnapshot {
    /// Values in declared label order
    pub label_values: Vec<String>,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub name: String,
    pub help: String,
    pub label_names: Vec<String>,
    pub series: Vec<SeriesSnapshot>,
}

/// The set of registered counters, safe to share between threads
#[derive(Debug, Default)]
pub struct MetricRegistry {
    counters: RwLock<BTreeMap<String, Arc<Counter>>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a counter. Registering the same name with the same labels
    /// again returns the existing counter.
    pub fn create_counter(
        &self,
        name: &str,
        help: &str,
        label_names: &[String],
    ) -> Result<Arc<Counter>, RegistryError> {
        for (i, label) in label_names.iter().enumerate() {
            if label_names[..i].contains(label) {
                return Err(RegistryError::DuplicateLabel {
                    name: name.to_string(),
                    label: label.clone(),
                });
            }
        }

        let mut counters = self.counters.write();
        if let Some(existing) = counters.get(name) {
            if existing.label_names() == label_names {
                return Ok(Arc::clone(existing));
            }
            return Err(RegistryError::Conflict {
                name: name.to_string(),
                existing: existing.label_names().to_vec(),
                requested: label_names.to_vec(),
            });
        }

        let counter = Arc::new(Counter::new(
            name.to_string(),
            help.to_string(),
            label_names.to_vec(),
        ));
        counters.insert(name.to_string(), Arc::clone(&counter));
        Ok(counter)
    }

    pub fn counter(&self, name: &str) -> Option<Arc<Counter>> {
        self.counters.read().get(name).cloned()
    }

    pub fn increment(
        &self,
        name: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<u64, RegistryError> {
        let counter = self
            .counter(name)
            .ok_or_else(|| RegistryError::UnknownCounter(name.to_string()))?;
        counter.increment(values)
    }

    /// Snapshot every counter. Each series value is read atomically; the
    /// snapshot as a whole is not a single point in time.
    pub fn snapshot(&self) -> Vec<CounterSnapshot> {
        let counters: Vec<Arc<Counter>> = self.counters.read().values().cloned().collect();
        counters.iter().map(|c| c.snapshot()).collect()
    }
}
