mod in_memory;
mod influx_file;

use std::ops::Deref;
use std::path::PathBuf;

use influxive_core::{Metric, StringType};
use parking_lot::Mutex;
use tokio::runtime::Runtime;

use crate::metrics::RequestRecord;
use crate::stats::{RunStats, StatsCollector};
use gust_core::prelude::DelegatedShutdownListener;

pub use in_memory::InMemoryReporter;
pub use influx_file::InfluxFileReportCollector;

/// A simple, opinionated, newtype for the influxive_core::Metric type.
///
/// The reported timestamp for the metric will be the current time when the metric is created.
/// The name you choose will be transformed into `gust.custom.<name>`.
pub struct ReportMetric(Metric);

impl ReportMetric {
    pub fn new(name: &str) -> Self {
        Self(Metric::new(
            std::time::SystemTime::now(),
            format!("gust.custom.{}", name),
        ))
    }

    pub fn with_field<N, V>(mut self, name: N, value: V) -> Self
    where
        N: Into<StringType>,
        V: Into<influxive_core::DataType>,
    {
        self.0 = self.0.with_field(name, value);
        self
    }

    pub fn with_tag<N, V>(mut self, name: N, value: V) -> Self
    where
        N: Into<StringType>,
        V: Into<influxive_core::DataType>,
    {
        self.0 = self.0.with_tag(name, value);
        self
    }

    pub(crate) fn into_inner(self) -> Metric {
        self.0
    }
}

// The inner metric type does not implement Clone, so rebuild it field by field.
impl Clone for ReportMetric {
    fn clone(&self) -> Self {
        let mut new_inner = Metric::new(self.timestamp, self.name.clone());
        for (k, v) in &self.fields {
            new_inner = new_inner.with_field(k.clone(), v.clone());
        }
        for (k, v) in &self.tags {
            new_inner = new_inner.with_tag(k.clone(), v.clone());
        }
        Self(new_inner)
    }
}

impl Deref for ReportMetric {
    type Target = Metric;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// An optional sink for request records and custom metrics.
///
/// Collectors run behind the always-on statistics aggregation, so dropping or buffering records
/// here never affects the run summary.
pub trait ReportCollector {
    fn add_request(&mut self, record: &RequestRecord);

    fn add_custom(&mut self, metric: ReportMetric);

    fn finalize(&self);
}

/// Selects which collectors a [Reporter] is built with.
#[derive(Debug, Default)]
pub struct ReportConfig {
    scenario_name: String,
    run_id: String,
    in_memory: bool,
    influx_file_dir: Option<PathBuf>,
}

impl ReportConfig {
    pub fn new(scenario_name: String, run_id: String) -> Self {
        Self {
            scenario_name,
            run_id,
            in_memory: false,
            influx_file_dir: None,
        }
    }

    /// Keep records in memory and print summary tables at the end of the run.
    pub fn enable_in_memory(mut self) -> Self {
        self.in_memory = true;
        self
    }

    /// Write records to `dir` in the InfluxDB line protocol format.
    pub fn enable_influx_file(mut self, dir: PathBuf) -> Self {
        self.influx_file_dir = Some(dir);
        self
    }

    pub fn init(self, runtime: &Runtime, shutdown_listener: DelegatedShutdownListener) -> Reporter {
        let mut collectors: Vec<Mutex<Box<dyn ReportCollector + Send>>> = Vec::new();

        if self.in_memory {
            collectors.push(Mutex::new(Box::new(InMemoryReporter::new())));
        }

        if let Some(dir) = self.influx_file_dir {
            collectors.push(Mutex::new(Box::new(InfluxFileReportCollector::new(
                runtime,
                shutdown_listener,
                dir,
                self.scenario_name.clone(),
                self.run_id.clone(),
            ))));
        }

        Reporter {
            stats: StatsCollector::new(),
            collectors,
        }
    }
}

/// Fan-out point for everything the instrumented clients record.
///
/// Shared across all virtual user threads behind an `Arc`. Ingestion is cheap enough to sit on
/// the request path, the only lock held is per collector and bounded by histogram insertion or a
/// channel send.
pub struct Reporter {
    stats: StatsCollector,
    collectors: Vec<Mutex<Box<dyn ReportCollector + Send>>>,
}

impl Reporter {
    pub fn add_request(&self, record: RequestRecord) {
        self.stats.add(&record);
        for collector in &self.collectors {
            collector.lock().add_request(&record);
        }
    }

    pub fn add_custom(&self, metric: ReportMetric) {
        for collector in &self.collectors {
            collector.lock().add_custom(metric.clone());
        }
    }

    /// A snapshot of the aggregated request statistics so far.
    pub fn stats(&self) -> RunStats {
        self.stats.snapshot()
    }

    /// Flush and stop every collector. After this returns the aggregated statistics are
    /// complete, records added later are not guaranteed to be visible anywhere.
    pub fn finalize(&self) {
        for collector in &self.collectors {
            collector.lock().finalize();
        }
    }
}
