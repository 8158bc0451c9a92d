mod metrics;
mod report;
mod stats;

pub use metrics::{RequestRecord, ResponseClass};
pub use report::{
    InMemoryReporter, InfluxFileReportCollector, ReportCollector, ReportConfig, ReportMetric,
    Reporter,
};
pub use stats::{CheckCounts, LatencyStats, RunStats};
