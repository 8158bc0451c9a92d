mod operations_table;

use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use tabled::settings::Style;
use tabled::Table;

use crate::metrics::{RequestRecord, ResponseClass};
use crate::report::in_memory::operations_table::RequestRow;
use crate::report::{ReportCollector, ReportMetric};

/// A very basic reporter that is useful while developing scenarios. It keeps all of the request
/// records in memory and prints a summary of the requests and checks at the end of the run.
pub struct InMemoryReporter {
    records: Vec<RequestRecord>,
}

impl InMemoryReporter {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    fn print_summary_of_requests(&self) {
        println!("\nSummary of requests");
        let rows = self
            .records
            .iter()
            .fold(
                HashMap::new(),
                |mut acc: HashMap<String, Vec<&RequestRecord>>, record| {
                    acc.entry(record.operation_id.clone()).or_default().push(record);
                    acc
                },
            )
            .into_iter()
            .sorted_by_key(|(operation_id, _)| operation_id.clone())
            .map(|(operation_id, records)| {
                let durations = records
                    .iter()
                    .filter(|r| {
                        !matches!(r.response, Some(ResponseClass::TransportError) | None)
                    })
                    .filter_map(|r| r.duration())
                    .map(|d| d.as_micros())
                    .collect::<Vec<_>>();
                let failures = records.iter().filter(|r| r.is_error()).count();

                RequestRow {
                    operation_id,
                    avg_time_ms: if durations.is_empty() {
                        0.0
                    } else {
                        durations.iter().sum::<u128>() as f64 / durations.len() as f64 / 1000.0
                    },
                    min_time_ms: durations.iter().min().copied().unwrap_or(0) as f64 / 1000.0,
                    max_time_ms: durations.iter().max().copied().unwrap_or(0) as f64 / 1000.0,
                    total_requests: records.len(),
                    failures,
                }
            })
            .collect::<Vec<_>>();

        let mut table = Table::new(rows);
        table.with(Style::modern());

        println!("{table}");
    }

    fn print_summary_of_checks(&self) {
        let mut checks: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        for record in &self.records {
            for (name, passed) in &record.checks {
                let counts = checks.entry(name.clone()).or_default();
                counts.1 += 1;
                if *passed {
                    counts.0 += 1;
                }
            }
        }

        if checks.is_empty() {
            return;
        }

        println!("\nChecks");
        for (name, (passes, total)) in checks {
            let mark = if passes == total { '✓' } else { '✗' };
            let rate = passes as f64 / total as f64 * 100.0;
            println!("  {mark} {name}: {passes}/{total} ({rate:.1}%)");
        }
    }
}

impl Default for InMemoryReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportCollector for InMemoryReporter {
    fn add_request(&mut self, record: &RequestRecord) {
        self.records.push(record.clone());
    }

    fn add_custom(&mut self, _metric: ReportMetric) {
        // no-op because custom metrics are ignored
    }

    fn finalize(&self) {
        self.print_summary_of_requests();
        self.print_summary_of_checks();
    }
}
