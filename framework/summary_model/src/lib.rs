use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The name of the scenario that was run
    pub scenario_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The duration the schedule was configured to run for, in seconds
    ///
    /// Not set for soak runs, which have no planned end.
    ///
    /// When a run is interrupted the actual duration will be shorter than this. The summary is
    /// still produced over whatever was collected before the interruption.
    pub configured_duration: Option<u64>,
    /// How long the run actually took, in seconds
    pub actual_duration_s: f64,
    /// The peak virtual user count in the configured schedule
    pub peak_vus: usize,
    /// How many virtual users were started over the whole run
    ///
    /// With a schedule that ramps down and back up this can exceed [RunSummary::peak_vus],
    /// because stopped users are never restarted.
    pub vus_started: usize,
    /// Total requests issued
    pub requests_total: u64,
    /// Requests that completed with a 2xx status
    pub requests_succeeded: u64,
    /// Requests that completed with a non-2xx status
    pub requests_failed: u64,
    /// Requests that never produced a response
    pub transport_errors: u64,
    /// Requests per second over the active part of the run
    pub requests_per_second: f64,
    /// Response time distribution over completed requests
    pub latency: LatencySummary,
    /// Pass counts for each named check
    pub checks: BTreeMap<String, CheckSummary>,
    /// The configured minimum overall check pass rate, if one was set
    ///
    /// This is the only mechanism by which the outcome of a run can affect the process exit
    /// status, see [RunSummary::into_result].
    pub check_rate_threshold: Option<f64>,
    /// Environment variables set for the run
    ///
    /// This won't capture all environment variables. Just the ones that the runner is aware of or
    /// that are included by the scenario itself.
    pub env: HashMap<String, String>,
    /// The version of Gust that was used for this run
    pub gust_version: String,
}

/// Response time percentiles in milliseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LatencySummary {
    pub min_ms: f64,
    pub mean_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Outcome tally for one named check
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckSummary {
    pub passes: u64,
    pub total: u64,
}

/// The configured check pass rate was not met.
#[derive(Debug, Error, PartialEq)]
#[error("check pass rate {actual:.4} fell below the configured threshold {threshold}")]
pub struct ThresholdError {
    pub threshold: f64,
    pub actual: f64,
}

impl RunSummary {
    /// The fraction of check evaluations that passed, across every named check.
    ///
    /// Returns 1.0 when no checks were evaluated.
    pub fn check_pass_rate(&self) -> f64 {
        let (passes, total) = self
            .checks
            .values()
            .fold((0u64, 0u64), |(p, t), c| (p + c.passes, t + c.total));

        if total == 0 {
            1.0
        } else {
            passes as f64 / total as f64
        }
    }

    /// Apply the configured check rate threshold to this summary.
    ///
    /// A summary with no threshold always converts cleanly. This is the only path by which the
    /// results of a run are allowed to fail the process, so transient target trouble can never
    /// flip the exit status unless a scenario opted in.
    pub fn into_result(self) -> Result<(), ThresholdError> {
        match self.check_rate_threshold {
            Some(threshold) => {
                let actual = self.check_pass_rate();
                if actual < threshold {
                    Err(ThresholdError { threshold, actual })
                } else {
                    Ok(())
                }
            }
            None => Ok(()),
        }
    }

    /// Add an environment variable
    pub fn add_env(&mut self, key: String, value: String) {
        self.env.insert(key, value);
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to uniquely identify the configuration used to run the
    /// scenario, so that repeated runs of the same setup can be grouped. It uses the
    ///     - Scenario name
    ///     - Configured duration
    ///     - Peak virtual user count
    ///     - Selected environment variables
    ///     - Gust version
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario_name.as_bytes());
        if let Some(configured_duration) = self.configured_duration {
            Digest::update(&mut hasher, configured_duration.to_le_bytes());
        }
        Digest::update(&mut hasher, self.peak_vus.to_le_bytes());
        self.env
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        Digest::update(&mut hasher, self.gust_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`. Parent directories are created as needed.
pub fn append_run_summary(run_summary: RunSummary, path: PathBuf) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    let _ = file.write("\n".as_bytes())?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, &run_summary)?;
    Ok(())
}

/// Load a run summary from a reader
pub fn load_run_summary<R: Read>(reader: R) -> anyhow::Result<RunSummary> {
    let reader = std::io::BufReader::new(reader);
    let run_summary: RunSummary = serde_json::from_reader(reader)?;
    Ok(run_summary)
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_summary_runs(path: PathBuf) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_summary() -> RunSummary {
        RunSummary {
            run_id: "run-1".to_string(),
            scenario_name: "steady_state".to_string(),
            started_at: 1_700_000_000,
            configured_duration: Some(300),
            actual_duration_s: 300.2,
            peak_vus: 300,
            vus_started: 300,
            requests_total: 1000,
            requests_succeeded: 990,
            requests_failed: 5,
            transport_errors: 5,
            requests_per_second: 3.33,
            latency: LatencySummary {
                min_ms: 1.2,
                mean_ms: 14.0,
                max_ms: 312.0,
                p50_ms: 11.0,
                p90_ms: 30.0,
                p95_ms: 45.0,
                p99_ms: 120.0,
            },
            checks: BTreeMap::from([
                (
                    "status is 200".to_string(),
                    CheckSummary {
                        passes: 990,
                        total: 1000,
                    },
                ),
                (
                    "latency < 500ms".to_string(),
                    CheckSummary {
                        passes: 1000,
                        total: 1000,
                    },
                ),
            ]),
            check_rate_threshold: None,
            env: HashMap::new(),
            gust_version: "0.1.0-dev.0".to_string(),
        }
    }

    #[test]
    fn round_trips_summaries_through_a_jsonl_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs").join("summary.jsonl");

        let first = sample_summary();
        let mut second = sample_summary();
        second.run_id = "run-2".to_string();

        append_run_summary(first.clone(), path.clone()).unwrap();
        append_run_summary(second.clone(), path.clone()).unwrap();

        let loaded = load_summary_runs(path).unwrap();
        assert_eq!(vec![first, second], loaded);
    }

    #[test]
    fn fingerprint_ignores_per_run_identity() {
        let first = sample_summary();
        let mut second = sample_summary();
        second.run_id = "run-2".to_string();
        second.started_at += 600;
        second.actual_duration_s = 299.8;
        second.requests_total = 900;

        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_the_configuration() {
        let base = sample_summary();

        let mut different_peak = sample_summary();
        different_peak.peak_vus = 400;
        assert_ne!(base.fingerprint(), different_peak.fingerprint());

        let mut different_env = sample_summary();
        different_env.add_env("GUST_TARGET".to_string(), "http://a:8080".to_string());
        assert_ne!(base.fingerprint(), different_env.fingerprint());
    }

    #[test]
    fn pass_rate_spans_all_checks() {
        let summary = sample_summary();
        // 1990 passes over 2000 evaluations.
        assert_eq!(0.995, summary.check_pass_rate());
    }

    #[test]
    fn no_threshold_never_fails() {
        assert_eq!(Ok(()), sample_summary().into_result());
    }

    #[test]
    fn met_threshold_passes() {
        let mut summary = sample_summary();
        summary.check_rate_threshold = Some(0.99);
        assert_eq!(Ok(()), summary.into_result());
    }

    #[test]
    fn missed_threshold_fails_with_the_observed_rate() {
        let mut summary = sample_summary();
        summary.check_rate_threshold = Some(0.999);
        assert_eq!(
            Err(ThresholdError {
                threshold: 0.999,
                actual: 0.995,
            }),
            summary.into_result()
        );
    }
}
