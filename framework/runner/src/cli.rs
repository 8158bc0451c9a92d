use clap::Parser;
use gust_core::prelude::{parse_duration, ConfigError, Stage};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(about, long_about = None)]
pub struct GustScenarioCli {
    /// The base URL of the service under test.
    ///
    /// Falls back to the `GUST_TARGET` environment variable, then to the scenario's default.
    #[clap(long)]
    pub target: Option<String>,

    /// A ramp stage in the format `<duration>:<target>`. For example `--stage=120s:30` ramps to
    /// 30 virtual users over two minutes.
    ///
    /// Repeat the flag to build a multi-stage profile. The stages run in the order given, each
    /// one ramping linearly from the previous stage's target to its own. Durations require a
    /// unit, a bare number is rejected.
    ///
    /// Cannot be combined with `--vus` or `--duration`.
    #[clap(long, value_parser = parse_stage)]
    pub stage: Vec<Stage>,

    /// The number of virtual users to run in flat mode.
    #[clap(long)]
    pub vus: Option<usize>,

    /// How long to hold the flat load for, such as `5m` or `90s`. Durations require a unit.
    #[clap(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Run flat at `--vus` with no end time, continuing until stopped with Ctrl-C.
    #[clap(long, default_value = "false")]
    pub soak: bool,

    /// The workload size forwarded to the target with each request.
    ///
    /// Falls back to the `GUST_ITERATIONS` environment variable, then to the scenario's default.
    #[clap(long)]
    pub iterations: Option<u64>,

    /// The pause between behaviour iterations, such as `500ms`. Durations require a unit.
    #[clap(long, value_parser = parse_duration)]
    pub pace: Option<Duration>,

    /// Open a fresh connection for every request instead of reusing pooled connections.
    #[clap(long, default_value = "false")]
    pub no_connection_reuse: bool,

    /// Where request metrics are sent.
    #[clap(long, value_enum, default_value = "in-memory")]
    pub reporter: ReporterOpt,

    /// An identifier for this run.
    ///
    /// Use the same value across multiple processes to combine their metrics into one logical
    /// run. Generated when not provided.
    #[clap(long)]
    pub run_id: Option<String>,

    /// Append the run summary to this file as one JSON line per run.
    #[clap(long)]
    pub summary_path: Option<PathBuf>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar is just adding noise to
    /// the captured logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// Exit non-zero when the overall check pass rate ends up below this ratio (0.0 to 1.0).
    ///
    /// Without this flag the exit status only reflects whether the run itself completed. Failed
    /// requests and failed checks are reported but do not fail the process.
    #[clap(long)]
    pub fail_on_check_rate: Option<f64>,
}

fn parse_stage(value: &str) -> Result<Stage, ConfigError> {
    value.parse()
}

/// Which collector receives request records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ReporterOpt {
    /// Aggregate in memory and print summary tables when the run finishes.
    InMemory,
    /// Write InfluxDB line protocol to a file, for loading into a dashboard later.
    InfluxFile,
    /// Discard request records. Run statistics are still collected for the summary.
    Noop,
}
