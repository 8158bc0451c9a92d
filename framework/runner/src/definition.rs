use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::{GustScenarioCli, ReporterOpt};
use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
use gust_core::prelude::{ConfigError, LoadProfile, Stage};

pub type HookResult = anyhow::Result<()>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type GlobalHook<RV> = fn(Arc<RunnerContext<RV>>) -> HookResult;
pub type VuHookMut<RV, V> = fn(&mut VuContext<RV, V>) -> HookResult;

const DEFAULT_ITERATIONS: u64 = 1_000;

/// The builder for a scenario definition.
///
/// A scenario binary creates one of these in `main`, registers its hooks and defaults, and hands
/// it to [crate::run::run]. Command line values win over scenario defaults throughout.
pub struct ScenarioDefinitionBuilder<RV: UserValuesConstraint, V: UserValuesConstraint> {
    /// The name of the scenario, which should be unique within the test suite.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    cli: GustScenarioCli,
    default_target: Option<String>,
    default_stages: Option<Vec<Stage>>,
    default_vus: Option<usize>,
    default_duration: Option<Duration>,
    default_pace: Option<Duration>,
    default_iterations: Option<u64>,
    default_no_connection_reuse: bool,
    default_fail_on_check_rate: Option<f64>,
    setup_fn: Option<GlobalHookMut<RV>>,
    setup_vu_fn: Option<VuHookMut<RV, V>>,
    behaviour_fn: Option<VuHookMut<RV, V>>,
    teardown_vu_fn: Option<VuHookMut<RV, V>>,
    teardown_fn: Option<GlobalHook<RV>>,
}

/// How many virtual users to run, and for how long.
#[derive(Debug)]
pub(crate) enum RunLoad {
    /// Follow a staged profile from start to finish.
    Profile(LoadProfile),
    /// Hold a constant population until externally stopped.
    Soak { vus: usize },
}

/// A validated scenario, ready to run.
pub(crate) struct ScenarioDefinition<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub name: String,
    pub run_id: String,
    pub load: RunLoad,
    pub target: Option<String>,
    pub iterations: u64,
    pub pace: Option<Duration>,
    pub connection_reuse: bool,
    pub reporter: ReporterOpt,
    pub summary_path: Option<PathBuf>,
    pub no_progress: bool,
    pub fail_on_check_rate: Option<f64>,
    pub setup_fn: Option<GlobalHookMut<RV>>,
    pub setup_vu_fn: Option<VuHookMut<RV, V>>,
    pub behaviour_fn: VuHookMut<RV, V>,
    pub teardown_vu_fn: Option<VuHookMut<RV, V>>,
    pub teardown_fn: Option<GlobalHook<RV>>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinition<RV, V> {
    /// Planned wall time for the run, when the load has a defined end.
    pub fn planned_duration(&self) -> Option<Duration> {
        match &self.load {
            RunLoad::Profile(profile) => Some(profile.total_duration()),
            RunLoad::Soak { .. } => None,
        }
    }
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinitionBuilder<RV, V> {
    /// Initialise a new scenario definition from the scenario name and command line arguments.
    pub fn new(name: &str, cli: GustScenarioCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            default_target: None,
            default_stages: None,
            default_vus: None,
            default_duration: None,
            default_pace: None,
            default_iterations: None,
            default_no_connection_reuse: false,
            default_fail_on_check_rate: None,
            setup_fn: None,
            setup_vu_fn: None,
            behaviour_fn: None,
            teardown_vu_fn: None,
            teardown_fn: None,
        }
    }

    /// The base URL to use when neither `--target` nor `GUST_TARGET` is given.
    pub fn with_default_target(mut self, target: impl Into<String>) -> Self {
        self.default_target = Some(target.into());
        self
    }

    /// The staged profile to run when no load flags are given on the command line.
    pub fn with_default_stages(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.default_stages = Some(stages.into_iter().collect());
        self
    }

    /// The flat-mode virtual user count to use when `--vus` is not given.
    pub fn with_default_vus(mut self, vus: usize) -> Self {
        self.default_vus = Some(vus);
        self
    }

    /// The flat-mode duration to use when `--duration` is not given.
    pub fn with_default_duration(mut self, duration: Duration) -> Self {
        self.default_duration = Some(duration);
        self
    }

    /// The pause between behaviour iterations when `--pace` is not given.
    pub fn with_default_pace(mut self, pace: Duration) -> Self {
        self.default_pace = Some(pace);
        self
    }

    /// The workload size to use when neither `--iterations` nor `GUST_ITERATIONS` is given.
    pub fn with_default_iterations(mut self, iterations: u64) -> Self {
        self.default_iterations = Some(iterations);
        self
    }

    /// Open a fresh connection for every request unless the command line says otherwise.
    pub fn with_no_connection_reuse(mut self) -> Self {
        self.default_no_connection_reuse = true;
        self
    }

    /// The check pass rate below which the run exits non-zero, used when `--fail-on-check-rate`
    /// is not given.
    pub fn with_default_fail_on_check_rate(mut self, rate: f64) -> Self {
        self.default_fail_on_check_rate = Some(rate);
        self
    }

    /// Set the global setup hook for this scenario. It runs once, before any virtual user
    /// starts. An error here is fatal and the run produces no summary.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Set the virtual user setup hook, run once per user before its first iteration. An error
    /// stops that user from ever iterating but the rest of the run continues.
    pub fn use_vu_setup(mut self, setup_vu_fn: VuHookMut<RV, V>) -> Self {
        self.setup_vu_fn = Some(setup_vu_fn);
        self
    }

    /// Set the behaviour hook, the body of each virtual user's loop. Required.
    pub fn use_behaviour(mut self, behaviour_fn: VuHookMut<RV, V>) -> Self {
        self.behaviour_fn = Some(behaviour_fn);
        self
    }

    /// Set the virtual user teardown hook, run as each user exits. Best effort, errors are
    /// logged and ignored.
    pub fn use_vu_teardown(mut self, teardown_vu_fn: VuHookMut<RV, V>) -> Self {
        self.teardown_vu_fn = Some(teardown_vu_fn);
        self
    }

    /// Set the global teardown hook, run once after every virtual user has exited. Best effort,
    /// errors are logged and ignored.
    pub fn use_teardown(mut self, teardown_fn: GlobalHook<RV>) -> Self {
        self.teardown_fn = Some(teardown_fn);
        self
    }

    pub(crate) fn build(self) -> Result<ScenarioDefinition<RV, V>, ConfigError> {
        let cli = self.cli;

        let staged_cli = !cli.stage.is_empty();
        let flat_cli = cli.vus.is_some() || cli.duration.is_some();
        if staged_cli && flat_cli {
            return Err(ConfigError::ConflictingModes);
        }
        if cli.soak && (staged_cli || cli.duration.is_some()) {
            return Err(ConfigError::SoakConflict);
        }

        let vus = cli.vus.or(self.default_vus).unwrap_or(1);
        let load = if cli.soak {
            RunLoad::Soak { vus }
        } else if staged_cli {
            RunLoad::Profile(LoadProfile::new(cli.stage)?)
        } else {
            match (flat_cli, self.default_stages) {
                (false, Some(stages)) => RunLoad::Profile(LoadProfile::new(stages)?),
                _ => {
                    let duration = cli
                        .duration
                        .or(self.default_duration)
                        .ok_or(ConfigError::MissingDuration)?;
                    RunLoad::Profile(LoadProfile::flat(vus, duration)?)
                }
            }
        };

        let fail_on_check_rate = cli.fail_on_check_rate.or(self.default_fail_on_check_rate);
        if let Some(rate) = fail_on_check_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::InvalidCheckRate { value: rate });
            }
        }

        let target = cli
            .target
            .or_else(|| std::env::var("GUST_TARGET").ok())
            .or(self.default_target);

        let iterations = cli
            .iterations
            .or_else(env_iterations)
            .or(self.default_iterations)
            .unwrap_or(DEFAULT_ITERATIONS);

        Ok(ScenarioDefinition {
            name: self.name,
            run_id: cli.run_id.unwrap_or_else(|| nanoid::nanoid!()),
            load,
            target,
            iterations,
            pace: cli.pace.or(self.default_pace),
            connection_reuse: !(cli.no_connection_reuse || self.default_no_connection_reuse),
            reporter: cli.reporter,
            summary_path: cli.summary_path,
            no_progress: cli.no_progress,
            fail_on_check_rate,
            setup_fn: self.setup_fn,
            setup_vu_fn: self.setup_vu_fn,
            behaviour_fn: self.behaviour_fn.ok_or(ConfigError::MissingBehaviour)?,
            teardown_vu_fn: self.teardown_vu_fn,
            teardown_fn: self.teardown_fn,
        })
    }
}

fn env_iterations() -> Option<u64> {
    let raw = std::env::var("GUST_ITERATIONS").ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring GUST_ITERATIONS value `{raw}` which is not a number");
            None
        }
    }
}
