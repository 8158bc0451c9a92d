use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use gust_core::prelude::{
    DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError, VuBailError,
};
use gust_instruments::ReportConfig;
use gust_summary_model::{append_run_summary, CheckSummary, LatencySummary, RunSummary};

use crate::cli::ReporterOpt;
use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
use crate::definition::{RunLoad, ScenarioDefinition, ScenarioDefinitionBuilder, VuHookMut};
use crate::executor::Executor;
use crate::monitor::start_monitor;
use crate::progress::start_progress;
use crate::shutdown::start_shutdown_listener;
use crate::types::GustResult;

/// A soak run has no profile to derive a tick interval from.
const SOAK_TICK: Duration = Duration::from_secs(1);

struct VuHandle {
    stop_handle: ShutdownHandle,
    join_handle: std::thread::JoinHandle<()>,
}

/// Execute a scenario from configuration to summary.
///
/// The returned summary describes whatever the run measured, even when it was interrupted part
/// way through. The only errors are configuration problems and setup hook failures, both raised
/// before any virtual user has started, plus failure to persist the summary at the very end.
/// Apply [RunSummary::into_result] to the returned summary to turn a missed check rate threshold
/// into a process exit status.
pub fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<RV, V>,
) -> GustResult<RunSummary> {
    let definition = definition.build()?;

    log::info!(
        "Running scenario {} as run {}",
        definition.name,
        definition.run_id
    );

    let started_at = chrono::Utc::now().timestamp();
    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime);

    let mut report_config = ReportConfig::new(definition.name.clone(), definition.run_id.clone());
    match definition.reporter {
        ReporterOpt::InMemory => report_config = report_config.enable_in_memory(),
        ReporterOpt::InfluxFile => {
            report_config = report_config.enable_influx_file(metrics_dir());
        }
        ReporterOpt::Noop => {}
    }
    let reporter = Arc::new(report_config.init(&runtime, shutdown_handle.new_listener()));

    let executor = Arc::new(Executor::new(runtime));
    let mut runner_context = RunnerContext::new(
        executor,
        reporter.clone(),
        shutdown_handle.clone(),
        definition.target.clone(),
        definition.iterations,
        definition.connection_reuse,
    );

    if let Some(setup_fn) = &definition.setup_fn {
        setup_fn(&mut runner_context)?;
    }

    let runner_context = Arc::new(runner_context);
    let live_vus = Arc::new(AtomicUsize::new(0));

    if let Some(planned) = definition.planned_duration() {
        if !definition.no_progress {
            start_progress(planned, live_vus.clone(), shutdown_handle.new_listener());
        }
    }

    // Virtual users are about to start. From here on, heavy resource usage by the generator
    // itself is worth flagging to the operator.
    start_monitor(shutdown_handle.new_listener());

    let run_started = Instant::now();
    let vus_started = drive_schedule(
        &definition,
        runner_context.clone(),
        &shutdown_handle,
        &live_vus,
    );
    let actual_duration = run_started.elapsed();

    if let Some(teardown_fn) = definition.teardown_fn {
        // Best effort. A failing teardown must not cost us the report.
        if let Err(e) = teardown_fn(runner_context.clone()) {
            log::error!("Teardown failed: {:?}", e);
        }
    }

    // Stop the auxiliary threads and let the collectors drain and flush.
    shutdown_handle.shutdown();
    reporter.finalize();

    let stats = reporter.stats();
    let actual_duration_s = actual_duration.as_secs_f64();
    let requests_per_second = if actual_duration_s > 0.0 {
        stats.requests_total as f64 / actual_duration_s
    } else {
        0.0
    };
    let mut summary = RunSummary {
        run_id: definition.run_id.clone(),
        scenario_name: definition.name.clone(),
        started_at,
        configured_duration: definition.planned_duration().map(|d| d.as_secs()),
        actual_duration_s,
        peak_vus: match &definition.load {
            RunLoad::Profile(profile) => profile.max_target(),
            RunLoad::Soak { vus } => *vus,
        },
        vus_started,
        requests_total: stats.requests_total,
        requests_succeeded: stats.requests_succeeded,
        requests_failed: stats.requests_failed,
        transport_errors: stats.transport_errors,
        requests_per_second,
        latency: LatencySummary {
            min_ms: to_ms(stats.latency.min),
            mean_ms: to_ms(stats.latency.mean),
            max_ms: to_ms(stats.latency.max),
            p50_ms: to_ms(stats.latency.p50),
            p90_ms: to_ms(stats.latency.p90),
            p95_ms: to_ms(stats.latency.p95),
            p99_ms: to_ms(stats.latency.p99),
        },
        checks: stats
            .checks
            .iter()
            .map(|(name, counts)| {
                (
                    name.clone(),
                    CheckSummary {
                        passes: counts.passes,
                        total: counts.total,
                    },
                )
            })
            .collect(),
        check_rate_threshold: definition.fail_on_check_rate,
        env: Default::default(),
        gust_version: env!("CARGO_PKG_VERSION").to_string(),
    };
    for (key, value) in std::env::vars().filter(|(key, _)| key.starts_with("GUST_")) {
        summary.add_env(key, value);
    }

    log::info!(
        "{}: {} requests in {:.1}s ({:.1} rps), {} failed",
        definition.name,
        stats.requests_total,
        actual_duration_s,
        requests_per_second,
        stats.requests_failed
    );
    log::info!("Run configuration fingerprint: {}", summary.fingerprint());

    if let Some(path) = &definition.summary_path {
        append_run_summary(summary.clone(), path.clone())
            .context("Failed to append the run summary")?;
    }

    Ok(summary)
}

/// Reconcile the live virtual user population against the desired count until the schedule is
/// exhausted or the run is interrupted, then drain everyone.
fn drive_schedule<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: &ScenarioDefinition<RV, V>,
    runner_context: Arc<RunnerContext<RV>>,
    shutdown_handle: &ShutdownHandle,
    live_vus: &Arc<AtomicUsize>,
) -> usize {
    let mut run_listener = shutdown_handle.new_listener();
    let tick = match &definition.load {
        RunLoad::Profile(profile) => profile.tick_interval(),
        RunLoad::Soak { .. } => SOAK_TICK,
    };

    let mut live: Vec<VuHandle> = Vec::new();
    let mut retired: Vec<VuHandle> = Vec::new();
    let mut vus_started = 0;
    let mut interrupted = false;
    let started = Instant::now();

    loop {
        if run_listener.should_shutdown() {
            interrupted = true;
            break;
        }

        let desired = match &definition.load {
            RunLoad::Profile(profile) => match profile.desired_vus(started.elapsed()) {
                Some(desired) => desired,
                None => break,
            },
            RunLoad::Soak { vus } => *vus,
        };

        while live.len() < desired {
            live.push(spawn_vu(
                definition,
                runner_context.clone(),
                vus_started,
                live_vus.clone(),
            ));
            vus_started += 1;
        }
        // Ramping down stops the most recently started users first.
        while live.len() > desired {
            if let Some(handle) = live.pop() {
                handle.stop_handle.shutdown();
                retired.push(handle);
            }
        }

        std::thread::sleep(tick);
    }

    if interrupted {
        log::info!(
            "Run interrupted, draining {} virtual users and reporting partial results",
            live.len()
        );
    } else {
        log::debug!("Schedule complete, draining {} virtual users", live.len());
    }

    for handle in live.drain(..).rev() {
        handle.stop_handle.shutdown();
        retired.push(handle);
    }
    for handle in retired {
        if let Err(e) = handle.join_handle.join() {
            log::error!("A virtual user thread panicked: {:?}", e);
        }
    }

    vus_started
}

fn spawn_vu<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: &ScenarioDefinition<RV, V>,
    runner_context: Arc<RunnerContext<RV>>,
    vu_index: usize,
    live_vus: Arc<AtomicUsize>,
) -> VuHandle {
    let stop_handle = ShutdownHandle::new();
    // One listener for the loop condition and one for hook code to race against. A listener
    // consumes the signal it sees, so the two concerns need their own listeners.
    let cycle_listener = stop_handle.new_listener();
    let delegated_listener = stop_handle.new_listener();

    let setup_vu_fn = definition.setup_vu_fn;
    let behaviour_fn = definition.behaviour_fn;
    let teardown_vu_fn = definition.teardown_vu_fn;
    let pace = definition.pace;
    let vu_id = format!("vu-{vu_index}");

    let join_handle = std::thread::Builder::new()
        .name(vu_id.clone())
        .spawn(move || {
            live_vus.fetch_add(1, Ordering::Relaxed);
            let mut context =
                VuContext::new(vu_id, vu_index, runner_context, delegated_listener, pace);
            run_vu(
                &mut context,
                cycle_listener,
                setup_vu_fn,
                behaviour_fn,
                teardown_vu_fn,
            );
            live_vus.fetch_sub(1, Ordering::Relaxed);
        })
        .expect("Failed to spawn a virtual user thread");

    VuHandle {
        stop_handle,
        join_handle,
    }
}

fn run_vu<RV: UserValuesConstraint, V: UserValuesConstraint>(
    context: &mut VuContext<RV, V>,
    mut cycle_listener: DelegatedShutdownListener,
    setup_vu_fn: Option<VuHookMut<RV, V>>,
    behaviour_fn: VuHookMut<RV, V>,
    teardown_vu_fn: Option<VuHookMut<RV, V>>,
) {
    if let Some(setup_vu_fn) = setup_vu_fn {
        if let Err(e) = setup_vu_fn(context) {
            log::error!(
                "Setup failed for {}, it will not run: {:?}",
                context.vu_id(),
                e
            );
            return;
        }
    }

    loop {
        if cycle_listener.should_shutdown() {
            log::debug!("Stopping {}", context.vu_id());
            break;
        }

        match behaviour_fn(context) {
            Ok(()) => {}
            Err(e) if e.is::<ShutdownSignalError>() => {
                // A behaviour that races its own stop listener surfaces cancellation this way.
                break;
            }
            Err(e) if e.is::<VuBailError>() => {
                log::debug!("{} is done and bailing out", context.vu_id());
                break;
            }
            Err(e) => {
                log::error!(
                    "Behaviour iteration failed for {}: {:?}",
                    context.vu_id(),
                    e
                );
            }
        }

        context.pace();
    }

    if let Some(teardown_vu_fn) = teardown_vu_fn {
        if let Err(e) = teardown_vu_fn(context) {
            log::error!("Teardown failed for {}: {:?}", context.vu_id(), e);
        }
    }
}

fn to_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn metrics_dir() -> PathBuf {
    std::env::var("GUST_METRICS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("metrics"))
}
