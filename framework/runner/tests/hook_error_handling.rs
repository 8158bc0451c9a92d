use gust_runner::prelude::{
    run, GustScenarioCli, HookResult, ReporterOpt, RunnerContext, ScenarioDefinitionBuilder,
    UserValuesConstraint, VuBailError, VuContext,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default, Debug)]
struct RunnerContextValue {}

impl UserValuesConstraint for RunnerContextValue {}

#[derive(Default, Debug)]
struct VuContextValue {
    value: i32,
}

impl UserValuesConstraint for VuContextValue {}

fn sample_cli() -> GustScenarioCli {
    GustScenarioCli {
        target: None,
        stage: vec![],
        vus: None,
        duration: None,
        soak: false,
        iterations: None,
        pace: None,
        no_connection_reuse: false,
        reporter: ReporterOpt::Noop,
        run_id: None,
        summary_path: None,
        no_progress: true,
        fail_on_check_rate: None,
    }
}

fn idle_behaviour(_ctx: &mut VuContext<RunnerContextValue, VuContextValue>) -> HookResult {
    std::thread::sleep(Duration::from_millis(10));
    Ok(())
}

#[test]
fn propagate_error_in_setup_hook() {
    fn setup(_ctx: &mut RunnerContext<RunnerContextValue>) -> HookResult {
        Err(anyhow::anyhow!("Error in setup hook"))
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, VuContextValue>::new(
        "propagate_error_in_setup_hook",
        sample_cli(),
    )
    .with_default_duration(Duration::from_secs(5))
    .use_setup(setup)
    .use_behaviour(idle_behaviour);

    let result = run(scenario);

    assert!(result.is_err());
    assert_eq!(result.unwrap_err().to_string(), "Error in setup hook");
}

#[test]
fn capture_error_in_vu_setup() {
    static BEHAVIOUR_RUNS: AtomicUsize = AtomicUsize::new(0);

    fn vu_setup(_ctx: &mut VuContext<RunnerContextValue, VuContextValue>) -> HookResult {
        Err(anyhow::anyhow!("Error in VU setup hook"))
    }

    fn behaviour(ctx: &mut VuContext<RunnerContextValue, VuContextValue>) -> HookResult {
        BEHAVIOUR_RUNS.fetch_add(1, Ordering::SeqCst);
        ctx.runner_context().force_stop_scenario();
        Ok(())
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, VuContextValue>::new(
        "capture_error_in_vu_setup",
        sample_cli(),
    )
    .with_default_duration(Duration::from_secs(1))
    .use_vu_setup(vu_setup)
    .use_behaviour(behaviour);

    let result = run(scenario);

    // The failed user never iterates but the run itself still completes and reports.
    assert!(result.is_ok());
    assert_eq!(0, BEHAVIOUR_RUNS.load(Ordering::SeqCst));
}

#[test]
fn capture_error_in_behaviour_and_continue() {
    fn behaviour(ctx: &mut VuContext<RunnerContextValue, VuContextValue>) -> HookResult {
        if ctx.get().value < 5 {
            ctx.get_mut().value += 1;
        } else {
            // Save time running this test by shutting down once this has run a few times.
            ctx.runner_context().force_stop_scenario();
        }

        Err(anyhow::anyhow!("Error in behaviour hook"))
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, VuContextValue>::new(
        "capture_error_in_behaviour_and_continue",
        sample_cli(),
    )
    .with_default_duration(Duration::from_secs(5))
    .use_behaviour(behaviour);

    let result = run(scenario);

    assert!(result.is_ok());
}

#[test]
fn bail_error_stops_one_vu_only() {
    static BAIL_RUNS: AtomicUsize = AtomicUsize::new(0);
    static KEEP_RUNNING_RUNS: AtomicUsize = AtomicUsize::new(0);

    fn behaviour(ctx: &mut VuContext<RunnerContextValue, VuContextValue>) -> HookResult {
        if ctx.vu_index() == 0 {
            BAIL_RUNS.fetch_add(1, Ordering::SeqCst);
            return Err(VuBailError::default().into());
        }

        KEEP_RUNNING_RUNS.fetch_add(1, Ordering::SeqCst);
        if KEEP_RUNNING_RUNS.load(Ordering::SeqCst) >= 10 {
            ctx.runner_context().force_stop_scenario();
        }
        std::thread::sleep(Duration::from_millis(10));
        Ok(())
    }

    let mut cli = sample_cli();
    cli.vus = Some(2);
    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, VuContextValue>::new(
        "bail_error_stops_one_vu_only",
        cli,
    )
    .with_default_duration(Duration::from_secs(5))
    .use_behaviour(behaviour);

    let result = run(scenario);

    let summary = result.unwrap();
    assert_eq!(2, summary.vus_started);
    // The bailing user ran exactly once, the other kept iterating.
    assert_eq!(1, BAIL_RUNS.load(Ordering::SeqCst));
    assert!(KEEP_RUNNING_RUNS.load(Ordering::SeqCst) >= 10);
}

#[test]
fn capture_error_in_vu_teardown() {
    fn vu_teardown(_ctx: &mut VuContext<RunnerContextValue, VuContextValue>) -> HookResult {
        Err(anyhow::anyhow!("Error in VU teardown hook"))
    }

    fn behaviour(ctx: &mut VuContext<RunnerContextValue, VuContextValue>) -> HookResult {
        ctx.runner_context().force_stop_scenario();
        Ok(())
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, VuContextValue>::new(
        "capture_error_in_vu_teardown",
        sample_cli(),
    )
    .with_default_duration(Duration::from_secs(5))
    .use_behaviour(behaviour)
    .use_vu_teardown(vu_teardown);

    let result = run(scenario);

    assert!(result.is_ok());
}

#[test]
fn capture_error_in_teardown() {
    fn teardown(_ctx: Arc<RunnerContext<RunnerContextValue>>) -> HookResult {
        Err(anyhow::anyhow!("Error in teardown hook"))
    }

    fn behaviour(ctx: &mut VuContext<RunnerContextValue, VuContextValue>) -> HookResult {
        ctx.runner_context().force_stop_scenario();
        Ok(())
    }

    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, VuContextValue>::new(
        "capture_error_in_teardown",
        sample_cli(),
    )
    .with_default_duration(Duration::from_secs(5))
    .use_behaviour(behaviour)
    .use_teardown(teardown);

    let result = run(scenario);

    assert!(result.is_ok());
}
