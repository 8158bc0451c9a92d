use std::{fmt::Debug, sync::Arc, time::Duration};

use crate::executor::Executor;
use gust_core::prelude::{ConfigError, DelegatedShutdownListener, ShutdownHandle};
use gust_instruments::Reporter;

/// Scenario-defined values carried on the runner and virtual user contexts.
pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

/// State shared by every virtual user in a run.
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    reporter: Arc<Reporter>,
    shutdown_handle: ShutdownHandle,
    target: Option<String>,
    iterations: u64,
    connection_reuse: bool,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    pub(crate) fn new(
        executor: Arc<Executor>,
        reporter: Arc<Reporter>,
        shutdown_handle: ShutdownHandle,
        target: Option<String>,
        iterations: u64,
        connection_reuse: bool,
    ) -> Self {
        Self {
            executor,
            reporter,
            shutdown_handle,
            target,
            iterations,
            connection_reuse,
            value: Default::default(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn reporter(&self) -> Arc<Reporter> {
        self.reporter.clone()
    }

    /// The base URL of the service under test, resolved from the command line, the `GUST_TARGET`
    /// environment variable or the scenario's default.
    pub fn target(&self) -> Result<&str, ConfigError> {
        self.target.as_deref().ok_or(ConfigError::MissingTarget)
    }

    /// The workload size each request should ask the target to perform.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Whether clients may reuse pooled connections between requests.
    pub fn connection_reuse(&self) -> bool {
        self.connection_reuse
    }

    /// Stop the whole scenario early. Every virtual user is drained and the run reports whatever
    /// it measured up to this point.
    pub fn force_stop_scenario(&self) {
        self.shutdown_handle.shutdown();
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

/// Per virtual user state, handed to the VU hooks.
pub struct VuContext<RV: UserValuesConstraint, V: UserValuesConstraint> {
    vu_id: String,
    vu_index: usize,
    runner_context: Arc<RunnerContext<RV>>,
    stop_listener: DelegatedShutdownListener,
    pace: Option<Duration>,
    value: V,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> VuContext<RV, V> {
    pub(crate) fn new(
        vu_id: String,
        vu_index: usize,
        runner_context: Arc<RunnerContext<RV>>,
        stop_listener: DelegatedShutdownListener,
        pace: Option<Duration>,
    ) -> Self {
        Self {
            vu_id,
            vu_index,
            runner_context,
            stop_listener,
            pace,
            value: Default::default(),
        }
    }

    /// The identifier of this virtual user, in the form `vu-<index>`.
    pub fn vu_id(&self) -> &str {
        &self.vu_id
    }

    /// The zero-based index of this virtual user. Indexes are assigned in start order and never
    /// reused within a run, so a user started during a later ramp has a higher index.
    pub fn vu_index(&self) -> usize {
        self.vu_index
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    /// This user's stop signal, for behaviours that want to react to cancellation themselves.
    pub fn stop_listener(&mut self) -> &mut DelegatedShutdownListener {
        &mut self.stop_listener
    }

    /// Sleep the configured pacing delay, waking early when this user is told to stop.
    ///
    /// Call this at the end of a behaviour iteration. Without a configured pace it returns
    /// immediately.
    pub fn pace(&mut self) {
        let Some(delay) = self.pace else {
            return;
        };
        let mut stop_listener = self.stop_listener.clone();
        // This user's stop signal interrupts the sleep. Run-level interruption fans out to the
        // per-user stop handles within one scheduler tick, so an interrupted run never waits for
        // a full pacing delay. The loop observes the stop signal before the next iteration.
        let _ = self.runner_context.executor().execute_in_place(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop_listener.wait_for_shutdown() => {}
            }
            Ok(())
        });
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }
}
