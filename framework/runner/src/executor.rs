use std::future::Future;

/// Shared access to the runner's Tokio runtime.
///
/// Virtual users run on plain OS threads and use this to execute async work, so the whole run
/// shares one runtime instead of each user paying for its own.
#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
}

impl Executor {
    pub(crate) fn new(runtime: tokio::runtime::Runtime) -> Self {
        Self { runtime }
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// The future is never cancelled by shutdown. A behaviour iteration that is in flight when
    /// the run is stopped finishes and its outcome is still recorded; the loop observes the stop
    /// signal afterwards. How long shutdown can take is therefore bounded by the client's request
    /// timeout, so work submitted here should carry one.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        self.runtime.block_on(fut)
    }

    /// Submit async code to run in the background.
    ///
    /// The future is not cancelled when the run shuts down and the runner does not wait for it
    /// before finishing. In behaviour hooks prefer [Executor::execute_in_place] so that each
    /// iteration's work completes before the next one is scheduled.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        self.runtime.spawn(fut);
    }
}
