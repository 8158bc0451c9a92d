mod cli;
mod context;
mod definition;
mod executor;
mod init;
mod monitor;
mod progress;
mod run;
mod shutdown;
mod types;

pub mod prelude {
    pub use crate::cli::{GustScenarioCli, ReporterOpt};
    pub use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
    pub use crate::definition::{HookResult, ScenarioDefinitionBuilder};
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::run::run;
    pub use crate::types::GustResult;

    /// Re-export of the core types so scenarios can depend on a single crate.
    pub use gust_core::prelude::*;

    /// Re-exports for recording custom metrics and reading run output from scenario code.
    pub use gust_instruments::{ReportMetric, Reporter};
    pub use gust_summary_model::RunSummary;
}
