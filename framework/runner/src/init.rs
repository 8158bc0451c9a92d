use crate::cli::GustScenarioCli;
use clap::Parser;

/// Initialise logging and parse the scenario command line.
///
/// Call this at the top of `main` and hand the result to the scenario definition. Logging is
/// configured from `RUST_LOG` in the usual way.
pub fn init() -> GustScenarioCli {
    env_logger::init();

    GustScenarioCli::parse()
}
