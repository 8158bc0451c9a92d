mod bail;
mod config;
mod shutdown;
mod stage;

pub mod prelude {
    pub use crate::bail::VuBailError;
    pub use crate::config::ConfigError;
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};
    pub use crate::stage::{parse_duration, LoadProfile, Stage};
}
