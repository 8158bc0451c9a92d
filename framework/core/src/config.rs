use thiserror::Error;

/// A problem with the run configuration.
///
/// These are the only fatal errors in the framework. They are raised before any virtual user has
/// started, so a run that fails with one of these produces no summary at all.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("load profile must have a non-zero total duration")]
    ZeroLengthProfile,

    #[error("invalid stage `{value}`, expected `<duration>:<target>` such as `30s:100`")]
    InvalidStage { value: String },

    #[error("invalid duration `{value}`")]
    InvalidDuration { value: String },

    #[error("duration `{value}` has no unit, write `{value}s` if you meant seconds")]
    MissingDurationUnit { value: String },

    #[error("invalid target URL `{value}`")]
    InvalidTarget { value: String },

    #[error("no target base URL, pass --target or set GUST_TARGET")]
    MissingTarget,

    #[error("--stage cannot be combined with --vus or --duration")]
    ConflictingModes,

    #[error("--soak cannot be combined with --stage or --duration")]
    SoakConflict,

    #[error("flat mode needs a --duration or --soak alongside --vus")]
    MissingDuration,

    #[error("check pass rate threshold {value} is not within 0.0..=1.0")]
    InvalidCheckRate { value: f64 },

    #[error("scenario has no behaviour registered")]
    MissingBehaviour,
}
