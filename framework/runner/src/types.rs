/// Recommended error type for a scenario `main` function and any shared behaviour code written
/// for hooks. This type is compatible with [crate::definition::HookResult] so `?` can propagate
/// errors in either direction.
pub type GustResult<T> = anyhow::Result<T>;
