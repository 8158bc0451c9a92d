use crate::client::ResponseSummary;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type CheckPredicate = dyn Fn(&ResponseSummary) -> anyhow::Result<bool> + Send + Sync;

/// A named assertion that is evaluated against every response.
///
/// A failed check is tallied against its name and never aborts the request or the virtual user
/// that issued it. The run keeps going and the final report shows the pass rate per check.
#[derive(Clone)]
pub struct Check {
    name: String,
    predicate: Arc<CheckPredicate>,
}

impl Check {
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&ResponseSummary) -> anyhow::Result<bool> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// A check named `status is <code>` that passes when the response status matches exactly.
    pub fn status_is(status: u16) -> Self {
        Self::new(format!("status is {status}"), move |response| {
            Ok(response.status == status)
        })
    }

    /// A check named `latency < <n>ms` that passes when the request completed within `limit`.
    pub fn latency_below(limit: Duration) -> Self {
        Self::new(format!("latency < {}ms", limit.as_millis()), move |response| {
            Ok(response.elapsed < limit)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A predicate that fails to evaluate counts as a failed check. The problem is logged so that
    /// a broken predicate is visible without taking the run down.
    pub(crate) fn evaluate(&self, response: &ResponseSummary) -> bool {
        match (self.predicate)(response) {
            Ok(passed) => passed,
            Err(e) => {
                log::warn!("Check `{}` could not be evaluated: {:?}", self.name, e);
                false
            }
        }
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn sample_response(status: u16, elapsed: Duration) -> ResponseSummary {
        ResponseSummary {
            status,
            elapsed,
            body: Bytes::new(),
        }
    }

    #[test]
    fn status_check_matches_exact_code() {
        let check = Check::status_is(200);

        assert_eq!("status is 200", check.name());
        assert!(check.evaluate(&sample_response(200, Duration::from_millis(10))));
        assert!(!check.evaluate(&sample_response(201, Duration::from_millis(10))));
        assert!(!check.evaluate(&sample_response(500, Duration::from_millis(10))));
    }

    #[test]
    fn latency_check_uses_strict_bound() {
        let check = Check::latency_below(Duration::from_millis(500));

        assert_eq!("latency < 500ms", check.name());
        assert!(check.evaluate(&sample_response(200, Duration::from_millis(499))));
        assert!(!check.evaluate(&sample_response(200, Duration::from_millis(500))));
        assert!(!check.evaluate(&sample_response(200, Duration::from_secs(2))));
    }

    #[test]
    fn failing_predicate_counts_as_failed_check() {
        let check = Check::new("broken", |_| anyhow::bail!("cannot inspect response"));

        assert!(!check.evaluate(&sample_response(200, Duration::from_millis(1))));
    }
}
