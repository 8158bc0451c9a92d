use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// Completed with a 2xx status.
    Success,
    /// Completed with any other status.
    HttpError,
    /// The request never produced a response, for example a refused connection or a timeout.
    TransportError,
}

/// The outcome of a single request, produced by an instrumented client and consumed by the
/// reporter.
///
/// Create the record before issuing the request so that `started` captures queueing as well as
/// the exchange itself, then call [RequestRecord::finish] once the response (or the failure) is
/// in hand.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    /// Which operation this was, for example `GET /simulate`.
    pub operation_id: String,
    pub started: Instant,
    /// Wall time for the full request and response cycle. `None` until [RequestRecord::finish]
    /// has been called.
    pub elapsed: Option<Duration>,
    pub response: Option<ResponseClass>,
    /// The HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Evaluated check results as `(name, passed)` pairs.
    pub checks: Vec<(String, bool)>,
    /// Extra tags attached by the client, forwarded to collectors that support them.
    pub attr: HashMap<String, String>,
}

impl RequestRecord {
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            started: Instant::now(),
            elapsed: None,
            response: None,
            status: None,
            checks: Vec::new(),
            attr: HashMap::new(),
        }
    }

    /// Stop the clock and classify the outcome.
    pub fn finish(&mut self, response: ResponseClass) {
        self.elapsed = Some(self.started.elapsed());
        self.response = Some(response);
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = Some(status);
    }

    pub fn record_check(&mut self, name: &str, passed: bool) {
        self.checks.push((name.to_string(), passed));
    }

    pub fn add_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attr.insert(key.into(), value.into());
    }

    pub fn duration(&self) -> Option<Duration> {
        self.elapsed
    }

    pub fn is_error(&self) -> bool {
        !matches!(self.response, Some(ResponseClass::Success))
    }
}
