use crate::check::Check;
use anyhow::Context;
use bytes::Bytes;
use gust_core::prelude::ConfigError;
use gust_instruments::{Reporter, RequestRecord, ResponseClass};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection and check configuration shared by every virtual user of a scenario.
///
/// The scenario's setup hook builds one of these and stores it in the runner context, then each
/// virtual user turns it into its own [InstrumentedHttpClient].
#[derive(Clone, Debug)]
pub struct HttpClientConfig {
    base_url: Url,
    connection_reuse: bool,
    timeout: Duration,
    checks: Vec<Check>,
}

impl HttpClientConfig {
    /// Start from `base_url` with the defaults: connection reuse on, a 30 second request timeout
    /// and no checks.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let base_url = Url::parse(base_url).map_err(|_| ConfigError::InvalidTarget {
            value: base_url.to_string(),
        })?;
        Ok(Self {
            base_url,
            connection_reuse: true,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            checks: Vec::new(),
        })
    }

    /// With reuse disabled every request negotiates a fresh connection, which is closer to a
    /// crowd of independent clients than a warmed-up pool.
    pub fn with_connection_reuse(mut self, reuse: bool) -> Self {
        self.connection_reuse = reuse;
        self
    }

    /// The hard per-request timeout. This bounds how long a virtual user can be stuck in a single
    /// iteration, including during shutdown.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn with_checks(mut self, checks: impl IntoIterator<Item = Check>) -> Self {
        self.checks.extend(checks);
        self
    }
}

/// What a behaviour sees of a completed exchange.
#[derive(Clone, Debug)]
pub struct ResponseSummary {
    pub status: u16,
    /// Wall time for the full request and response cycle, body read included.
    pub elapsed: Duration,
    pub body: Bytes,
}

impl ResponseSummary {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// An HTTP client that reports every request it makes.
///
/// Each GET measures the full exchange, evaluates the configured checks against the response and
/// hands a [RequestRecord] to the reporter. Clones share the underlying connection pool, so build
/// one per virtual user when connection reuse is disabled.
#[derive(Clone)]
pub struct InstrumentedHttpClient {
    inner: reqwest::Client,
    base_url: Url,
    checks: Arc<[Check]>,
    attrs: Vec<(String, String)>,
    reporter: Arc<Reporter>,
}

impl std::fmt::Debug for InstrumentedHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentedHttpClient")
            .field("base_url", &self.base_url)
            .field("checks", &self.checks)
            .finish()
    }
}

impl InstrumentedHttpClient {
    pub fn new(config: HttpClientConfig, reporter: Arc<Reporter>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if !config.connection_reuse {
            // An idle pool of zero drops each connection as soon as its request completes, so the
            // next request has to open a new one.
            builder = builder.pool_max_idle_per_host(0);
        }
        let inner = builder.build().context("Failed to build the HTTP client")?;
        Ok(Self {
            inner,
            base_url: config.base_url,
            checks: config.checks.into(),
            attrs: Vec::new(),
            reporter,
        })
    }

    /// Attach a tag to every record this client reports. Scenarios use this to mark each
    /// virtual user's client with its id, so exported metrics can be attributed per user.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((key.into(), value.into()));
        self
    }

    /// Issue one GET against `path` under the configured base URL.
    ///
    /// The outcome is always reported, whether the exchange completed or not. A request that
    /// never produced a response fails every configured check, so a target that is down shows up
    /// in the check tallies and not just in the transport error count.
    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> anyhow::Result<ResponseSummary> {
        let url = self
            .base_url
            .join(path)
            .with_context(|| format!("Invalid request path `{path}`"))?;
        let mut record = RequestRecord::new(format!("GET {path}"));
        for (key, value) in &self.attrs {
            record.add_attr(key.clone(), value.clone());
        }

        match self.execute(url, query).await {
            Ok((status, body)) => {
                let class = if (200..300).contains(&status) {
                    ResponseClass::Success
                } else {
                    ResponseClass::HttpError
                };
                record.finish(class);
                record.set_status(status);
                let response = ResponseSummary {
                    status,
                    elapsed: record.duration().unwrap_or_default(),
                    body,
                };
                for check in self.checks.iter() {
                    record.record_check(check.name(), check.evaluate(&response));
                }
                self.reporter.add_request(record);
                Ok(response)
            }
            Err(e) => {
                record.finish(ResponseClass::TransportError);
                for check in self.checks.iter() {
                    record.record_check(check.name(), false);
                }
                self.reporter.add_request(record);
                log::debug!("Request to `{path}` failed: {e:?}");
                Err(e)
            }
        }
    }

    async fn execute(&self, url: Url, query: &[(&str, String)]) -> anyhow::Result<(u16, Bytes)> {
        let response = self.inner.get(url).query(query).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok((status, body))
    }

    /// One simulation round against the canonical workload endpoint,
    /// `/simulate?iterations=<n>`.
    pub async fn get_simulate(&self, iterations: u64) -> anyhow::Result<ResponseSummary> {
        self.get("/simulate", &[("iterations", iterations.to_string())])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gust_core::prelude::ShutdownHandle;
    use gust_instruments::ReportConfig;
    use pretty_assertions::assert_eq;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use tokio::runtime::Runtime;

    /// Serve a single canned HTTP response on a loopback port and return the base URL.
    fn serve_one_response(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = [0; 2048];
                let _ = stream.read(&mut request);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{addr}")
    }

    fn test_reporter(runtime: &Runtime) -> Arc<Reporter> {
        let shutdown_handle = ShutdownHandle::new();
        Arc::new(
            ReportConfig::new("http-client-tests".to_string(), "test".to_string())
                .init(runtime, shutdown_handle.new_listener()),
        )
    }

    #[test]
    fn simulate_round_reports_success_and_checks() {
        let base_url = serve_one_response(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 20\r\nConnection: close\r\n\r\n{\"pi_estimate\":3.14}",
        );

        let runtime = Runtime::new().unwrap();
        let reporter = test_reporter(&runtime);
        let config = HttpClientConfig::new(&base_url)
            .unwrap()
            .with_check(Check::status_is(200))
            .with_check(Check::latency_below(Duration::from_secs(30)));
        let client = InstrumentedHttpClient::new(config, reporter.clone()).unwrap();

        let response = runtime.block_on(client.get_simulate(100)).unwrap();

        assert_eq!(200, response.status);
        assert!(response.is_success());
        assert_eq!(&b"{\"pi_estimate\":3.14}"[..], &response.body[..]);

        let stats = reporter.stats();
        assert_eq!(1, stats.requests_total);
        assert_eq!(1, stats.requests_succeeded);
        assert_eq!(1, stats.checks.get("status is 200").unwrap().passes);
        assert_eq!(1, stats.checks.get("latency < 30000ms").unwrap().passes);
    }

    #[test]
    fn http_error_fails_the_status_check() {
        let base_url = serve_one_response(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );

        let runtime = Runtime::new().unwrap();
        let reporter = test_reporter(&runtime);
        let config = HttpClientConfig::new(&base_url)
            .unwrap()
            .with_check(Check::status_is(200));
        let client = InstrumentedHttpClient::new(config, reporter.clone()).unwrap();

        let response = runtime.block_on(client.get_simulate(100)).unwrap();

        assert_eq!(500, response.status);
        assert!(!response.is_success());

        let stats = reporter.stats();
        assert_eq!(1, stats.requests_total);
        assert_eq!(1, stats.requests_failed);
        assert_eq!(0, stats.transport_errors);
        let status_check = stats.checks.get("status is 200").unwrap();
        assert_eq!(0, status_check.passes);
        assert_eq!(1, status_check.total);
    }

    #[test]
    fn unreachable_target_fails_every_check() {
        // Bind and drop to get a port that nothing is listening on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let runtime = Runtime::new().unwrap();
        let reporter = test_reporter(&runtime);
        let config = HttpClientConfig::new(&format!("http://{addr}"))
            .unwrap()
            .with_check(Check::status_is(200))
            .with_check(Check::latency_below(Duration::from_millis(500)));
        let client = InstrumentedHttpClient::new(config, reporter.clone()).unwrap();

        let result = runtime.block_on(client.get_simulate(100));

        assert!(result.is_err());

        let stats = reporter.stats();
        assert_eq!(1, stats.requests_total);
        assert_eq!(1, stats.transport_errors);
        for (name, counts) in &stats.checks {
            assert_eq!(0, counts.passes, "check `{name}` should not have passed");
            assert_eq!(1, counts.total);
        }
    }

    #[test]
    fn client_attrs_are_tagged_on_every_record() {
        let base_url = serve_one_response(
            "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );

        let runtime = Runtime::new().unwrap();
        let shutdown = ShutdownHandle::new();
        let dir = tempfile::tempdir().unwrap();
        let reporter = Arc::new(
            ReportConfig::new("http-client-tests".to_string(), "attr-run".to_string())
                .enable_influx_file(dir.path().to_path_buf())
                .init(&runtime, shutdown.new_listener()),
        );

        let config = HttpClientConfig::new(&base_url).unwrap();
        let client = InstrumentedHttpClient::new(config, reporter.clone())
            .unwrap()
            .with_attr("vu", "vu-7");

        runtime.block_on(client.get_simulate(10)).unwrap();

        shutdown.shutdown();
        reporter.finalize();

        let contents = std::fs::read_to_string(
            dir.path().join("http-client-tests-attr-run.influx"),
        )
        .unwrap();
        assert!(contents.contains("vu=vu-7"));
    }

    #[test]
    fn malformed_base_url_is_a_configuration_error() {
        let result = HttpClientConfig::new("not a url");

        assert!(matches!(result, Err(ConfigError::InvalidTarget { .. })));
    }
}
