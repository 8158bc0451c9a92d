use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use influxdb::{InfluxDbWriteable, Query, Timestamp, WriteQuery};
use influxive_core::DataType;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Runtime;
use tokio::select;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::metrics::RequestRecord;
use crate::report::{ReportCollector, ReportMetric};
use gust_core::prelude::DelegatedShutdownListener;

/// Write metrics to disk in the InfluxDB line protocol format.
/// Metrics can then be sent to InfluxDB by Telegraf.
///
/// This is the recommended reporter to use when results need to outlive the process, for example
/// across a fleet of load generating nodes that share a run id.
pub struct InfluxFileReportCollector {
    join_handle: JoinHandle<()>,
    writer: UnboundedSender<WriteQuery>,
    flush_complete: Arc<AtomicBool>,
    scenario_name: String,
    run_id: String,
}

impl InfluxFileReportCollector {
    pub fn new(
        runtime: &Runtime,
        shutdown_listener: DelegatedShutdownListener,
        dir: PathBuf,
        scenario_name: String,
        run_id: String,
    ) -> Self {
        let flush_complete = Arc::new(AtomicBool::new(false));
        let (join_handle, writer) = start_metrics_file_write_task(
            runtime,
            shutdown_listener,
            dir,
            scenario_name.clone(),
            run_id.clone(),
            flush_complete.clone(),
        );

        Self {
            join_handle,
            writer,
            flush_complete,
            scenario_name,
            run_id,
        }
    }

    fn try_send(&self, query: WriteQuery) {
        if let Err(e) = self.writer.send(query) {
            if self.flush_complete.load(Ordering::Relaxed) {
                log::info!(
                    "Failed to record metric because the write task has finished: {}",
                    e
                );
            } else {
                log::warn!("Failed to record metric: {}", e);
            }
        }
    }

    fn crash_if_write_task_finished(&self) {
        if self.join_handle.is_finished() {
            panic!("Reporter cannot be used because the write task has finished");
        }
    }

    fn now_nanos() -> Timestamp {
        Timestamp::Nanoseconds(
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .expect("SystemTime before UNIX_EPOCH")
                .as_nanos(),
        )
    }
}

impl ReportCollector for InfluxFileReportCollector {
    fn add_request(&mut self, record: &RequestRecord) {
        self.crash_if_write_task_finished();

        let Some(elapsed) = record.elapsed else {
            // Unfinished records carry no measurement worth exporting.
            return;
        };

        let mut query = Self::now_nanos()
            .into_query("gust.request_duration")
            .add_field("value", elapsed.as_micros() as f64 / 1000.0)
            .add_tag("operation_id", record.operation_id.to_string())
            .add_tag("is_error", record.is_error().to_string())
            .add_tag("scenario", self.scenario_name.clone())
            .add_tag("run_id", self.run_id.clone());

        if let Some(status) = record.status {
            query = query.add_tag("status", status.to_string());
        }

        for (k, v) in &record.attr {
            query = query.add_tag(k, v.to_string());
        }

        self.try_send(query);

        for (name, passed) in &record.checks {
            let query = Self::now_nanos()
                .into_query("gust.check")
                .add_field("success", *passed)
                .add_tag("check", name.clone())
                .add_tag("scenario", self.scenario_name.clone())
                .add_tag("run_id", self.run_id.clone());

            self.try_send(query);
        }
    }

    fn add_custom(&mut self, metric: ReportMetric) {
        self.crash_if_write_task_finished();

        let metric = metric.into_inner();

        let mut query = Timestamp::Nanoseconds(
            metric
                .timestamp
                .duration_since(SystemTime::UNIX_EPOCH)
                .expect("SystemTime before UNIX_EPOCH")
                .as_nanos(),
        )
        .into_query(metric.name.into_string());

        for (k, v) in metric.fields {
            query = query.add_field(k.into_string(), v.into_type());
        }

        for (k, v) in metric.tags {
            query = query.add_tag(k.into_string(), v.into_type());
        }

        self.try_send(query);
    }

    fn finalize(&self) {
        let wait_started = std::time::Instant::now();
        let mut notify_timer = std::time::Instant::now();
        while !self.flush_complete.load(Ordering::Relaxed) {
            if notify_timer.elapsed().as_secs() > 10 {
                log::warn!(
                    "Still waiting for metrics to flush after {} seconds.",
                    wait_started.elapsed().as_secs()
                );
                notify_timer = std::time::Instant::now();
            }

            // If the write task has exited then there's no point trying to wait for it to finish
            // any longer.
            if self.join_handle.is_finished() {
                break;
            }

            std::thread::sleep(std::time::Duration::from_millis(100));
        }

        log::debug!(
            "Metrics flushed after {} seconds",
            wait_started.elapsed().as_secs()
        );
    }
}

fn start_metrics_file_write_task(
    runtime: &Runtime,
    mut shutdown_listener: DelegatedShutdownListener,
    dir: PathBuf,
    scenario_name: String,
    run_id: String,
    flush_complete: Arc<AtomicBool>,
) -> (JoinHandle<()>, UnboundedSender<WriteQuery>) {
    let (writer, mut receiver) = tokio::sync::mpsc::unbounded_channel();
    let join_handle = runtime.spawn(async move {
        if !dir.exists() {
            tokio::fs::create_dir_all(&dir).await.unwrap();
        }

        let mut file = File::options()
            .create_new(true)
            .write(true)
            .open(dir.join(format!("{}-{}.influx", scenario_name, run_id)))
            .await
            .unwrap();

        // Listen and write metrics until shutdown
        loop {
            select! {
                _ = shutdown_listener.wait_for_shutdown() => {
                    log::debug!("Shutting down influx file reporter");
                    break;
                }
                query = receiver.recv() => {
                    if let Some(query) = query {
                        write_query(&mut file, query).await.unwrap()
                    } else {
                        break;
                    }
                }
            }
        }

        log::debug!("Draining any remaining metrics before shutting down...");
        let mut drain_count = 0;

        // Drain remaining metrics before shutting down
        while let Ok(query) = receiver.try_recv() {
            write_query(&mut file, query).await.unwrap();
            drain_count += 1;

            if drain_count % 1000 == 0 {
                log::debug!("Drained {} remaining metrics", drain_count);
            }
        }

        // Ensure everything that's buffered has been written to disk.
        file.flush().await.unwrap();

        log::debug!("Drained {} remaining metrics", drain_count);

        // Signal the 'finalize' method that the write task has finished.
        flush_complete.store(true, Ordering::Relaxed);
    });

    (join_handle, writer)
}

#[inline]
async fn write_query<W>(writer: &mut W, query: WriteQuery) -> anyhow::Result<()>
where
    W: AsyncWriteExt + Unpin + Debug,
{
    let query_str = query.build()?.get();
    writer.write_all(query_str.as_bytes()).await?;
    writer.write(b"\n").await?;

    Ok(())
}

trait DataTypeExt {
    fn into_type(self) -> influxdb::Type;
}

impl DataTypeExt for DataType {
    fn into_type(self) -> influxdb::Type {
        match self {
            DataType::Bool(b) => influxdb::Type::Boolean(b),
            DataType::F64(f) => influxdb::Type::Float(f),
            DataType::I64(i) => influxdb::Type::SignedInteger(i),
            DataType::U64(u) => influxdb::Type::UnsignedInteger(u),
            DataType::String(s) => influxdb::Type::Text(s.into_string()),
        }
    }
}
