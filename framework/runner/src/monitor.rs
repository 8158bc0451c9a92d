use gust_core::prelude::DelegatedShutdownListener;
use sysinfo::{Pid, ProcessRefreshKind, System};

/// Watch the load generator's own resource usage and report sustained high CPU load.
///
/// This never stops a run. It logs a warning so the operator knows the measurements may say more
/// about the generator than about the target. Latency numbers from a starved generator are not
/// trustworthy.
///
/// The process CPU usage is sampled every [sysinfo::MINIMUM_CPU_UPDATE_INTERVAL] and compared
/// against the total capacity of the machine.
pub(crate) fn start_monitor(mut shutdown_listener: DelegatedShutdownListener) {
    std::thread::Builder::new()
        .name("monitor".to_string())
        .spawn(move || {
            let this_process_pid = Pid::from_u32(std::process::id());
            let mut sys = System::new();

            sys.refresh_cpu();
            let cpu_count = sys.cpus().len();

            loop {
                if shutdown_listener.should_shutdown() {
                    break;
                }

                sys.refresh_process_specifics(this_process_pid, ProcessRefreshKind::new().with_cpu());

                let Some(process) = sys.process(this_process_pid) else {
                    break;
                };

                let usage = (process.cpu_usage() / (cpu_count * 100) as f32) * 100.0;
                if usage > 80.0 {
                    log::warn!("The load generator is using {:.2}% of the machine's CPU across {} cores. Results may reflect generator saturation rather than target capacity", usage, cpu_count);
                }

                std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            }
        })
        .expect("Failed to start monitor thread");
}
