use gust_core::prelude::ShutdownHandle;
use tokio::signal;

/// The run-level shutdown handle, fired when the process receives Ctrl-C.
///
/// The scheduler watches this handle and turns the signal into a graceful drain, so an
/// interrupted run still reports what it measured.
pub(crate) fn start_shutdown_listener(runtime: &tokio::runtime::Runtime) -> ShutdownHandle {
    let handle = ShutdownHandle::new();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl-C");
        println!("Received Ctrl-C, draining virtual users...");
        listener_handle.shutdown();
    });

    handle
}
