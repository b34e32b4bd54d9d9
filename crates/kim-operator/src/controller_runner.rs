//! Runtime controller wiring

use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::controller::Config as ControllerConfig;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use kim_common::crd::Runtime;
use kim_runtime::{error_policy, reconcile, Context};

/// Watcher timeout (seconds) - must be less than client read_timeout
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Run the Runtime controller until a shutdown signal arrives
pub async fn run_runtime_controller(client: Client, ctx: Arc<Context>, concurrency: u16) {
    let runtimes: Api<Runtime> = Api::all(client);

    tracing::info!(concurrency, "- Runtime controller");

    Controller::new(runtimes, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .with_config(ControllerConfig::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("Runtime"))
        .await;
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
