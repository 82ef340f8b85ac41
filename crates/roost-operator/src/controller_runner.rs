//! Controller runner - builds controller futures for each vertical slice
//!
//! Each `build_*` function returns a Vec of boxed futures that can be
//! composed by the caller. This keeps controller construction pure and
//! testable. The kube runtime gives each controller level-triggered,
//! per-key serialized delivery over a bounded worker pool.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::ListParams;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};
use opentelemetry::KeyValue;

use roost_common::crd::{RoostConfigRequest, RoostInstance};
use roost_common::metrics::INSTANCES_TOTAL;
use roost_instance::InstanceContext;
use roost_selfconfig::ConfigContext;

/// Watcher timeout (seconds) - must be less than the client read timeout
/// so the API server closes idle watches before the client gives up.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// How often the per-phase occupancy gauge is sampled
const OCCUPANCY_SAMPLE_SECS: u64 = 60;

/// Build the RoostInstance controller future.
pub async fn build_instance_controller(
    client: Client,
    data_mover_image: String,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let ctx = Arc::new(InstanceContext::new(client.clone(), data_mover_image).await);
    let instances: Api<RoostInstance> = Api::all(client);

    tracing::info!("- RoostInstance controller");

    Box::pin(
        Controller::new(
            instances,
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
        )
        .shutdown_on_signal()
        .run(roost_instance::reconcile, roost_instance::error_policy, ctx)
        .for_each(log_reconcile_result("Instance")),
    )
}

/// Build the RoostConfigRequest controller future.
pub fn build_config_request_controller(
    client: Client,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let ctx = Arc::new(ConfigContext::new(client.clone()));
    let requests: Api<RoostConfigRequest> = Api::all(client);

    tracing::info!("- RoostConfigRequest controller");

    Box::pin(
        Controller::new(
            requests,
            WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
        )
        .shutdown_on_signal()
        .run(
            roost_selfconfig::reconcile,
            roost_selfconfig::error_policy,
            ctx,
        )
        .for_each(log_reconcile_result("ConfigRequest")),
    )
}

/// Build the per-phase occupancy sampler.
///
/// Gauges need absolute values, which no single reconcile can know, so a
/// periodic list records how many instances sit in each phase.
pub fn build_occupancy_sampler(client: Client) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let api: Api<RoostInstance> = Api::all(client);
        let mut ticker = tokio::time::interval(Duration::from_secs(OCCUPANCY_SAMPLE_SECS));
        loop {
            ticker.tick().await;
            match api.list(&ListParams::default()).await {
                Ok(list) => {
                    let mut by_phase: HashMap<&'static str, i64> = HashMap::new();
                    for instance in &list.items {
                        *by_phase.entry(instance.phase().as_str()).or_insert(0) += 1;
                    }
                    for (phase, count) in by_phase {
                        INSTANCES_TOTAL.record(count, &[KeyValue::new("phase", phase)]);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to sample instance occupancy");
                }
            }
        }
    })
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => {
                tracing::debug!(?action, "{} reconciliation completed", controller_name)
            }
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
