//! RoostConfigRequest controller implementation
//!
//! Reconciles configuration change requests through a one-way state
//! machine: Pending → Applied / Failed / Denied. Terminal requests are
//! retained for a fixed window and then deleted by this same reconciler —
//! the TTL is self-managed, not delegated to any external sweeper.
//!
//! The apply step is the one place in the operator where two reconcilers
//! are expected to race on one object (this pipeline and the phase
//! controller both write the instance), so it runs under an explicit
//! optimistic-concurrency loop: re-fetch, mutate, conditional replace,
//! retry on version conflict with bounded exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use opentelemetry::KeyValue;
use tracing::{debug, error, info, instrument, warn};

use roost_common::crd::{
    RequestPhase, RoostConfigRequest, RoostConfigRequestStatus, RoostInstance,
};
use roost_common::events::{actions as event_actions, reasons, EventPublisher, KubeEventPublisher};
use roost_common::metrics::CONFIG_REQUESTS;
use roost_common::{Error, Result};

use crate::actions::{classify, denied_categories, format_categories};
use crate::mutate::apply_mutations;

/// How long a terminal request is retained before self-deletion
pub const TERMINAL_RETENTION: Duration = Duration::from_secs(3600);

/// Maximum optimistic-concurrency attempts before failing terminally
const MAX_CONFLICT_ATTEMPTS: u32 = 5;

/// Base delay for the conflict backoff
const CONFLICT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Field manager for this controller's writes
const FIELD_MANAGER: &str = "roost-selfconfig";

/// Shared context for the RoostConfigRequest controller
pub struct ConfigContext {
    /// Kubernetes client
    pub client: Client,
    /// Event publisher for both the request and its parent
    pub events: Arc<dyn EventPublisher>,
}

impl ConfigContext {
    /// Create a new context with the production event publisher
    pub fn new(client: Client) -> Self {
        let events = Arc::new(KubeEventPublisher::new(
            client.clone(),
            "roost-selfconfig-controller",
        ));
        Self { client, events }
    }
}

/// Error policy for the controller: log and requeue.
pub fn error_policy(
    request: Arc<RoostConfigRequest>,
    error: &Error,
    _ctx: Arc<ConfigContext>,
) -> Action {
    error!(
        ?error,
        request = %request.name_any(),
        "config request reconciliation failed"
    );
    Action::requeue(Duration::from_secs(30))
}

/// Reconcile a RoostConfigRequest.
#[instrument(skip(request, ctx), fields(request = %request.name_any()))]
pub async fn reconcile(
    request: Arc<RoostConfigRequest>,
    ctx: Arc<ConfigContext>,
) -> Result<Action> {
    let name = request.name_any();
    let namespace = request
        .namespace()
        .ok_or_else(|| Error::validation("RoostConfigRequest must be namespaced"))?;

    if request.is_terminal() {
        return sweep_terminal(&request, &name, &namespace, &ctx).await;
    }

    // Resolve the parent. A missing instance is terminal: the request can
    // never become appliable by waiting.
    let instances: Api<RoostInstance> = Api::namespaced(ctx.client.clone(), &namespace);
    let Some(instance) = instances.get_opt(&request.spec.instance).await? else {
        info!(instance = %request.spec.instance, "parent instance not found, failing request");
        return finish(
            &request,
            &name,
            &namespace,
            &ctx,
            RequestPhase::Failed,
            format!("instance not found: {}", request.spec.instance),
        )
        .await;
    };

    // Policy gate: opt-in first, then the category allow-list.
    let Some(policy) = instance
        .spec
        .self_config
        .clone()
        .filter(|p| p.enabled)
    else {
        return finish(
            &request,
            &name,
            &namespace,
            &ctx,
            RequestPhase::Denied,
            "instance has not opted into self-configuration",
        )
        .await;
    };

    let categories = classify(&request.spec);
    if categories.is_empty() {
        return finish(
            &request,
            &name,
            &namespace,
            &ctx,
            RequestPhase::Failed,
            "no actions requested",
        )
        .await;
    }

    let denied = denied_categories(&categories, &policy);
    if !denied.is_empty() {
        return finish(
            &request,
            &name,
            &namespace,
            &ctx,
            RequestPhase::Denied,
            format!(
                "categories not allowed by instance policy: {}",
                format_categories(&denied)
            ),
        )
        .await;
    }

    match apply_with_retry(&instances, &request, &namespace).await {
        Ok(applied) => {
            attach_owner_link(&instances, &request, &name, &namespace, &ctx.client).await;
            ctx.events
                .publish(
                    &applied.object_ref(&()),
                    EventType::Normal,
                    reasons::CONFIG_APPLIED,
                    event_actions::SELF_CONFIGURE,
                    Some(format!("applied configuration change request {}", name)),
                )
                .await;
            finish(
                &request,
                &name,
                &namespace,
                &ctx,
                RequestPhase::Applied,
                format!("applied: {}", format_categories(&categories.into_iter().collect::<Vec<_>>())),
            )
            .await
        }
        Err(e) if matches!(e, Error::Policy { .. }) => {
            finish(
                &request,
                &name,
                &namespace,
                &ctx,
                RequestPhase::Denied,
                e.to_string(),
            )
            .await
        }
        Err(e) => {
            warn!(error = %e, "config request apply failed terminally");
            finish(
                &request,
                &name,
                &namespace,
                &ctx,
                RequestPhase::Failed,
                e.to_string(),
            )
            .await
        }
    }
}

/// The optimistic-concurrency apply loop.
///
/// Each attempt re-fetches the parent fresh, applies every requested
/// mutation to that copy, and submits a conditional replace keyed on the
/// fetched `resourceVersion`. A 409 conflict retries from the re-fetch
/// with exponential backoff; any other error, or retry exhaustion, is
/// terminal for the request.
async fn apply_with_retry(
    instances: &Api<RoostInstance>,
    request: &RoostConfigRequest,
    namespace: &str,
) -> Result<RoostInstance> {
    let mut delay = CONFLICT_BASE_DELAY;

    for attempt in 1..=MAX_CONFLICT_ATTEMPTS {
        let mut fresh = instances.get(&request.spec.instance).await?;
        apply_mutations(&mut fresh.spec, &request.spec.instance, &request.spec)?;

        match instances
            .replace(&request.spec.instance, &PostParams::default(), &fresh)
            .await
        {
            Ok(applied) => {
                debug!(
                    instance = %request.spec.instance,
                    namespace = %namespace,
                    attempt,
                    "instance spec updated"
                );
                return Ok(applied);
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 && attempt < MAX_CONFLICT_ATTEMPTS => {
                debug!(
                    instance = %request.spec.instance,
                    attempt,
                    delay_ms = delay.as_millis(),
                    "version conflict, retrying from a fresh read"
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::internal_with_context(
        "selfconfig",
        format!(
            "gave up after {} conflicting writes to {}",
            MAX_CONFLICT_ATTEMPTS, request.spec.instance
        ),
    ))
}

/// Best-effort ownership link from the parent to the request, so the
/// request is garbage-collected if the parent disappears. Attached only
/// after a successful apply, never before.
async fn attach_owner_link(
    instances: &Api<RoostInstance>,
    request: &RoostConfigRequest,
    name: &str,
    namespace: &str,
    client: &Client,
) {
    let Ok(instance) = instances.get(&request.spec.instance).await else {
        return;
    };
    let Some(uid) = instance.metadata.uid.clone() else {
        return;
    };

    let patch = serde_json::json!({
        "metadata": {
            "ownerReferences": [{
                "apiVersion": "roost.dev/v1alpha1",
                "kind": "RoostInstance",
                "name": request.spec.instance,
                "uid": uid,
            }]
        }
    });
    let requests: Api<RoostConfigRequest> = Api::namespaced(client.clone(), namespace);
    if let Err(e) = requests
        .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await
    {
        warn!(request = %name, error = %e, "failed to attach owner reference");
    }
}

/// Record a terminal phase, emit the matching event, and schedule the
/// retention sweep.
async fn finish(
    request: &RoostConfigRequest,
    name: &str,
    namespace: &str,
    ctx: &ConfigContext,
    phase: RequestPhase,
    message: impl Into<String>,
) -> Result<Action> {
    let message = message.into();
    let status = RoostConfigRequestStatus::terminal(phase.clone(), message.clone());

    let api: Api<RoostConfigRequest> = Api::namespaced(ctx.client.clone(), namespace);
    let patch = serde_json::json!({ "status": status });
    api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;

    let (event_type, reason, outcome) = match phase {
        RequestPhase::Applied => (EventType::Normal, reasons::CONFIG_APPLIED, "applied"),
        RequestPhase::Denied => (EventType::Warning, reasons::CONFIG_DENIED, "denied"),
        _ => (EventType::Warning, reasons::CONFIG_DENIED, "failed"),
    };
    ctx.events
        .publish(
            &request.object_ref(&()),
            event_type,
            reason,
            event_actions::SELF_CONFIGURE,
            Some(message.clone()),
        )
        .await;
    CONFIG_REQUESTS.add(1, &[KeyValue::new("outcome", outcome)]);

    info!(request = %name, phase = %phase, message = %message, "config request finished");
    Ok(Action::requeue(TERMINAL_RETENTION))
}

/// Delete a terminal request once its retention window has expired; until
/// then, wake up exactly at expiry.
async fn sweep_terminal(
    request: &RoostConfigRequest,
    name: &str,
    namespace: &str,
    ctx: &ConfigContext,
) -> Result<Action> {
    let completed = request
        .status
        .as_ref()
        .and_then(|s| s.completion_time)
        .unwrap_or_else(Utc::now);

    let expiry = completed
        + chrono::Duration::from_std(TERMINAL_RETENTION)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
    let now = Utc::now();

    if now < expiry {
        let remaining = (expiry - now)
            .to_std()
            .unwrap_or(Duration::from_secs(1));
        debug!(request = %name, ?remaining, "terminal request retained, sleeping until expiry");
        return Ok(Action::requeue(remaining));
    }

    info!(request = %name, "retention window expired, deleting terminal request");
    let api: Api<RoostConfigRequest> = Api::namespaced(ctx.client.clone(), namespace);
    match api.delete(name, &Default::default()).await {
        Ok(_) => Ok(Action::await_change()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(Action::await_change()),
        Err(e) => Err(e.into()),
    }
}
