//! Runtime reconciliation state machine
//!
//! One reconcile walks a sequence of [`State`]s. Each state either switches
//! to the next state without returning to the controller, asks for a requeue,
//! or stops. Status changes are collected on the in-memory Runtime and
//! written once, when the walk ends, and only if they differ from the status
//! observed on entry.

mod configure;
mod deprovisioning;
mod kubeconfig;
mod provisioning;

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use kim_common::crd::{Runtime, RuntimeConditionReason, RuntimeConditionType, RuntimeStatus, Shoot};
use kim_common::Error;
use kim_shoot::AuditLogData;

use crate::controller::Context;
use crate::skr::SkrClient;

/// States of one reconcile
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum State {
    TakeSnapshot,
    Initialize,
    CreateShoot,
    SelectShootProcessing,
    PatchExistingShoot,
    WaitForShootCreation,
    WaitForShootReconcile,
    CreateKubeconfig,
    HandleKubeconfig,
    ConfigureSkr,
    ApplyClusterRoleBindings,
    ApplyRuntimeBootstrapper,
    DeleteKubeconfig,
    DeleteShoot,
}

/// Outcome of a single state
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// Continue with another state in the same reconcile
    Switch(State),
    /// End the reconcile and run again after the given delay
    Requeue(Duration),
    /// End the reconcile and wait for the next change
    Stop,
}

/// Everything one reconcile knows about its runtime
pub(crate) struct SystemState {
    /// Runtime as read at the start, with status updates applied in memory
    pub instance: Runtime,
    /// Status observed on entry
    pub snapshot: RuntimeStatus,
    /// Shoot observed on entry
    pub shoot: Option<Shoot>,
    /// Set once the finalizer is gone and the Runtime may vanish
    pub finalizer_removed: bool,
    skr: Option<Arc<dyn SkrClient>>,
}

impl SystemState {
    fn new(instance: Runtime) -> Self {
        Self {
            instance,
            snapshot: RuntimeStatus::default(),
            shoot: None,
            finalizer_removed: false,
            skr: None,
        }
    }

    pub fn status_mut(&mut self) -> &mut RuntimeStatus {
        self.instance.status.get_or_insert_with(RuntimeStatus::default)
    }

    pub fn namespace(&self) -> String {
        self.instance.namespace().unwrap_or_default()
    }

    pub fn name(&self) -> String {
        self.instance.name_any()
    }

    pub fn runtime_id(&self) -> String {
        self.instance
            .runtime_id()
            .map(str::to_string)
            .unwrap_or_else(|_| self.name())
    }

    /// Client for the runtime's cluster, resolved once per reconcile
    pub async fn skr(&mut self, ctx: &Context) -> Result<Arc<dyn SkrClient>, Error> {
        if let Some(client) = &self.skr {
            return Ok(client.clone());
        }
        let client = ctx.skr.resolve(&self.instance).await?;
        self.skr = Some(client.clone());
        Ok(client)
    }
}

/// Drive a Runtime through the state machine
pub(crate) async fn run(runtime: Runtime, ctx: &Context) -> Result<Action, Error> {
    let mut s = SystemState::new(runtime);
    let mut state = State::TakeSnapshot;

    let outcome = loop {
        debug!(?state, "entering state");
        match step(state, &mut s, ctx).await {
            Ok(Step::Switch(next)) => state = next,
            Ok(Step::Requeue(after)) => break Ok(Action::requeue(after)),
            Ok(Step::Stop) => break Ok(Action::await_change()),
            Err(e) => break Err(e),
        }
    };

    let persisted = persist_status(&s, ctx).await;
    let action = outcome?;
    persisted?;
    Ok(action)
}

async fn step(state: State, s: &mut SystemState, ctx: &Context) -> Result<Step, Error> {
    match state {
        State::TakeSnapshot => take_snapshot(s, ctx).await,
        State::Initialize => provisioning::initialize(s, ctx).await,
        State::CreateShoot => provisioning::create_shoot(s, ctx).await,
        State::SelectShootProcessing => provisioning::select_shoot_processing(s, ctx),
        State::PatchExistingShoot => provisioning::patch_existing_shoot(s, ctx).await,
        State::WaitForShootCreation => provisioning::wait_for_shoot(s, ctx, true),
        State::WaitForShootReconcile => provisioning::wait_for_shoot(s, ctx, false),
        State::CreateKubeconfig => kubeconfig::ensure_kubeconfig(s, ctx, false).await,
        State::HandleKubeconfig => kubeconfig::ensure_kubeconfig(s, ctx, true).await,
        State::ConfigureSkr => configure::configure_skr(s, ctx).await,
        State::ApplyClusterRoleBindings => configure::apply_cluster_role_bindings(s, ctx).await,
        State::ApplyRuntimeBootstrapper => configure::apply_runtime_bootstrapper(s, ctx).await,
        State::DeleteKubeconfig => deprovisioning::delete_kubeconfig(s, ctx).await,
        State::DeleteShoot => deprovisioning::delete_shoot(s, ctx).await,
    }
}

async fn take_snapshot(s: &mut SystemState, ctx: &Context) -> Result<Step, Error> {
    s.snapshot = s.instance.status.clone().unwrap_or_default();
    s.shoot = ctx.garden.get_shoot(&s.instance.spec.shoot.name).await?;
    Ok(Step::Switch(State::Initialize))
}

async fn persist_status(s: &SystemState, ctx: &Context) -> Result<(), Error> {
    if s.finalizer_removed {
        return Ok(());
    }
    let status = s.instance.status.clone().unwrap_or_default();
    if status != s.snapshot {
        debug!(state = ?status.state, "updating runtime status");
        match ctx
            .kcp
            .patch_runtime_status(&s.namespace(), &s.name(), &status)
            .await
        {
            Err(e) if e.is_not_found() => return Ok(()),
            other => other?,
        }
    }
    ctx.metrics.set_runtime_state(&s.instance);
    ctx.metrics.set_pending_state_duration(&s.instance);
    Ok(())
}

/// Mark the runtime Failed and stop without requeue
pub(crate) fn fail(
    s: &mut SystemState,
    ctx: &Context,
    type_: RuntimeConditionType,
    reason: RuntimeConditionReason,
    message: impl Into<String>,
) -> Step {
    fail_with_reason(s, ctx, type_, reason.as_str(), message)
}

/// Like [`fail`], with a free-form reason that also labels the stop metric
pub(crate) fn fail_with_reason(
    s: &mut SystemState,
    ctx: &Context,
    type_: RuntimeConditionType,
    reason: &str,
    message: impl Into<String>,
) -> Step {
    let message = message.into();
    warn!(runtime_id = %s.runtime_id(), %reason, %message, "reconcile stopped on a non-retryable error");
    s.status_mut()
        .update_state_failed_with_reason(type_, reason, message);
    ctx.metrics.increment_fsm_stop(&s.runtime_id(), reason);
    Step::Stop
}

/// Record a retryable problem and requeue
pub(crate) fn transient(
    s: &mut SystemState,
    type_: RuntimeConditionType,
    reason: RuntimeConditionReason,
    message: impl Into<String>,
    after: Duration,
) -> Step {
    let message = message.into();
    info!(runtime_id = %s.runtime_id(), %reason, %message, "retrying after a transient error");
    s.status_mut().update_state_transient(type_, reason, message);
    Step::Requeue(after)
}

/// Transient or terminal, depending on the error
pub(crate) fn api_failure(
    s: &mut SystemState,
    ctx: &Context,
    type_: RuntimeConditionType,
    reason: RuntimeConditionReason,
    error: Error,
    after: Duration,
) -> Step {
    if error.is_retryable() {
        transient(s, type_, reason, error.to_string(), after)
    } else {
        fail(s, ctx, type_, reason, error.to_string())
    }
}

/// Audit log tenant for the runtime's provider region.
///
/// A missing tenant only fails the reconcile when audit logging is
/// mandatory.
pub(crate) fn audit_log_data(
    runtime: &Runtime,
    ctx: &Context,
) -> Result<Option<AuditLogData>, Error> {
    let provider = &runtime.spec.shoot.provider.type_;
    let region = &runtime.spec.shoot.region;
    match ctx.config.audit_log_table.get(provider, region) {
        Ok(data) => Ok(Some(data.clone())),
        Err(e) if ctx.config.converter.audit_log.mandatory => Err(e),
        Err(e) => {
            warn!(error = %e, "audit log is not configured, continuing without it");
            Ok(None)
        }
    }
}
