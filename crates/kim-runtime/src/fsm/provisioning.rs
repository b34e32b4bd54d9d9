//! Shoot creation, patching and waiting for Gardener

use chrono::Utc;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use kim_common::crd::{
    ConditionStatus, LastOperationState, LastOperationType, RuntimeConditionReason as Reason,
    RuntimeConditionType as Type, RuntimeState,
};
use kim_common::{labels, Error, RUNTIME_FINALIZER};
use kim_shoot::extender::oidc::{additional_oidcs, primary_oidc, structured_auth_config_map_name};
use kim_shoot::{classify_last_errors, combine_error_descriptions, workers_are_different};

use super::{
    api_failure, audit_log_data, fail, fail_with_reason, transient, State, Step,
    SystemState,
};
use crate::auth_config;
use crate::controller::Context;
use crate::registry_cache::{prune_registry_cache_secrets, sync_registry_cache_secrets};

pub(super) async fn initialize(s: &mut SystemState, ctx: &Context) -> Result<Step, Error> {
    if s.instance.is_deleting() {
        if !s.instance.has_finalizer(RUNTIME_FINALIZER) {
            debug!("runtime is being deleted and has no finalizer");
            return Ok(Step::Stop);
        }
        if s.instance.state() != Some(RuntimeState::Terminating) {
            s.status_mut().update_state_deletion(
                Type::Deprovisioned,
                ConditionStatus::Unknown,
                Reason::DeletionStarted,
                "Runtime deletion initialised",
            );
        }
        return Ok(Step::Switch(State::DeleteKubeconfig));
    }

    if !s.instance.has_finalizer(RUNTIME_FINALIZER) {
        ctx.kcp
            .add_finalizer(&s.namespace(), &s.name(), RUNTIME_FINALIZER)
            .await?;
        s.instance
            .metadata
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(RUNTIME_FINALIZER.to_string());
    }

    if s.instance.state().is_none() {
        s.status_mut().update_state_pending(
            Type::Provisioned,
            ConditionStatus::Unknown,
            Reason::Initialized,
            "Runtime initialised",
        );
    }

    Ok(Step::Switch(match s.shoot {
        None => State::CreateShoot,
        Some(_) => State::SelectShootProcessing,
    }))
}

fn provisioning_failure(s: &mut SystemState, ctx: &Context, reason: Reason, error: Error) -> Step {
    let after = ctx.config.gardener_requeue;
    api_failure(s, ctx, Type::Provisioned, reason, error, after)
}

/// Write the structured authentication ConfigMap the Shoot will reference
async fn apply_structured_auth(s: &SystemState, ctx: &Context) -> Result<(), Error> {
    let kubernetes = &ctx.config.converter.kubernetes;
    let mut oidcs = vec![primary_oidc(&s.instance, &kubernetes.default_operator_oidc)];
    oidcs.extend(additional_oidcs(&s.instance, &kubernetes.default_shared_ias_tenant));

    let config_map = auth_config::build_config_map(
        &structured_auth_config_map_name(&s.instance.spec.shoot.name),
        &ctx.config.shoot_namespace(),
        &s.runtime_id(),
        &oidcs,
    )?;
    ctx.garden.apply_config_map(&config_map).await
}

pub(super) async fn create_shoot(s: &mut SystemState, ctx: &Context) -> Result<Step, Error> {
    if s.instance.annotation(labels::OPERATION_STARTED).is_none() {
        // The annotation change triggers the next reconcile, which sees a
        // settled cache before the Shoot is created.
        ctx.kcp
            .set_runtime_annotation(
                &s.namespace(),
                &s.name(),
                labels::OPERATION_STARTED,
                &Utc::now().to_rfc3339(),
            )
            .await?;
        return Ok(Step::Stop);
    }

    let audit_log = match audit_log_data(&s.instance, ctx) {
        Ok(data) => data,
        Err(e) => return Ok(fail(s, ctx, Type::Provisioned, Reason::AuditLogError, e.to_string())),
    };

    if ctx.config.structured_auth() {
        if let Err(e) = apply_structured_auth(s, ctx).await {
            return Ok(provisioning_failure(s, ctx, Reason::KubernetesApiErr, e));
        }
    }

    let shoot = match ctx.converter.to_shoot(&s.instance, audit_log.as_ref()) {
        Ok(shoot) => shoot,
        Err(e) => return Ok(fail(s, ctx, Type::Provisioned, Reason::ConversionError, e.to_string())),
    };

    match ctx.garden.create_shoot(&shoot).await {
        Ok(_) => info!(shoot = %shoot.name_any(), "shoot created"),
        Err(e) if e.is_already_exists() => {
            info!(shoot = %shoot.name_any(), "shoot already exists, waiting for the cache");
        }
        Err(e) => {
            return Ok(provisioning_failure(s, ctx, Reason::KubernetesApiErr, e));
        }
    }

    s.status_mut().update_state_pending(
        Type::Provisioned,
        ConditionStatus::Unknown,
        Reason::ShootCreationPending,
        "Shoot is pending",
    );
    Ok(Step::Requeue(ctx.config.gardener_requeue))
}

/// Runtime generation recorded on the Shoot by the last patch
fn applied_generation(s: &SystemState) -> i64 {
    s.shoot
        .as_ref()
        .and_then(|shoot| shoot.annotation(labels::SHOOT_RUNTIME_GENERATION))
        .and_then(|g| g.parse().ok())
        .unwrap_or(0)
}

pub(super) fn select_shoot_processing(s: &mut SystemState, ctx: &Context) -> Result<Step, Error> {
    let Some(shoot) = s.shoot.as_ref() else {
        return Ok(Step::Switch(State::CreateShoot));
    };
    let Some(operation) = shoot.last_operation() else {
        debug!("shoot has no last operation yet");
        return Ok(Step::Requeue(ctx.config.gardener_requeue));
    };
    if shoot.domain().is_none() {
        debug!("shoot has no domain yet");
        return Ok(Step::Requeue(ctx.config.gardener_requeue));
    }
    let operation_type = operation.operation_type();

    if s.instance.annotation_is_true(labels::SUSPEND_PATCH_RECONCILIATION) {
        info!("patch reconciliation is suspended");
        return Ok(Step::Stop);
    }

    let generation = s.instance.metadata.generation.unwrap_or(0);
    if s.instance.annotation_is_true(labels::FORCE_PATCH_RECONCILIATION)
        || generation > applied_generation(s)
    {
        return Ok(Step::Switch(State::PatchExistingShoot));
    }

    if s.instance.state() == Some(RuntimeState::Failed) {
        debug!("runtime failed and its spec did not change");
        return Ok(Step::Stop);
    }

    match operation_type {
        LastOperationType::Create => Ok(Step::Switch(State::WaitForShootCreation)),
        LastOperationType::Reconcile => Ok(Step::Switch(State::WaitForShootReconcile)),
        other => {
            info!(operation = ?other, "shoot operation is not handled, waiting");
            Ok(Step::Requeue(ctx.config.gardener_requeue))
        }
    }
}

/// Conflicts requeue silently; other errors are transient or terminal
fn patch_failure(s: &mut SystemState, ctx: &Context, error: Error) -> Step {
    if error.is_conflict() {
        info!(error = %error, "shoot was modified concurrently, retrying");
        return Step::Requeue(ctx.config.gardener_requeue);
    }
    provisioning_failure(s, ctx, Reason::GardenerError, error)
}

pub(super) async fn patch_existing_shoot(
    s: &mut SystemState,
    ctx: &Context,
) -> Result<Step, Error> {
    let Some(observed) = s.shoot.clone() else {
        return Ok(Step::Switch(State::CreateShoot));
    };

    let audit_log = match audit_log_data(&s.instance, ctx) {
        Ok(data) => data,
        Err(e) => return Ok(fail(s, ctx, Type::Provisioned, Reason::AuditLogError, e.to_string())),
    };

    let registry_cache = ctx.config.registry_cache() && !s.instance.caches().is_empty();
    if registry_cache {
        let synced = match s.skr(ctx).await {
            Ok(skr) => {
                sync_registry_cache_secrets(&s.instance, ctx.garden.as_ref(), skr.as_ref()).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = synced {
            return Ok(provisioning_failure(s, ctx, Reason::RegistryCacheError, e));
        }
    }

    if ctx.config.structured_auth() {
        if let Err(e) = apply_structured_auth(s, ctx).await {
            return Ok(provisioning_failure(s, ctx, Reason::KubernetesApiErr, e));
        }
    }

    let desired = match ctx
        .converter
        .to_patched_shoot(&s.instance, &observed, audit_log.as_ref())
    {
        Ok(shoot) => shoot,
        Err(e) => return Ok(fail(s, ctx, Type::Provisioned, Reason::ConversionError, e.to_string())),
    };

    // Server-side apply merges list entries by name and cannot drop a worker
    // pool, so worker changes go through a full update first.
    if workers_are_different(&observed.spec.provider.workers, &desired.spec.provider.workers) {
        let mut updated = observed.clone();
        updated.metadata.managed_fields = None;
        updated.spec.provider.workers = desired.spec.provider.workers.clone();
        if let Err(e) = ctx.garden.update_shoot(&updated).await {
            return Ok(patch_failure(s, ctx, e));
        }
        info!(shoot = %observed.name_any(), "shoot workers updated");
    }

    if let Err(e) = ctx.garden.apply_shoot(&desired).await {
        return Ok(patch_failure(s, ctx, e));
    }
    info!(shoot = %desired.name_any(), "shoot patched");

    if s.instance.annotation(labels::FORCE_PATCH_RECONCILIATION).is_some() {
        ctx.kcp
            .remove_runtime_annotation(
                &s.namespace(),
                &s.name(),
                labels::FORCE_PATCH_RECONCILIATION,
            )
            .await?;
    }

    if ctx.config.registry_cache() {
        if let Err(e) = prune_registry_cache_secrets(&s.instance, ctx.garden.as_ref(), true).await {
            warn!(error = %e, "failed to prune registry cache secrets");
        }
    }

    s.status_mut().update_state_pending(
        Type::Provisioned,
        ConditionStatus::Unknown,
        Reason::ProcessingShootPatch,
        "Shoot is pending for update",
    );
    Ok(Step::Requeue(ctx.config.gardener_requeue))
}

/// Follow the Gardener operation started by a create or patch
pub(super) fn wait_for_shoot(
    s: &mut SystemState,
    ctx: &Context,
    creation: bool,
) -> Result<Step, Error> {
    let Some(shoot) = s.shoot.as_ref() else {
        return Ok(Step::Requeue(ctx.config.gardener_requeue));
    };
    let Some(operation) = shoot.last_operation().cloned() else {
        return Ok(Step::Requeue(ctx.config.gardener_requeue));
    };
    let errors = shoot.last_errors().to_vec();

    let status = s.status_mut();
    status.shoot_last_operation = Some(operation.clone());
    status.shoot_last_errors = errors.clone();

    let (in_progress, completed) = if creation {
        (Reason::ShootCreationPending, Reason::ShootCreationCompleted)
    } else {
        (Reason::ProcessingShootPatch, Reason::ProcessingCompleted)
    };

    match operation.operation_state() {
        LastOperationState::Succeeded => {
            s.status_mut().update_state_pending(
                Type::Provisioned,
                ConditionStatus::True,
                completed,
                if creation {
                    "Shoot creation completed"
                } else {
                    "Shoot update completed"
                },
            );
            Ok(Step::Switch(if creation {
                State::CreateKubeconfig
            } else {
                State::HandleKubeconfig
            }))
        }
        LastOperationState::Failed => {
            let classification = classify_last_errors(&errors);
            let message = format!(
                "{}: {}",
                classification.reason,
                combine_error_descriptions(&errors)
            );
            if classification.retryable {
                Ok(transient(
                    s,
                    Type::Provisioned,
                    Reason::GardenerError,
                    message,
                    ctx.config.gardener_requeue,
                ))
            } else {
                let reason = match classification.reason.as_str() {
                    "" => Reason::GardenerError.as_str(),
                    codes => codes,
                };
                Ok(fail_with_reason(s, ctx, Type::Provisioned, reason, message))
            }
        }
        state => {
            debug!(?state, progress = operation.progress, "shoot operation in progress");
            s.status_mut().update_state_pending(
                Type::Provisioned,
                ConditionStatus::Unknown,
                in_progress,
                format!("Shoot operation {} is {}", operation.type_, operation.state),
            );
            Ok(Step::Requeue(ctx.config.gardener_requeue))
        }
    }
}
