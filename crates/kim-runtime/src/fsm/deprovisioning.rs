//! Teardown: GardenerCluster first, then the Shoot, then the finalizer

use kube::ResourceExt;
use tracing::{debug, info};

use kim_common::crd::{ConditionStatus, RuntimeConditionReason as Reason, RuntimeConditionType as Type};
use kim_common::{labels, Error, RUNTIME_FINALIZER};
use kim_shoot::extender::oidc::structured_auth_config_map_name;

use super::{State, Step, SystemState};
use crate::controller::Context;
use crate::registry_cache::prune_registry_cache_secrets;

pub(super) async fn delete_kubeconfig(s: &mut SystemState, ctx: &Context) -> Result<Step, Error> {
    let Ok(runtime_id) = s.instance.runtime_id().map(str::to_string) else {
        debug!("runtime has no id, no gardener cluster to delete");
        return Ok(Step::Switch(State::DeleteShoot));
    };
    let namespace = s.namespace();

    match ctx.kcp.get_gardener_cluster(&namespace, &runtime_id).await? {
        None => {
            s.status_mut().update_state_deletion(
                Type::Deprovisioned,
                ConditionStatus::Unknown,
                Reason::KubeconfigDeleted,
                "Gardener Cluster CR deleted",
            );
            Ok(Step::Switch(State::DeleteShoot))
        }
        Some(cluster) => {
            if cluster.metadata.deletion_timestamp.is_none() {
                ctx.kcp
                    .delete_gardener_cluster(&namespace, &runtime_id)
                    .await?;
                info!(runtime_id, "gardener cluster deletion requested");
            }
            Ok(Step::Requeue(ctx.config.control_plane_delete_requeue))
        }
    }
}

pub(super) async fn delete_shoot(s: &mut SystemState, ctx: &Context) -> Result<Step, Error> {
    let Some(shoot) = s.shoot.clone() else {
        if ctx.config.registry_cache() && s.instance.runtime_id().is_ok() {
            prune_registry_cache_secrets(&s.instance, ctx.garden.as_ref(), false).await?;
        }
        ctx.kcp
            .remove_finalizer(&s.namespace(), &s.name(), RUNTIME_FINALIZER)
            .await?;
        s.finalizer_removed = true;
        ctx.metrics.cleanup_runtime(&s.runtime_id());
        s.status_mut().update_state_deletion(
            Type::Deprovisioned,
            ConditionStatus::True,
            Reason::Deleted,
            "Runtime deleted",
        );
        info!(runtime_id = %s.runtime_id(), "runtime deprovisioned, finalizer removed");
        return Ok(Step::Stop);
    };

    let after = ctx.config.gardener_requeue;
    if shoot.metadata.deletion_timestamp.is_some() {
        debug!(shoot = %shoot.name_any(), "waiting for shoot deletion");
        s.status_mut().update_state_deletion(
            Type::Deprovisioned,
            ConditionStatus::Unknown,
            Reason::ShootDeletionStarted,
            "Shoot deletion in progress",
        );
        return Ok(Step::Requeue(after));
    }

    let name = shoot.name_any();
    if shoot.annotation(labels::CONFIRM_DELETION) != Some("true") {
        ctx.garden.confirm_shoot_deletion(&name).await?;
    }
    if ctx.config.structured_auth() {
        ctx.garden
            .delete_config_map(&structured_auth_config_map_name(&name))
            .await?;
    }
    ctx.garden.delete_shoot(&name).await?;
    info!(shoot = %name, "shoot deletion requested");

    s.status_mut().update_state_deletion(
        Type::Deprovisioned,
        ConditionStatus::Unknown,
        Reason::ShootDeletionStarted,
        "Shoot deletion started",
    );
    Ok(Step::Requeue(after))
}
