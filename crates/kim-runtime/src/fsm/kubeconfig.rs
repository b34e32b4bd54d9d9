//! GardenerCluster handling: the kubeconfig of the SKR

use std::collections::BTreeMap;

use chrono::DateTime;
use kube::api::ObjectMeta;
use tracing::{debug, info};

use kim_common::crd::{
    ConditionStatus, GardenerCluster, GardenerClusterSpec, GardenerClusterState, KubeconfigSpec,
    RuntimeConditionReason as Reason, RuntimeConditionType as Type, SecretKeyRef, Shoot, ShootRef,
};
use kim_common::{labels, Error};

use super::{api_failure, State, Step, SystemState};
use crate::controller::Context;
use crate::skr::{kubeconfig_secret_name, KUBECONFIG_SECRET_KEY};

/// GardenerCluster requesting the kubeconfig of a runtime's Shoot
pub(crate) fn build_gardener_cluster(
    s: &SystemState,
    runtime_id: &str,
    shoot: &Shoot,
) -> GardenerCluster {
    let namespace = s.namespace();
    let mut cluster = GardenerCluster::new(
        runtime_id,
        GardenerClusterSpec {
            kubeconfig: KubeconfigSpec {
                secret: SecretKeyRef {
                    name: kubeconfig_secret_name(runtime_id),
                    namespace: namespace.clone(),
                    key: KUBECONFIG_SECRET_KEY.to_string(),
                },
            },
            shoot: ShootRef {
                name: s.instance.spec.shoot.name.clone(),
            },
        },
    );
    let annotations = shoot
        .domain()
        .map(|d| BTreeMap::from([(labels::SHOOT_DOMAIN.to_string(), d.to_string())]));
    cluster.metadata = ObjectMeta {
        namespace: Some(namespace),
        labels: Some(s.instance.propagated_labels()),
        annotations,
        ..cluster.metadata
    };
    cluster
}

fn kcp_failure(s: &mut SystemState, ctx: &Context, error: Error) -> Step {
    let after = ctx.config.control_plane_requeue;
    api_failure(s, ctx, Type::KubeconfigReady, Reason::KubernetesApiErr, error, after)
}

/// Create the GardenerCluster or wait for it to report the kubeconfig.
///
/// With `update` set the runtime existed before, so a GardenerCluster that
/// is not ready does not demote a Ready runtime.
pub(super) async fn ensure_kubeconfig(
    s: &mut SystemState,
    ctx: &Context,
    update: bool,
) -> Result<Step, Error> {
    let runtime_id = s.instance.runtime_id()?.to_string();
    let namespace = s.namespace();
    let after = ctx.config.control_plane_requeue;
    let Some(shoot) = s.shoot.clone() else {
        return Ok(Step::Requeue(after));
    };
    let desired = build_gardener_cluster(s, &runtime_id, &shoot);

    let existing = match ctx.kcp.get_gardener_cluster(&namespace, &runtime_id).await {
        Ok(existing) => existing,
        Err(e) => return Ok(kcp_failure(s, ctx, e)),
    };

    let Some(cluster) = existing else {
        if let Err(e) = ctx.kcp.create_gardener_cluster(&desired).await {
            return Ok(kcp_failure(s, ctx, e));
        }
        info!(runtime_id, "gardener cluster created");
        s.status_mut().update_state_pending(
            Type::KubeconfigReady,
            ConditionStatus::Unknown,
            Reason::GardenerCrCreated,
            "Gardener Cluster CR created, waiting for readiness",
        );
        return Ok(Step::Requeue(after));
    };

    if cluster.spec != desired.spec {
        if let Err(e) = ctx
            .kcp
            .update_gardener_cluster_spec(&namespace, &runtime_id, &desired.spec)
            .await
        {
            return Ok(kcp_failure(s, ctx, e));
        }
        debug!(runtime_id, "gardener cluster spec updated");
    }

    let state = cluster.state();
    let shoot_name = s.instance.spec.shoot.name.clone();
    ctx.metrics
        .set_gardener_cluster_state(&runtime_id, &shoot_name, state);

    if state != GardenerClusterState::Ready {
        let message = format!("Gardener Cluster CR is {}, waiting for readiness", state.as_str());
        if update {
            s.status_mut()
                .update_state_transient(Type::KubeconfigReady, Reason::GardenerCrCreated, message);
        } else {
            s.status_mut().update_state_pending(
                Type::KubeconfigReady,
                ConditionStatus::Unknown,
                Reason::GardenerCrCreated,
                message,
            );
        }
        return Ok(Step::Requeue(after));
    }

    s.status_mut().set_condition(
        Type::KubeconfigReady,
        ConditionStatus::True,
        Reason::GardenerCrReady,
        "Gardener Cluster CR is ready",
    );
    record_kubeconfig_expiration(s, ctx, &runtime_id, &shoot_name).await;
    Ok(Step::Switch(State::ConfigureSkr))
}

/// Expiration is last rotation plus the rotation period; a secret without
/// a rotation timestamp is skipped
async fn record_kubeconfig_expiration(
    s: &SystemState,
    ctx: &Context,
    runtime_id: &str,
    shoot_name: &str,
) {
    let secret = match ctx
        .kcp
        .get_secret(&s.namespace(), &kubeconfig_secret_name(runtime_id))
        .await
    {
        Ok(Some(secret)) => secret,
        Ok(None) => return,
        Err(e) => {
            debug!(error = %e, "kubeconfig secret not readable, expiration not recorded");
            return;
        }
    };
    let Some(last_sync) = secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(labels::KUBECONFIG_LAST_SYNC))
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
    else {
        return;
    };
    let period = chrono::Duration::from_std(ctx.config.kubeconfig_rotation_period)
        .unwrap_or_else(|_| chrono::Duration::hours(24));
    let expires_at = (last_sync + period).timestamp();
    ctx.metrics
        .set_kubeconfig_expiration(runtime_id, shoot_name, expires_at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{runtime, shoot};

    #[test]
    fn gardener_cluster_references_secret_and_shoot() {
        let s = SystemState::new(runtime("rt-1"));
        let cluster = build_gardener_cluster(&s, "rt-1", &shoot("c-1"));

        assert_eq!(cluster.metadata.name.as_deref(), Some("rt-1"));
        assert_eq!(cluster.metadata.namespace.as_deref(), Some("kcp-system"));
        assert_eq!(cluster.spec.kubeconfig.secret.name, "kubeconfig-rt-1");
        assert_eq!(cluster.spec.kubeconfig.secret.key, "config");
        assert_eq!(cluster.spec.shoot.name, "c-1");
        let annotations = cluster.metadata.annotations.unwrap();
        assert_eq!(annotations[labels::SHOOT_DOMAIN], "c-1.kyma.example.com");
        let cluster_labels = cluster.metadata.labels.unwrap();
        assert_eq!(cluster_labels[labels::RUNTIME_ID], "rt-1");
        assert_eq!(cluster_labels[labels::GLOBAL_ACCOUNT_ID], "ga-1");
    }
}
