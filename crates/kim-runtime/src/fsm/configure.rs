//! Configuration of the runtime's own cluster

use std::collections::BTreeMap;

use kube::ResourceExt;
use tracing::{debug, info};

use kim_common::crd::{
    ConditionStatus, OpenIDConnect, OpenIdConnectSpec, RuntimeConditionReason as Reason,
    RuntimeConditionType as Type,
};
use kim_common::{labels, Error, FIELD_MANAGER, KYMA_SYSTEM_NAMESPACE};
use kim_shoot::extender::extensions::OIDC_EXTENSION;
use kim_shoot::extender::oidc::additional_oidcs;

use super::{transient, State, Step, SystemState};
use crate::bootstrapper::InstallationStatus;
use crate::controller::Context;
use crate::{crb, provisioning_info};

fn skr_failure(s: &mut SystemState, ctx: &Context, type_: Type, error: Error) -> Step {
    let after = ctx.config.control_plane_requeue;
    transient(s, type_, Reason::ConfigurationErr, error.to_string(), after)
}

/// Name of the i-th OpenIDConnect written to the SKR
fn oidc_name(index: usize) -> String {
    format!("kyma-oidc-{index}")
}

pub(super) async fn configure_skr(s: &mut SystemState, ctx: &Context) -> Result<Step, Error> {
    let Some(shoot) = s.shoot.clone() else {
        return Ok(Step::Requeue(ctx.config.control_plane_requeue));
    };
    let skr = match s.skr(ctx).await {
        Ok(skr) => skr,
        Err(e) => return Ok(skr_failure(s, ctx, Type::Configured, e)),
    };

    if let Err(e) = skr.ensure_namespace(KYMA_SYSTEM_NAMESPACE).await {
        return Ok(skr_failure(s, ctx, Type::Configured, e));
    }
    let provisioning_info = provisioning_info::build_config_map(&s.instance, &shoot)?;
    if let Err(e) = skr.apply_config_map(&provisioning_info, FIELD_MANAGER).await {
        return Ok(skr_failure(s, ctx, Type::Configured, e));
    }

    if !shoot.extension_enabled(OIDC_EXTENSION) {
        debug!("oidc extension is disabled, skipping OpenIDConnect resources");
        return Ok(Step::Switch(State::ApplyClusterRoleBindings));
    }

    let oidcs = additional_oidcs(
        &s.instance,
        &ctx.config.converter.kubernetes.default_shared_ias_tenant,
    );
    if let Err(e) = skr.delete_managed_oidcs().await {
        return Ok(skr_failure(s, ctx, Type::OidcConfigured, e));
    }
    for (index, oidc) in oidcs.iter().enumerate() {
        let mut resource = OpenIDConnect::new(&oidc_name(index), OpenIdConnectSpec::from(oidc));
        resource.metadata.labels = Some(BTreeMap::from([(
            labels::MANAGED_BY.to_string(),
            labels::MANAGED_BY_VALUE.to_string(),
        )]));
        if let Err(e) = skr.create_oidc(&resource).await {
            return Ok(skr_failure(s, ctx, Type::OidcConfigured, e));
        }
    }

    s.status_mut().set_condition(
        Type::OidcConfigured,
        ConditionStatus::True,
        Reason::OidcConfigured,
        format!("{} OpenIDConnect resources configured", oidcs.len()),
    );
    Ok(Step::Switch(State::ApplyClusterRoleBindings))
}

fn mark_ready(s: &mut SystemState) -> Step {
    s.status_mut().update_state_ready(
        Type::Configured,
        Reason::AdministratorsConfigured,
        "Cluster admin configuration complete",
    );
    Step::Stop
}

pub(super) async fn apply_cluster_role_bindings(
    s: &mut SystemState,
    ctx: &Context,
) -> Result<Step, Error> {
    let skr = match s.skr(ctx).await {
        Ok(skr) => skr,
        Err(e) => return Ok(skr_failure(s, ctx, Type::Configured, e)),
    };
    let existing = match skr.list_cluster_role_bindings().await {
        Ok(existing) => existing,
        Err(e) => return Ok(skr_failure(s, ctx, Type::Configured, e)),
    };

    let diff = crb::diff(&s.instance.spec.security.administrators, &existing);
    for binding in &diff.removed {
        let name = binding.name_any();
        info!(binding = %name, "removing cluster admin binding");
        if let Err(e) = skr.delete_cluster_role_binding(&name).await {
            return Ok(skr_failure(s, ctx, Type::Configured, e));
        }
    }
    for binding in &diff.missing {
        if let Err(e) = skr.create_cluster_role_binding(binding).await {
            return Ok(skr_failure(s, ctx, Type::Configured, e));
        }
    }
    if !diff.removed.is_empty() || !diff.missing.is_empty() {
        info!(
            removed = diff.removed.len(),
            created = diff.missing.len(),
            "cluster admin bindings reconciled"
        );
    }

    if ctx.bootstrapper().is_some() {
        return Ok(Step::Switch(State::ApplyRuntimeBootstrapper));
    }
    Ok(mark_ready(s))
}

pub(super) async fn apply_runtime_bootstrapper(
    s: &mut SystemState,
    ctx: &Context,
) -> Result<Step, Error> {
    let Some(installer) = ctx.bootstrapper() else {
        return Ok(mark_ready(s));
    };
    let after = ctx.config.control_plane_requeue;
    let skr = match s.skr(ctx).await {
        Ok(skr) => skr,
        Err(e) => return Ok(skr_failure(s, ctx, Type::BootstrapperConfigured, e)),
    };

    let status = match installer.status(skr.clone()).await {
        Ok(status) => status,
        Err(e) => return Ok(skr_failure(s, ctx, Type::BootstrapperConfigured, e)),
    };

    match status {
        InstallationStatus::NotStarted | InstallationStatus::UpgradeNeeded => {
            if let Err(e) = installer.install(&s.instance, skr).await {
                return Ok(skr_failure(s, ctx, Type::BootstrapperConfigured, e));
            }
            s.status_mut().set_condition(
                Type::BootstrapperConfigured,
                ConditionStatus::Unknown,
                Reason::BootstrapperInstalling,
                "Runtime bootstrapper installation started",
            );
            Ok(Step::Requeue(after))
        }
        InstallationStatus::InProgress => {
            s.status_mut().set_condition(
                Type::BootstrapperConfigured,
                ConditionStatus::Unknown,
                Reason::BootstrapperInstalling,
                "Runtime bootstrapper installation in progress",
            );
            Ok(Step::Requeue(after))
        }
        InstallationStatus::Failed => {
            s.status_mut().update_state_pending(
                Type::BootstrapperConfigured,
                ConditionStatus::False,
                Reason::BootstrapperFailed,
                "Runtime bootstrapper deployment is not available",
            );
            Ok(Step::Requeue(after))
        }
        InstallationStatus::Ready => {
            s.status_mut().set_condition(
                Type::BootstrapperConfigured,
                ConditionStatus::True,
                Reason::BootstrapperInstalled,
                "Runtime bootstrapper installed",
            );
            Ok(mark_ready(s))
        }
    }
}
