//! Kyma infrastructure manager: turns Runtime objects on the KCP into
//! Gardener Shoots and configures the resulting clusters

mod controller_runner;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kube::CustomResourceExt;

use kim_common::crd::{GardenerCluster, Runtime};
use kim_common::kube_utils::{create_client, create_client_with_timeout, DEFAULT_CONNECT_TIMEOUT};
use kim_common::telemetry::{init_telemetry, TelemetryConfig};
use kim_common::KYMA_SYSTEM_NAMESPACE;
use kim_runtime::bootstrapper::{BootstrapperConfig, RuntimeBootstrapperInstaller};
use kim_runtime::kcp::KcpClientImpl;
use kim_runtime::{Context, FsmConfig};
use kim_shoot::{AuditLogTable, ConverterConfig};

/// Kyma infrastructure manager
#[derive(Parser, Debug)]
#[command(name = "infrastructure-manager", version, about, long_about = None)]
struct Cli {
    /// Print the CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Kubeconfig of the KCP; in-cluster configuration when unset
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig of the Gardener project
    #[arg(
        long,
        env = "GARDENER_KUBECONFIG_PATH",
        default_value = "/gardener/kubeconfig/kubeconfig"
    )]
    gardener_kubeconfig_path: PathBuf,

    /// Gardener project, overrides the one in the converter configuration
    #[arg(long, env = "GARDENER_PROJECT_NAME")]
    gardener_project_name: Option<String>,

    /// Converter configuration file (JSON or YAML)
    #[arg(long, env = "CONVERTER_CONFIG_FILEPATH")]
    converter_config_filepath: Option<PathBuf>,

    /// Seconds between polls of a running Shoot operation
    #[arg(long, env = "GARDENER_REQUEUE_SECONDS", default_value_t = 15)]
    gardener_requeue_seconds: u64,

    /// Seconds between polls of the kubeconfig and SKR configuration
    #[arg(long, env = "CONTROL_PLANE_REQUEUE_SECONDS", default_value_t = 10)]
    control_plane_requeue_seconds: u64,

    /// Seconds between polls while deprovisioning
    #[arg(long, env = "CONTROL_PLANE_DELETE_REQUEUE_SECONDS", default_value_t = 5)]
    control_plane_delete_requeue_seconds: u64,

    /// Timeout of a single API call, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECONDS", default_value_t = 20)]
    request_timeout_seconds: u64,

    /// Lifetime of a rotated SKR kubeconfig, in seconds
    #[arg(long, env = "KUBECONFIG_ROTATION_PERIOD_SECONDS", default_value_t = 86_400)]
    kubeconfig_rotation_period_seconds: u64,

    /// Runtimes reconciled in parallel
    #[arg(long, env = "RUNTIME_CTRL_WORKERS_CNT", default_value_t = 25)]
    concurrency: u16,

    /// Install the runtime bootstrapper on every runtime
    #[arg(long, env = "RUNTIME_BOOTSTRAPPER_ENABLED")]
    runtime_bootstrapper_enabled: bool,

    /// Multi-document manifest of the runtime bootstrapper
    #[arg(long, env = "RUNTIME_BOOTSTRAPPER_MANIFESTS_PATH")]
    runtime_bootstrapper_manifests_path: Option<PathBuf>,

    /// Name of the bootstrapper Deployment in the manifest
    #[arg(
        long,
        env = "RUNTIME_BOOTSTRAPPER_DEPLOYMENT_NAME",
        default_value = "rt-bootstrapper-controller-manager"
    )]
    runtime_bootstrapper_deployment_name: String,

    /// KCP secret with pull credentials for the bootstrapper image
    #[arg(long, env = "RUNTIME_BOOTSTRAPPER_PULL_SECRET_NAME")]
    runtime_bootstrapper_pull_secret_name: Option<String>,

    /// Human readable logs instead of JSON
    #[arg(long, env = "KIM_DEVELOPMENT_LOGS")]
    development: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        for crd in [Runtime::crd(), GardenerCluster::crd()] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        development: cli.development,
        ..Default::default()
    })?;
    kim_common::metrics::register();

    run_controller(cli).await
}

fn load_fsm_config(cli: &Cli) -> anyhow::Result<FsmConfig> {
    let path = cli
        .converter_config_filepath
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("--converter-config-filepath is required"))?;
    let mut converter = ConverterConfig::from_file(path)?;
    if let Some(project) = &cli.gardener_project_name {
        converter.gardener.project_name = project.clone();
    }

    let audit_log_table = match converter.audit_log.tenant_config_path.as_str() {
        "" => AuditLogTable::default(),
        path => AuditLogTable::from_file(Path::new(path))?,
    };

    let mut config = FsmConfig::new(converter);
    config.audit_log_table = audit_log_table;
    config.gardener_requeue = Duration::from_secs(cli.gardener_requeue_seconds);
    config.control_plane_requeue = Duration::from_secs(cli.control_plane_requeue_seconds);
    config.control_plane_delete_requeue =
        Duration::from_secs(cli.control_plane_delete_requeue_seconds);
    config.request_timeout = Duration::from_secs(cli.request_timeout_seconds);
    config.kubeconfig_rotation_period =
        Duration::from_secs(cli.kubeconfig_rotation_period_seconds);
    config.bootstrapper_enabled = cli.runtime_bootstrapper_enabled;
    Ok(config)
}

async fn run_controller(cli: Cli) -> anyhow::Result<()> {
    let config = load_fsm_config(&cli)?;
    tracing::info!(
        shoot_namespace = %config.shoot_namespace(),
        structured_auth = config.structured_auth(),
        registry_cache = config.registry_cache(),
        bootstrapper = config.bootstrapper_enabled,
        "infrastructure manager starting"
    );

    let kcp_client = create_client(cli.kubeconfig.as_deref()).await?;
    let garden_client = create_client_with_timeout(
        Some(&cli.gardener_kubeconfig_path),
        DEFAULT_CONNECT_TIMEOUT,
        config.request_timeout,
    )
    .await?;

    let mut builder = Context::builder(kcp_client.clone(), garden_client, config);
    if cli.runtime_bootstrapper_enabled {
        let path = cli
            .runtime_bootstrapper_manifests_path
            .as_ref()
            .ok_or_else(|| {
                anyhow::anyhow!("runtime bootstrapper is enabled but no manifests path is set")
            })?;
        let manifests = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("failed to read bootstrapper manifests {}: {}", path.display(), e)
        })?;
        let installer = RuntimeBootstrapperInstaller::new(
            Arc::new(KcpClientImpl::new(kcp_client.clone())),
            BootstrapperConfig {
                manifests,
                deployment_namespace: KYMA_SYSTEM_NAMESPACE.to_string(),
                deployment_name: cli.runtime_bootstrapper_deployment_name.clone(),
                pull_secret_name: cli.runtime_bootstrapper_pull_secret_name.clone(),
            },
        )?;
        builder = builder.bootstrapper(Arc::new(installer));
    }
    let ctx = Arc::new(builder.build());

    controller_runner::run_runtime_controller(kcp_client, ctx, cli.concurrency).await;
    tracing::info!("infrastructure manager stopped");
    Ok(())
}
