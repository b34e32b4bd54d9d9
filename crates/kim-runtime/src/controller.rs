//! Runtime controller
//!
//! Builds the shared [`Context`] and hands every Runtime to the state
//! machine in [`crate::fsm`].

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, instrument};

use kim_common::crd::Runtime;
use kim_common::Error;
use kim_shoot::Converter;

use crate::bootstrapper::BootstrapperInstaller;
use crate::config::FsmConfig;
use crate::fsm;
use crate::garden::{GardenClient, GardenClientImpl};
use crate::kcp::{KcpClient, KcpClientImpl};
use crate::metrics::{MetricsSink, OtelMetrics};
use crate::skr::{KubeconfigSecretResolver, SkrClientResolver};

/// Controller context shared by all reconciles
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```text
/// let ctx = Context::builder(kcp_client, garden_client, config)
///     .bootstrapper(installer)
///     .build();
/// ```
pub struct Context {
    /// Runtimes, GardenerClusters and kubeconfig secrets on the KCP
    pub kcp: Arc<dyn KcpClient>,
    /// Shoots and their satellite objects in the garden project namespace
    pub garden: Arc<dyn GardenClient>,
    /// Clients for the runtimes' own clusters
    pub skr: Arc<dyn SkrClientResolver>,
    /// Metric updates
    pub metrics: Arc<dyn MetricsSink>,
    /// Runtime bootstrapper installer, if one was configured
    pub bootstrapper: Option<Arc<dyn BootstrapperInstaller>>,
    /// Runtime to Shoot converter
    pub converter: Converter,
    /// State machine settings
    pub config: FsmConfig,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(kcp: Client, garden: Client, config: FsmConfig) -> ContextBuilder {
        ContextBuilder::new(kcp, garden, config)
    }

    /// Installer to use, when the bootstrapper feature is on
    pub fn bootstrapper(&self) -> Option<&Arc<dyn BootstrapperInstaller>> {
        self.bootstrapper
            .as_ref()
            .filter(|_| self.config.bootstrapper_enabled)
    }

    /// Create a context for testing with mock clients
    #[cfg(test)]
    pub fn for_testing(
        kcp: Arc<dyn KcpClient>,
        garden: Arc<dyn GardenClient>,
        skr: Arc<dyn SkrClientResolver>,
        metrics: Arc<dyn MetricsSink>,
        config: FsmConfig,
    ) -> Self {
        Self {
            kcp,
            garden,
            skr,
            metrics,
            bootstrapper: None,
            converter: Converter::new(config.converter.clone()),
            config,
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    kcp_client: Client,
    garden_client: Client,
    config: FsmConfig,
    kcp: Option<Arc<dyn KcpClient>>,
    garden: Option<Arc<dyn GardenClient>>,
    skr: Option<Arc<dyn SkrClientResolver>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    bootstrapper: Option<Arc<dyn BootstrapperInstaller>>,
}

impl ContextBuilder {
    fn new(kcp_client: Client, garden_client: Client, config: FsmConfig) -> Self {
        Self {
            kcp_client,
            garden_client,
            config,
            kcp: None,
            garden: None,
            skr: None,
            metrics: None,
            bootstrapper: None,
        }
    }

    /// Override the KCP client (primarily for testing)
    pub fn kcp(mut self, kcp: Arc<dyn KcpClient>) -> Self {
        self.kcp = Some(kcp);
        self
    }

    /// Override the garden client (primarily for testing)
    pub fn garden(mut self, garden: Arc<dyn GardenClient>) -> Self {
        self.garden = Some(garden);
        self
    }

    /// Override how SKR clients are obtained
    pub fn skr_resolver(mut self, skr: Arc<dyn SkrClientResolver>) -> Self {
        self.skr = Some(skr);
        self
    }

    /// Override the metrics sink
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Install the runtime bootstrapper on configured runtimes
    pub fn bootstrapper(mut self, installer: Arc<dyn BootstrapperInstaller>) -> Self {
        self.bootstrapper = Some(installer);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let kcp = self
            .kcp
            .unwrap_or_else(|| Arc::new(KcpClientImpl::new(self.kcp_client.clone())));
        let garden = self.garden.unwrap_or_else(|| {
            Arc::new(GardenClientImpl::new(
                self.garden_client.clone(),
                self.config.shoot_namespace(),
            ))
        });
        let skr = self.skr.unwrap_or_else(|| {
            Arc::new(KubeconfigSecretResolver::new(
                kcp.clone(),
                self.config.request_timeout,
            ))
        });
        Context {
            kcp,
            garden,
            skr,
            metrics: self.metrics.unwrap_or_else(|| Arc::new(OtelMetrics)),
            bootstrapper: self.bootstrapper,
            converter: Converter::new(self.config.converter.clone()),
            config: self.config,
        }
    }
}

/// Reconcile a Runtime
///
/// The object handed in by the watcher may be stale, so the Runtime is read
/// again before the state machine runs.
#[instrument(skip(runtime, ctx), fields(runtime = %runtime.name_any()))]
pub async fn reconcile(runtime: Arc<Runtime>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = runtime.namespace().unwrap_or_default();
    let name = runtime.name_any();

    let Some(current) = ctx.kcp.get_runtime(&namespace, &name).await? else {
        debug!("runtime no longer exists");
        return Ok(Action::await_change());
    };

    fsm::run(current, &ctx).await
}

/// Error policy for the controller
pub fn error_policy(runtime: Arc<Runtime>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        runtime = %runtime.name_any(),
        "reconciliation failed"
    );
    Action::requeue(Duration::from_secs(5))
}
