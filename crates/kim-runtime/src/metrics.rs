//! Metrics recorded by the state machine

use chrono::Utc;
#[cfg(test)]
use mockall::automock;

use kim_common::crd::{Condition, GardenerClusterState, Runtime, RuntimeState};
use kim_common::metrics::{self, RuntimeStateLabels};

/// Metric updates performed while reconciling
#[cfg_attr(test, automock)]
pub trait MetricsSink: Send + Sync {
    /// Record the state of a runtime, labelled with its latest condition
    fn set_runtime_state(&self, runtime: &Runtime);

    /// Record the state of a runtime's GardenerCluster
    fn set_gardener_cluster_state(
        &self,
        runtime_id: &str,
        shoot_name: &str,
        state: GardenerClusterState,
    );

    /// Record when the runtime's kubeconfig expires
    fn set_kubeconfig_expiration(&self, runtime_id: &str, shoot_name: &str, expires_at_unix: i64);

    /// Record how long a runtime has been Pending
    fn set_pending_state_duration(&self, runtime: &Runtime);

    /// Count a reconcile that stopped on a non-retryable error
    fn increment_fsm_stop(&self, runtime_id: &str, reason: &str);

    /// Drop every series of a deleted runtime
    fn cleanup_runtime(&self, runtime_id: &str);
}

/// [`MetricsSink`] exporting through OpenTelemetry
#[derive(Clone, Copy, Debug, Default)]
pub struct OtelMetrics;

fn latest_condition(runtime: &Runtime) -> Option<&Condition> {
    runtime
        .status
        .as_ref()?
        .conditions
        .iter()
        .max_by_key(|c| c.last_transition_time)
}

impl MetricsSink for OtelMetrics {
    fn set_runtime_state(&self, runtime: &Runtime) {
        let Ok(runtime_id) = runtime.runtime_id() else {
            return;
        };
        let condition = latest_condition(runtime);
        metrics::record_runtime_state(RuntimeStateLabels {
            runtime_id: runtime_id.to_string(),
            shoot_name: runtime.spec.shoot.name.clone(),
            provider: runtime.spec.shoot.provider.type_.clone(),
            state: runtime.state().map(|s| s.to_string()).unwrap_or_default(),
            reason: condition.map(|c| c.reason.clone()).unwrap_or_default(),
            message: condition.map(|c| c.message.clone()).unwrap_or_default(),
        });
    }

    fn set_gardener_cluster_state(
        &self,
        runtime_id: &str,
        shoot_name: &str,
        state: GardenerClusterState,
    ) {
        metrics::record_gardener_cluster_state(runtime_id, shoot_name, state.as_str());
    }

    fn set_kubeconfig_expiration(&self, runtime_id: &str, shoot_name: &str, expires_at_unix: i64) {
        metrics::record_kubeconfig_expiration(runtime_id, shoot_name, expires_at_unix);
    }

    fn set_pending_state_duration(&self, runtime: &Runtime) {
        let Ok(runtime_id) = runtime.runtime_id() else {
            return;
        };
        let seconds = pending_seconds(runtime);
        metrics::record_pending_duration(
            runtime_id,
            &runtime.spec.shoot.name,
            &runtime.spec.shoot.provider.type_,
            seconds,
        );
    }

    fn increment_fsm_stop(&self, runtime_id: &str, reason: &str) {
        metrics::increment_unexpected_stops(runtime_id, reason);
    }

    fn cleanup_runtime(&self, runtime_id: &str) {
        metrics::forget_runtime(runtime_id);
    }
}

/// Seconds since the latest transition of a Pending runtime, zero otherwise
fn pending_seconds(runtime: &Runtime) -> f64 {
    if runtime.state() != Some(RuntimeState::Pending) {
        return 0.0;
    }
    latest_condition(runtime)
        .map(|c| (Utc::now() - c.last_transition_time).num_milliseconds() as f64 / 1000.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::runtime;
    use chrono::Duration;
    use kim_common::crd::{ConditionStatus, RuntimeStatus};

    fn with_status(state: RuntimeState, age: Duration) -> Runtime {
        let mut rt = runtime("rt-metrics");
        let mut condition = Condition::new(
            "Provisioned",
            ConditionStatus::Unknown,
            "ShootCreationPending",
            "",
        );
        condition.last_transition_time = Utc::now() - age;
        rt.status = Some(RuntimeStatus {
            state: Some(state),
            conditions: vec![condition],
            ..Default::default()
        });
        rt
    }

    #[test]
    fn pending_runtime_reports_elapsed_time() {
        let rt = with_status(RuntimeState::Pending, Duration::seconds(90));
        let seconds = pending_seconds(&rt);
        assert!((89.0..120.0).contains(&seconds), "got {seconds}");
    }

    #[test]
    fn ready_runtime_reports_zero() {
        let rt = with_status(RuntimeState::Ready, Duration::seconds(90));
        assert_eq!(pending_seconds(&rt), 0.0);
    }

    #[test]
    fn runtime_state_is_recorded_and_cleaned_up() {
        let rt = with_status(RuntimeState::Pending, Duration::seconds(5));
        OtelMetrics.set_runtime_state(&rt);
        assert!(metrics::is_tracked("rt-metrics"));
        OtelMetrics.cleanup_runtime("rt-metrics");
        assert!(!metrics::is_tracked("rt-metrics"));
    }
}
