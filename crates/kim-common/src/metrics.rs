//! OpenTelemetry metrics for runtime lifecycle observability
//!
//! State-like values are kept in per-runtime maps and read by observable
//! gauges on every collection, so a runtime that is deleted disappears from
//! the exported series once [`forget_runtime`] has been called.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Meter, ObservableGauge};
use opentelemetry::{global, KeyValue};

/// Global meter for infrastructure manager metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("infrastructure-manager"));

static RUNTIME_STATES: Lazy<DashMap<String, Vec<KeyValue>>> = Lazy::new(DashMap::new);
static GARDENER_CLUSTER_STATES: Lazy<DashMap<String, Vec<KeyValue>>> = Lazy::new(DashMap::new);
static KUBECONFIG_EXPIRATIONS: Lazy<DashMap<String, (f64, Vec<KeyValue>)>> =
    Lazy::new(DashMap::new);
static PENDING_DURATIONS: Lazy<DashMap<String, (f64, Vec<KeyValue>)>> = Lazy::new(DashMap::new);

/// Runtime state, one series with value 1 per runtime
///
/// Labels:
/// - `runtime_id`, `shoot_name`, `provider`
/// - `state`: Pending, Ready, Failed, Terminating
/// - `reason`, `message`: from the most recent condition
pub static RUNTIME_STATE: Lazy<ObservableGauge<i64>> = Lazy::new(|| {
    METER
        .i64_observable_gauge("im_runtime_state")
        .with_description("Current state of each runtime")
        .with_callback(|observer| {
            for entry in RUNTIME_STATES.iter() {
                observer.observe(1, entry.value());
            }
        })
        .build()
});

/// GardenerCluster state, one series with value 1 per runtime
///
/// Labels: `runtime_id`, `shoot_name`, `state`
pub static GARDENER_CLUSTER_STATE: Lazy<ObservableGauge<i64>> = Lazy::new(|| {
    METER
        .i64_observable_gauge("im_gardener_clusters_state")
        .with_description("State of the GardenerCluster backing each runtime")
        .with_callback(|observer| {
            for entry in GARDENER_CLUSTER_STATES.iter() {
                observer.observe(1, entry.value());
            }
        })
        .build()
});

/// Unix time at which the current SKR kubeconfig expires
///
/// Labels: `runtime_id`, `shoot_name`
pub static KUBECONFIG_EXPIRATION: Lazy<ObservableGauge<f64>> = Lazy::new(|| {
    METER
        .f64_observable_gauge("im_kubeconfig_expiration")
        .with_description("Unix timestamp of the kubeconfig expiration")
        .with_unit("s")
        .with_callback(|observer| {
            for entry in KUBECONFIG_EXPIRATIONS.iter() {
                let (value, labels) = entry.value();
                observer.observe(*value, labels);
            }
        })
        .build()
});

/// Seconds a runtime has spent in Pending since its last transition
///
/// Labels: `runtime_id`, `shoot_name`, `provider`
pub static PENDING_STATE_DURATION: Lazy<ObservableGauge<f64>> = Lazy::new(|| {
    METER
        .f64_observable_gauge("im_runtime_pending_state_duration")
        .with_description("Time spent in Pending state")
        .with_unit("s")
        .with_callback(|observer| {
            for entry in PENDING_DURATIONS.iter() {
                let (value, labels) = entry.value();
                observer.observe(*value, labels);
            }
        })
        .build()
});

/// Counter of reconciles that ended in an unexpected terminal stop
///
/// Labels: `runtime_id`, `reason`
pub static UNEXPECTED_STOPS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("unexpected_stops_total")
        .with_description("Number of reconciles stopped on a non-retryable error")
        .with_unit("{stops}")
        .build()
});

/// Register the observable gauges with the global meter provider.
///
/// Must run after [`crate::telemetry::init_telemetry`] so the callbacks land
/// on the exporting provider.
pub fn register() {
    Lazy::force(&RUNTIME_STATE);
    Lazy::force(&GARDENER_CLUSTER_STATE);
    Lazy::force(&KUBECONFIG_EXPIRATION);
    Lazy::force(&PENDING_STATE_DURATION);
    Lazy::force(&UNEXPECTED_STOPS);
}

/// Labels describing a runtime's state
#[derive(Clone, Debug, Default)]
pub struct RuntimeStateLabels {
    /// Runtime id
    pub runtime_id: String,
    /// Shoot name
    pub shoot_name: String,
    /// Provider type
    pub provider: String,
    /// Runtime state
    pub state: String,
    /// Reason of the most recent condition
    pub reason: String,
    /// Message of the most recent condition
    pub message: String,
}

/// Record the current state of a runtime
pub fn record_runtime_state(labels: RuntimeStateLabels) {
    let key = labels.runtime_id.clone();
    RUNTIME_STATES.insert(
        key,
        vec![
            KeyValue::new("runtime_id", labels.runtime_id),
            KeyValue::new("shoot_name", labels.shoot_name),
            KeyValue::new("provider", labels.provider),
            KeyValue::new("state", labels.state),
            KeyValue::new("reason", labels.reason),
            KeyValue::new("message", labels.message),
        ],
    );
}

/// Record the GardenerCluster state for a runtime
pub fn record_gardener_cluster_state(runtime_id: &str, shoot_name: &str, state: &str) {
    GARDENER_CLUSTER_STATES.insert(
        runtime_id.to_string(),
        vec![
            KeyValue::new("runtime_id", runtime_id.to_string()),
            KeyValue::new("shoot_name", shoot_name.to_string()),
            KeyValue::new("state", state.to_string()),
        ],
    );
}

/// Record when the kubeconfig of a runtime expires
pub fn record_kubeconfig_expiration(runtime_id: &str, shoot_name: &str, expires_at_unix: i64) {
    KUBECONFIG_EXPIRATIONS.insert(
        runtime_id.to_string(),
        (
            expires_at_unix as f64,
            vec![
                KeyValue::new("runtime_id", runtime_id.to_string()),
                KeyValue::new("shoot_name", shoot_name.to_string()),
            ],
        ),
    );
}

/// Record how long a runtime has been Pending; zero clears the series
pub fn record_pending_duration(runtime_id: &str, shoot_name: &str, provider: &str, seconds: f64) {
    if seconds <= 0.0 {
        PENDING_DURATIONS.remove(runtime_id);
        return;
    }
    PENDING_DURATIONS.insert(
        runtime_id.to_string(),
        (
            seconds,
            vec![
                KeyValue::new("runtime_id", runtime_id.to_string()),
                KeyValue::new("shoot_name", shoot_name.to_string()),
                KeyValue::new("provider", provider.to_string()),
            ],
        ),
    );
}

/// Count an unexpected terminal stop
pub fn increment_unexpected_stops(runtime_id: &str, reason: &str) {
    UNEXPECTED_STOPS.add(
        1,
        &[
            KeyValue::new("runtime_id", runtime_id.to_string()),
            KeyValue::new("reason", reason.to_string()),
        ],
    );
}

/// Drop every series recorded for a runtime
pub fn forget_runtime(runtime_id: &str) {
    RUNTIME_STATES.remove(runtime_id);
    GARDENER_CLUSTER_STATES.remove(runtime_id);
    KUBECONFIG_EXPIRATIONS.remove(runtime_id);
    PENDING_DURATIONS.remove(runtime_id);
}

/// Whether any series is recorded for a runtime
pub fn is_tracked(runtime_id: &str) -> bool {
    RUNTIME_STATES.contains_key(runtime_id)
        || GARDENER_CLUSTER_STATES.contains_key(runtime_id)
        || KUBECONFIG_EXPIRATIONS.contains_key(runtime_id)
        || PENDING_DURATIONS.contains_key(runtime_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forget_runtime_removes_all_series() {
        record_runtime_state(RuntimeStateLabels {
            runtime_id: "rt-forget".to_string(),
            state: "Ready".to_string(),
            ..Default::default()
        });
        record_gardener_cluster_state("rt-forget", "c-1", "Ready");
        record_kubeconfig_expiration("rt-forget", "c-1", 1_700_000_000);
        record_pending_duration("rt-forget", "c-1", "aws", 12.0);
        assert!(is_tracked("rt-forget"));

        forget_runtime("rt-forget");
        assert!(!is_tracked("rt-forget"));
    }

    #[test]
    fn zero_pending_duration_clears_series() {
        record_pending_duration("rt-pending", "c-2", "gcp", 30.0);
        assert!(PENDING_DURATIONS.contains_key("rt-pending"));
        record_pending_duration("rt-pending", "c-2", "gcp", 0.0);
        assert!(!PENDING_DURATIONS.contains_key("rt-pending"));
    }

    #[test]
    fn runtime_state_is_replaced_not_duplicated() {
        for state in ["Pending", "Ready"] {
            record_runtime_state(RuntimeStateLabels {
                runtime_id: "rt-replace".to_string(),
                state: state.to_string(),
                ..Default::default()
            });
        }
        let labels = RUNTIME_STATES.get("rt-replace").unwrap();
        assert!(labels
            .iter()
            .any(|kv| kv.key.as_str() == "state" && kv.value.as_str() == "Ready"));
        drop(labels);
        forget_runtime("rt-replace");
    }

    #[test]
    fn register_is_idempotent() {
        register();
        register();
        increment_unexpected_stops("rt-x", "ConversionError");
    }
}
