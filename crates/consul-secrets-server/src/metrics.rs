// SPDX-License-Identifier: AGPL-3.0-only
//! Prometheus metrics for the secrets engine.

use prometheus::{CounterVec, Gauge, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global metrics registry singleton.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Prometheus metrics for the secrets engine.
pub struct Metrics {
    registry: Registry,

    pub creds_issued_total: CounterVec,
    pub leases_renewed_total: CounterVec,
    pub leases_revoked_total: CounterVec,
    pub bootstrap_total: CounterVec,
    pub leases_active: Gauge,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();

        let creds_issued_total = CounterVec::new(
            Opts::new(
                "consul_secrets_creds_issued_total",
                "Credential issue requests by result",
            ),
            &["result"],
        )
        .expect("metric can be created");

        let leases_renewed_total = CounterVec::new(
            Opts::new(
                "consul_secrets_leases_renewed_total",
                "Lease renewals by result",
            ),
            &["result"],
        )
        .expect("metric can be created");

        let leases_revoked_total = CounterVec::new(
            Opts::new(
                "consul_secrets_leases_revoked_total",
                "Lease revocations by result",
            ),
            &["result"],
        )
        .expect("metric can be created");

        let bootstrap_total = CounterVec::new(
            Opts::new(
                "consul_secrets_bootstrap_total",
                "Consul ACL bootstrap attempts by result",
            ),
            &["result"],
        )
        .expect("metric can be created");

        let leases_active = Gauge::with_opts(Opts::new(
            "consul_secrets_leases_active",
            "Number of leases awaiting revocation",
        ))
        .expect("metric can be created");

        registry
            .register(Box::new(creds_issued_total.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(leases_renewed_total.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(leases_revoked_total.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(bootstrap_total.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(leases_active.clone()))
            .expect("metric can be registered");

        Self {
            registry,
            creds_issued_total,
            leases_renewed_total,
            leases_revoked_total,
            bootstrap_total,
            leases_active,
        }
    }

    /// Encode all metrics in Prometheus text format.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }
}

/// Label value for an operation outcome.
pub fn result_label<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() {
        "success"
    } else {
        "error"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        let m = metrics();
        m.creds_issued_total.with_label_values(&["success"]).inc();
        m.leases_revoked_total.with_label_values(&["error"]).inc();
        m.bootstrap_total.with_label_values(&["success"]).inc();
        m.leases_active.set(1.0);

        let output = m.encode();
        assert!(output.contains("consul_secrets_creds_issued_total"));
        assert!(output.contains("consul_secrets_leases_revoked_total"));
        assert!(output.contains("consul_secrets_bootstrap_total"));
        assert!(output.contains("consul_secrets_leases_active"));
    }

    #[test]
    fn test_result_label() {
        assert_eq!(result_label::<_, ()>(&Ok(1)), "success");
        assert_eq!(result_label::<(), _>(&Err("boom")), "error");
    }
}
