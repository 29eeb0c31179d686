use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Process-wide metrics, registered once at startup. Extends the shape of
/// the original operator's three gauges with reconcile error counters now
/// that there are two controllers (workspace, repo-auth) instead of one
/// polling loop.
pub struct Metrics {
    pub registry: Registry,
    pub workspace_ready_count: Gauge,
    pub workspace_unready_count: Gauge,
    pub configuration_errors: Gauge,
    pub reconcile_errors_total: Counter,
    pub repo_auth_errors_total: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let workspace_ready_count = Gauge::default();
        registry.register(
            "workspace_ready_count",
            "Number of workspaces currently in the Ready phase",
            workspace_ready_count.clone(),
        );

        let workspace_unready_count = Gauge::default();
        registry.register(
            "workspace_unready_count",
            "Number of workspaces not currently in the Ready phase",
            workspace_unready_count.clone(),
        );

        let configuration_errors = Gauge::default();
        registry.register(
            "configuration_errors",
            "Number of workspaces with invalid configuration",
            configuration_errors.clone(),
        );

        let reconcile_errors_total = Counter::default();
        registry.register(
            "reconcile_errors_total",
            "Total reconcile errors across all workspaces",
            reconcile_errors_total.clone(),
        );

        let repo_auth_errors_total = Counter::default();
        registry.register(
            "repo_auth_errors_total",
            "Total repo-auth integrator errors",
            repo_auth_errors_total.clone(),
        );

        Metrics {
            registry,
            workspace_ready_count,
            workspace_unready_count,
            configuration_errors,
            reconcile_errors_total,
            repo_auth_errors_total,
        }
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let mut buf = String::new();
        encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
