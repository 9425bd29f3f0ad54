use envconfig::Envconfig;

use crate::controller::retry::{DEFAULT_BASE, DEFAULT_CAP};

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    /// Port for the webhook and health endpoints.
    #[envconfig(from = "MEMCACHED_OPERATOR_HTTP_PORT", default = "8443")]
    pub http_port: u16,

    /// Restrict watches to one namespace; all namespaces when unset.
    /// Env: MEMCACHED_OPERATOR_WATCH_NAMESPACE
    #[envconfig(from = "MEMCACHED_OPERATOR_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Field manager name used for server-side apply.
    #[envconfig(
        from = "MEMCACHED_OPERATOR_FIELD_MANAGER",
        default = "memcached-operator"
    )]
    pub field_manager: String,

    #[envconfig(nested)]
    pub features: FeaturesConfig,

    #[envconfig(nested)]
    pub worker: WorkerConfig,

    #[envconfig(nested)]
    pub retry: RetryConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct FeaturesConfig {
    /// Manage ServiceMonitor objects. Turn off on clusters without the
    /// Prometheus Operator CRDs.
    /// Env: MEMCACHED_OPERATOR_FEATURES_SERVICE_MONITOR
    #[envconfig(
        from = "MEMCACHED_OPERATOR_FEATURES_SERVICE_MONITOR",
        default = "true"
    )]
    pub service_monitor: bool,
}

#[derive(Envconfig, Clone, Debug)]
pub struct WorkerConfig {
    #[envconfig(from = "MEMCACHED_OPERATOR_WORKERS", default = "4")]
    pub workers: usize,
    #[envconfig(from = "MEMCACHED_OPERATOR_QUEUE_CAPACITY", default = "1024")]
    pub queue_capacity: usize,
}

#[derive(Envconfig, Clone, Debug)]
pub struct RetryConfig {
    #[envconfig(from = "MEMCACHED_OPERATOR_RETRY_BASE_MS", default = "500")]
    pub base_ms: u64,
    #[envconfig(from = "MEMCACHED_OPERATOR_RETRY_CAP_MS", default = "300000")]
    pub cap_ms: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            http_port: 8443,
            watch_namespace: None,
            field_manager: crate::templates::MANAGER.to_string(),
            features: FeaturesConfig {
                service_monitor: true,
            },
            worker: WorkerConfig {
                workers: 4,
                queue_capacity: 1024,
            },
            retry: RetryConfig {
                base_ms: DEFAULT_BASE.as_millis() as u64,
                cap_ms: DEFAULT_CAP.as_millis() as u64,
            },
        }
    }
}

impl OperatorConfig {
    /// Clamp values that would stall the controller.
    pub fn normalized(mut self) -> Self {
        self.worker.workers = self.worker.workers.max(1);
        self.worker.queue_capacity = self.worker.queue_capacity.max(1);
        self.retry.base_ms = self.retry.base_ms.max(1);
        self.retry.cap_ms = self.retry.cap_ms.max(self.retry.base_ms);
        if self
            .watch_namespace
            .as_deref()
            .is_some_and(|ns| ns.trim().is_empty())
        {
            self.watch_namespace = None;
        }
        self
    }
}
