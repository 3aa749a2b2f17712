use std::{sync::Arc, time::Duration};

use {relay_auth::AccessControl, relay_bus::BusSender};

/// Shared gateway state, built once in `main` and cloned into every handler.
pub struct GatewayState {
    pub access: Arc<AccessControl>,
    pub bus: BusSender,
    /// Upper bound on how long a request waits for the worker.
    pub task_timeout: Duration,
    /// Registered task names, for the startup banner.
    pub tasks: Vec<String>,
    pub version: String,
}

impl GatewayState {
    pub fn new(
        access: Arc<AccessControl>,
        bus: BusSender,
        task_timeout: Duration,
        tasks: Vec<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            access,
            bus,
            task_timeout,
            tasks,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}
