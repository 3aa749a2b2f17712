//! Task handlers and the registry the worker dispatches through.

use std::collections::HashMap;

use {
    anyhow::Result,
    async_trait::async_trait,
    relay_protocol::{Args, TaskResponse},
    serde::de::DeserializeOwned,
    tracing::info,
};

/// A named unit of work the worker can run on behalf of an API caller.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    async fn execute(&self, args: &Args) -> Result<TaskResponse>;
}

/// Something that declares the tasks it can run (the worker's session).
pub trait TaskProvider {
    fn task_handlers(&self) -> Vec<Box<dyn TaskHandler>>;
}

/// Decode handler arguments into a typed struct.
pub fn parse_args<T: DeserializeOwned>(args: &Args) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(args.clone()))
        .map_err(|e| anyhow::anyhow!("invalid task arguments: {e}"))
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate task registration: {0}")]
    Duplicate(String),

    #[error("task name must not be empty")]
    EmptyName,
}

/// Task name → handler. Filled once before the worker starts serving.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, Box<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a handler list; the first duplicate name aborts.
    pub fn from_handlers(
        handlers: impl IntoIterator<Item = Box<dyn TaskHandler>>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for handler in handlers {
            registry.register(handler)?;
        }
        info!(tasks = %registry.names().join(", "), "registered tasks");
        Ok(registry)
    }

    pub fn from_provider(provider: &dyn TaskProvider) -> Result<Self, RegistryError> {
        Self::from_handlers(provider.task_handlers())
    }

    pub fn register(&mut self, handler: Box<dyn TaskHandler>) -> Result<(), RegistryError> {
        let name = handler.name().to_string();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.tasks.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.tasks.insert(name, handler);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn TaskHandler> {
        self.tasks.get(name).map(|t| t.as_ref())
    }

    /// Registered task names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tasks.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// `(name, description)` for every task, sorted by name.
    pub fn descriptions(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<_> = self
            .tasks
            .values()
            .map(|t| (t.name(), t.description()))
            .collect();
        out.sort_unstable_by_key(|(name, _)| *name);
        out
    }
}
