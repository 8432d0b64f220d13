use std::collections::BTreeMap;
use std::sync::Arc;

use super::context::JobContext;
use super::error::JobError;

/// Runs one kind of batch job.
pub trait JobHandler: Send + Sync {
    /// The `command` value this handler serves.
    fn command(&self) -> &'static str;

    /// Does the work. The returned string becomes the job's final progress
    /// message. Handlers call [`JobContext::checkpoint`] between units of
    /// work.
    fn run(&self, ctx: &JobContext) -> Result<String, JobError>;
}

/// Handlers by command.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<&'static str, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn JobHandler>) -> &mut Self {
        self.handlers.insert(handler.command(), handler);
        self
    }

    pub fn get(&self, command: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(command).cloned()
    }

    pub fn commands(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
