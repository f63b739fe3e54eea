//! Local fallback registry
//!
//! In-process substitutes for a subset of tools, used only when the remote
//! backend cannot fulfill a request. Handlers are registered by tool name
//! and invoked with the same canonical parameters the remote call would
//! have received.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::info;

use relay_foundation::Result;

/// An in-process tool implementation
#[async_trait]
pub trait FallbackHandler: Send + Sync {
    async fn invoke(&self, params: &Value) -> Result<Value>;
}

/// Adapter so plain closures can serve as fallback handlers
struct FnFallback<F>(F);

#[async_trait]
impl<F> FallbackHandler for FnFallback<F>
where
    F: Fn(&Value) -> Result<Value> + Send + Sync,
{
    async fn invoke(&self, params: &Value) -> Result<Value> {
        (self.0)(params)
    }
}

/// Registry of local fallback handlers, keyed by tool name
#[derive(Default)]
pub struct FallbackRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn FallbackHandler>>>,
}

impl FallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; replaces any existing handler for the tool
    pub fn register(&self, tool_name: &str, handler: Arc<dyn FallbackHandler>) {
        self.handlers
            .write()
            .insert(tool_name.to_string(), handler);
        info!(tool = tool_name, "registered local fallback");
    }

    /// Register a synchronous closure as a fallback
    pub fn register_fn<F>(&self, tool_name: &str, f: F)
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(tool_name, Arc::new(FnFallback(f)));
    }

    pub fn get(&self, tool_name: &str) -> Option<Arc<dyn FallbackHandler>> {
        self.handlers.read().get(tool_name).cloned()
    }

    pub fn contains(&self, tool_name: &str) -> bool {
        self.handlers.read().contains_key(tool_name)
    }

    /// Registered tool names, sorted for stable reporting
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl std::fmt::Debug for FallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
