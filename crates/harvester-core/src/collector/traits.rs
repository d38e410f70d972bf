//! The `Collector` trait and the context collectors are built with.

use std::collections::HashMap;
use std::sync::Arc;

use crate::collector::outcome::CollectOutcome;
use crate::rpc::{HttpTransport, RpcError, RpcTransport};

/// A named, versioned source of node metadata.
///
/// Instances are created by a registry factory right before a run and dropped
/// once `collect` returns; nothing is kept between runs.
pub trait Collector: Send {
    /// Stable identifier, unique within a registry.
    fn name(&self) -> &str;

    /// Informational version of the collector implementation.
    fn version(&self) -> &str;

    /// Performs one collection. May block on network I/O; every remote call
    /// is expected to carry its own timeout.
    fn collect(&mut self) -> CollectOutcome;
}

/// Everything a collector factory may need to build a collector.
///
/// Holds the RPC transport and the variable lookup used for endpoint
/// overrides. Explicit variables shadow the process environment; an isolated
/// context ignores the process environment entirely.
#[derive(Clone)]
pub struct CollectContext {
    transport: Arc<dyn RpcTransport>,
    vars: HashMap<String, String>,
    inherit_env: bool,
}

impl CollectContext {
    /// Context over the given transport that falls back to the process environment.
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            vars: HashMap::new(),
            inherit_env: true,
        }
    }

    /// Context that only sees variables set with [`with_var`](Self::with_var).
    pub fn isolated(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            vars: HashMap::new(),
            inherit_env: false,
        }
    }

    /// Production context: HTTP JSON-RPC with the default timeout.
    pub fn from_env() -> Result<Self, RpcError> {
        Ok(Self::new(Arc::new(HttpTransport::new()?)))
    }

    /// Sets a variable that shadows the process environment.
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Looks up a variable: explicit overrides first, then the process environment.
    pub fn var(&self, name: &str) -> Option<String> {
        if let Some(value) = self.vars.get(name) {
            return Some(value.clone());
        }
        if self.inherit_env {
            std::env::var(name).ok()
        } else {
            None
        }
    }

    /// Transport used for JSON-RPC calls.
    pub fn transport(&self) -> Arc<dyn RpcTransport> {
        Arc::clone(&self.transport)
    }
}

impl std::fmt::Debug for CollectContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectContext")
            .field("vars", &self.vars)
            .field("inherit_env", &self.inherit_env)
            .finish_non_exhaustive()
    }
}
