//! Scripted JSON-RPC transport for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use super::{RpcError, RpcTransport};

/// In-memory transport answering each method with a fixed result or error.
///
/// Methods that were not scripted fail with `unexpected method <name>`.
/// Every call is recorded as `(url, method)`.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: HashMap<String, Result<Value, RpcError>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a successful result for `method`.
    pub fn with_result(mut self, method: impl Into<String>, result: impl Into<Value>) -> Self {
        self.responses.insert(method.into(), Ok(result.into()));
        self
    }

    /// Scripts a transport failure for `method`.
    pub fn with_error(mut self, method: impl Into<String>, message: impl Into<String>) -> Self {
        self.responses
            .insert(method.into(), Err(RpcError::Transport(message.into())));
        self
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl RpcTransport for MockTransport {
    fn call(&self, url: &str, method: &str, _params: &Value) -> Result<Value, RpcError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((url.to_string(), method.to_string()));
        }
        match self.responses.get(method) {
            Some(response) => response.clone(),
            None => Err(RpcError::Transport(format!("unexpected method {}", method))),
        }
    }
}
