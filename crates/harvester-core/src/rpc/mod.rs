//! Blocking JSON-RPC 2.0 client used by chain-family collectors.
//!
//! The `RpcTransport` trait lets collectors run against a real node
//! (`HttpTransport`) or a scripted one (`MockTransport`) in tests.

mod mock;

pub use mock::MockTransport;

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

/// Timeout applied to every JSON-RPC request unless configured otherwise.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_millis(2500);

/// Error type for a single JSON-RPC call.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcError {
    /// HTTP client could not be constructed.
    Client(String),
    /// Connection-level failure (refused, DNS, reset).
    Transport(String),
    /// Request did not complete within the timeout.
    Timeout(Duration),
    /// Non-2xx HTTP status.
    Status(u16),
    /// JSON-RPC error object returned by the node.
    Rpc { code: i64, message: String },
    /// Response body is not a usable JSON-RPC response.
    InvalidResponse(String),
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Client(msg) => write!(f, "http client error: {}", msg),
            RpcError::Transport(msg) => write!(f, "{}", msg),
            RpcError::Timeout(t) => write!(f, "timed out after {} ms", t.as_millis()),
            RpcError::Status(code) => write!(f, "http status {}", code),
            RpcError::Rpc { code, message } => write!(f, "rpc error {}: {}", code, message),
            RpcError::InvalidResponse(msg) => write!(f, "invalid response: {}", msg),
        }
    }
}

impl std::error::Error for RpcError {}

/// Something that can execute a JSON-RPC call against a URL.
pub trait RpcTransport: Send + Sync {
    /// Calls `method` with `params` on the node at `url`, returning the `result` member.
    fn call(&self, url: &str, method: &str, params: &Value) -> Result<Value, RpcError>;
}

/// Calls a method whose result is expected to be a non-empty string.
pub fn call_string(
    transport: &dyn RpcTransport,
    url: &str,
    method: &str,
    params: &Value,
) -> Result<String, RpcError> {
    match transport.call(url, method, params)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::String(_) => Err(RpcError::InvalidResponse("empty string result".into())),
        Value::Null => Err(RpcError::InvalidResponse("null result".into())),
        other => Err(RpcError::InvalidResponse(format!(
            "expected string result, got {}",
            other
        ))),
    }
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

impl RpcResponse {
    fn into_result(self) -> Result<Value, RpcError> {
        if let Some(err) = self.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        self.result
            .ok_or_else(|| RpcError::InvalidResponse("missing result".into()))
    }
}

/// JSON-RPC over HTTP POST with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Transport with [`DEFAULT_RPC_TIMEOUT`].
    pub fn new() -> Result<Self, RpcError> {
        Self::with_timeout(DEFAULT_RPC_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, RpcError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| RpcError::Client(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl RpcTransport for HttpTransport {
    fn call(&self, url: &str, method: &str, params: &Value) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        debug!(url, method, "json-rpc call");

        let response = self.client.post(url).json(&body).send().map_err(|e| {
            if e.is_timeout() {
                RpcError::Timeout(self.timeout)
            } else {
                RpcError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status(status.as_u16()));
        }

        let envelope: RpcResponse = response
            .json()
            .map_err(|e| RpcError::InvalidResponse(e.to_string()))?;
        envelope.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_error_object_wins() {
        let resp: RpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 1,
            "error": {"code": -32601, "message": "Method not found"}
        }))
        .unwrap();
        assert_eq!(
            resp.into_result(),
            Err(RpcError::Rpc {
                code: -32601,
                message: "Method not found".into()
            })
        );
    }

    #[test]
    fn test_response_missing_result() {
        let resp: RpcResponse = serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1})).unwrap();
        assert!(matches!(
            resp.into_result(),
            Err(RpcError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_call_string_rejects_non_strings() {
        let rpc = MockTransport::new()
            .with_result("a", "  value ")
            .with_result("b", json!(42))
            .with_result("c", "");
        let p = json!([]);
        assert_eq!(call_string(&rpc, "u", "a", &p).unwrap(), "value");
        assert!(call_string(&rpc, "u", "b", &p).is_err());
        assert!(call_string(&rpc, "u", "c", &p).is_err());
    }

    #[test]
    fn test_unreachable_node_fails_within_timeout() {
        // Port 9 (discard) on localhost is closed in CI; the call must error, not hang.
        let transport = HttpTransport::with_timeout(Duration::from_millis(300)).unwrap();
        assert_eq!(transport.timeout(), Duration::from_millis(300));
        let started = std::time::Instant::now();
        let result = transport.call("http://127.0.0.1:9", "system_version", &json!([]));
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(RpcError::Status(502).to_string(), "http status 502");
        assert_eq!(
            RpcError::Timeout(Duration::from_millis(2500)).to_string(),
            "timed out after 2500 ms"
        );
    }
}
