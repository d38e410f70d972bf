//! EVM-family collector (reth, op-reth, bera-reth, geth).
//!
//! Uses `web3_clientVersion` for client identity and `eth_chainId` for the
//! chain. The client name is the part of the client version before the first
//! `/` unless an override is configured.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use crate::collector::outcome::{CollectOutcome, Section};
use crate::collector::traits::{CollectContext, Collector};
use crate::rpc::{RpcError, RpcTransport, call_string};

/// Environment variable overriding the execution-client RPC endpoint.
pub const ETHEREUM_RPC_ENV: &str = "ETHEREUM_RPC_URL";

/// Endpoint used when the environment variable is not set.
pub const ETHEREUM_DEFAULT_RPC: &str = "http://127.0.0.1:8545";

const ETHEREUM_COLLECTOR_VERSION: &str = "0.1.0";

/// Network names for well-known chain ids.
const KNOWN_NETWORKS: &[(u64, &str)] = &[
    (1, "mainnet"),
    (10, "optimism"),
    (8453, "base"),
    (17000, "holesky"),
    (80069, "bepolia"),
    (80094, "berachain"),
    (560048, "hoodi"),
    (11155111, "sepolia"),
    (11155420, "optimism-sepolia"),
];

/// Construction parameters of an EVM-family collector.
#[derive(Debug, Clone, PartialEq)]
pub struct EthereumConfig {
    pub name: String,
    pub version: String,
    /// Explicit client name; when blank, derived from `web3_clientVersion`.
    pub client_name: Option<String>,
    pub ecosystem: String,
    pub rpc_env: String,
    pub default_rpc: String,
}

impl Default for EthereumConfig {
    fn default() -> Self {
        Self {
            name: "ethereum".to_string(),
            version: ETHEREUM_COLLECTOR_VERSION.to_string(),
            client_name: None,
            ecosystem: "Ethereum".to_string(),
            rpc_env: ETHEREUM_RPC_ENV.to_string(),
            default_rpc: ETHEREUM_DEFAULT_RPC.to_string(),
        }
    }
}

impl EthereumConfig {
    pub fn reth() -> Self {
        Self {
            name: "reth".to_string(),
            ..Self::default()
        }
    }

    pub fn op_reth() -> Self {
        Self {
            name: "op-reth".to_string(),
            ecosystem: "Optimism".to_string(),
            ..Self::default()
        }
    }

    pub fn bera_reth() -> Self {
        Self {
            name: "bera-reth".to_string(),
            ecosystem: "Berachain".to_string(),
            ..Self::default()
        }
    }

    pub fn geth() -> Self {
        Self {
            name: "geth".to_string(),
            ..Self::default()
        }
    }
}

/// Parses an `eth_chainId` result (`"0x1"`, or a plain decimal string).
fn parse_chain_id(raw: &str) -> Result<u64, RpcError> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse::<u64>(),
    };
    parsed.map_err(|e| RpcError::InvalidResponse(format!("chain id '{}': {}", raw, e)))
}

fn network_name(chain_id: u64) -> String {
    KNOWN_NETWORKS
        .iter()
        .find(|(id, _)| *id == chain_id)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("chain-{}", chain_id))
}

/// Collector for Ethereum-style execution clients.
pub struct EthereumCollector {
    config: EthereumConfig,
    rpc_url: String,
    transport: Arc<dyn RpcTransport>,
}

impl EthereumCollector {
    pub fn new(config: EthereumConfig, ctx: &CollectContext) -> Self {
        let rpc_url = ctx
            .var(&config.rpc_env)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| config.default_rpc.clone());
        Self {
            config,
            rpc_url,
            transport: ctx.transport(),
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    fn query(&self, method: &str, messages: &mut Vec<String>) -> Option<String> {
        let params = Value::Array(Vec::new());
        match call_string(self.transport.as_ref(), &self.rpc_url, method, &params) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(collector = %self.config.name, method, error = %e, "rpc call failed");
                messages.push(format!("RPC {} failed: {}", method, e));
                None
            }
        }
    }
}

impl Collector for EthereumCollector {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn version(&self) -> &str {
        &self.config.version
    }

    fn collect(&mut self) -> CollectOutcome {
        let mut messages = Vec::new();

        let client_version = self.query("web3_clientVersion", &mut messages);
        let chain_id = self
            .query("eth_chainId", &mut messages)
            .and_then(|raw| match parse_chain_id(&raw) {
                Ok(id) => Some(id),
                Err(e) => {
                    messages.push(format!("RPC eth_chainId failed: {}", e));
                    None
                }
            });

        if client_version.is_none() && chain_id.is_none() {
            return CollectOutcome::failed(messages);
        }

        let override_name = self
            .config
            .client_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());
        let client_name = match override_name {
            Some(name) => name.to_string(),
            None => client_version
                .as_deref()
                .and_then(|v| v.split('/').next())
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
        };

        let mut workload = Section::new();
        workload.insert("client_name".into(), json!(client_name));
        workload.insert(
            "client_version".into(),
            json!(client_version.as_deref().unwrap_or("unknown")),
        );
        workload.insert("rpc_url".into(), json!(self.rpc_url));

        let mut blockchain = Section::new();
        blockchain.insert("blockchain_ecosystem".into(), json!(self.config.ecosystem));
        match chain_id {
            Some(id) => {
                blockchain.insert("blockchain_network_name".into(), json!(network_name(id)));
                blockchain.insert("chain_id".into(), json!(id.to_string()));
            }
            None => {
                blockchain.insert("blockchain_network_name".into(), json!("unknown"));
            }
        }

        let workload_complete = client_version.is_some() && !client_name.is_empty();
        let blockchain_complete = chain_id.is_some();
        if workload_complete && blockchain_complete {
            return CollectOutcome::success(blockchain, workload);
        }

        if client_version.is_none() {
            messages.push("Missing client_version (RPC web3_clientVersion failed).".to_string());
        }
        if client_name.is_empty() {
            messages.push("Missing client_name (no override and none in client version).".to_string());
        }
        if !blockchain_complete {
            messages.push("Missing chain_id (RPC eth_chainId failed).".to_string());
        }
        CollectOutcome::partial(blockchain, workload, messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::MockTransport;

    fn collect(config: EthereumConfig, rpc: MockTransport) -> CollectOutcome {
        let ctx = CollectContext::isolated(Arc::new(rpc));
        EthereumCollector::new(config, &ctx).collect()
    }

    #[test]
    fn test_parse_chain_id() {
        assert_eq!(parse_chain_id("0x1").unwrap(), 1);
        assert_eq!(parse_chain_id("0x138de").unwrap(), 80094);
        assert_eq!(parse_chain_id("10").unwrap(), 10);
        assert!(parse_chain_id("0xzz").is_err());
    }

    #[test]
    fn test_reth_success() {
        let rpc = MockTransport::new()
            .with_result("web3_clientVersion", "reth/v1.3.12-6f8e725/x86_64-unknown-linux-gnu")
            .with_result("eth_chainId", "0x1");
        let CollectOutcome::Success(result) = collect(EthereumConfig::reth(), rpc) else {
            panic!("expected Success");
        };
        assert_eq!(result.workload()["client_name"], "reth");
        assert_eq!(result.blockchain()["blockchain_network_name"], "mainnet");
        assert_eq!(result.blockchain()["chain_id"], "1");
    }

    #[test]
    fn test_unknown_chain_gets_generic_name() {
        let rpc = MockTransport::new()
            .with_result("web3_clientVersion", "op-reth/v1.1.0")
            .with_result("eth_chainId", "0x2a");
        let CollectOutcome::Success(result) = collect(EthereumConfig::op_reth(), rpc) else {
            panic!("expected Success");
        };
        assert_eq!(result.blockchain()["blockchain_ecosystem"], "Optimism");
        assert_eq!(result.blockchain()["blockchain_network_name"], "chain-42");
    }

    #[test]
    fn test_missing_chain_id_is_partial() {
        let rpc = MockTransport::new().with_result("web3_clientVersion", "Geth/v1.14.0-stable");
        let outcome = collect(EthereumConfig::geth(), rpc);
        assert_eq!(outcome.label(), "partial");
        assert!(outcome.messages().iter().any(|m| m.contains("eth_chainId")));
    }

    #[test]
    fn test_garbage_chain_id_counts_as_failure() {
        let rpc = MockTransport::new().with_result("eth_chainId", "banana");
        let outcome = collect(EthereumConfig::reth(), rpc);
        assert!(matches!(outcome, CollectOutcome::Failed(_)));
        assert!(outcome.messages().iter().any(|m| m.contains("banana")));
    }
}
