//! Substrate-family collector (Polkadot, Kusama, parachains).
//!
//! Queries four node RPC methods, each independently fallible:
//! - `system_version`: client version (e.g. `polkadot/v1.2.3-abc`)
//! - `system_name`: client name, used only when no override is configured
//! - `system_chain`: network name
//! - `chain_getBlockHash(0)`: genesis hash, reported as `chain_id`
//!
//! The endpoint comes from an environment variable (`SUBSTRATE_RPC_URL` by
//! default) or falls back to `http://127.0.0.1:9933`.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use crate::collector::outcome::{CollectOutcome, Section};
use crate::collector::traits::{CollectContext, Collector};
use crate::rpc::{RpcTransport, call_string};

/// Environment variable overriding the Substrate RPC endpoint.
pub const SUBSTRATE_RPC_ENV: &str = "SUBSTRATE_RPC_URL";

/// Endpoint used when the environment variable is not set.
pub const SUBSTRATE_DEFAULT_RPC: &str = "http://127.0.0.1:9933";

const SUBSTRATE_COLLECTOR_VERSION: &str = "0.1.0";

/// Construction parameters of a Substrate-family collector.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstrateConfig {
    /// Collector name in the registry.
    pub name: String,
    /// Collector version.
    pub version: String,
    /// Explicit client name; when blank, `system_name` is used instead.
    pub client_name: Option<String>,
    /// Value of `blockchain.blockchain_ecosystem`.
    pub ecosystem: String,
    /// Environment variable holding the RPC endpoint.
    pub rpc_env: String,
    /// Endpoint used when `rpc_env` is unset.
    pub default_rpc: String,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            name: "substrate".to_string(),
            version: SUBSTRATE_COLLECTOR_VERSION.to_string(),
            client_name: None,
            ecosystem: "Polkadot".to_string(),
            rpc_env: SUBSTRATE_RPC_ENV.to_string(),
            default_rpc: SUBSTRATE_DEFAULT_RPC.to_string(),
        }
    }
}

impl SubstrateConfig {
    /// Config named `name` with a fixed client name.
    pub fn named(name: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client_name: Some(client_name.into()),
            ..Self::default()
        }
    }

    /// Built-in `polkadot` collector.
    pub fn polkadot() -> Self {
        Self::named("polkadot", "polkadot")
    }

    /// Built-in `ajuna` collector.
    pub fn ajuna() -> Self {
        Self::named("ajuna", "ajuna-node")
    }
}

/// Collector for nodes exposing the Substrate `system_*` RPC API.
pub struct SubstrateCollector {
    config: SubstrateConfig,
    rpc_url: String,
    transport: Arc<dyn RpcTransport>,
}

impl SubstrateCollector {
    pub fn new(config: SubstrateConfig, ctx: &CollectContext) -> Self {
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

    /// Endpoint this collector will query.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Runs one RPC call, recording the failure text in `messages`.
    fn query(&self, method: &str, params: Value, messages: &mut Vec<String>) -> Option<String> {
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

impl Collector for SubstrateCollector {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn version(&self) -> &str {
        &self.config.version
    }

    fn collect(&mut self) -> CollectOutcome {
        let mut messages = Vec::new();

        let system_version = self.query("system_version", json!([]), &mut messages);
        let system_name = self.query("system_name", json!([]), &mut messages);
        let system_chain = self.query("system_chain", json!([]), &mut messages);
        let genesis_hash = self.query("chain_getBlockHash", json!([0]), &mut messages);

        if system_version.is_none()
            && system_name.is_none()
            && system_chain.is_none()
            && genesis_hash.is_none()
        {
            if messages.is_empty() {
                messages.push("no RPC info from node".to_string());
            }
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
            None => system_name.clone().unwrap_or_default(),
        };

        let mut workload = Section::new();
        workload.insert("client_name".into(), json!(client_name));
        workload.insert(
            "client_version".into(),
            json!(system_version.as_deref().unwrap_or("unknown")),
        );
        workload.insert("rpc_url".into(), json!(self.rpc_url));

        let mut blockchain = Section::new();
        blockchain.insert("blockchain_ecosystem".into(), json!(self.config.ecosystem));
        blockchain.insert(
            "blockchain_network_name".into(),
            json!(system_chain.as_deref().unwrap_or("unknown")),
        );
        if let Some(hash) = genesis_hash {
            blockchain.insert("chain_id".into(), json!(hash));
        }

        let workload_complete = system_version.is_some() && !client_name.is_empty();
        let blockchain_complete = system_chain.is_some();
        if workload_complete && blockchain_complete {
            return CollectOutcome::success(blockchain, workload);
        }

        if system_version.is_none() {
            messages.push("Missing client_version (RPC system_version failed).".to_string());
        }
        if client_name.is_empty() {
            messages.push(
                "Missing client_name (RPC system_name failed and no override provided)."
                    .to_string(),
            );
        }
        if !blockchain_complete {
            messages
                .push("Missing blockchain_network_name (RPC system_chain failed).".to_string());
        }
        CollectOutcome::partial(blockchain, workload, messages)
    }
}
