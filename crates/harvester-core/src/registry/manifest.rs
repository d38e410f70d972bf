//! Filesystem plugins: JSON manifests declaring collectors.
//!
//! Each `*.json` file in a plugin directory holds one declaration or a list
//! under `collectors`:
//!
//! ```json
//! { "collectors": [
//!     { "name": "kusama", "version": "1.0.0", "kind": "substrate",
//!       "client_name": "polkadot", "rpc_env": "KUSAMA_RPC_URL" },
//!     { "name": "site", "version": "1.0.0", "kind": "static",
//!       "blockchain": { "blockchain_ecosystem": "Cosmos" } },
//!     { "name": "gaia", "version": "0.2.0", "kind": "command",
//!       "program": "./gaia-probe", "args": ["--json"], "timeout_ms": 5000 }
//! ] }
//! ```
//!
//! Relative command paths are resolved against the manifest's directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::collector::{
    CollectContext, Collector, CommandCollector, CommandConfig, DEFAULT_COMMAND_TIMEOUT,
    EthereumCollector, EthereumConfig, Section, StaticCollector, SubstrateCollector,
    SubstrateConfig,
};
use crate::registry::CollectorFactory;

/// A plugin source that could not be used. Logged, never returned to callers
/// of `load_collectors`.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginError {
    ReadDir { path: PathBuf, message: String },
    ReadFile { path: PathBuf, message: String },
    Parse { path: PathBuf, message: String },
    Invalid { path: PathBuf, message: String },
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginError::ReadDir { path, message } => {
                write!(f, "cannot read plugin directory {}: {}", path.display(), message)
            }
            PluginError::ReadFile { path, message } => {
                write!(f, "cannot read manifest {}: {}", path.display(), message)
            }
            PluginError::Parse { path, message } => {
                write!(f, "malformed manifest {}: {}", path.display(), message)
            }
            PluginError::Invalid { path, message } => {
                write!(f, "invalid declaration in {}: {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for PluginError {}

fn default_version() -> String {
    "0.0.0".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct Declaration {
    name: String,
    #[serde(default = "default_version")]
    version: String,
    #[serde(flatten)]
    kind: Kind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Kind {
    Static {
        #[serde(default)]
        blockchain: Section,
        #[serde(default)]
        workload: Section,
    },
    Substrate(ChainSettings),
    Ethereum(ChainSettings),
    Command {
        program: PathBuf,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
}

/// Knobs shared by the JSON-RPC chain families.
#[derive(Debug, Clone, Default, Deserialize)]
struct ChainSettings {
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default)]
    ecosystem: Option<String>,
    #[serde(default)]
    rpc_env: Option<String>,
    #[serde(default)]
    default_rpc: Option<String>,
}

impl ChainSettings {
    fn substrate(self, name: String, version: String) -> SubstrateConfig {
        let base = SubstrateConfig::default();
        SubstrateConfig {
            name,
            version,
            client_name: self.client_name,
            ecosystem: self.ecosystem.unwrap_or(base.ecosystem),
            rpc_env: self.rpc_env.unwrap_or(base.rpc_env),
            default_rpc: self.default_rpc.unwrap_or(base.default_rpc),
        }
    }

    fn ethereum(self, name: String, version: String) -> EthereumConfig {
        let base = EthereumConfig::default();
        EthereumConfig {
            name,
            version,
            client_name: self.client_name,
            ecosystem: self.ecosystem.unwrap_or(base.ecosystem),
            rpc_env: self.rpc_env.unwrap_or(base.rpc_env),
            default_rpc: self.default_rpc.unwrap_or(base.default_rpc),
        }
    }
}

impl Declaration {
    fn into_factory(self, manifest_dir: &Path) -> Result<(String, CollectorFactory), String> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err("collector name is empty".to_string());
        }
        let version = self.version;

        let factory: CollectorFactory = match self.kind {
            Kind::Static {
                blockchain,
                workload,
            } => {
                if blockchain.is_empty() && workload.is_empty() {
                    return Err(format!("static collector '{}' declares no data", name));
                }
                let collector = StaticCollector::new(name.clone(), version, blockchain, workload);
                Arc::new(move |_: &CollectContext| -> Box<dyn Collector> {
                    Box::new(collector.clone())
                })
            }
            Kind::Substrate(settings) => {
                let config = settings.substrate(name.clone(), version);
                Arc::new(move |ctx: &CollectContext| -> Box<dyn Collector> {
                    Box::new(SubstrateCollector::new(config.clone(), ctx))
                })
            }
            Kind::Ethereum(settings) => {
                let config = settings.ethereum(name.clone(), version);
                Arc::new(move |ctx: &CollectContext| -> Box<dyn Collector> {
                    Box::new(EthereumCollector::new(config.clone(), ctx))
                })
            }
            Kind::Command {
                program,
                args,
                timeout_ms,
            } => {
                if program.as_os_str().is_empty() {
                    return Err(format!("command collector '{}' has no program", name));
                }
                let program = if program.is_relative() && program.components().count() > 1 {
                    manifest_dir.join(program)
                } else {
                    program
                };
                let config = CommandConfig {
                    name: name.clone(),
                    version,
                    program,
                    args,
                    timeout: timeout_ms
                        .map(Duration::from_millis)
                        .unwrap_or(DEFAULT_COMMAND_TIMEOUT),
                };
                Arc::new(move |_: &CollectContext| -> Box<dyn Collector> {
                    Box::new(CommandCollector::new(config.clone()))
                })
            }
        };
        Ok((name, factory))
    }
}

/// Parses one manifest. Invalid declarations are reported individually so the
/// valid ones in the same file still load.
fn parse_manifest(
    path: &Path,
    text: &str,
) -> Result<Vec<Result<(String, CollectorFactory), PluginError>>, PluginError> {
    let value: Value = serde_json::from_str(text).map_err(|e| PluginError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let declarations = match value {
        Value::Object(mut map) if map.contains_key("collectors") => match map.remove("collectors") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(PluginError::Parse {
                    path: path.to_path_buf(),
                    message: "`collectors` must be an array".to_string(),
                });
            }
        },
        obj @ Value::Object(_) => vec![obj],
        _ => {
            return Err(PluginError::Parse {
                path: path.to_path_buf(),
                message: "manifest must be a JSON object".to_string(),
            });
        }
    };

    let dir = path.parent().unwrap_or(Path::new("."));
    Ok(declarations
        .into_iter()
        .map(|item| {
            serde_json::from_value::<Declaration>(item)
                .map_err(|e| e.to_string())
                .and_then(|d| d.into_factory(dir))
                .map_err(|message| PluginError::Invalid {
                    path: path.to_path_buf(),
                    message,
                })
        })
        .collect())
}

fn manifest_paths(dir: &Path) -> Result<Vec<PathBuf>, PluginError> {
    let entries = std::fs::read_dir(dir).map_err(|e| PluginError::ReadDir {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Loads every valid declaration found in `dir`, in lexical file order.
pub(crate) fn scan_dir(dir: &Path) -> Vec<(String, CollectorFactory)> {
    let paths = match manifest_paths(dir) {
        Ok(paths) => paths,
        Err(e) => {
            warn!(error = %e, "plugin directory skipped");
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    for path in paths {
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                let err = PluginError::ReadFile {
                    path: path.clone(),
                    message: e.to_string(),
                };
                warn!(error = %err, "plugin manifest skipped");
                continue;
            }
        };
        match parse_manifest(&path, &text) {
            Ok(items) => {
                for item in items {
                    match item {
                        Ok((name, factory)) => {
                            debug!(collector = %name, manifest = %path.display(), "plugin collector found");
                            found.push((name, factory));
                        }
                        Err(e) => warn!(error = %e, "plugin declaration skipped"),
                    }
                }
            }
            Err(e) => warn!(error = %e, "plugin manifest skipped"),
        }
    }
    found
}
