//! Collector backed by an external executable.
//!
//! The command is run with no stdin and must print one JSON object on stdout:
//!
//! ```json
//! { "status": "partial",
//!   "blockchain": { "blockchain_ecosystem": "Cosmos" },
//!   "workload": { "client_name": "gaiad" },
//!   "messages": ["client_version unavailable"] }
//! ```
//!
//! `status` is optional (defaults to success). A non-zero exit code, invalid
//! output or an elapsed timeout is a total failure; the child is killed when
//! the timeout elapses.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;

use crate::collector::outcome::{CollectOutcome, Section};
use crate::collector::traits::Collector;

/// Default time a command may run.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Construction parameters of a command collector.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandConfig {
    pub name: String,
    pub version: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
enum ReportedStatus {
    Success,
    Partial,
    #[serde(alias = "error")]
    Failed,
}

#[derive(Debug, Deserialize)]
struct CommandOutput {
    #[serde(default)]
    status: Option<ReportedStatus>,
    #[serde(default)]
    blockchain: Section,
    #[serde(default)]
    workload: Section,
    #[serde(default)]
    messages: Vec<String>,
}

impl CommandOutput {
    fn into_outcome(self) -> CollectOutcome {
        match self.status.unwrap_or(ReportedStatus::Success) {
            ReportedStatus::Success => CollectOutcome::success(self.blockchain, self.workload),
            ReportedStatus::Partial => {
                CollectOutcome::partial(self.blockchain, self.workload, self.messages)
            }
            ReportedStatus::Failed => CollectOutcome::failed(self.messages),
        }
    }
}

/// Runs a program and turns its JSON output into an outcome.
pub struct CommandCollector {
    config: CommandConfig,
}

impl CommandCollector {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    fn timed_out(&self) -> String {
        format!(
            "{} timed out after {} ms",
            self.config.program.display(),
            self.config.timeout.as_millis()
        )
    }

    fn run(&self) -> Result<(ExitStatus, Vec<u8>, Vec<u8>), String> {
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to start {}: {}", self.config.program.display(), e))?;

        let stdout = child.stdout.take().map(read_in_background);
        let stderr = child.stderr.take().map(read_in_background);

        let deadline = Instant::now() + self.config.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(self.timed_out());
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(format!("failed to wait for command: {}", e)),
            }
        };

        // Descendants may still hold the pipes open after the child exits.
        let stdout = self.drain(stdout, deadline)?;
        let stderr = self.drain(stderr, deadline)?;
        Ok((status, stdout, stderr))
    }

    fn drain(
        &self,
        rx: Option<Receiver<io::Result<Vec<u8>>>>,
        deadline: Instant,
    ) -> Result<Vec<u8>, String> {
        let Some(rx) = rx else {
            return Ok(Vec::new());
        };
        match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(Ok(buf)) => Ok(buf),
            Ok(Err(e)) => Err(format!("failed to read command output: {}", e)),
            Err(RecvTimeoutError::Timeout) => Err(self.timed_out()),
            Err(RecvTimeoutError::Disconnected) => Ok(Vec::new()),
        }
    }
}

fn read_in_background<R: Read + Send + 'static>(mut reader: R) -> Receiver<io::Result<Vec<u8>>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let result = reader.read_to_end(&mut buf).map(|_| buf);
        let _ = tx.send(result);
    });
    rx
}

impl Collector for CommandCollector {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn version(&self) -> &str {
        &self.config.version
    }

    fn collect(&mut self) -> CollectOutcome {
        let (status, stdout, stderr) = match self.run() {
            Ok(output) => output,
            Err(msg) => return CollectOutcome::failed([msg]),
        };
        debug!(collector = %self.config.name, %status, "command finished");

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            let detail = stderr.trim();
            let msg = if detail.is_empty() {
                format!("command exited with {}", status)
            } else {
                format!("command exited with {}: {}", status, detail)
            };
            return CollectOutcome::failed([msg]);
        }

        let stdout = match String::from_utf8(stdout) {
            Ok(text) => text,
            Err(e) => {
                let msg = format!("command output is not valid UTF-8: {}", e);
                return CollectOutcome::failed([msg]);
            }
        };
        match serde_json::from_str::<CommandOutput>(stdout.trim()) {
            Ok(output) => output.into_outcome(),
            Err(e) => CollectOutcome::failed([format!("invalid command output: {}", e)]),
        }
    }
}
