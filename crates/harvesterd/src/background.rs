//! Background collection: runs the configured collectors on a fixed interval
//! and publishes each report into the shared slot.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use harvester_core::{CollectContext, CollectorRegistry, Harvester, RunOptions};

use crate::state::{SharedState, publish};

/// What every collection run does.
pub(crate) struct CollectJob {
    pub(crate) registry: CollectorRegistry,
    pub(crate) collectors: Vec<String>,
    pub(crate) options: RunOptions,
    pub(crate) output: Option<PathBuf>,
}

/// Slot content after a systemic failure.
pub(crate) fn error_report(message: &str) -> Value {
    json!({
        "error": message,
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

/// Writes `report` next to `path` and renames it into place.
pub(crate) fn write_output(path: &Path, report: &Value) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, text + "\n")?;
    std::fs::rename(&tmp, path)
}

/// One blocking collection. Never fails: systemic errors become an error report.
pub(crate) fn run_once(job: &CollectJob, ctx: CollectContext) -> Value {
    let harvester = Harvester::new(&job.registry, ctx);
    let report = match harvester.collect_all(&job.collectors, &job.options) {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "collection failed");
            return error_report(&e.to_string());
        }
    };

    if let Some(violation) = report.validation() {
        warn!(error = %violation, "publishing report that does not match the schema");
    }

    let value = match report.to_value() {
        Ok(value) => value,
        Err(e) => {
            error!(error = %e, "cannot serialize report");
            return error_report(&format!("cannot serialize report: {}", e));
        }
    };

    if let Some(path) = &job.output {
        match write_output(path, &value) {
            Ok(()) => debug!(path = %path.display(), "report written"),
            Err(e) => error!(path = %path.display(), error = %e, "cannot write output file"),
        }
    }
    value
}

/// Runs `job` immediately and then every `interval`. A run that overlaps the
/// next tick delays it; missed ticks are skipped.
pub(crate) async fn collect_loop(state: SharedState, job: Arc<CollectJob>, interval: Duration) {
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut runs: u64 = 0;

    loop {
        tick.tick().await;

        let job = Arc::clone(&job);
        let t0 = Instant::now();
        // The RPC client blocks, so it is created and dropped on the blocking thread.
        let result = tokio::task::spawn_blocking(move || match CollectContext::from_env() {
            Ok(ctx) => run_once(&job, ctx),
            Err(e) => {
                error!(error = %e, "cannot create RPC client");
                error_report(&e.to_string())
            }
        })
        .await;
        let elapsed = t0.elapsed();

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "collection panicked in spawn_blocking");
                error_report("collection panicked")
            }
        };
        publish(&state, report);

        runs += 1;
        if runs == 1 {
            info!(duration_ms = elapsed.as_millis() as u64, "first collection published");
        } else {
            debug!(duration_ms = elapsed.as_millis() as u64, runs, "collection published");
        }

        if elapsed > interval {
            warn!(
                duration_ms = elapsed.as_millis() as u64,
                interval_ms = interval.as_millis() as u64,
                "collection took longer than the interval"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvester_core::rpc::MockTransport;

    fn job(collectors: &[&str], output: Option<PathBuf>) -> CollectJob {
        CollectJob {
            registry: CollectorRegistry::with_builtins(),
            collectors: collectors.iter().map(|s| s.to_string()).collect(),
            options: RunOptions::default(),
            output,
        }
    }

    fn ctx() -> CollectContext {
        CollectContext::isolated(Arc::new(MockTransport::new()))
    }

    #[test]
    fn test_run_once_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/harvested-data.json");
        let report = run_once(&job(&["null", "dummychain"], Some(path.clone())), ctx());

        assert_eq!(report["null"]["metadata"]["last_collect_status"], "success");
        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, report);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_systemic_failure_becomes_error_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let report = run_once(&job(&["ghost"], Some(path.clone())), ctx());

        assert!(report["error"].as_str().unwrap().contains("ghost"));
        assert!(report["timestamp"].is_string());
        assert!(!path.exists());
    }

    #[test]
    fn test_failing_collector_is_contained() {
        let report = run_once(&job(&["null", "substrate"], None), ctx());
        assert_eq!(report["null"]["metadata"]["last_collect_status"], "success");
        assert_eq!(report["substrate"]["metadata"]["last_collect_status"], "error");
    }
}
