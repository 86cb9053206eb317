//! Replay a scripted remote stream through the full engine.
//!
//! The replay wires the real coordinator to the mock remote, mock
//! connectivity and a recording notifier, then feeds it the script one
//! step at a time. Time is virtual, so `wait` steps and retry backoff
//! complete instantly while keeping their relative order.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tablesync_client::{
    Capabilities, ChildChange, CoordinatorHandle, MemorySession, MockConnectivity, MockRemote,
    ReachabilityMonitor, RecordingNotifier, NotifierCall, SyncConfig, SyncContext,
    SyncCoordinator, Update,
};
use tablesync_core::{Diff, SyncEvent, SyncState};
use tablesync_types::{StreamErrorCode, Table, TransportKind};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// A replay script.
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    /// Steps, applied in order.
    pub steps: Vec<Step>,
}

/// One scripted input.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Child added with an optional JSON payload.
    Added {
        key: String,
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    /// Child changed with an optional JSON payload.
    Changed {
        key: String,
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    /// Child removed.
    Removed { key: String },
    /// Listener cancelled by the service.
    Cancelled {
        code: CodeSpec,
        #[serde(default)]
        message: String,
    },
    /// Network up or down.
    Network {
        online: bool,
        #[serde(default)]
        transport: Option<TransportKind>,
    },
    /// Let virtual time pass.
    Wait { ms: u64 },
}

/// Error code given by name or number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CodeSpec {
    /// Numeric code, e.g. `-24`.
    Number(i32),
    /// Canonical name, e.g. `"NETWORK_ERROR"`.
    Name(String),
}

impl CodeSpec {
    fn resolve(&self) -> Result<StreamErrorCode> {
        match self {
            Self::Number(n) => Ok(StreamErrorCode::from(*n)),
            Self::Name(name) => name
                .parse()
                .with_context(|| format!("Unrecognized error code '{}'", name)),
        }
    }
}

/// Outcome of a replay.
#[derive(Debug, Clone)]
pub struct Report {
    /// Timestamped log of everything the engine published.
    pub log: Vec<String>,
    /// Final collection.
    pub tables: Vec<Table>,
    /// Alerts still showing.
    pub alerts: Vec<u32>,
    /// Final subscription state.
    pub state: SyncState,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== tablesync replay ===")?;
        writeln!(f)?;
        for line in &self.log {
            writeln!(f, "{}", line)?;
        }
        writeln!(f)?;
        writeln!(f, "State: {:?}", self.state)?;
        writeln!(f, "Tables: {}", self.tables.len())?;
        if !self.tables.is_empty() {
            writeln!(f, "  {:<6} {:<10} ID", "TABLE", "STATUS")?;
            for table in &self.tables {
                writeln!(f, "  {:<6} {:<10} {}", table.key, table.status, table.id)?;
            }
        }
        if self.alerts.is_empty() {
            writeln!(f, "Alerts: none")
        } else {
            let ids: Vec<String> = self.alerts.iter().map(u32::to_string).collect();
            writeln!(f, "Alerts: {}", ids.join(", "))
        }
    }
}

/// Run the replay command.
pub async fn run(path: &Path, config: SyncConfig, offline: bool) -> Result<()> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    let script: Script = serde_json::from_str(&text).context("Invalid replay script")?;

    tokio::time::pause();
    let report = execute(&script, config, offline).await?;
    print!("{}", report);
    Ok(())
}

/// Replay `script` and report what the engine did.
pub async fn execute(script: &Script, config: SyncConfig, offline: bool) -> Result<Report> {
    let connectivity = if offline {
        MockConnectivity::new()
    } else {
        MockConnectivity::online(Capabilities::wifi())
    };
    let monitor = ReachabilityMonitor::new(Arc::new(connectivity.clone()));
    let remote = MockRemote::new();
    let notifier = Arc::new(RecordingNotifier::new());
    let context = SyncContext::new(config, Arc::new(MemorySession::logged_in("replay")));

    let (handle, updates) = SyncCoordinator::spawn(
        context,
        remote.clone(),
        notifier.clone(),
        monitor.subscribe_status(),
    );
    monitor.start(Arc::new(handle.clone()));

    let mut journal = Journal::new(updates, notifier.clone());
    handle.start().await.context("Failed to start sync")?;
    journal.collect(&handle).await?;

    for (n, step) in script.steps.iter().enumerate() {
        tracing::debug!("Step {}: {:?}", n + 1, step);
        match step {
            Step::Added { key, payload } => {
                journal.deliver(remote.emit_child(ChildChange::Added, key, payload.as_ref()), key);
            }
            Step::Changed { key, payload } => {
                journal.deliver(remote.emit_child(ChildChange::Changed, key, payload.as_ref()), key);
            }
            Step::Removed { key } => {
                journal.deliver(remote.emit(tablesync_types::RemoteEvent::removed(key)), key);
            }
            Step::Cancelled { code, message } => {
                let code = code.resolve()?;
                if remote.cancel(code, message) == 0 {
                    journal.note(format!("cancel {} dropped: no listener attached", code));
                }
            }
            Step::Network { online, transport } => {
                if *online {
                    journal.note("network up".to_string());
                    connectivity.go_online(capabilities(*transport));
                } else {
                    journal.note("network down".to_string());
                    connectivity.go_offline();
                }
            }
            Step::Wait { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
        }
        journal.collect(&handle).await?;
    }

    let report = Report {
        log: journal.log,
        tables: handle.snapshot().await?,
        alerts: notifier.showing(),
        state: handle.state().await?,
    };

    monitor.stop();
    handle.shutdown().await?;
    Ok(report)
}

fn capabilities(transport: Option<TransportKind>) -> Capabilities {
    match transport {
        Some(TransportKind::Cellular) => Capabilities::cellular(),
        Some(TransportKind::Other) => Capabilities {
            internet: true,
            validated: true,
            ..Capabilities::default()
        },
        _ => Capabilities::wifi(),
    }
}

/// Collects published updates and notifier calls into timestamped lines.
struct Journal {
    updates: mpsc::UnboundedReceiver<Update>,
    notifier: Arc<RecordingNotifier>,
    seen_calls: usize,
    started: Instant,
    log: Vec<String>,
}

impl Journal {
    fn new(updates: mpsc::UnboundedReceiver<Update>, notifier: Arc<RecordingNotifier>) -> Self {
        Self {
            updates,
            notifier,
            seen_calls: 0,
            started: Instant::now(),
            log: Vec::new(),
        }
    }

    fn note(&mut self, line: String) {
        let elapsed = self.started.elapsed().as_millis();
        self.log.push(format!("[{:>6} ms] {}", elapsed, line));
    }

    fn deliver(&mut self, reached: usize, key: &str) {
        if reached == 0 {
            self.note(format!("event for {} dropped: no listener attached", key));
        }
    }

    /// Wait for the coordinator to drain its queue, then record output.
    async fn collect(&mut self, handle: &CoordinatorHandle) -> Result<()> {
        handle.state().await?;

        while let Ok(update) = self.updates.try_recv() {
            let line = describe_update(&update);
            self.note(line);
        }

        let calls = self.notifier.calls();
        for call in calls.iter().skip(self.seen_calls) {
            let line = match call {
                NotifierCall::Post {
                    notification_id,
                    body,
                    ..
                } => format!("alert #{}: {}", notification_id, body),
                NotifierCall::Cancel { notification_id } => {
                    format!("alert #{} withdrawn", notification_id)
                }
            };
            self.note(line);
        }
        self.seen_calls = calls.len();
        Ok(())
    }
}

fn describe_update(update: &Update) -> String {
    match update {
        Update::Diff { diff, .. } => match diff {
            Diff::Inserted { index, table, .. } => {
                format!("+ table {} {} (row {})", table.key, table.status, index)
            }
            Diff::Updated { key, old, new, .. } => format!("~ table {} {} -> {}", key, old, new),
            Diff::Removed { table, .. } => format!("- table {}", table.key),
            Diff::Noop => "no change".to_string(),
        },
        Update::Status(event) => match event {
            SyncEvent::Subscribed => "subscribed".to_string(),
            SyncEvent::WaitingForNetwork { message } => format!("waiting for network: {}", message),
            SyncEvent::StreamError {
                result,
                retry_in: Some(delay),
            } => format!(
                "stream error [{}] {}; retrying in {} ms",
                result.category(),
                result.user_message(),
                delay.as_millis()
            ),
            SyncEvent::StreamError {
                result,
                retry_in: None,
            } => format!(
                "stream error [{}] {}; not retrying",
                result.category(),
                result.user_message()
            ),
            SyncEvent::RetriesExhausted { result, attempts } => format!(
                "gave up after {} retries: {}",
                attempts,
                result.user_message()
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablesync_types::TableStatus;
    use tempfile::tempdir;

    fn script(json: &str) -> Script {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn replays_dirty_table_scenario() {
        let s = script(
            r#"{ "steps": [
                { "op": "added", "key": "table_12", "payload": { "status": "OCCUPIED" } },
                { "op": "changed", "key": "table_12", "payload": { "status": "DIRTY" } },
                { "op": "added", "key": "table_3", "payload": { "status": "AVAILABLE" } }
            ] }"#,
        );

        let report = execute(&s, SyncConfig::default(), false).await.unwrap();

        let keys: Vec<u32> = report.tables.iter().map(|t| t.key.value()).collect();
        assert_eq!(keys, vec![3, 12]);
        assert_eq!(report.tables[1].status, TableStatus::Dirty);
        assert_eq!(report.alerts, vec![12]);
        assert_eq!(report.state, SyncState::Active);
        assert!(report
            .log
            .iter()
            .any(|l| l.ends_with("alert #12: Table 12 needs cleaning!")));
    }

    #[tokio::test(start_paused = true)]
    async fn replays_retry_after_cancel() {
        let s = script(
            r#"{ "steps": [
                { "op": "cancelled", "code": "NETWORK_ERROR", "message": "socket closed" },
                { "op": "wait", "ms": 3500 },
                { "op": "added", "key": "table_1", "payload": { "status": "DIRTY" } }
            ] }"#,
        );

        let report = execute(&s, SyncConfig::default(), false).await.unwrap();

        assert_eq!(report.state, SyncState::Active);
        assert_eq!(report.tables.len(), 1);
        assert!(report.log.iter().any(|l| l.contains("retrying in 3000 ms")));
        assert_eq!(
            report.log.iter().filter(|l| l.ends_with("subscribed")).count(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn offline_start_waits_for_network_step() {
        let s = script(
            r#"{ "steps": [
                { "op": "added", "key": "table_5" },
                { "op": "network", "online": true, "transport": "cellular" },
                { "op": "added", "key": "table_5", "payload": { "status": "DIRTY" } }
            ] }"#,
        );

        let report = execute(&s, SyncConfig::default(), true).await.unwrap();

        assert!(report.log.iter().any(|l| l.contains("waiting for network")));
        assert!(report.log.iter().any(|l| l.contains("dropped")));
        assert_eq!(report.alerts, vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn numeric_cancel_code_is_accepted() {
        let s = script(r#"{ "steps": [ { "op": "cancelled", "code": -3 } ] }"#);

        let report = execute(&s, SyncConfig::default(), false).await.unwrap();

        assert_eq!(report.state, SyncState::Idle);
        assert!(report.log.iter().any(|l| l.contains("[permission]")));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_cancel_name_fails() {
        let s = script(r#"{ "steps": [ { "op": "cancelled", "code": "NOPE" } ] }"#);
        assert!(execute(&s, SyncConfig::default(), false).await.is_err());
    }

    #[test]
    fn report_renders_grid() {
        let report = Report {
            log: vec!["[     0 ms] subscribed".into()],
            tables: vec![Table::new(
                "table_2",
                tablesync_types::TableKey::new(2),
                TableStatus::Dirty,
            )],
            alerts: vec![2],
            state: SyncState::Active,
        };
        let text = report.to_string();
        assert!(text.contains("State: Active"));
        assert!(text.contains("DIRTY"));
        assert!(text.contains("Alerts: 2"));
    }

    #[tokio::test]
    async fn run_rejects_missing_script() {
        let dir = tempdir().unwrap();
        let result = run(&dir.path().join("none.json"), SyncConfig::default(), false).await;
        assert!(result.is_err());
    }
}
