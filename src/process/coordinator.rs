//! Child process coordinator.
//!
//! Spawns named dependent worker processes (e.g. the account-opening
//! worker) and bridges their stdio to the owning session: every line the
//! worker writes to stdout is forwarded to the session's status sink, where
//! it becomes an `ExternalStatus` pending event. Approval signals travel
//! the other way, as lines written to the worker's stdin. The worker never
//! mutates session state directly; the queued-event channel is its only
//! path in.

use std::process::Stdio;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

/// Sender side of the status sink; the session actor holds the receiver.
pub type StatusSender = mpsc::UnboundedSender<String>;

/// Errors from coordinator operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("failed to spawn worker '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker '{0}' is already running")]
    AlreadyRunning(String),

    #[error("worker '{0}' is not running")]
    NotRunning(String),

    #[error("failed to signal worker '{name}': {source}")]
    Signal {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

struct WorkerHandle {
    stdin: Arc<Mutex<ChildStdin>>,
}

/// Per-session coordinator for dependent worker processes.
pub struct ProcessCoordinator {
    status_tx: StatusSender,
    workers: Arc<DashMap<String, WorkerHandle>>,
}

impl ProcessCoordinator {
    /// Create a coordinator that forwards worker status to `status_tx`.
    pub fn new(status_tx: StatusSender) -> Self {
        Self {
            status_tx,
            workers: Arc::new(DashMap::new()),
        }
    }

    /// Start a named worker process.
    ///
    /// Stdout lines are forwarded to the status sink prefixed with the
    /// worker name. The child is killed if the coordinator is dropped.
    pub fn start(
        &self,
        name: &str,
        command: &str,
        args: &[String],
    ) -> Result<(), CoordinatorError> {
        if self.workers.contains_key(name) {
            return Err(CoordinatorError::AlreadyRunning(name.to_string()));
        }

        info!(worker = %name, command = %command, "Spawning worker process");

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CoordinatorError::Spawn {
                name: name.to_string(),
                source: e,
            })?;

        let stdin = child.stdin.take().expect("stdin is piped");
        let stdout = child.stdout.take().expect("stdout is piped");

        let _ = self.workers.insert(
            name.to_string(),
            WorkerHandle {
                stdin: Arc::new(Mutex::new(stdin)),
            },
        );

        // Bridge stdout lines to the status sink until the worker exits.
        let worker_name = name.to_string();
        let status_tx = self.status_tx.clone();
        let workers = Arc::clone(&self.workers);
        let _ = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        debug!(worker = %worker_name, status = %line, "Worker status");
                        if status_tx.send(format!("{worker_name}: {line}")).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(worker = %worker_name, error = %e, "Worker stdout read failed");
                        break;
                    }
                }
            }

            let status = child.wait().await;
            let _ = workers.remove(&worker_name);
            let exit = status
                .map(|s| s.code().map_or("signal".to_string(), |c| c.to_string()))
                .unwrap_or_else(|e| e.to_string());
            info!(worker = %worker_name, exit = %exit, "Worker process exited");
            let _ = status_tx.send(format!("{worker_name}: exited ({exit})"));
        });

        Ok(())
    }

    /// Send a signal line to a running worker's stdin.
    pub async fn signal(&self, name: &str, line: &str) -> Result<(), CoordinatorError> {
        let stdin = {
            let handle = self
                .workers
                .get(name)
                .ok_or_else(|| CoordinatorError::NotRunning(name.to_string()))?;
            Arc::clone(&handle.stdin)
        };

        let mut stdin = stdin.lock().await;
        let payload = format!("{line}\n");
        stdin
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| CoordinatorError::Signal {
                name: name.to_string(),
                source: e,
            })?;
        stdin.flush().await.map_err(|e| CoordinatorError::Signal {
            name: name.to_string(),
            source: e,
        })
    }

    /// Whether the named worker is currently running.
    pub fn is_running(&self, name: &str) -> bool {
        self.workers.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn worker_status_lines_reach_the_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let coordinator = ProcessCoordinator::new(tx);

        coordinator
            .start(
                "opener",
                "sh",
                &["-c".to_string(), "echo Initializing; echo Waiting KYC".to_string()],
            )
            .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, "opener: Initializing");

        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, "opener: Waiting KYC");

        // Exit notice follows once the process finishes.
        let exit = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(exit.starts_with("opener: exited"));
    }

    #[tokio::test]
    async fn signal_reaches_worker_stdin() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let coordinator = ProcessCoordinator::new(tx);

        // Worker echoes back each line it reads.
        coordinator
            .start(
                "echoer",
                "sh",
                &["-c".to_string(), "read line; echo \"got $line\"".to_string()],
            )
            .unwrap();

        coordinator.signal("echoer", "approve_kyc").await.unwrap();

        let echoed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(echoed, "echoer: got approve_kyc");
    }

    #[tokio::test]
    async fn signal_unknown_worker_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let coordinator = ProcessCoordinator::new(tx);

        let err = coordinator.signal("ghost", "hello").await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NotRunning(_)));
    }

    #[tokio::test]
    async fn duplicate_start_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let coordinator = ProcessCoordinator::new(tx);

        coordinator
            .start("w", "sh", &["-c".to_string(), "sleep 5".to_string()])
            .unwrap();
        let err = coordinator
            .start("w", "sh", &["-c".to_string(), "sleep 5".to_string()])
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::AlreadyRunning(_)));
    }
}
