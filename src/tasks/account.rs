//! Account-opening capabilities.
//!
//! Account opening runs in a dependent worker process: the capability
//! starts it, the worker reports state changes on stdout (which come back
//! to the session as external status events), and the KYC/compliance
//! approvals are signal lines written to its stdin.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::process::{CoordinatorError, ProcessCoordinator};
use crate::routing::RoutingContext;

use super::capability::{Capability, TaskError, TaskOutput, required_str};

/// Context key holding the name of the running account worker.
pub const ACCOUNT_WORKER_KEY: &str = "account_worker";

/// Command used to launch the account-opening worker.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub command: String,
    pub args: Vec<String>,
}

pub struct OpenInvestmentAccount {
    coordinator: Arc<ProcessCoordinator>,
    worker: Option<WorkerCommand>,
}

impl OpenInvestmentAccount {
    pub fn new(coordinator: Arc<ProcessCoordinator>, worker: Option<WorkerCommand>) -> Self {
        Self { coordinator, worker }
    }
}

#[async_trait]
impl Capability for OpenInvestmentAccount {
    fn name(&self) -> &str {
        "open_investment_account"
    }

    async fn invoke(
        &self,
        arguments: &Value,
        _context: &RoutingContext,
    ) -> Result<TaskOutput, TaskError> {
        let client_id = required_str(arguments, "client_id")?;
        let account_name = required_str(arguments, "account_name")?;
        let initial_amount = arguments
            .get("initial_amount")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        // Absent worker configuration is a permanent condition; retrying
        // cannot fix it.
        let worker = self.worker.as_ref().ok_or_else(|| {
            TaskError::Fatal("account worker command is not configured".to_string())
        })?;

        let worker_name = format!("open-account-{client_id}-{account_name}");

        let mut args = worker.args.clone();
        args.push(client_id.to_string());
        args.push(account_name.to_string());
        args.push(initial_amount.to_string());

        match self.coordinator.start(&worker_name, &worker.command, &args) {
            Ok(()) => {}
            // Idempotent under at-least-once: a retried call finds the
            // worker already started and reports the same outcome.
            Err(CoordinatorError::AlreadyRunning(_)) => {}
            Err(e @ CoordinatorError::Spawn { .. }) => {
                return Err(TaskError::Retryable(e.to_string()));
            }
            Err(e) => return Err(TaskError::Fatal(e.to_string())),
        }

        Ok(TaskOutput::value(json!({
            "worker": worker_name,
            "account_name": account_name,
            "initial_amount": initial_amount,
            "state": "Initializing",
        }))
        .with_context("client_id", client_id)
        .with_context(ACCOUNT_WORKER_KEY, worker_name.clone()))
    }
}

/// Capability writing one approval signal line to the running worker.
pub struct ApproveSignal {
    name: &'static str,
    signal: &'static str,
    coordinator: Arc<ProcessCoordinator>,
}

impl ApproveSignal {
    pub fn kyc(coordinator: Arc<ProcessCoordinator>) -> Self {
        Self {
            name: "approve_kyc",
            signal: "verify_kyc",
            coordinator,
        }
    }

    pub fn compliance(coordinator: Arc<ProcessCoordinator>) -> Self {
        Self {
            name: "approve_compliance",
            signal: "compliance_approved",
            coordinator,
        }
    }
}

#[async_trait]
impl Capability for ApproveSignal {
    fn name(&self) -> &str {
        self.name
    }

    async fn invoke(
        &self,
        _arguments: &Value,
        context: &RoutingContext,
    ) -> Result<TaskOutput, TaskError> {
        let worker = context.get(ACCOUNT_WORKER_KEY).ok_or_else(|| {
            TaskError::Fatal("no account opening is in progress".to_string())
        })?;

        match self.coordinator.signal(worker, self.signal).await {
            Ok(()) => Ok(TaskOutput::value(json!({
                "worker": worker,
                "signal": self.signal,
            }))),
            Err(e @ CoordinatorError::NotRunning(_)) => Err(TaskError::Fatal(e.to_string())),
            Err(e) => Err(TaskError::Retryable(e.to_string())),
        }
    }
}
