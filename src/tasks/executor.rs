//! Task executor: name-to-capability dispatch under the retry policy.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::process::ProcessCoordinator;
use crate::routing::RoutingContext;
use crate::store::RecordStore;

use super::account::{ApproveSignal, OpenInvestmentAccount, WorkerCommand};
use super::capability::{SharedCapability, TaskError, TaskOutput};
use super::invoker::Invoker;
use super::records::{
    AddBeneficiary, CloseInvestment, DeleteBeneficiary, GetClientProfile, ListBeneficiaries,
    ListInvestments, UpdateClientProfile,
};

/// Dependencies injected into the built-in capability set.
///
/// Constructed per session; nothing here is process-global.
pub struct TaskDependencies {
    pub records: Arc<dyn RecordStore>,
    pub coordinator: Arc<ProcessCoordinator>,
    pub worker_command: Option<WorkerCommand>,
}

/// Executes capability tasks by name, through the retrying invoker.
pub struct TaskExecutor {
    capabilities: HashMap<String, SharedCapability>,
    invoker: Invoker,
}

impl TaskExecutor {
    /// Create an empty executor.
    pub fn new(invoker: Invoker) -> Self {
        Self {
            capabilities: HashMap::new(),
            invoker,
        }
    }

    /// Register a capability. Later registrations win on name collision.
    pub fn register(&mut self, capability: SharedCapability) {
        let _ = self
            .capabilities
            .insert(capability.name().to_string(), capability);
    }

    /// Build the advisory capability set.
    pub fn advisory(invoker: Invoker, deps: TaskDependencies) -> Self {
        let mut executor = Self::new(invoker);

        executor.register(Arc::new(ListBeneficiaries::new(Arc::clone(&deps.records))));
        executor.register(Arc::new(AddBeneficiary::new(Arc::clone(&deps.records))));
        executor.register(Arc::new(DeleteBeneficiary::new(Arc::clone(&deps.records))));
        executor.register(Arc::new(ListInvestments::new(Arc::clone(&deps.records))));
        executor.register(Arc::new(CloseInvestment::new(Arc::clone(&deps.records))));
        executor.register(Arc::new(GetClientProfile::new(Arc::clone(&deps.records))));
        executor.register(Arc::new(UpdateClientProfile::new(Arc::clone(&deps.records))));
        executor.register(Arc::new(OpenInvestmentAccount::new(
            Arc::clone(&deps.coordinator),
            deps.worker_command.clone(),
        )));
        executor.register(Arc::new(ApproveSignal::kyc(Arc::clone(&deps.coordinator))));
        executor.register(Arc::new(ApproveSignal::compliance(deps.coordinator)));

        executor
    }

    /// Execute the named capability.
    pub async fn execute(
        &self,
        name: &str,
        arguments: &Value,
        context: &RoutingContext,
    ) -> Result<TaskOutput, TaskError> {
        let capability = self
            .capabilities
            .get(name)
            .ok_or_else(|| TaskError::Unknown(name.to_string()))?;

        self.invoker
            .invoke(capability.as_ref(), arguments, context)
            .await
    }

    /// Registered capability names.
    pub fn capability_names(&self) -> Vec<&str> {
        self.capabilities.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::file::FileRecordStore;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    async fn advisory_executor(temp_dir: &TempDir) -> TaskExecutor {
        let records = FileRecordStore::new(temp_dir.path().join("records.json"));
        records.seed_demo_data().await.unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        TaskExecutor::advisory(
            Invoker::default(),
            TaskDependencies {
                records: Arc::new(records),
                coordinator: Arc::new(ProcessCoordinator::new(tx)),
                worker_command: None,
            },
        )
    }

    #[tokio::test]
    async fn executes_registered_capability() {
        let temp_dir = TempDir::new().unwrap();
        let executor = advisory_executor(&temp_dir).await;

        let output = executor
            .execute(
                "list_investments",
                &json!({"account_id": "CL-1001"}),
                &RoutingContext::new(),
            )
            .await
            .unwrap();
        assert!(output.value.is_array());
    }

    #[tokio::test]
    async fn unknown_capability_errors() {
        let temp_dir = TempDir::new().unwrap();
        let executor = advisory_executor(&temp_dir).await;

        let err = executor
            .execute("launch_rocket", &json!({}), &RoutingContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Unknown(name) if name == "launch_rocket"));
    }

    #[tokio::test]
    async fn advisory_set_is_complete() {
        let temp_dir = TempDir::new().unwrap();
        let executor = advisory_executor(&temp_dir).await;
        let names = executor.capability_names();

        for expected in [
            "list_beneficiaries",
            "add_beneficiary",
            "delete_beneficiary",
            "list_investments",
            "close_investment",
            "get_client_profile",
            "update_client_profile",
            "open_investment_account",
            "approve_kyc",
            "approve_compliance",
        ] {
            assert!(names.contains(&expected), "missing capability {expected}");
        }
    }
}
