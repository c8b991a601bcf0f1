//! Record-store capabilities.
//!
//! These wrap the record-storage collaborator (clients, investments,
//! beneficiaries) as invocable task units. Successful lookups remember the
//! account id in the routing context so later turns don't have to ask
//! again.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::routing::RoutingContext;
use crate::store::{ClientProfile, RecordStore};

use super::capability::{Capability, TaskError, TaskOutput, required_str};

pub struct ListBeneficiaries {
    records: Arc<dyn RecordStore>,
}

impl ListBeneficiaries {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl Capability for ListBeneficiaries {
    fn name(&self) -> &str {
        "list_beneficiaries"
    }

    async fn invoke(
        &self,
        arguments: &Value,
        _context: &RoutingContext,
    ) -> Result<TaskOutput, TaskError> {
        let account_id = required_str(arguments, "account_id")?;
        let beneficiaries = self.records.list_beneficiaries(account_id).await?;
        Ok(TaskOutput::value(serde_json::to_value(beneficiaries).map_err(
            |e| TaskError::Fatal(e.to_string()),
        )?)
        .with_context("client_id", account_id))
    }
}

pub struct AddBeneficiary {
    records: Arc<dyn RecordStore>,
}

impl AddBeneficiary {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl Capability for AddBeneficiary {
    fn name(&self) -> &str {
        "add_beneficiary"
    }

    async fn invoke(
        &self,
        arguments: &Value,
        _context: &RoutingContext,
    ) -> Result<TaskOutput, TaskError> {
        let account_id = required_str(arguments, "account_id")?;
        let name = required_str(arguments, "name")
            .map_err(|_| TaskError::bad_argument("beneficiary name is required"))?;
        let relationship = arguments
            .get("relationship")
            .and_then(Value::as_str)
            .unwrap_or("unspecified");

        let beneficiary = self
            .records
            .add_beneficiary(account_id, name, relationship)
            .await?;
        Ok(TaskOutput::value(
            serde_json::to_value(beneficiary).map_err(|e| TaskError::Fatal(e.to_string()))?,
        )
        .with_context("client_id", account_id))
    }
}

pub struct DeleteBeneficiary {
    records: Arc<dyn RecordStore>,
}

impl DeleteBeneficiary {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl Capability for DeleteBeneficiary {
    fn name(&self) -> &str {
        "delete_beneficiary"
    }

    async fn invoke(
        &self,
        arguments: &Value,
        _context: &RoutingContext,
    ) -> Result<TaskOutput, TaskError> {
        let account_id = required_str(arguments, "account_id")?;
        let name = required_str(arguments, "name")
            .map_err(|_| TaskError::bad_argument("beneficiary name is required"))?;

        // Resolve the name to a beneficiary id; deletion is by id.
        let beneficiaries = self.records.list_beneficiaries(account_id).await?;
        let target = beneficiaries
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                TaskError::Fatal(format!("no beneficiary named '{name}' on account"))
            })?;

        self.records
            .delete_beneficiary(account_id, &target.id)
            .await?;
        Ok(
            TaskOutput::value(json!({"deleted": target.id, "name": target.name}))
                .with_context("client_id", account_id),
        )
    }
}

pub struct ListInvestments {
    records: Arc<dyn RecordStore>,
}

impl ListInvestments {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl Capability for ListInvestments {
    fn name(&self) -> &str {
        "list_investments"
    }

    async fn invoke(
        &self,
        arguments: &Value,
        _context: &RoutingContext,
    ) -> Result<TaskOutput, TaskError> {
        let account_id = required_str(arguments, "account_id")?;
        let investments = self.records.list_investments(account_id).await?;
        Ok(TaskOutput::value(
            serde_json::to_value(investments).map_err(|e| TaskError::Fatal(e.to_string()))?,
        )
        .with_context("client_id", account_id))
    }
}

pub struct CloseInvestment {
    records: Arc<dyn RecordStore>,
}

impl CloseInvestment {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl Capability for CloseInvestment {
    fn name(&self) -> &str {
        "close_investment"
    }

    async fn invoke(
        &self,
        arguments: &Value,
        _context: &RoutingContext,
    ) -> Result<TaskOutput, TaskError> {
        let account_id = required_str(arguments, "account_id")?;
        let name = required_str(arguments, "name")
            .map_err(|_| TaskError::bad_argument("investment account name is required"))?;

        let investments = self.records.list_investments(account_id).await?;
        let target = investments
            .iter()
            .find(|i| i.open && i.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                TaskError::Fatal(format!("no open investment account named '{name}'"))
            })?;

        self.records.close_investment(account_id, &target.id).await?;
        Ok(
            TaskOutput::value(json!({"closed": target.id, "name": target.name}))
                .with_context("client_id", account_id),
        )
    }
}

pub struct GetClientProfile {
    records: Arc<dyn RecordStore>,
}

impl GetClientProfile {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl Capability for GetClientProfile {
    fn name(&self) -> &str {
        "get_client_profile"
    }

    async fn invoke(
        &self,
        arguments: &Value,
        context: &RoutingContext,
    ) -> Result<TaskOutput, TaskError> {
        let client_id = client_id_from(arguments, context)?;
        let profile = self.records.get_client(&client_id).await?;
        Ok(TaskOutput::value(
            serde_json::to_value(profile).map_err(|e| TaskError::Fatal(e.to_string()))?,
        )
        .with_context("client_id", client_id))
    }
}

pub struct UpdateClientProfile {
    records: Arc<dyn RecordStore>,
}

impl UpdateClientProfile {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl Capability for UpdateClientProfile {
    fn name(&self) -> &str {
        "update_client_profile"
    }

    async fn invoke(
        &self,
        arguments: &Value,
        context: &RoutingContext,
    ) -> Result<TaskOutput, TaskError> {
        let client_id = client_id_from(arguments, context)?;
        let profile: ClientProfile = serde_json::from_value(
            arguments.get("profile").cloned().unwrap_or(Value::Null),
        )
        .map_err(|e| TaskError::bad_argument(format!("invalid profile: {e}")))?;

        self.records.update_client(&client_id, &profile).await?;
        Ok(TaskOutput::value(json!({"updated": client_id})).with_context("client_id", client_id))
    }
}

/// Client id from arguments, falling back to the routing context.
fn client_id_from(arguments: &Value, context: &RoutingContext) -> Result<String, TaskError> {
    if let Ok(id) = required_str(arguments, "client_id") {
        return Ok(id.to_string());
    }
    context
        .get("client_id")
        .map(str::to_string)
        .ok_or_else(|| TaskError::bad_argument("no client id available"))
}
