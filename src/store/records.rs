//! Record storage trait for client, investment, and beneficiary data.
//!
//! This is the boundary to the record-storage collaborator. The core treats
//! it as an opaque, possibly-slow, possibly-failing dependency; all calls
//! into it are wrapped by the retrying invoker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::StorageResult;

/// A client profile record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientProfile {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

/// A beneficiary on a client account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Beneficiary {
    pub id: String,
    pub name: String,
    pub relationship: String,
}

/// An investment account belonging to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentAccount {
    pub id: String,
    pub name: String,
    pub balance: f64,
    #[serde(default)]
    pub open: bool,
}

/// Key-indexed CRUD over client records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a client's profile.
    async fn get_client(&self, client_id: &str) -> StorageResult<ClientProfile>;

    /// Replace a client's profile.
    async fn update_client(&self, client_id: &str, profile: &ClientProfile) -> StorageResult<()>;

    /// List a client's beneficiaries.
    async fn list_beneficiaries(&self, client_id: &str) -> StorageResult<Vec<Beneficiary>>;

    /// Add a beneficiary, returning the stored record with its assigned id.
    async fn add_beneficiary(
        &self,
        client_id: &str,
        name: &str,
        relationship: &str,
    ) -> StorageResult<Beneficiary>;

    /// Delete a beneficiary by id.
    async fn delete_beneficiary(&self, client_id: &str, beneficiary_id: &str) -> StorageResult<()>;

    /// List a client's investment accounts.
    async fn list_investments(&self, client_id: &str) -> StorageResult<Vec<InvestmentAccount>>;

    /// Open a new investment account, returning the stored record.
    async fn open_investment(
        &self,
        client_id: &str,
        name: &str,
        initial_amount: f64,
    ) -> StorageResult<InvestmentAccount>;

    /// Close an investment account by id.
    async fn close_investment(&self, client_id: &str, investment_id: &str) -> StorageResult<()>;
}
