//! File-based record store.
//!
//! A single JSON document holds every client with their profile,
//! beneficiaries, and investment accounts. Each operation re-reads the
//! document and writes it back atomically under a lock; this mirrors the
//! simple store-backed managers the capability layer was designed against
//! and keeps the store safe for concurrent sessions.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;

use crate::store::error::{StorageError, StorageResult};
use crate::store::{Beneficiary, ClientProfile, InvestmentAccount, RecordStore};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ClientRecord {
    #[serde(default)]
    profile: ClientProfile,
    #[serde(default)]
    beneficiaries: Vec<Beneficiary>,
    #[serde(default)]
    investments: Vec<InvestmentAccount>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RecordsDocument {
    #[serde(default)]
    clients: BTreeMap<String, ClientRecord>,
    /// Monotonic counter for assigned record ids.
    #[serde(default)]
    next_id: u64,
}

/// File-backed implementation of `RecordStore`.
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRecordStore {
    /// Create a record store over the given document path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_document(&self) -> StorageResult<RecordsDocument> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RecordsDocument::default());
            }
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        serde_json::from_str(&contents)
            .map_err(|e| StorageError::deserialization(&self.path, e.to_string()))
    }

    async fn write_document(&self, document: &RecordsDocument) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }

        let contents = serde_json::to_string_pretty(document)
            .map_err(|e| StorageError::serialization(e.to_string()))?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, contents.as_bytes())
            .await
            .map_err(|e| StorageError::io(&temp_path, e))?;
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| StorageError::io(&self.path, e))
    }

    /// Run a read-modify-write mutation on one client record.
    async fn with_client<T>(
        &self,
        client_id: &str,
        mutate: impl FnOnce(&mut ClientRecord, &mut u64) -> StorageResult<T> + Send,
    ) -> StorageResult<T> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.read_document().await?;
        let mut next_id = document.next_id;
        let record = document
            .clients
            .get_mut(client_id)
            .ok_or_else(|| StorageError::not_found("client", client_id))?;

        let result = mutate(record, &mut next_id)?;
        document.next_id = next_id;
        self.write_document(&document).await?;
        Ok(result)
    }

    fn client<'a>(
        document: &'a RecordsDocument,
        client_id: &str,
    ) -> StorageResult<&'a ClientRecord> {
        document
            .clients
            .get(client_id)
            .ok_or_else(|| StorageError::not_found("client", client_id))
    }

    /// Seed the demo book of business used by the default configuration.
    pub async fn seed_demo_data(&self) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.read_document().await?;
        if !document.clients.is_empty() {
            return Ok(());
        }

        let _ = document.clients.insert(
            "CL-1001".to_string(),
            ClientRecord {
                profile: ClientProfile {
                    first_name: "Alex".to_string(),
                    last_name: "Morgan".to_string(),
                    address: "12 Harbor Lane".to_string(),
                    phone: "555-0142".to_string(),
                    email: "alex.morgan@example.com".to_string(),
                },
                beneficiaries: vec![
                    Beneficiary {
                        id: "BEN-1".to_string(),
                        name: "Fred".to_string(),
                        relationship: "son".to_string(),
                    },
                    Beneficiary {
                        id: "BEN-2".to_string(),
                        name: "Sandy".to_string(),
                        relationship: "daughter".to_string(),
                    },
                    Beneficiary {
                        id: "BEN-3".to_string(),
                        name: "Jessica".to_string(),
                        relationship: "daughter".to_string(),
                    },
                ],
                investments: vec![
                    InvestmentAccount {
                        id: "INV-1".to_string(),
                        name: "Checking".to_string(),
                        balance: 203.45,
                        open: true,
                    },
                    InvestmentAccount {
                        id: "INV-2".to_string(),
                        name: "Savings".to_string(),
                        balance: 375.81,
                        open: true,
                    },
                    InvestmentAccount {
                        id: "INV-3".to_string(),
                        name: "Retirement".to_string(),
                        balance: 24648.63,
                        open: true,
                    },
                ],
            },
        );
        document.next_id = 4;

        self.write_document(&document).await
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn get_client(&self, client_id: &str) -> StorageResult<ClientProfile> {
        let document = self.read_document().await?;
        Ok(Self::client(&document, client_id)?.profile.clone())
    }

    async fn update_client(&self, client_id: &str, profile: &ClientProfile) -> StorageResult<()> {
        let profile = profile.clone();
        self.with_client(client_id, move |record, _| {
            record.profile = profile;
            Ok(())
        })
        .await
    }

    async fn list_beneficiaries(&self, client_id: &str) -> StorageResult<Vec<Beneficiary>> {
        let document = self.read_document().await?;
        Ok(Self::client(&document, client_id)?.beneficiaries.clone())
    }

    async fn add_beneficiary(
        &self,
        client_id: &str,
        name: &str,
        relationship: &str,
    ) -> StorageResult<Beneficiary> {
        let name = name.to_string();
        let relationship = relationship.to_string();
        self.with_client(client_id, move |record, next_id| {
            let beneficiary = Beneficiary {
                id: format!("BEN-{next_id}"),
                name,
                relationship,
            };
            *next_id += 1;
            record.beneficiaries.push(beneficiary.clone());
            Ok(beneficiary)
        })
        .await
    }

    async fn delete_beneficiary(&self, client_id: &str, beneficiary_id: &str) -> StorageResult<()> {
        let beneficiary_id = beneficiary_id.to_string();
        self.with_client(client_id, move |record, _| {
            let before = record.beneficiaries.len();
            record.beneficiaries.retain(|b| b.id != beneficiary_id);
            if record.beneficiaries.len() == before {
                return Err(StorageError::not_found("beneficiary", beneficiary_id));
            }
            Ok(())
        })
        .await
    }

    async fn list_investments(&self, client_id: &str) -> StorageResult<Vec<InvestmentAccount>> {
        let document = self.read_document().await?;
        Ok(Self::client(&document, client_id)?.investments.clone())
    }

    async fn open_investment(
        &self,
        client_id: &str,
        name: &str,
        initial_amount: f64,
    ) -> StorageResult<InvestmentAccount> {
        let name = name.to_string();
        self.with_client(client_id, move |record, next_id| {
            let account = InvestmentAccount {
                id: format!("INV-{next_id}"),
                name,
                balance: initial_amount,
                open: true,
            };
            *next_id += 1;
            record.investments.push(account.clone());
            Ok(account)
        })
        .await
    }

    async fn close_investment(&self, client_id: &str, investment_id: &str) -> StorageResult<()> {
        let investment_id = investment_id.to_string();
        self.with_client(client_id, move |record, _| {
            let account = record
                .investments
                .iter_mut()
                .find(|i| i.id == investment_id)
                .ok_or_else(|| StorageError::not_found("investment", investment_id))?;
            account.open = false;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn seeded_store(temp_dir: &TempDir) -> FileRecordStore {
        let store = FileRecordStore::new(temp_dir.path().join("records.json"));
        store.seed_demo_data().await.unwrap();
        store
    }

    #[tokio::test]
    async fn seeded_client_has_demo_records() {
        let temp_dir = TempDir::new().unwrap();
        let store = seeded_store(&temp_dir).await;

        let profile = store.get_client("CL-1001").await.unwrap();
        assert_eq!(profile.first_name, "Alex");

        let beneficiaries = store.list_beneficiaries("CL-1001").await.unwrap();
        assert_eq!(beneficiaries.len(), 3);

        let investments = store.list_investments("CL-1001").await.unwrap();
        assert_eq!(investments.len(), 3);
        assert!(investments.iter().any(|i| i.name == "Retirement"));
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = seeded_store(&temp_dir).await;
        store.seed_demo_data().await.unwrap();

        assert_eq!(store.list_beneficiaries("CL-1001").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unknown_client_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = seeded_store(&temp_dir).await;

        let err = store.get_client("CL-9999").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn beneficiary_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let store = seeded_store(&temp_dir).await;

        let added = store
            .add_beneficiary("CL-1001", "Nora", "daughter")
            .await
            .unwrap();
        assert_eq!(store.list_beneficiaries("CL-1001").await.unwrap().len(), 4);

        store.delete_beneficiary("CL-1001", &added.id).await.unwrap();
        assert_eq!(store.list_beneficiaries("CL-1001").await.unwrap().len(), 3);

        let err = store
            .delete_beneficiary("CL-1001", &added.id)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn investment_open_and_close() {
        let temp_dir = TempDir::new().unwrap();
        let store = seeded_store(&temp_dir).await;

        let account = store
            .open_investment("CL-1001", "Brokerage", 1000.0)
            .await
            .unwrap();
        assert!(account.open);

        store.close_investment("CL-1001", &account.id).await.unwrap();
        let investments = store.list_investments("CL-1001").await.unwrap();
        let closed = investments.iter().find(|i| i.id == account.id).unwrap();
        assert!(!closed.open);
    }

    #[tokio::test]
    async fn ids_keep_advancing_across_reloads() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("records.json");

        let first_id = {
            let store = FileRecordStore::new(&path);
            store.seed_demo_data().await.unwrap();
            store
                .add_beneficiary("CL-1001", "Ann", "spouse")
                .await
                .unwrap()
                .id
        };

        let store = FileRecordStore::new(&path);
        let second_id = store
            .add_beneficiary("CL-1001", "Bob", "brother")
            .await
            .unwrap()
            .id;

        assert_ne!(first_id, second_id);
    }
}
