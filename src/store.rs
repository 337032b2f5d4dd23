//! Directory and ledger store contracts, with an in-memory implementation.
//!
//! The engine only talks to these traits. [`MemoryLedger`] backs the CLI and
//! the tests; a database-backed store has to give the same guarantees, in
//! particular that [`LedgerStore::commit`] applies a whole batch or nothing.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::Amount;
use crate::model::{Account, AccountId, Owner, OwnerId, TransactionRecord};
use crate::pix::{PixKeyType, PixKeys};

/// Opaque persistence failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Why an insert was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InsertError {
    #[error("account {0} already exists")]
    DuplicateId(AccountId),
    #[error("account number {account} already exists in agency {agency}")]
    DuplicateNumber { account: String, agency: String },
    #[error("owner {0} already has an account")]
    DuplicateOwner(OwnerId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a conditional write was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitError {
    #[error("account {0} was modified concurrently")]
    Conflict(AccountId),
    #[error("account {0} not found")]
    Missing(AccountId),
    #[error("PIX key {key_type} '{value}' is already registered to another account")]
    DuplicatePixKey { key_type: PixKeyType, value: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One side of an atomic commit: new balance and the history entry explaining it.
#[derive(Debug, Clone)]
pub struct BalanceUpdate {
    pub account: AccountId,
    /// The version the caller read; the update is refused if the stored one differs.
    pub expected_version: u64,
    pub new_balance: Amount,
    pub record: TransactionRecord,
}

/// Read side: resolve accounts.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    async fn find_by_account_and_agency(&self, account: &str, agency: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_owner(&self, owner: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_pix_key(&self, key_type: PixKeyType, value: &str) -> Result<Option<Account>, StoreError>;

    async fn list(&self) -> Result<Vec<Account>, StoreError>;
}

/// Write side: account records, balances and history.
#[async_trait]
pub trait LedgerStore: Directory {
    async fn insert(&self, account: Account) -> Result<(), InsertError>;

    /// Remove an account; `false` if it did not exist.
    async fn remove(&self, id: AccountId) -> Result<bool, StoreError>;

    /// Apply every update or none of them.
    async fn commit(&self, updates: Vec<BalanceUpdate>) -> Result<(), CommitError>;

    /// Replace the PIX keys of an account. Key values are unique across all
    /// accounts and all key types.
    async fn update_pix_keys(&self, id: AccountId, expected_version: u64, keys: PixKeys) -> Result<(), CommitError>;
}

/// Owner profiles.
#[async_trait]
pub trait Owners: Send + Sync {
    async fn find_owner(&self, id: &str) -> Result<Option<Owner>, StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    owners: HashMap<OwnerId, Owner>,
}

impl Tables {
    fn holder_of(&self, key_type: PixKeyType, value: &str) -> Option<&Account> {
        self.accounts
            .values()
            .find(|a| a.pix_keys.get(key_type) == Some(value))
    }

    /// Any account holding `value`, whatever the key type it is registered under.
    fn value_holder(&self, value: &str) -> Option<&Account> {
        self.accounts
            .values()
            .find(|a| a.pix_keys.iter().any(|(_, held)| held == value))
    }

    /// Check one account against its expected version.
    fn check(&self, id: AccountId, expected_version: u64) -> Result<(), CommitError> {
        let account = self.accounts.get(&id).ok_or(CommitError::Missing(id))?;
        if account.version != expected_version {
            return Err(CommitError::Conflict(id));
        }
        Ok(())
    }
}

/// In-memory ledger. All writes go through a single lock, so a commit batch
/// is observed either fully applied or not at all.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    tables: RwLock<Tables>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an owner profile.
    pub async fn put_owner(&self, owner: Owner) {
        self.tables.write().await.owners.insert(owner.id.clone(), owner);
    }

    /// Remove an owner profile.
    pub async fn remove_owner(&self, id: &str) -> bool {
        self.tables.write().await.owners.remove(id).is_some()
    }
}

#[async_trait]
impl Directory for MemoryLedger {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.tables.read().await.accounts.get(&id).cloned())
    }

    async fn find_by_account_and_agency(&self, account: &str, agency: &str) -> Result<Option<Account>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .accounts
            .values()
            .find(|a| a.account == account && a.agency == agency)
            .cloned())
    }

    async fn find_by_owner(&self, owner: &str) -> Result<Option<Account>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.accounts.values().find(|a| a.owner == owner).cloned())
    }

    async fn find_by_pix_key(&self, key_type: PixKeyType, value: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.tables.read().await.holder_of(key_type, value).cloned())
    }

    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.tables.read().await.accounts.values().cloned().collect())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn insert(&self, account: Account) -> Result<(), InsertError> {
        let mut tables = self.tables.write().await;
        if tables.accounts.contains_key(&account.id) {
            return Err(InsertError::DuplicateId(account.id));
        }
        for existing in tables.accounts.values() {
            if existing.account == account.account && existing.agency == account.agency {
                return Err(InsertError::DuplicateNumber {
                    account: account.account,
                    agency: account.agency,
                });
            }
            if existing.owner == account.owner {
                return Err(InsertError::DuplicateOwner(account.owner));
            }
        }
        debug!(id = %account.id, owner = %account.owner, "account inserted");
        tables.accounts.insert(account.id, account);
        Ok(())
    }

    async fn remove(&self, id: AccountId) -> Result<bool, StoreError> {
        Ok(self.tables.write().await.accounts.remove(&id).is_some())
    }

    async fn commit(&self, updates: Vec<BalanceUpdate>) -> Result<(), CommitError> {
        let mut tables = self.tables.write().await;

        // validate the whole batch before touching anything
        for update in &updates {
            tables.check(update.account, update.expected_version)?;
        }

        for update in updates {
            if let Some(account) = tables.accounts.get_mut(&update.account) {
                account.balance = update.new_balance;
                account.history.push(update.record);
                account.version += 1;
            }
        }
        Ok(())
    }

    async fn update_pix_keys(&self, id: AccountId, expected_version: u64, keys: PixKeys) -> Result<(), CommitError> {
        let mut tables = self.tables.write().await;
        tables.check(id, expected_version)?;

        for (key_type, value) in keys.iter() {
            if let Some(holder) = tables.value_holder(value)
                && holder.id != id
            {
                return Err(CommitError::DuplicatePixKey {
                    key_type,
                    value: value.to_string(),
                });
            }
        }

        if let Some(account) = tables.accounts.get_mut(&id) {
            account.pix_keys = keys;
            account.version += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl Owners for MemoryLedger {
    async fn find_owner(&self, id: &str) -> Result<Option<Owner>, StoreError> {
        Ok(self.tables.read().await.owners.get(id).cloned())
    }
}
