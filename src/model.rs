//! Core domain types for the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::Amount;
use crate::pix::PixKeys;

/// Account identifier.
pub type AccountId = Uuid;

/// Owner (user) identifier. Owners live outside this crate.
pub type OwnerId = String;

/// A bank account as held by the ledger store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    pub owner: OwnerId,
    pub agency: String,
    pub account: String,
    pub balance: Amount,
    #[serde(default)]
    pub pix_keys: PixKeys,
    #[serde(default)]
    pub history: Vec<TransactionRecord>,
    /// Bumped by the store on every write; used for optimistic concurrency.
    #[serde(default)]
    pub version: u64,
}

impl Account {
    /// A new, empty account.
    pub fn new(owner: impl Into<OwnerId>, agency: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            agency: agency.into(),
            account: account.into(),
            balance: Amount::ZERO,
            pix_keys: PixKeys::default(),
            history: Vec::new(),
            version: 0,
        }
    }

    pub fn with_balance(mut self, balance: Amount) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_pix_keys(mut self, pix_keys: PixKeys) -> Self {
        self.pix_keys = pix_keys;
        self
    }

    pub fn account_ref(&self) -> AccountRef {
        AccountRef::new(&self.account, &self.agency)
    }
}

/// Account number + agency pair identifying an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountRef {
    pub account: String,
    pub agency: String,
}

impl AccountRef {
    pub fn new(account: impl Into<String>, agency: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            agency: agency.into(),
        }
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.agency, self.account)
    }
}

/// The owner of an account, as far as this crate needs to know it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: OwnerId,
    pub name: String,
    pub cpf: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferType {
    Pix,
    Ted,
    Doc,
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransferType::Pix => "PIX",
            TransferType::Ted => "TED",
            TransferType::Doc => "DOC",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
    Transference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Credit,
    Debit,
}

/// The other side of a transference, as shown in a history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    pub name: String,
    pub account: String,
    pub agency: String,
}

/// One entry in an account's transaction history. Never modified once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    #[serde(rename = "transactionId")]
    pub id: String,
    #[serde(rename = "dateTime")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub category: Category,
    pub value: Amount,
    /// Balance right after this transaction.
    #[serde(rename = "currentBalance")]
    pub balance: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_type: Option<TransferType>,
    #[serde(default, rename = "senderOrReceiverAccount", skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<Counterparty>,
}

impl TransactionRecord {
    pub fn new(kind: TransactionKind, category: Category, value: Amount, balance: Amount) -> Self {
        Self {
            id: format!("T{}", Uuid::new_v4().simple()),
            timestamp: Utc::now(),
            kind,
            category,
            value,
            balance,
            description: None,
            transfer_type: None,
            counterparty: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.filter(|d| !d.is_empty());
        self
    }

    pub fn with_transfer(mut self, transfer_type: TransferType, counterparty: Counterparty) -> Self {
        self.transfer_type = Some(transfer_type);
        self.counterparty = Some(counterparty);
        self
    }
}

/// Receiver side of a transfer request. Which fields are required depends on
/// the transfer type: account + agency for TED/DOC, pix key for PIX.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverRef {
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub agency: Option<String>,
    #[serde(default)]
    pub pix_key: Option<String>,
}

/// A request to move money between two accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(rename = "transferValue")]
    pub value: Amount,
    pub sender: AccountRef,
    pub receiver: ReceiverRef,
    pub transfer_type: TransferType,
    #[serde(default)]
    pub description: Option<String>,
}

impl TransferRequest {
    /// A TED or DOC transfer between two account numbers.
    pub fn wire(transfer_type: TransferType, value: Amount, sender: AccountRef, receiver: AccountRef) -> Self {
        Self {
            value,
            sender,
            receiver: ReceiverRef {
                account: Some(receiver.account),
                agency: Some(receiver.agency),
                pix_key: None,
            },
            transfer_type,
            description: None,
        }
    }

    pub fn pix(value: Amount, sender: AccountRef, key: impl Into<String>) -> Self {
        Self {
            value,
            sender,
            receiver: ReceiverRef {
                pix_key: Some(key.into()),
                ..ReceiverRef::default()
            },
            transfer_type: TransferType::Pix,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A balance-affecting operation, as fed to [`Engine::run`](crate::Engine::run).
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Move money between two accounts.
    Transfer(TransferRequest),
    /// Credit an account.
    Deposit {
        target: AccountRef,
        value: Amount,
        description: Option<String>,
    },
    /// Debit an account.
    Withdraw {
        target: AccountRef,
        value: Amount,
        description: Option<String>,
    },
}

/// Outcome of a committed transfer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub debit_id: String,
    pub credit_id: String,
    pub sender_balance: Amount,
    pub receiver_balance: Amount,
}
