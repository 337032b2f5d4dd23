//! Error types for ledger operations.

use std::fmt;
use thiserror::Error;

use crate::Amount;
use crate::model::{AccountId, OwnerId, TransferType};
use crate::pix::{PixKeyConflict, PixKeyType};
use crate::store::{CommitError, StoreError};

/// Which account an error is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Sender,
    Receiver,
    /// The single account of a deposit, withdrawal or lookup.
    Holder,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Party::Sender => "sender",
            Party::Receiver => "receiver",
            Party::Holder => "holder",
        })
    }
}

/// Coarse error category, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Conflict,
    Forbidden,
    Internal,
}

impl ErrorKind {
    /// Suggested HTTP status for the API layer.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }
}

/// Error returned by every [`Engine`](super::Engine) operation.
#[derive(Debug, Error)]
pub enum EngineError {
    // bad request
    #[error("{0} account number '{1}' is not valid")]
    InvalidAccount(Party, String),

    #[error("{0} agency '{1}' is not valid")]
    InvalidAgency(Party, String),

    #[error("value must be greater than zero, got {0}")]
    InvalidValue(Amount),

    #[error("{0} transfer is missing the receiver {1}")]
    MissingReceiver(TransferType, &'static str),

    #[error("sender and receiver are the same account")]
    SelfTransfer,

    #[error("'{value}' is not a valid {key_type} PIX key")]
    InvalidPixKey { key_type: PixKeyType, value: String },

    // not found
    #[error("{0} account not found")]
    AccountNotFound(Party),

    #[error("no account for owner {0}")]
    OwnerAccountNotFound(OwnerId),

    #[error("owner {0} not found")]
    OwnerNotFound(OwnerId),

    #[error("no account holds PIX key {key_type} '{value}'")]
    PixKeyNotFound { key_type: PixKeyType, value: String },

    #[error("account {0} disappeared during the operation")]
    AccountGone(AccountId),

    // conflict
    #[error(transparent)]
    PixKeyExists(#[from] PixKeyConflict),

    #[error("PIX key {key_type} '{value}' is already registered to another account")]
    PixKeyTaken { key_type: PixKeyType, value: String },

    #[error("owner {0} already has an account")]
    AccountExists(OwnerId),

    #[error("account was modified concurrently, gave up after {0} attempts")]
    ConcurrentUpdate(u32),

    // forbidden
    #[error("{party} does not have enough balance: available {available}, requested {requested}")]
    InsufficientBalance {
        party: Party,
        available: Amount,
        requested: Amount,
    },

    // internal
    #[error("balance overflow")]
    Overflow,

    #[error("could not allocate a free account number after {0} attempts")]
    NumberSpaceExhausted(u32),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        use EngineError::*;
        match self {
            InvalidAccount(..)
            | InvalidAgency(..)
            | InvalidValue(_)
            | MissingReceiver(..)
            | SelfTransfer
            | InvalidPixKey { .. } => ErrorKind::BadRequest,
            AccountNotFound(_)
            | OwnerAccountNotFound(_)
            | OwnerNotFound(_)
            | PixKeyNotFound { .. }
            | AccountGone(_) => ErrorKind::NotFound,
            PixKeyExists(_) | PixKeyTaken { .. } | AccountExists(_) | ConcurrentUpdate(_) => {
                ErrorKind::Conflict
            }
            InsufficientBalance { .. } => ErrorKind::Forbidden,
            Overflow | NumberSpaceExhausted(_) | Store(_) => ErrorKind::Internal,
        }
    }

    /// Stable identifier for API responses.
    pub fn code(&self) -> &'static str {
        use EngineError::*;
        match self {
            InvalidAccount(Party::Sender, _) => "INVALID_SENDER_ACCOUNT",
            InvalidAccount(Party::Receiver, _) => "INVALID_RECEIVER_ACCOUNT",
            InvalidAccount(Party::Holder, _) => "INVALID_ACCOUNT",
            InvalidAgency(Party::Sender, _) => "INVALID_SENDER_AGENCY",
            InvalidAgency(Party::Receiver, _) => "INVALID_RECEIVER_AGENCY",
            InvalidAgency(Party::Holder, _) => "INVALID_AGENCY",
            InvalidValue(_) => "INVALID_VALUE",
            MissingReceiver(..) => "MISSING_RECEIVER",
            SelfTransfer => "SELF_TRANSFER",
            InvalidPixKey { .. } => "INVALID_PIX_KEY",
            AccountNotFound(Party::Sender) => "SENDER_NOT_FOUND",
            AccountNotFound(Party::Receiver) => "RECEIVER_NOT_FOUND",
            AccountNotFound(Party::Holder) => "ACCOUNT_NOT_FOUND",
            OwnerAccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            OwnerNotFound(_) => "OWNER_NOT_FOUND",
            PixKeyNotFound { .. } => "RECEIVER_NOT_FOUND",
            AccountGone(_) => "ACCOUNT_NOT_FOUND",
            PixKeyExists(_) => "PIX_KEY_EXISTS",
            PixKeyTaken { .. } => "PIX_KEY_TAKEN",
            AccountExists(_) => "ACCOUNT_EXISTS",
            ConcurrentUpdate(_) => "CONCURRENT_UPDATE",
            InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Overflow => "OVERFLOW",
            NumberSpaceExhausted(_) => "NUMBER_SPACE_EXHAUSTED",
            Store(_) => "STORE_ERROR",
        }
    }
}

impl From<CommitError> for EngineError {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::Conflict(_) => EngineError::ConcurrentUpdate(1),
            CommitError::Missing(id) => EngineError::AccountGone(id),
            CommitError::DuplicatePixKey { key_type, value } => {
                EngineError::PixKeyTaken { key_type, value }
            }
            CommitError::Store(e) => EngineError::Store(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(EngineError::SelfTransfer.kind().http_status(), 400);
        assert_eq!(EngineError::AccountNotFound(Party::Sender).kind().http_status(), 404);
        assert_eq!(EngineError::ConcurrentUpdate(4).kind().http_status(), 409);
        let forbidden = EngineError::InsufficientBalance {
            party: Party::Sender,
            available: Amount::from_units(1000),
            requested: Amount::from_units(5000),
        };
        assert_eq!(forbidden.kind(), ErrorKind::Forbidden);
        assert_eq!(forbidden.kind().http_status(), 403);
        let store = EngineError::from(StoreError::Backend("down".into()));
        assert_eq!(store.kind().http_status(), 500);
    }

    #[test]
    fn codes_distinguish_sides() {
        assert_eq!(
            EngineError::InvalidAccount(Party::Sender, "1".into()).code(),
            "INVALID_SENDER_ACCOUNT"
        );
        assert_eq!(
            EngineError::InvalidAgency(Party::Receiver, "1".into()).code(),
            "INVALID_RECEIVER_AGENCY"
        );
    }

    #[test]
    fn messages_are_readable() {
        let err = EngineError::InsufficientBalance {
            party: Party::Sender,
            available: Amount::from_units(1000),
            requested: Amount::from_units(5000),
        };
        assert_eq!(
            err.to_string(),
            "sender does not have enough balance: available 1000.00, requested 5000.00"
        );
        let err = EngineError::from(PixKeyConflict(PixKeyType::Cpf));
        assert_eq!(err.to_string(), "PIX key of type CPF already exists");
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
