//! Ledger engine.
//!
//! The engine validates and executes transfers, deposits and withdrawals, and
//! manages accounts and their PIX keys. It keeps no state of its own: every
//! operation reads from the store, decides, and writes back in a single
//! conditional commit, retrying from the top when another writer got there
//! first.

use std::fmt;
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::Amount;
use crate::checksum;
use crate::config::EngineConfig;
use crate::generator::{self, DigitSource, OsDigits};
use crate::model::{
    Account, AccountId, AccountRef, Category, Counterparty, Operation, TransactionKind,
    TransactionRecord, TransferReceipt, TransferRequest, TransferType,
};
use crate::pix::{self, AreaCodes, BrazilianAreaCodes, PixKeyType, PixKeys};
use crate::store::{BalanceUpdate, CommitError, InsertError, LedgerStore, MemoryLedger, Owners};

mod state;
pub use state::TransferStage;

mod error;
pub use error::{EngineError, ErrorKind, Party};

/// How many fresh numbers to try before giving up on opening an account.
const OPEN_ACCOUNT_ATTEMPTS: u32 = 16;

/// Where the money goes, once the request has been checked.
#[derive(Debug)]
enum ReceiverTarget {
    Account(AccountRef),
    PixKey(PixKeyType, String),
}

/// The ledger engine.
///
/// Cheap to share: wrap it in an `Arc` and call it from as many tasks as needed.
pub struct Engine {
    store: Arc<dyn LedgerStore>,
    owners: Arc<dyn Owners>,
    area_codes: Arc<dyn AreaCodes>,
    config: EngineConfig,
}

/// Public API
impl Engine {
    pub fn new(store: Arc<dyn LedgerStore>, owners: Arc<dyn Owners>) -> Self {
        Self {
            store,
            owners,
            area_codes: Arc::new(BrazilianAreaCodes),
            config: EngineConfig::default(),
        }
    }

    /// Engine over a [`MemoryLedger`] acting as both store and owner directory.
    pub fn in_memory(ledger: Arc<MemoryLedger>) -> Self {
        Self::new(ledger.clone(), ledger)
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_area_codes(mut self, area_codes: Arc<dyn AreaCodes>) -> Self {
        self.area_codes = area_codes;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Classify a PIX key with this engine's area code table.
    pub fn classify(&self, key: &str) -> PixKeyType {
        pix::classify(key, self.area_codes.as_ref())
    }

    /// Run the engine over a stream of operations. Failed operations are
    /// logged and skipped.
    pub async fn run(&self, mut stream: impl Stream<Item = Operation> + Unpin) {
        while let Some(op) = stream.next().await {
            // a failed operation must not stop the stream, its outcome is already logged
            let _ = self.apply(op).await;
        }
    }

    /// Apply a single operation.
    pub async fn apply(&self, op: Operation) -> Result<(), EngineError> {
        match op {
            Operation::Transfer(request) => self.transfer(&request).await.map(drop),
            Operation::Deposit {
                target,
                value,
                description,
            } => self.deposit(&target, value, description).await.map(drop),
            Operation::Withdraw {
                target,
                value,
                description,
            } => self.withdraw(&target, value, description).await.map(drop),
        }
    }

    /// Move `request.value` from the sender to the receiver.
    ///
    /// Both balances and both history entries are written in one commit, so a
    /// failure leaves both accounts untouched.
    pub async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, EngineError> {
        let mut stage = TransferStage::ValidatingSender;
        let result = self.apply_transfer(request, &mut stage).await;
        Self::log_transfer(request, stage, &result);
        result
    }

    /// Credit an account. Returns the new balance.
    pub async fn deposit(
        &self,
        target: &AccountRef,
        value: Amount,
        description: Option<String>,
    ) -> Result<Amount, EngineError> {
        let result = self.apply_single(target, value, Category::Credit, description).await;
        Self::log_result("deposit", target, Some(value), &result);
        result
    }

    /// Debit an account. Returns the new balance.
    pub async fn withdraw(
        &self,
        target: &AccountRef,
        value: Amount,
        description: Option<String>,
    ) -> Result<Amount, EngineError> {
        let result = self.apply_single(target, value, Category::Debit, description).await;
        Self::log_result("withdrawal", target, Some(value), &result);
        result
    }

    /// Open an account for `owner` with freshly generated numbers.
    pub async fn open_account(&self, owner: &str) -> Result<Account, EngineError> {
        self.open_account_with(owner, &mut OsDigits).await
    }

    /// Like [`open_account`](Self::open_account) with a caller supplied digit source.
    pub async fn open_account_with<D: DigitSource + Send>(
        &self,
        owner: &str,
        digits: &mut D,
    ) -> Result<Account, EngineError> {
        let result = self.allocate_account(owner, digits).await;
        Self::log_result("open account", &owner, None, &result);
        result
    }

    /// Remove the account of `owner`.
    pub async fn close_account(&self, owner: &str) -> Result<(), EngineError> {
        let account = self.account_by_owner(owner).await?;
        let result = match self.store.remove(account.id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(EngineError::AccountGone(account.id)),
            Err(e) => Err(e.into()),
        };
        Self::log_result("close account", &account.account_ref(), None, &result);
        result
    }

    pub async fn account_by_id(&self, id: AccountId) -> Result<Account, EngineError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(EngineError::AccountNotFound(Party::Holder))
    }

    pub async fn account_by_owner(&self, owner: &str) -> Result<Account, EngineError> {
        self.store
            .find_by_owner(owner)
            .await?
            .ok_or_else(|| EngineError::OwnerAccountNotFound(owner.to_string()))
    }

    /// Look an account up by number, rejecting numbers with a bad check digit.
    pub async fn account_by_number(&self, target: &AccountRef) -> Result<Account, EngineError> {
        validate_ref(target, Party::Holder)?;
        self.resolve_ref(target, Party::Holder).await
    }

    pub async fn accounts(&self) -> Result<Vec<Account>, EngineError> {
        Ok(self.store.list().await?)
    }

    /// Register a PIX key on the account of `owner`.
    ///
    /// Fails with a conflict when the account already has a key of this type
    /// or when another account holds the same value.
    pub async fn create_pix_key(
        &self,
        owner: &str,
        key_type: PixKeyType,
        value: &str,
    ) -> Result<(), EngineError> {
        let result = match self.check_key_value(key_type, value) {
            Ok(()) => {
                self.update_pix_keys(owner, |keys| Ok(Some(keys.create(key_type, value)?)))
                    .await
            }
            Err(e) => Err(e),
        };
        Self::log_result("create pix key", &key_type, None, &result);
        result
    }

    /// Register a PIX key whose value comes from the owner's profile: their CPF,
    /// email or phone, or a token derived from their id for `RANDOM`.
    ///
    /// Returns the registered value.
    pub async fn create_pix_key_from_profile(
        &self,
        owner: &str,
        key_type: PixKeyType,
    ) -> Result<String, EngineError> {
        let profile = self
            .owners
            .find_owner(owner)
            .await?
            .ok_or_else(|| EngineError::OwnerNotFound(owner.to_string()))?;

        let value = match key_type {
            PixKeyType::Cpf => profile.cpf,
            PixKeyType::Email => profile.email,
            PixKeyType::Phone => profile.phone,
            PixKeyType::Random => generator::random_pix_key(&profile.id),
        };

        self.create_pix_key(owner, key_type, &value).await?;
        Ok(value)
    }

    /// Remove the PIX key of `key_type` from the account of `owner`, if any.
    pub async fn delete_pix_key(&self, owner: &str, key_type: PixKeyType) -> Result<(), EngineError> {
        let result = self
            .update_pix_keys(owner, |keys| {
                Ok(keys.get(key_type).is_some().then(|| keys.delete(key_type)))
            })
            .await;
        Self::log_result("delete pix key", &key_type, None, &result);
        result
    }
}

/// Private API
impl Engine {
    /// Small helper to log single-account operation results
    fn log_result<T, E: fmt::Display>(
        op: &str,
        subject: &dyn fmt::Display,
        amount: Option<Amount>,
        result: &Result<T, E>,
    ) {
        match (result, amount) {
            (Ok(_), Some(amt)) => info!(subject = %subject, amount = %amt, "{op} applied"),
            (Ok(_), None) => info!(subject = %subject, "{op} applied"),
            (Err(e), Some(amt)) => {
                info!(subject = %subject, amount = %amt, reason = %e, "{op} skipped")
            }
            (Err(e), None) => info!(subject = %subject, reason = %e, "{op} skipped"),
        }
    }

    fn log_transfer(
        request: &TransferRequest,
        stage: TransferStage,
        result: &Result<TransferReceipt, EngineError>,
    ) {
        match result {
            Ok(receipt) => info!(
                sender = %request.sender,
                transfer_type = %request.transfer_type,
                amount = %request.value,
                sender_balance = %receipt.sender_balance,
                "transfer applied"
            ),
            Err(e) if stage.is_past_validation() => warn!(
                sender = %request.sender,
                transfer_type = %request.transfer_type,
                amount = %request.value,
                stage = %stage,
                reason = %e,
                "transfer failed to commit"
            ),
            Err(e) => info!(
                sender = %request.sender,
                transfer_type = %request.transfer_type,
                amount = %request.value,
                stage = %stage,
                reason = %e,
                "transfer skipped"
            ),
        }
    }

    /// Run a transfer:
    /// - Validate the value and the sender's check digits
    /// - Resolve the sender
    /// - Validate and resolve the receiver, by number (TED/DOC) or PIX key
    /// - Check the sender can cover the value
    /// - Commit both sides at once, starting over from the sender lookup if
    ///   either account changed in between
    async fn apply_transfer(
        &self,
        request: &TransferRequest,
        stage: &mut TransferStage,
    ) -> Result<TransferReceipt, EngineError> {
        let value = request.value;
        if !value.is_positive() {
            return Err(EngineError::InvalidValue(value));
        }
        validate_ref(&request.sender, Party::Sender)?;

        let attempts = self.config.attempts();
        for attempt in 1..=attempts {
            *stage = TransferStage::ResolvingSender;
            let sender = self.resolve_ref(&request.sender, Party::Sender).await?;

            *stage = TransferStage::ValidatingReceiver;
            let target = self.receiver_target(request)?;

            *stage = TransferStage::ResolvingReceiver;
            let receiver = self.resolve_receiver(&target).await?;
            if receiver.id == sender.id {
                return Err(EngineError::SelfTransfer);
            }

            *stage = TransferStage::CheckingFunds;
            let sender_balance = debited(&sender, value, Party::Sender)?;
            let receiver_balance = receiver
                .balance
                .checked_add(value)
                .ok_or(EngineError::Overflow)?;
            let sender_name = self.owner_name(&sender.owner).await?;
            let receiver_name = self.owner_name(&receiver.owner).await?;

            let debit = TransactionRecord::new(
                TransactionKind::Transference,
                Category::Debit,
                value,
                sender_balance,
            )
            .with_description(request.description.clone())
            .with_transfer(
                request.transfer_type,
                Counterparty {
                    name: receiver_name,
                    account: receiver.account.clone(),
                    agency: receiver.agency.clone(),
                },
            );
            let credit = TransactionRecord::new(
                TransactionKind::Transference,
                Category::Credit,
                value,
                receiver_balance,
            )
            .with_transfer(
                request.transfer_type,
                Counterparty {
                    name: sender_name,
                    account: sender.account.clone(),
                    agency: sender.agency.clone(),
                },
            );

            let receipt = TransferReceipt {
                debit_id: debit.id.clone(),
                credit_id: credit.id.clone(),
                sender_balance,
                receiver_balance,
            };

            *stage = TransferStage::Committing;
            let updates = vec![
                BalanceUpdate {
                    account: sender.id,
                    expected_version: sender.version,
                    new_balance: sender_balance,
                    record: debit,
                },
                BalanceUpdate {
                    account: receiver.id,
                    expected_version: receiver.version,
                    new_balance: receiver_balance,
                    record: credit,
                },
            ];
            match self.store.commit(updates).await {
                Ok(()) => {
                    *stage = TransferStage::Done;
                    return Ok(receipt);
                }
                Err(CommitError::Conflict(id)) => {
                    debug!(attempt, account = %id, "transfer raced another write, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngineError::ConcurrentUpdate(attempts))
    }

    /// Check that the request names a receiver the way its transfer type needs.
    fn receiver_target(&self, request: &TransferRequest) -> Result<ReceiverTarget, EngineError> {
        let receiver = &request.receiver;
        match request.transfer_type {
            TransferType::Ted | TransferType::Doc => {
                let (Some(account), Some(agency)) = (&receiver.account, &receiver.agency) else {
                    return Err(EngineError::MissingReceiver(
                        request.transfer_type,
                        "account and agency",
                    ));
                };
                let target = AccountRef::new(account, agency);
                validate_ref(&target, Party::Receiver)?;
                Ok(ReceiverTarget::Account(target))
            }
            TransferType::Pix => {
                let key = receiver
                    .pix_key
                    .as_deref()
                    .filter(|k| !k.is_empty())
                    .ok_or(EngineError::MissingReceiver(TransferType::Pix, "PIX key"))?;
                Ok(ReceiverTarget::PixKey(self.classify(key), key.to_string()))
            }
        }
    }

    async fn resolve_ref(&self, target: &AccountRef, party: Party) -> Result<Account, EngineError> {
        self.store
            .find_by_account_and_agency(&target.account, &target.agency)
            .await?
            .ok_or(EngineError::AccountNotFound(party))
    }

    async fn resolve_receiver(&self, target: &ReceiverTarget) -> Result<Account, EngineError> {
        match target {
            ReceiverTarget::Account(target) => self.resolve_ref(target, Party::Receiver).await,
            ReceiverTarget::PixKey(key_type, value) => self
                .store
                .find_by_pix_key(*key_type, value)
                .await?
                .ok_or_else(|| EngineError::PixKeyNotFound {
                    key_type: *key_type,
                    value: value.clone(),
                }),
        }
    }

    async fn owner_name(&self, owner: &str) -> Result<String, EngineError> {
        self.owners
            .find_owner(owner)
            .await?
            .map(|o| o.name)
            .ok_or_else(|| EngineError::OwnerNotFound(owner.to_string()))
    }

    /// Deposit (credit) or withdraw (debit) on a single account.
    async fn apply_single(
        &self,
        target: &AccountRef,
        value: Amount,
        category: Category,
        description: Option<String>,
    ) -> Result<Amount, EngineError> {
        if !value.is_positive() {
            return Err(EngineError::InvalidValue(value));
        }
        validate_ref(target, Party::Holder)?;

        let attempts = self.config.attempts();
        for attempt in 1..=attempts {
            let account = self.resolve_ref(target, Party::Holder).await?;
            let (kind, balance) = match category {
                Category::Credit => (
                    TransactionKind::Deposit,
                    account
                        .balance
                        .checked_add(value)
                        .ok_or(EngineError::Overflow)?,
                ),
                Category::Debit => (
                    TransactionKind::Withdraw,
                    debited(&account, value, Party::Holder)?,
                ),
            };
            let record = TransactionRecord::new(kind, category, value, balance)
                .with_description(description.clone());

            let update = BalanceUpdate {
                account: account.id,
                expected_version: account.version,
                new_balance: balance,
                record,
            };
            match self.store.commit(vec![update]).await {
                Ok(()) => return Ok(balance),
                Err(CommitError::Conflict(id)) => {
                    debug!(attempt, account = %id, "balance update raced another write, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngineError::ConcurrentUpdate(attempts))
    }

    /// A key value has to look like its declared type.
    fn check_key_value(&self, key_type: PixKeyType, value: &str) -> Result<(), EngineError> {
        let ok = match key_type {
            PixKeyType::Cpf => checksum::validate_cpf(value),
            PixKeyType::Phone | PixKeyType::Email => self.classify(value) == key_type,
            // anything that reads as another key type would be looked up under that type
            PixKeyType::Random => {
                !value.trim().is_empty() && self.classify(value) == PixKeyType::Random
            }
        };
        if ok {
            Ok(())
        } else {
            Err(EngineError::InvalidPixKey {
                key_type,
                value: value.to_string(),
            })
        }
    }

    /// Read-modify-write of an owner's PIX keys. `change` returns `None` when
    /// there is nothing to write.
    async fn update_pix_keys<F>(&self, owner: &str, change: F) -> Result<(), EngineError>
    where
        F: Fn(&PixKeys) -> Result<Option<PixKeys>, EngineError> + Send,
    {
        let attempts = self.config.attempts();
        for attempt in 1..=attempts {
            let account = self.account_by_owner(owner).await?;
            let Some(keys) = change(&account.pix_keys)? else {
                return Ok(());
            };
            match self
                .store
                .update_pix_keys(account.id, account.version, keys)
                .await
            {
                Ok(()) => return Ok(()),
                Err(CommitError::Conflict(id)) => {
                    debug!(attempt, account = %id, "pix key update raced another write, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngineError::ConcurrentUpdate(attempts))
    }

    async fn allocate_account<D: DigitSource + Send>(
        &self,
        owner: &str,
        digits: &mut D,
    ) -> Result<Account, EngineError> {
        for attempt in 1..=OPEN_ACCOUNT_ATTEMPTS {
            let agency = generator::generate_agency(digits);
            let number = generator::generate_account(digits);
            let account = Account::new(owner, agency, number);

            match self.store.insert(account.clone()).await {
                Ok(()) => return Ok(account),
                Err(InsertError::DuplicateOwner(owner)) => {
                    return Err(EngineError::AccountExists(owner));
                }
                Err(e @ (InsertError::DuplicateId(_) | InsertError::DuplicateNumber { .. })) => {
                    debug!(attempt, reason = %e, "account number taken, drawing another");
                }
                Err(InsertError::Store(e)) => return Err(e.into()),
            }
        }

        Err(EngineError::NumberSpaceExhausted(OPEN_ACCOUNT_ATTEMPTS))
    }
}

/// Both check digits of an account reference, account number first.
fn validate_ref(target: &AccountRef, party: Party) -> Result<(), EngineError> {
    if !checksum::validate_account(&target.account) {
        return Err(EngineError::InvalidAccount(party, target.account.clone()));
    }
    if !checksum::validate_agency(&target.agency) {
        return Err(EngineError::InvalidAgency(party, target.agency.clone()));
    }
    Ok(())
}

/// Balance left after taking `value` out of `account`.
fn debited(account: &Account, value: Amount, party: Party) -> Result<Amount, EngineError> {
    if account.balance < value {
        return Err(EngineError::InsufficientBalance {
            party,
            available: account.balance,
            requested: value,
        });
    }
    account.balance.checked_sub(value).ok_or(EngineError::Overflow)
}
