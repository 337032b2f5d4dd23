use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::{Amount, AmountError};
use crate::model::{Account, AccountRef, Operation, Owner, TransferRequest, TransferType};
use crate::pix::{PixKeyType, UnknownKeyType};

/// Errors that can occur when reading or writing csv files
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("cannot open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized operation type '{op_type}'")]
    UnrecognizedType { line: usize, op_type: String },

    #[error("line {line}: {op_type} missing value")]
    MissingValue { line: usize, op_type: String },

    #[error("line {line}: {source}")]
    UnknownKeyType { line: usize, source: UnknownKeyType },

    #[error("line {line}: {source}")]
    InvalidAmount { line: usize, source: AmountError },

    #[error("line {line}: negative opening balance {balance}")]
    NegativeBalance { line: usize, balance: Amount },

    #[error("failed to write csv: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to flush csv writer: {0}")]
    Flush(#[from] io::Error),
}

/// An account to load into the ledger, with its owner and the PIX key types
/// to register from the owner's profile.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedAccount {
    pub owner: Owner,
    pub account: Account,
    pub pix_keys: Vec<PixKeyType>,
}

#[derive(Debug, Deserialize)]
struct AccountRow {
    owner: String,
    name: String,
    cpf: String,
    email: String,
    phone: String,
    agency: String,
    account: String,
    balance: f64,
    pix_keys: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationRow {
    r#type: String,
    value: Option<f64>,
    sender_account: String,
    sender_agency: String,
    receiver_account: Option<String>,
    receiver_agency: Option<String>,
    pix_key: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    owner: &'a str,
    agency: &'a str,
    account: &'a str,
    balance: String,
    transactions: usize,
}

fn reader(path: &Path) -> Result<csv::Reader<std::fs::File>, CsvError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })
}

/// Read the accounts to seed the ledger with
pub fn read_accounts(
    path: &Path,
) -> Result<impl Iterator<Item = Result<SeedAccount, CsvError>> + use<>, CsvError> {
    let reader = reader(path)?;

    Ok(reader
        .into_deserialize::<AccountRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;

            let pix_keys = row
                .pix_keys
                .as_deref()
                .unwrap_or_default()
                .split(';')
                .filter(|t| !t.trim().is_empty())
                .map(|t| t.parse::<PixKeyType>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| CsvError::UnknownKeyType { line, source })?;

            let balance = Amount::from_float(row.balance)
                .map_err(|source| CsvError::InvalidAmount { line, source })?;
            if balance < Amount::ZERO {
                return Err(CsvError::NegativeBalance { line, balance });
            }

            let account =
                Account::new(row.owner.as_str(), row.agency, row.account).with_balance(balance);
            Ok(SeedAccount {
                owner: Owner {
                    id: row.owner,
                    name: row.name,
                    cpf: row.cpf,
                    email: row.email,
                    phone: row.phone,
                },
                account,
                pix_keys,
            })
        }))
}

/// Read operations (transfers, deposits, withdrawals) from a csv file
pub fn read_operations(
    path: &Path,
) -> Result<impl Iterator<Item = Result<Operation, CsvError>> + use<>, CsvError> {
    let reader = reader(path)?;

    Ok(reader
        .into_deserialize::<OperationRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            let op_type = row.r#type.to_ascii_uppercase();
            let value = row.value.ok_or_else(|| CsvError::MissingValue {
                line,
                op_type: op_type.clone(),
            })?;
            let value = Amount::from_float(value)
                .map_err(|source| CsvError::InvalidAmount { line, source })?;
            let sender = AccountRef::new(row.sender_account, row.sender_agency);

            let transfer_type = match op_type.as_str() {
                "DEPOSIT" => {
                    return Ok(Operation::Deposit {
                        target: sender,
                        value,
                        description: row.description,
                    });
                }
                "WITHDRAW" => {
                    return Ok(Operation::Withdraw {
                        target: sender,
                        value,
                        description: row.description,
                    });
                }
                "PIX" => TransferType::Pix,
                "TED" => TransferType::Ted,
                "DOC" => TransferType::Doc,
                _ => {
                    return Err(CsvError::UnrecognizedType {
                        line,
                        op_type: row.r#type,
                    });
                }
            };

            let request = match transfer_type {
                TransferType::Pix => {
                    TransferRequest::pix(value, sender, row.pix_key.unwrap_or_default())
                }
                TransferType::Ted | TransferType::Doc => {
                    let mut request = TransferRequest::wire(
                        transfer_type,
                        value,
                        sender,
                        AccountRef::new("", ""),
                    );
                    request.receiver.account = row.receiver_account;
                    request.receiver.agency = row.receiver_agency;
                    request
                }
            };
            Ok(Operation::Transfer(TransferRequest {
                description: row.description,
                ..request
            }))
        }))
}

/// Write account balances in csv format
pub fn write_accounts<'a, W: io::Write>(
    writer: W,
    accounts: impl IntoIterator<Item = &'a Account>,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);

    for account in accounts {
        let row = OutputRow {
            owner: &account.owner,
            agency: &account.agency,
            account: &account.account,
            balance: account.balance.to_string(),
            transactions: account.history.len(),
        };
        writer.serialize(&row)?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const OPERATIONS_HEADER: &str =
        "type,value,sender_account,sender_agency,receiver_account,receiver_agency,pix_key,description\n";

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn read(content: &str) -> Vec<Result<Operation, CsvError>> {
        let file = write_csv(&format!("{OPERATIONS_HEADER}{content}"));
        read_operations(file.path()).unwrap().collect()
    }

    #[test]
    fn read_ted() {
        let results = read("TED,500,9113111159,59868,12848229687,97831,,rent\n");
        assert_eq!(results.len(), 1);

        match results.into_iter().next().unwrap().unwrap() {
            Operation::Transfer(request) => {
                assert_eq!(request.transfer_type, TransferType::Ted);
                assert_eq!(request.value, Amount::from_units(500));
                assert_eq!(request.sender, AccountRef::new("9113111159", "59868"));
                assert_eq!(request.receiver.account.as_deref(), Some("12848229687"));
                assert_eq!(request.receiver.agency.as_deref(), Some("97831"));
                assert_eq!(request.receiver.pix_key, None);
                assert_eq!(request.description.as_deref(), Some("rent"));
            }
            other => panic!("expected transfer, got {other:?}"),
        }
    }

    #[test]
    fn read_pix() {
        let results = read("pix,10.5,9113111159,59868,,,bob@gmail.com,\n");
        match results.into_iter().next().unwrap().unwrap() {
            Operation::Transfer(request) => {
                assert_eq!(request.transfer_type, TransferType::Pix);
                assert_eq!(request.value, Amount::from_scaled(1_050));
                assert_eq!(request.receiver.pix_key.as_deref(), Some("bob@gmail.com"));
                assert_eq!(request.description, None);
            }
            other => panic!("expected transfer, got {other:?}"),
        }
    }

    #[test]
    fn read_ted_without_receiver_keeps_it_empty() {
        let results = read("DOC,1,9113111159,59868,,,,\n");
        match results.into_iter().next().unwrap().unwrap() {
            Operation::Transfer(request) => {
                assert_eq!(request.receiver.account, None);
                assert_eq!(request.receiver.agency, None);
            }
            other => panic!("expected transfer, got {other:?}"),
        }
    }

    #[test]
    fn read_deposit_and_withdraw() {
        let results = read(
            "DEPOSIT,100,9113111159,59868,,,,salary\nWITHDRAW,20,9113111159,59868,,,,\n",
        );
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[0],
            Ok(Operation::Deposit { ref description, .. }) if description.as_deref() == Some("salary")
        ));
        assert!(matches!(results[1], Ok(Operation::Withdraw { .. })));
    }

    #[test]
    fn read_with_whitespace() {
        let results = read("TED, 500, 9113111159, 59868, 12848229687, 97831, ,\n");
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[test]
    fn read_returns_error_for_unknown_type() {
        let results = read("WIRE,1,9113111159,59868,,,,\n");
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(err, CsvError::UnrecognizedType { line: 2, .. }));
    }

    #[test]
    fn read_returns_error_for_missing_value() {
        let results = read("TED,,9113111159,59868,12848229687,97831,,\n");
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(err, CsvError::MissingValue { line: 2, .. }));
    }

    #[test]
    fn read_returns_error_for_unrepresentable_value() {
        let results = read("TED,-1e30,9113111159,59868,12848229687,97831,,\nTED,1,9113111159,59868,12848229687,97831,,\n");
        assert_eq!(results.len(), 2);
        assert!(matches!(
            results[0],
            Err(CsvError::InvalidAmount { line: 2, source: AmountError::OutOfRange(_) })
        ));
        assert!(results[1].is_ok());
    }

    #[test]
    fn open_missing_file_fails() {
        assert!(matches!(
            read_operations(Path::new("/definitely/not/here.csv")),
            Err(CsvError::Open { .. })
        ));
    }

    #[test]
    fn read_seed_accounts() {
        let file = write_csv(
            "owner,name,cpf,email,phone,agency,account,balance,pix_keys\n\
             alice,Alice,04617065040,alice@gmail.com,79988888888,59868,9113111159,1000,CPF;EMAIL\n\
             bob,Bob,52998224725,bob@gmail.com,11987654321,97831,12848229687,1000.50,\n",
        );
        let seeds: Vec<_> = read_accounts(file.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(seeds.len(), 2);

        assert_eq!(seeds[0].owner.name, "Alice");
        assert_eq!(seeds[0].account.owner, "alice");
        assert_eq!(seeds[0].account.agency, "59868");
        assert_eq!(seeds[0].account.balance, Amount::from_units(1000));
        assert_eq!(seeds[0].pix_keys, vec![PixKeyType::Cpf, PixKeyType::Email]);

        assert_eq!(seeds[1].account.balance, Amount::from_scaled(100_050));
        assert!(seeds[1].pix_keys.is_empty());
    }

    #[test]
    fn read_seed_with_unknown_key_type() {
        let file = write_csv(
            "owner,name,cpf,email,phone,agency,account,balance,pix_keys\n\
             alice,Alice,04617065040,alice@gmail.com,79988888888,59868,9113111159,1000,IBAN\n",
        );
        let results: Vec<_> = read_accounts(file.path()).unwrap().collect();
        assert!(matches!(
            results[0],
            Err(CsvError::UnknownKeyType { line: 2, .. })
        ));
    }

    #[test]
    fn read_seed_with_negative_balance() {
        let file = write_csv(
            "owner,name,cpf,email,phone,agency,account,balance,pix_keys\n\
             alice,Alice,04617065040,alice@gmail.com,79988888888,59868,9113111159,-10,\n\
             bob,Bob,52998224725,bob@gmail.com,11987654321,97831,12848229687,0,\n",
        );
        let results: Vec<_> = read_accounts(file.path()).unwrap().collect();
        assert!(matches!(
            results[0],
            Err(CsvError::NegativeBalance { line: 2, .. })
        ));
        assert_eq!(results[1].as_ref().unwrap().account.balance, Amount::ZERO);
    }

    #[test]
    fn write_accounts_as_csv() {
        let account = Account::new("alice", "59868", "9113111159").with_balance(Amount::from_units(500));
        let mut out = Vec::new();
        write_accounts(&mut out, [&account]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec!["owner,agency,account,balance,transactions", "alice,59868,9113111159,500.00,0"]
        );
    }
}
