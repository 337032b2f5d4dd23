use std::env;
use std::io;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use pix_ledger::checksum::{validate_account, validate_agency};
use pix_ledger::csv::{read_accounts, read_operations, write_accounts};
use pix_ledger::store::LedgerStore;
use pix_ledger::{Engine, EngineConfig, MemoryLedger};

const USAGE: &str = "usage: pix-ledger <accounts.csv> <operations.csv>";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(tracing::Level::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let [accounts, operations] = args.as_slice() else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };

    for path in [accounts, operations] {
        if !path.ends_with(".csv") {
            warn!(path = %path, "input file seems to not be a csv file");
        }
    }

    match run(accounts, operations).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(accounts_path: &str, operations_path: &str) -> anyhow::Result<()> {
    let config = EngineConfig::from_env()?;
    let ledger = Arc::new(MemoryLedger::new());
    let engine = Engine::in_memory(ledger.clone()).with_config(config);

    seed(&engine, &ledger, accounts_path).await?;

    let operations = read_operations(Path::new(operations_path))?;
    let (op_sender, op_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in operations {
            match result {
                Ok(op) => {
                    if op_sender.send(op).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    engine.run(ReceiverStream::new(op_receiver)).await;

    let mut accounts = engine.accounts().await?;
    accounts.sort_by(|a, b| a.owner.cmp(&b.owner));
    write_accounts(io::stdout().lock(), &accounts).context("writing balances")?;
    Ok(())
}

/// Load owners and accounts, then register the requested PIX keys.
/// Bad rows are reported and skipped.
async fn seed(engine: &Engine, ledger: &MemoryLedger, path: &str) -> anyhow::Result<()> {
    for result in read_accounts(Path::new(path))? {
        let seed = match result {
            Ok(seed) => seed,
            Err(e) => {
                warn!("{e}");
                continue;
            }
        };

        let account = seed.account;
        if !validate_account(&account.account) || !validate_agency(&account.agency) {
            warn!(owner = %account.owner, account = %account.account_ref(), "skipping account with invalid check digit");
            continue;
        }

        let owner = account.owner.clone();
        ledger.put_owner(seed.owner).await;
        if let Err(e) = ledger.insert(account).await {
            warn!(owner = %owner, "{e}");
            continue;
        }

        for key_type in seed.pix_keys {
            if let Err(e) = engine.create_pix_key_from_profile(&owner, key_type).await {
                warn!(owner = %owner, "{e}");
            }
        }
    }
    Ok(())
}
