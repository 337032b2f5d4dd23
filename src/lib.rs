pub mod amount;
pub mod checksum;
pub mod config;
pub mod csv;
pub mod engine;
pub mod generator;
pub mod model;
pub mod pix;
pub mod store;

pub use amount::{Amount, AmountError};
pub use config::EngineConfig;
pub use engine::{Engine, EngineError, ErrorKind};
pub use model::{Account, AccountId, AccountRef, Operation, OwnerId, TransferRequest, TransferType};
pub use pix::PixKeyType;
pub use store::MemoryLedger;
