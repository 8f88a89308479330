pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod output;
pub mod snapshot;

pub use engine::UtxoEngine;
pub use error::{LedgerError, LedgerResult};
