//! ============================================================================
//! LEDGER-CORE: Task result ledger client
//! ============================================================================
//! This crate handles all backend logic for writing task results to an
//! on-chain task ledger contract:
//! - Content preparation within the contract's storage limits
//! - Transaction building/signing via alloy, one nonce at a time
//! - Receipt confirmation with a hard deadline
//! - Task lookups and recent-history reconstruction from events
//! ============================================================================

pub mod config;
pub mod confirmation;
pub mod content;
pub mod events;
pub mod evm_client;
pub mod ledger_abi;
pub mod ledger_client;
pub mod reader;
pub mod service;
pub mod submitter;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use config::LedgerConfig;
pub use content::StorageLimits;
pub use evm_client::EvmLedgerClient;
pub use ledger_client::LedgerClient;
pub use service::LedgerService;
pub use types::*;
