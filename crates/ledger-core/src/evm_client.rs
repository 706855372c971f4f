//! ============================================================================
//! EVM Ledger Client - JSON-RPC access to the ledger contract
//! ============================================================================
//! Handles all chain I/O for the task ledger:
//! - `getTask` view calls and `TaskCreated` / `TaskCompleted` log queries
//! - nonce, gas price and gas estimation reads
//! - local signing of `completeTask` transactions (key never leaves process)
//! ============================================================================

use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, TxHash};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, Filter, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use alloy::transports::{RpcError, TransportError};
use async_trait::async_trait;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::ledger_abi::LedgerAbi;
use crate::ledger_client::{CompleteTaskCall, LedgerClient, TxParams};
use crate::types::{LedgerError, ReceiptSummary, Task, TaskEvent, TaskEventKind, TaskId};

/// Ledger client backed by an HTTP JSON-RPC provider and a local signer
pub struct EvmLedgerClient {
    provider: DynProvider,
    abi: LedgerAbi,
    contract: Address,
    signer: Address,
}

impl EvmLedgerClient {
    /// Build the provider and signer from configuration. Bad URLs, addresses
    /// or keys are configuration faults.
    pub fn connect(config: &LedgerConfig, abi: LedgerAbi) -> Result<Self, LedgerError> {
        let url = Url::parse(&config.rpc_endpoint).map_err(|e| {
            LedgerError::Config(format!("Invalid RPC_ENDPOINT '{}': {}", config.rpc_endpoint, e))
        })?;

        let contract = Address::from_str(&config.contract_address).map_err(|e| {
            LedgerError::Config(format!(
                "Invalid CONTRACT_ADDRESS '{}': {}",
                config.contract_address, e
            ))
        })?;

        let key_signer = PrivateKeySigner::from_str(config.private_key.trim())
            .map_err(|e| LedgerError::Config(format!("Invalid PRIVATE_KEY: {}", e)))?;
        let signer = key_signer.address();

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(key_signer))
            .connect_http(url)
            .erased();

        info!(
            "Ledger client ready: contract {} via {}, signer {}",
            contract,
            config.rpc_endpoint,
            signer
        );

        Ok(Self {
            provider,
            abi,
            contract,
            signer,
        })
    }

    fn complete_task_request(&self, call: &CompleteTaskCall) -> Result<TransactionRequest, LedgerError> {
        let input = self.abi.encode_complete_task(call)?;
        Ok(TransactionRequest::default()
            .with_from(self.signer)
            .with_to(self.contract)
            .with_input(input))
    }
}

fn rpc_error(context: &str, e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Rpc(format!("{}: {}", context, e))
}

/// Failures raised before the request leaves the process (filling, signing)
/// are signing errors; everything else came from the node or the transport.
fn send_error(e: TransportError) -> LedgerError {
    match e {
        RpcError::LocalUsageError(inner) => {
            LedgerError::Signing(format!("Failed to sign transaction: {}", inner))
        }
        other => rpc_error("Failed to send transaction", other),
    }
}

#[async_trait]
impl LedgerClient for EvmLedgerClient {
    fn signer_address(&self) -> String {
        self.signer.to_string()
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| rpc_error("Failed to get block number", e))
    }

    async fn pending_nonce(&self) -> Result<u64, LedgerError> {
        self.provider
            .get_transaction_count(self.signer)
            .pending()
            .await
            .map_err(|e| rpc_error("Failed to get transaction count", e))
    }

    async fn gas_price(&self) -> Result<u128, LedgerError> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| rpc_error("Failed to get gas price", e))
    }

    async fn estimate_complete_task(
        &self,
        call: &CompleteTaskCall,
        nonce: u64,
    ) -> Result<u64, LedgerError> {
        let tx = self.complete_task_request(call)?.with_nonce(nonce);
        self.provider
            .estimate_gas(tx)
            .await
            .map_err(|e| rpc_error("Gas estimation failed", e))
    }

    async fn send_complete_task(
        &self,
        call: &CompleteTaskCall,
        params: &TxParams,
    ) -> Result<String, LedgerError> {
        let tx = self
            .complete_task_request(call)?
            .with_nonce(params.nonce)
            .with_gas_limit(params.gas_limit)
            .with_gas_price(params.gas_price);

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(send_error)?;

        Ok(format!("{:#x}", pending.tx_hash()))
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<ReceiptSummary>, LedgerError> {
        let hash = TxHash::from_str(tx_hash)
            .map_err(|e| LedgerError::Malformed(format!("Invalid transaction hash '{}': {}", tx_hash, e)))?;

        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| rpc_error("Failed to get receipt", e))?;

        Ok(receipt.map(|r| ReceiptSummary {
            status: u8::from(r.status()),
            gas_used: r.gas_used(),
            block_number: r.block_number().unwrap_or_default(),
        }))
    }

    async fn get_task(&self, id: TaskId) -> Result<Task, LedgerError> {
        let input = self.abi.encode_get_task(id)?;
        let tx = TransactionRequest::default()
            .with_to(self.contract)
            .with_input(input);

        let output = self.provider.call(tx).await.map_err(|e| {
            let msg = e.to_string();
            if msg.to_lowercase().contains("revert") {
                LedgerError::NotFound(format!("getTask({}) reverted: {}", id, msg))
            } else {
                rpc_error("getTask call failed", msg)
            }
        })?;

        self.abi.decode_get_task(id, &output)
    }

    async fn task_events(
        &self,
        kind: TaskEventKind,
        from_block: u64,
    ) -> Result<Vec<TaskEvent>, LedgerError> {
        let filter = Filter::new()
            .address(self.contract)
            .event_signature(self.abi.event_selector(kind))
            .from_block(from_block)
            .to_block(BlockNumberOrTag::Latest);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| rpc_error(&format!("Failed to fetch {} logs", kind.event_name()), e))?;

        debug!("Fetched {} {} logs from block {}", logs.len(), kind.event_name(), from_block);

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            let block = log.block_number.unwrap_or_default();
            let tx_hash = log
                .transaction_hash
                .map(|h| format!("{:#x}", h))
                .unwrap_or_default();

            match self.abi.decode_event(kind, log.data(), block, tx_hash) {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping undecodable {} log in block {}: {}", kind.event_name(), block, e),
            }
        }

        Ok(events)
    }
}
