use alloy_primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::types::VaultRef;

/// Arguments for the amount-input modal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositModal {
    pub vault: VaultRef,
    pub chain_id: u64,
    pub rpc_urls: Vec<String>,
    pub subgraph_url: String,
    pub account: Address,
}

/// Arguments for the transaction-confirmation modal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionConfirmation {
    pub title: String,
    pub close_on_confirm: bool,
    pub entity: VaultRef,
    pub to_address: Address,
    pub chain_id: u64,
    pub calldata: Bytes,
}

/// User-facing surfaces the deposit flow drives. Each call resolves once the
/// user acts; `None` means the modal was dismissed.
#[async_trait]
pub trait ModalPresenter: Send + Sync {
    /// Resolves to the amount the user submitted, in token base units.
    async fn deposit_amount(&self, modal: DepositModal) -> Option<U256>;

    /// Resolves to the hash of the transaction the user submitted.
    async fn confirm_transaction(&self, modal: TransactionConfirmation) -> Option<TxHash>;
}

/// Sink for messages shown to the user when a flow fails.
pub trait ErrorChannel: Send + Sync {
    fn report(&self, message: String);
}

impl ErrorChannel for UnboundedSender<String> {
    fn report(&self, message: String) {
        if let Err(e) = self.send(message) {
            warn!("error channel closed, dropping message: {}", e.0);
        }
    }
}
