use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// ERC-20 metadata as indexed for a vault's token. Symbol and decimals are
/// optional because the token contract may revert on either call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

/// Deposit target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRef {
    /// Subgraph entity id. Doubles as the query key for recorded transactions.
    pub id: String,
    /// Vault id as the orderbook contract knows it.
    pub vault_id: U256,
    pub owner: Address,
    pub orderbook: Address,
    pub token: TokenInfo,
    pub chain_id: u64,
}

impl VaultRef {
    pub fn token_label(&self) -> &str {
        self.token.symbol.as_deref().unwrap_or("token")
    }
}

/// A pending deposit: the vault plus the routing context needed to submit to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositIntent {
    pub vault: VaultRef,
    pub network_key: String,
    pub subgraph_url: String,
    pub rpc_urls: Vec<String>,
    pub account: Address,
}

impl DepositIntent {
    pub fn chain_id(&self) -> u64 {
        self.vault.chain_id
    }

    /// Deposit target. Always the contract the approval is granted to.
    pub fn orderbook_address(&self) -> Address {
        self.vault.orderbook
    }
}
