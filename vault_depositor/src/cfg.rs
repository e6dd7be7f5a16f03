use alloy_primitives::{Address, U256};
use clap::Parser;

use deposit_flow::{DepositIntent, TokenInfo, VaultRef};

#[derive(Parser, Debug)]
#[command(author, version, about = "Deposit into an orderbook vault", long_about = None)]
pub struct Cfg {
    #[arg(long, env = "RPC_URLS", value_delimiter = ',', required = true)]
    pub rpc_urls: Vec<String>,

    #[arg(long, env = "NETWORK_KEY")]
    pub network_key: String,

    #[arg(long, env = "CHAIN_ID")]
    pub chain_id: u64,

    #[arg(long, env = "ORDERBOOK_ADDRESS")]
    pub orderbook_address: Address,

    #[arg(long, env = "SUBGRAPH_URL")]
    pub subgraph_url: String,

    #[arg(long, env = "ACCOUNT")]
    pub account: Address,

    /// Subgraph id of the vault
    #[arg(long, env = "VAULT_ID")]
    pub vault_id: String,

    #[arg(long, env = "VAULT_ONCHAIN_ID")]
    pub vault_onchain_id: U256,

    /// Defaults to the depositing account
    #[arg(long, env = "VAULT_OWNER")]
    pub vault_owner: Option<Address>,

    #[arg(long, env = "TOKEN_ADDRESS")]
    pub token_address: Address,

    #[arg(long, env = "TOKEN_SYMBOL")]
    pub token_symbol: Option<String>,

    #[arg(long, env = "TOKEN_DECIMALS")]
    pub token_decimals: Option<u8>,

    /// Transactions are kept in memory when unset
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,
}

impl Cfg {
    pub fn intent(&self) -> DepositIntent {
        DepositIntent {
            vault: VaultRef {
                id: self.vault_id.clone(),
                vault_id: self.vault_onchain_id,
                owner: self.vault_owner.unwrap_or(self.account),
                orderbook: self.orderbook_address,
                token: TokenInfo {
                    address: self.token_address,
                    symbol: self.token_symbol.clone(),
                    decimals: self.token_decimals,
                },
                chain_id: self.chain_id,
            },
            network_key: self.network_key.clone(),
            subgraph_url: self.subgraph_url.clone(),
            rpc_urls: self.rpc_urls.clone(),
            account: self.account,
        }
    }
}
