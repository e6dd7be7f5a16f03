use std::future::Future;

use alloy_primitives::{Address, TxKind, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::{TransactionInput, TransactionRequest};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use deposit_flow::{
    calldata::{allowance_call, decode_allowance},
    AllowanceSource,
};

/// Runs `call` against each URL in order and returns the first success. When
/// every URL fails the error carries the last cause.
pub async fn with_rpc_fallback<T, F, Fut>(rpc_urls: &[String], mut call: F) -> Result<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if rpc_urls.is_empty() {
        bail!("No RPC URLs provided");
    }

    let mut last_err = None;
    for url in rpc_urls {
        match call(url.clone()).await {
            Ok(value) => {
                debug!(%url, "rpc call succeeded");
                return Ok(value);
            }
            Err(err) => {
                warn!(%url, "rpc call failed, trying next url: {:#}", err);
                last_err = Some(err);
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| anyhow!("No RPC URLs provided"))
        .context("all rpc urls failed"))
}

/// Reads ERC-20 allowances over JSON-RPC, falling back through the URL list.
pub struct RpcAllowance;

impl RpcAllowance {
    async fn allowance_from(url: String, token: Address, owner: Address, spender: Address) -> Result<U256> {
        let provider = ProviderBuilder::new()
            .connect(&url)
            .await
            .map_err(|e| anyhow!("failed to connect provider: {e}"))?;

        let tx = TransactionRequest {
            to: Some(TxKind::Call(token)),
            input: TransactionInput::new(allowance_call(owner, spender)),
            ..Default::default()
        };
        let raw = provider.call(tx).await.context("eth_call allowance")?;
        decode_allowance(&raw)
    }
}

#[async_trait]
impl AllowanceSource for RpcAllowance {
    async fn allowance(
        &self,
        rpc_urls: &[String],
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256> {
        let allowance = with_rpc_fallback(rpc_urls, |url| {
            Self::allowance_from(url, token, owner, spender)
        })
        .await?;
        debug!(%allowance, %token, "allowance read");
        Ok(allowance)
    }
}
