use alloy::{sol, sol_types::SolCall};
use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::types::VaultRef;

sol! {
    struct EvaluableV3 {
        address interpreter;
        address store;
        bytes bytecode;
    }

    struct SignedContextV1 {
        address signer;
        uint256[] context;
        bytes signature;
    }

    struct TaskV1 {
        EvaluableV3 evaluable;
        SignedContextV1[] signedContext;
    }

    interface IERC20 {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    interface IOrderBookV4 {
        function deposit2(address token, uint256 vaultId, uint256 depositAmount, TaskV1[] calldata tasks) external;
    }
}

/// 10^77 is the largest power of ten that fits in 256 bits.
pub const MAX_DECIMALS: u8 = 77;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalldataError {
    #[error("Approval not required: allowance {allowance} covers {amount}")]
    ApprovalNotRequired { allowance: U256, amount: U256 },
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Amount must be greater than zero")]
    ZeroAmount,
    #[error("Unsupported token decimals: {0}")]
    InvalidDecimals(u8),
    #[error("Failed to read allowance: {0}")]
    Rpc(String),
    #[error("{0}")]
    Provider(String),
}

impl CalldataError {
    /// Human-readable message shown to the user.
    pub fn msg(&self) -> String {
        self.to_string()
    }
}

/// Builds the payloads the user signs for the approval and deposit steps.
///
/// An `Err` from `approval_calldata` means either that no approval is needed
/// or that the need could not be determined; callers do not tell the two apart.
#[async_trait]
pub trait CalldataProvider: Send + Sync {
    async fn approval_calldata(
        &self,
        rpc_urls: &[String],
        vault: &VaultRef,
        amount: &str,
    ) -> Result<Bytes, CalldataError>;

    async fn deposit_calldata(
        &self,
        vault: &VaultRef,
        amount: &str,
        decimals: u8,
    ) -> Result<Bytes, CalldataError>;
}

/// Reads an ERC-20 allowance from chain.
#[async_trait]
pub trait AllowanceSource: Send + Sync {
    async fn allowance(
        &self,
        rpc_urls: &[String],
        token: Address,
        owner: Address,
        spender: Address,
    ) -> anyhow::Result<U256>;
}

pub fn allowance_call(owner: Address, spender: Address) -> Bytes {
    IERC20::allowanceCall { owner, spender }.abi_encode().into()
}

pub fn decode_allowance(data: &[u8]) -> anyhow::Result<U256> {
    Ok(IERC20::allowanceCall::abi_decode_returns(data)?)
}

fn parse_amount(amount: &str) -> Result<U256, CalldataError> {
    amount
        .parse::<U256>()
        .map_err(|e| CalldataError::InvalidAmount(format!("{amount}: {e}")))
}

/// Calldata for an OrderBook V4 deployment: ERC-20 `approve` towards the
/// orderbook and `deposit2` with no post-deposit tasks.
pub struct OrderbookCalldataProvider<A> {
    allowance: A,
}

impl<A: AllowanceSource> OrderbookCalldataProvider<A> {
    pub fn new(allowance: A) -> Self {
        Self { allowance }
    }
}

#[async_trait]
impl<A: AllowanceSource> CalldataProvider for OrderbookCalldataProvider<A> {
    async fn approval_calldata(
        &self,
        rpc_urls: &[String],
        vault: &VaultRef,
        amount: &str,
    ) -> Result<Bytes, CalldataError> {
        let amount = parse_amount(amount)?;
        let allowance = self
            .allowance
            .allowance(rpc_urls, vault.token.address, vault.owner, vault.orderbook)
            .await
            .map_err(|e| CalldataError::Rpc(format!("{e:#}")))?;

        debug!(%allowance, %amount, token = %vault.token.address, "current allowance");
        if allowance >= amount {
            return Err(CalldataError::ApprovalNotRequired { allowance, amount });
        }

        Ok(IERC20::approveCall {
            spender: vault.orderbook,
            amount,
        }
        .abi_encode()
        .into())
    }

    async fn deposit_calldata(
        &self,
        vault: &VaultRef,
        amount: &str,
        decimals: u8,
    ) -> Result<Bytes, CalldataError> {
        if decimals > MAX_DECIMALS {
            return Err(CalldataError::InvalidDecimals(decimals));
        }
        let amount = parse_amount(amount)?;
        if amount.is_zero() {
            return Err(CalldataError::ZeroAmount);
        }

        Ok(IOrderBookV4::deposit2Call {
            token: vault.token.address,
            vaultId: vault.vault_id,
            depositAmount: amount,
            tasks: Vec::new(),
        }
        .abi_encode()
        .into())
    }
}
