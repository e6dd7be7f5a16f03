use std::sync::Mutex;

use alloy_primitives::{TxHash, U256};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::VaultRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Approval,
    Deposit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalTransaction {
    pub tx_hash: TxHash,
    pub chain_id: u64,
    pub network_key: String,
    pub query_key: String,
    pub entity: VaultRef,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositTransaction {
    pub subgraph_url: String,
    pub tx_hash: TxHash,
    pub chain_id: u64,
    pub network_key: String,
    pub query_key: String,
    pub entity: VaultRef,
    pub amount: U256,
}

/// A submitted transaction as stored by a `TransactionManager`. Never mutated
/// once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub kind: TransactionKind,
    pub tx_hash: TxHash,
    pub chain_id: u64,
    pub network_key: String,
    pub query_key: String,
    pub entity: VaultRef,
    pub subgraph_url: Option<String>,
    pub amount: Option<U256>,
    pub recorded_at: i64,
}

impl From<ApprovalTransaction> for TransactionRecord {
    fn from(tx: ApprovalTransaction) -> Self {
        Self {
            kind: TransactionKind::Approval,
            tx_hash: tx.tx_hash,
            chain_id: tx.chain_id,
            network_key: tx.network_key,
            query_key: tx.query_key,
            entity: tx.entity,
            subgraph_url: None,
            amount: None,
            recorded_at: Utc::now().timestamp(),
        }
    }
}

impl From<DepositTransaction> for TransactionRecord {
    fn from(tx: DepositTransaction) -> Self {
        Self {
            kind: TransactionKind::Deposit,
            tx_hash: tx.tx_hash,
            chain_id: tx.chain_id,
            network_key: tx.network_key,
            query_key: tx.query_key,
            entity: tx.entity,
            subgraph_url: Some(tx.subgraph_url),
            amount: Some(tx.amount),
            recorded_at: Utc::now().timestamp(),
        }
    }
}

/// Keeps track of transactions the user has submitted so their status can be
/// followed elsewhere.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn record_approval(&self, tx: ApprovalTransaction) -> anyhow::Result<()>;
    async fn record_deposit(&self, tx: DepositTransaction) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct InMemoryTransactionManager {
    records: Mutex<Vec<TransactionRecord>>,
}

impl InMemoryTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> anyhow::Result<Vec<TransactionRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|e| anyhow!("Error accessing transaction records: {}", e))?;
        Ok(records.clone())
    }

    pub fn records_for(&self, query_key: &str) -> anyhow::Result<Vec<TransactionRecord>> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|r| r.query_key == query_key)
            .collect())
    }

    fn push(&self, record: TransactionRecord) -> anyhow::Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| anyhow!("Error accessing transaction records: {}", e))?;
        info!(kind = ?record.kind, tx_hash = %record.tx_hash, query_key = %record.query_key, "transaction recorded");
        records.push(record);
        Ok(())
    }
}

#[async_trait]
impl TransactionManager for InMemoryTransactionManager {
    async fn record_approval(&self, tx: ApprovalTransaction) -> anyhow::Result<()> {
        self.push(tx.into())
    }

    async fn record_deposit(&self, tx: DepositTransaction) -> anyhow::Result<()> {
        self.push(tx.into())
    }
}
