use std::sync::Arc;

use alloy_primitives::TxHash;
use anyhow::Context;
use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::info;

use deposit_flow::{ApprovalTransaction, DepositTransaction, TransactionManager, TransactionRecord};

pub mod keys {
    pub const RECORDS_BY_HASH: &str = "vault:tx:by_hash";
    pub const RECORDS_BY_QUERY_KEY_PREFIX: &str = "vault:tx:by_query_key";

    pub fn records_by_query_key(query_key: &str) -> String {
        format!("{RECORDS_BY_QUERY_KEY_PREFIX}:{query_key}")
    }
}

const APPEND_RECORD: &str = r#"
if redis.call('HSETNX', KEYS[1], ARGV[1], ARGV[2]) == 0 then
  return 0
end
redis.call('RPUSH', KEYS[2], ARGV[2])
return 1
"#;

/// Append-only transaction record store. Records are kept as JSON, listed per
/// query key in submission order and indexed by transaction hash.
#[derive(Clone)]
pub struct RedisTransactionManager {
    client: Arc<redis::Client>,
}

impl RedisTransactionManager {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url.to_string())?;
        Ok(Self { client: Arc::new(client) })
    }

    pub async fn records_for(&self, query_key: &str) -> anyhow::Result<Vec<TransactionRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Vec<String> = conn
            .lrange(keys::records_by_query_key(query_key), 0, -1)
            .await
            .with_context(|| format!("Failed lrange for query_key {}", query_key))?;
        raw.iter()
            .map(|data| serde_json::from_str(data).context("decode transaction record"))
            .collect()
    }

    pub async fn record_by_hash(&self, tx_hash: &TxHash) -> anyhow::Result<Option<TransactionRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let serialized: Option<String> = conn.hget(keys::RECORDS_BY_HASH, tx_hash.to_string()).await?;
        let Some(data) = serialized else { return Ok(None); };
        Ok(Some(serde_json::from_str(&data)?))
    }

    async fn append(&self, record: TransactionRecord) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(&record)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        // Hash index and per-vault list are written in one script so a record is
        // either in both or in neither.
        let added: i64 = redis::Script::new(APPEND_RECORD)
            .key(keys::RECORDS_BY_HASH)
            .key(keys::records_by_query_key(&record.query_key))
            .arg(record.tx_hash.to_string())
            .arg(&serialized)
            .invoke_async(&mut conn)
            .await
            .with_context(|| format!("Failed to append transaction {}", record.tx_hash))?;
        if added == 0 {
            anyhow::bail!("Transaction {} already recorded", record.tx_hash);
        }
        info!(kind = ?record.kind, tx_hash = %record.tx_hash, query_key = %record.query_key, "transaction stored");
        Ok(())
    }
}

#[async_trait]
impl TransactionManager for RedisTransactionManager {
    async fn record_approval(&self, tx: ApprovalTransaction) -> anyhow::Result<()> {
        self.append(tx.into()).await
    }

    async fn record_deposit(&self, tx: DepositTransaction) -> anyhow::Result<()> {
        self.append(tx.into()).await
    }
}
