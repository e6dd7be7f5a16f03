//! Approve-then-deposit sequencing for a single vault deposit.
//!
//! The flow asks the user for an amount, optionally walks them through an
//! ERC-20 approval, then through the deposit itself. Each transaction is
//! recorded as soon as the user reports submitting it; on-chain inclusion is
//! tracked downstream of the `TransactionManager`.

use std::sync::Arc;

use alloy_primitives::{utils::format_units, TxHash, U256};
use tracing::{debug, error, info, warn};

use crate::{
    calldata::{CalldataError, CalldataProvider},
    manager::{ApprovalTransaction, DepositTransaction, TransactionManager},
    presenter::{DepositModal, ErrorChannel, ModalPresenter, TransactionConfirmation},
    types::DepositIntent,
};

const DECIMALS_NOT_FOUND: &str = "Token decimals not found";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DepositOutcome {
    AmountDismissed,
    ApprovalDismissed,
    DepositDismissed { approval: Option<TxHash> },
    /// The flow stopped and this message went to the error channel.
    Aborted(String),
    Submitted {
        approval: Option<TxHash>,
        deposit: TxHash,
    },
}

/// Formats a base-unit amount for display, without trailing fractional zeros.
pub fn display_amount(amount: U256, decimals: u8) -> Option<String> {
    let formatted = format_units(amount, decimals).ok()?;
    let trimmed = if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.')
    } else {
        formatted.as_str()
    };
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub struct DepositOrchestrator {
    calldata: Arc<dyn CalldataProvider>,
    presenter: Arc<dyn ModalPresenter>,
    manager: Arc<dyn TransactionManager>,
    errors: Arc<dyn ErrorChannel>,
}

impl DepositOrchestrator {
    pub fn new(
        calldata: Arc<dyn CalldataProvider>,
        presenter: Arc<dyn ModalPresenter>,
        manager: Arc<dyn TransactionManager>,
        errors: Arc<dyn ErrorChannel>,
    ) -> Self {
        Self {
            calldata,
            presenter,
            manager,
            errors,
        }
    }

    /// Opens the amount modal and, once the user submits, runs the rest of the flow.
    pub async fn initiate_deposit(&self, intent: &DepositIntent) -> anyhow::Result<DepositOutcome> {
        info!(vault = %intent.vault.id, chain_id = intent.chain_id(), "deposit initiated");

        let modal = DepositModal {
            vault: intent.vault.clone(),
            chain_id: intent.chain_id(),
            rpc_urls: intent.rpc_urls.clone(),
            subgraph_url: intent.subgraph_url.clone(),
            account: intent.account,
        };
        let Some(amount) = self.presenter.deposit_amount(modal).await else {
            debug!(vault = %intent.vault.id, "deposit modal dismissed");
            return Ok(DepositOutcome::AmountDismissed);
        };

        self.on_amount_submitted(intent, amount).await
    }

    pub async fn on_amount_submitted(
        &self,
        intent: &DepositIntent,
        amount: U256,
    ) -> anyhow::Result<DepositOutcome> {
        let vault = &intent.vault;
        // Nothing may reach the network or the wallet for a token whose decimals are unknown.
        if vault.token.decimals.is_none() {
            return Ok(self.abort(DECIMALS_NOT_FOUND.to_string()));
        }

        let approval = self
            .calldata
            .approval_calldata(&intent.rpc_urls, vault, &amount.to_string())
            .await;

        // Any approval error falls through to the deposit.
        let calldata = match approval {
            Ok(calldata) => calldata,
            Err(err @ CalldataError::ApprovalNotRequired { .. }) => {
                debug!(vault = %vault.id, "{}", err);
                return self.execute_deposit(intent, amount, None).await;
            }
            Err(err) => {
                warn!(vault = %vault.id, "approval calldata unavailable, depositing directly: {}", err);
                return self.execute_deposit(intent, amount, None).await;
            }
        };

        let confirmation = TransactionConfirmation {
            title: format!("Approving {} spend", vault.token_label()),
            close_on_confirm: true,
            entity: vault.clone(),
            to_address: vault.token.address,
            chain_id: intent.chain_id(),
            calldata,
        };
        let Some(tx_hash) = self.presenter.confirm_transaction(confirmation).await else {
            debug!(vault = %vault.id, "approval dismissed");
            return Ok(DepositOutcome::ApprovalDismissed);
        };

        let recorded = self
            .manager
            .record_approval(ApprovalTransaction {
                tx_hash,
                chain_id: intent.chain_id(),
                network_key: intent.network_key.clone(),
                query_key: vault.id.clone(),
                entity: vault.clone(),
            })
            .await;
        if let Err(err) = recorded {
            return Err(self.record_failed("approval", tx_hash, err));
        }

        self.execute_deposit(intent, amount, Some(tx_hash)).await
    }

    /// Deposit step. `approval` is the hash of the approval submitted earlier in
    /// this flow, if any.
    pub async fn execute_deposit(
        &self,
        intent: &DepositIntent,
        amount: U256,
        approval: Option<TxHash>,
    ) -> anyhow::Result<DepositOutcome> {
        let vault = &intent.vault;
        let Some(decimals) = vault.token.decimals else {
            return Ok(self.abort(DECIMALS_NOT_FOUND.to_string()));
        };

        let calldata = match self
            .calldata
            .deposit_calldata(vault, &amount.to_string(), decimals)
            .await
        {
            Ok(calldata) => calldata,
            Err(err) => return Ok(self.abort(err.msg())),
        };

        let symbol = vault.token_label();
        let title = match display_amount(amount, decimals) {
            Some(display) => format!("Depositing {display} {symbol}"),
            None => format!("Depositing {symbol}"),
        };
        let confirmation = TransactionConfirmation {
            title,
            close_on_confirm: false,
            entity: vault.clone(),
            to_address: intent.orderbook_address(),
            chain_id: intent.chain_id(),
            calldata,
        };
        let Some(tx_hash) = self.presenter.confirm_transaction(confirmation).await else {
            debug!(vault = %vault.id, "deposit dismissed");
            return Ok(DepositOutcome::DepositDismissed { approval });
        };

        let recorded = self
            .manager
            .record_deposit(DepositTransaction {
                subgraph_url: intent.subgraph_url.clone(),
                tx_hash,
                chain_id: intent.chain_id(),
                network_key: intent.network_key.clone(),
                query_key: vault.id.clone(),
                entity: vault.clone(),
                amount,
            })
            .await;
        if let Err(err) = recorded {
            return Err(self.record_failed("deposit", tx_hash, err));
        }

        info!(vault = %vault.id, %tx_hash, %amount, "deposit submitted");
        Ok(DepositOutcome::Submitted {
            approval,
            deposit: tx_hash,
        })
    }

    fn abort(&self, message: String) -> DepositOutcome {
        warn!("deposit aborted: {}", message);
        self.errors.report(message.clone());
        DepositOutcome::Aborted(message)
    }

    fn record_failed(&self, kind: &str, tx_hash: TxHash, err: anyhow::Error) -> anyhow::Error {
        error!(%tx_hash, "failed to record {} transaction: {:#}", kind, err);
        self.errors
            .report(format!("Failed to record {kind} transaction {tx_hash}"));
        err.context(format!("record {kind} transaction {tx_hash}"))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use alloy_primitives::{Address, Bytes, B256};
    use async_trait::async_trait;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    use super::*;
    use crate::{
        manager::{InMemoryTransactionManager, TransactionKind},
        types::{TokenInfo, VaultRef},
    };

    const TEN_TOKENS: u128 = 10_000_000_000_000_000_000;

    struct ScriptedPresenter {
        amount: Option<U256>,
        answers: Mutex<VecDeque<Option<TxHash>>>,
        amount_modals: Mutex<Vec<DepositModal>>,
        confirmations: Mutex<Vec<TransactionConfirmation>>,
    }

    impl ScriptedPresenter {
        fn confirmations(&self) -> Vec<TransactionConfirmation> {
            self.confirmations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModalPresenter for ScriptedPresenter {
        async fn deposit_amount(&self, modal: DepositModal) -> Option<U256> {
            self.amount_modals.lock().unwrap().push(modal);
            self.amount
        }

        async fn confirm_transaction(&self, modal: TransactionConfirmation) -> Option<TxHash> {
            self.confirmations.lock().unwrap().push(modal);
            self.answers.lock().unwrap().pop_front().flatten()
        }
    }

    struct FakeCalldata {
        approval: Result<Bytes, CalldataError>,
        deposit: Result<Bytes, CalldataError>,
        manager: Arc<InMemoryTransactionManager>,
        approval_calls: Mutex<Vec<(Vec<String>, String)>>,
        // (amount, decimals, records stored when the request was made)
        deposit_calls: Mutex<Vec<(String, u8, usize)>>,
    }

    #[async_trait]
    impl CalldataProvider for FakeCalldata {
        async fn approval_calldata(
            &self,
            rpc_urls: &[String],
            _vault: &VaultRef,
            amount: &str,
        ) -> Result<Bytes, CalldataError> {
            self.approval_calls
                .lock()
                .unwrap()
                .push((rpc_urls.to_vec(), amount.to_string()));
            self.approval.clone()
        }

        async fn deposit_calldata(
            &self,
            _vault: &VaultRef,
            amount: &str,
            decimals: u8,
        ) -> Result<Bytes, CalldataError> {
            let seen = self.manager.records().map(|r| r.len()).unwrap_or_default();
            self.deposit_calls
                .lock()
                .unwrap()
                .push((amount.to_string(), decimals, seen));
            self.deposit.clone()
        }
    }

    struct FailingManager;

    #[async_trait]
    impl TransactionManager for FailingManager {
        async fn record_approval(&self, _tx: ApprovalTransaction) -> anyhow::Result<()> {
            anyhow::bail!("store unavailable")
        }

        async fn record_deposit(&self, _tx: DepositTransaction) -> anyhow::Result<()> {
            anyhow::bail!("store unavailable")
        }
    }

    struct Harness {
        orchestrator: DepositOrchestrator,
        presenter: Arc<ScriptedPresenter>,
        calldata: Arc<FakeCalldata>,
        manager: Arc<InMemoryTransactionManager>,
        errors: UnboundedReceiver<String>,
    }

    impl Harness {
        fn new(
            approval: Result<Bytes, CalldataError>,
            deposit: Result<Bytes, CalldataError>,
            amount: Option<U256>,
            answers: Vec<Option<TxHash>>,
        ) -> Self {
            let manager = Arc::new(InMemoryTransactionManager::new());
            Self::with_manager(approval, deposit, amount, answers, manager.clone(), manager)
        }

        fn with_manager(
            approval: Result<Bytes, CalldataError>,
            deposit: Result<Bytes, CalldataError>,
            amount: Option<U256>,
            answers: Vec<Option<TxHash>>,
            manager: Arc<InMemoryTransactionManager>,
            recorder: Arc<dyn TransactionManager>,
        ) -> Self {
            let presenter = Arc::new(ScriptedPresenter {
                amount,
                answers: Mutex::new(answers.into()),
                amount_modals: Mutex::new(Vec::new()),
                confirmations: Mutex::new(Vec::new()),
            });
            let calldata = Arc::new(FakeCalldata {
                approval,
                deposit,
                manager: manager.clone(),
                approval_calls: Mutex::new(Vec::new()),
                deposit_calls: Mutex::new(Vec::new()),
            });
            let (tx, errors) = unbounded_channel();
            let orchestrator =
                DepositOrchestrator::new(calldata.clone(), presenter.clone(), recorder, Arc::new(tx));
            Self {
                orchestrator,
                presenter,
                calldata,
                manager,
                errors,
            }
        }

        fn errors(&mut self) -> Vec<String> {
            let mut out = Vec::new();
            while let Ok(message) = self.errors.try_recv() {
                out.push(message);
            }
            out
        }

        fn deposit_calls(&self) -> Vec<(String, u8, usize)> {
            self.calldata.deposit_calls.lock().unwrap().clone()
        }

        fn approval_calls(&self) -> Vec<(Vec<String>, String)> {
            self.calldata.approval_calls.lock().unwrap().clone()
        }
    }

    fn intent(symbol: Option<&str>, decimals: Option<u8>) -> DepositIntent {
        DepositIntent {
            vault: VaultRef {
                id: "0xabc-vault".to_string(),
                vault_id: U256::from(42u64),
                owner: Address::repeat_byte(0x11),
                orderbook: Address::repeat_byte(0x22),
                token: TokenInfo {
                    address: Address::repeat_byte(0x33),
                    symbol: symbol.map(str::to_string),
                    decimals,
                },
                chain_id: 8453,
            },
            network_key: "base".to_string(),
            subgraph_url: "https://subgraph.example/base".to_string(),
            rpc_urls: vec!["https://rpc-1.example".to_string(), "https://rpc-2.example".to_string()],
            account: Address::repeat_byte(0x44),
        }
    }

    fn approve_bytes() -> Bytes {
        Bytes::from(vec![0x09, 0x5e, 0xa7, 0xb3])
    }

    fn deposit_bytes() -> Bytes {
        Bytes::from(vec![0x91, 0x33, 0x7c, 0x0a])
    }

    #[tokio::test]
    async fn test_approval_then_deposit() {
        let approval_hash = B256::repeat_byte(0xaa);
        let deposit_hash = B256::repeat_byte(0xdd);
        let mut h = Harness::new(
            Ok(approve_bytes()),
            Ok(deposit_bytes()),
            Some(U256::from(TEN_TOKENS)),
            vec![Some(approval_hash), Some(deposit_hash)],
        );
        let intent = intent(Some("WETH"), Some(18));

        let outcome = h.orchestrator.initiate_deposit(&intent).await.unwrap();
        assert_eq!(
            outcome,
            DepositOutcome::Submitted {
                approval: Some(approval_hash),
                deposit: deposit_hash,
            }
        );

        let modals = h.presenter.amount_modals.lock().unwrap().clone();
        assert_eq!(modals.len(), 1);
        assert_eq!(modals[0].chain_id, 8453);
        assert_eq!(modals[0].rpc_urls, intent.rpc_urls);
        assert_eq!(modals[0].subgraph_url, intent.subgraph_url);
        assert_eq!(modals[0].account, intent.account);

        assert_eq!(
            h.approval_calls(),
            vec![(intent.rpc_urls.clone(), TEN_TOKENS.to_string())]
        );

        let confirmations = h.presenter.confirmations();
        assert_eq!(confirmations.len(), 2);
        assert_eq!(confirmations[0].title, "Approving WETH spend");
        assert!(confirmations[0].close_on_confirm);
        assert_eq!(confirmations[0].to_address, Address::repeat_byte(0x33));
        assert_eq!(confirmations[0].calldata, approve_bytes());
        assert_eq!(confirmations[1].title, "Depositing 10 WETH");
        assert!(!confirmations[1].close_on_confirm);
        assert_eq!(confirmations[1].to_address, intent.orderbook_address());
        assert_eq!(confirmations[1].to_address, Address::repeat_byte(0x22));
        assert_eq!(confirmations[1].chain_id, 8453);
        assert_eq!(confirmations[1].calldata, deposit_bytes());

        let records = h.manager.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, TransactionKind::Approval);
        assert_eq!(records[0].tx_hash, approval_hash);
        assert_eq!(records[0].query_key, "0xabc-vault");
        assert_eq!(records[0].network_key, "base");
        assert_eq!(records[1].kind, TransactionKind::Deposit);
        assert_eq!(records[1].tx_hash, deposit_hash);
        assert_eq!(records[1].amount, Some(U256::from(TEN_TOKENS)));
        assert_eq!(
            records[1].subgraph_url.as_deref(),
            Some("https://subgraph.example/base")
        );

        // The approval was recorded before deposit calldata was requested.
        assert_eq!(h.deposit_calls(), vec![(TEN_TOKENS.to_string(), 18, 1)]);
        assert!(h.errors().is_empty());
    }

    #[tokio::test]
    async fn test_approval_error_skips_to_deposit() {
        let deposit_hash = B256::repeat_byte(0xdd);
        let mut h = Harness::new(
            Err(CalldataError::Provider("could not determine allowance".to_string())),
            Ok(deposit_bytes()),
            Some(U256::from(5u64)),
            vec![Some(deposit_hash)],
        );

        let outcome = h
            .orchestrator
            .initiate_deposit(&intent(Some("USDC"), Some(6)))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DepositOutcome::Submitted {
                approval: None,
                deposit: deposit_hash,
            }
        );

        let confirmations = h.presenter.confirmations();
        assert_eq!(confirmations.len(), 1);
        assert!(confirmations[0].title.starts_with("Depositing"));
        assert!(!confirmations[0].close_on_confirm);

        let records = h.manager.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, TransactionKind::Deposit);
        assert_eq!(h.deposit_calls(), vec![("5".to_string(), 6, 0)]);
        assert!(h.errors().is_empty());
    }

    #[tokio::test]
    async fn test_approval_not_required_skips_to_deposit() {
        let mut h = Harness::new(
            Err(CalldataError::ApprovalNotRequired {
                allowance: U256::MAX,
                amount: U256::from(1u64),
            }),
            Ok(deposit_bytes()),
            Some(U256::from(1u64)),
            vec![Some(B256::repeat_byte(1))],
        );

        h.orchestrator
            .on_amount_submitted(&intent(Some("USDC"), Some(6)), U256::from(1u64))
            .await
            .unwrap();

        assert_eq!(h.presenter.confirmations().len(), 1);
        assert_eq!(h.manager.records().unwrap().len(), 1);
        assert!(h.errors().is_empty());
    }

    #[tokio::test]
    async fn test_missing_decimals_aborts_full_flow_before_approval() {
        let mut h = Harness::new(
            Ok(approve_bytes()),
            Ok(deposit_bytes()),
            Some(U256::from(1u64)),
            vec![Some(B256::repeat_byte(0xaa)), Some(B256::repeat_byte(0xdd))],
        );

        let outcome = h
            .orchestrator
            .initiate_deposit(&intent(Some("USDC"), None))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DepositOutcome::Aborted("Token decimals not found".to_string())
        );
        assert_eq!(h.errors(), vec!["Token decimals not found".to_string()]);
        assert!(h.approval_calls().is_empty());
        assert!(h.deposit_calls().is_empty());
        assert!(h.presenter.confirmations().is_empty());
        assert!(h.manager.records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_decimals_aborts_before_any_request() {
        let mut h = Harness::new(Ok(approve_bytes()), Ok(deposit_bytes()), None, vec![]);

        let outcome = h
            .orchestrator
            .execute_deposit(&intent(Some("USDC"), None), U256::from(1u64), None)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DepositOutcome::Aborted("Token decimals not found".to_string())
        );
        assert_eq!(h.errors(), vec!["Token decimals not found".to_string()]);
        assert!(h.approval_calls().is_empty());
        assert!(h.deposit_calls().is_empty());
        assert!(h.presenter.confirmations().is_empty());
    }

    #[tokio::test]
    async fn test_deposit_error_is_passed_through() {
        let mut h = Harness::new(
            Err(CalldataError::Provider("no approval".to_string())),
            Err(CalldataError::Provider("insufficient balance".to_string())),
            Some(U256::from(100u64)),
            vec![],
        );

        let outcome = h
            .orchestrator
            .initiate_deposit(&intent(Some("USDC"), Some(6)))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DepositOutcome::Aborted("insufficient balance".to_string())
        );
        assert_eq!(h.errors(), vec!["insufficient balance".to_string()]);
        assert!(h.presenter.confirmations().is_empty());
        assert!(h.manager.records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dismissed_amount_modal_makes_no_requests() {
        let h = Harness::new(Ok(approve_bytes()), Ok(deposit_bytes()), None, vec![]);

        let outcome = h
            .orchestrator
            .initiate_deposit(&intent(Some("USDC"), Some(6)))
            .await
            .unwrap();

        assert_eq!(outcome, DepositOutcome::AmountDismissed);
        assert!(h.approval_calls().is_empty());
        assert!(h.deposit_calls().is_empty());
    }

    #[tokio::test]
    async fn test_dismissed_approval_stops_flow() {
        let h = Harness::new(
            Ok(approve_bytes()),
            Ok(deposit_bytes()),
            Some(U256::from(1u64)),
            vec![None],
        );

        let outcome = h
            .orchestrator
            .initiate_deposit(&intent(None, Some(6)))
            .await
            .unwrap();

        assert_eq!(outcome, DepositOutcome::ApprovalDismissed);
        assert_eq!(h.presenter.confirmations()[0].title, "Approving token spend");
        assert!(h.manager.records().unwrap().is_empty());
        assert!(h.deposit_calls().is_empty());
    }

    #[tokio::test]
    async fn test_dismissed_deposit_keeps_approval_record() {
        let approval_hash = B256::repeat_byte(0xaa);
        let h = Harness::new(
            Ok(approve_bytes()),
            Ok(deposit_bytes()),
            Some(U256::from(1u64)),
            vec![Some(approval_hash), None],
        );

        let outcome = h
            .orchestrator
            .initiate_deposit(&intent(Some("USDC"), Some(6)))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DepositOutcome::DepositDismissed {
                approval: Some(approval_hash)
            }
        );
        let records = h.manager.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, TransactionKind::Approval);
    }

    #[tokio::test]
    async fn test_failed_approval_record_stops_before_deposit() {
        let manager = Arc::new(InMemoryTransactionManager::new());
        let mut h = Harness::with_manager(
            Ok(approve_bytes()),
            Ok(deposit_bytes()),
            Some(U256::from(1u64)),
            vec![Some(B256::repeat_byte(0xaa))],
            manager,
            Arc::new(FailingManager),
        );

        let res = h
            .orchestrator
            .initiate_deposit(&intent(Some("USDC"), Some(6)))
            .await;

        assert!(res.is_err());
        assert_eq!(h.errors().len(), 1);
        assert!(h.deposit_calls().is_empty());
    }

    #[tokio::test]
    async fn test_title_without_displayable_amount() {
        let h = Harness::new(
            Err(CalldataError::Provider("skip".to_string())),
            Ok(deposit_bytes()),
            Some(U256::from(1u64)),
            vec![None],
        );

        h.orchestrator
            .execute_deposit(&intent(Some("DAI"), Some(90)), U256::from(1u64), None)
            .await
            .unwrap();

        assert_eq!(h.presenter.confirmations()[0].title, "Depositing DAI");
    }

    #[test]
    fn test_display_amount() {
        assert_eq!(display_amount(U256::from(TEN_TOKENS), 18).as_deref(), Some("10"));
        assert_eq!(display_amount(U256::from(1_500_000u64), 6).as_deref(), Some("1.5"));
        assert_eq!(display_amount(U256::from(1u64), 6).as_deref(), Some("0.000001"));
        assert_eq!(display_amount(U256::ZERO, 6).as_deref(), Some("0"));
        assert_eq!(display_amount(U256::from(500u64), 0).as_deref(), Some("500"));
        assert_eq!(display_amount(U256::from(1u64), 78), None);
    }
}
