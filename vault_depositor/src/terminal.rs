use alloy_primitives::{TxHash, U256};
use async_trait::async_trait;
use tokio::{
    io::{stdin, AsyncBufReadExt, BufReader, Lines, Stdin},
    sync::Mutex,
};
use tracing::warn;

use deposit_flow::{DepositModal, ModalPresenter, TransactionConfirmation};

/// Modal presenter over stdin/stdout. Signing stays with the user's wallet;
/// they paste back the hash of what they submitted.
pub struct TerminalPresenter {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl TerminalPresenter {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(stdin()).lines()),
        }
    }

    /// Empty input or EOF dismisses.
    async fn prompt(&self, question: &str) -> Option<String> {
        println!("{question}");
        let mut lines = self.lines.lock().await;
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim().to_string();
                (!line.is_empty()).then_some(line)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("failed to read stdin: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl ModalPresenter for TerminalPresenter {
    async fn deposit_amount(&self, modal: DepositModal) -> Option<U256> {
        println!("💰 Deposit into vault {}", modal.vault.id);
        println!("   Token: {} ({})", modal.vault.token_label(), modal.vault.token.address);
        println!("   Chain: {}", modal.chain_id);
        println!("   Account: {}", modal.account);
        loop {
            let answer = self
                .prompt("Amount in base units (empty to cancel):")
                .await?;
            match parse_amount(&answer) {
                Some(amount) => return Some(amount),
                None => println!("❌ Not a valid amount: {answer}"),
            }
        }
    }

    async fn confirm_transaction(&self, modal: TransactionConfirmation) -> Option<TxHash> {
        println!("📋 {}", modal.title);
        println!("   To: {}", modal.to_address);
        println!("   Chain: {}", modal.chain_id);
        println!("   Calldata: {}", modal.calldata);
        loop {
            let answer = self
                .prompt("Submit with your wallet and paste the transaction hash (empty to cancel):")
                .await?;
            match answer.parse::<TxHash>() {
                Ok(hash) => {
                    if modal.close_on_confirm {
                        println!("✅ Submitted {hash}");
                    } else {
                        println!("✅ Submitted {hash}, tracking continues in the transaction list");
                    }
                    return Some(hash);
                }
                Err(_) => println!("❌ Not a transaction hash: {answer}"),
            }
        }
    }
}

fn parse_amount(input: &str) -> Option<U256> {
    let amount = input.replace('_', "").parse::<U256>().ok()?;
    (!amount.is_zero()).then_some(amount)
}
