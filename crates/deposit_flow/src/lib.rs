pub mod calldata;
pub mod manager;
pub mod orchestrator;
pub mod presenter;
pub mod types;

pub use calldata::{AllowanceSource, CalldataError, CalldataProvider, OrderbookCalldataProvider};
pub use manager::{
    ApprovalTransaction, DepositTransaction, InMemoryTransactionManager, TransactionKind,
    TransactionManager, TransactionRecord,
};
pub use orchestrator::{display_amount, DepositOrchestrator, DepositOutcome};
pub use presenter::{DepositModal, ErrorChannel, ModalPresenter, TransactionConfirmation};
pub use types::{DepositIntent, TokenInfo, VaultRef};
