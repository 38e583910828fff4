//! Service wrappers shared across clients

mod ledger;
mod queue;
mod store;

pub use ledger::LedgerService;
pub use queue::SyncQueue;
pub use store::TransactionStore;
