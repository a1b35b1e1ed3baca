//! Insurance Ledger
//!
//! Escrowed flight-delay insurance:
//! - Capped policy purchase
//! - Payout on airline-caused delay
//! - Withdrawable credit with transfer-after-clear ordering

pub mod ledger;
pub mod transfer;

pub use ledger::{CreditPlan, InsuranceLedger, PayoutTerms, Policy, Withdrawal};
pub use transfer::{ValueTransfer, Vault};
