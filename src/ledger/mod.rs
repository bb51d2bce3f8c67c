//! Loan dispute ledger.

pub mod reconciler;

pub use reconciler::*;
