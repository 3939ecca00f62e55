//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements outbound port traits for message finality.

mod ledger;

pub use ledger::{InMemoryLedger, LedgerMsg};
