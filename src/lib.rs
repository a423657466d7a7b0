//! # Curve Relay
//!
//! Bonding curve pricing together with batched settlement of funds across many wallets.

pub mod bundle;
pub mod cli;
pub mod config;
pub mod constants;
pub mod curve;
pub mod error;
pub mod instructions;
pub mod ledger;
pub mod metrics;
pub mod orchestrator;
pub mod planner;
pub mod serde;
pub mod settlement;
pub mod trade;
pub mod trade_builder;
pub mod transport;
