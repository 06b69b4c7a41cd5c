// src/lib.rs
//! Validation and execution engine for ERC-4337 user operations.
//!
//! [`EntryPoint`] holds the deposit ledger, the in-memory chain the account
//! and paymaster code lives on, and replay protection. Batches go through
//! [`EntryPoint::handle_ops`]; admission layers use
//! [`EntryPoint::simulate_validation`] against a snapshot.

pub mod capability;
pub mod chain;
pub mod codec;
pub mod config;
pub mod contracts;
pub mod entry_point;
pub mod error;
pub mod events;
pub mod execution;
pub mod gas;
pub mod ledger;
pub mod paymaster;
pub mod resolver;
pub mod rpc;
pub mod types;
pub mod validation;

pub use config::EntryPointConfig;
pub use entry_point::EntryPoint;
pub use error::{CallError, EntryPointError, LedgerError, RejectionReason};
pub use events::EntryPointEvent;
pub use execution::{HandleOpsReport, OpOutcome};
pub use types::{BlockEnv, UserOperation, ValidationData};
pub use validation::{SimulationOutcome, SimulationResult};
