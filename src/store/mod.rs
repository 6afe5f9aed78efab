//! Present Store
//!
//! This module provides the reconstructed entity model and its store:
//!
//! - **types**: Present, PresentStatus, Asset, PresentDetails
//! - **entity_store**: Event-sourced store folding classified events into presents
//!
//! # Architecture
//!
//! ```text
//! Apply Path:
//!   ChainEvents → sort (block, logIndex) → dedup ledger → state machine → Present
//!
//! Read Path:
//!   get / list (insertion order) / status
//! ```

pub mod entity_store;
pub mod types;

pub use entity_store::{ApplyOutcome, BatchSummary, EntityStore, PresentPage, StoreStatus};
pub use types::{
    Asset, Present, PresentDetails, PresentId, PresentStatus, Provenance, TOKEN_TYPE_ERC20,
    TOKEN_TYPE_NATIVE, ZERO_ADDRESS,
};
