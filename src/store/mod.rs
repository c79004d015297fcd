//! Vote Storage Module
//!
//! Persists contestants, aggregate counters and the vote log,
//! and renders exports from them.

mod votes;
pub mod export;

pub use votes::{VoteRecord, VoteStore};
pub use export::{ExportFormat, ExportReport};
