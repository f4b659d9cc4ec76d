//! imflow-state: Persistence Collaborator Boundary for IMFLOW
//!
//! This crate defines what the review workflow core expects from the outside
//! world: reading an IM, writing its `(status, notes)` patch, listing review
//! queues, and resolving reviewer scope. It implements no storage engine.
//!
//! ## Layer 0 - Data/Persistence boundary
//!
//! Focus: stable record shapes and tolerant decoding of listing payloads.
//!
//! ## Key Components
//!
//! - `ImRepository`: record read/patch/list contract
//! - `AssociationIndex`: colleges/departments scoping for reviewers
//! - `normalize_page`: listing shape adapter
//! - `fakes`: in-memory implementations

mod error;
pub mod fakes;
pub mod normalize;
pub mod storage_traits;

pub use error::StorageError;
pub use normalize::normalize_page;
pub use storage_traits::{
    AssociationIndex, ImId, ImRecord, ImRepository, Page, RecordPatch, ReviewerScope, StorageResult,
};
