//! Review workflow state machine.
//!
//! - **Statuses and stages**: the canonical status strings persisted on an
//!   IM and the actors that move it.
//! - **Transition table**: a stateless lookup from `(status, stage,
//!   outcome)` to the next status, refusing anything outside the table.
//! - **Approval gate**: the session-scoped recommendation-letter check that
//!   guards UTLDO approval.

pub mod approval;
pub mod error;
pub mod status;
pub mod transition;

pub use approval::{ApprovalGrant, ApprovalPrecondition, ApprovalSession};
pub use error::{WorkflowError, WorkflowResult};
pub use status::{Stage, WorkflowStatus};
pub use transition::{
    ensure_awaiting, ensure_rubric_turn, evaluate_input, next_status, transition, Decision, Outcome,
    Transition, TransitionInput, TransitionPolicy, TransitionRequest,
};
