//! Structured observability hooks for review actions.
//!
//! - `ReviewSpan` / `review_span`: scope tracing output to one IM
//! - emit functions for scoring, transitions and ledger writes

use tracing::{info, warn};

use crate::workflow::{Stage, WorkflowStatus};

/// RAII guard that enters an IM-scoped span for the duration of an action.
///
/// ```ignore
/// let _span = ReviewSpan::enter("im-42", Stage::Imer);
/// // every event below carries im_id = "im-42", stage = "IMER"
/// ```
pub struct ReviewSpan {
    _span: tracing::span::EnteredSpan,
}

impl ReviewSpan {
    pub fn enter(im_id: &str, stage: Stage) -> Self {
        Self {
            _span: review_span(im_id, stage).entered(),
        }
    }
}

/// The IM-scoped span, unentered. Async callers attach it with
/// `tracing::Instrument` instead of holding a guard across `.await`.
pub fn review_span(im_id: &str, stage: Stage) -> tracing::Span {
    tracing::info_span!("imflow.review", im_id = %im_id, stage = %stage)
}

/// Emit event: a rubric was scored.
pub fn emit_evaluation_scored(im_id: &str, stage: Stage, total: u32, max: u32, passed: bool) {
    info!(
        event = "evaluation.scored",
        im_id = %im_id,
        stage = %stage,
        total = total,
        max = max,
        passed = passed,
    );
}

/// Emit event: a status change was persisted.
pub fn emit_transition_applied(
    im_id: &str,
    stage: Stage,
    from: WorkflowStatus,
    to: WorkflowStatus,
) {
    info!(
        event = "transition.applied",
        im_id = %im_id,
        stage = %stage,
        from = %from,
        to = %to,
    );
}

/// Emit event: a transition was refused (warning level).
pub fn emit_transition_refused(
    im_id: &str,
    stage: Stage,
    from: &str,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "transition.refused",
        im_id = %im_id,
        stage = %stage,
        from = %from,
        error = %error,
    );
}

/// Emit event: a ledger block was written in front of the notes.
pub fn emit_ledger_appended(im_id: &str, header: &str, notes_len: usize) {
    info!(
        event = "ledger.appended",
        im_id = %im_id,
        header = %header,
        notes_len = notes_len,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_span_enter() {
        let _span = ReviewSpan::enter("im-1", Stage::Pimec);
    }
}
