//! The transition table.
//!
//! [`next_status`] is a pure lookup keyed by `(current status, acting stage,
//! outcome)`. Anything outside the table is refused with
//! [`WorkflowError::IllegalTransition`]; the machine never picks a "closest"
//! legal move and holds no state between calls.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::approval::{ApprovalGrant, ApprovalPrecondition};
use super::error::{WorkflowError, WorkflowResult};
use super::status::{Stage, WorkflowStatus};

/// An explicit decision taken by a non-rubric actor (or a UEC approver).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
    /// Faculty hands the IM in (first submission or resubmission).
    #[serde(alias = "resubmit")]
    Submit,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Submit => "submit",
        }
    }

    /// Past-tense label used in ledger headers.
    pub fn past_tense(self) -> &'static str {
        match self {
            Self::Approve => "Approved",
            Self::Reject => "Rejected",
            Self::Submit => "Submitted",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" => Ok(Self::Approve),
            "reject" | "rejected" => Ok(Self::Reject),
            "submit" | "resubmit" => Ok(Self::Submit),
            _ => Err(WorkflowError::UnknownDecision(s.to_string())),
        }
    }
}

/// What a stage concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    /// Result of a rubric evaluation.
    Scored { passed: bool },
    /// An explicit decision.
    Decided { decision: Decision },
}

impl Outcome {
    pub fn passed() -> Self {
        Self::Scored { passed: true }
    }

    pub fn failed() -> Self {
        Self::Scored { passed: false }
    }

    pub fn decision(decision: Decision) -> Self {
        Self::Decided { decision }
    }

    /// `Some(true)` for pass/approve, `Some(false)` for fail/reject.
    fn verdict(self) -> Option<bool> {
        match self {
            Self::Scored { passed } => Some(passed),
            Self::Decided {
                decision: Decision::Approve,
            } => Some(true),
            Self::Decided {
                decision: Decision::Reject,
            } => Some(false),
            Self::Decided {
                decision: Decision::Submit,
            } => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scored { passed: true } => f.write_str("passed"),
            Self::Scored { passed: false } => f.write_str("failed"),
            Self::Decided { decision } => write!(f, "{decision}"),
        }
    }
}

/// Configurable parts of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPolicy {
    /// Where an Admin approval at certification lands.
    pub approve_to: WorkflowStatus,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self {
            approve_to: WorkflowStatus::Certified,
        }
    }
}

/// One request to move an IM.
#[derive(Debug, Clone, Copy)]
pub struct TransitionRequest<'s> {
    pub current: WorkflowStatus,
    pub stage: Stage,
    pub outcome: Outcome,
    pub approval: Option<ApprovalGrant<'s>>,
}

impl<'s> TransitionRequest<'s> {
    pub fn new(current: WorkflowStatus, stage: Stage, outcome: Outcome) -> Self {
        Self {
            current,
            stage,
            outcome,
            approval: None,
        }
    }

    pub fn with_approval(mut self, grant: ApprovalGrant<'s>) -> Self {
        self.approval = Some(grant);
        self
    }
}

/// A computed move, ready to be folded into a record patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: WorkflowStatus,
    pub to: WorkflowStatus,
    pub stage: Stage,
}

/// Refuse a stage acting on a record that is not awaiting it.
pub fn ensure_awaiting(
    current: WorkflowStatus,
    stage: Stage,
    outcome: Outcome,
) -> WorkflowResult<()> {
    if stage.acts_on().contains(&current) {
        Ok(())
    } else {
        Err(illegal(current, stage, outcome))
    }
}

/// Refuse a scored submission from a stage that has no rubric, or that the
/// record is not awaiting. Checked before any scoring happens, so the
/// outcome is reported as a pass.
pub fn ensure_rubric_turn(current: WorkflowStatus, stage: Stage) -> WorkflowResult<()> {
    if !stage.is_rubric_stage() {
        return Err(illegal(current, stage, Outcome::passed()));
    }
    ensure_awaiting(current, stage, Outcome::passed())
}

/// Look up the next status.
///
/// # Errors
///
/// `IllegalTransition` when the triple is not in the table;
/// `ApprovalRequired` when a UEC approval arrives without a grant.
pub fn next_status(
    request: &TransitionRequest<'_>,
    policy: &TransitionPolicy,
) -> WorkflowResult<WorkflowStatus> {
    use Stage as S;
    use WorkflowStatus as W;

    let TransitionRequest {
        current,
        stage,
        outcome,
        approval,
    } = *request;

    let next = match (current, stage, outcome) {
        (
            W::AssignedToFaculty | W::ForResubmission,
            S::Faculty,
            Outcome::Decided {
                decision: Decision::Submit,
            },
        ) => W::ForImerEvaluation,

        (W::ForImerEvaluation, S::Imer, Outcome::Scored { passed }) => {
            if passed {
                W::ForPimecEvaluation
            } else {
                W::ForResubmission
            }
        }

        (W::ForPimecEvaluation, S::Pimec, Outcome::Scored { passed }) => {
            if passed {
                W::ForUtldoEvaluation
            } else {
                W::ForResubmission
            }
        }

        (W::ForUtldoEvaluation, S::Uec, _) => match outcome.verdict() {
            Some(true) => {
                if approval.is_none() {
                    return Err(WorkflowError::ApprovalRequired);
                }
                W::ForCertification
            }
            Some(false) => W::ForResubmission,
            None => return Err(illegal(current, stage, outcome)),
        },

        (
            W::ForCertification,
            S::Admin,
            Outcome::Decided {
                decision: Decision::Approve,
            },
        ) => policy.approve_to,

        (
            W::ForCertification,
            S::Admin,
            Outcome::Decided {
                decision: Decision::Reject,
            },
        ) => W::ForResubmission,

        _ => return Err(illegal(current, stage, outcome)),
    };

    tracing::debug!(
        from = %current,
        stage = %stage,
        outcome = %outcome,
        to = %next,
        "transition resolved"
    );
    Ok(next)
}

/// [`next_status`] wrapped into a [`Transition`].
pub fn transition(
    request: &TransitionRequest<'_>,
    policy: &TransitionPolicy,
) -> WorkflowResult<Transition> {
    let to = next_status(request, policy)?;
    Ok(Transition {
        from: request.current,
        to,
        stage: request.stage,
    })
}

fn illegal(from: WorkflowStatus, stage: Stage, outcome: Outcome) -> WorkflowError {
    WorkflowError::IllegalTransition {
        from,
        stage,
        outcome: outcome.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Plain-data interface
// ---------------------------------------------------------------------------

/// Transport-independent transition input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionInput {
    #[serde(alias = "current_status")]
    pub current_status: WorkflowStatus,
    pub stage: Stage,
    pub outcome: Outcome,
    #[serde(default, alias = "approval_precondition")]
    pub approval_precondition: Option<bool>,
}

/// Evaluate a [`TransitionInput`], mapping the boolean precondition onto a
/// one-shot approval session.
pub fn evaluate_input(
    input: &TransitionInput,
    policy: &TransitionPolicy,
) -> WorkflowResult<Transition> {
    let session = ApprovalPrecondition::from_flag(input.approval_precondition).into_session();
    let mut request = TransitionRequest::new(input.current_status, input.stage, input.outcome);
    if let Ok(grant) = session.grant() {
        request = request.with_approval(grant);
    }
    transition(&request, policy)
}
