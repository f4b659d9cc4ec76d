//! UTLDO approval gate.
//!
//! Before a UEC reviewer may advance an IM to certification, the
//! recommendation letter must either be downloaded or acknowledged as
//! already held, within the same approval dialog. That state is never
//! persisted: it lives in an [`ApprovalSession`] and is re-armed whenever the
//! dialog is reopened.
//!
//! The session hands out an [`ApprovalGrant`] that borrows it. Reopening
//! needs `&mut self`, so a grant obtained before a reopen cannot outlive it.

use std::marker::PhantomData;

use super::error::{WorkflowError, WorkflowResult};

/// Interactive state of one approval dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApprovalSession {
    has_downloaded: bool,
    already_has_file: bool,
    /// Bumped on every reopen; useful for callers correlating UI events.
    generation: u32,
}

impl ApprovalSession {
    /// Open a fresh dialog with the gate disarmed.
    pub fn open() -> Self {
        Self::default()
    }

    /// Record that the recommendation letter was downloaded in this session.
    pub fn mark_downloaded(&mut self) {
        self.has_downloaded = true;
    }

    /// Record that the reviewer confirmed they already hold the letter.
    pub fn acknowledge_existing_file(&mut self) {
        self.already_has_file = true;
    }

    /// Close and reopen the dialog: every acknowledgement is forgotten.
    pub fn reopen(&mut self) {
        self.has_downloaded = false;
        self.already_has_file = false;
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn can_approve(&self) -> bool {
        self.has_downloaded || self.already_has_file
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Obtain the capability required to approve.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::ApprovalRequired` when neither the download
    /// nor the acknowledgement happened in this session.
    pub fn grant(&self) -> WorkflowResult<ApprovalGrant<'_>> {
        if self.can_approve() {
            Ok(ApprovalGrant {
                _session: PhantomData,
            })
        } else {
            Err(WorkflowError::ApprovalRequired)
        }
    }
}

/// Proof that the approval precondition held in a live session.
///
/// Only [`ApprovalSession::grant`] constructs it.
#[derive(Debug, Clone, Copy)]
pub struct ApprovalGrant<'s> {
    _session: PhantomData<&'s ApprovalSession>,
}

/// Adapter for the plain-data interface, where the caller reports the
/// precondition as a boolean it evaluated in its own session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalPrecondition(bool);

impl ApprovalPrecondition {
    pub fn from_flag(flag: Option<bool>) -> Self {
        Self(flag.unwrap_or(false))
    }

    /// A session reflecting the reported flag.
    pub fn into_session(self) -> ApprovalSession {
        let mut session = ApprovalSession::open();
        if self.0 {
            session.acknowledge_existing_file();
        }
        session
    }
}
