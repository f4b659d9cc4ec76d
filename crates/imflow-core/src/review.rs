//! Review pipeline: one submitted action per call, end to end.
//!
//! Reads the IM from the repository, runs the scoring engine (rubric
//! stages), prepends a ledger entry, resolves the next status and writes the
//! `(status, notes)` patch in one call guarded by the version that was read.
//! Concurrent evaluators of the same record are not reconciled here: the
//! second writer gets `StorageError::VersionConflict`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use imflow_state::{AssociationIndex, ImId, ImRecord, ImRepository, Page, RecordPatch};

use crate::catalog::{CatalogError, CatalogRegistry, ScoringContext};
use crate::config::WorkflowConfig;
use crate::error::{ImflowError, Result};
use crate::ledger::{recover_score, score_prefix, Ledger, LedgerEntry, RecoveredScore};
use crate::metrics::METRICS;
use crate::obs::{
    emit_evaluation_scored, emit_ledger_appended, emit_transition_applied, emit_transition_refused,
    review_span,
};
use crate::scoring::{score_sheet, EvaluationOutcome, ScoreSheet, ScoringError};
use crate::workflow::{
    ensure_rubric_turn, transition, ApprovalGrant, Decision, Outcome, Stage, Transition,
    TransitionRequest, WorkflowStatus,
};

/// Page size used when walking a whole queue for scope filtering.
const SCAN_PAGE_SIZE: u32 = 100;

/// What a successful action produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewReceipt {
    pub im_id: ImId,
    pub transition: Transition,
    /// Present for rubric stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<EvaluationOutcome>,
    pub patch: RecordPatch,
    /// Record version after the patch was written.
    pub version: u64,
}

/// Orchestrates scoring, ledger and state machine over a repository.
pub struct ReviewPipeline<R> {
    repo: R,
    catalogs: CatalogRegistry,
    config: WorkflowConfig,
}

impl<R: ImRepository> ReviewPipeline<R> {
    pub fn new(repo: R, catalogs: CatalogRegistry, config: WorkflowConfig) -> Self {
        Self {
            repo,
            catalogs,
            config,
        }
    }

    /// Pipeline with built-in catalogs and default configuration.
    pub fn with_defaults(repo: R) -> Self {
        Self::new(repo, CatalogRegistry::builtin(), WorkflowConfig::default())
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn catalogs(&self) -> &CatalogRegistry {
        &self.catalogs
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Submit a rubric evaluation for a rubric stage.
    ///
    /// # Errors
    ///
    /// - `Workflow(IllegalTransition)` when the IM is not awaiting `stage`
    ///   (checked before scoring)
    /// - `Scoring(..)` for incomplete or out-of-range sheets
    /// - `Workflow(ApprovalRequired)` for a passing UEC evaluation without
    ///   a grant
    /// - `Storage(..)` when the read or the patch write fails
    pub async fn submit_evaluation(
        &self,
        im_id: &ImId,
        stage: Stage,
        sheet: ScoreSheet,
        context: ScoringContext,
        approval: Option<ApprovalGrant<'_>>,
    ) -> Result<ReviewReceipt> {
        self.evaluate(im_id, stage, sheet, context, approval)
            .instrument(review_span(im_id.as_str(), stage))
            .await
    }

    async fn evaluate(
        &self,
        im_id: &ImId,
        stage: Stage,
        sheet: ScoreSheet,
        context: ScoringContext,
        approval: Option<ApprovalGrant<'_>>,
    ) -> Result<ReviewReceipt> {
        let record = self.repo.get(im_id).await?;
        let current = self.parse_status(&record, stage)?;

        self.guard(&record, ensure_rubric_turn(current, stage), stage)?;

        let catalog = self.catalogs.for_stage(stage)?;
        let threshold = self
            .config
            .threshold_for(stage)
            .ok_or(CatalogError::NoCatalogForStage(stage))?;

        let outcome = score_sheet(catalog, &sheet, context, threshold)?;
        METRICS.inc_evaluations_scored();
        emit_evaluation_scored(
            im_id.as_str(),
            stage,
            outcome.total_score,
            outcome.total_max,
            outcome.passed,
        );

        let mut request = TransitionRequest::new(
            current,
            stage,
            Outcome::Scored {
                passed: outcome.passed,
            },
        );
        request.approval = approval;
        let step = self.guard(
            &record,
            transition(&request, &self.config.transition_policy()),
            stage,
        )?;

        let entry = LedgerEntry::evaluation(stage, outcome.clone(), Utc::now());
        self.commit(record, step, entry, Some(outcome)).await
    }

    /// Submit an explicit decision (Faculty submit, UEC approve/reject
    /// without a rubric, Admin approve/reject).
    pub async fn submit_decision(
        &self,
        im_id: &ImId,
        stage: Stage,
        decision: Decision,
        comment: Option<String>,
        approval: Option<ApprovalGrant<'_>>,
    ) -> Result<ReviewReceipt> {
        self.decide(im_id, stage, decision, comment, approval)
            .instrument(review_span(im_id.as_str(), stage))
            .await
    }

    async fn decide(
        &self,
        im_id: &ImId,
        stage: Stage,
        decision: Decision,
        comment: Option<String>,
        approval: Option<ApprovalGrant<'_>>,
    ) -> Result<ReviewReceipt> {
        let record = self.repo.get(im_id).await?;
        let current = self.parse_status(&record, stage)?;

        let mut request = TransitionRequest::new(current, stage, Outcome::decision(decision));
        request.approval = approval;
        let step = self.guard(
            &record,
            transition(&request, &self.config.transition_policy()),
            stage,
        )?;

        let entry = LedgerEntry::decision(stage, decision, step.to, comment, Utc::now());
        self.commit(record, step, entry, None).await
    }

    /// The newest rubric result `stage` left in the IM's notes.
    pub async fn latest_evaluation(
        &self,
        im_id: &ImId,
        stage: Stage,
    ) -> Result<Option<RecoveredScore>> {
        let record = self.repo.get(im_id).await?;
        Ok(recover_score(
            &record.notes,
            &score_prefix(stage),
            self.config.ledger.extract_window,
        ))
    }

    /// IMs awaiting `status`.
    pub async fn queue(
        &self,
        status: WorkflowStatus,
        page: u32,
        per_page: u32,
    ) -> Result<Page<ImRecord>> {
        let listed = self
            .repo
            .list_by_status(status.as_str(), page, per_page)
            .await?;
        Ok(listed)
    }

    /// IMs awaiting `status` that `user_id` is allowed to see.
    ///
    /// Scope filtering needs the whole queue, so it is walked page by page
    /// and paginated again after filtering.
    pub async fn queue_for<I: AssociationIndex + ?Sized>(
        &self,
        index: &I,
        user_id: &str,
        status: WorkflowStatus,
        page: u32,
        per_page: u32,
    ) -> Result<Page<ImRecord>> {
        let scope = index.scope_for(user_id).await?;
        let mut visible = Vec::new();
        let mut scan = 1;
        loop {
            let batch = self
                .repo
                .list_by_status(status.as_str(), scan, SCAN_PAGE_SIZE)
                .await?;
            let exhausted = batch.items.is_empty() || scan >= batch.total_pages;
            visible.extend(batch.items.into_iter().filter(|r| scope.covers(r)));
            if exhausted {
                break;
            }
            scan += 1;
        }
        Ok(Page::paginate(visible, page, per_page))
    }

    fn parse_status(&self, record: &ImRecord, stage: Stage) -> Result<WorkflowStatus> {
        record.status.parse::<WorkflowStatus>().map_err(|e| {
            METRICS.inc_transitions_refused();
            emit_transition_refused(record.id.as_str(), stage, &record.status, &e);
            ImflowError::from(e)
        })
    }

    /// Log and count a refused transition before surfacing it.
    fn guard<T>(
        &self,
        record: &ImRecord,
        result: std::result::Result<T, crate::workflow::WorkflowError>,
        stage: Stage,
    ) -> Result<T> {
        result.map_err(|e| {
            METRICS.inc_transitions_refused();
            emit_transition_refused(record.id.as_str(), stage, &record.status, &e);
            ImflowError::from(e)
        })
    }

    async fn commit(
        &self,
        record: ImRecord,
        step: Transition,
        entry: LedgerEntry,
        outcome: Option<EvaluationOutcome>,
    ) -> Result<ReviewReceipt> {
        let header = entry.header.clone();
        let mut ledger = Ledger::from_legacy(record.notes);
        ledger.push(entry);
        let patch = RecordPatch {
            status: step.to.to_string(),
            notes: ledger.render(),
        };

        let updated = self
            .repo
            .write_patch(&record.id, record.version, &patch)
            .await?;
        emit_ledger_appended(record.id.as_str(), &header, patch.notes.len());
        METRICS.inc_transitions_applied();
        emit_transition_applied(record.id.as_str(), step.stage, step.from, step.to);

        Ok(ReviewReceipt {
            im_id: record.id,
            transition: step,
            outcome,
            patch,
            version: updated.version,
        })
    }
}

/// Fail with the first field a request rejected, for callers that want
/// all-or-nothing submission. The remaining rejections are dropped.
pub fn reject_partial(rejected: Vec<ScoringError>) -> std::result::Result<(), ScoringError> {
    match rejected.into_iter().next() {
        Some(first) => Err(first),
        None => Ok(()),
    }
}
