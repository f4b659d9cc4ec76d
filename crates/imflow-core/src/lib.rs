//! IMFLOW Core Library
//!
//! Review workflow for instructional materials (IMs): rubric catalogs, the
//! scoring engine, the notes audit trail and the status state machine, plus
//! the pipeline that runs one reviewer action against a repository.
//!
//! ## Layer 1 - Domain logic
//!
//! Everything here is pure except [`review::ReviewPipeline`], which talks to
//! the persistence boundary in `imflow-state`.

pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod obs;
pub mod review;
pub mod scoring;
pub mod telemetry;
pub mod workflow;

/// Crate version, as reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use catalog::{
    imer_pimec_catalog, uec_catalog, Applicability, CatalogError, CatalogRegistry, RubricCatalog,
    RubricItem, RubricSection, ScoringContext, IMER_PIMEC_CATALOG_ID, UEC_CATALOG_ID,
};
pub use config::{ConfigError, ThresholdOption, WorkflowConfig, CONFIG_ENV};
pub use error::{ImflowError, Result};
pub use ledger::{
    append_block, append_decision_block, extract_latest_block, recover_score, score_prefix, Ledger,
    LedgerEntry, RecoveredScore, DEFAULT_EXTRACT_WINDOW,
};
pub use metrics::METRICS;
pub use obs::{
    emit_evaluation_scored, emit_ledger_appended, emit_transition_applied, emit_transition_refused,
    review_span, ReviewSpan,
};
pub use review::{ReviewPipeline, ReviewReceipt};
pub use scoring::{
    is_complete, missing_items, score_sheet, EvaluationOutcome, ScoreRequest, ScoreSheet,
    ScoringError, SectionScore, Threshold,
};
pub use telemetry::init_tracing;
pub use workflow::{
    evaluate_input, next_status, transition, ApprovalGrant, ApprovalSession, Decision, Outcome,
    Stage, Transition, TransitionInput, TransitionPolicy, TransitionRequest, WorkflowError,
    WorkflowStatus,
};

pub use imflow_state::{ImId, ImRecord, ImRepository, Page, RecordPatch};
