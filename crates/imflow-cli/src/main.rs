//! IMFLOW - Instructional Material Review Workflow CLI
//!
//! The `imflow` command drives the review core against JSON files, which is
//! how the workflow is exercised outside a web backend.
//!
//! ## Commands
//!
//! - `catalogs` / `catalog`: list rubric catalogs or show one
//! - `score`: score a rubric request
//! - `ledger`: append to or read back an IM's notes ledger
//! - `transition`: ask the state machine for the next status
//! - `review`: run one reviewer action against a records file
//! - `queue`: list a review queue from a records file

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};

use imflow_core::review::reject_partial;
use imflow_core::{
    append_block, evaluate_input, extract_latest_block, recover_score, score_prefix, score_sheet,
    ApprovalSession, CatalogRegistry, Decision, EvaluationOutcome, ImflowError, Outcome,
    ReviewPipeline, RubricCatalog, ScoreRequest, ScoringContext, Stage, TransitionInput,
    WorkflowConfig, WorkflowStatus, METRICS,
};
use imflow_state::fakes::MemoryImRepository;
use imflow_state::{normalize_page, ImId, ImRecord};

#[derive(Parser)]
#[command(name = "imflow")]
#[command(author = "Stevedores Org")]
#[command(version = imflow_core::VERSION)]
#[command(about = "Instructional material review workflow (IMFLOW)", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Workflow config file (TOML)
    #[arg(long, global = true, env = "IMFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available rubric catalogs
    Catalogs,

    /// Show one catalog's sections and items
    Catalog {
        /// Catalog id, e.g. imer-pimec or uec
        id: String,

        /// Hide module-only items
        #[arg(long)]
        non_module: bool,
    },

    /// Score a rubric request (JSON: {catalogId, scores, context})
    Score {
        /// Path to the score request
        #[arg(short, long)]
        request: PathBuf,

        /// Stage whose threshold applies (default: the catalog's first stage)
        #[arg(short, long)]
        stage: Option<Stage>,

        /// Fail when any score in the request is rejected
        #[arg(long)]
        strict: bool,
    },

    /// Work with the notes ledger
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },

    /// Resolve the next workflow status
    Transition {
        /// Transition input (JSON: {currentStatus, stage, outcome, approvalPrecondition})
        #[arg(short, long, conflicts_with_all = ["status", "stage"])]
        input: Option<PathBuf>,

        /// Current status, e.g. "For IMER Evaluation"
        #[arg(long, requires = "stage")]
        status: Option<WorkflowStatus>,

        /// Acting stage
        #[arg(long, requires = "status")]
        stage: Option<Stage>,

        /// Rubric verdict
        #[arg(long, conflicts_with = "decision")]
        passed: Option<bool>,

        /// Explicit decision: approve, reject or submit
        #[arg(long)]
        decision: Option<Decision>,

        /// Recommendation letter downloaded or already on file
        #[arg(long)]
        approval_precondition: bool,
    },

    /// Run one reviewer action against a records file
    Review {
        /// Records listing (JSON array or paginated object)
        #[arg(long)]
        records: PathBuf,

        /// IM id
        #[arg(long)]
        im: String,

        /// Acting stage
        #[arg(long)]
        stage: Stage,

        /// Score request for rubric stages
        #[arg(long, conflicts_with = "decision")]
        request: Option<PathBuf>,

        /// Decision for non-rubric actions
        #[arg(long)]
        decision: Option<Decision>,

        /// Decision comment
        #[arg(long)]
        comment: Option<String>,

        /// The recommendation letter was downloaded in this session
        #[arg(long)]
        downloaded: bool,

        /// A recommendation letter is already on file
        #[arg(long)]
        has_file: bool,

        /// Write the updated records here (default: print the receipt only)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// List IMs awaiting a status
    Queue {
        /// Records listing (JSON array or paginated object)
        #[arg(long)]
        records: PathBuf,

        /// Status to list
        #[arg(long)]
        status: WorkflowStatus,

        #[arg(long, default_value = "1")]
        page: u32,

        #[arg(long, default_value = "20")]
        per_page: u32,
    },
}

#[derive(Subcommand)]
enum LedgerAction {
    /// Score a request and print the notes with its block in front
    Append {
        /// Current notes (plain text); omit for an empty ledger
        #[arg(long)]
        notes: Option<PathBuf>,

        /// Stage writing the block
        #[arg(long)]
        stage: Stage,

        /// Score request
        #[arg(long)]
        request: PathBuf,
    },

    /// Print the newest block a stage left and its parsed score
    Extract {
        /// Notes (plain text)
        #[arg(long)]
        notes: PathBuf,

        /// Stage whose block to find
        #[arg(long)]
        stage: Stage,

        /// Maximum lines (default: from config)
        #[arg(long)]
        window: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    imflow_core::init_tracing(cli.json, level);

    let config = WorkflowConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load workflow config")?;
    let base_dir = cli.config.as_deref().and_then(Path::parent);
    let catalogs = config
        .catalogs(base_dir)
        .context("Failed to load rubric catalogs")?;

    let result = match cli.command {
        Commands::Catalogs => cmd_catalogs(&catalogs),
        Commands::Catalog { id, non_module } => cmd_catalog(&catalogs, &id, non_module),
        Commands::Score {
            request,
            stage,
            strict,
        } => cmd_score(&catalogs, &config, &request, stage, strict).map(|_| ()),
        Commands::Ledger { action } => match action {
            LedgerAction::Append {
                notes,
                stage,
                request,
            } => cmd_ledger_append(&catalogs, &config, notes.as_deref(), stage, &request),
            LedgerAction::Extract {
                notes,
                stage,
                window,
            } => cmd_ledger_extract(&config, &notes, stage, window),
        },
        Commands::Transition {
            input,
            status,
            stage,
            passed,
            decision,
            approval_precondition,
        } => {
            let input = match input {
                Some(path) => read_json_file(&path)?,
                None => transition_input_from_flags(
                    status,
                    stage,
                    passed,
                    decision,
                    approval_precondition,
                )?,
            };
            cmd_transition(&config, &input)
        }
        Commands::Review {
            records,
            im,
            stage,
            request,
            decision,
            comment,
            downloaded,
            has_file,
            out,
        } => {
            let action = match (request, decision) {
                (Some(path), None) => ReviewAction::Evaluate(read_json_file(&path)?),
                (None, Some(decision)) => ReviewAction::Decide { decision, comment },
                _ => bail!("review needs exactly one of --request or --decision"),
            };
            let mut session = ApprovalSession::open();
            if downloaded {
                session.mark_downloaded();
            }
            if has_file {
                session.acknowledge_existing_file();
            }
            cmd_review(
                catalogs,
                config,
                &records,
                &ImId::new(im),
                stage,
                action,
                &session,
                out.as_deref(),
            )
            .await
        }
        Commands::Queue {
            records,
            status,
            page,
            per_page,
        } => cmd_queue(catalogs, config, &records, status, page, per_page).await,
    };

    METRICS.flush();
    result
}

/// List the available rubric catalogs
fn cmd_catalogs(catalogs: &CatalogRegistry) -> Result<()> {
    println!("Rubric catalogs:");
    for catalog in catalogs.iter() {
        let stages: Vec<&str> = catalog.stages().iter().map(|s| s.as_str()).collect();
        println!(
            "  {} v{} [{}] {} (max {} module / {} non-module)",
            catalog.id(),
            catalog.version(),
            stages.join(", "),
            catalog.title(),
            catalog.total_max(ScoringContext::module()),
            catalog.total_max(ScoringContext::non_module()),
        );
    }
    Ok(())
}

/// Show one catalog's sections and items
fn cmd_catalog(catalogs: &CatalogRegistry, id: &str, non_module: bool) -> Result<()> {
    let catalog = catalogs.get(id)?;
    let context = context_for(non_module);
    println!(
        "{} v{}: {}",
        catalog.id(),
        catalog.version(),
        catalog.title()
    );
    for section in catalog.sections() {
        let max = catalog.section_max(&section.id, context);
        if max == 0 {
            continue;
        }
        println!("\n{} ({} pts)", section.title, max);
        for item in catalog.visible_items(&section.id, context) {
            println!("  {:<5} {:>2}  {}", item.id, item.max, item.label);
        }
    }
    println!("\nTotal: {}", catalog.total_max(context));
    Ok(())
}

fn context_for(non_module: bool) -> ScoringContext {
    if non_module {
        ScoringContext::non_module()
    } else {
        ScoringContext::module()
    }
}

/// Score a rubric request
fn cmd_score(
    catalogs: &CatalogRegistry,
    config: &WorkflowConfig,
    path: &Path,
    stage: Option<Stage>,
    strict: bool,
) -> Result<EvaluationOutcome> {
    let request: ScoreRequest = read_json_file(path)?;
    let outcome = score_request(catalogs, config, &request, stage, strict)?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(outcome)
}

fn score_request(
    catalogs: &CatalogRegistry,
    config: &WorkflowConfig,
    request: &ScoreRequest,
    stage: Option<Stage>,
    strict: bool,
) -> Result<EvaluationOutcome> {
    let catalog = catalogs.get(&request.catalog_id)?;
    let stage = resolve_stage(catalog, stage)?;
    let threshold = config
        .threshold_for(stage)
        .with_context(|| format!("Stage {stage} has no rubric threshold"))?;

    let (sheet, rejected) = request.to_sheet(catalog)?;
    report_rejected(&rejected);
    if strict {
        reject_partial(rejected).map_err(ImflowError::from)?;
    }
    let outcome = score_sheet(catalog, &sheet, request.context, threshold)
        .map_err(ImflowError::from)?;
    METRICS.inc_evaluations_scored();
    info!(
        catalog = %catalog.id(),
        stage = %stage,
        total = outcome.total_score,
        max = outcome.total_max,
        passed = outcome.passed,
        "request scored"
    );
    Ok(outcome)
}

fn resolve_stage(catalog: &RubricCatalog, stage: Option<Stage>) -> Result<Stage> {
    match stage {
        Some(stage) => Ok(stage),
        None => catalog
            .stages()
            .first()
            .copied()
            .with_context(|| format!("{} has no stage binding; pass --stage", catalog.id())),
    }
}

fn report_rejected(rejected: &[imflow_core::ScoringError]) {
    if rejected.is_empty() {
        return;
    }
    METRICS.add_scores_rejected(rejected.len() as u64);
    for err in rejected {
        warn!(error = %err, "score rejected");
        eprintln!("rejected: {err}");
    }
}

/// Score a request and print the notes with its block in front
fn cmd_ledger_append(
    catalogs: &CatalogRegistry,
    config: &WorkflowConfig,
    notes: Option<&Path>,
    stage: Stage,
    request: &Path,
) -> Result<()> {
    let prior = match notes {
        Some(path) => read_text_file(path)?,
        None => String::new(),
    };
    let request: ScoreRequest = read_json_file(request)?;
    let outcome = score_request(catalogs, config, &request, Some(stage), true)?;
    let header = imflow_core::ledger::score_header(stage, &outcome);
    print!("{}", append_block(&prior, &header, &outcome));
    println!();
    Ok(())
}

/// Print the newest block a stage left and its parsed score
fn cmd_ledger_extract(
    config: &WorkflowConfig,
    notes: &Path,
    stage: Stage,
    window: Option<usize>,
) -> Result<()> {
    let ledger = read_text_file(notes)?;
    let window = window.unwrap_or(config.ledger.extract_window);
    let prefix = score_prefix(stage);

    match extract_latest_block(&ledger, &prefix, window) {
        Some(block) => println!("{block}"),
        None => {
            println!("(empty ledger)");
            return Ok(());
        }
    }
    if let Some(score) = recover_score(&ledger, &prefix, window) {
        println!("\n{}", serde_json::to_string_pretty(&score)?);
    }
    Ok(())
}

fn transition_input_from_flags(
    status: Option<WorkflowStatus>,
    stage: Option<Stage>,
    passed: Option<bool>,
    decision: Option<Decision>,
    approval_precondition: bool,
) -> Result<TransitionInput> {
    let (Some(current_status), Some(stage)) = (status, stage) else {
        bail!("transition needs --input, or both --status and --stage");
    };
    let outcome = match (passed, decision) {
        (Some(passed), None) => Outcome::Scored { passed },
        (None, Some(decision)) => Outcome::decision(decision),
        _ => bail!("transition needs exactly one of --passed or --decision"),
    };
    Ok(TransitionInput {
        current_status,
        stage,
        outcome,
        approval_precondition: Some(approval_precondition),
    })
}

/// Resolve the next workflow status
fn cmd_transition(config: &WorkflowConfig, input: &TransitionInput) -> Result<()> {
    match evaluate_input(input, &config.transition_policy()) {
        Ok(step) => {
            METRICS.inc_transitions_applied();
            println!("{}", serde_json::to_string_pretty(&step)?);
            Ok(())
        }
        Err(e) => {
            METRICS.inc_transitions_refused();
            Err(ImflowError::from(e)).context("Transition refused")
        }
    }
}

enum ReviewAction {
    Evaluate(ScoreRequest),
    Decide {
        decision: Decision,
        comment: Option<String>,
    },
}

/// Run one reviewer action against a records file
#[allow(clippy::too_many_arguments)]
async fn cmd_review(
    catalogs: CatalogRegistry,
    config: WorkflowConfig,
    records: &Path,
    im_id: &ImId,
    stage: Stage,
    action: ReviewAction,
    session: &ApprovalSession,
    out: Option<&Path>,
) -> Result<()> {
    let repo = load_repository(records)?;
    let pipeline = ReviewPipeline::new(repo, catalogs, config);
    let grant = session.grant().ok();

    let result = match action {
        ReviewAction::Evaluate(request) => {
            let catalog = pipeline.catalogs().for_stage(stage)?;
            let (sheet, rejected) = request.to_sheet(catalog)?;
            report_rejected(&rejected);
            reject_partial(rejected).map_err(ImflowError::from)?;
            pipeline
                .submit_evaluation(im_id, stage, sheet, request.context, grant)
                .await
        }
        ReviewAction::Decide { decision, comment } => {
            pipeline
                .submit_decision(im_id, stage, decision, comment, grant)
                .await
        }
    };
    let receipt = result.map_err(|e| anyhow::anyhow!(e.user_message()))?;

    println!("{}", serde_json::to_string_pretty(&receipt)?);
    if let Some(out) = out {
        let all = pipeline.repository().all()?;
        write_json_file(out, &all)?;
        info!(path = %out.display(), records = all.len(), "records written");
    }
    Ok(())
}

/// List IMs awaiting a status
async fn cmd_queue(
    catalogs: CatalogRegistry,
    config: WorkflowConfig,
    records: &Path,
    status: WorkflowStatus,
    page: u32,
    per_page: u32,
) -> Result<()> {
    let pipeline = ReviewPipeline::new(load_repository(records)?, catalogs, config);
    let listing = pipeline.queue(status, page, per_page).await?;

    println!(
        "{} (page {}/{}, {} total)",
        status,
        listing.page,
        listing.total_pages.max(1),
        listing.total
    );
    for record in &listing.items {
        println!(
            "  {:<12} v{:<3} {}",
            record.id.as_str(),
            record.version,
            record.subject_ref
        );
    }
    Ok(())
}

fn load_repository(path: &Path) -> Result<MemoryImRepository> {
    let raw: Value = read_json_file(path)?;
    let page = normalize_page::<ImRecord>(raw);
    info!(path = %path.display(), records = page.items.len(), "records loaded");
    Ok(MemoryImRepository::with_records(page.items))
}

fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}

fn read_text_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))
}

fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(dir: &Path, name: &str, value: &Value) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
        path
    }

    fn uec_request(score: i64) -> Value {
        let scores: serde_json::Map<String, Value> = imflow_core::uec_catalog()
            .items()
            .iter()
            .map(|i| (i.id.clone(), json!(score.min(i64::from(i.max)))))
            .collect();
        json!({"catalogId": "uec", "scores": scores, "context": {"isModule": true}})
    }

    #[test]
    fn parses_transition_flags() {
        let cli = Cli::try_parse_from([
            "imflow",
            "transition",
            "--status",
            "For UTLDO Evaluation",
            "--stage",
            "uec",
            "--decision",
            "approve",
            "--approval-precondition",
        ])
        .unwrap();
        match cli.command {
            Commands::Transition {
                status,
                stage,
                decision,
                approval_precondition,
                ..
            } => {
                assert_eq!(status, Some(WorkflowStatus::ForUtldoEvaluation));
                assert_eq!(stage, Some(Stage::Uec));
                assert_eq!(decision, Some(Decision::Approve));
                assert!(approval_precondition);
            }
            _ => panic!("expected transition"),
        }
    }

    #[test]
    fn transition_rejects_passed_with_decision() {
        assert!(Cli::try_parse_from([
            "imflow",
            "transition",
            "--status",
            "For IMER Evaluation",
            "--stage",
            "imer",
            "--passed",
            "true",
            "--decision",
            "approve",
        ])
        .is_err());
    }

    #[test]
    fn flags_build_transition_input() {
        let input = transition_input_from_flags(
            Some(WorkflowStatus::ForImerEvaluation),
            Some(Stage::Imer),
            Some(true),
            None,
            false,
        )
        .unwrap();
        let step = evaluate_input(&input, &WorkflowConfig::default().transition_policy()).unwrap();
        assert_eq!(step.to, WorkflowStatus::ForPimecEvaluation);

        let missing = transition_input_from_flags(None, Some(Stage::Imer), Some(true), None, false);
        assert!(missing.is_err());
    }

    #[test]
    fn uec_approval_without_precondition_is_refused() {
        let input = transition_input_from_flags(
            Some(WorkflowStatus::ForUtldoEvaluation),
            Some(Stage::Uec),
            None,
            Some(Decision::Approve),
            false,
        )
        .unwrap();
        assert!(cmd_transition(&WorkflowConfig::default(), &input).is_err());
    }

    #[test]
    fn score_uses_catalog_stage_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "req.json", &uec_request(10));
        let outcome = cmd_score(
            &CatalogRegistry::builtin(),
            &WorkflowConfig::default(),
            &path,
            None,
            false,
        )
        .unwrap();
        assert_eq!((outcome.total_score, outcome.total_max), (65, 65));
        assert!(outcome.passed);
    }

    #[test]
    fn strict_score_fails_on_out_of_range_value() {
        let mut request = uec_request(5);
        request["scores"]["u1"] = json!(99);
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "req.json", &request);
        let err = cmd_score(
            &CatalogRegistry::builtin(),
            &WorkflowConfig::default(),
            &path,
            None,
            true,
        )
        .unwrap_err();
        assert!(err.to_string().contains("u1"));
    }

    #[tokio::test]
    async fn review_writes_updated_records() {
        let dir = tempfile::tempdir().unwrap();
        let records = write(
            dir.path(),
            "records.json",
            &json!({
                "data": [
                    {
                        "id": "im-1",
                        "status": "For UTLDO Evaluation",
                        "notes": "",
                        "version": 3,
                        "subjectRef": "CS 101"
                    }
                ],
                "total": 1
            }),
        );
        let out = dir.path().join("out.json");
        let mut session = ApprovalSession::open();
        session.mark_downloaded();

        let request: ScoreRequest = serde_json::from_value(uec_request(10)).unwrap();
        cmd_review(
            CatalogRegistry::builtin(),
            WorkflowConfig::default(),
            &records,
            &ImId::new("im-1"),
            Stage::Uec,
            ReviewAction::Evaluate(request),
            &session,
            Some(&out),
        )
        .await
        .unwrap();

        let written: Vec<ImRecord> = read_json_file(&out).unwrap();
        assert_eq!(written[0].status, "For Certification");
        assert_eq!(written[0].version, 4);
        assert!(written[0].notes.starts_with("UEC Score: 65/65"));
    }

    #[tokio::test]
    async fn review_without_download_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let records = write(
            dir.path(),
            "records.json",
            &json!([{"id": "im-1", "status": "For UTLDO Evaluation", "subjectRef": "CS 101"}]),
        );
        let err = cmd_review(
            CatalogRegistry::builtin(),
            WorkflowConfig::default(),
            &records,
            &ImId::new("im-1"),
            Stage::Uec,
            ReviewAction::Decide {
                decision: Decision::Approve,
                comment: None,
            },
            &ApprovalSession::open(),
            None,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().starts_with("action failed"));
    }

    #[tokio::test]
    async fn queue_lists_matching_records() {
        let dir = tempfile::tempdir().unwrap();
        let records = write(
            dir.path(),
            "records.json",
            &json!([
                {"id": "im-1", "status": "For IMER Evaluation", "subjectRef": "CS 101"},
                {"id": "im-2", "status": "Certified", "subjectRef": "CS 102"}
            ]),
        );
        cmd_queue(
            CatalogRegistry::builtin(),
            WorkflowConfig::default(),
            &records,
            WorkflowStatus::ForImerEvaluation,
            1,
            10,
        )
        .await
        .unwrap();
    }
}
