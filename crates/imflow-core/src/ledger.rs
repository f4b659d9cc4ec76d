//! Notes ledger: the audit trail kept in an IM's notes field.
//!
//! Stages work with structured [`LedgerEntry`] values collected in a
//! [`Ledger`]. Only at the persistence boundary is the ledger rendered to
//! the legacy text layout, newest block first:
//!
//! ```text
//! PIMEC Score: 82/100
//! A. Content - 13/15
//!   Comment: Cite the 2023 edition
//! ...
//! Overall Comment: Good revision
//!
//! IMER Score: 78/100
//! ...
//! ```
//!
//! Prior text is never rewritten; new blocks are only put in front of it.
//! Reading back is lenient: none of the functions here fail, they fall back
//! to the raw text when the structure is not recognised.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scoring::EvaluationOutcome;
use crate::workflow::{Decision, Stage, WorkflowStatus};

/// Lines returned by [`extract_latest_block`] when no window is configured.
pub const DEFAULT_EXTRACT_WINDOW: usize = 10;

const SECTION_COMMENT_PREFIX: &str = "  Comment: ";
const OVERALL_COMMENT_PREFIX: &str = "Overall Comment: ";
const STATUS_PREFIX: &str = "Status: ";

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// Conventional header prefix of a stage's rubric block, e.g. `"IMER Score"`.
pub fn score_prefix(stage: Stage) -> String {
    format!("{stage} Score")
}

/// `"<STAGE> Score: <total>/<max>"`.
pub fn score_header(stage: Stage, outcome: &EvaluationOutcome) -> String {
    format!(
        "{}: {}/{}",
        score_prefix(stage),
        outcome.total_score,
        outcome.total_max
    )
}

/// `"<STAGE> Decision: <Approved|Rejected|Submitted>"`.
pub fn decision_header(stage: Stage, decision: Decision) -> String {
    format!("{stage} Decision: {}", decision.past_tense())
}

// ---------------------------------------------------------------------------
// Legacy text format
// ---------------------------------------------------------------------------

/// Comments are kept on one line so the block stays line-parseable.
fn flatten(comment: &str) -> String {
    comment.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Render a rubric block without the trailing separator.
pub fn render_evaluation_block(header: &str, outcome: &EvaluationOutcome) -> String {
    let mut lines = vec![header.to_string()];
    for section in &outcome.breakdown {
        lines.push(format!(
            "{} - {}/{}",
            section.title, section.subtotal, section.max
        ));
        if let Some(comment) = section.comment.as_deref().map(flatten).filter(|c| !c.is_empty()) {
            lines.push(format!("{SECTION_COMMENT_PREFIX}{comment}"));
        }
    }
    let overall = outcome.overall_comment.as_deref().map(flatten);
    if let Some(comment) = overall.filter(|c| !c.is_empty()) {
        lines.push(format!("{OVERALL_COMMENT_PREFIX}{comment}"));
    }
    lines.join("\n")
}

fn render_decision_block(
    header: &str,
    to_status: Option<WorkflowStatus>,
    comment: Option<&str>,
) -> String {
    let mut lines = vec![header.to_string()];
    if let Some(status) = to_status {
        lines.push(format!("{STATUS_PREFIX}{status}"));
    }
    if let Some(comment) = comment.map(flatten).filter(|c| !c.is_empty()) {
        lines.push(format!("Comment: {comment}"));
    }
    lines.join("\n")
}

/// Put `block` in front of `prior`, separated by one blank line.
fn prepend(block: &str, prior: &str) -> String {
    if prior.is_empty() {
        block.to_string()
    } else {
        format!("{block}\n\n{prior}")
    }
}

/// Render a rubric block and put it before the prior ledger text.
pub fn append_block(prior: &str, header: &str, outcome: &EvaluationOutcome) -> String {
    prepend(&render_evaluation_block(header, outcome), prior)
}

/// Render a decision block (no rubric) and put it before the prior text.
pub fn append_decision_block(prior: &str, header: &str, comment: Option<&str>) -> String {
    prepend(&render_decision_block(header, None, comment), prior)
}

/// Find the newest block whose header starts with `prefix`.
///
/// - Empty or whitespace-only ledger: `None`.
/// - Header found: at most `max_lines` lines starting at the header, ending
///   early at the blank separator. A zero window yields an empty block.
/// - No header found: the whole ledger, unchanged (older entries may predate
///   the header convention).
pub fn extract_latest_block(ledger: &str, prefix: &str, max_lines: usize) -> Option<String> {
    if ledger.trim().is_empty() {
        return None;
    }
    let lines: Vec<&str> = ledger.lines().collect();
    let Some(start) = lines.iter().position(|l| l.trim_start().starts_with(prefix)) else {
        return Some(ledger.to_string());
    };
    let block: Vec<&str> = lines[start..]
        .iter()
        .take(max_lines)
        .enumerate()
        .take_while(|(idx, line)| *idx == 0 || !line.trim().is_empty())
        .map(|(_, line)| *line)
        .collect();
    Some(block.join("\n"))
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

/// A section line parsed back out of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveredSection {
    pub title: String,
    pub subtotal: u32,
    pub max: u32,
    pub comment: Option<String>,
}

/// A predecessor's rubric result parsed back out of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveredScore {
    /// Text before `Score:` in the header, e.g. `"IMER"`.
    pub label: String,
    pub score: u32,
    pub max: u32,
    pub sections: Vec<RecoveredSection>,
    pub overall_comment: Option<String>,
}

fn parse_fraction(text: &str) -> Option<(u32, u32)> {
    let (score, max) = text.trim().split_once('/')?;
    Some((score.trim().parse().ok()?, max.trim().parse().ok()?))
}

fn parse_header(line: &str) -> Option<(String, u32, u32)> {
    let (label, fraction) = line.trim().rsplit_once(':')?;
    let label = label.trim_end().strip_suffix("Score")?.trim();
    let (score, max) = parse_fraction(fraction)?;
    Some((label.to_string(), score, max))
}

/// Parse one block produced by [`render_evaluation_block`].
pub fn parse_block(block: &str) -> Option<RecoveredScore> {
    let mut lines = block.lines();
    let (label, score, max) = parse_header(lines.next()?)?;
    let mut recovered = RecoveredScore {
        label,
        score,
        max,
        sections: Vec::new(),
        overall_comment: None,
    };
    for line in lines {
        if line.trim().is_empty() {
            break;
        }
        if let Some(comment) = line.strip_prefix(SECTION_COMMENT_PREFIX) {
            if let Some(last) = recovered.sections.last_mut() {
                last.comment = Some(comment.trim().to_string());
            }
        } else if let Some(comment) = line.strip_prefix(OVERALL_COMMENT_PREFIX) {
            recovered.overall_comment = Some(comment.trim().to_string());
        } else if let Some((title, fraction)) = line.rsplit_once(" - ") {
            if let Some((subtotal, max)) = parse_fraction(fraction) {
                recovered.sections.push(RecoveredSection {
                    title: title.trim().to_string(),
                    subtotal,
                    max,
                    comment: None,
                });
            }
        }
    }
    Some(recovered)
}

/// Recover the newest rubric result whose header starts with `prefix`.
///
/// `None` when the ledger is empty, no header matches, or the matched block
/// is not in the rubric layout.
pub fn recover_score(ledger: &str, prefix: &str, max_lines: usize) -> Option<RecoveredScore> {
    let block = extract_latest_block(ledger, prefix, max_lines)?;
    if !block.trim_start().starts_with(prefix) {
        return None;
    }
    parse_block(&block)
}

// ---------------------------------------------------------------------------
// Structured ledger
// ---------------------------------------------------------------------------

/// What a ledger entry records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryBody {
    Evaluation(EvaluationOutcome),
    Decision {
        decision: Decision,
        to_status: WorkflowStatus,
    },
}

/// One immutable stage record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: Uuid,
    pub stage: Stage,
    pub recorded_at: DateTime<Utc>,
    pub header: String,
    pub body: EntryBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl LedgerEntry {
    /// A rubric entry with the conventional score header.
    pub fn evaluation(stage: Stage, outcome: EvaluationOutcome, now: DateTime<Utc>) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            stage,
            recorded_at: now,
            header: score_header(stage, &outcome),
            body: EntryBody::Evaluation(outcome),
            comment: None,
        }
    }

    /// A decision entry with the conventional decision header.
    pub fn decision(
        stage: Stage,
        decision: Decision,
        to_status: WorkflowStatus,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            stage,
            recorded_at: now,
            header: decision_header(stage, decision),
            body: EntryBody::Decision {
                decision,
                to_status,
            },
            comment,
        }
    }

    /// Legacy text block of this entry.
    pub fn render_block(&self) -> String {
        match &self.body {
            EntryBody::Evaluation(outcome) => render_evaluation_block(&self.header, outcome),
            EntryBody::Decision { to_status, .. } => {
                render_decision_block(&self.header, Some(*to_status), self.comment.as_deref())
            }
        }
    }
}

/// Ordered stage entries, newest first, in front of untouched legacy text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
    legacy_tail: String,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap persisted notes. The text is kept verbatim as the tail.
    pub fn from_legacy(text: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            legacy_tail: text.into(),
        }
    }

    /// Record a new entry; it becomes the newest.
    pub fn push(&mut self, entry: LedgerEntry) {
        self.entries.insert(0, entry);
    }

    /// Entries recorded through this value, newest first.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn legacy_tail(&self) -> &str {
        &self.legacy_tail
    }

    pub fn latest(&self) -> Option<&LedgerEntry> {
        self.entries.first()
    }

    /// Render to the legacy text format for the notes field.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .rev()
            .fold(self.legacy_tail.clone(), |acc, entry| {
                prepend(&entry.render_block(), &acc)
            })
    }
}
