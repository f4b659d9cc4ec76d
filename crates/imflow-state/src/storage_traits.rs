//! Collaborator trait definitions for IMFLOW
//!
//! These traits define the narrow interfaces the workflow core consumes:
//! - `ImRepository`: read an IM, write a `(status, notes)` patch, list a queue
//! - `AssociationIndex`: colleges/departments scoping for reviewers
//!
//! Both traits are async and backend-agnostic. In-memory fakes are provided
//! via the `fakes` module.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Identifier of an instructional material.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImId(pub String);

impl ImId {
    pub fn new(id: impl Into<String>) -> Self {
        ImId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An IM as the persistence collaborator stores it.
///
/// `status` and `notes` are kept as plain strings: the workflow core parses
/// the status and owns the notes format, the store only persists them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImRecord {
    pub id: ImId,
    pub status: String,
    #[serde(default)]
    pub notes: String,
    /// Monotonic version, bumped by every successful patch.
    #[serde(default)]
    pub version: u64,
    #[serde(alias = "subjectRef")]
    pub subject_ref: String,
    #[serde(
        default,
        alias = "priorEvaluationRef",
        skip_serializing_if = "Option::is_none"
    )]
    pub prior_evaluation_ref: Option<String>,
    #[serde(
        default,
        alias = "departmentId",
        skip_serializing_if = "Option::is_none"
    )]
    pub department_id: Option<String>,
    #[serde(default, alias = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ImRecord {
    /// A freshly created record at version 0 with an empty ledger.
    pub fn new(
        id: impl Into<String>,
        status: impl Into<String>,
        subject_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: ImId::new(id),
            status: status.into(),
            notes: String::new(),
            version: 0,
            subject_ref: subject_ref.into(),
            prior_evaluation_ref: None,
            department_id: None,
            updated_at: None,
        }
    }

    pub fn with_department(mut self, department_id: impl Into<String>) -> Self {
        self.department_id = Some(department_id.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// The single unit a stage hands back to persistence.
///
/// Written in one round trip; partial application is a backend bug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPatch {
    pub status: String,
    pub notes: String,
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// One page of a listing. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// An empty page, used whenever a listing carries no items array.
    pub fn empty(page: u32, per_page: u32) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: page.max(1),
            per_page,
            total_pages: 0,
        }
    }

    /// Slice a complete, already filtered listing into the requested page.
    pub fn paginate(all: Vec<T>, page: u32, per_page: u32) -> Self {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let total = all.len() as u64;
        let total_pages = total.div_ceil(u64::from(per_page)) as u32;
        let skip = (page as usize - 1).saturating_mul(per_page as usize);
        let items = all.into_iter().skip(skip).take(per_page as usize).collect();
        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
        }
    }
}

// ---------------------------------------------------------------------------
// ImRepository
// ---------------------------------------------------------------------------

/// Persistence collaborator for IM records.
///
/// Guarantees:
/// - `write_patch` applies status and notes together or not at all.
/// - `write_patch` refuses with `VersionConflict` when `expected_version`
///   is not the stored version (last writer does not silently win).
/// - `list_by_status` matches the exact status string.
#[async_trait]
pub trait ImRepository: Send + Sync {
    /// Read one IM by id. Returns `StorageError::NotFound` if absent.
    async fn get(&self, id: &ImId) -> StorageResult<ImRecord>;

    /// Apply a `(status, notes)` patch and return the updated record.
    async fn write_patch(
        &self,
        id: &ImId,
        expected_version: u64,
        patch: &RecordPatch,
    ) -> StorageResult<ImRecord>;

    /// List IMs awaiting the given status.
    async fn list_by_status(
        &self,
        status: &str,
        page: u32,
        per_page: u32,
    ) -> StorageResult<Page<ImRecord>>;
}

// ---------------------------------------------------------------------------
// AssociationIndex
// ---------------------------------------------------------------------------

/// Which colleges and departments a reviewer may see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerScope {
    pub college_ids: BTreeSet<String>,
    pub department_ids: BTreeSet<String>,
    /// University-level reviewers see every IM.
    #[serde(default)]
    pub unrestricted: bool,
}

impl ReviewerScope {
    pub fn unrestricted() -> Self {
        Self {
            unrestricted: true,
            ..Self::default()
        }
    }

    /// Whether a record falls inside this scope. Records without a
    /// department are only visible to unrestricted reviewers.
    pub fn covers(&self, record: &ImRecord) -> bool {
        if self.unrestricted {
            return true;
        }
        record
            .department_id
            .as_ref()
            .is_some_and(|d| self.department_ids.contains(d))
    }
}

/// Colleges/departments/users association lookups.
#[async_trait]
pub trait AssociationIndex: Send + Sync {
    /// Resolve the scope of a reviewer. Unknown users yield
    /// `StorageError::UnknownReviewer`.
    async fn scope_for(&self, user_id: &str) -> StorageResult<ReviewerScope>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginate_second_page() {
        let page = Page::paginate((1..=7).collect::<Vec<u32>>(), 2, 3);
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total, 7);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn paginate_past_end_is_empty() {
        let page = Page::paginate(vec![1, 2], 5, 10);
        assert!(page.items.is_empty());
        assert_eq!(page.total, 2);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn paginate_page_zero_is_first_page() {
        let page = Page::paginate(vec!['a', 'b', 'c'], 0, 2);
        assert_eq!(page.page, 1);
        assert_eq!(page.items, vec!['a', 'b']);
    }

    #[test]
    fn scope_covers_department() {
        let mut scope = ReviewerScope::default();
        scope.department_ids.insert("cs".into());
        let inside = ImRecord::new("im-1", "For IMER Evaluation", "CS101").with_department("cs");
        let outside = ImRecord::new("im-2", "For IMER Evaluation", "MA101").with_department("math");
        let orphan = ImRecord::new("im-3", "For IMER Evaluation", "GE1");
        assert!(scope.covers(&inside));
        assert!(!scope.covers(&outside));
        assert!(!scope.covers(&orphan));
        assert!(ReviewerScope::unrestricted().covers(&orphan));
    }

    #[test]
    fn record_accepts_camel_case_fields() {
        let json = serde_json::json!({
            "id": "im-9",
            "status": "For PIMEC Evaluation",
            "subjectRef": "IT 201",
            "departmentId": "it"
        });
        let record: ImRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.subject_ref, "IT 201");
        assert_eq!(record.department_id.as_deref(), Some("it"));
        assert_eq!(record.version, 0);
        assert!(record.notes.is_empty());
    }
}
