//! Contract tests for the in-memory collaborator fakes.

use imflow_state::fakes::{MemoryAssociationIndex, MemoryImRepository};
use imflow_state::{
    AssociationIndex, ImId, ImRecord, ImRepository, RecordPatch, ReviewerScope, StorageError,
};

fn seeded() -> MemoryImRepository {
    MemoryImRepository::with_records(vec![
        ImRecord::new("im-1", "For IMER Evaluation", "CS 101").with_department("cs"),
        ImRecord::new("im-2", "For IMER Evaluation", "CS 102").with_department("cs"),
        ImRecord::new("im-3", "For PIMEC Evaluation", "MA 101").with_department("math"),
        ImRecord::new("im-4", "For IMER Evaluation", "IT 110").with_department("it"),
    ])
}

fn patch(status: &str, notes: &str) -> RecordPatch {
    RecordPatch {
        status: status.to_string(),
        notes: notes.to_string(),
    }
}

#[tokio::test]
async fn get_missing_record_is_not_found() {
    let repo = seeded();
    let err = repo.get(&ImId::new("nope")).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
}

#[tokio::test]
async fn write_patch_applies_status_and_notes_together() {
    let repo = seeded();
    let id = ImId::new("im-1");
    let updated = repo
        .write_patch(&id, 0, &patch("For PIMEC Evaluation", "IMER Score: 80/100"))
        .await
        .unwrap();
    assert_eq!(updated.status, "For PIMEC Evaluation");
    assert_eq!(updated.notes, "IMER Score: 80/100");
    assert_eq!(updated.version, 1);
    assert!(updated.updated_at.is_some());

    let reread = repo.get(&id).await.unwrap();
    assert_eq!(reread, updated);
}

#[tokio::test]
async fn stale_version_is_refused_without_partial_write() {
    let repo = seeded();
    let id = ImId::new("im-1");
    repo.write_patch(&id, 0, &patch("For PIMEC Evaluation", "first"))
        .await
        .unwrap();

    let err = repo
        .write_patch(&id, 0, &patch("For Resubmission", "second"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::VersionConflict {
            expected: 0,
            actual: 1,
            ..
        }
    ));

    let record = repo.get(&id).await.unwrap();
    assert_eq!(record.status, "For PIMEC Evaluation");
    assert_eq!(record.notes, "first");
}

#[tokio::test]
async fn list_by_status_filters_and_paginates() {
    let repo = seeded();
    let first = repo
        .list_by_status("For IMER Evaluation", 1, 2)
        .await
        .unwrap();
    assert_eq!(first.total, 3);
    assert_eq!(first.total_pages, 2);
    assert_eq!(first.items.len(), 2);

    let second = repo
        .list_by_status("For IMER Evaluation", 2, 2)
        .await
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].id.as_str(), "im-4");

    let none = repo.list_by_status("Published", 1, 10).await.unwrap();
    assert!(none.items.is_empty());
    assert_eq!(none.total_pages, 0);
}

#[tokio::test]
async fn association_index_expands_colleges() {
    let index = MemoryAssociationIndex::new();
    index.add_department("ccs", "cs").unwrap();
    index.add_department("ccs", "it").unwrap();
    index.add_department("cas", "math").unwrap();

    let mut scope = ReviewerScope::default();
    scope.college_ids.insert("ccs".into());
    index.assign_user("reviewer-1", scope).unwrap();

    let resolved = index.scope_for("reviewer-1").await.unwrap();
    assert!(resolved.department_ids.contains("cs"));
    assert!(resolved.department_ids.contains("it"));
    assert!(!resolved.department_ids.contains("math"));

    let err = index.scope_for("stranger").await.unwrap_err();
    assert!(matches!(err, StorageError::UnknownReviewer { .. }));
}
