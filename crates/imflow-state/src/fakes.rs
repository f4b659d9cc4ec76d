//! In-memory fakes for the collaborator traits
//!
//! Provides `MemoryImRepository` and `MemoryAssociationIndex` that satisfy
//! the trait contracts without any external backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

fn lock<T>(mutex: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StorageError::Backend("in-memory store lock poisoned".into()))
}

// ---------------------------------------------------------------------------
// MemoryImRepository
// ---------------------------------------------------------------------------

/// In-memory IM store backed by a `BTreeMap<id, record>` (stable listing order).
#[derive(Debug, Default)]
pub struct MemoryImRepository {
    records: Mutex<BTreeMap<ImId, ImRecord>>,
}

impl MemoryImRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with records, replacing any with the same id.
    pub fn with_records(records: impl IntoIterator<Item = ImRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            records: Mutex::new(map),
        }
    }

    pub fn insert(&self, record: ImRecord) -> StorageResult<()> {
        lock(&self.records)?.insert(record.id.clone(), record);
        Ok(())
    }

    /// Snapshot of every stored record.
    pub fn all(&self) -> StorageResult<Vec<ImRecord>> {
        Ok(lock(&self.records)?.values().cloned().collect())
    }
}

#[async_trait]
impl ImRepository for MemoryImRepository {
    async fn get(&self, id: &ImId) -> StorageResult<ImRecord> {
        lock(&self.records)?
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { id: id.0.clone() })
    }

    async fn write_patch(
        &self,
        id: &ImId,
        expected_version: u64,
        patch: &RecordPatch,
    ) -> StorageResult<ImRecord> {
        let mut records = lock(&self.records)?;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound { id: id.0.clone() })?;
        if record.version != expected_version {
            return Err(StorageError::VersionConflict {
                id: id.0.clone(),
                expected: expected_version,
                actual: record.version,
            });
        }
        record.status = patch.status.clone();
        record.notes = patch.notes.clone();
        record.version += 1;
        record.updated_at = Some(Utc::now());
        Ok(record.clone())
    }

    async fn list_by_status(
        &self,
        status: &str,
        page: u32,
        per_page: u32,
    ) -> StorageResult<Page<ImRecord>> {
        let matching: Vec<ImRecord> = lock(&self.records)?
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        Ok(Page::paginate(matching, page, per_page))
    }
}

// ---------------------------------------------------------------------------
// MemoryAssociationIndex
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Associations {
    /// department id -> college id
    departments: HashMap<String, String>,
    users: HashMap<String, ReviewerScope>,
}

/// In-memory association index.
///
/// College membership granted to a user expands to every department
/// registered under that college at lookup time.
#[derive(Debug, Default)]
pub struct MemoryAssociationIndex {
    inner: Mutex<Associations>,
}

impl MemoryAssociationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_department(
        &self,
        college_id: impl Into<String>,
        department_id: impl Into<String>,
    ) -> StorageResult<()> {
        lock(&self.inner)?
            .departments
            .insert(department_id.into(), college_id.into());
        Ok(())
    }

    pub fn assign_user(
        &self,
        user_id: impl Into<String>,
        scope: ReviewerScope,
    ) -> StorageResult<()> {
        lock(&self.inner)?.users.insert(user_id.into(), scope);
        Ok(())
    }
}

#[async_trait]
impl AssociationIndex for MemoryAssociationIndex {
    async fn scope_for(&self, user_id: &str) -> StorageResult<ReviewerScope> {
        let inner = lock(&self.inner)?;
        let mut scope = inner
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| StorageError::UnknownReviewer {
                user_id: user_id.to_string(),
            })?;
        for (department, college) in &inner.departments {
            if scope.college_ids.contains(college) {
                scope.department_ids.insert(department.clone());
            }
        }
        Ok(scope)
    }
}
