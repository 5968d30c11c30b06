use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::domain::JobHandle;
use crate::error::{FlexmonError, Result};

struct JobEntry {
    handle: JobHandle,
    /// Token the job was submitted with; never exposed through handles
    token: Option<String>,
}

enum KeyState {
    InFlight,
    Submitted(String),
}

/// Outcome of claiming an idempotency key
#[derive(Debug, Clone, PartialEq)]
pub enum IdempotencyResult {
    /// First use of the key; proceed with submission
    New,
    /// Key already produced a job
    Duplicate(JobHandle),
    /// Another submission with this key has not finished yet
    InFlight,
}

/// Concurrency-safe map of reference code to job handle.
///
/// Status updates for a reference are applied under that entry's lock, so
/// concurrent waiters on the same reference cannot interleave partial writes.
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<String, JobEntry>,
    idempotency: DashMap<String, KeyState>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an accepted job. Fails if the handle has no reference or the
    /// reference is already known.
    pub fn register(&self, handle: JobHandle, token: Option<String>) -> Result<()> {
        let reference = handle.reference.clone().ok_or_else(|| {
            FlexmonError::Internal("cannot register a job without reference".into())
        })?;

        match self.jobs.entry(reference) {
            Entry::Occupied(entry) => Err(FlexmonError::Internal(format!(
                "reference {} is already registered",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                debug!("Registered job {} as {}", handle.job_id, entry.key());
                entry.insert(JobEntry { handle, token });
                Ok(())
            }
        }
    }

    pub fn get(&self, reference: &str) -> Option<JobHandle> {
        self.jobs.get(reference).map(|e| e.handle.clone())
    }

    pub(crate) fn token(&self, reference: &str) -> Option<String> {
        self.jobs.get(reference).and_then(|e| e.token.clone())
    }

    pub fn mark_completed(&self, reference: &str) -> Option<JobHandle> {
        self.jobs.get_mut(reference).map(|mut e| {
            e.handle.mark_completed();
            e.handle.clone()
        })
    }

    pub fn mark_failed(&self, reference: &str, error: &str) -> Option<JobHandle> {
        self.jobs.get_mut(reference).map(|mut e| {
            e.handle.mark_failed(error);
            e.handle.clone()
        })
    }

    /// All known jobs, newest first
    pub fn list(&self) -> Vec<JobHandle> {
        let mut handles: Vec<JobHandle> = self.jobs.iter().map(|e| e.handle.clone()).collect();
        handles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        handles
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Atomically check or claim `key` before a submission
    pub fn claim_key(&self, key: &str) -> IdempotencyResult {
        match self.idempotency.entry(key.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(KeyState::InFlight);
                IdempotencyResult::New
            }
            Entry::Occupied(entry) => match entry.get() {
                KeyState::InFlight => IdempotencyResult::InFlight,
                KeyState::Submitted(reference) => match self.get(reference) {
                    Some(handle) => {
                        warn!("Duplicate submission with idempotency key {}", key);
                        IdempotencyResult::Duplicate(handle)
                    }
                    None => IdempotencyResult::InFlight,
                },
            },
        }
    }

    /// Bind a claimed key to the reference it produced
    pub fn complete_key(&self, key: &str, reference: &str) {
        self.idempotency
            .insert(key.to_string(), KeyState::Submitted(reference.to_string()));
    }

    /// Release a claimed key after a failed submission so it can be retried
    pub fn release_key(&self, key: &str) {
        self.idempotency
            .remove_if(key, |_, state| matches!(state, KeyState::InFlight));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobStatus;

    #[test]
    fn test_register_rejects_duplicates_and_missing_reference() {
        let registry = JobRegistry::new();
        registry
            .register(JobHandle::running("q1", "ref-1"), Some("tok".into()))
            .unwrap();

        assert!(registry.register(JobHandle::running("q1", "ref-1"), None).is_err());
        assert!(registry.register(JobHandle::failed("q1", "boom"), None).is_err());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.token("ref-1").as_deref(), Some("tok"));
    }

    #[test]
    fn test_status_updates() {
        let registry = JobRegistry::new();
        registry.register(JobHandle::running("q1", "ref-1"), None).unwrap();

        let failed = registry.mark_failed("ref-1", "Error 1015: Token is invalid.").unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(registry.get("ref-1").unwrap().status, JobStatus::Failed);

        assert!(registry.mark_completed("missing").is_none());
    }

    #[test]
    fn test_idempotency_key_lifecycle() {
        let registry = JobRegistry::new();
        assert_eq!(registry.claim_key("k"), IdempotencyResult::New);
        assert_eq!(registry.claim_key("k"), IdempotencyResult::InFlight);

        registry.release_key("k");
        assert_eq!(registry.claim_key("k"), IdempotencyResult::New);

        registry.register(JobHandle::running("q1", "ref-1"), None).unwrap();
        registry.complete_key("k", "ref-1");
        registry.release_key("k");

        match registry.claim_key("k") {
            IdempotencyResult::Duplicate(handle) => {
                assert_eq!(handle.reference.as_deref(), Some("ref-1"))
            }
            other => panic!("expected duplicate, got {:?}", other),
        }
    }
}
