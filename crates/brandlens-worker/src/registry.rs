//! Job identity lock and run lookup.
//!
//! At most one job per content hash runs at a time, whatever its mode or
//! source path, since the hash names the run's results directory. A second
//! request is rejected rather than queued. Finished runs stay registered so
//! their progress can still be read.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use brandlens_models::{JobId, JobKey};
use tracing::debug;

use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::progress::ProgressTracker;

/// A registered run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub job_id: JobId,
    pub key: JobKey,
    pub tracker: ProgressTracker,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Content hashes of running jobs
    active: HashSet<String>,
    runs: HashMap<String, RunHandle>,
}

#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `key`'s content hash for a new run. The claim is released when
    /// the guard drops.
    pub fn try_acquire(&self, key: JobKey) -> WorkerResult<(JobGuard, RunHandle)> {
        let mut state = self.lock();
        if state.active.contains(&key.content_hash) {
            metrics::record_job_rejected(key.mode);
            return Err(WorkerError::duplicate(&key));
        }

        let handle = RunHandle {
            job_id: JobId::new(),
            key: key.clone(),
            tracker: ProgressTracker::new(),
        };
        state.active.insert(key.content_hash.clone());
        state.runs.insert(key.content_hash.clone(), handle.clone());
        metrics::set_active_jobs(state.active.len());
        debug!(key = %key, job_id = %handle.job_id, "Acquired job lock");

        Ok((
            JobGuard {
                registry: self.clone(),
                key,
            },
            handle,
        ))
    }

    pub fn is_active(&self, key: &JobKey) -> bool {
        self.lock().active.contains(&key.content_hash)
    }

    /// Latest run registered for a content hash.
    pub fn run(&self, content_hash: &str) -> Option<RunHandle> {
        self.lock().runs.get(content_hash).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    fn release(&self, key: &JobKey) {
        let mut state = self.lock();
        state.active.remove(&key.content_hash);
        metrics::set_active_jobs(state.active.len());
        debug!(key = %key, "Released job lock");
    }
}

/// Holds a job key's lock for the lifetime of a run.
#[derive(Debug)]
pub struct JobGuard {
    registry: JobRegistry,
    key: JobKey,
}

impl JobGuard {
    pub fn key(&self) -> &JobKey {
        &self.key
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brandlens_models::JobMode;
    use tokio_test::{assert_err, assert_ok};

    fn key(hash: &str) -> JobKey {
        JobKey::new(JobMode::Video, "clip.mp4", hash)
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let registry = JobRegistry::new();
        let (_guard, _) = assert_ok!(registry.try_acquire(key("aa")));

        let err = assert_err!(registry.try_acquire(key("aa")));
        assert!(err.is_duplicate());
        assert_ok!(registry.try_acquire(key("bb")));
    }

    #[test]
    fn test_same_hash_is_rejected_across_modes_and_paths() {
        let registry = JobRegistry::new();
        let (_guard, _) = registry.try_acquire(key("aa")).unwrap();

        let image = JobKey::new(JobMode::Image, "clip.mp4", "aa");
        assert!(assert_err!(registry.try_acquire(image)).is_duplicate());
        let copy = JobKey::new(JobMode::Video, "copy_of_clip.mp4", "aa");
        assert!(assert_err!(registry.try_acquire(copy)).is_duplicate());
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_guard_drop_releases_key_but_keeps_run() {
        let registry = JobRegistry::new();
        let (guard, handle) = registry.try_acquire(key("aa")).unwrap();
        assert!(registry.is_active(guard.key()));
        drop(guard);

        assert_eq!(registry.active_count(), 0);
        let run = registry.run("aa").unwrap();
        assert_eq!(run.job_id, handle.job_id);
        assert!(registry.try_acquire(key("aa")).is_ok());
    }
}
