//! Background AI jobs with pollable status.
//!
//! Callers submit a job and poll its status by id instead of relying on a
//! fire-and-forget thread staying alive. Each generated hook is flushed to
//! storage as soon as it arrives, so a crash loses at most the in-flight
//! requests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use leadbase_adapters::TextGenClient;
use leadbase_core::feed::ActivityFeed;
use leadbase_core::Lead;
use leadbase_storage::StoreError;

pub type JobId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running {
        percent: u8,
        succeeded: usize,
        failed: usize,
    },
    Done {
        succeeded: usize,
        failed: usize,
    },
    Failed {
        error: String,
    },
}

/// Registry of submitted jobs and their latest status.
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: Mutex<HashMap<JobId, JobStatus>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> JobId {
        let id = Uuid::new_v4();
        self.set(id, JobStatus::Queued);
        id
    }

    pub fn set(&self, id: JobId, status: JobStatus) {
        let mut jobs = match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        jobs.insert(id, status);
    }

    pub fn get(&self, id: JobId) -> Option<JobStatus> {
        let jobs = match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        jobs.get(&id).cloned()
    }
}

/// What a hook job should cover.
#[derive(Debug, Clone, Default)]
pub struct HookJobSpec {
    /// Generate for this one lead only.
    pub lead_id: Option<i64>,
    pub limit: Option<i64>,
    /// Regenerate hooks that already exist.
    pub regenerate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HookRunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Bounded worker-pool fan-out over the text-generation service.
#[derive(Clone)]
pub struct HookEngine {
    pool: PgPool,
    textgen: Arc<TextGenClient>,
    tracker: Arc<JobTracker>,
    feed: Arc<ActivityFeed>,
    concurrency: usize,
}

impl HookEngine {
    pub fn new(
        pool: PgPool,
        textgen: Arc<TextGenClient>,
        tracker: Arc<JobTracker>,
        feed: Arc<ActivityFeed>,
        concurrency: usize,
    ) -> Self {
        Self {
            pool,
            textgen,
            tracker,
            feed,
            concurrency: concurrency.max(1),
        }
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    /// Register a job and run it in the background; poll the tracker for
    /// progress.
    pub fn submit(&self, spec: HookJobSpec) -> JobId {
        let id = self.tracker.create();
        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_job(id, spec).await;
        });
        id
    }

    /// Run a job to completion on the current task (CLI path). Status is
    /// still tracked under the returned summary's job id.
    pub async fn run_to_completion(&self, spec: HookJobSpec) -> Result<HookRunSummary, JobError> {
        let id = self.tracker.create();
        self.run_job(id, spec).await;
        match self.tracker.get(id) {
            Some(JobStatus::Done { succeeded, failed }) => Ok(HookRunSummary {
                total: succeeded + failed,
                succeeded,
                failed,
            }),
            Some(JobStatus::Failed { error }) => Err(JobError::Store(StoreError::Database(
                sqlx::Error::Protocol(error),
            ))),
            _ => Ok(HookRunSummary {
                total: 0,
                succeeded: 0,
                failed: 0,
            }),
        }
    }

    async fn run_job(&self, id: JobId, spec: HookJobSpec) {
        let leads = match self.select_leads(&spec).await {
            Ok(leads) => leads,
            Err(err) => {
                warn!(job = %id, error = %err, "hook job failed to select leads");
                self.tracker.set(
                    id,
                    JobStatus::Failed {
                        error: err.to_string(),
                    },
                );
                return;
            }
        };

        let total = leads.len();
        self.feed
            .push(format!("hook job {id}: {total} lead(s) queued"));
        if total == 0 {
            self.tracker.set(
                id,
                JobStatus::Done {
                    succeeded: 0,
                    failed: 0,
                },
            );
            return;
        }
        self.tracker.set(
            id,
            JobStatus::Running {
                percent: 0,
                succeeded: 0,
                failed: 0,
            },
        );

        let limiter = Arc::new(Semaphore::new(self.concurrency));
        let mut workers: JoinSet<bool> = JoinSet::new();
        for lead in leads {
            let limiter = limiter.clone();
            let pool = self.pool.clone();
            let textgen = self.textgen.clone();
            workers.spawn(async move {
                let _permit = match limiter.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return false,
                };
                generate_and_store(&pool, &textgen, &lead).await
            });
        }

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(true) => succeeded += 1,
                Ok(false) => failed += 1,
                Err(err) => {
                    warn!(job = %id, error = %err, "hook worker panicked");
                    failed += 1;
                }
            }
            let done = succeeded + failed;
            let percent = ((done * 100) / total).min(100) as u8;
            self.tracker.set(
                id,
                JobStatus::Running {
                    percent,
                    succeeded,
                    failed,
                },
            );
        }

        self.tracker.set(id, JobStatus::Done { succeeded, failed });
        self.feed.push(format!(
            "hook job {id}: done, {succeeded} generated, {failed} failed"
        ));
        info!(job = %id, succeeded, failed, "hook job finished");
    }

    async fn select_leads(&self, spec: &HookJobSpec) -> Result<Vec<Lead>, StoreError> {
        if let Some(lead_id) = spec.lead_id {
            return Ok(leadbase_storage::get_lead(&self.pool, lead_id)
                .await?
                .into_iter()
                .collect());
        }
        leadbase_storage::leads_missing_hook(&self.pool, spec.limit, spec.regenerate).await
    }
}

/// One worker: call the service, flush the hook immediately. Failures are
/// skipped, never fatal to the job.
async fn generate_and_store(pool: &PgPool, textgen: &TextGenClient, lead: &Lead) -> bool {
    match textgen.generate_hook(lead).await {
        Ok(hook) => match leadbase_storage::save_hook(pool, lead.id, &hook).await {
            Ok(()) => true,
            Err(err) => {
                warn!(lead_id = lead.id, error = %err, "saving hook failed");
                false
            }
        },
        Err(err) => {
            warn!(lead_id = lead.id, error = %err, "hook generation failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_round_trips_status() {
        let tracker = JobTracker::new();
        let id = tracker.create();
        assert_eq!(tracker.get(id), Some(JobStatus::Queued));

        tracker.set(
            id,
            JobStatus::Running {
                percent: 40,
                succeeded: 2,
                failed: 0,
            },
        );
        assert!(matches!(
            tracker.get(id),
            Some(JobStatus::Running { percent: 40, .. })
        ));
    }

    #[test]
    fn unknown_jobs_return_none() {
        let tracker = JobTracker::new();
        assert_eq!(tracker.get(Uuid::new_v4()), None);
    }

    #[test]
    fn status_serializes_with_a_state_tag() {
        let status = JobStatus::Running {
            percent: 25,
            succeeded: 1,
            failed: 0,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "running");
        assert_eq!(json["percent"], 25);
    }
}
