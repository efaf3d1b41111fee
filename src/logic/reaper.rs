use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::logic::jobs::{rollback_job, GalaxyEngine};
use crate::model::{Id, JobState, JobUpdate};
use crate::store::traits::Store;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReapReport {
    pub failed_jobs: Vec<Id>,
    pub removed_galaxies: Vec<Id>,
}

/// Cleans up after jobs whose process stopped heartbeating.
pub struct JobReaper<S: Store> {
    engine: GalaxyEngine<S>,
}

impl<S: Store + 'static> JobReaper<S> {
    pub fn new(engine: GalaxyEngine<S>) -> Self {
        Self { engine }
    }

    /// One sweep. Galaxies locked by this process are left alone.
    pub async fn reap_once(&self, now: DateTime<Utc>) -> Result<ReapReport> {
        let timeout = chrono::Duration::from_std(self.engine.settings.heartbeat_timeout())
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        let cutoff = now - timeout;
        let store = self.engine.store.as_ref();
        let mut report = ReapReport::default();

        for job in store.list_stale_jobs(cutoff).await? {
            let Ok(_guard) = self.engine.locks.try_acquire(&job.galaxy_id) else {
                continue;
            };
            warn!(
                "Job {} for galaxy {} missed its heartbeat since {}",
                job.id, job.galaxy_id, job.heartbeat_at
            );
            rollback_job(store, self.engine.features.as_ref(), &job.id).await?;
            let update = JobUpdate {
                phase: Some(job.phase),
                state: Some(JobState::Failed),
                progress_percentage: None,
                error: Some(format!("{}: heartbeat expired", job.phase)),
            };
            store.update_job(&job.id, &update).await?;
            report.failed_jobs.push(job.id);
        }

        for galaxy in store.list_draft_galaxies().await? {
            if galaxy.created_at >= cutoff {
                continue;
            }
            let Ok(_guard) = self.engine.locks.try_acquire(&galaxy.id) else {
                continue;
            };
            let jobs = store.list_jobs_for_galaxy(&galaxy.id).await?;
            if jobs.iter().any(|job| !job.state.is_terminal()) {
                continue;
            }
            for job in &jobs {
                rollback_job(store, self.engine.features.as_ref(), &job.id).await?;
            }
            store.delete_galaxy(&galaxy.id).await?;
            info!("Removed orphaned draft galaxy {} ({})", galaxy.name, galaxy.id);
            report.removed_galaxies.push(galaxy.id);
        }

        Ok(report)
    }

    /// Run `reap_once` every `interval` until the task is aborted.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.reap_once(Utc::now()).await {
                    Ok(report) if !report.failed_jobs.is_empty() || !report.removed_galaxies.is_empty() => {
                        info!(
                            "Reaper failed {} jobs and removed {} draft galaxies",
                            report.failed_jobs.len(),
                            report.removed_galaxies.len()
                        );
                    }
                    Ok(_) => {}
                    Err(err) => error!("Reaper sweep failed: {}", err),
                }
            }
        })
    }
}

/// Start the periodic reaper with the engine's configured interval.
pub fn spawn_reaper<S: Store + 'static>(engine: GalaxyEngine<S>) -> JoinHandle<()> {
    let interval = engine.settings.reaper_interval();
    JobReaper::new(engine).spawn(interval)
}
