use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;

use crate::api::handlers::{error_response, ApiError, AppState, ListResponse};
use crate::model::{GenerationJob, Id, JobOutcome};
use crate::store::traits::Store;

/// A job row together with its caller-facing result.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    #[serde(flatten)]
    pub job: GenerationJob,
    pub result: JobOutcome,
}

impl From<GenerationJob> for JobResponse {
    fn from(job: GenerationJob) -> Self {
        let result = job.outcome();
        Self { job, result }
    }
}

pub async fn get_job<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    Path(job_id): Path<Id>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = engine.get_job(&job_id).await.map_err(error_response)?;
    Ok(Json(job.into()))
}

pub async fn list_galaxy_jobs<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    Path(galaxy_id): Path<Id>,
) -> Result<Json<ListResponse<JobResponse>>, ApiError> {
    let jobs = engine.list_jobs(&galaxy_id).await.map_err(error_response)?;
    let jobs: Vec<JobResponse> = jobs.into_iter().map(JobResponse::from).collect();
    Ok(Json(jobs.into()))
}

pub async fn cancel_job<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    Path(job_id): Path<Id>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = engine.cancel_job(&job_id).await.map_err(error_response)?;
    Ok(Json(job.into()))
}
