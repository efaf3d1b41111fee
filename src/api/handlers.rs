use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use log::error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{FieldViolation, GalaxyError};
use crate::logic::{ClearReport, GalaxyEngine, GenerationTicket};
use crate::model::{
    Cluster, ClusterFilter, EnhancedGalaxyConfig, Galaxy, GenerationConfig, Id, Page, Region,
    Sector, SectorFilter, WarpTunnel,
};
use crate::store::traits::Store;

pub type AppState<S> = Arc<GalaxyEngine<S>>;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<FieldViolation>,
}

/// Map an engine error onto an HTTP status and JSON body.
pub fn error_response(err: GalaxyError) -> ApiError {
    let status = match &err {
        GalaxyError::Config(_) | GalaxyError::InvalidTunnel(_) => StatusCode::BAD_REQUEST,
        GalaxyError::NotFound { .. } => StatusCode::NOT_FOUND,
        GalaxyError::ConcurrentGeneration { .. }
        | GalaxyError::DependencyConflict { .. }
        | GalaxyError::DuplicateTunnel { .. }
        | GalaxyError::GalaxyNotReady { .. } => StatusCode::CONFLICT,
        GalaxyError::Capacity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        GalaxyError::GenerationFailed { .. }
        | GalaxyError::ConnectivityInvariantViolation { .. }
        | GalaxyError::JobCancelled { .. }
        | GalaxyError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", err);
    }

    let violations = match &err {
        GalaxyError::Config(errors) => errors.violations.clone(),
        _ => Vec::new(),
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            violations,
        }),
    )
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub name: String,
    pub num_sectors: u32,
    #[serde(default)]
    pub config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
pub struct AddSectorsRequest {
    pub num_sectors: u32,
    pub region: Option<String>,
    pub config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: Id,
}

#[derive(Debug, Deserialize)]
pub struct CreateTunnelRequest {
    pub source_sector_id: Id,
    pub target_sector_id: Id,
    pub stability: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    pub force: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub from: i32,
    pub to: i32,
}

pub async fn generate_galaxy<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    Json(request): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<GenerationTicket>), ApiError> {
    let ticket = engine
        .generate(&request.name, request.num_sectors, request.config)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::ACCEPTED, Json(ticket)))
}

pub async fn generate_enhanced<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    Json(request): Json<EnhancedGalaxyConfig>,
) -> Result<(StatusCode, Json<GenerationTicket>), ApiError> {
    let ticket = engine
        .generate_enhanced(request)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::ACCEPTED, Json(ticket)))
}

pub async fn list_galaxies<S: Store + 'static>(
    State(engine): State<AppState<S>>,
) -> Result<Json<ListResponse<Galaxy>>, ApiError> {
    let galaxies = engine.list_galaxies().await.map_err(error_response)?;
    Ok(Json(galaxies.into()))
}

pub async fn get_galaxy<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    Path(galaxy_id): Path<Id>,
) -> Result<Json<Galaxy>, ApiError> {
    let galaxy = engine.get_galaxy(&galaxy_id).await.map_err(error_response)?;
    Ok(Json(galaxy))
}

pub async fn clear_galaxy<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    Path(galaxy_id): Path<Id>,
    Query(query): Query<ClearQuery>,
) -> Result<Json<ClearReport>, ApiError> {
    let report = engine
        .clear_galaxy(&galaxy_id, query.force.unwrap_or(false))
        .await
        .map_err(error_response)?;
    Ok(Json(report))
}

pub async fn add_sectors<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    Path(galaxy_id): Path<Id>,
    Json(request): Json<AddSectorsRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    let job_id = engine
        .add_sectors(
            &galaxy_id,
            request.num_sectors,
            request.region.as_deref(),
            request.config,
        )
        .await
        .map_err(error_response)?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}

pub async fn create_warp_tunnel<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    Path(galaxy_id): Path<Id>,
    Json(request): Json<CreateTunnelRequest>,
) -> Result<(StatusCode, Json<WarpTunnel>), ApiError> {
    let tunnel = engine
        .create_warp_tunnel(
            &galaxy_id,
            &request.source_sector_id,
            &request.target_sector_id,
            request.stability,
        )
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(tunnel)))
}

pub async fn list_regions<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    Path(galaxy_id): Path<Id>,
) -> Result<Json<ListResponse<Region>>, ApiError> {
    let regions = engine.list_regions(&galaxy_id).await.map_err(error_response)?;
    Ok(Json(regions.into()))
}

pub async fn list_clusters<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    Path(galaxy_id): Path<Id>,
    Query(filter): Query<ClusterFilter>,
) -> Result<Json<Page<Cluster>>, ApiError> {
    let page = engine
        .list_clusters(&galaxy_id, &filter)
        .await
        .map_err(error_response)?;
    Ok(Json(page))
}

pub async fn list_sectors<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    Path(galaxy_id): Path<Id>,
    Query(filter): Query<SectorFilter>,
) -> Result<Json<Page<Sector>>, ApiError> {
    let page = engine
        .list_sectors(&galaxy_id, &filter)
        .await
        .map_err(error_response)?;
    Ok(Json(page))
}

pub async fn get_sector<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    Path((galaxy_id, sector_number)): Path<(Id, i32)>,
) -> Result<Json<Sector>, ApiError> {
    let sector = engine
        .get_sector(&galaxy_id, sector_number)
        .await
        .map_err(error_response)?;
    Ok(Json(sector))
}

pub async fn adjacent_sectors<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    Path((galaxy_id, sector_number)): Path<(Id, i32)>,
) -> Result<Json<ListResponse<Sector>>, ApiError> {
    let sectors = engine
        .adjacent_sectors(&galaxy_id, sector_number)
        .await
        .map_err(error_response)?;
    Ok(Json(sectors.into()))
}

pub async fn shortest_path<S: Store + 'static>(
    State(engine): State<AppState<S>>,
    Path(galaxy_id): Path<Id>,
    Query(query): Query<PathQuery>,
) -> Result<Json<ListResponse<Sector>>, ApiError> {
    let path = engine
        .shortest_path(&galaxy_id, query.from, query.to)
        .await
        .map_err(error_response)?;
    Ok(Json(path.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigErrors;

    #[test]
    fn test_error_status_mapping() {
        let mut errors = ConfigErrors::new();
        errors.push("port_density", "must be within [0, 1]");
        let (status, body) = error_response(GalaxyError::Config(errors));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.violations.len(), 1);

        let (status, _) = error_response(GalaxyError::not_found("galaxy", "g1"));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = error_response(GalaxyError::ConcurrentGeneration {
            galaxy_id: "g1".to_string(),
        });
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = error_response(GalaxyError::Capacity {
            requested: 2,
            minimum: 3,
        });
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
