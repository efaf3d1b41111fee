use axum::{
    routing::{get, post},
    Router,
};

use crate::api::handlers::{self, AppState};
use crate::api::job_handlers;
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Generation
        .route("/galaxies/generate", post(handlers::generate_galaxy::<S>))
        .route(
            "/galaxies/generate-enhanced",
            post(handlers::generate_enhanced::<S>),
        )
        // Galaxy management
        .route("/galaxies", get(handlers::list_galaxies::<S>))
        .route(
            "/galaxies/:galaxy_id",
            get(handlers::get_galaxy::<S>).delete(handlers::clear_galaxy::<S>),
        )
        .route(
            "/galaxies/:galaxy_id/sectors",
            post(handlers::add_sectors::<S>).get(handlers::list_sectors::<S>),
        )
        .route(
            "/galaxies/:galaxy_id/warp-tunnels",
            post(handlers::create_warp_tunnel::<S>),
        )
        // Navigation reads
        .route("/galaxies/:galaxy_id/regions", get(handlers::list_regions::<S>))
        .route("/galaxies/:galaxy_id/clusters", get(handlers::list_clusters::<S>))
        .route(
            "/galaxies/:galaxy_id/sectors/:sector_number",
            get(handlers::get_sector::<S>),
        )
        .route(
            "/galaxies/:galaxy_id/sectors/:sector_number/adjacent",
            get(handlers::adjacent_sectors::<S>),
        )
        .route("/galaxies/:galaxy_id/path", get(handlers::shortest_path::<S>))
        // Jobs
        .route(
            "/galaxies/:galaxy_id/jobs",
            get(job_handlers::list_galaxy_jobs::<S>),
        )
        .route("/jobs/:job_id", get(job_handlers::get_job::<S>))
        .route("/jobs/:job_id/cancel", post(job_handlers::cancel_job::<S>))
}
