use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::model::{
    page_window, BoundingBox, Cluster, ClusterFilter, ClusterType, Coordinates, Galaxy,
    GalaxyBlueprint, GalaxySnapshot, GalaxyStatistics, GenerationJob, GenerationPhase,
    GenerationStatus, Id, JobKind, JobState, JobUpdate, Page, Region, RegionDistribution,
    RegionKind, ResourceRichness, Sector, SectorFeatures, SectorFilter, SectorType, TunnelKind,
    TunnelSpan, WarpTunnel,
};
use crate::store::traits::{
    GalaxyStore, JobCommit, JobStore, NavigationStore, RowCounts, Store, StructureStore,
};

const GALAXY_COLUMNS: &str = "id, name, created_at, region_distribution, generation_config, \
     generation_status, total_sectors, statistics";
const REGION_COLUMNS: &str = "r.id, r.galaxy_id, r.name, r.kind, r.ratio, r.target_sector_count, \
     r.security_level, r.controlling_faction, r.bounds";
const CLUSTER_COLUMNS: &str = "c.id, c.galaxy_id, c.region_id, c.name, c.cluster_type, c.bounds, \
     c.target_sector_count, c.sector_count";
const SECTOR_COLUMNS: &str = "s.id, s.galaxy_id, s.region_id, s.cluster_id, s.sector_number, s.name, \
     s.x, s.y, s.z, s.sector_type, s.hazard_level, s.resource_richness, s.has_port, s.has_planet, \
     s.port_id, s.planet_id";
const TUNNEL_COLUMNS: &str = "t.id, t.galaxy_id, t.source_sector_id, t.target_sector_id, t.stability, \
     t.span, t.kind, t.turn_cost, t.is_bidirectional, t.created_at";
const JOB_COLUMNS: &str = "id, galaxy_id, kind, phase, state, progress_percentage, created_at, \
     updated_at, heartbeat_at, error, cancel_requested";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn delete_where(
        tx: &mut Transaction<'_, Postgres>,
        table: &str,
        predicate: &str,
        key: &Id,
    ) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE {}", table, predicate);
        let result = sqlx::query(&sql)
            .bind(key)
            .execute(&mut **tx)
            .await
            .with_context(|| format!("Failed to delete from {}", table))?;
        Ok(result.rows_affected())
    }
}

fn parse_column<T>(row: &PgRow, column: &str, parse: fn(&str) -> Option<T>) -> Result<T> {
    let raw: String = row.try_get(column)?;
    parse(&raw).ok_or_else(|| anyhow!("Unknown {} value '{}'", column, raw))
}

fn galaxy_from_row(row: &PgRow) -> Result<Galaxy> {
    let status = parse_column(row, "generation_status", GenerationStatus::parse)?;
    Ok(Galaxy {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
        region_distribution: row.try_get::<Json<RegionDistribution>, _>("region_distribution")?.0,
        generation_config: row.try_get::<Json<GalaxyBlueprint>, _>("generation_config")?.0,
        generation_status: status,
        total_sectors: row.try_get::<i32, _>("total_sectors")? as u32,
        statistics: row.try_get::<Json<GalaxyStatistics>, _>("statistics")?.0,
    })
}

fn region_from_row(row: &PgRow) -> Result<Region> {
    Ok(Region {
        id: row.try_get("id")?,
        galaxy_id: row.try_get("galaxy_id")?,
        name: row.try_get("name")?,
        kind: parse_column(row, "kind", RegionKind::parse)?,
        ratio: row.try_get::<i32, _>("ratio")? as u32,
        target_sector_count: row.try_get::<i32, _>("target_sector_count")? as u32,
        security_level: row.try_get("security_level")?,
        controlling_faction: row.try_get("controlling_faction")?,
        bounds: row.try_get::<Json<BoundingBox>, _>("bounds")?.0,
    })
}

fn cluster_from_row(row: &PgRow) -> Result<Cluster> {
    Ok(Cluster {
        id: row.try_get("id")?,
        galaxy_id: row.try_get("galaxy_id")?,
        region_id: row.try_get("region_id")?,
        name: row.try_get("name")?,
        cluster_type: parse_column(row, "cluster_type", ClusterType::parse)?,
        bounds: row.try_get::<Json<BoundingBox>, _>("bounds")?.0,
        target_sector_count: row.try_get::<i32, _>("target_sector_count")? as u32,
        sector_count: row.try_get::<i32, _>("sector_count")? as u32,
    })
}

fn sector_from_row(row: &PgRow) -> Result<Sector> {
    Ok(Sector {
        id: row.try_get("id")?,
        galaxy_id: row.try_get("galaxy_id")?,
        region_id: row.try_get("region_id")?,
        cluster_id: row.try_get("cluster_id")?,
        sector_number: row.try_get("sector_number")?,
        name: row.try_get("name")?,
        coordinates: Coordinates::new(row.try_get("x")?, row.try_get("y")?, row.try_get("z")?),
        sector_type: parse_column(row, "sector_type", SectorType::parse)?,
        hazard_level: row.try_get::<i16, _>("hazard_level")? as u8,
        resource_richness: parse_column(row, "resource_richness", ResourceRichness::parse)?,
        has_port: row.try_get("has_port")?,
        has_planet: row.try_get("has_planet")?,
        port_id: row.try_get("port_id")?,
        planet_id: row.try_get("planet_id")?,
    })
}

fn tunnel_from_row(row: &PgRow) -> Result<WarpTunnel> {
    Ok(WarpTunnel {
        id: row.try_get("id")?,
        galaxy_id: row.try_get("galaxy_id")?,
        source_sector_id: row.try_get("source_sector_id")?,
        target_sector_id: row.try_get("target_sector_id")?,
        stability: row.try_get("stability")?,
        span: parse_column(row, "span", TunnelSpan::parse)?,
        kind: parse_column(row, "kind", TunnelKind::parse)?,
        turn_cost: row.try_get::<i32, _>("turn_cost")? as u32,
        is_bidirectional: row.try_get("is_bidirectional")?,
        created_at: row.try_get("created_at")?,
    })
}

fn job_from_row(row: &PgRow) -> Result<GenerationJob> {
    Ok(GenerationJob {
        id: row.try_get("id")?,
        galaxy_id: row.try_get("galaxy_id")?,
        kind: parse_column(row, "kind", JobKind::parse)?,
        phase: parse_column(row, "phase", GenerationPhase::parse)?,
        state: parse_column(row, "state", JobState::parse)?,
        progress_percentage: row.try_get::<i16, _>("progress_percentage")? as u8,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        heartbeat_at: row.try_get("heartbeat_at")?,
        error: row.try_get("error")?,
        cancel_requested: row.try_get("cancel_requested")?,
    })
}

fn collect<T>(rows: Vec<PgRow>, decode: fn(&PgRow) -> Result<T>) -> Result<Vec<T>> {
    rows.iter().map(decode).collect()
}

#[async_trait::async_trait]
impl GalaxyStore for PostgresStore {
    async fn create_generation(&self, galaxy: &Galaxy, job: &GenerationJob) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO galaxies (id, name, created_at, region_distribution, generation_config,
                                  generation_status, total_sectors, statistics)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&galaxy.id)
        .bind(&galaxy.name)
        .bind(galaxy.created_at)
        .bind(Json(&galaxy.region_distribution))
        .bind(Json(&galaxy.generation_config))
        .bind(galaxy.generation_status.as_str())
        .bind(galaxy.total_sectors as i32)
        .bind(Json(&galaxy.statistics))
        .execute(&mut *tx)
        .await
        .context("Failed to insert galaxy")?;

        insert_job(&mut tx, job).await?;

        tx.commit().await.context("Failed to commit galaxy creation")?;
        Ok(())
    }

    async fn get_galaxy(&self, id: &Id) -> Result<Option<Galaxy>> {
        let sql = format!("SELECT {} FROM galaxies WHERE id = $1", GALAXY_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch galaxy")?;

        row.as_ref().map(galaxy_from_row).transpose()
    }

    async fn list_galaxies(&self) -> Result<Vec<Galaxy>> {
        let sql = format!("SELECT {} FROM galaxies ORDER BY created_at", GALAXY_COLUMNS);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list galaxies")?;
        collect(rows, galaxy_from_row)
    }

    async fn list_draft_galaxies(&self) -> Result<Vec<Galaxy>> {
        let sql = format!(
            "SELECT {} FROM galaxies WHERE generation_status = 'DRAFT' ORDER BY created_at",
            GALAXY_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list draft galaxies")?;
        collect(rows, galaxy_from_row)
    }

    async fn delete_galaxy(&self, id: &Id) -> Result<RowCounts> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let counts = RowCounts {
            warp_tunnels: Self::delete_where(&mut tx, "warp_tunnels", "galaxy_id = $1", id).await?,
            sectors: Self::delete_where(&mut tx, "sectors", "galaxy_id = $1", id).await?,
            clusters: Self::delete_where(&mut tx, "clusters", "galaxy_id = $1", id).await?,
            regions: Self::delete_where(&mut tx, "regions", "galaxy_id = $1", id).await?,
            jobs: Self::delete_where(&mut tx, "generation_jobs", "galaxy_id = $1", id).await?,
            galaxies: Self::delete_where(&mut tx, "galaxies", "id = $1", id).await?,
        };
        tx.commit().await.context("Failed to commit galaxy deletion")?;
        Ok(counts)
    }
}

async fn insert_job(tx: &mut Transaction<'_, Postgres>, job: &GenerationJob) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO generation_jobs (id, galaxy_id, kind, phase, state, progress_percentage,
                                     created_at, updated_at, heartbeat_at, error, cancel_requested)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(&job.id)
    .bind(&job.galaxy_id)
    .bind(job.kind.as_str())
    .bind(job.phase.as_str())
    .bind(job.state.as_str())
    .bind(job.progress_percentage as i16)
    .bind(job.created_at)
    .bind(job.updated_at)
    .bind(job.heartbeat_at)
    .bind(&job.error)
    .bind(job.cancel_requested)
    .execute(&mut **tx)
    .await
    .context("Failed to insert generation job")?;
    Ok(())
}

#[async_trait::async_trait]
impl StructureStore for PostgresStore {
    async fn insert_regions(&self, job_id: &Id, regions: &[Region]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        for region in regions {
            sqlx::query(
                r#"
                INSERT INTO regions (id, galaxy_id, job_id, committed, name, kind, ratio,
                                     target_sector_count, security_level, controlling_faction, bounds)
                VALUES ($1, $2, $3, FALSE, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(&region.id)
            .bind(&region.galaxy_id)
            .bind(job_id)
            .bind(&region.name)
            .bind(region.kind.as_str())
            .bind(region.ratio as i32)
            .bind(region.target_sector_count as i32)
            .bind(region.security_level)
            .bind(&region.controlling_faction)
            .bind(Json(&region.bounds))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert region {}", region.name))?;
        }
        tx.commit().await.context("Failed to commit regions")?;
        Ok(())
    }

    async fn insert_clusters(&self, job_id: &Id, clusters: &[Cluster]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        for cluster in clusters {
            sqlx::query(
                r#"
                INSERT INTO clusters (id, galaxy_id, region_id, job_id, committed, name, cluster_type,
                                      bounds, target_sector_count, sector_count)
                VALUES ($1, $2, $3, $4, FALSE, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(&cluster.id)
            .bind(&cluster.galaxy_id)
            .bind(&cluster.region_id)
            .bind(job_id)
            .bind(&cluster.name)
            .bind(cluster.cluster_type.as_str())
            .bind(Json(&cluster.bounds))
            .bind(cluster.target_sector_count as i32)
            .bind(cluster.sector_count as i32)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert cluster {}", cluster.name))?;
        }
        tx.commit().await.context("Failed to commit clusters")?;
        Ok(())
    }

    async fn insert_sectors(&self, job_id: &Id, sectors: &[Sector]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        for sector in sectors {
            sqlx::query(
                r#"
                INSERT INTO sectors (id, galaxy_id, region_id, cluster_id, job_id, committed,
                                     sector_number, name, x, y, z, sector_type, hazard_level,
                                     resource_richness, has_port, has_planet, port_id, planet_id)
                VALUES ($1, $2, $3, $4, $5, FALSE, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
                "#,
            )
            .bind(&sector.id)
            .bind(&sector.galaxy_id)
            .bind(&sector.region_id)
            .bind(&sector.cluster_id)
            .bind(job_id)
            .bind(sector.sector_number)
            .bind(&sector.name)
            .bind(sector.coordinates.x)
            .bind(sector.coordinates.y)
            .bind(sector.coordinates.z)
            .bind(sector.sector_type.as_str())
            .bind(sector.hazard_level as i16)
            .bind(sector.resource_richness.as_str())
            .bind(sector.has_port)
            .bind(sector.has_planet)
            .bind(&sector.port_id)
            .bind(&sector.planet_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert sector {}", sector.sector_number))?;
        }
        tx.commit().await.context("Failed to commit sectors")?;
        Ok(())
    }

    async fn insert_warp_tunnels(&self, job_id: &Id, tunnels: &[WarpTunnel]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        for tunnel in tunnels {
            insert_tunnel(&mut tx, Some(job_id), false, tunnel).await?;
        }
        tx.commit().await.context("Failed to commit warp tunnels")?;
        Ok(())
    }

    async fn update_sector_features(&self, features: &[SectorFeatures]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        for feature in features {
            sqlx::query(
                r#"
                UPDATE sectors
                SET has_port = $2, has_planet = $3, port_id = $4, planet_id = $5
                WHERE id = $1
                "#,
            )
            .bind(&feature.sector_id)
            .bind(feature.port_id.is_some())
            .bind(feature.planet_id.is_some())
            .bind(&feature.port_id)
            .bind(&feature.planet_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to record features of sector {}", feature.sector_id))?;
        }
        tx.commit().await.context("Failed to commit sector features")?;
        Ok(())
    }

    async fn uncommitted_sector_ids(&self, job_id: &Id) -> Result<Vec<Id>> {
        let rows = sqlx::query("SELECT id FROM sectors WHERE job_id = $1 AND NOT committed")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list uncommitted sectors")?;
        rows.iter()
            .map(|row| Ok(row.try_get::<Id, _>("id")?))
            .collect()
    }

    async fn commit_job(&self, job_id: &Id, commit: &JobCommit) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        for table in ["regions", "clusters", "sectors", "warp_tunnels"] {
            let sql = format!("UPDATE {} SET committed = TRUE WHERE job_id = $1", table);
            sqlx::query(&sql)
                .bind(job_id)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to publish {}", table))?;
        }

        for (region_id, added) in &commit.region_additions {
            sqlx::query(
                "UPDATE regions SET target_sector_count = target_sector_count + $2 WHERE id = $1",
            )
            .bind(region_id)
            .bind(*added as i32)
            .execute(&mut *tx)
            .await
            .context("Failed to update region sector count")?;
        }

        let updated = sqlx::query(
            r#"
            UPDATE galaxies
            SET generation_status = 'COMPLETE', total_sectors = $2, statistics = $3
            WHERE id = $1
            "#,
        )
        .bind(&commit.galaxy_id)
        .bind(commit.total_sectors as i32)
        .bind(Json(&commit.statistics))
        .execute(&mut *tx)
        .await
        .context("Failed to complete galaxy")?;
        if updated.rows_affected() == 0 {
            return Err(anyhow!("Galaxy {} not found", commit.galaxy_id));
        }

        sqlx::query(
            r#"
            UPDATE generation_jobs
            SET state = 'COMPLETED', phase = 'finalizing', progress_percentage = 100,
                updated_at = NOW(), heartbeat_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&mut *tx)
        .await
        .context("Failed to complete generation job")?;

        tx.commit().await.context("Failed to commit generation job")?;
        Ok(())
    }

    async fn rollback_job(&self, job_id: &Id) -> Result<RowCounts> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let pending = "job_id = $1 AND NOT committed";
        let mut counts = RowCounts {
            warp_tunnels: Self::delete_where(&mut tx, "warp_tunnels", pending, job_id).await?,
            sectors: Self::delete_where(&mut tx, "sectors", pending, job_id).await?,
            clusters: Self::delete_where(&mut tx, "clusters", pending, job_id).await?,
            regions: Self::delete_where(&mut tx, "regions", pending, job_id).await?,
            ..RowCounts::default()
        };

        let draft: Option<Id> = sqlx::query(
            r#"
            SELECT g.id FROM galaxies g
            JOIN generation_jobs j ON j.galaxy_id = g.id
            WHERE j.id = $1 AND g.generation_status = 'DRAFT'
            "#,
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up draft galaxy")?
        .map(|row| row.try_get("id"))
        .transpose()?;

        if let Some(galaxy_id) = draft {
            counts.warp_tunnels +=
                Self::delete_where(&mut tx, "warp_tunnels", "galaxy_id = $1", &galaxy_id).await?;
            counts.sectors += Self::delete_where(&mut tx, "sectors", "galaxy_id = $1", &galaxy_id).await?;
            counts.clusters += Self::delete_where(&mut tx, "clusters", "galaxy_id = $1", &galaxy_id).await?;
            counts.regions += Self::delete_where(&mut tx, "regions", "galaxy_id = $1", &galaxy_id).await?;
            counts.galaxies = Self::delete_where(&mut tx, "galaxies", "id = $1", &galaxy_id).await?;
        }

        tx.commit().await.context("Failed to commit rollback")?;
        Ok(counts)
    }
}

async fn insert_tunnel(
    tx: &mut Transaction<'_, Postgres>,
    job_id: Option<&Id>,
    committed: bool,
    tunnel: &WarpTunnel,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO warp_tunnels (id, galaxy_id, job_id, committed, source_sector_id, target_sector_id,
                                  stability, span, kind, turn_cost, is_bidirectional, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(&tunnel.id)
    .bind(&tunnel.galaxy_id)
    .bind(job_id.cloned())
    .bind(committed)
    .bind(&tunnel.source_sector_id)
    .bind(&tunnel.target_sector_id)
    .bind(tunnel.stability)
    .bind(tunnel.span.as_str())
    .bind(tunnel.kind.as_str())
    .bind(tunnel.turn_cost as i32)
    .bind(tunnel.is_bidirectional)
    .bind(tunnel.created_at)
    .execute(&mut **tx)
    .await
    .with_context(|| {
        format!(
            "Failed to insert warp tunnel {} -> {}",
            tunnel.source_sector_id, tunnel.target_sector_id
        )
    })?;
    Ok(())
}

#[async_trait::async_trait]
impl NavigationStore for PostgresStore {
    async fn list_regions(&self, galaxy_id: &Id) -> Result<Vec<Region>> {
        let sql = format!(
            r#"
            SELECT {} FROM regions r
            JOIN galaxies g ON g.id = r.galaxy_id
            WHERE r.galaxy_id = $1 AND r.committed AND g.generation_status = 'COMPLETE'
            ORDER BY r.seq
            "#,
            REGION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(galaxy_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list regions")?;
        collect(rows, region_from_row)
    }

    async fn list_clusters(&self, galaxy_id: &Id, filter: &ClusterFilter) -> Result<Page<Cluster>> {
        let (limit, offset) = page_window(filter.limit, filter.offset);
        let predicate = r#"
            FROM clusters c
            JOIN galaxies g ON g.id = c.galaxy_id
            WHERE c.galaxy_id = $1 AND c.committed AND g.generation_status = 'COMPLETE'
              AND ($2::TEXT IS NULL OR c.region_id = $2)
        "#;

        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS total {}", predicate))
            .bind(galaxy_id)
            .bind(&filter.region_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count clusters")?
            .try_get("total")?;

        let sql = format!(
            "SELECT {} {} ORDER BY c.seq LIMIT $3 OFFSET $4",
            CLUSTER_COLUMNS, predicate
        );
        let rows = sqlx::query(&sql)
            .bind(galaxy_id)
            .bind(&filter.region_id)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list clusters")?;

        Ok(Page {
            items: collect(rows, cluster_from_row)?,
            total: total as usize,
            limit,
            offset,
        })
    }

    async fn list_sectors(&self, galaxy_id: &Id, filter: &SectorFilter) -> Result<Page<Sector>> {
        let (limit, offset) = page_window(filter.limit, filter.offset);
        let predicate = r#"
            FROM sectors s
            JOIN galaxies g ON g.id = s.galaxy_id
            WHERE s.galaxy_id = $1 AND s.committed AND g.generation_status = 'COMPLETE'
              AND ($2::TEXT IS NULL OR s.region_id = $2)
              AND ($3::TEXT IS NULL OR s.cluster_id = $3)
        "#;

        let total: i64 = sqlx::query(&format!("SELECT COUNT(*) AS total {}", predicate))
            .bind(galaxy_id)
            .bind(&filter.region_id)
            .bind(&filter.cluster_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count sectors")?
            .try_get("total")?;

        let sql = format!(
            "SELECT {} {} ORDER BY s.sector_number LIMIT $4 OFFSET $5",
            SECTOR_COLUMNS, predicate
        );
        let rows = sqlx::query(&sql)
            .bind(galaxy_id)
            .bind(&filter.region_id)
            .bind(&filter.cluster_id)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list sectors")?;

        Ok(Page {
            items: collect(rows, sector_from_row)?,
            total: total as usize,
            limit,
            offset,
        })
    }

    async fn get_sector(&self, galaxy_id: &Id, sector_number: i32) -> Result<Option<Sector>> {
        let sql = format!(
            r#"
            SELECT {} FROM sectors s
            JOIN galaxies g ON g.id = s.galaxy_id
            WHERE s.galaxy_id = $1 AND s.sector_number = $2
              AND s.committed AND g.generation_status = 'COMPLETE'
            "#,
            SECTOR_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(galaxy_id)
            .bind(sector_number)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch sector")?;
        row.as_ref().map(sector_from_row).transpose()
    }

    async fn get_sector_by_id(&self, sector_id: &Id) -> Result<Option<Sector>> {
        let sql = format!(
            r#"
            SELECT {} FROM sectors s
            JOIN galaxies g ON g.id = s.galaxy_id
            WHERE s.id = $1 AND s.committed AND g.generation_status = 'COMPLETE'
            "#,
            SECTOR_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(sector_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch sector")?;
        row.as_ref().map(sector_from_row).transpose()
    }

    async fn list_sector_tunnels(&self, sector_id: &Id) -> Result<Vec<WarpTunnel>> {
        let sql = format!(
            r#"
            SELECT {} FROM warp_tunnels t
            JOIN galaxies g ON g.id = t.galaxy_id
            WHERE (t.source_sector_id = $1 OR t.target_sector_id = $1)
              AND t.committed AND g.generation_status = 'COMPLETE'
            ORDER BY t.seq
            "#,
            TUNNEL_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(sector_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list sector tunnels")?;
        collect(rows, tunnel_from_row)
    }

    async fn load_snapshot(&self, galaxy_id: &Id) -> Result<GalaxySnapshot> {
        let visible = "JOIN galaxies g ON g.id = {alias}.galaxy_id \
                       WHERE {alias}.galaxy_id = $1 AND {alias}.committed AND g.generation_status = 'COMPLETE'";
        let scoped = |columns: &str, table: &str, alias: &str, order: &str| {
            format!(
                "SELECT {} FROM {} {} {} ORDER BY {}",
                columns,
                table,
                alias,
                visible.replace("{alias}", alias),
                order
            )
        };

        let regions = sqlx::query(&scoped(REGION_COLUMNS, "regions", "r", "r.seq"))
            .bind(galaxy_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to load regions")?;
        let clusters = sqlx::query(&scoped(CLUSTER_COLUMNS, "clusters", "c", "c.seq"))
            .bind(galaxy_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to load clusters")?;
        let sectors = sqlx::query(&scoped(SECTOR_COLUMNS, "sectors", "s", "s.sector_number"))
            .bind(galaxy_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to load sectors")?;
        let tunnels = sqlx::query(&scoped(TUNNEL_COLUMNS, "warp_tunnels", "t", "t.seq"))
            .bind(galaxy_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to load warp tunnels")?;

        Ok(GalaxySnapshot {
            regions: collect(regions, region_from_row)?,
            clusters: collect(clusters, cluster_from_row)?,
            sectors: collect(sectors, sector_from_row)?,
            tunnels: collect(tunnels, tunnel_from_row)?,
        })
    }

    async fn find_tunnel(&self, a: &Id, b: &Id) -> Result<Option<WarpTunnel>> {
        let sql = format!(
            r#"
            SELECT {} FROM warp_tunnels t
            WHERE (t.source_sector_id = $1 AND t.target_sector_id = $2)
               OR (t.source_sector_id = $2 AND t.target_sector_id = $1)
            "#,
            TUNNEL_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(a)
            .bind(b)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up warp tunnel")?;
        row.as_ref().map(tunnel_from_row).transpose()
    }

    async fn insert_manual_tunnel(&self, tunnel: &WarpTunnel) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        insert_tunnel(&mut tx, None, true, tunnel).await?;
        sqlx::query(
            r#"
            UPDATE galaxies
            SET statistics = jsonb_set(statistics, '{warp_tunnel_count}',
                to_jsonb(COALESCE((statistics->>'warp_tunnel_count')::INTEGER, 0) + 1))
            WHERE id = $1
            "#,
        )
        .bind(&tunnel.galaxy_id)
        .execute(&mut *tx)
        .await
        .context("Failed to update galaxy statistics")?;
        tx.commit().await.context("Failed to commit warp tunnel")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl JobStore for PostgresStore {
    async fn create_job(&self, job: &GenerationJob) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        insert_job(&mut tx, job).await?;
        tx.commit().await.context("Failed to commit generation job")?;
        Ok(())
    }

    async fn get_job(&self, id: &Id) -> Result<Option<GenerationJob>> {
        let sql = format!("SELECT {} FROM generation_jobs WHERE id = $1", JOB_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch generation job")?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn list_jobs_for_galaxy(&self, galaxy_id: &Id) -> Result<Vec<GenerationJob>> {
        let sql = format!(
            "SELECT {} FROM generation_jobs WHERE galaxy_id = $1 ORDER BY created_at",
            JOB_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(galaxy_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list generation jobs")?;
        collect(rows, job_from_row)
    }

    async fn update_job(&self, id: &Id, update: &JobUpdate) -> Result<Option<GenerationJob>> {
        let sql = format!(
            r#"
            UPDATE generation_jobs
            SET phase = COALESCE($2, phase),
                state = COALESCE($3, state),
                progress_percentage = COALESCE($4, progress_percentage),
                error = COALESCE($5, error),
                updated_at = NOW(),
                heartbeat_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            JOB_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(update.phase.map(|p| p.as_str()))
            .bind(update.state.map(|s| s.as_str()))
            .bind(update.progress_percentage.map(i16::from))
            .bind(&update.error)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to update generation job")?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn request_cancel(&self, id: &Id) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET cancel_requested = TRUE, updated_at = NOW()
            WHERE id = $1 AND state IN ('PENDING', 'RUNNING')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to request job cancellation")?;
        Ok(result.rows_affected() > 0)
    }

    async fn is_cancel_requested(&self, id: &Id) -> Result<bool> {
        let row = sqlx::query("SELECT cancel_requested FROM generation_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read cancellation flag")?;
        match row {
            Some(row) => Ok(row.try_get("cancel_requested")?),
            None => Ok(false),
        }
    }

    async fn list_stale_jobs(&self, cutoff: DateTime<Utc>) -> Result<Vec<GenerationJob>> {
        let sql = format!(
            r#"
            SELECT {} FROM generation_jobs
            WHERE state IN ('PENDING', 'RUNNING') AND heartbeat_at < $1
            ORDER BY heartbeat_at
            "#,
            JOB_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list stale generation jobs")?;
        collect(rows, job_from_row)
    }
}

impl Store for PostgresStore {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_lists_are_aliased() {
        for columns in [REGION_COLUMNS, CLUSTER_COLUMNS, SECTOR_COLUMNS, TUNNEL_COLUMNS] {
            let alias = &columns[..2];
            assert!(columns.split(", ").all(|c| c.trim().starts_with(alias)));
        }
    }

    #[tokio::test]
    #[ignore = "requires a running PostgreSQL instance"]
    async fn test_postgres_round_trip_galaxy() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let store = PostgresStore::new(&url, 2).await.unwrap();
        store.migrate().await.unwrap();

        let galaxy = Galaxy::new_draft(
            "pg".to_string(),
            1,
            crate::model::RegionDistribution::new().with("core", 100),
            crate::model::GalaxyBlueprint::default(),
        );
        let job = GenerationJob::new(galaxy.id.clone(), JobKind::Generate);
        store.create_generation(&galaxy, &job).await.unwrap();

        let loaded = store.get_galaxy(&galaxy.id).await.unwrap().unwrap();
        assert_eq!(loaded.generation_status, GenerationStatus::Draft);

        let counts = store.rollback_job(&job.id).await.unwrap();
        assert_eq!(counts.galaxies, 1);
        assert!(store.get_job(&job.id).await.unwrap().is_some());
    }
}
