use std::sync::Arc;

use agsie::analysis::orchestrator::AnalysisOrchestrator;
use agsie::analysis::store::{FieldStore, MemoryFieldStore};
use agsie::collect::stac::stac_collect::StacCollect;
use agsie::commons::config::PipelineConfig;
use agsie::commons::host_limiter::HostLimiter;
use agsie::geo_core::RawGeometry;
use agsie::geometric::raster::BandFetcher;
use agsie::geometric::GdalRasterSource;
use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

/// Example: draw a field near La Rochelle, store it with its NDVI health,
/// then run a fresh analysis against the latest Sentinel-2 scene.
///
/// Settings come from `AGSIE_*` variables (a `.env` file is read if present).
#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).init();

    let config = PipelineConfig::from_env()?;
    let limiter = Arc::new(HostLimiter::new(config.per_host_concurrency));

    let catalog = Arc::new(StacCollect::new(&config, limiter.clone())?);
    let fetcher = BandFetcher::new(
        Arc::new(GdalRasterSource::new(config.nodata_override)),
        limiter,
        config.retry_policy(),
    );
    let store = Arc::new(MemoryFieldStore::new());
    let orchestrator = AnalysisOrchestrator::new(catalog, fetcher, store.clone(), &config);

    let field = RawGeometry::from_json_str(
        r#"{"type": "Polygon", "coordinates": [[
            [-1.152704, 46.181627], [-1.139893, 46.181627],
            [-1.141, 46.18699], [-1.150, 46.1865], [-1.152704, 46.181627]
        ]]}"#,
    )?;

    let record = orchestrator.create_field(&field).await?;
    println!(
        "Field {} saved: {} ha ({:?}), status {}",
        record.id, record.area_hectares, record.area_method, record.ndvi_status
    );

    match orchestrator.analyze(record.id).await {
        Ok(report) => {
            println!(
                "NDVI {} over {} pixels, scene {} ({})",
                report.ndvi.mean, report.ndvi.valid_pixels, report.scene_id, report.ndvi.scene_date
            );
            println!(
                "{}: {} ({:?})",
                report.classification.status, report.classification.recommendation, report.write
            );
        }
        Err(failure) => println!("Analysis failed: {failure}"),
    }

    println!("Stored analyses: {}", store.list_analyses(record.id).await?.len());
    Ok(())
}
