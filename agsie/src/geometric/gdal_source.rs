//! Windowed band reads through GDAL, remote COGs included via `/vsicurl/`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::Dataset;
use geo::{LineString, Polygon};
use tracing::{debug, instrument};

use crate::collect::global_variables::VSICURL_PREFIX;
use crate::error::AnalysisError;
use crate::geo_core::FieldGeometry;
use crate::geometric::raster::{pixel_window, polygon_mask, GeoTransform, RasterSource, RasterWindow};

/// [`RasterSource`] backed by GDAL
///
/// Reads run on the blocking thread pool since GDAL I/O is synchronous.
#[derive(Debug, Clone, Default)]
pub struct GdalRasterSource {
    nodata_override: Option<f64>,
}

impl GdalRasterSource {
    pub fn new(nodata_override: Option<f64>) -> Self {
        GdalRasterSource { nodata_override }
    }
}

#[async_trait]
impl RasterSource for GdalRasterSource {
    #[instrument(skip(self, geometry))]
    async fn read_window(&self, locator: &str, geometry: &FieldGeometry) -> crate::error::Result<RasterWindow> {
        let path = gdal_path(locator);
        let polygon = geometry.polygon().clone();
        let nodata_override = self.nodata_override;

        tokio::task::spawn_blocking(move || read_masked_window(&path, &polygon, nodata_override))
            .await
            .map_err(|e| AnalysisError::RasterFetch(format!("read task aborted: {e}")))?
            .map_err(|e| AnalysisError::RasterFetch(format!("{e:#}")))
    }
}

/// HTTP(S) hrefs go through GDAL's curl driver; anything else is opened as is
pub fn gdal_path(locator: &str) -> String {
    if locator.starts_with("http://") || locator.starts_with("https://") {
        format!("{VSICURL_PREFIX}{locator}")
    } else {
        locator.to_string()
    }
}

fn read_masked_window(path: &str, polygon: &Polygon<f64>, nodata_override: Option<f64>) -> Result<RasterWindow> {
    let dataset = Dataset::open(path).with_context(|| format!("Failed to open {path}"))?;
    let transform = GeoTransform(dataset.geo_transform().context("Band has no geotransform")?);
    let raster_size = dataset.raster_size();

    let projected = to_raster_crs(&dataset, polygon)?;

    let Some(window) = pixel_window(&projected, &transform, raster_size) else {
        debug!(path, "Field lies outside the band extent");
        return Ok(RasterWindow::empty());
    };

    let band = dataset.rasterband(1).context("Failed to open band 1")?;
    let buffer = band
        .read_as::<f64>(
            (window.col_off as isize, window.row_off as isize),
            (window.width, window.height),
            (window.width, window.height),
            None,
        )
        .with_context(|| format!("Failed to read {}x{} window", window.width, window.height))?;

    let mask = polygon_mask(&projected, &transform, &window);
    let mut raster = RasterWindow::new(window.width, window.height, buffer.data().to_vec(), mask)
        .map_err(anyhow::Error::new)?;
    raster.apply_nodata(nodata_override.or_else(|| band.no_data_value()));

    debug!(
        path,
        col_off = window.col_off,
        row_off = window.row_off,
        valid = raster.valid_count(),
        "Window read"
    );
    Ok(raster)
}

/// Reproject the WGS84 field ring into the dataset's CRS
fn to_raster_crs(dataset: &Dataset, polygon: &Polygon<f64>) -> Result<Polygon<f64>> {
    let mut target_srs = dataset.spatial_ref().context("Band has no spatial reference")?;
    target_srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

    // Input coordinates are (lon, lat)
    let mut source_srs = SpatialRef::from_epsg(4326).context("Failed to create EPSG:4326")?;
    source_srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

    let transform =
        CoordTransform::new(&source_srs, &target_srs).context("Failed to create the transformation")?;

    let mut xs: Vec<f64> = polygon.exterior().coords().map(|c| c.x).collect();
    let mut ys: Vec<f64> = polygon.exterior().coords().map(|c| c.y).collect();
    let mut zs = vec![0.0; xs.len()];
    transform
        .transform_coords(&mut xs, &mut ys, &mut zs)
        .context("Failed to reproject the field")?;

    let ring: LineString<f64> = xs.into_iter().zip(ys).collect::<Vec<_>>().into();
    Ok(Polygon::new(ring, vec![]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gdal_path() {
        assert_eq!(
            gdal_path("https://sentinel-cogs.s3.us-west-2.amazonaws.com/B04.tif"),
            "/vsicurl/https://sentinel-cogs.s3.us-west-2.amazonaws.com/B04.tif"
        );
        assert_eq!(gdal_path("/data/B04.tif"), "/data/B04.tif");
        assert_eq!(gdal_path("/vsis3/sentinel-cogs/B04.tif"), "/vsis3/sentinel-cogs/B04.tif");
    }
}
