use std::sync::Arc;

use async_trait::async_trait;
use geo::{Contains, Point, Polygon};
use tracing::{debug, instrument};

use crate::collect::stac::stac_collect::SatelliteScene;
use crate::commons::host_limiter::HostLimiter;
use crate::commons::retry::{with_retry, RetryPolicy};
use crate::error::{AnalysisError, Result};
use crate::geo_core::FieldGeometry;

/// One band cropped to the field's bounding region, row-major, with a validity mask
///
/// A pixel is valid when its centre lies inside the field polygon and the
/// band does not flag it as nodata.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterWindow {
    width: usize,
    height: usize,
    values: Vec<f64>,
    valid: Vec<bool>,
}

impl RasterWindow {
    pub fn new(width: usize, height: usize, values: Vec<f64>, valid: Vec<bool>) -> Result<Self> {
        let expected = width * height;
        if values.len() != expected || valid.len() != expected {
            return Err(AnalysisError::RasterFetch(format!(
                "window {}x{} expects {} pixels, got {} values and {} mask entries",
                width,
                height,
                expected,
                values.len(),
                valid.len()
            )));
        }
        Ok(RasterWindow {
            width,
            height,
            values,
            valid,
        })
    }

    /// Every pixel valid and equal to `value`
    pub fn filled(width: usize, height: usize, value: f64) -> Self {
        RasterWindow {
            width,
            height,
            values: vec![value; width * height],
            valid: vec![true; width * height],
        }
    }

    /// Nothing to read, e.g. the field lies outside the band's coverage
    pub fn empty() -> Self {
        RasterWindow {
            width: 0,
            height: 0,
            values: Vec::new(),
            valid: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn mask(&self) -> &[bool] {
        &self.valid
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    /// Pixels whose value equals `nodata` (or is NaN) become invalid
    pub fn apply_nodata(&mut self, nodata: Option<f64>) {
        for (value, valid) in self.values.iter().zip(self.valid.iter_mut()) {
            if value.is_nan() || nodata.is_some_and(|nd| *value == nd) {
                *valid = false;
            }
        }
    }
}

/// GDAL affine geotransform: `x = c0 + col*c1 + row*c2`, `y = c3 + col*c4 + row*c5`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// World coordinates of the centre of pixel (col, row)
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        let [c0, c1, c2, c3, c4, c5] = self.0;
        let (px, py) = (col as f64 + 0.5, row as f64 + 0.5);
        (c0 + px * c1 + py * c2, c3 + px * c4 + py * c5)
    }

    /// Fractional (col, row) of a world coordinate, `None` for a singular transform
    pub fn world_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let [c0, c1, c2, c3, c4, c5] = self.0;
        let det = c1 * c5 - c2 * c4;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let (dx, dy) = (x - c0, y - c3);
        Some(((dx * c5 - dy * c2) / det, (dy * c1 - dx * c4) / det))
    }
}

/// Pixel-space rectangle to read from a band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

/// Pixels covering `polygon` (already in the raster's CRS), clipped to the raster extent
///
/// Returns `None` when the polygon does not overlap the raster.
pub fn pixel_window(
    polygon: &Polygon<f64>,
    transform: &GeoTransform,
    raster_size: (usize, usize),
) -> Option<PixelWindow> {
    let (raster_w, raster_h) = raster_size;
    let mut min_col = f64::INFINITY;
    let mut min_row = f64::INFINITY;
    let mut max_col = f64::NEG_INFINITY;
    let mut max_row = f64::NEG_INFINITY;

    for c in polygon.exterior().coords() {
        let (col, row) = transform.world_to_pixel(c.x, c.y)?;
        min_col = min_col.min(col);
        min_row = min_row.min(row);
        max_col = max_col.max(col);
        max_row = max_row.max(row);
    }

    let col_start = min_col.floor().max(0.0);
    let row_start = min_row.floor().max(0.0);
    let col_end = max_col.ceil().min(raster_w as f64);
    let row_end = max_row.ceil().min(raster_h as f64);

    if !(col_end > col_start && row_end > row_start) {
        return None;
    }

    Some(PixelWindow {
        col_off: col_start as usize,
        row_off: row_start as usize,
        width: (col_end - col_start) as usize,
        height: (row_end - row_start) as usize,
    })
}

/// Row-major mask of the pixels of `window` whose centre falls inside `polygon`
pub fn polygon_mask(
    polygon: &Polygon<f64>,
    transform: &GeoTransform,
    window: &PixelWindow,
) -> Vec<bool> {
    let mut mask = Vec::with_capacity(window.width * window.height);
    for row in 0..window.height {
        for col in 0..window.width {
            let (x, y) = transform.pixel_center(window.col_off + col, window.row_off + row);
            mask.push(polygon.contains(&Point::new(x, y)));
        }
    }
    mask
}

/// Anything able to do a windowed, polygon-masked read of one band
#[async_trait]
pub trait RasterSource: Send + Sync {
    async fn read_window(&self, locator: &str, geometry: &FieldGeometry) -> Result<RasterWindow>;
}

/// Red and near-infrared windows of one scene
#[derive(Debug, Clone, PartialEq)]
pub struct BandPair {
    pub red: RasterWindow,
    pub nir: RasterWindow,
}

/// Reads the bands of a scene through a [`RasterSource`], one host slot and
/// a bounded number of retries per read
#[derive(Clone)]
pub struct BandFetcher {
    source: Arc<dyn RasterSource>,
    limiter: Arc<HostLimiter>,
    retry: RetryPolicy,
}

impl BandFetcher {
    pub fn new(source: Arc<dyn RasterSource>, limiter: Arc<HostLimiter>, retry: RetryPolicy) -> Self {
        BandFetcher {
            source,
            limiter,
            retry,
        }
    }

    #[instrument(skip(self, geometry))]
    pub async fn fetch_band(&self, locator: &str, geometry: &FieldGeometry) -> Result<RasterWindow> {
        let window = with_retry(
            &self.retry,
            "band read",
            |deadline| AnalysisError::RasterFetch(format!("read of {locator} timed out after {deadline:?}")),
            || async {
                let _permit = self.limiter.acquire(locator).await.map_err(|e| {
                    AnalysisError::RasterFetch(format!("host limiter closed: {e}"))
                })?;
                self.source.read_window(locator, geometry).await
            },
        )
        .await?;

        debug!(
            width = window.width(),
            height = window.height(),
            valid = window.valid_count(),
            "Band window read"
        );
        Ok(window)
    }

    /// Red and NIR are read concurrently; the first failure cancels the other read
    pub async fn fetch_bands(&self, scene: &SatelliteScene, geometry: &FieldGeometry) -> Result<BandPair> {
        let (red, nir) = tokio::try_join!(
            self.fetch_band(&scene.red_href, geometry),
            self.fetch_band(&scene.nir_href, geometry)
        )?;
        Ok(BandPair { red, nir })
    }
}
