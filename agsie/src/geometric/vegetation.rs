use chrono::{DateTime, Utc};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::commons::basic_functions::round_to_decimals;
use crate::error::{AnalysisError, Result};
use crate::geometric::raster::RasterWindow;

/// Pixels summed per partial. Partials are always added in the same order,
/// so the mean does not depend on thread scheduling.
const CHUNK_PIXELS: usize = 64 * 1024;

/// Mean NDVI over the valid pixels of a field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NdviResult {
    /// In [-1, 1], rounded for reporting
    pub mean: f64,
    pub valid_pixels: usize,
    pub scene_date: DateTime<Utc>,
}

/// NDVI of one pixel, `None` when it cannot be computed
///
/// Reflectances must be finite and non-negative and their sum non-zero; under
/// those conditions the result lies in [-1, 1].
pub fn ndvi_pixel(red: f64, nir: f64) -> Option<f64> {
    if !red.is_finite() || !nir.is_finite() || red < 0.0 || nir < 0.0 {
        return None;
    }
    let denominator = nir + red;
    if denominator == 0.0 {
        return None;
    }
    Some((nir - red) / denominator)
}

/// Mean of `(NIR - RED) / (NIR + RED)` over pixels valid in both windows
///
/// Pixels with a zero denominator are left out of the mean. A window pair
/// without a single usable pixel fails with `NoValidPixels`.
pub fn compute_ndvi(
    red: &RasterWindow,
    nir: &RasterWindow,
    scene_date: DateTime<Utc>,
    decimals: u32,
) -> Result<NdviResult> {
    if red.shape() != nir.shape() {
        return Err(AnalysisError::RasterFetch(format!(
            "red window {:?} and NIR window {:?} differ in shape",
            red.shape(),
            nir.shape()
        )));
    }

    let (sum, count) = partial_sums(red, nir)
        .into_iter()
        .fold((0.0, 0usize), |(s, c), (ps, pc)| (s + ps, c + pc));

    if count == 0 {
        return Err(AnalysisError::NoValidPixels);
    }

    let mean = (sum / count as f64).clamp(-1.0, 1.0);

    Ok(NdviResult {
        mean: round_to_decimals(mean, decimals),
        valid_pixels: count,
        scene_date,
    })
}

fn chunk_sum(red: &RasterWindow, nir: &RasterWindow, start: usize, end: usize) -> (f64, usize) {
    let mut sum = 0.0;
    let mut count = 0;
    for i in start..end {
        if !(red.mask()[i] && nir.mask()[i]) {
            continue;
        }
        if let Some(v) = ndvi_pixel(red.values()[i], nir.values()[i]) {
            sum += v;
            count += 1;
        }
    }
    (sum, count)
}

#[cfg(feature = "rayon")]
fn partial_sums(red: &RasterWindow, nir: &RasterWindow) -> Vec<(f64, usize)> {
    let n = red.values().len();
    (0..n.div_ceil(CHUNK_PIXELS))
        .into_par_iter()
        .map(|k| chunk_sum(red, nir, k * CHUNK_PIXELS, ((k + 1) * CHUNK_PIXELS).min(n)))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn partial_sums(red: &RasterWindow, nir: &RasterWindow) -> Vec<(f64, usize)> {
    let n = red.values().len();
    (0..n.div_ceil(CHUNK_PIXELS))
        .map(|k| chunk_sum(red, nir, k * CHUNK_PIXELS, ((k + 1) * CHUNK_PIXELS).min(n)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_constant_bands() {
        let red = RasterWindow::filled(10, 10, 100.0);
        let nir = RasterWindow::filled(10, 10, 200.0);
        let result = compute_ndvi(&red, &nir, date(), 4).unwrap();
        assert_eq!(result.mean, 0.3333);
        assert_eq!(result.valid_pixels, 100);
        assert_eq!(result.scene_date, date());
    }

    #[test]
    fn test_pixel_range() {
        for (red, nir) in [(0.0, 1.0), (1.0, 0.0), (0.3, 0.7), (5000.0, 1.0), (1e-9, 1e9)] {
            let v = ndvi_pixel(red, nir).unwrap();
            assert!((-1.0..=1.0).contains(&v), "{red} {nir} -> {v}");
        }
        assert_eq!(ndvi_pixel(0.0, 0.0), None);
        assert_eq!(ndvi_pixel(f64::NAN, 1.0), None);
        assert_eq!(ndvi_pixel(-5.0, 10.0), None);
    }

    #[test]
    fn test_zero_denominator_is_excluded() {
        // Two pixels: one 0/0, one with NDVI 0.5
        let red = RasterWindow::new(2, 1, vec![0.0, 1.0], vec![true, true]).unwrap();
        let nir = RasterWindow::new(2, 1, vec![0.0, 3.0], vec![true, true]).unwrap();
        let result = compute_ndvi(&red, &nir, date(), 4).unwrap();
        assert_eq!(result.mean, 0.5);
        assert_eq!(result.valid_pixels, 1);
        assert!(!result.mean.is_nan());
    }

    #[test]
    fn test_masks_intersect() {
        let red = RasterWindow::new(3, 1, vec![1.0, 1.0, 1.0], vec![true, false, true]).unwrap();
        let nir = RasterWindow::new(3, 1, vec![3.0, 9.0, 1.0], vec![true, true, false]).unwrap();
        let result = compute_ndvi(&red, &nir, date(), 4).unwrap();
        assert_eq!(result.valid_pixels, 1);
        assert_eq!(result.mean, 0.5);
    }

    #[test]
    fn test_fully_masked_window() {
        let red = RasterWindow::new(2, 2, vec![100.0; 4], vec![false; 4]).unwrap();
        let nir = RasterWindow::filled(2, 2, 200.0);
        assert_eq!(
            compute_ndvi(&red, &nir, date(), 4),
            Err(AnalysisError::NoValidPixels)
        );

        let empty = RasterWindow::empty();
        assert_eq!(
            compute_ndvi(&empty, &empty, date(), 4),
            Err(AnalysisError::NoValidPixels)
        );
    }

    #[test]
    fn test_all_zero_denominators() {
        let zeros = RasterWindow::filled(3, 3, 0.0);
        assert_eq!(
            compute_ndvi(&zeros, &zeros, date(), 4),
            Err(AnalysisError::NoValidPixels)
        );
    }

    #[test]
    fn test_shape_mismatch() {
        let red = RasterWindow::filled(2, 3, 1.0);
        let nir = RasterWindow::filled(3, 2, 1.0);
        assert!(matches!(
            compute_ndvi(&red, &nir, date(), 4),
            Err(AnalysisError::RasterFetch(_))
        ));
    }

    #[test]
    fn test_large_window_spans_several_chunks() {
        let n = CHUNK_PIXELS * 2 + 17;
        let red = RasterWindow::filled(n, 1, 100.0);
        let nir = RasterWindow::filled(n, 1, 300.0);
        let result = compute_ndvi(&red, &nir, date(), 4).unwrap();
        assert_eq!(result.valid_pixels, n);
        assert_eq!(result.mean, 0.5);
    }
}
