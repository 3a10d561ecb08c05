//! Per-pixel geometric median ("geomedian") over time.
//!
//! For every pixel, the observations of the selected bands form points in
//! band space; the geomedian is the point minimising the summed Euclidean
//! distance to them, found with Weiszfeld iterations. Observations with any
//! missing band are left out, so cloud-masked scenes do not pull the result.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::stats::nan_median;
use super::Reducer;
use crate::error::{FeatureError, Result};
use crate::stack::{Band, RasterStack};

/// Iteration limits for the Weiszfeld solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeomedianConfig {
    /// Maximum number of Weiszfeld iterations per pixel.
    pub max_iterations: usize,
    /// Stop once an update moves the estimate by less than this fraction of its norm.
    pub tolerance: f64,
}

impl Default for GeomedianConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-6,
        }
    }
}

/// Geomedian over every band of the stack.
pub fn geomedian(stack: &RasterStack, config: &GeomedianConfig) -> Result<RasterStack> {
    Geomedian::new(*config).reduce(stack)
}

/// Collapsing reducer computing the geomedian of a band subset.
///
/// Bands outside the subset (e.g., MAD statistics shipped alongside
/// reflectances) are reduced with a per-pixel median instead.
#[derive(Debug, Clone, Default)]
pub struct Geomedian {
    bands: Option<Vec<String>>,
    config: GeomedianConfig,
}

impl Geomedian {
    /// Geomedian across all bands.
    pub fn new(config: GeomedianConfig) -> Self {
        Self { bands: None, config }
    }

    /// Geomedian across the named bands only.
    pub fn over<S: Into<String>>(bands: impl IntoIterator<Item = S>, config: GeomedianConfig) -> Self {
        Self {
            bands: Some(bands.into_iter().map(Into::into).collect()),
            config,
        }
    }
}

impl Reducer for Geomedian {
    fn reduce(&self, stack: &RasterStack) -> Result<RasterStack> {
        if !stack.has_time() {
            return Ok(stack.clone());
        }

        if let Some(wanted) = &self.bands {
            if let Some(absent) = wanted.iter().find(|b| stack.band(b).is_none()) {
                return Err(FeatureError::BandNotFound(absent.clone()));
            }
        }

        let in_geomedian = |band: &Band| {
            self.bands
                .as_ref()
                .map_or(true, |wanted| wanted.iter().any(|w| *w == band.name))
        };

        let spectral: Vec<&Band> = stack.bands().iter().filter(|b| in_geomedian(b)).collect();
        let pixels = stack.geobox().len();
        let steps = stack.steps();
        let config = self.config;

        let per_pixel: Vec<Vec<f32>> = (0..pixels)
            .into_par_iter()
            .map(|px| {
                let observations: Vec<Vec<f64>> = (0..steps)
                    .filter_map(|t| {
                        spectral
                            .iter()
                            .map(|band| {
                                let v = band.planes[t][px];
                                (!band.is_missing(v)).then_some(v as f64)
                            })
                            .collect::<Option<Vec<f64>>>()
                    })
                    .collect();
                weiszfeld(&observations, spectral.len(), &config)
            })
            .collect();

        let mut spectral_planes: Vec<Vec<f32>> = vec![Vec::with_capacity(pixels); spectral.len()];
        for point in &per_pixel {
            for (plane, value) in spectral_planes.iter_mut().zip(point) {
                plane.push(*value);
            }
        }
        let mut spectral_planes = spectral_planes.into_iter();

        let mut scratch = Vec::with_capacity(steps);
        let bands = stack
            .bands()
            .iter()
            .map(|band| {
                let plane = if in_geomedian(band) {
                    spectral_planes.next().unwrap_or_default()
                } else {
                    (0..pixels)
                        .map(|px| {
                            scratch.clear();
                            scratch.extend(
                                band.planes
                                    .iter()
                                    .map(|p| p[px])
                                    .filter(|v| !band.is_missing(*v)),
                            );
                            nan_median(&mut scratch)
                        })
                        .collect()
                };
                Band::new(&band.name, vec![plane])
            })
            .collect();

        stack.collapsed(bands)
    }
}

/// Weiszfeld iterations from the coordinate-wise mean. Returns NaN in
/// every dimension when there are no complete observations.
fn weiszfeld(points: &[Vec<f64>], dims: usize, config: &GeomedianConfig) -> Vec<f32> {
    if points.is_empty() {
        return vec![f32::NAN; dims];
    }

    let n = points.len() as f64;
    let mut estimate: Vec<f64> = (0..dims)
        .map(|d| points.iter().map(|p| p[d]).sum::<f64>() / n)
        .collect();

    for _ in 0..config.max_iterations {
        let mut numerator = vec![0.0f64; dims];
        let mut denominator = 0.0f64;

        for point in points {
            let dist = distance(point, &estimate);
            // A point sitting on the estimate has unbounded weight; skip it.
            if dist < 1e-12 {
                continue;
            }
            let w = 1.0 / dist;
            for (acc, x) in numerator.iter_mut().zip(point) {
                *acc += w * x;
            }
            denominator += w;
        }

        if denominator == 0.0 {
            break;
        }

        let next: Vec<f64> = numerator.iter().map(|v| v / denominator).collect();
        let step = distance(&next, &estimate);
        let scale = norm(&next).max(1.0);
        estimate = next;

        if step < config.tolerance * scale {
            break;
        }
    }

    estimate.into_iter().map(|v| v as f32).collect()
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn norm(a: &[f64]) -> f64 {
    a.iter().map(|x| x * x).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use crop_common::{Crs, GeoBox};

    fn stack(red: Vec<f32>, nir: Vec<f32>, smad: Vec<f32>) -> RasterStack {
        let times = (0..red.len() as u32)
            .map(|d| Utc.with_ymd_and_hms(2020, 1, d + 1, 0, 0, 0).unwrap())
            .collect();
        let planes = |v: Vec<f32>| v.into_iter().map(|x| vec![x]).collect();
        RasterStack::new(
            GeoBox::new(Crs::EASE_GRID_2, 1, 1, (10.0, -10.0), (0.0, 10.0)),
            Some(times),
            vec![
                Band::new("red", planes(red)),
                Band::new("nir", planes(nir)),
                Band::new("smad", planes(smad)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_single_observation_is_its_own_geomedian() {
        let input = stack(vec![0.2], vec![0.5], vec![0.01]);
        let out = geomedian(&input, &GeomedianConfig::default()).unwrap();
        assert!(!out.has_time());
        assert_eq!(out.band("red").unwrap().planes[0], vec![0.2]);
        assert_eq!(out.band("nir").unwrap().planes[0], vec![0.5]);
    }

    #[test]
    fn test_outlier_resistance() {
        // Four clustered observations and one cloud-bright outlier.
        let input = stack(
            vec![100.0, 101.0, 99.0, 100.0, 5000.0],
            vec![300.0, 299.0, 301.0, 300.0, 6000.0],
            vec![0.0; 5],
        );
        let out = Geomedian::over(["red", "nir"], GeomedianConfig::default())
            .reduce(&input)
            .unwrap();

        let red = out.band("red").unwrap().planes[0][0];
        let nir = out.band("nir").unwrap().planes[0][0];
        assert!((red - 100.0).abs() < 2.0, "red = {}", red);
        assert!((nir - 300.0).abs() < 2.0, "nir = {}", nir);
    }

    #[test]
    fn test_incomplete_observations_are_skipped() {
        let input = stack(
            vec![10.0, f32::NAN, 10.0],
            vec![20.0, 9999.0, 20.0],
            vec![1.0, 2.0, 3.0],
        );
        let out = Geomedian::over(["red", "nir"], GeomedianConfig::default())
            .reduce(&input)
            .unwrap();

        assert_eq!(out.band("nir").unwrap().planes[0][0], 20.0);
        // Bands outside the subset fall back to the median.
        assert_eq!(out.band("smad").unwrap().planes[0][0], 2.0);
    }

    #[test]
    fn test_all_missing_gives_nan() {
        let input = stack(vec![f32::NAN, f32::NAN], vec![1.0, 2.0], vec![0.0, 0.0]);
        let out = Geomedian::over(["red", "nir"], GeomedianConfig::default())
            .reduce(&input)
            .unwrap();
        assert!(out.band("red").unwrap().planes[0][0].is_nan());
        assert!(out.band("nir").unwrap().planes[0][0].is_nan());
    }

    #[test]
    fn test_unknown_band_rejected() {
        let input = stack(vec![1.0], vec![1.0], vec![1.0]);
        let err = Geomedian::over(["swir_1"], GeomedianConfig::default())
            .reduce(&input)
            .unwrap_err();
        assert!(matches!(err, FeatureError::BandNotFound(b) if b == "swir_1"));
    }
}
