//! Validity masking.
//!
//! A [`ValidityMask`] is derived from a companion product (e.g., WOfS water
//! observations) on the target's grid and time axis, then applied by
//! setting every unusable pixel-at-time to NaN. Scenes are never dropped:
//! the masked stack has exactly the target's time steps.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::error::{FeatureError, Result};
use crate::stack::{Band, RasterStack};
use crate::window::nearest_index;

/// Decides whether a pixel-at-time is usable from the mask product's values.
pub trait ValidityPredicate: Send + Sync {
    /// Measurements the predicate reads, in the order passed to `is_valid`.
    fn measurements(&self) -> Vec<String>;

    /// Whether the pixel is usable given one value per measurement.
    fn is_valid(&self, values: &[f32]) -> bool;
}

/// WOfS "clear and dry": the water observation byte is exactly zero.
///
/// Any set bit (water, cloud, shadow, terrain, no contiguity) marks the
/// pixel unusable, as does a missing value.
#[derive(Debug, Clone, Copy, Default)]
pub struct WofsClearDry;

impl WofsClearDry {
    pub const MEASUREMENT: &'static str = "water";
}

impl ValidityPredicate for WofsClearDry {
    fn measurements(&self) -> Vec<String> {
        vec![Self::MEASUREMENT.to_string()]
    }

    fn is_valid(&self, values: &[f32]) -> bool {
        values.first().is_some_and(|&water| water == 0.0)
    }
}

/// Boolean validity per target time step and pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidityMask {
    times: Vec<DateTime<Utc>>,
    valid: Vec<Vec<bool>>,
}

impl ValidityMask {
    /// Evaluate `predicate` on `mask` for each of `target`'s time steps.
    ///
    /// Target steps are matched to the nearest mask step; if that is further
    /// away than `tolerance`, the whole step is marked invalid.
    pub fn derive(
        target: &RasterStack,
        mask: &RasterStack,
        predicate: &dyn ValidityPredicate,
        tolerance: Duration,
    ) -> Result<Self> {
        if !mask.geobox().same_grid(target.geobox()) {
            return Err(FeatureError::grid_mismatch(
                "validity mask",
                target.geobox(),
                mask.geobox(),
            ));
        }

        let target_times = target
            .times()
            .ok_or_else(|| FeatureError::shape("cannot mask a stack without a time axis"))?;
        let mask_times = mask
            .times()
            .ok_or_else(|| FeatureError::shape("validity mask has no time axis"))?;

        let inputs: Vec<&Band> = predicate
            .measurements()
            .iter()
            .map(|name| {
                mask.band(name)
                    .ok_or_else(|| FeatureError::BandNotFound(name.clone()))
            })
            .collect::<Result<_>>()?;

        let pixels = target.geobox().len();
        let mut values = vec![0.0f32; inputs.len()];
        let mut valid = Vec::with_capacity(target_times.len());

        for at in target_times {
            let matched = nearest_index(mask_times, *at)
                .filter(|&i| (mask_times[i] - *at).abs() <= tolerance);

            let Some(step) = matched else {
                warn!(time = %at, "No mask observation for time step, masking it entirely");
                valid.push(vec![false; pixels]);
                continue;
            };

            let row = (0..pixels)
                .map(|px| {
                    for (slot, band) in values.iter_mut().zip(&inputs) {
                        *slot = band.planes[step][px];
                    }
                    predicate.is_valid(&values)
                })
                .collect();
            valid.push(row);
        }

        Ok(Self {
            times: target_times.to_vec(),
            valid,
        })
    }

    pub fn steps(&self) -> usize {
        self.valid.len()
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    pub fn is_valid(&self, step: usize, pixel: usize) -> bool {
        self.valid
            .get(step)
            .and_then(|row| row.get(pixel))
            .copied()
            .unwrap_or(false)
    }

    /// Usable pixels in one step.
    pub fn valid_count(&self, step: usize) -> usize {
        self.valid
            .get(step)
            .map_or(0, |row| row.iter().filter(|v| **v).count())
    }

    /// Set every invalid pixel-at-time of `target` to NaN.
    pub fn apply(&self, target: &RasterStack) -> Result<RasterStack> {
        if target.times() != Some(self.times.as_slice()) {
            return Err(FeatureError::shape(
                "validity mask time axis does not match the target stack",
            ));
        }

        let bands = target
            .bands()
            .iter()
            .map(|band| {
                let planes = band
                    .planes
                    .iter()
                    .zip(&self.valid)
                    .map(|(plane, valid)| {
                        plane
                            .iter()
                            .zip(valid)
                            .map(|(&v, &ok)| if ok { v } else { f32::NAN })
                            .collect()
                    })
                    .collect();
                Band {
                    name: band.name.clone(),
                    nodata: band.nodata,
                    planes,
                }
            })
            .collect();

        target.with_bands(bands)
    }
}

/// Derive a mask from `mask_source` and apply it to `target`.
pub fn mask_stack(
    target: &RasterStack,
    mask_source: &RasterStack,
    predicate: &dyn ValidityPredicate,
    tolerance: Duration,
) -> Result<RasterStack> {
    let mask = ValidityMask::derive(target, mask_source, predicate, tolerance)?;
    let masked = mask.apply(target)?;

    debug!(
        steps = mask.steps(),
        valid = (0..mask.steps()).map(|s| mask.valid_count(s)).sum::<usize>(),
        "Applied validity mask"
    );

    Ok(masked)
}
