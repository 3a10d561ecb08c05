//! Per-pixel statistical reductions over time.

use serde::{Deserialize, Serialize};

use super::Reducer;
use crate::error::Result;
use crate::stack::{Band, RasterStack};

/// Collapse the time axis of every band with `combine`, which receives the
/// non-missing values of one pixel and returns NaN when there are none.
fn collapse_with(stack: &RasterStack, combine: impl Fn(&mut [f32]) -> f32) -> Result<RasterStack> {
    if !stack.has_time() {
        return Ok(stack.clone());
    }

    let pixels = stack.geobox().len();
    let mut scratch = Vec::with_capacity(stack.steps());

    let bands = stack
        .bands()
        .iter()
        .map(|band| {
            let plane = (0..pixels)
                .map(|px| {
                    scratch.clear();
                    scratch.extend(
                        band.planes
                            .iter()
                            .map(|p| p[px])
                            .filter(|v| !band.is_missing(*v)),
                    );
                    combine(&mut scratch)
                })
                .collect();
            Band::new(&band.name, vec![plane])
        })
        .collect();

    stack.collapsed(bands)
}

/// Mean of valid values.
///
/// If all values are missing, returns NaN.
fn nan_mean(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    let sum: f64 = values.iter().map(|&v| v as f64).sum();
    (sum / values.len() as f64) as f32
}

/// Median of valid values, averaging the middle pair for even counts.
///
/// If all values are missing, returns NaN.
pub(crate) fn nan_median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        ((values[mid - 1] as f64 + values[mid] as f64) / 2.0) as f32
    } else {
        values[mid]
    }
}

/// Per-pixel mean over time, skipping missing values.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mean;

impl Reducer for Mean {
    fn reduce(&self, stack: &RasterStack) -> Result<RasterStack> {
        collapse_with(stack, nan_mean)
    }
}

/// Per-pixel median over time, skipping missing values.
#[derive(Debug, Clone, Copy, Default)]
pub struct Median;

impl Reducer for Median {
    fn reduce(&self, stack: &RasterStack) -> Result<RasterStack> {
        collapse_with(stack, nan_median)
    }
}

/// Statistical reducer choice for configurable pipelines.
///
/// Fractional cover defaults to `Mean`: per-window medians are supported but
/// were unstable under chunked evaluation in earlier deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatReducer {
    #[default]
    Mean,
    Median,
}

impl StatReducer {
    /// Name used in flattened band names.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
        }
    }
}

impl Reducer for StatReducer {
    fn reduce(&self, stack: &RasterStack) -> Result<RasterStack> {
        match self {
            Self::Mean => Mean.reduce(stack),
            Self::Median => Median.reduce(stack),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use crop_common::{Crs, GeoBox};

    fn stack(values: Vec<Vec<f32>>) -> RasterStack {
        let times = (0..values.len() as u32)
            .map(|d| Utc.with_ymd_and_hms(2020, 1, d + 1, 0, 0, 0).unwrap())
            .collect();
        RasterStack::new(
            GeoBox::new(Crs::EASE_GRID_2, 2, 1, (30.0, -30.0), (0.0, 30.0)),
            Some(times),
            vec![Band::new("bs", values).with_nodata(-1.0)],
        )
        .unwrap()
    }

    #[test]
    fn test_mean_skips_missing() {
        let input = stack(vec![vec![10.0, f32::NAN], vec![20.0, f32::NAN], vec![-1.0, f32::NAN]]);
        let out = Mean.reduce(&input).unwrap();

        assert!(!out.has_time());
        let plane = &out.band("bs").unwrap().planes[0];
        assert_eq!(plane[0], 15.0);
        assert!(plane[1].is_nan());
        assert!(out.band("bs").unwrap().nodata.is_none());
    }

    #[test]
    fn test_median_odd_and_even() {
        let input = stack(vec![vec![1.0, 1.0], vec![9.0, 3.0], vec![4.0, f32::NAN]]);
        let out = Median.reduce(&input).unwrap();
        let plane = &out.band("bs").unwrap().planes[0];
        assert_eq!(plane[0], 4.0);
        assert_eq!(plane[1], 2.0);
    }

    #[test]
    fn test_stat_reducer_names_and_serde() {
        assert_eq!(StatReducer::default().name(), "mean");
        let parsed: StatReducer = serde_json::from_str("\"median\"").unwrap();
        assert_eq!(parsed, StatReducer::Median);
    }

    #[test]
    fn test_timeless_stack_passes_through() {
        let input = stack(vec![vec![1.0, 2.0]]).squeeze_time("t").unwrap();
        assert_eq!(Mean.reduce(&input).unwrap(), input);
    }
}
