//! In-memory raster cubes.
//!
//! A [`RasterStack`] holds named bands on one [`GeoBox`], optionally indexed
//! by time. Every band stores one row-major plane per time step (exactly one
//! plane when the stack has no time axis). NaN is the in-memory "no data"
//! value; a band may also carry the sentinel its source used, which
//! [`RasterStack::recode_nodata`] turns into NaN.

use chrono::{DateTime, Utc};
use crop_common::GeoBox;
use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, Result};

/// One named measurement across all time steps of a stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    /// Sentinel the source used for missing cells, if any.
    #[serde(default)]
    pub nodata: Option<f32>,
    /// One row-major plane per time step.
    pub planes: Vec<Vec<f32>>,
}

impl Band {
    pub fn new(name: impl Into<String>, planes: Vec<Vec<f32>>) -> Self {
        Self {
            name: name.into(),
            nodata: None,
            planes,
        }
    }

    pub fn with_nodata(mut self, nodata: f32) -> Self {
        self.nodata = Some(nodata);
        self
    }

    /// Whether a cell value counts as missing for this band.
    #[inline]
    pub fn is_missing(&self, value: f32) -> bool {
        value.is_nan() || self.nodata.is_some_and(|nd| value == nd)
    }

    pub fn plane(&self, step: usize) -> Option<&[f32]> {
        self.planes.get(step).map(Vec::as_slice)
    }
}

/// A time-indexed (or timeless) multi-band raster on a single grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StackParts")]
pub struct RasterStack {
    geobox: GeoBox,
    times: Option<Vec<DateTime<Utc>>>,
    bands: Vec<Band>,
}

/// Unvalidated stack contents, as read from disk.
#[derive(Debug, Clone, Deserialize)]
pub struct StackParts {
    pub geobox: GeoBox,
    #[serde(default)]
    pub times: Option<Vec<DateTime<Utc>>>,
    pub bands: Vec<Band>,
}

impl TryFrom<StackParts> for RasterStack {
    type Error = FeatureError;

    fn try_from(parts: StackParts) -> Result<Self> {
        RasterStack::new(parts.geobox, parts.times, parts.bands)
    }
}

impl RasterStack {
    /// Build a stack, checking every band has one full plane per time step
    /// and that band names are unique.
    pub fn new(
        geobox: GeoBox,
        times: Option<Vec<DateTime<Utc>>>,
        bands: Vec<Band>,
    ) -> Result<Self> {
        let steps = times.as_ref().map_or(1, Vec::len);
        let pixels = geobox.len();

        for (i, band) in bands.iter().enumerate() {
            if bands[..i].iter().any(|b| b.name == band.name) {
                return Err(FeatureError::DuplicateBandName(band.name.clone()));
            }
            if band.planes.len() != steps {
                return Err(FeatureError::shape(format!(
                    "band '{}' has {} planes, expected {}",
                    band.name,
                    band.planes.len(),
                    steps
                )));
            }
            if let Some(plane) = band.planes.iter().find(|p| p.len() != pixels) {
                return Err(FeatureError::shape(format!(
                    "band '{}' plane has {} cells, grid has {}",
                    band.name,
                    plane.len(),
                    pixels
                )));
            }
        }

        Ok(Self {
            geobox,
            times,
            bands,
        })
    }

    pub fn geobox(&self) -> &GeoBox {
        &self.geobox
    }

    /// Timestamps, or `None` when the stack has no time axis.
    pub fn times(&self) -> Option<&[DateTime<Utc>]> {
        self.times.as_deref()
    }

    pub fn has_time(&self) -> bool {
        self.times.is_some()
    }

    /// Number of planes per band: the time axis length, or 1 without one.
    pub fn steps(&self) -> usize {
        self.times.as_ref().map_or(1, Vec::len)
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn band(&self, name: &str) -> Option<&Band> {
        self.bands.iter().find(|b| b.name == name)
    }

    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn into_bands(self) -> Vec<Band> {
        self.bands
    }

    /// A new stack on the same grid and time axis with different bands.
    pub fn with_bands(&self, bands: Vec<Band>) -> Result<Self> {
        Self::new(self.geobox.clone(), self.times.clone(), bands)
    }

    /// A timeless stack on the same grid holding the given single-plane bands.
    pub fn collapsed(&self, bands: Vec<Band>) -> Result<Self> {
        Self::new(self.geobox.clone(), None, bands)
    }

    /// Sub-stack holding only the given time steps, in the given order.
    pub fn select_steps(&self, steps: &[usize]) -> Result<Self> {
        let times = self
            .times
            .as_ref()
            .ok_or_else(|| FeatureError::shape("cannot select time steps from a timeless stack"))?;

        if let Some(bad) = steps.iter().find(|&&s| s >= times.len()) {
            return Err(FeatureError::shape(format!(
                "time step {} out of range for {} steps",
                bad,
                times.len()
            )));
        }

        let bands = self
            .bands
            .iter()
            .map(|band| Band {
                name: band.name.clone(),
                nodata: band.nodata,
                planes: steps.iter().map(|&s| band.planes[s].clone()).collect(),
            })
            .collect();

        Ok(Self {
            geobox: self.geobox.clone(),
            times: Some(steps.iter().map(|&s| times[s]).collect()),
            bands,
        })
    }

    /// Sub-stack holding only the named measurements, in the given order.
    pub fn select_bands<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let bands = names
            .iter()
            .map(|name| {
                self.band(name.as_ref())
                    .cloned()
                    .ok_or_else(|| FeatureError::BandNotFound(name.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        self.with_bands(bands)
    }

    /// Rename every band through `rename`.
    pub fn rename_bands(mut self, rename: impl Fn(&str) -> String) -> Result<Self> {
        for band in &mut self.bands {
            band.name = rename(&band.name);
        }
        Self::new(self.geobox, self.times, self.bands)
    }

    /// Replace each band's source sentinel with NaN and forget the sentinel.
    pub fn recode_nodata(mut self) -> Self {
        for band in &mut self.bands {
            if let Some(nodata) = band.nodata.take() {
                replace_value(&mut band.planes, nodata);
            }
        }
        self
    }

    /// Replace every cell equal to `value` with NaN in all bands.
    pub fn mask_value(mut self, value: f32) -> Self {
        for band in &mut self.bands {
            replace_value(&mut band.planes, value);
            if band.nodata == Some(value) {
                band.nodata = None;
            }
        }
        self
    }

    /// Drop a time axis of length one.
    ///
    /// A timeless stack is returned unchanged; an empty time axis or one with
    /// several steps cannot be squeezed.
    pub fn squeeze_time(self, context: &str) -> Result<Self> {
        match self.times.as_ref().map(Vec::len) {
            None | Some(1) => Ok(Self {
                geobox: self.geobox,
                times: None,
                bands: self.bands,
            }),
            Some(0) => Err(FeatureError::EmptyTimeAxis {
                label: context.to_string(),
            }),
            Some(steps) => Err(FeatureError::ResidualTimeAxis {
                context: context.to_string(),
                steps,
            }),
        }
    }
}

fn replace_value(planes: &mut [Vec<f32>], value: f32) {
    for plane in planes {
        for cell in plane.iter_mut().filter(|c| **c == value) {
            *cell = f32::NAN;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crop_common::Crs;

    fn grid() -> GeoBox {
        GeoBox::new(Crs::EASE_GRID_2, 2, 2, (10.0, -10.0), (0.0, 20.0))
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, d, 0, 0, 0).unwrap()
    }

    fn two_step_stack() -> RasterStack {
        RasterStack::new(
            grid(),
            Some(vec![day(1), day(2)]),
            vec![
                Band::new("red", vec![vec![1.0; 4], vec![2.0; 4]]),
                Band::new("nir", vec![vec![3.0; 4], vec![4.0; 4]]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_new_validates_shapes() {
        let wrong_planes = RasterStack::new(
            grid(),
            Some(vec![day(1), day(2)]),
            vec![Band::new("red", vec![vec![1.0; 4]])],
        );
        assert!(matches!(wrong_planes, Err(FeatureError::ShapeMismatch(_))));

        let wrong_cells = RasterStack::new(grid(), None, vec![Band::new("red", vec![vec![1.0; 3]])]);
        assert!(matches!(wrong_cells, Err(FeatureError::ShapeMismatch(_))));

        let duplicate = RasterStack::new(
            grid(),
            None,
            vec![
                Band::new("red", vec![vec![1.0; 4]]),
                Band::new("red", vec![vec![1.0; 4]]),
            ],
        );
        assert!(matches!(duplicate, Err(FeatureError::DuplicateBandName(_))));
    }

    #[test]
    fn test_select_steps_and_bands() {
        let stack = two_step_stack();

        let second = stack.select_steps(&[1]).unwrap();
        assert_eq!(second.times().unwrap(), &[day(2)]);
        assert_eq!(second.band("red").unwrap().planes, vec![vec![2.0; 4]]);

        let nir = stack.select_bands(&["nir"]).unwrap();
        assert_eq!(nir.band_names(), vec!["nir"]);
        assert!(matches!(
            stack.select_bands(&["swir_1"]),
            Err(FeatureError::BandNotFound(_))
        ));
        assert!(stack.select_steps(&[2]).is_err());
    }

    #[test]
    fn test_recode_nodata() {
        let stack = RasterStack::new(
            grid(),
            None,
            vec![Band::new("slope", vec![vec![1.0, -9999.0, 3.0, -9999.0]]).with_nodata(-9999.0)],
        )
        .unwrap()
        .recode_nodata();

        let band = stack.band("slope").unwrap();
        assert!(band.nodata.is_none());
        assert_eq!(band.planes[0][0], 1.0);
        assert!(band.planes[0][1].is_nan());
        assert!(band.planes[0][3].is_nan());
    }

    #[test]
    fn test_squeeze_time() {
        let single = two_step_stack().select_steps(&[0]).unwrap();
        let squeezed = single.squeeze_time("single").unwrap();
        assert!(!squeezed.has_time());
        assert_eq!(squeezed.steps(), 1);

        let err = two_step_stack().squeeze_time("both").unwrap_err();
        assert!(matches!(err, FeatureError::ResidualTimeAxis { steps: 2, .. }));

        let empty = two_step_stack().select_steps(&[]).unwrap();
        assert!(matches!(
            empty.squeeze_time("none"),
            Err(FeatureError::EmptyTimeAxis { .. })
        ));
    }

    #[test]
    fn test_deserialize_validates() {
        let json = serde_json::json!({
            "geobox": grid(),
            "times": ["2020-01-01T00:00:00Z"],
            "bands": [{ "name": "water", "planes": [[0.0, 128.0, 0.0, 64.0]] }]
        });
        let stack: RasterStack = serde_json::from_value(json).unwrap();
        assert_eq!(stack.steps(), 1);

        let bad = serde_json::json!({
            "geobox": grid(),
            "bands": [{ "name": "water", "planes": [[0.0]] }]
        });
        assert!(serde_json::from_value::<RasterStack>(bad).is_err());
    }
}
