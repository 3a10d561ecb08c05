//! Pixel grid ("geobox") definitions shared by every layer of a feature cube.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bbox::BoundingBox;
use crate::crs::Crs;
use crate::error::{CommonError, CommonResult};

/// Fraction of a pixel two grids may disagree by and still count as the same grid.
const GRID_TOLERANCE: f64 = 1e-6;

/// A regular, axis-aligned pixel grid in a given CRS.
///
/// `origin` is the outer corner of pixel (0, 0). For the usual north-up
/// layout `resolution.1` is negative and the origin is the top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoBox {
    pub crs: Crs,
    /// Number of pixels in X
    pub width: usize,
    /// Number of pixels in Y
    pub height: usize,
    /// Pixel size (x, y) in CRS units
    pub resolution: (f64, f64),
    /// Outer corner of the first pixel (x, y)
    pub origin: (f64, f64),
}

impl GeoBox {
    pub fn new(
        crs: Crs,
        width: usize,
        height: usize,
        resolution: (f64, f64),
        origin: (f64, f64),
    ) -> Self {
        Self {
            crs,
            width,
            height,
            resolution,
            origin,
        }
    }

    /// Build the grid that covers `bbox` (in `crs` units) at `resolution`.
    ///
    /// Partial pixels at the far edges are included, so the grid may extend
    /// slightly past the requested extent.
    pub fn from_bbox(bbox: &BoundingBox, crs: Crs, resolution: (f64, f64)) -> CommonResult<Self> {
        bbox.validate()?;
        let (res_x, res_y) = resolution;
        if !(res_x.is_finite() && res_y.is_finite()) || res_x <= 0.0 || res_y == 0.0 {
            return Err(CommonError::invalid_grid(format!(
                "resolution must be (positive, non-zero), got ({res_x}, {res_y})"
            )));
        }

        let width = (bbox.width() / res_x).ceil() as usize;
        let height = (bbox.height() / res_y.abs()).ceil() as usize;
        let origin_y = if res_y < 0.0 { bbox.max_y } else { bbox.min_y };

        Ok(Self::new(crs, width, height, resolution, (bbox.min_x, origin_y)))
    }

    /// Calculate the bounding box of this grid.
    pub fn bbox(&self) -> BoundingBox {
        let far_x = self.origin.0 + self.width as f64 * self.resolution.0;
        let far_y = self.origin.1 + self.height as f64 * self.resolution.1;

        BoundingBox {
            min_x: self.origin.0.min(far_x),
            min_y: self.origin.1.min(far_y),
            max_x: self.origin.0.max(far_x),
            max_y: self.origin.1.max(far_y),
        }
    }

    /// Raster shape as (rows, cols).
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Total number of pixels.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Row-major index of pixel (col, row).
    pub fn flat_index(&self, col: usize, row: usize) -> usize {
        row * self.width + col
    }

    /// Whether two grids describe the same pixels: same CRS and shape, and
    /// resolution/origin equal to within a millionth of a pixel.
    pub fn same_grid(&self, other: &GeoBox) -> bool {
        if self.crs != other.crs || self.width != other.width || self.height != other.height {
            return false;
        }

        let tol_x = self.resolution.0.abs() * GRID_TOLERANCE;
        let tol_y = self.resolution.1.abs() * GRID_TOLERANCE;

        (self.resolution.0 - other.resolution.0).abs() <= tol_x
            && (self.resolution.1 - other.resolution.1).abs() <= tol_y
            && (self.origin.0 - other.origin.0).abs() <= tol_x
            && (self.origin.1 - other.origin.1).abs() <= tol_y
    }
}

impl fmt::Display for GeoBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}x{} @ ({}, {}) origin ({}, {})",
            self.crs,
            self.width,
            self.height,
            self.resolution.0,
            self.resolution.1,
            self.origin.0,
            self.origin.1
        )
    }
}
