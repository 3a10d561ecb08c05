//! Data source trait and load requests.
//!
//! The storage/query backend is an external collaborator: anything that can
//! resolve a product, a measurement list, a footprint and a time filter into
//! a [`RasterStack`] on the requested grid implements [`DataSource`].
//! Chunking, lazy evaluation and parallel reads are its own business.

mod memory;

pub use memory::MemorySource;

use async_trait::async_trait;
use crop_common::{BoundingBox, Crs, GeoBox, TimeRange};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::stack::RasterStack;

/// Trait for loading time-indexed raster stacks from a product catalogue.
///
/// Implementations must return every stack of one collection on the same
/// grid (the one implied by the request footprint, or `like` when set);
/// the consolidator rejects anything else.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Resolve a load request into an in-memory stack.
    ///
    /// Errors are propagated unchanged by the pipelines; no retries happen
    /// above this layer.
    async fn load(&self, request: &LoadRequest) -> Result<RasterStack>;
}

/// Resampling method used when the source reprojects onto the output grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    /// Nearest neighbour (preserves exact values, required for bit flags).
    #[default]
    Nearest,
    /// Bilinear interpolation (smooth, for continuous measurements).
    Bilinear,
    /// Cubic interpolation.
    #[serde(alias = "bicubic")]
    Cubic,
    /// Area-weighted average.
    Average,
}

impl std::fmt::Display for Resampling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Bilinear => write!(f, "bilinear"),
            Self::Cubic => write!(f, "cubic"),
            Self::Average => write!(f, "average"),
        }
    }
}

/// Everything a data source needs to produce one stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadRequest {
    /// Product name in the source catalogue (e.g., "gm_s2_annual").
    pub product: String,
    /// Measurements (bands) to load, in output order.
    pub measurements: Vec<String>,
    /// Area to load, in `footprint_crs` units.
    pub footprint: BoundingBox,
    pub footprint_crs: Crs,
    /// Output grid CRS and pixel size.
    pub output_crs: Crs,
    pub resolution: (f64, f64),
    /// Observations to include.
    pub time: TimeRange,
    pub resampling: Resampling,
    /// Load onto exactly this grid instead of deriving one from the footprint.
    pub like: Option<GeoBox>,
    /// Source-specific collection filter (e.g., Landsat "T1").
    pub collection_category: Option<String>,
}

impl LoadRequest {
    pub fn with_resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    pub fn like(mut self, geobox: GeoBox) -> Self {
        self.like = Some(geobox);
        self
    }

    pub fn with_collection_category(mut self, category: impl Into<String>) -> Self {
        self.collection_category = Some(category.into());
        self
    }
}
