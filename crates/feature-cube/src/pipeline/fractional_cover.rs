//! Landsat fractional cover features, masked to clear and dry pixels.

use async_trait::async_trait;
use chrono::Duration;
use crop_common::WindowSpec;
use tracing::{debug, info};

use super::{ProductPipeline, FC_MEASUREMENTS};
use crate::config::BaselineQuery;
use crate::error::{FeatureError, Result};
use crate::layer::FlattenedLayer;
use crate::mask::{mask_stack, ValidityPredicate, WofsClearDry};
use crate::reduce::StatReducer;
use crate::source::{DataSource, Resampling};
use crate::window::{flatten_windows, reduce_over_windows};

/// Landsat collection the cover and mask products are restricted to.
pub const LANDSAT_COLLECTION: &str = "T1";

/// Fractional cover reduced over windows after WOfS masking.
///
/// The water observation product is loaded onto the cover product's grid
/// with nearest resampling, so bit flags are never interpolated.
#[derive(Debug, Clone)]
pub struct FractionalCoverPipeline {
    windows: WindowSpec,
    reducer: StatReducer,
    mask_tolerance: Duration,
}

impl FractionalCoverPipeline {
    pub fn new(windows: WindowSpec, reducer: StatReducer, mask_tolerance: Duration) -> Self {
        Self {
            windows,
            reducer,
            mask_tolerance,
        }
    }
}

#[async_trait]
impl ProductPipeline for FractionalCoverPipeline {
    fn name(&self) -> &str {
        "fractional_cover"
    }

    async fn run(
        &self,
        source: &dyn DataSource,
        baseline: &BaselineQuery,
    ) -> Result<Vec<FlattenedLayer>> {
        let span = self
            .windows
            .span()
            .ok_or_else(|| FeatureError::config("fractional_cover: no windows configured"))?;

        let request = baseline
            .request("fc_ls", FC_MEASUREMENTS, span)
            .with_resampling(Resampling::Bilinear)
            .with_collection_category(LANDSAT_COLLECTION);
        let cover = source.load(&request).await?.recode_nodata();

        let predicate = WofsClearDry;
        let mask_request = baseline
            .request("wofs_ls", predicate.measurements(), span)
            .with_resampling(Resampling::Nearest)
            .with_collection_category(LANDSAT_COLLECTION)
            .like(cover.geobox().clone());
        let wofs = source.load(&mask_request).await?;
        debug!(
            cover_steps = cover.steps(),
            mask_steps = wofs.steps(),
            "Loaded cover and water observations"
        );

        let masked = mask_stack(&cover, &wofs, &predicate, self.mask_tolerance)?;
        let windows = reduce_over_windows(&masked, &self.windows, &self.reducer, self.reducer.name())?;
        let layers = flatten_windows(windows);

        info!(
            pipeline = self.name(),
            reducer = self.reducer.name(),
            layers = layers.len(),
            "Pipeline complete"
        );
        Ok(layers)
    }
}
