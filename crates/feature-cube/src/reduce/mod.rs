//! Reducer functions applied to each selected window.
//!
//! A reducer maps a [`RasterStack`] to a new one. Collapsing reducers
//! ([`Mean`], [`Median`], [`Geomedian`]) remove the time axis; enriching
//! reducers ([`IndexEnrichment`], [`Identity`]) keep it. The window engine
//! does not tell them apart, it just flattens whatever comes back.

mod geomedian;
mod indices;
mod stats;

pub use geomedian::{geomedian, Geomedian, GeomedianConfig};
pub use indices::{compute_indices, IndexEnrichment, SatelliteProfile, SpectralIndex};
pub use stats::{Mean, Median, StatReducer};

use std::sync::Arc;

use crate::error::Result;
use crate::stack::RasterStack;

/// A pure transform from one stack to another.
pub trait Reducer: Send + Sync {
    fn reduce(&self, stack: &RasterStack) -> Result<RasterStack>;
}

impl<F> Reducer for F
where
    F: Fn(&RasterStack) -> Result<RasterStack> + Send + Sync,
{
    fn reduce(&self, stack: &RasterStack) -> Result<RasterStack> {
        self(stack)
    }
}

/// Pass-through reducer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Reducer for Identity {
    fn reduce(&self, stack: &RasterStack) -> Result<RasterStack> {
        Ok(stack.clone())
    }
}

/// Applies reducers in sequence, each on the previous one's output.
#[derive(Clone, Default)]
pub struct Chain {
    steps: Vec<Arc<dyn Reducer>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, reducer: impl Reducer + 'static) -> Self {
        self.steps.push(Arc::new(reducer));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Reducer for Chain {
    fn reduce(&self, stack: &RasterStack) -> Result<RasterStack> {
        let Some((first, rest)) = self.steps.split_first() else {
            return Ok(stack.clone());
        };
        let mut current = first.reduce(stack)?;
        for step in rest {
            current = step.reduce(&current)?;
        }
        Ok(current)
    }
}

/// Geomedian over the spectral bands, then the crop index set on the
/// collapsed result with the original bands kept.
pub fn geomedian_then_indices(config: GeomedianConfig, profile: SatelliteProfile) -> Chain {
    let spectral = profile.spectral_bands();
    Chain::new()
        .then(Geomedian::over(spectral, config))
        .then(IndexEnrichment::new(SpectralIndex::CROP_SET.to_vec(), profile, true))
}
