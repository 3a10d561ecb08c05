//! Catalogue of pre-loaded stacks served from memory.

use async_trait::async_trait;
use crop_common::GeoBox;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use super::{DataSource, LoadRequest};
use crate::error::{FeatureError, Result};
use crate::stack::RasterStack;

/// A [`DataSource`] over whole product stacks held in memory.
///
/// Loads subset the stored stack by measurement and time. No reprojection
/// or spatial cropping is done: the stored stack must already sit on the
/// requested grid (`like` when set, otherwise the footprint at the requested
/// resolution), and requests that would need resampling fail.
/// Every request is recorded so callers can inspect what was asked for.
#[derive(Debug, Default)]
pub struct MemorySource {
    products: HashMap<String, RasterStack>,
    requests: Mutex<Vec<LoadRequest>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(mut self, product: impl Into<String>, stack: RasterStack) -> Self {
        self.insert(product, stack);
        self
    }

    pub fn insert(&mut self, product: impl Into<String>, stack: RasterStack) {
        self.products.insert(product.into(), stack);
    }

    /// Read every `<product>.json` stack file in `dir`.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut source = Self::new();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(product) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let text = std::fs::read_to_string(&path)?;
            let stack: RasterStack = serde_json::from_str(&text).map_err(|e| {
                FeatureError::data_source(format!("{}: {}", path.display(), e))
            })?;

            debug!(product = %product, steps = stack.steps(), bands = ?stack.band_names(), "Loaded stack file");
            source.insert(product, stack);
        }

        info!(dir = %dir.display(), products = source.products.len(), "Loaded product catalogue");
        Ok(source)
    }

    pub fn products(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.products.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Requests seen so far, in arrival order.
    pub fn requests(&self) -> Vec<LoadRequest> {
        self.requests
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn load(&self, request: &LoadRequest) -> Result<RasterStack> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }

        let stored = self.products.get(&request.product).ok_or_else(|| {
            FeatureError::data_source(format!("product '{}' not in catalogue", request.product))
        })?;

        if stored.geobox().crs != request.output_crs {
            return Err(FeatureError::data_source(format!(
                "product '{}' is stored in {}, cannot reproject to {}",
                request.product,
                stored.geobox().crs,
                request.output_crs
            )));
        }

        let expected = match &request.like {
            Some(like) => like.clone(),
            None => {
                if request.footprint_crs != request.output_crs {
                    return Err(FeatureError::data_source(format!(
                        "footprint for '{}' is in {}, cannot reproject to {}",
                        request.product, request.footprint_crs, request.output_crs
                    )));
                }
                GeoBox::from_bbox(&request.footprint, request.output_crs, request.resolution)?
            }
        };

        if !stored.geobox().same_grid(&expected) {
            return Err(FeatureError::grid_mismatch(
                &request.product,
                &expected,
                stored.geobox(),
            ));
        }

        let selected = stored.select_bands(&request.measurements)?;

        let stack = match selected.times() {
            Some(times) => {
                let steps: Vec<usize> = times
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| request.time.contains(t))
                    .map(|(i, _)| i)
                    .collect();
                selected.select_steps(&steps)?
            }
            None => selected,
        };

        debug!(
            product = %request.product,
            time = %request.time,
            steps = stack.steps(),
            "Served stack from memory"
        );

        Ok(stack)
    }
}
