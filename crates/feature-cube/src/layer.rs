//! Flattened 2-D feature layers and the merged feature cube.

use crop_common::GeoBox;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{FeatureError, Result};

/// A single named (y, x) raster with no time coordinate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlattenedLayer {
    name: String,
    geobox: GeoBox,
    data: Vec<f32>,
}

impl FlattenedLayer {
    pub fn new(name: impl Into<String>, geobox: GeoBox, data: Vec<f32>) -> Result<Self> {
        let name = name.into();
        if data.len() != geobox.len() {
            return Err(FeatureError::shape(format!(
                "layer '{}' has {} cells, grid has {}",
                name,
                data.len(),
                geobox.len()
            )));
        }
        Ok(Self { name, geobox, data })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geobox(&self) -> &GeoBox {
        &self.geobox
    }

    /// Row-major cell values; NaN marks no data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Value at (col, row).
    pub fn get(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.geobox.width || row >= self.geobox.height {
            return None;
        }
        self.data.get(self.geobox.flat_index(col, row)).copied()
    }

    /// Number of cells holding data.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    pub fn stats(&self) -> LayerStats {
        let mut stats = LayerStats {
            name: self.name.clone(),
            valid_pixels: 0,
            min: None,
            max: None,
            mean: None,
        };

        let mut sum = 0.0f64;
        for &v in self.data.iter().filter(|v| !v.is_nan()) {
            stats.valid_pixels += 1;
            sum += v as f64;
            stats.min = Some(stats.min.map_or(v, |m: f32| m.min(v)));
            stats.max = Some(stats.max.map_or(v, |m: f32| m.max(v)));
        }
        if stats.valid_pixels > 0 {
            stats.mean = Some(sum / stats.valid_pixels as f64);
        }
        stats
    }
}

/// Summary statistics for one layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerStats {
    pub name: String,
    pub valid_pixels: usize,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub mean: Option<f64>,
}

/// The merged feature dataset: unique band name to layer, one shared grid.
///
/// Bands are kept sorted by name so the cube does not depend on the order
/// pipelines finished in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureCube {
    geobox: GeoBox,
    layers: BTreeMap<String, FlattenedLayer>,
}

impl FeatureCube {
    /// Only the consolidator builds cubes, after checking grid and names.
    pub(crate) fn from_checked(geobox: GeoBox, layers: BTreeMap<String, FlattenedLayer>) -> Self {
        Self { geobox, layers }
    }

    pub fn geobox(&self) -> &GeoBox {
        &self.geobox
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&FlattenedLayer> {
        self.layers.get(name)
    }

    pub fn band_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    pub fn layers(&self) -> impl Iterator<Item = &FlattenedLayer> {
        self.layers.values()
    }

    /// Fail with every missing name if any expected band is absent.
    pub fn require_bands<S: AsRef<str>>(&self, expected: &[S]) -> Result<()> {
        let missing: Vec<&str> = expected
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| !self.layers.contains_key(*name))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(FeatureError::MissingBand(missing.join(", ")))
        }
    }

    /// One row of features (band name, value) for pixel (col, row).
    pub fn pixel_features(&self, col: usize, row: usize) -> Option<Vec<(&str, f32)>> {
        if col >= self.geobox.width || row >= self.geobox.height {
            return None;
        }
        Some(
            self.layers
                .values()
                .filter_map(|layer| layer.get(col, row).map(|v| (layer.name(), v)))
                .collect(),
        )
    }

    pub fn summary(&self) -> CubeSummary {
        CubeSummary {
            geobox: self.geobox.clone(),
            band_count: self.layers.len(),
            bands: self.layers.values().map(FlattenedLayer::stats).collect(),
        }
    }
}

/// Serializable overview of a cube, without the cell values.
#[derive(Debug, Clone, Serialize)]
pub struct CubeSummary {
    pub geobox: GeoBox,
    pub band_count: usize,
    pub bands: Vec<LayerStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crop_common::Crs;

    fn grid() -> GeoBox {
        GeoBox::new(Crs::EASE_GRID_2, 2, 1, (10.0, -10.0), (0.0, 10.0))
    }

    #[test]
    fn test_layer_shape_checked() {
        assert!(FlattenedLayer::new("slope", grid(), vec![1.0, 2.0]).is_ok());
        assert!(matches!(
            FlattenedLayer::new("slope", grid(), vec![1.0]),
            Err(FeatureError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_layer_stats_skip_nan() {
        let layer = FlattenedLayer::new("bs_mean_b1", grid(), vec![f32::NAN, 4.0]).unwrap();
        let stats = layer.stats();
        assert_eq!(stats.valid_pixels, 1);
        assert_eq!(stats.min, Some(4.0));
        assert_eq!(stats.max, Some(4.0));
        assert_eq!(stats.mean, Some(4.0));
        assert_eq!(layer.get(1, 0), Some(4.0));
        assert_eq!(layer.get(2, 0), None);
    }

    #[test]
    fn test_require_bands_reports_all_missing() {
        let mut layers = BTreeMap::new();
        let slope = FlattenedLayer::new("slope", grid(), vec![1.0, 2.0]).unwrap();
        layers.insert("slope".to_string(), slope);
        let cube = FeatureCube::from_checked(grid(), layers);

        assert!(cube.require_bands(&["slope"]).is_ok());
        match cube.require_bands(&["slope", "ndvi_mean_0", "bs_mean_b1"]) {
            Err(FeatureError::MissingBand(names)) => assert_eq!(names, "ndvi_mean_0, bs_mean_b1"),
            other => panic!("Expected MissingBand, got {:?}", other),
        }
        assert_eq!(cube.pixel_features(1, 0).unwrap(), vec![("slope", 2.0)]);
    }
}
