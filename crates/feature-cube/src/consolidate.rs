//! Feature consolidation: merge layer lists into one cube.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::info;

use crate::error::{FeatureError, Result};
use crate::layer::{FeatureCube, FlattenedLayer};

/// Merge every layer of every list into a [`FeatureCube`].
///
/// Band names must be unique across all lists, and every layer must share
/// the grid of the alphabetically first band, which also becomes the cube's
/// grid. Layers are keyed by name, so the result does not depend on list
/// order.
pub fn merge<I>(layer_lists: I) -> Result<FeatureCube>
where
    I: IntoIterator<Item = Vec<FlattenedLayer>>,
{
    let mut layers = BTreeMap::new();

    for layer in layer_lists.into_iter().flatten() {
        match layers.entry(layer.name().to_string()) {
            Entry::Occupied(entry) => {
                return Err(FeatureError::DuplicateBandName(entry.key().clone()));
            }
            Entry::Vacant(entry) => {
                entry.insert(layer);
            }
        }
    }

    let geobox = layers
        .values()
        .next()
        .map(|first| first.geobox().clone())
        .ok_or(FeatureError::NoLayers)?;

    if let Some(layer) = layers.values().find(|l| !l.geobox().same_grid(&geobox)) {
        return Err(FeatureError::grid_mismatch(layer.name(), &geobox, layer.geobox()));
    }

    info!(bands = layers.len(), grid = %geobox, "Merged feature cube");

    Ok(FeatureCube::from_checked(geobox, layers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crop_common::{Crs, GeoBox};

    fn grid() -> GeoBox {
        GeoBox::new(Crs::EASE_GRID_2, 2, 1, (10.0, -10.0), (0.0, 10.0))
    }

    fn layer(name: &str) -> FlattenedLayer {
        FlattenedLayer::new(name, grid(), vec![1.0, 2.0]).unwrap()
    }

    #[test]
    fn test_merge_flattens_all_lists() {
        let cube = merge(vec![
            vec![layer("blue_s2_y1"), layer("NDVI_s2_y1")],
            vec![],
            vec![layer("slope")],
        ])
        .unwrap();

        assert_eq!(cube.len(), 3);
        assert_eq!(cube.band_names().collect::<Vec<_>>(), vec!["NDVI_s2_y1", "blue_s2_y1", "slope"]);
        assert!(cube.geobox().same_grid(&grid()));
    }

    #[test]
    fn test_merge_is_order_independent() {
        let a = || vec![layer("bs_mean_b1"), layer("pv_mean_b1")];
        let b = || vec![layer("ndvi_mean_0")];
        assert_eq!(merge(vec![a(), b()]).unwrap(), merge(vec![b(), a()]).unwrap());
    }

    #[test]
    fn test_cube_grid_taken_from_first_band_name() {
        let mut nudged = grid();
        nudged.origin.0 += 1e-7;
        assert!(nudged.same_grid(&grid()));

        let a = || vec![FlattenedLayer::new("slope", nudged.clone(), vec![1.0, 2.0]).unwrap()];
        let b = || vec![layer("bs_mean_b1")];

        let forward = merge(vec![a(), b()]).unwrap();
        let reversed = merge(vec![b(), a()]).unwrap();
        assert_eq!(forward, reversed);
        assert_eq!(forward.geobox(), &grid());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = merge(vec![vec![layer("blue_s2_y1")], vec![layer("blue_s2_y1")]]).unwrap_err();
        assert!(matches!(err, FeatureError::DuplicateBandName(n) if n == "blue_s2_y1"));
    }

    #[test]
    fn test_grid_mismatch_rejected() {
        let shifted = FlattenedLayer::new(
            "slope",
            GeoBox::new(Crs::EASE_GRID_2, 2, 1, (10.0, -10.0), (5.0, 10.0)),
            vec![0.0, 0.0],
        )
        .unwrap();
        let err = merge(vec![vec![layer("bs_mean_b1")], vec![shifted]]).unwrap_err();
        assert!(matches!(err, FeatureError::GridMismatch { name, .. } if name == "slope"));
    }

    #[test]
    fn test_nothing_to_merge() {
        assert!(matches!(merge(Vec::<Vec<FlattenedLayer>>::new()), Err(FeatureError::NoLayers)));
        assert!(matches!(merge(vec![vec![]]), Err(FeatureError::NoLayers)));
    }
}
