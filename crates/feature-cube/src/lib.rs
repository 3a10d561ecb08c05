//! Crop-Type Feature Cube Assembly
//!
//! This crate turns several independently produced satellite and terrain
//! products into one spatially aligned feature cube for a crop-type model:
//!
//! - **Windowing**: carve each product's time axis into labelled windows
//! - **Reduction**: collapse each window with a geomedian, mean or median,
//!   optionally enriched with spectral indices
//! - **Consolidation**: merge every flattened layer onto one grid, with
//!   globally unique band names
//!
//! # Architecture
//!
//! ```text
//! QueryConfig (YAML, validated once)
//!      │
//!      ▼
//! FeatureCollector::collect(source)
//!      │
//!      ├─► GeomedianPipeline (annual)      ─┐
//!      ├─► GeomedianPipeline (semiannual)  ─┤
//!      ├─► MonthlyIndexPipeline            ─┤  DataSource::load
//!      ├─► FractionalCoverPipeline + WOfS  ─┤  reduce_over_windows
//!      └─► SlopePipeline                   ─┘
//!               │
//!               ▼
//!          merge(layer lists) ─► FeatureCube
//! ```
//!
//! # Example
//!
//! ```ignore
//! use feature_cube::{CollectorConfig, FeatureCollector, MemorySource, QueryConfig};
//! use std::sync::Arc;
//!
//! let query = QueryConfig::from_yaml_file("query.yaml")?;
//! let source = Arc::new(MemorySource::from_dir("stacks/")?);
//!
//! let collector = FeatureCollector::from_query(&query, &CollectorConfig::from_env())?;
//! let cube = collector.collect(source).await?;
//!
//! for name in cube.band_names() {
//!     println!("{}", name);
//! }
//! ```

pub mod collector;
pub mod config;
pub mod consolidate;
pub mod error;
pub mod layer;
pub mod mask;
pub mod pipeline;
pub mod reduce;
pub mod source;
pub mod stack;
pub mod window;

// Re-export commonly used types at crate root
pub use collector::{standard_pipelines, FeatureCollector};
pub use config::{BaselineQuery, CollectorConfig, QueryConfig};
pub use consolidate::merge;
pub use error::{FeatureError, Result};
pub use layer::{CubeSummary, FeatureCube, FlattenedLayer, LayerStats};
pub use mask::{mask_stack, ValidityMask, ValidityPredicate, WofsClearDry};
pub use pipeline::ProductPipeline;
pub use reduce::{Reducer, StatReducer};
pub use source::{DataSource, LoadRequest, MemorySource, Resampling};
pub use stack::{Band, RasterStack};
pub use window::{flatten_windows, reduce_over_windows, WindowLayers};

// Re-export shared types so callers need only this crate
pub use crop_common::{BoundingBox, Crs, GeoBox, TimeRange, TimeSelector, WindowSpec};
