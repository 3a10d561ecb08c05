//! Common types and utilities shared across the crop feature workspace.

pub mod bbox;
pub mod crs;
pub mod error;
pub mod grid;
pub mod time;

pub use bbox::BoundingBox;
pub use crs::Crs;
pub use error::{CommonError, CommonResult};
pub use grid::GeoBox;
pub use time::{TimeRange, TimeSelector, WindowSpec};
