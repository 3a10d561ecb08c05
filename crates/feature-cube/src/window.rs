//! Window reduction engine.
//!
//! Carves a stack's time axis into the labelled windows of a
//! [`WindowSpec`], reduces each window independently and flattens the
//! result into 2-D layers named `{band}_{reducer}_{label}`.

use chrono::{DateTime, Utc};
use crop_common::{TimeSelector, WindowSpec};
use tracing::{debug, warn};

use crate::error::{FeatureError, Result};
use crate::layer::FlattenedLayer;
use crate::reduce::Reducer;
use crate::stack::RasterStack;

/// The flattened layers produced for one window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowLayers {
    pub label: String,
    pub layers: Vec<FlattenedLayer>,
}

/// Name of a windowed feature band.
pub fn flattened_name(band: &str, reducer: &str, label: &str) -> String {
    format!("{}_{}_{}", band, reducer, label)
}

/// Index of the timestamp closest to `at`. Ties go to the earliest index.
pub fn nearest_index(times: &[DateTime<Utc>], at: DateTime<Utc>) -> Option<usize> {
    times
        .iter()
        .enumerate()
        .min_by_key(|(i, t)| ((**t - at).num_milliseconds().unsigned_abs(), *i))
        .map(|(i, _)| i)
}

/// Resolve one selector against the stack's time axis.
///
/// Returns `None` when an interval matches nothing.
pub fn select_window(
    stack: &RasterStack,
    label: &str,
    selector: &TimeSelector,
) -> Result<Option<RasterStack>> {
    let times = stack.times().ok_or_else(|| {
        FeatureError::shape(format!("window '{}': stack has no time axis", label))
    })?;

    match selector {
        TimeSelector::Instant { at, .. } => {
            let index = nearest_index(times, *at).ok_or_else(|| FeatureError::EmptyTimeAxis {
                label: label.to_string(),
            })?;
            debug!(label = %label, at = %at, matched = %times[index], "Nearest time step");
            stack.select_steps(&[index]).map(Some)
        }
        TimeSelector::Interval(range) => {
            let steps: Vec<usize> = times
                .iter()
                .enumerate()
                .filter(|(_, t)| range.contains(t))
                .map(|(i, _)| i)
                .collect();
            if steps.is_empty() {
                return Ok(None);
            }
            debug!(label = %label, range = %range, steps = steps.len(), "Interval selection");
            stack.select_steps(&steps).map(Some)
        }
    }
}

/// Turn a reduced stack into layers, keeping band names.
///
/// A single remaining time step is dropped; more than one is an error.
pub fn flatten_stack(stack: RasterStack, context: &str) -> Result<Vec<FlattenedLayer>> {
    let stack = stack.squeeze_time(context)?;
    let geobox = stack.geobox().clone();
    stack
        .into_bands()
        .into_iter()
        .map(|mut band| {
            let plane = band.planes.pop().unwrap_or_default();
            FlattenedLayer::new(band.name, geobox.clone(), plane)
        })
        .collect()
}

/// Flatten every time step of every band into `{band}_{step}` layers.
///
/// A timeless stack yields one `{band}_0` layer per band.
pub fn flatten_time_steps(stack: &RasterStack) -> Result<Vec<FlattenedLayer>> {
    let geobox = stack.geobox();
    let mut layers = Vec::with_capacity(stack.bands().len() * stack.steps());
    for band in stack.bands() {
        for (step, plane) in band.planes.iter().enumerate() {
            layers.push(FlattenedLayer::new(
                format!("{}_{}", band.name, step),
                geobox.clone(),
                plane.clone(),
            )?);
        }
    }
    Ok(layers)
}

/// Reduce each window of `spec` over `stack`, in spec order.
///
/// Windows whose interval matches no observation contribute an empty layer
/// set. The input stack is left untouched.
pub fn reduce_over_windows(
    stack: &RasterStack,
    spec: &WindowSpec,
    reducer: &dyn Reducer,
    reducer_name: &str,
) -> Result<Vec<WindowLayers>> {
    let mut out = Vec::with_capacity(spec.len());

    for (label, selector) in spec.iter() {
        let Some(selected) = select_window(stack, label, selector)? else {
            warn!(label = %label, reducer = %reducer_name, "No observations in window");
            out.push(WindowLayers {
                label: label.to_string(),
                layers: Vec::new(),
            });
            continue;
        };

        let reduced = reducer
            .reduce(&selected)?
            .rename_bands(|band| flattened_name(band, reducer_name, label))?;
        let layers = flatten_stack(reduced, label)?;

        debug!(label = %label, reducer = %reducer_name, layers = layers.len(), "Reduced window");
        out.push(WindowLayers {
            label: label.to_string(),
            layers,
        });
    }

    Ok(out)
}

/// Concatenate per-window layers, keeping window order.
pub fn flatten_windows(windows: Vec<WindowLayers>) -> Vec<FlattenedLayer> {
    windows.into_iter().flat_map(|w| w.layers).collect()
}
