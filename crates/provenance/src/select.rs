//! Zoom- and viewport-driven arc selection.

use foundation::ViewBounds;
use serde::Serialize;
use tracing::debug;

use crate::cluster::{Granularity, MapArc, cluster_arcs};
use crate::record::Record;

/// Padding applied by [`filter_arcs_by_bounds`] when the caller has none.
pub const DEFAULT_BOUNDS_PADDING_DEG: f64 = 1.0;

/// Zoom band boundaries (inclusive upper edges).
pub const GLOBAL_MAX_ZOOM: f64 = 4.0;
pub const REGIONAL_MAX_ZOOM: f64 = 8.0;
/// From this zoom on the local band allows its larger cap.
pub const STREET_MIN_ZOOM: f64 = 12.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoomBand {
    /// zoom <= 4
    Global,
    /// 4 < zoom <= 8
    Regional,
    /// zoom > 8
    Local,
}

impl ZoomBand {
    /// Non-finite zoom (transient values during map animation) falls back to
    /// the global band.
    pub fn for_zoom(zoom: f64) -> Self {
        if !zoom.is_finite() || zoom <= GLOBAL_MAX_ZOOM {
            ZoomBand::Global
        } else if zoom <= REGIONAL_MAX_ZOOM {
            ZoomBand::Regional
        } else {
            ZoomBand::Local
        }
    }
}

/// What [`select_arcs`] does at a given zoom.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionPlan {
    pub band: ZoomBand,
    pub granularity: Granularity,
    pub max_arcs: usize,
    /// Pre-filter records to those whose origin lies strictly inside the
    /// viewport before clustering.
    pub filter_to_bounds: bool,
}

impl SelectionPlan {
    pub fn for_zoom(zoom: f64) -> Self {
        let band = ZoomBand::for_zoom(zoom);
        match band {
            ZoomBand::Global => Self {
                band,
                granularity: Granularity::Object,
                max_arcs: 100,
                filter_to_bounds: false,
            },
            ZoomBand::Regional => Self {
                band,
                granularity: Granularity::City,
                max_arcs: 500,
                filter_to_bounds: false,
            },
            ZoomBand::Local => Self {
                band,
                granularity: Granularity::Object,
                max_arcs: if zoom >= STREET_MIN_ZOOM { 2000 } else { 1000 },
                filter_to_bounds: true,
            },
        }
    }
}

/// Arcs to draw for the current view.
///
/// Bounds are only consulted in the local band, and only when every
/// component is finite; otherwise all records are clustered.
pub fn select_arcs<'a>(
    records: &'a [Record],
    zoom: f64,
    bounds: Option<&ViewBounds>,
) -> Vec<MapArc<'a>> {
    if records.is_empty() {
        return Vec::new();
    }

    let plan = SelectionPlan::for_zoom(zoom);
    let viewport = bounds.filter(|b| plan.filter_to_bounds && b.is_finite());

    let arcs = match viewport {
        Some(b) => cluster_arcs(
            records
                .iter()
                .filter(|r| r.origin_point().is_some_and(|p| b.contains_strict(p))),
            plan.granularity,
            plan.max_arcs,
        ),
        None => cluster_arcs(records, plan.granularity, plan.max_arcs),
    };

    debug!(
        zoom,
        band = ?plan.band,
        granularity = %plan.granularity,
        max_arcs = plan.max_arcs,
        bounded = viewport.is_some(),
        records = records.len(),
        arcs = arcs.len(),
        "selected arcs"
    );
    arcs
}

/// Keep arcs with at least one endpoint inside `bounds` grown by `padding`
/// degrees (edges inclusive).
///
/// Non-finite bounds disable filtering. A non-finite or negative padding
/// falls back to [`DEFAULT_BOUNDS_PADDING_DEG`].
pub fn filter_arcs_by_bounds<'a>(
    arcs: Vec<MapArc<'a>>,
    bounds: &ViewBounds,
    padding: f64,
) -> Vec<MapArc<'a>> {
    if !bounds.is_finite() {
        return arcs;
    }
    let padding = if padding.is_finite() && padding >= 0.0 {
        padding
    } else {
        DEFAULT_BOUNDS_PADDING_DEG
    };
    let padded = bounds.expanded(padding);

    arcs.into_iter()
        .filter(|a| padded.contains_inclusive(a.source()) || padded.contains_inclusive(a.target()))
        .collect()
}
