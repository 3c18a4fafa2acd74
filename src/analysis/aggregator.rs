//! Geo-temporal aggregation.
//!
//! Reduces a raster time series first over time, then over space, down to
//! one rounded statistic.

use crate::archive::{ArchiveReference, RasterArchive};
use crate::error::{JaltolError, Result};
use crate::models::{round2, ReducerKind, Region, TemporalWindow};
use std::sync::Arc;
use tracing::debug;

/// Everything needed to compute one statistic.
#[derive(Debug, Clone)]
pub struct ReductionRequest<'a> {
    pub archive: &'a ArchiveReference,
    pub window: TemporalWindow,
    pub region: &'a Region,
    pub temporal_reducer: ReducerKind,
    pub spatial_reducer: ReducerKind,
}

impl<'a> ReductionRequest<'a> {
    /// Request with the default spatial reducer (mean).
    pub fn new(
        archive: &'a ArchiveReference,
        window: TemporalWindow,
        region: &'a Region,
        temporal_reducer: ReducerKind,
    ) -> Self {
        Self {
            archive,
            window,
            region,
            temporal_reducer,
            spatial_reducer: ReducerKind::Mean,
        }
    }

    pub fn with_spatial_reducer(mut self, reducer: ReducerKind) -> Self {
        self.spatial_reducer = reducer;
        self
    }
}

/// Two-stage reducer over a raster archive.
pub struct GeoTemporalAggregator<A> {
    archive: Arc<A>,
}

impl<A> Clone for GeoTemporalAggregator<A> {
    fn clone(&self) -> Self {
        Self {
            archive: Arc::clone(&self.archive),
        }
    }
}

impl<A: RasterArchive> GeoTemporalAggregator<A> {
    pub fn new(archive: Arc<A>) -> Self {
        Self { archive }
    }

    /// Compute the statistic, rounded to 2 decimal places.
    ///
    /// Returns `ArchiveEmptyResult` when the first region carries no value,
    /// which is what an empty window looks like after reduction.
    pub fn aggregate(&self, request: &ReductionRequest<'_>) -> Result<f64> {
        let asset = request.archive.asset_id();
        debug!(
            "Aggregating {} over {} ({} in time, {} in space)",
            asset, request.window, request.temporal_reducer, request.spatial_reducer
        );

        let collection = self.archive.query_collection(asset)?;
        let filtered =
            self.archive
                .filter_by_time_and_region(&collection, &request.window, request.region)?;
        let reduced = self
            .archive
            .reduce_temporal(&filtered, request.temporal_reducer)?;
        let regions = self.archive.reduce_spatial(
            &reduced,
            request.region,
            request.archive.projection(),
            request.spatial_reducer,
        )?;

        let value = regions
            .first()
            .and_then(|stats| stats.statistic(request.spatial_reducer))
            .filter(|v| v.is_finite())
            .ok_or_else(|| JaltolError::ArchiveEmptyResult {
                asset: asset.to_string(),
            })?;

        Ok(round2(value))
    }
}
