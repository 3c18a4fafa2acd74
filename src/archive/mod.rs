//! Remote raster archive access.
//!
//! The archive is consumed through the [`RasterArchive`] trait so the
//! aggregation pipeline can run against Earth Engine in production and an
//! in-memory archive in tests.

pub mod earth_engine;

use crate::error::{JaltolError, Result};
use crate::models::{ReducerKind, Region, TemporalWindow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

pub use earth_engine::EarthEngineArchive;

/// Native grid of an archive's rasters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeProjection {
    /// Coordinate reference system, e.g. `EPSG:4326`.
    pub crs: String,
    /// Nominal linear pixel size in metres.
    pub scale: f64,
}

/// Per-region properties returned by a spatial reduction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionStatistics {
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl RegionStatistics {
    /// Statistic produced by `reducer`, if the region had data.
    pub fn statistic(&self, reducer: ReducerKind) -> Option<f64> {
        self.properties.get(reducer.as_str()).and_then(Value::as_f64)
    }
}

/// Backend holding raster time series.
///
/// Collections and rasters are backend-specific handles. Earth Engine keeps
/// them as lazy expressions and only evaluates on [`RasterArchive::reduce_spatial`].
pub trait RasterArchive: Send + Sync {
    type Collection;
    type Raster;

    /// CRS and nominal scale of the first raster in the asset.
    fn native_projection(&self, asset_id: &str) -> Result<NativeProjection>;

    /// Open the raster collection stored under `asset_id`.
    fn query_collection(&self, asset_id: &str) -> Result<Self::Collection>;

    /// Keep rasters dated inside `window` whose footprint intersects `region`.
    fn filter_by_time_and_region(
        &self,
        collection: &Self::Collection,
        window: &TemporalWindow,
        region: &Region,
    ) -> Result<Self::Collection>;

    /// Fold the collection into a single raster.
    fn reduce_temporal(
        &self,
        collection: &Self::Collection,
        reducer: ReducerKind,
    ) -> Result<Self::Raster>;

    /// Reduce the raster over `region`, one statistics record per region.
    fn reduce_spatial(
        &self,
        raster: &Self::Raster,
        region: &Region,
        projection: &NativeProjection,
        reducer: ReducerKind,
    ) -> Result<Vec<RegionStatistics>>;
}

/// Identifier of an archive plus its cached native grid.
///
/// The grid is read once from the first raster when the reference is built
/// and never refreshed.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveReference {
    asset_id: String,
    projection: NativeProjection,
}

impl ArchiveReference {
    /// Build a reference, fetching the native grid from the archive.
    pub fn fetch<A: RasterArchive + ?Sized>(archive: &A, asset_id: impl Into<String>) -> Result<Self> {
        let asset_id = asset_id.into();
        let projection = archive.native_projection(&asset_id).map_err(|e| {
            JaltolError::Archive(format!(
                "failed to read native projection of {}: {}",
                asset_id, e
            ))
        })?;

        if !(projection.scale.is_finite() && projection.scale > 0.0) {
            return Err(JaltolError::Archive(format!(
                "archive {} reported invalid scale {}",
                asset_id, projection.scale
            )));
        }

        info!(
            "Archive {} uses {} at {:.1} m",
            asset_id, projection.crs, projection.scale
        );

        Ok(Self {
            asset_id,
            projection,
        })
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn projection(&self) -> &NativeProjection {
        &self.projection
    }

}
