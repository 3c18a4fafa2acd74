//! In-memory stand-ins for the external services, shared by unit tests.

use crate::agent::tools::{IndicatorSettings, IndicatorTool, ToolDefinition, ToolRegistry};
use crate::agent::agent_loop::ChatMessage;
use crate::agent::llm::{Completion, LanguageModel, Summarizer};
use crate::analysis::GeoTemporalAggregator;
use crate::archive::{ArchiveReference, NativeProjection, RasterArchive, RegionStatistics};
use crate::error::{JaltolError, Result};
use crate::location::Geocoder;
use crate::models::{Coordinates, Indicator, ReducerKind, Region, TemporalWindow, Turn};
use chrono::NaiveDate;
use geo::{coord, Intersects, Rect};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const RAIN_ASSET: &str = "users/test/rain";
pub const VILLAGE_X: &str = "Village X, District Y, State Z";

pub fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Rough bounding box of India.
pub fn india_footprint() -> Rect<f64> {
    Rect::new(coord! { x: 68.0, y: 6.0 }, coord! { x: 97.0, y: 37.0 })
}

/// Half-open containment check for `[start, end)`.
pub fn window_contains(window: &TemporalWindow, date: NaiveDate) -> bool {
    window.start <= date && date < window.end
}

/// Whether a raster footprint overlaps the region.
pub fn region_overlaps(region: &Region, footprint: &Rect<f64>) -> bool {
    match region {
        Region::Point(point) => footprint.intersects(point),
        Region::Area(polygon) => footprint.intersects(polygon),
        Region::Global => true,
    }
}

/// Reduce plain values the way the archive reducers do. `None` when empty.
pub fn reduce_values(reducer: ReducerKind, values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let total: f64 = values.iter().sum();
    match reducer {
        ReducerKind::Sum => Some(total),
        ReducerKind::Mean => Some(total / values.len() as f64),
    }
}

#[derive(Debug, Clone)]
pub struct FakeRaster {
    pub date: NaiveDate,
    pub footprint: Rect<f64>,
    pub value: f64,
}

/// Raster archive holding constant-valued rasters per asset.
#[derive(Default)]
pub struct InMemoryArchive {
    assets: HashMap<String, Vec<FakeRaster>>,
    fail_projection: bool,
    projection_fetches: AtomicUsize,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raster(mut self, asset: &str, date: NaiveDate, footprint: Rect<f64>, value: f64) -> Self {
        self.assets.entry(asset.to_string()).or_default().push(FakeRaster {
            date,
            footprint,
            value,
        });
        self
    }

    pub fn failing_projection(mut self) -> Self {
        self.fail_projection = true;
        self
    }

    pub fn projection_fetches(&self) -> usize {
        self.projection_fetches.load(Ordering::SeqCst)
    }
}

impl RasterArchive for InMemoryArchive {
    type Collection = Vec<FakeRaster>;
    type Raster = Option<f64>;

    fn native_projection(&self, _asset_id: &str) -> Result<NativeProjection> {
        self.projection_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_projection {
            return Err(JaltolError::Archive("projection unavailable".to_string()));
        }
        Ok(NativeProjection {
            crs: "EPSG:4326".to_string(),
            scale: 27829.87,
        })
    }

    fn query_collection(&self, asset_id: &str) -> Result<Self::Collection> {
        Ok(self.assets.get(asset_id).cloned().unwrap_or_default())
    }

    fn filter_by_time_and_region(
        &self,
        collection: &Self::Collection,
        window: &TemporalWindow,
        region: &Region,
    ) -> Result<Self::Collection> {
        Ok(collection
            .iter()
            .filter(|r| window_contains(window, r.date) && region_overlaps(region, &r.footprint))
            .cloned()
            .collect())
    }

    fn reduce_temporal(&self, collection: &Self::Collection, reducer: ReducerKind) -> Result<Self::Raster> {
        let values: Vec<f64> = collection.iter().map(|r| r.value).collect();
        Ok(reduce_values(reducer, &values))
    }

    fn reduce_spatial(
        &self,
        raster: &Self::Raster,
        _region: &Region,
        _projection: &NativeProjection,
        reducer: ReducerKind,
    ) -> Result<Vec<RegionStatistics>> {
        let mut properties = Map::new();
        if let Some(value) = raster {
            properties.insert(reducer.as_str().to_string(), Value::from(*value));
        }
        Ok(vec![RegionStatistics { properties }])
    }
}

/// Geocoder answering from a fixed table.
#[derive(Default)]
pub struct FakeGeocoder {
    places: HashMap<String, Coordinates>,
    failing: bool,
}

impl FakeGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(mut self, name: &str, coordinates: Coordinates) -> Self {
        self.places.insert(name.to_string(), coordinates);
        self
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }
}

impl Geocoder for FakeGeocoder {
    fn resolve(&self, name: &str) -> Result<Option<Coordinates>> {
        if self.failing {
            return Err(JaltolError::Geocoder("service unavailable".to_string()));
        }
        Ok(self.places.get(name).copied())
    }
}

/// Precipitation tool over a small archive with 842.17 mm in hydrological 2020.
pub fn precipitation_tool() -> IndicatorTool<InMemoryArchive, FakeGeocoder> {
    precipitation_tool_with(FakeGeocoder::new().with_place(VILLAGE_X, Coordinates::new(20.0, 78.0)))
}

pub fn precipitation_tool_with(geocoder: FakeGeocoder) -> IndicatorTool<InMemoryArchive, FakeGeocoder> {
    let archive = Arc::new(
        InMemoryArchive::new()
            .with_raster(RAIN_ASSET, ymd(2020, 6, 15), india_footprint(), 300.125)
            .with_raster(RAIN_ASSET, ymd(2020, 7, 15), india_footprint(), 412.0)
            .with_raster(RAIN_ASSET, ymd(2021, 1, 15), india_footprint(), 130.049),
    );
    let reference = ArchiveReference::fetch(archive.as_ref(), RAIN_ASSET).unwrap();
    IndicatorTool::new(
        Indicator::Precipitation,
        reference,
        GeoTemporalAggregator::new(archive),
        Arc::new(geocoder),
        IndicatorSettings::default(),
    )
}

pub fn precipitation_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(precipitation_tool()));
    registry
}

/// Language model replaying a fixed script of completions.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Completion>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Completion>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Messages received by each call, in order.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

impl LanguageModel for ScriptedModel {
    fn complete(&self, messages: &[ChatMessage], _tools: &[ToolDefinition]) -> Result<Completion> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| JaltolError::LanguageModel("script exhausted".to_string()))
    }
}

/// Summarizer recording its calls. Clones share state.
#[derive(Clone, Default)]
pub struct FakeSummarizer {
    calls: Arc<AtomicUsize>,
    last_previous: Arc<Mutex<Option<String>>>,
    failing: bool,
}

impl FakeSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_previous_summary(&self) -> Option<String> {
        self.last_previous.lock().unwrap().clone()
    }
}

impl Summarizer for FakeSummarizer {
    fn summarize(&self, summary: Option<&str>, turns: &[Turn]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_previous.lock().unwrap() = summary.map(str::to_string);
        if self.failing {
            return Err(JaltolError::LanguageModel("summarizer unavailable".to_string()));
        }
        Ok(format!("summary of {} turns", turns.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_values() {
        assert_eq!(reduce_values(ReducerKind::Sum, &[1.0, 2.0, 3.5]), Some(6.5));
        assert_eq!(reduce_values(ReducerKind::Mean, &[1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(reduce_values(ReducerKind::Sum, &[]), None);
    }

    #[test]
    fn test_region_overlaps_footprint() {
        let footprint = Rect::new(coord! { x: 70.0, y: 10.0 }, coord! { x: 90.0, y: 30.0 });
        let inside = Region::from_coordinates(Coordinates::new(20.0, 78.0));
        let outside = Region::from_coordinates(Coordinates::new(-33.0, 151.0));

        assert!(region_overlaps(&inside, &footprint));
        assert!(!region_overlaps(&outside, &footprint));
        assert!(region_overlaps(&Region::Global, &footprint));
    }
}
