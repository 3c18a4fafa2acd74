//! Data models for JaltolAI.
//!
//! This module contains the core data structures shared by the aggregation
//! pipeline, the indicator tools and the conversation memory.

use crate::error::{JaltolError, Result};
use chrono::NaiveDate;
use geo::{coord, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Latitude/longitude pair returned by the geocoder (WGS 84 degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

/// Spatial area of interest for a reduction.
///
/// Coordinates follow the `geo` convention: `x` is longitude, `y` is latitude.
#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    /// A single location, e.g. a geocoded village.
    Point(Point<f64>),
    /// A polygonal area such as an administrative boundary.
    #[allow(dead_code)] // Village tools only build point regions
    Area(Polygon<f64>),
    /// The whole globe. Skips spatial pre-filtering.
    #[allow(dead_code)] // Village tools only build point regions
    Global,
}

impl Region {
    /// Build a point region from geocoded coordinates.
    pub fn from_coordinates(coordinates: Coordinates) -> Self {
        Region::Point(Point::new(coordinates.longitude, coordinates.latitude))
    }

    /// Whether the region constrains the raster footprint at all.
    pub fn is_bounded(&self) -> bool {
        !matches!(self, Region::Global)
    }

    /// Bounding rectangle of the whole globe.
    pub fn global_bounds() -> Rect<f64> {
        Rect::new(coord! { x: -180.0, y: -90.0 }, coord! { x: 180.0, y: 90.0 })
    }
}

/// Aggregation function applied across time or space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReducerKind {
    Mean,
    Sum,
}

impl ReducerKind {
    /// Reducer name as used by the archive backend and in region statistics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReducerKind::Mean => "mean",
            ReducerKind::Sum => "sum",
        }
    }
}

impl fmt::Display for ReducerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReducerKind {
    type Err = JaltolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mean" => Ok(ReducerKind::Mean),
            "sum" => Ok(ReducerKind::Sum),
            _ => Err(JaltolError::UnknownReducerKind {
                name: s.to_string(),
            }),
        }
    }
}

/// Which twelve months make up a "year".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalSpan {
    /// June to May, following the monsoon cycle.
    Hydrological,
    /// January to December.
    Calendar,
}

impl TemporalSpan {
    /// First month of the span.
    pub fn anchor_month(&self) -> u32 {
        match self {
            TemporalSpan::Hydrological => 6,
            TemporalSpan::Calendar => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TemporalSpan::Hydrological => "hydrological",
            TemporalSpan::Calendar => "calendar",
        }
    }
}

impl fmt::Display for TemporalSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Length of the window built from a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalStep {
    Year,
}

impl TemporalStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemporalStep::Year => "year",
        }
    }
}

impl fmt::Display for TemporalStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open interval `[start, end)` of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemporalWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for TemporalWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Hydrological indicators exposed to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    Precipitation,
    Evapotranspiration,
}

impl Indicator {
    /// All indicators, in the order they are offered to the agent.
    pub fn all() -> [Indicator; 2] {
        [Indicator::Precipitation, Indicator::Evapotranspiration]
    }

    /// Human-readable topic label. Used as the outer key of tool output.
    pub fn topic(&self) -> &'static str {
        match self {
            Indicator::Precipitation => "Precipitation or Rainfall",
            Indicator::Evapotranspiration => "Evapotranspiration or Actual Evapotranspiration",
        }
    }

    /// Prefix of the tool name.
    pub fn label(&self) -> &'static str {
        match self {
            Indicator::Precipitation => "Precipitation",
            Indicator::Evapotranspiration => "Evapotranspiration",
        }
    }

    /// Default archive asset holding the indicator's raster time series.
    pub fn default_asset(&self) -> &'static str {
        match self {
            Indicator::Precipitation => "users/jaltolwelllabs/IMD/rain",
            Indicator::Evapotranspiration => "users/jaltolwelllabs/ET/etSSEBop",
        }
    }

    /// Reducer used to fold the year's rasters into one.
    ///
    /// Both indicators are fluxes, so the annual figure is a total.
    pub fn temporal_reducer(&self) -> ReducerKind {
        match self {
            Indicator::Precipitation | Indicator::Evapotranspiration => ReducerKind::Sum,
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
}

impl Role {
    /// Prefix used when a turn is rendered as transcript text.
    pub fn prefix(&self) -> &'static str {
        match self {
            Role::Human => "Human",
            Role::Ai => "AI",
        }
    }
}

/// One verbatim entry of the conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            text: text.into(),
        }
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self {
            role: Role::Ai,
            text: text.into(),
        }
    }

    /// Render as a `Human: ...` / `AI: ...` transcript line.
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.role.prefix(), self.text)
    }
}

/// Round to 2 decimal places, the precision of every reported statistic.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reducer_from_str() {
        assert_eq!("mean".parse::<ReducerKind>().unwrap(), ReducerKind::Mean);
        assert_eq!("SUM".parse::<ReducerKind>().unwrap(), ReducerKind::Sum);
    }

    #[test]
    fn test_unknown_reducer_is_typed_error() {
        let err = "median".parse::<ReducerKind>().unwrap_err();
        assert!(matches!(
            err,
            JaltolError::UnknownReducerKind { ref name } if name == "median"
        ));
    }

    #[test]
    fn test_region_from_coordinates() {
        let region = Region::from_coordinates(Coordinates::new(20.0, 78.0));
        match region {
            Region::Point(p) => {
                assert_eq!(p.x(), 78.0);
                assert_eq!(p.y(), 20.0);
            }
            other => panic!("expected point region, got {:?}", other),
        }
        assert!(Region::Point(Point::new(0.0, 0.0)).is_bounded());
        assert!(!Region::Global.is_bounded());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(842.1749), 842.17);
        assert_eq!(round2(842.175_1), 842.18);
        assert_eq!(round2(-1.005_1), -1.01);
    }

    #[test]
    fn test_turn_transcript_line() {
        assert_eq!(Turn::human("hi").transcript_line(), "Human: hi");
        assert_eq!(Turn::ai("hello").transcript_line(), "AI: hello");
    }

    #[test]
    fn test_indicator_topics() {
        assert_eq!(Indicator::Precipitation.topic(), "Precipitation or Rainfall");
        assert_eq!(
            Indicator::Evapotranspiration.temporal_reducer(),
            ReducerKind::Sum
        );
    }
}
