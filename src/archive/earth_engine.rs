//! Earth Engine backend.
//!
//! Collections and rasters are kept as lazy expression graphs in the Earth
//! Engine REST encoding. Nothing is sent to the server until a value is
//! needed, at which point the graph is evaluated with `value:compute`.

use crate::archive::{NativeProjection, RasterArchive, RegionStatistics};
use crate::config::ArchiveConfig;
use crate::error::{JaltolError, Result};
use crate::models::{ReducerKind, Region, TemporalWindow};
use chrono::{Datelike, NaiveDate};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

/// A node of an Earth Engine expression graph.
pub type Expression = Value;

/// Response of the `value:compute` endpoint.
#[derive(Debug, Deserialize)]
struct ComputeResponse {
    result: Value,
}

/// Raster archive backed by the Earth Engine REST API.
pub struct EarthEngineArchive {
    client: reqwest::blocking::Client,
    base_url: String,
    project: String,
    token: String,
    timeout_seconds: u64,
}

impl EarthEngineArchive {
    /// Create a client from the archive settings.
    pub fn new(config: &ArchiveConfig) -> Result<Self> {
        let project = config
            .project
            .clone()
            .ok_or_else(|| JaltolError::ConfigMissing {
                key: "archive.project".to_string(),
            })?;
        let token = config
            .token
            .clone()
            .ok_or_else(|| JaltolError::ConfigMissing {
                key: "archive.token".to_string(),
            })?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| JaltolError::Archive(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project,
            token,
            timeout_seconds: config.timeout_seconds,
        })
    }

    fn compute_url(&self) -> String {
        format!("{}/v1/projects/{}/value:compute", self.base_url, self.project)
    }

    /// Evaluate an expression graph and return its JSON value.
    fn compute(&self, expression: Expression) -> Result<Value> {
        let body = json!({
            "expression": {
                "result": "0",
                "values": { "0": expression }
            }
        });

        debug!("Evaluating expression at {}", self.compute_url());

        let response = self
            .client
            .post(self.compute_url())
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    JaltolError::Archive(format!(
                        "request timed out after {}s",
                        self.timeout_seconds
                    ))
                } else if e.is_connect() {
                    JaltolError::Archive(format!("cannot connect to {}", self.base_url))
                } else {
                    JaltolError::Archive(format!("failed to send request: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let computed: ComputeResponse = response
            .json()
            .map_err(|e| JaltolError::Archive(format!("failed to parse response: {}", e)))?;

        Ok(computed.result)
    }
}

impl RasterArchive for EarthEngineArchive {
    type Collection = Expression;
    type Raster = Expression;

    fn native_projection(&self, asset_id: &str) -> Result<NativeProjection> {
        let first = invoke("Collection.first", vec![("collection", load_collection(asset_id))]);
        let projection = invoke("Image.projection", vec![("image", first)]);

        let info = self.compute(projection.clone())?;
        let crs = info
            .get("crs")
            .and_then(Value::as_str)
            .ok_or_else(|| JaltolError::Archive(format!("no CRS reported for {}", asset_id)))?
            .to_string();

        let scale = self
            .compute(invoke("Projection.nominalScale", vec![("proj", projection)]))?
            .as_f64()
            .ok_or_else(|| JaltolError::Archive(format!("no scale reported for {}", asset_id)))?;

        Ok(NativeProjection { crs, scale })
    }

    fn query_collection(&self, asset_id: &str) -> Result<Expression> {
        Ok(load_collection(asset_id))
    }

    fn filter_by_time_and_region(
        &self,
        collection: &Expression,
        window: &TemporalWindow,
        region: &Region,
    ) -> Result<Expression> {
        Ok(filter_expression(collection, window, region))
    }

    fn reduce_temporal(&self, collection: &Expression, reducer: ReducerKind) -> Result<Expression> {
        Ok(invoke(
            "ImageCollection.reduce",
            vec![
                ("collection", collection.clone()),
                ("reducer", reducer_expression(reducer)),
            ],
        ))
    }

    fn reduce_spatial(
        &self,
        raster: &Expression,
        region: &Region,
        projection: &NativeProjection,
        reducer: ReducerKind,
    ) -> Result<Vec<RegionStatistics>> {
        let expression = reduce_regions_expression(raster, region, projection, reducer);
        let result = self.compute(expression)?;
        parse_region_statistics(result)
    }
}

fn invoke(function: &str, arguments: Vec<(&str, Expression)>) -> Expression {
    let arguments: Map<String, Value> = arguments
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
    json!({
        "functionInvocationValue": {
            "functionName": function,
            "arguments": arguments
        }
    })
}

fn constant(value: impl Into<Value>) -> Expression {
    json!({ "constantValue": value.into() })
}

fn load_collection(asset_id: &str) -> Expression {
    invoke("ImageCollection.load", vec![("id", constant(asset_id))])
}

fn date_expression(date: NaiveDate) -> Expression {
    invoke(
        "Date.fromYMD",
        vec![
            ("year", constant(date.year())),
            ("month", constant(date.month())),
            ("day", constant(date.day())),
        ],
    )
}

/// Map a failed `value:compute` response to an archive error.
///
/// The bearer token is static, so a 401 usually means it has expired.
fn status_error(status: StatusCode, body: &str) -> JaltolError {
    if status == StatusCode::UNAUTHORIZED {
        return JaltolError::Archive(
            "Earth Engine rejected the access token (expired or revoked); \
             refresh EARTHENGINE_TOKEN and restart"
                .to_string(),
        );
    }
    JaltolError::Archive(format!("Earth Engine API error {}: {}", status, body))
}

fn reducer_expression(reducer: ReducerKind) -> Expression {
    invoke(&format!("Reducer.{}", reducer.as_str()), vec![])
}

fn geometry_expression(region: &Region) -> Expression {
    match region {
        Region::Point(point) => invoke(
            "GeometryConstructors.Point",
            vec![("coordinates", constant(json!([point.x(), point.y()])))],
        ),
        Region::Area(polygon) => {
            let rings: Vec<Vec<[f64; 2]>> = std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .map(|ring| ring.coords().map(|c| [c.x, c.y]).collect())
                .collect();
            invoke(
                "GeometryConstructors.Polygon",
                vec![("coordinates", constant(json!(rings)))],
            )
        }
        Region::Global => {
            let bounds = Region::global_bounds();
            invoke(
                "GeometryConstructors.BBox",
                vec![
                    ("west", constant(bounds.min().x)),
                    ("south", constant(bounds.min().y)),
                    ("east", constant(bounds.max().x)),
                    ("north", constant(bounds.max().y)),
                ],
            )
        }
    }
}

fn filter_expression(collection: &Expression, window: &TemporalWindow, region: &Region) -> Expression {
    let date_filter = invoke(
        "Filter.dateRangeContains",
        vec![
            (
                "leftValue",
                invoke(
                    "DateRange",
                    vec![
                        ("start", date_expression(window.start)),
                        ("end", date_expression(window.end)),
                    ],
                ),
            ),
            ("rightField", constant("system:time_start")),
        ],
    );
    let by_date = invoke(
        "Collection.filter",
        vec![("collection", collection.clone()), ("filter", date_filter)],
    );

    if !region.is_bounded() {
        return by_date;
    }

    let bounds_filter = invoke(
        "Filter.intersects",
        vec![
            ("leftField", constant(".all")),
            ("rightValue", geometry_expression(region)),
        ],
    );
    invoke(
        "Collection.filter",
        vec![("collection", by_date), ("filter", bounds_filter)],
    )
}

fn reduce_regions_expression(
    raster: &Expression,
    region: &Region,
    projection: &NativeProjection,
    reducer: ReducerKind,
) -> Expression {
    let feature = invoke("Feature", vec![("geometry", geometry_expression(region))]);
    let features = invoke(
        "Collection",
        vec![("features", json!({ "arrayValue": { "values": [feature] } }))],
    );

    invoke(
        "Image.reduceRegions",
        vec![
            ("image", raster.clone()),
            ("collection", features),
            ("reducer", reducer_expression(reducer)),
            ("scale", constant(projection.scale)),
            (
                "crs",
                invoke("Projection", vec![("crs", constant(projection.crs.as_str()))]),
            ),
        ],
    )
}

/// Pull per-region properties out of a computed feature collection.
fn parse_region_statistics(result: Value) -> Result<Vec<RegionStatistics>> {
    let features = match result.get("features") {
        Some(Value::Array(features)) => features.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            return Err(JaltolError::Archive(format!(
                "unexpected features value: {}",
                other
            )))
        }
    };

    features
        .into_iter()
        .map(|feature| {
            serde_json::from_value::<RegionStatistics>(feature)
                .map_err(|e| JaltolError::Archive(format!("malformed region feature: {}", e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::temporal;
    use crate::models::{Coordinates, TemporalSpan, TemporalStep};
    use geo::polygon;

    fn function_name(expression: &Expression) -> &str {
        expression["functionInvocationValue"]["functionName"]
            .as_str()
            .unwrap()
    }

    fn argument<'a>(expression: &'a Expression, name: &str) -> &'a Expression {
        &expression["functionInvocationValue"]["arguments"][name]
    }

    fn test_config() -> ArchiveConfig {
        ArchiveConfig {
            project: Some("jaltol-test".to_string()),
            token: Some("secret".to_string()),
            base_url: "https://earthengine.example.com/".to_string(),
            ..ArchiveConfig::default()
        }
    }

    #[test]
    fn test_new_requires_credentials() {
        let config = ArchiveConfig {
            token: None,
            ..test_config()
        };
        assert!(matches!(
            EarthEngineArchive::new(&config),
            Err(JaltolError::ConfigMissing { .. })
        ));
    }

    #[test]
    fn test_compute_url() {
        let archive = EarthEngineArchive::new(&test_config()).unwrap();
        assert_eq!(
            archive.compute_url(),
            "https://earthengine.example.com/v1/projects/jaltol-test/value:compute"
        );
    }

    #[test]
    fn test_filter_bounded_region() {
        let window = temporal::resolve(2020, TemporalSpan::Hydrological, TemporalStep::Year).unwrap();
        let region = Region::from_coordinates(Coordinates::new(20.0, 78.0));
        let expression = filter_expression(&load_collection("users/x/rain"), &window, &region);

        assert_eq!(function_name(&expression), "Collection.filter");
        let bounds = argument(&expression, "filter");
        assert_eq!(function_name(bounds), "Filter.intersects");
        assert_eq!(
            argument(argument(bounds, "rightValue"), "coordinates")["constantValue"],
            json!([78.0, 20.0])
        );

        let by_date = argument(&expression, "collection");
        let range = argument(argument(by_date, "filter"), "leftValue");
        let start = argument(range, "start");
        assert_eq!(argument(start, "year")["constantValue"], json!(2020));
        assert_eq!(argument(start, "month")["constantValue"], json!(6));
        let end = argument(range, "end");
        assert_eq!(argument(end, "year")["constantValue"], json!(2021));
    }

    #[test]
    fn test_filter_global_region_skips_bounds() {
        let window = temporal::resolve(2020, TemporalSpan::Calendar, TemporalStep::Year).unwrap();
        let expression = filter_expression(&load_collection("users/x/rain"), &window, &Region::Global);

        assert_eq!(
            function_name(argument(&expression, "filter")),
            "Filter.dateRangeContains"
        );
        assert_eq!(
            function_name(argument(&expression, "collection")),
            "ImageCollection.load"
        );
    }

    #[test]
    fn test_polygon_geometry() {
        let area = Region::Area(polygon![
            (x: 77.0, y: 19.0),
            (x: 79.0, y: 19.0),
            (x: 79.0, y: 21.0),
            (x: 77.0, y: 19.0),
        ]);
        let expression = geometry_expression(&area);
        assert_eq!(function_name(&expression), "GeometryConstructors.Polygon");
        let rings = &argument(&expression, "coordinates")["constantValue"];
        assert_eq!(rings[0][0], json!([77.0, 19.0]));
    }

    #[test]
    fn test_reduce_regions_expression() {
        let projection = NativeProjection {
            crs: "EPSG:4326".to_string(),
            scale: 27829.87,
        };
        let raster = invoke(
            "ImageCollection.reduce",
            vec![
                ("collection", load_collection("users/x/rain")),
                ("reducer", reducer_expression(ReducerKind::Sum)),
            ],
        );
        let region = Region::from_coordinates(Coordinates::new(20.0, 78.0));
        let expression = reduce_regions_expression(&raster, &region, &projection, ReducerKind::Mean);

        assert_eq!(function_name(&expression), "Image.reduceRegions");
        assert_eq!(
            function_name(argument(&expression, "reducer")),
            "Reducer.mean"
        );
        assert_eq!(
            function_name(argument(argument(&expression, "image"), "reducer")),
            "Reducer.sum"
        );
        assert_eq!(argument(&expression, "scale")["constantValue"], json!(27829.87));
    }

    #[test]
    fn test_expired_token_error_names_the_token() {
        let err = status_error(StatusCode::UNAUTHORIZED, "{\"error\": {\"code\": 401}}");
        assert!(matches!(err, JaltolError::Archive(ref msg) if msg.contains("EARTHENGINE_TOKEN")));

        let err = status_error(StatusCode::BAD_REQUEST, "bad expression");
        assert!(matches!(err, JaltolError::Archive(ref msg)
            if msg.contains("400") && msg.contains("bad expression")));
    }

    #[test]
    fn test_parse_region_statistics() {
        let result = json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "geometry": null, "id": "0", "properties": { "mean": 842.17 } }
            ]
        });
        let stats = parse_region_statistics(result).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].statistic(ReducerKind::Mean), Some(842.17));

        let empty = parse_region_statistics(json!({ "type": "FeatureCollection" })).unwrap();
        assert!(empty.is_empty());

        assert!(parse_region_statistics(json!({ "features": "nope" })).is_err());
    }
}
