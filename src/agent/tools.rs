//! Tool definitions for the conversation agent.
//!
//! Each hydrological indicator is exposed to the LLM as one tool that takes
//! a free-text location and a year and returns the annual statistic.

use crate::agent::prompt;
use crate::analysis::{temporal, GeoTemporalAggregator, ReductionRequest};
use crate::archive::{ArchiveReference, RasterArchive};
use crate::error::{JaltolError, Result};
use crate::location::Geocoder;
use crate::models::{Indicator, ReducerKind, Region, TemporalSpan, TemporalStep};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Tool definition for the chat completions tool-calling API.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A tool call made by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Value,
}

/// Result of executing a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: String) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(message),
        }
    }

    /// Content of the `tool` message sent back to the model.
    pub fn into_message_content(self) -> String {
        if self.success {
            self.output
        } else {
            format!("Error: {}", self.error.unwrap_or_default())
        }
    }
}

/// A capability the agent may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Topic the tool answers questions about, listed in the system prompt.
    fn topic(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    fn invoke(&self, args: &Value) -> Result<Value>;

    /// Asynchronous invocation. Tools are synchronous unless they say otherwise.
    async fn invoke_async(&self, _args: &Value) -> Result<Value> {
        Err(JaltolError::AsyncUnsupported {
            tool: self.name().to_string(),
        })
    }
}

/// How an indicator tool slices time and space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorSettings {
    pub span: TemporalSpan,
    pub step: TemporalStep,
    pub spatial_reducer: ReducerKind,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            span: TemporalSpan::Hydrological,
            step: TemporalStep::Year,
            spatial_reducer: ReducerKind::Mean,
        }
    }
}

/// `{topic: {location: {year: value}}}`
pub type IndicatorOutput = BTreeMap<String, BTreeMap<String, BTreeMap<i32, f64>>>;

#[derive(Debug, Deserialize)]
struct IndicatorArgs {
    location: String,
    year: YearArg,
}

/// Models send the year either as a number or as a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum YearArg {
    Number(i64),
    Text(String),
}

impl YearArg {
    fn to_year(&self) -> std::result::Result<i32, String> {
        match self {
            YearArg::Number(n) => i32::try_from(*n).map_err(|_| format!("year {} is out of range", n)),
            YearArg::Text(s) => s
                .trim()
                .parse::<i32>()
                .map_err(|_| format!("year '{}' is not an integer", s)),
        }
    }
}

/// Single-location, single-year statistic for one indicator.
pub struct IndicatorTool<A, G> {
    indicator: Indicator,
    name: String,
    archive: ArchiveReference,
    aggregator: GeoTemporalAggregator<A>,
    geocoder: Arc<G>,
    settings: IndicatorSettings,
}

impl<A: RasterArchive, G: Geocoder> IndicatorTool<A, G> {
    pub fn new(
        indicator: Indicator,
        archive: ArchiveReference,
        aggregator: GeoTemporalAggregator<A>,
        geocoder: Arc<G>,
        settings: IndicatorSettings,
    ) -> Self {
        let name = tool_name(indicator, settings.span);
        Self {
            indicator,
            name,
            archive,
            aggregator,
            geocoder,
            settings,
        }
    }

    /// Compute the indicator for `location` in `year`.
    ///
    /// The output is keyed by `location` exactly as given; only the geocoder
    /// query is trimmed.
    pub fn run(&self, location: &str, year: i32) -> Result<IndicatorOutput> {
        let coordinates =
            self.geocoder
                .resolve(location.trim())?
                .ok_or_else(|| JaltolError::LocationNotFound {
                    location: location.to_string(),
                })?;
        debug!("Resolved '{}' to {}", location, coordinates);

        let region = Region::from_coordinates(coordinates);
        let window = temporal::resolve(year, self.settings.span, self.settings.step)?;
        let request = ReductionRequest::new(
            &self.archive,
            window,
            &region,
            self.indicator.temporal_reducer(),
        )
        .with_spatial_reducer(self.settings.spatial_reducer);

        let value = self.aggregator.aggregate(&request)?;
        info!(
            "{} for '{}' in {} {}: {}",
            self.indicator, location, self.settings.span, year, value
        );

        let mut years = BTreeMap::new();
        years.insert(year, value);
        let mut locations = BTreeMap::new();
        locations.insert(location.to_string(), years);
        let mut output = BTreeMap::new();
        output.insert(self.indicator.topic().to_string(), locations);
        Ok(output)
    }

    fn parse_args(&self, args: &Value) -> Result<(String, i32)> {
        let invalid = |reason: String| JaltolError::InvalidToolArguments {
            tool: self.name.clone(),
            reason,
        };

        let parsed: IndicatorArgs =
            serde_json::from_value(args.clone()).map_err(|e| invalid(e.to_string()))?;
        if parsed.location.trim().is_empty() {
            return Err(invalid("location must not be empty".to_string()));
        }
        let year = parsed.year.to_year().map_err(invalid)?;
        Ok((parsed.location, year))
    }
}

#[async_trait]
impl<A: RasterArchive, G: Geocoder> Tool for IndicatorTool<A, G> {
    fn name(&self) -> &str {
        &self.name
    }

    fn topic(&self) -> &str {
        self.indicator.topic()
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: self.name.clone(),
                description: prompt::tool_description(
                    self.indicator.topic(),
                    "specific village",
                    self.settings.span.as_str(),
                ),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "location": {
                            "type": "string",
                            "description": "Location details like village, district and state name from the user input"
                        },
                        "year": {
                            "type": "integer",
                            "description": format!("Year for which the annual {} is to be calculated", self.indicator.topic())
                        }
                    },
                    "required": ["location", "year"]
                }),
            },
        }
    }

    fn invoke(&self, args: &Value) -> Result<Value> {
        let (location, year) = self.parse_args(args)?;
        let output = self.run(&location, year)?;
        serde_json::to_value(output).map_err(|e| JaltolError::InvalidToolArguments {
            tool: self.name.clone(),
            reason: format!("failed to encode output: {}", e),
        })
    }
}

/// `Precipitation_Hydrological_Year_Single_Village`
pub fn tool_name(indicator: Indicator, span: TemporalSpan) -> String {
    let span = match span {
        TemporalSpan::Hydrological => "Hydrological",
        TemporalSpan::Calendar => "Calendar",
    };
    format!("{}_{}_Year_Single_Village", indicator.label(), span)
}

/// Tools available to the agent, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A later tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.by_name.get(&name) {
            Some(&index) => self.tools[index] = tool,
            None => {
                self.by_name.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.by_name.get(name).map(|&index| &self.tools[index])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }

    pub fn topics(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.topic()).collect()
    }

    /// Execute a tool call and return the result.
    pub fn execute(&self, tool_call: &ToolCall) -> ToolResult {
        let name = &tool_call.function.name;
        let args = &tool_call.function.arguments;

        debug!("Executing tool: {} with args: {}", name, args);

        let Some(tool) = self.get(name) else {
            return ToolResult::error(JaltolError::UnknownTool { name: name.clone() }.to_string());
        };

        match tool.invoke(args) {
            Ok(output) => ToolResult::success(output.to_string()),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
