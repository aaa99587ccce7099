//! Tools the assistant may invoke mid-generation.
//!
//! Every tool returns a `ToolResult` instead of an `Err` so the model can
//! inspect and narrate failures rather than aborting generation. The fact
//! tools capture the authenticated user when the registry is built; the
//! model never supplies an owner id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;
use validator::Validate;

use crate::models::facts::{NewRating, NewRevenue, NewVisitor};
use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        let msg = error.into();
        Self {
            success: false,
            output: Value::Null,
            error: Some(msg),
        }
    }

    /// Rendering used for the `tool` role message fed back to the model.
    pub fn into_message_content(self) -> String {
        serde_json::to_string(&self).unwrap_or_else(|_| {
            r#"{"success":false,"error":"failed to serialize tool result"}"#.to_string()
        })
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the function-calling declaration.
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, args: Value) -> ToolResult;
}

/// Registry of available tools.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// The fixed tool set offered on the chat route, bound to the caller.
    pub fn for_user(state: Arc<AppState>, user_id: Uuid) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ChartTool));
        registry.register(Arc::new(VisitorTool {
            state: state.clone(),
            user_id,
        }));
        registry.register(Arc::new(RevenueTool {
            state: state.clone(),
            user_id,
        }));
        registry.register(Arc::new(RatingTool { state, user_id }));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Function-calling declarations for the completion request body.
    pub fn to_openai_spec(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name(),
                        "description": tool.description(),
                        "parameters": tool.parameters_schema(),
                    }
                })
            })
            .collect()
    }

    /// Run a named tool against the model-supplied argument string.
    pub async fn dispatch(&self, name: &str, arguments: &str) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            return ToolResult::error(format!("Unknown tool '{}'", name));
        };

        let args: Value = match serde_json::from_str(arguments) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("Invalid tool arguments: {}", e)),
        };

        tool.execute(args).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Chart generation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
    Pie,
    Area,
}

impl ChartType {
    fn as_str(&self) -> &'static str {
        match self {
            ChartType::Line => "line",
            ChartType::Bar => "bar",
            ChartType::Pie => "pie",
            ChartType::Area => "area",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartPoint {
    pub name: String,
    pub value: f64,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChartArgs {
    #[serde(rename = "chartType")]
    pub chart_type: ChartType,
    pub title: String,
    pub data: Vec<ChartPoint>,
    #[serde(rename = "xAxisLabel")]
    pub x_axis_label: Option<String>,
    #[serde(rename = "yAxisLabel")]
    pub y_axis_label: Option<String>,
    pub description: Option<String>,
}

/// Chart config plus the aggregate stats shown beside the rendered chart.
pub fn build_chart(args: &ChartArgs) -> Value {
    let total: f64 = args.data.iter().map(|p| p.value).sum();
    let mean = total / args.data.len() as f64;

    let config = match args.chart_type {
        ChartType::Pie => json!({
            "type": "pie",
            "data": args.data.iter().map(|p| json!({
                "name": p.name,
                "value": p.value,
                "percentage": format!("{:.1}", p.value / total * 100.0),
            })).collect::<Vec<_>>(),
        }),
        chart_type => {
            let (x_default, y_default) = match chart_type {
                ChartType::Bar => ("Categories", "Value"),
                _ => ("Time/Period", "Value"),
            };
            json!({
                "type": chart_type.as_str(),
                "data": args.data.iter().map(|p| json!({
                    "name": p.name,
                    "value": p.value,
                    "category": p.category.clone().unwrap_or_else(|| "default".to_string()),
                })).collect::<Vec<_>>(),
                "xAxis": args.x_axis_label.clone().unwrap_or_else(|| x_default.to_string()),
                "yAxis": args.y_axis_label.clone().unwrap_or_else(|| y_default.to_string()),
            })
        }
    };

    json!({
        "title": args.title,
        "description": args.description.clone().unwrap_or_else(|| {
            format!("Generated {} chart for data analysis", args.chart_type.as_str())
        }),
        "config": config,
        "dataPoints": args.data.len(),
        "totalValue": total,
        "averageValue": format!("{:.2}", mean),
    })
}

pub struct ChartTool;

#[async_trait]
impl Tool for ChartTool {
    fn name(&self) -> &str {
        "generate_chart"
    }

    fn description(&self) -> &str {
        "Generate charts and visualizations for event data analysis. Supports line charts, bar charts, pie charts, and area charts."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "chartType": {
                    "type": "string",
                    "enum": ["line", "bar", "pie", "area"],
                    "description": "Type of chart to generate"
                },
                "title": {"type": "string", "description": "Title of the chart"},
                "data": {
                    "type": "array",
                    "description": "Array of data points for the chart",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string", "description": "Data point name or label"},
                            "value": {"type": "number", "description": "Numeric value for the data point"},
                            "category": {"type": "string", "description": "Optional category for grouping data"}
                        },
                        "required": ["name", "value"]
                    }
                },
                "xAxisLabel": {"type": "string", "description": "Label for X-axis"},
                "yAxisLabel": {"type": "string", "description": "Label for Y-axis"},
                "description": {"type": "string", "description": "Description or context for the chart"}
            },
            "required": ["chartType", "title", "data"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let args: ChartArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("Invalid chart arguments: {}", e)),
        };

        if args.data.is_empty() {
            return ToolResult::error("No data provided for chart generation");
        }

        ToolResult::success(json!({"chart": build_chart(&args)}))
    }
}

// ============================================================================
// Fact-table tools
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
struct VisitorArgs {
    #[validate(length(min = 1))]
    page_visited: String,
}

pub struct VisitorTool {
    state: Arc<AppState>,
    user_id: Uuid,
}

#[async_trait]
impl Tool for VisitorTool {
    fn name(&self) -> &str {
        "record_visitor"
    }

    fn description(&self) -> &str {
        "Save a visitor record to the visitor table."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_visited": {"type": "string", "description": "The page that was visited"}
            },
            "required": ["page_visited"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let args: VisitorArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("Invalid visitor arguments: {}", e)),
        };
        if let Err(e) = args.validate() {
            return ToolResult::error(format!("Invalid visitor arguments: {}", e));
        }

        match self.state.db.insert_visitor(NewVisitor {
            user_id: self.user_id,
            page_visited: args.page_visited,
        }) {
            Ok(_) => ToolResult::success(json!({})),
            Err(e) => {
                error!("record_visitor failed: {:?}", e);
                ToolResult::error("Failed to save visitor record")
            }
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
struct RevenueArgs {
    #[validate(range(min = 0.0))]
    amount: f64,
    #[validate(length(min = 1))]
    source: String,
}

pub struct RevenueTool {
    state: Arc<AppState>,
    user_id: Uuid,
}

#[async_trait]
impl Tool for RevenueTool {
    fn name(&self) -> &str {
        "record_revenue"
    }

    fn description(&self) -> &str {
        "Save a revenue record to the revenue table."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "amount": {"type": "number", "description": "Revenue amount"},
                "source": {"type": "string", "description": "Revenue source"}
            },
            "required": ["amount", "source"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let args: RevenueArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("Invalid revenue arguments: {}", e)),
        };
        if let Err(e) = args.validate() {
            return ToolResult::error(format!("Invalid revenue arguments: {}", e));
        }

        match self.state.db.insert_revenue(NewRevenue {
            user_id: self.user_id,
            amount: args.amount,
            source: args.source,
        }) {
            Ok(_) => ToolResult::success(json!({})),
            Err(e) => {
                error!("record_revenue failed: {:?}", e);
                ToolResult::error("Failed to save revenue record")
            }
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
struct RatingArgs {
    #[validate(range(min = 1, max = 5))]
    rating: i32,
    comment: Option<String>,
}

pub struct RatingTool {
    state: Arc<AppState>,
    user_id: Uuid,
}

#[async_trait]
impl Tool for RatingTool {
    fn name(&self) -> &str {
        "record_rating"
    }

    fn description(&self) -> &str {
        "Save a rating record (1-5, with optional comment) to the rating table."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "rating": {"type": "integer", "minimum": 1, "maximum": 5, "description": "Rating value 1-5"},
                "comment": {"type": "string", "description": "Optional comment"}
            },
            "required": ["rating"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let args: RatingArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return ToolResult::error(format!("Invalid rating arguments: {}", e)),
        };
        if let Err(e) = args.validate() {
            return ToolResult::error(format!("Invalid rating arguments: {}", e));
        }

        match self.state.db.insert_rating(NewRating {
            user_id: self.user_id,
            rating: args.rating,
            comment: args.comment,
        }) {
            Ok(_) => ToolResult::success(json!({})),
            Err(e) => {
                error!("record_rating failed: {:?}", e);
                ToolResult::error("Failed to save rating record")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chart_args(chart_type: ChartType, values: &[(&str, f64)]) -> ChartArgs {
        ChartArgs {
            chart_type,
            title: "Test".to_string(),
            data: values
                .iter()
                .map(|(name, value)| ChartPoint {
                    name: name.to_string(),
                    value: *value,
                    category: None,
                })
                .collect(),
            x_axis_label: None,
            y_axis_label: None,
            description: None,
        }
    }

    #[test]
    fn bar_chart_aggregates() {
        let chart = build_chart(&chart_args(ChartType::Bar, &[("a", 10.0), ("b", 20.0)]));

        assert_eq!(chart["dataPoints"], 2);
        assert_eq!(chart["totalValue"], 30.0);
        assert_eq!(chart["averageValue"], "15.00");
        assert_eq!(chart["config"]["type"], "bar");
        assert_eq!(chart["config"]["xAxis"], "Categories");
    }

    #[test]
    fn pie_chart_percentages_sum_to_hundred() {
        let chart = build_chart(&chart_args(
            ChartType::Pie,
            &[("a", 25.0), ("b", 25.0), ("c", 50.0)],
        ));

        let data = chart["config"]["data"].as_array().unwrap();
        let sum: f64 = data
            .iter()
            .map(|p| p["percentage"].as_str().unwrap().parse::<f64>().unwrap())
            .sum();
        assert!((sum - 100.0).abs() < 0.2);
        assert_eq!(data[2]["percentage"], "50.0");
    }

    #[test]
    fn line_chart_defaults_axis_labels() {
        let chart = build_chart(&chart_args(ChartType::Line, &[("jan", 1.0)]));
        assert_eq!(chart["config"]["xAxis"], "Time/Period");
        assert_eq!(chart["config"]["yAxis"], "Value");
        assert_eq!(chart["config"]["data"][0]["category"], "default");
    }

    #[tokio::test]
    async fn chart_tool_rejects_empty_data() {
        let result = ChartTool
            .execute(json!({"chartType": "line", "title": "t", "data": []}))
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("No data"));
    }

    #[tokio::test]
    async fn chart_tool_rejects_unknown_type() {
        let result = ChartTool
            .execute(json!({"chartType": "donut", "title": "t", "data": [{"name": "a", "value": 1}]}))
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_result() {
        let registry = ToolRegistry::new();
        let result = registry.dispatch("no_such_tool", "{}").await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Unknown tool"));
    }

    #[test]
    fn openai_spec_declares_function_entries() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ChartTool));
        let spec = registry.to_openai_spec();

        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["type"], "function");
        assert_eq!(spec[0]["function"]["name"], "generate_chart");
        assert_eq!(
            spec[0]["function"]["parameters"]["required"][0],
            "chartType"
        );
    }

    #[test]
    fn rating_args_range_enforced() {
        let ok: RatingArgs = serde_json::from_value(json!({"rating": 5})).unwrap();
        assert!(ok.validate().is_ok());

        let out_of_range: RatingArgs = serde_json::from_value(json!({"rating": 6})).unwrap();
        assert!(out_of_range.validate().is_err());
    }
}
