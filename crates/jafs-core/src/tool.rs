//! Tool System
//!
//! Extensible tool framework for agent capabilities.
//! Tools are registered once and invoked by the reasoning loop through the
//! [`ToolRegistry`], which validates the parameter contract before execution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;

use crate::error::{AgentError, Result};

/// Tool call extracted from a model completion
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier, `call_{n}` within one completion
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub arguments: HashMap<String, serde_json::Value>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: HashMap::new(),
        }
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }

    /// String argument lookup
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(serde_json::Value::as_str)
    }
}

/// Result from tool execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Call ID of the originating request
    pub id: Option<String>,

    /// Whether execution succeeded
    pub success: bool,

    /// Human-readable outcome (success message or error)
    pub message: String,

    /// Structured data (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: false,
            message: error.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,
}

impl ParameterSchema {
    pub fn required(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }
}

/// Tool definition schema (used to describe tools to the model)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

impl ToolSchema {
    /// Names of parameters that must be present in every call
    pub fn required_parameters(&self) -> BTreeSet<&str> {
        self.parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Prompt-facing form: `{name, description, parameters: {name -> {type, description, required}}}`
    pub fn to_json(&self) -> serde_json::Value {
        let parameters: serde_json::Map<String, serde_json::Value> = self
            .parameters
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    serde_json::json!({
                        "type": p.param_type,
                        "description": p.description,
                        "required": p.required,
                    }),
                )
            })
            .collect();

        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "parameters": parameters,
        })
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema
    fn schema(&self) -> ToolSchema;

    /// Execute the tool. Failures are reported through `ToolResult::success`.
    async fn execute(&self, call: &ToolCall) -> ToolResult;

    /// Validate arguments before execution
    fn validate(&self, call: &ToolCall) -> Result<()> {
        let schema = self.schema();
        let missing: Vec<&str> = schema
            .required_parameters()
            .into_iter()
            .filter(|name| !call.arguments.contains_key(*name))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AgentError::ToolValidation(format!(
                "Missing required parameter(s) for '{}': {}",
                schema.name,
                missing.join(", ")
            )))
        }
    }
}

/// Registry for available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_boxed(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_boxed(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        if self.tools.insert(schema.name.clone(), tool).is_some() {
            tracing::warn!(tool = %schema.name, "Replaced previously registered tool");
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Whether a tool is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Execute a tool call.
    ///
    /// Unknown tools and validation failures produce a failed `ToolResult`;
    /// `Tool::execute` is only reached once validation passes.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            let err = AgentError::ToolNotFound(call.name.clone());
            return ToolResult::failure(&call.name, err.to_string()).with_id(&call.id);
        };

        if let Err(err) = tool.validate(call) {
            tracing::debug!(tool = %call.name, error = %err, "Tool validation failed");
            return ToolResult::failure(&call.name, err.to_string()).with_id(&call.id);
        }

        let mut result = tool.execute(call).await;
        result.id = Some(call.id.clone());
        result
    }

    /// Schemas for the given tool names, sorted by name. Unknown names are ignored.
    pub fn schemas_for<'a, I>(&self, names: I) -> Vec<ToolSchema>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut schemas: Vec<ToolSchema> = names
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.schema())
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Get all tool schemas, sorted by name
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Instructions appended to the system prompt when tools are available
pub const TOOL_INSTRUCTIONS: &str = r#"To use a tool, respond with JSON in the following format:
```json
{
  "tool_calls": [
    {
      "name": "tool_name",
      "arguments": {
        "param1": "value1"
      }
    }
  ]
}
```
If you don't need to use a tool, respond normally."#;

/// Render the "Available tools" prompt section for a set of schemas
pub fn render_tool_section(schemas: &[ToolSchema]) -> String {
    let mut prompt = String::from("Available tools:\n");

    for schema in schemas {
        let _ = writeln!(prompt, "- {}: {}", schema.name, schema.description);
        if !schema.parameters.is_empty() {
            prompt.push_str("  Parameters:\n");
            for param in &schema.parameters {
                let required = if param.required { "required" } else { "optional" };
                let _ = writeln!(
                    prompt,
                    "    - {} ({}, {}): {}",
                    param.name, param.param_type, required, param.description
                );
            }
        }
    }

    prompt.push('\n');
    prompt.push_str(TOOL_INSTRUCTIONS);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".into(),
                description: "Echo the input back".into(),
                parameters: vec![
                    ParameterSchema::required("text", "string", "Text to echo"),
                    ParameterSchema::optional("upper", "boolean", "Uppercase the output"),
                ],
            }
        }

        async fn execute(&self, call: &ToolCall) -> ToolResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ToolResult::success("echo", call.str_arg("text").unwrap_or_default())
        }
    }

    fn registry_with_echo() -> (ToolRegistry, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool {
            calls: Arc::clone(&calls),
        });
        (registry, calls)
    }

    #[tokio::test]
    async fn test_missing_required_parameter_skips_execute() {
        let (registry, calls) = registry_with_echo();
        let call = ToolCall::new("call_0", "echo").with_argument("upper", true.into());

        let result = registry.execute(&call).await;

        assert!(!result.success);
        assert!(result.message.contains("text"));
        assert_eq!(result.id.as_deref(), Some("call_0"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_call_executes() {
        let (registry, calls) = registry_with_echo();
        let call = ToolCall::new("call_3", "echo").with_argument("text", "hello".into());

        let result = registry.execute(&call).await;

        assert!(result.success);
        assert_eq!(result.message, "hello");
        assert_eq!(result.id.as_deref(), Some("call_3"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_softly() {
        let (registry, _) = registry_with_echo();
        let result = registry.execute(&ToolCall::new("call_0", "search")).await;

        assert!(!result.success);
        assert!(result.message.contains("search"));
    }

    #[test]
    fn test_schema_json_and_required_set() {
        let (registry, _) = registry_with_echo();
        let schemas = registry.schemas();
        let schema = &schemas[0];

        assert_eq!(schema.required_parameters().into_iter().collect::<Vec<_>>(), vec!["text"]);

        let json = schema.to_json();
        assert_eq!(json["name"], "echo");
        assert_eq!(json["parameters"]["text"]["required"], true);
        assert_eq!(json["parameters"]["upper"]["type"], "boolean");
    }

    #[test]
    fn test_tool_section_lists_parameters() {
        let (registry, _) = registry_with_echo();
        let section = render_tool_section(&registry.schemas_for(&["echo".to_string()]));

        assert!(section.contains("- echo: Echo the input back"));
        assert!(section.contains("text (string, required)"));
        assert!(section.contains("\"tool_calls\""));
    }
}
