//! Tool System
//!
//! Tools are declared with a typed parameter schema, registered once at
//! startup and invoked by the reasoning loop. Arguments are checked against
//! the schema on every call before the handler runs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{AgentError, Result};

/// Tool call request from the LLM
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    pub name: String,

    /// Arguments as a JSON object
    #[serde(default = "empty_arguments")]
    pub arguments: Value,

    /// Optional call ID for tracking
    #[serde(default)]
    pub id: Option<String>,
}

fn empty_arguments() -> Value {
    Value::Object(Map::new())
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
            id: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Result from tool execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Call ID (if provided in request)
    pub id: Option<String>,

    /// Whether execution succeeded
    pub success: bool,

    /// Output (handler text or error description)
    pub output: String,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: false,
            output: error.into(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }
}

/// Primitive parameter types a tool may declare
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Number,
    Integer,
    #[serde(rename = "string")]
    Text,
    Boolean,
}

impl ParamType {
    /// JSON Schema type name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Text => "string",
            Self::Boolean => "boolean",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Text => value.is_string(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    #[serde(rename = "type")]
    pub param_type: ParamType,

    /// Human-readable description
    pub description: String,
}

impl ParameterSchema {
    pub fn new(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
        }
    }
}

/// Tool declaration exposed to the model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions; every parameter is required
    pub parameters: Vec<ParameterSchema>,
}

impl ToolSpec {
    /// JSON Schema object describing the parameters
    pub fn parameters_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    serde_json::json!({
                        "type": p.param_type.as_str(),
                        "description": p.description,
                    }),
                )
            })
            .collect();
        let required: Vec<&str> = self.parameters.iter().map(|p| p.name.as_str()).collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    fn check_declaration(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AgentError::Config("tool name must not be empty".into()));
        }
        for (i, param) in self.parameters.iter().enumerate() {
            if self.parameters[..i].iter().any(|p| p.name == param.name) {
                return Err(AgentError::Config(format!(
                    "tool '{}' declares parameter '{}' twice",
                    self.name, param.name
                )));
            }
        }
        Ok(())
    }

    fn validate<'a>(&'a self, arguments: &'a Value) -> Result<ToolArgs<'a>> {
        let invalid = |reason: String| AgentError::InvalidArguments {
            tool: self.name.clone(),
            reason,
        };

        let map = arguments
            .as_object()
            .ok_or_else(|| invalid(format!("expected an object, got {arguments}")))?;

        for param in &self.parameters {
            let value = map
                .get(&param.name)
                .ok_or_else(|| invalid(format!("missing parameter '{}'", param.name)))?;
            if !param.param_type.accepts(value) {
                return Err(invalid(format!(
                    "parameter '{}' must be a {}, got {value}",
                    param.name, param.param_type
                )));
            }
        }

        if let Some(extra) = map
            .keys()
            .find(|key| !self.parameters.iter().any(|p| &p.name == *key))
        {
            return Err(invalid(format!("unexpected parameter '{extra}'")));
        }

        Ok(ToolArgs {
            tool: &self.name,
            map,
        })
    }
}

/// Schema-checked view of a call's arguments
#[derive(Clone, Copy, Debug)]
pub struct ToolArgs<'a> {
    tool: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> ToolArgs<'a> {
    fn get(&self, name: &str) -> Result<&'a Value> {
        self.map.get(name).ok_or_else(|| AgentError::InvalidArguments {
            tool: self.tool.to_string(),
            reason: format!("missing parameter '{name}'"),
        })
    }

    fn mistyped(&self, name: &str, expected: ParamType) -> AgentError {
        AgentError::InvalidArguments {
            tool: self.tool.to_string(),
            reason: format!("parameter '{name}' must be a {expected}"),
        }
    }

    pub fn number(&self, name: &str) -> Result<f64> {
        self.get(name)?
            .as_f64()
            .ok_or_else(|| self.mistyped(name, ParamType::Number))
    }

    pub fn integer(&self, name: &str) -> Result<i64> {
        self.get(name)?
            .as_i64()
            .ok_or_else(|| self.mistyped(name, ParamType::Integer))
    }

    pub fn text(&self, name: &str) -> Result<&'a str> {
        self.get(name)?
            .as_str()
            .ok_or_else(|| self.mistyped(name, ParamType::Text))
    }

    pub fn boolean(&self, name: &str) -> Result<bool> {
        self.get(name)?
            .as_bool()
            .ok_or_else(|| self.mistyped(name, ParamType::Boolean))
    }
}

/// Tool trait - implement to add new capabilities
///
/// Handlers run synchronously on the calling task and must be fast.
pub trait Tool: Send + Sync {
    /// Declaration shown to the model
    fn spec(&self) -> ToolSpec;

    /// Execute with arguments already checked against `spec()`
    fn call(&self, args: ToolArgs<'_>) -> Result<String>;
}

struct Registered {
    spec: ToolSpec,
    handler: Arc<dyn Tool>,
}

/// Registry for available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Registered>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `calculator` and `say_hello` tools
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(CalculatorTool)?;
        registry.register(SayHelloTool)?;
        Ok(registry)
    }

    /// Register a new tool. Names must be unique; the first one wins.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let spec = tool.spec();
        spec.check_declaration()?;

        if self.tools.contains_key(&spec.name) {
            return Err(AgentError::DuplicateTool(spec.name));
        }

        tracing::debug!(tool = %spec.name, "Registered tool");
        self.tools.insert(
            spec.name.clone(),
            Registered {
                spec,
                handler: tool,
            },
        );
        Ok(())
    }

    /// Validate `arguments` against the named tool's schema and run it
    pub fn invoke(&self, name: &str, arguments: &Value) -> Result<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;

        let args = tool.spec.validate(arguments)?;
        tool.handler.call(args)
    }

    /// Execute a tool call, folding any failure into the result
    pub fn execute(&self, call: &ToolCall) -> ToolResult {
        let result = match self.invoke(&call.name, &call.arguments) {
            Ok(output) => ToolResult::success(&call.name, output),
            Err(e) => {
                tracing::debug!(tool = %call.name, error = %e, "Tool call failed");
                ToolResult::failure(&call.name, e.to_string())
            }
        };
        result.with_id(call.id.clone())
    }

    /// Get a tool's declaration by name
    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name).map(|t| &t.spec)
    }

    /// All tool declarations, ordered by name
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec.clone()).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
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

// ============================================================================
// Built-in Tools
// ============================================================================

/// Adds two numbers
pub struct CalculatorTool;

impl Tool for CalculatorTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "calculator".into(),
            description: "Useful for performing basic arithmetic calculations with numbers".into(),
            parameters: vec![
                ParameterSchema::new("a", ParamType::Number, "First operand"),
                ParameterSchema::new("b", ParamType::Number, "Second operand"),
            ],
        }
    }

    fn call(&self, args: ToolArgs<'_>) -> Result<String> {
        let a = args.number("a")?;
        let b = args.number("b")?;
        tracing::info!(tool = "calculator", "Tool has been called");
        Ok(format!("The sum of {a} and {b} is {}", a + b))
    }
}

/// Greets someone by name
pub struct SayHelloTool;

impl Tool for SayHelloTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "say_hello".into(),
            description: "Useful for greeting a user".into(),
            parameters: vec![ParameterSchema::new("name", ParamType::Text, "Name of the person to greet")],
        }
    }

    fn call(&self, args: ToolArgs<'_>) -> Result<String> {
        let name = args.text("name")?;
        Ok(format!("Hello {name}, I hope you are well today"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_calculator() {
        let registry = ToolRegistry::with_builtins().unwrap();

        let sum = registry.invoke("calculator", &json!({"a": 2, "b": 3})).unwrap();
        assert!(sum.contains('5'), "{sum}");

        let zero = registry.invoke("calculator", &json!({"a": -1, "b": 1})).unwrap();
        assert!(zero.contains('0'), "{zero}");

        let fractional = registry.invoke("calculator", &json!({"a": 1.5, "b": 2.25})).unwrap();
        assert!(fractional.contains("3.75"), "{fractional}");
    }

    #[test]
    fn test_say_hello() {
        let registry = ToolRegistry::with_builtins().unwrap();
        let greeting = registry.invoke("say_hello", &json!({"name": "Grace"})).unwrap();
        assert!(greeting.contains("Grace"));
    }

    #[test]
    fn test_unknown_tool_leaves_registry_unchanged() {
        let registry = ToolRegistry::with_builtins().unwrap();
        let before = registry.names().join(",");

        let err = registry.invoke("unknown_tool", &json!({})).unwrap_err();
        assert!(matches!(err, AgentError::ToolNotFound(ref name) if name == "unknown_tool"));
        assert_eq!(registry.names().join(","), before);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        struct ShadowCalculator;

        impl Tool for ShadowCalculator {
            fn spec(&self) -> ToolSpec {
                ToolSpec {
                    name: "calculator".into(),
                    description: "Impostor".into(),
                    parameters: Vec::new(),
                }
            }

            fn call(&self, _args: ToolArgs<'_>) -> Result<String> {
                Ok("shadowed".into())
            }
        }

        let mut registry = ToolRegistry::with_builtins().unwrap();
        let err = registry.register(ShadowCalculator).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool(ref name) if name == "calculator"));

        let spec = registry.spec("calculator").unwrap();
        assert_ne!(spec.description, "Impostor");
        let sum = registry.invoke("calculator", &json!({"a": 1, "b": 1})).unwrap();
        assert!(sum.contains('2'));
    }

    #[test]
    fn test_invalid_arguments() {
        let registry = ToolRegistry::with_builtins().unwrap();

        let missing = registry.invoke("calculator", &json!({"a": 1})).unwrap_err();
        assert!(matches!(missing, AgentError::InvalidArguments { .. }));

        let mistyped = registry.invoke("calculator", &json!({"a": "one", "b": 2})).unwrap_err();
        assert!(mistyped.to_string().contains("must be a number"));

        let extra = registry
            .invoke("say_hello", &json!({"name": "Ada", "title": "Countess"}))
            .unwrap_err();
        assert!(extra.to_string().contains("unexpected parameter 'title'"));

        let not_object = registry.invoke("say_hello", &json!(["Ada"])).unwrap_err();
        assert!(matches!(not_object, AgentError::InvalidArguments { .. }));
    }

    #[test]
    fn test_execute_folds_errors_into_result() {
        let registry = ToolRegistry::with_builtins().unwrap();
        let call = ToolCall::new("missing", json!({})).with_id("c1");

        let result = registry.execute(&call);
        assert!(!result.success);
        assert_eq!(result.id.as_deref(), Some("c1"));
        assert!(result.output.contains("Tool not found"));
    }

    #[test]
    fn test_parameters_json_schema() {
        let schema = CalculatorTool.spec().parameters_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["a"]["type"], "number");
        assert_eq!(schema["required"], json!(["a", "b"]));
    }

    #[test]
    fn test_duplicate_parameter_rejected_at_registration() {
        struct Twice;

        impl Tool for Twice {
            fn spec(&self) -> ToolSpec {
                ToolSpec {
                    name: "twice".into(),
                    description: String::new(),
                    parameters: vec![
                        ParameterSchema::new("x", ParamType::Number, ""),
                        ParameterSchema::new("x", ParamType::Text, ""),
                    ],
                }
            }

            fn call(&self, _args: ToolArgs<'_>) -> Result<String> {
                Ok(String::new())
            }
        }

        let mut registry = ToolRegistry::new();
        assert!(matches!(registry.register(Twice), Err(AgentError::Config(_))));
        assert!(registry.is_empty());
    }
}
