//! Tool System
//!
//! Tool contracts, schema-less argument access and the runtime registry.
//! The registry publishes immutable snapshots, so readers building a model
//! request never see a half-updated catalogue while tools are registered or
//! removed.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AgentError, Result};

/// Argument payload of a tool call.
///
/// The model sends arguments as untyped JSON. The accessors return a
/// `ToolValidation` error naming the offending field, which the dispatcher
/// hands back to the model as text.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolArguments(Map<String, Value>);

impl ToolArguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw payload. Blank input is an empty object; anything that is
    /// not a JSON object yields `None`.
    pub fn try_parse(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return Some(Self::new());
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Some(Self(map)),
            _ => None,
        }
    }

    /// Builder used by tests and internal callers
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Required string field
    pub fn str(&self, key: &str) -> Result<&str> {
        self.opt_str(key)?.ok_or_else(|| missing(key))
    }

    /// Optional string field
    pub fn opt_str(&self, key: &str) -> Result<Option<&str>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(invalid(key, "a string")),
        }
    }

    /// Required integer field (numeric strings are accepted)
    pub fn i64(&self, key: &str) -> Result<i64> {
        self.opt_i64(key)?.ok_or_else(|| missing(key))
    }

    /// Optional integer field
    pub fn opt_i64(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(whole_f64))
                .map(Some)
                .ok_or_else(|| invalid(key, "an integer")),
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| invalid(key, "an integer")),
            Some(_) => Err(invalid(key, "an integer")),
        }
    }

    /// Optional boolean field ("true"/"false" strings are accepted)
    pub fn opt_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(invalid(key, "a boolean")),
            },
            Some(_) => Err(invalid(key, "a boolean")),
        }
    }

    /// Boolean field with a default
    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self.opt_bool(key)?.unwrap_or(default))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Whole floats such as `3.0`, as some models emit them for integer fields.
#[allow(clippy::cast_possible_truncation)]
fn whole_f64(f: f64) -> Option<i64> {
    // Below 2^53 every integral f64 is exact, so the cast cannot truncate.
    (f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}

fn missing(key: &str) -> AgentError {
    AgentError::ToolValidation(format!("missing required parameter '{key}'"))
}

fn invalid(key: &str, expected: &str) -> AgentError {
    AgentError::ToolValidation(format!("parameter '{key}' must be {expected}"))
}

/// A parsed tool call ready for execution
#[derive(Clone, Debug)]
pub struct ToolCall {
    /// Call identifier from the model
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Parsed arguments
    pub arguments: ToolArguments,

    /// User on whose behalf the tool runs
    pub user_id: String,
}

/// Process-wide state change requested by a tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolEffect {
    /// The on-disk skill set changed and must be reloaded
    SkillsChanged,
}

/// Result from tool execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Whether execution succeeded
    pub success: bool,

    /// Output (success message or error)
    pub output: String,

    /// Side effect to apply after the batch completes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<ToolEffect>,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            output: output.into(),
            effect: None,
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: false,
            output: error.into(),
            effect: None,
        }
    }

    #[must_use]
    pub const fn with_effect(mut self, effect: ToolEffect) -> Self {
        self.effect = Some(effect);
        self
    }
}

/// Backend family a tool belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Long-term memory store
    Memory,
    /// Cron-style scheduled jobs
    Scheduling,
    /// Skill search/installation
    SkillMarketplace,
    /// Filesystem and process execution
    Workspace,
    #[default]
    General,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Memory => "memory",
            Self::Scheduling => "scheduling",
            Self::SkillMarketplace => "skill_marketplace",
            Self::Workspace => "workspace",
            Self::General => "general",
        };
        f.write_str(s)
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, integer, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
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
            enum_values: None,
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

    #[must_use]
    pub fn with_enum<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// Tool definition schema (for LLM function calling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,

    /// Routing category
    #[serde(default)]
    pub category: ToolCategory,

    /// Whether tool has side effects
    #[serde(default)]
    pub has_side_effects: bool,
}

impl ToolSchema {
    /// JSON Schema object describing the parameters
    pub fn parameters_json(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.parameters {
            let mut prop = json!({
                "type": param.param_type,
                "description": param.description,
            });
            if let Some(values) = &param.enum_values {
                prop["enum"] = Value::Array(values.clone());
            }
            properties.insert(param.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// OpenAI-style function descriptor
    pub fn to_function_json(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters_json(),
            }
        })
    }
}

/// Tool trait - implement to add new capabilities
///
/// Implementations should report bad input and recoverable failures in the
/// returned text; an `Err` is still contained by the dispatcher and shown to
/// the model as an error string.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema for LLM function calling
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with given arguments
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult>;
}

type ToolMap = HashMap<String, Arc<dyn Tool>>;

/// Registry for available tools
pub struct ToolRegistry {
    tools: ArcSwap<ToolMap>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Register a new tool. Names are unique across the registry.
    pub fn register<T: Tool + 'static>(&self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register a shared tool
    pub fn register_arc(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.schema().name;
        let mut duplicate = false;
        self.tools.rcu(|current| {
            duplicate = current.contains_key(&name);
            if duplicate {
                return Arc::clone(current);
            }
            let mut next = ToolMap::clone(current);
            next.insert(name.clone(), Arc::clone(&tool));
            Arc::new(next)
        });

        if duplicate {
            return Err(AgentError::Config(format!("tool '{name}' is already registered")));
        }
        tracing::debug!(tool = %name, "Registered tool");
        Ok(())
    }

    /// Remove a tool, returning whether it was present
    pub fn unregister(&self, name: &str) -> bool {
        let mut removed = false;
        self.tools.rcu(|current| {
            removed = current.contains_key(name);
            if !removed {
                return Arc::clone(current);
            }
            let mut next = ToolMap::clone(current);
            next.remove(name);
            Arc::new(next)
        });
        removed
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.load().get(name).cloned()
    }

    /// All tool schemas, sorted by name
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let snapshot = self.tools.load_full();
        let mut schemas: Vec<ToolSchema> = snapshot.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Get tool names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.load().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.load().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.load().is_empty()
    }

    /// Short tool guide for the system prompt, grouped by category
    pub fn describe(&self) -> String {
        let schemas = self.schemas();
        let mut grouped: Vec<(ToolCategory, Vec<&ToolSchema>)> = Vec::new();
        for schema in &schemas {
            match grouped.iter_mut().find(|(c, _)| *c == schema.category) {
                Some((_, list)) => list.push(schema),
                None => grouped.push((schema.category, vec![schema])),
            }
        }
        grouped.sort_by_key(|(c, _)| c.to_string());

        let mut out = String::new();
        for (category, list) in grouped {
            let names: Vec<&str> = list.iter().map(|s| s.name.as_str()).collect();
            out.push_str(&format!("- {category}: {}\n", names.join(", ")));
        }
        out
    }
}
