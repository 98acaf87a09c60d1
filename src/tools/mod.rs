//! Tool registry and built-in calendar tools.
//!
//! Tools are declared once, in a fixed table, when the registry is built.
//! The registry is read-only afterwards and can be shared by any number of
//! concurrent loop runs.

mod calendar;
mod dispatch;
mod error;
mod time;

pub use calendar::{
    CalendarBackend, CreateEvent, ListCalendars, ListEvents, QuickAddEvent,
};
pub use dispatch::Dispatcher;
pub use error::ToolError;
pub use time::GetCurrentTime;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::agent::RunContext;

/// JSON type of a declared tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    /// Whether a JSON value has this type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub required: bool,
    pub description: String,
}

/// Name, description and parameter schema the model sees for a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn required(self, name: &str, kind: ParamType, description: &str) -> Self {
        self.param(name, kind, true, description)
    }

    pub fn optional(self, name: &str, kind: ParamType, description: &str) -> Self {
        self.param(name, kind, false, description)
    }

    fn param(mut self, name: &str, kind: ParamType, required: bool, description: &str) -> Self {
        self.parameters.push(ParameterSpec {
            name: name.to_string(),
            kind,
            required,
            description: description.to_string(),
        });
        self
    }

    /// JSON-schema object for the parameters, or `None` for a tool that
    /// takes no arguments.
    pub fn parameters_schema(&self) -> Option<Value> {
        if self.parameters.is_empty() {
            return None;
        }

        let mut properties = Map::new();
        for param in &self.parameters {
            properties.insert(
                param.name.clone(),
                json!({
                    "type": param.kind.as_str(),
                    "description": param.description,
                }),
            );
        }

        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        Some(json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }))
    }
}

/// A callable tool. Handlers receive arguments that already passed the
/// declared-schema check.
#[async_trait]
pub trait Tool: Send + Sync {
    fn declaration(&self) -> ToolDeclaration;

    async fn execute(&self, ctx: &RunContext, args: Value) -> Result<String, ToolError>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),
}

/// Static name → handler table.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    declarations: Vec<ToolDeclaration>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build a registry from an explicit table. Order is preserved and is
    /// the order the model sees on every call.
    pub fn from_tools(tools: Vec<Arc<dyn Tool>>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(tools.len());
        let mut declarations = Vec::with_capacity(tools.len());

        for (i, tool) in tools.iter().enumerate() {
            let declaration = tool.declaration();
            if index.insert(declaration.name.clone(), i).is_some() {
                return Err(RegistryError::DuplicateTool(declaration.name));
            }
            tracing::debug!("Registered tool: {}", declaration.name);
            declarations.push(declaration);
        }

        Ok(Self {
            tools,
            declarations,
            index,
        })
    }

    /// The standard calendar tool set.
    pub fn calendar(backend: CalendarBackend) -> Result<Self, RegistryError> {
        Self::from_tools(vec![
            Arc::new(CreateEvent::new(backend.clone())),
            Arc::new(QuickAddEvent::new(backend.clone())),
            Arc::new(ListCalendars::new(backend.clone())),
            Arc::new(ListEvents::new(backend)),
            Arc::new(GetCurrentTime),
        ])
    }

    /// Declarations in registration order.
    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.declarations
    }

    pub fn declaration(&self, name: &str) -> Option<&ToolDeclaration> {
        self.index.get(name).map(|&i| &self.declarations[i])
    }

    /// Look up the handler for a tool name.
    pub fn handler(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.tools[i]))
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
