//! Tool dispatcher: validates a call against its declaration and invokes
//! the handler at most once.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::agent::RunContext;

use super::{ToolDeclaration, ToolError, ToolRegistry};

/// Executes model-requested tool calls against a registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Decode `raw_args`, check them against the tool's declaration and run
    /// the handler. Unknown tools and bad arguments never reach a handler.
    pub async fn execute(
        &self,
        ctx: &RunContext,
        name: &str,
        raw_args: &str,
    ) -> Result<String, ToolError> {
        let tool = self.registry.handler(name)?;
        let declaration = self
            .registry
            .declaration(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let args = decode_arguments(declaration, raw_args)?;

        tracing::info!("Executing tool: {} with args: {}", name, raw_args);

        match tokio::time::timeout(self.timeout, tool.execute(ctx, Value::Object(args))).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool: name.to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

/// Parse a raw argument payload and enforce required fields and types.
fn decode_arguments(
    declaration: &ToolDeclaration,
    raw_args: &str,
) -> Result<Map<String, Value>, ToolError> {
    let tool = declaration.name.as_str();
    let raw = raw_args.trim();

    let value: Value = if raw.is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_str(raw)
            .map_err(|e| ToolError::malformed(tool, format!("arguments are not valid JSON: {}", e)))?
    };

    let args = match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(ToolError::malformed(
                tool,
                format!("expected a JSON object, got {}", other),
            ))
        }
    };

    for param in &declaration.parameters {
        match args.get(&param.name) {
            None | Some(Value::Null) if param.required => {
                return Err(ToolError::malformed(
                    tool,
                    format!("missing required field `{}`", param.name),
                ));
            }
            None | Some(Value::Null) => {}
            Some(value) if !param.kind.matches(value) => {
                return Err(ToolError::malformed(
                    tool,
                    format!("field `{}` must be of type {}", param.name, param.kind.as_str()),
                ));
            }
            Some(_) => {}
        }
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::tools::{ParamType, Tool};

    struct Recorder {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for Recorder {
        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration::new("create_event", "Creates an event")
                .required("summary", ParamType::String, "Title")
                .optional("max_results", ParamType::Integer, "Limit")
        }

        async fn execute(&self, _ctx: &RunContext, args: Value) -> Result<String, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("created {}", args["summary"].as_str().unwrap_or_default()))
        }
    }

    struct Sleeper;

    #[async_trait]
    impl Tool for Sleeper {
        fn declaration(&self) -> ToolDeclaration {
            ToolDeclaration::new("slow", "Never finishes in time")
        }

        async fn execute(&self, _ctx: &RunContext, _args: Value) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("late".to_string())
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = ToolRegistry::from_tools(vec![
            Arc::new(Recorder {
                calls: Arc::clone(&calls),
            }),
            Arc::new(Sleeper),
        ])
        .unwrap();
        (
            Dispatcher::new(Arc::new(registry), Duration::from_millis(50)),
            calls,
        )
    }

    #[tokio::test]
    async fn valid_call_invokes_handler_once() {
        let (dispatcher, calls) = dispatcher();
        let ctx = RunContext::new("user");

        let out = dispatcher
            .execute(&ctx, "create_event", r#"{"summary":"Standup"}"#)
            .await
            .unwrap();

        assert_eq!(out, "created Standup");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_tool_never_reaches_a_handler() {
        let (dispatcher, calls) = dispatcher();
        let err = dispatcher
            .execute(&RunContext::new("user"), "delete_everything", "{}")
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::UnknownTool(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_required_field_is_malformed() {
        let (dispatcher, calls) = dispatcher();
        let err = dispatcher
            .execute(&RunContext::new("user"), "create_event", r#"{"max_results":3}"#)
            .await
            .unwrap_err();

        assert!(
            matches!(&err, ToolError::MalformedArguments { reason, .. } if reason.contains("summary"))
        );
        assert!(err.into_feedback().is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wrong_type_is_malformed() {
        let (dispatcher, _) = dispatcher();
        let err = dispatcher
            .execute(
                &RunContext::new("user"),
                "create_event",
                r#"{"summary":"x","max_results":"ten"}"#,
            )
            .await
            .unwrap_err();

        assert!(
            matches!(&err, ToolError::MalformedArguments { reason, .. } if reason.contains("integer"))
        );
    }

    #[tokio::test]
    async fn invalid_json_is_malformed() {
        let (dispatcher, _) = dispatcher();
        let err = dispatcher
            .execute(&RunContext::new("user"), "create_event", "{summary:")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::MalformedArguments { .. }));
    }

    #[tokio::test]
    async fn empty_payload_means_no_arguments() {
        let declaration = ToolDeclaration::new("get_current_time", "Now");
        assert!(decode_arguments(&declaration, "").unwrap().is_empty());
        assert!(decode_arguments(&declaration, "null").unwrap().is_empty());
        assert!(decode_arguments(&declaration, "[1]").is_err());
        assert_eq!(
            decode_arguments(&declaration, r#"{"extra":1}"#).unwrap()["extra"],
            json!(1)
        );
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let (dispatcher, _) = dispatcher();
        let err = dispatcher
            .execute(&RunContext::new("user"), "slow", "")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
        assert!(err.into_feedback().is_ok());
    }
}
