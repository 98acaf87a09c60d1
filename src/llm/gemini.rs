//! Google Gemini provider (`generateContent` REST API).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{LlmError, ModelClient, ModelTurn, Role, ToolCall, ToolOutcome, Turn};
use crate::tools::ToolDeclaration;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub temperature: f32,
    pub system_instruction: Option<String>,
    pub timeout: Duration,
}

pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::NotConfigured(
                "GEMINI_API_KEY is not set".to_string(),
            ));
        }
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(
        &self,
        model: &str,
        history: &[Turn],
        tools: &[ToolDeclaration],
    ) -> Result<ModelTurn, LlmError> {
        let body = build_request_body(
            history,
            tools,
            self.config.system_instruction.as_deref(),
            self.config.temperature,
        );

        tracing::debug!(model = %model, turns = history.len(), "Calling Gemini API");

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        parse_response(&parsed)
    }
}

/// Arguments are kept as raw text in the history; the wire wants an object.
fn arguments_object(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Value::Object(map),
        _ => Value::Object(Map::new()),
    }
}

fn turn_to_content(turn: &Turn) -> Option<Value> {
    match turn.role {
        Role::User => {
            let text = turn.content.as_deref()?;
            Some(json!({ "role": "user", "parts": [{ "text": text }] }))
        }
        Role::Model => {
            let mut parts = Vec::new();
            if let Some(text) = turn.content.as_deref().filter(|t| !t.is_empty()) {
                parts.push(json!({ "text": text }));
            }
            for call in &turn.tool_calls {
                parts.push(json!({
                    "functionCall": {
                        "name": call.name,
                        "args": arguments_object(&call.arguments),
                    }
                }));
            }
            if parts.is_empty() {
                return None;
            }
            Some(json!({ "role": "model", "parts": parts }))
        }
        Role::Tool => {
            let result = turn.tool_result.as_ref()?;
            let response = match &result.outcome {
                ToolOutcome::Success(text) => json!({ "result": text }),
                ToolOutcome::Failure(text) => json!({ "error": text }),
            };
            Some(json!({
                "role": "user",
                "parts": [{
                    "functionResponse": {
                        "name": result.name,
                        "response": response,
                    }
                }]
            }))
        }
    }
}

/// Build a `generateContent` request body.
pub(crate) fn build_request_body(
    history: &[Turn],
    tools: &[ToolDeclaration],
    system_instruction: Option<&str>,
    temperature: f32,
) -> Value {
    let contents: Vec<Value> = history.iter().filter_map(turn_to_content).collect();

    let mut body = json!({
        "contents": contents,
        "generationConfig": {
            "temperature": temperature,
        }
    });

    if let Some(instruction) = system_instruction {
        body["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
    }

    if !tools.is_empty() {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                let mut decl = json!({
                    "name": t.name,
                    "description": t.description,
                });
                if let Some(schema) = t.parameters_schema() {
                    decl["parameters"] = schema;
                }
                decl
            })
            .collect();
        body["tools"] = json!([{ "functionDeclarations": declarations }]);
    }

    body
}

/// Extract the first candidate's text and function calls.
pub(crate) fn parse_response(parsed: &Value) -> Result<ModelTurn, LlmError> {
    let candidate = parsed
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or(LlmError::EmptyResponse)?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();

    let parts = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    for part in parts {
        if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
            text.push_str(t);
        }
        if let Some(fc) = part.get("functionCall") {
            let name = fc
                .get("name")
                .and_then(|n| n.as_str())
                .ok_or_else(|| LlmError::Decode("functionCall without a name".to_string()))?;
            let id = fc
                .get("id")
                .and_then(|i| i.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let arguments = match fc.get("args") {
                None | Some(Value::Null) => String::new(),
                Some(args) => args.to_string(),
            };
            tool_calls.push(ToolCall {
                id,
                name: name.to_string(),
                arguments,
            });
        }
    }

    Ok(ModelTurn {
        text: (!text.is_empty()).then_some(text),
        tool_calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolResult;
    use crate::tools::ParamType;

    fn tools() -> Vec<ToolDeclaration> {
        vec![
            ToolDeclaration::new("create_event", "Creates an event")
                .required("summary", ParamType::String, "Title"),
            ToolDeclaration::new("get_current_time", "Now"),
        ]
    }

    #[test]
    fn request_maps_roles_and_tools() {
        let history = vec![
            Turn::user("Schedule standup"),
            Turn::model(
                None,
                vec![ToolCall {
                    id: "c1".to_string(),
                    name: "create_event".to_string(),
                    arguments: r#"{"summary":"Standup"}"#.to_string(),
                }],
            ),
            Turn::tool_result(ToolResult {
                call_id: "c1".to_string(),
                name: "create_event".to_string(),
                outcome: ToolOutcome::Failure("bad time range".to_string()),
            }),
        ];

        let body = build_request_body(&history, &tools(), Some("Be helpful"), 0.0);

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "Schedule standup");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(
            contents[1]["parts"][0]["functionCall"]["args"]["summary"],
            "Standup"
        );
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["response"]["error"],
            "bad time range"
        );

        let decls = body["tools"][0]["functionDeclarations"].as_array().unwrap();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0]["parameters"]["required"][0], "summary");
        assert!(decls[1].get("parameters").is_none());

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be helpful");
        assert_eq!(body["generationConfig"]["temperature"], 0.0);
    }

    #[test]
    fn malformed_history_arguments_become_empty_object() {
        let history = vec![Turn::model(
            None,
            vec![ToolCall {
                id: "c1".to_string(),
                name: "create_event".to_string(),
                arguments: "{not json".to_string(),
            }],
        )];
        let body = build_request_body(&history, &[], None, 0.0);
        assert_eq!(body["contents"][0]["parts"][0]["functionCall"]["args"], json!({}));
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn response_with_function_call() {
        let parsed = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Let me check." },
                        { "functionCall": { "name": "get_current_time", "args": {} } }
                    ]
                }
            }]
        });
        let turn = parse_response(&parsed).unwrap();
        assert_eq!(turn.text.as_deref(), Some("Let me check."));
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].name, "get_current_time");
        assert_eq!(turn.tool_calls[0].arguments, "{}");
        assert!(!turn.tool_calls[0].id.is_empty());
    }

    #[test]
    fn response_with_text_only() {
        let parsed = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Done." }] } }]
        });
        let turn = parse_response(&parsed).unwrap();
        assert_eq!(turn.text.as_deref(), Some("Done."));
        assert!(turn.tool_calls.is_empty());
    }

    #[test]
    fn response_without_candidates_is_empty() {
        assert!(matches!(
            parse_response(&json!({ "promptFeedback": { "blockReason": "SAFETY" } })),
            Err(LlmError::EmptyResponse)
        ));
    }

    #[test]
    fn candidate_without_parts_is_an_empty_turn() {
        let turn = parse_response(&json!({ "candidates": [{ "finishReason": "STOP" }] })).unwrap();
        assert_eq!(turn, ModelTurn::default());
    }

    #[test]
    fn missing_api_key_is_not_configured() {
        let result = GeminiClient::new(GeminiConfig {
            api_key: " ".to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            temperature: 0.0,
            system_instruction: None,
            timeout: Duration::from_secs(5),
        });
        assert!(matches!(result, Err(LlmError::NotConfigured(_))));
    }
}
