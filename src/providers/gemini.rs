//! Google Gemini provider implementation for agentloop
//!
//! Talks to the Generative Language `generateContent` REST endpoint. Tool
//! results travel as `functionResponse` parts in a user-role content; the
//! system instruction is sent in its own `systemInstruction` field.

use crate::agent::history::{Role, Turn, TurnContent};
use crate::config::GeminiConfig;
use crate::error::{AgentLoopError, Result};
use crate::providers::{CompletionResponse, Provider, TokenUsage, ToolInvocationRequest};
use crate::tools::{ParamType, ToolDeclaration};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Gemini API provider
///
/// # Examples
///
/// ```
/// use agentloop::config::GeminiConfig;
/// use agentloop::providers::GeminiProvider;
///
/// let provider = GeminiProvider::new(GeminiConfig::default(), "test-key".to_string());
/// assert!(provider.is_ok());
/// ```
pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
    api_key: String,
}

/// Request body for `generateContent`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
}

impl GeminiPart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

/// Response body of `generateContent`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: usize,
    #[serde(default)]
    candidates_token_count: usize,
}

fn gemini_type(kind: ParamType) -> &'static str {
    match kind {
        ParamType::String => "STRING",
        ParamType::Number => "NUMBER",
        ParamType::Integer => "INTEGER",
        ParamType::Boolean => "BOOLEAN",
    }
}

impl GeminiProvider {
    /// Create a new Gemini provider instance
    ///
    /// # Errors
    ///
    /// - `AgentLoopError::MissingCredentials` if `api_key` is empty
    /// - `AgentLoopError::Config` if HTTP client initialization fails
    pub fn new(config: GeminiConfig, api_key: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(AgentLoopError::MissingCredentials("gemini".to_string()).into());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(concat!("agentloop/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AgentLoopError::Config(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized Gemini provider: api_base={}, model={}",
            config.api_base,
            config.model
        );

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Convert history turns to Gemini contents
    ///
    /// Adjacent turns that map to the same wire role are merged into one
    /// content so the request keeps a user/model alternation.
    fn convert_history(&self, history: &[Turn]) -> Vec<GeminiContent> {
        let mut contents: Vec<GeminiContent> = Vec::with_capacity(history.len());

        for turn in history {
            let (role, part) = match turn.content() {
                TurnContent::Text { text } => {
                    let role = if turn.role() == Role::Model { "model" } else { "user" };
                    (role, GeminiPart::text(text.clone()))
                }
                TurnContent::ToolInvocation { request } => (
                    "model",
                    GeminiPart {
                        function_call: Some(GeminiFunctionCall {
                            id: None,
                            name: request.name.clone(),
                            args: request.arguments.clone(),
                        }),
                        ..GeminiPart::default()
                    },
                ),
                TurnContent::ToolResult { name, result, .. } => (
                    "user",
                    GeminiPart {
                        function_response: Some(GeminiFunctionResponse {
                            id: None,
                            name: name.clone(),
                            response: json!({
                                "status": result.status,
                                "output": result.payload,
                            }),
                        }),
                        ..GeminiPart::default()
                    },
                ),
            };

            match contents.last_mut() {
                Some(last) if last.role == role => last.parts.push(part),
                _ => contents.push(GeminiContent {
                    role: role.to_string(),
                    parts: vec![part],
                }),
            }
        }

        contents
    }

    /// Convert tool declarations to a Gemini `functionDeclarations` block
    fn convert_tools(&self, tools: &[ToolDeclaration]) -> Vec<GeminiTool> {
        if tools.is_empty() {
            return Vec::new();
        }

        let declarations = tools
            .iter()
            .map(|tool| {
                let mut properties = Map::new();
                for param in tool.parameters.params() {
                    properties.insert(
                        param.name.clone(),
                        json!({
                            "type": gemini_type(param.kind),
                            "description": param.description,
                        }),
                    );
                }

                GeminiFunctionDeclaration {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: json!({
                        "type": "OBJECT",
                        "properties": properties,
                        "required": tool.parameters.required_names(),
                    }),
                }
            })
            .collect();

        vec![GeminiTool {
            function_declarations: declarations,
        }]
    }

    /// Normalise a Gemini response into a completion response
    fn convert_response(&self, response: GeminiResponse) -> Result<CompletionResponse> {
        let usage = response.usage_metadata.map(|u| {
            TokenUsage::new(u.prompt_token_count, u.candidates_token_count)
        });

        let candidate = match response.candidates.into_iter().next() {
            Some(candidate) => candidate,
            None => {
                let reason = response
                    .prompt_feedback
                    .and_then(|f| f.block_reason)
                    .unwrap_or_else(|| "no candidates returned".to_string());
                return Err(
                    AgentLoopError::Completion(format!("Gemini returned no answer: {}", reason))
                        .into(),
                );
            }
        };

        let content = match candidate.content {
            Some(content) if !content.parts.is_empty() => content,
            _ => {
                return Err(AgentLoopError::Completion(format!(
                    "Gemini candidate has no content (finish reason: {})",
                    candidate.finish_reason.as_deref().unwrap_or("unknown")
                ))
                .into())
            }
        };

        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();
        for part in content.parts {
            if let Some(call) = part.function_call {
                tool_calls.push(match call.id {
                    Some(id) if !id.is_empty() => {
                        ToolInvocationRequest::with_id(id, call.name, call.args)
                    }
                    _ => ToolInvocationRequest::new(call.name, call.args),
                });
            } else if let Some(text) = part.text {
                text_parts.push(text);
            }
        }

        let text = if text_parts.is_empty() {
            None
        } else {
            Some(text_parts.concat())
        };

        Ok(CompletionResponse {
            text,
            tool_calls,
            usage,
        })
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> Option<&str> {
        Some(&self.config.model)
    }

    async fn generate(
        &self,
        history: &[Turn],
        tools: &[ToolDeclaration],
        system_instruction: Option<&str>,
    ) -> Result<CompletionResponse> {
        let request = GeminiRequest {
            contents: self.convert_history(history),
            system_instruction: system_instruction.map(|text| GeminiSystemInstruction {
                parts: vec![GeminiPart::text(text)],
            }),
            tools: self.convert_tools(tools),
        };

        tracing::debug!(
            "Sending Gemini request: {} contents, {} tools",
            request.contents.len(),
            tools.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Gemini request failed: {}", e);
                AgentLoopError::Completion(format!("Gemini request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Gemini returned error {}: {}", status, error_text);
            return Err(AgentLoopError::Completion(format!(
                "Gemini returned error {}: {}",
                status, error_text
            ))
            .into());
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse Gemini response: {}", e);
            AgentLoopError::Completion(format!("Failed to parse Gemini response: {}", e))
        })?;

        let completion = self.convert_response(gemini_response)?;
        tracing::debug!(
            "Gemini response: {} tool call(s), text: {}, usage: {:?}",
            completion.tool_calls.len(),
            completion.text.is_some(),
            completion.usage
        );
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ModelOutcome;
    use crate::tools::{ParameterSchema, ToolKind, ToolResult};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(api_base: &str) -> GeminiProvider {
        GeminiProvider::new(
            GeminiConfig {
                api_base: api_base.to_string(),
                model: "gemini-2.5-flash".to_string(),
                request_timeout_seconds: 5,
                ..GeminiConfig::default()
            },
            "test-key".to_string(),
        )
        .unwrap()
    }

    fn command_declaration() -> ToolDeclaration {
        ToolDeclaration::new(
            ToolKind::ExecuteCommand,
            "Run a command",
            ParameterSchema::new().required("command", ParamType::String, "The command"),
        )
    }

    #[test]
    fn test_new_rejects_empty_key() {
        let err = GeminiProvider::new(GeminiConfig::default(), "  ".to_string())
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<AgentLoopError>(),
            Some(AgentLoopError::MissingCredentials(_))
        ));
    }

    #[test]
    fn test_endpoint() {
        let provider = provider("https://example.test/");
        assert_eq!(
            provider.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_convert_history_roles_and_parts() {
        let provider = provider("https://example.test");
        let request = ToolInvocationRequest::with_id(
            "c1",
            "executeCommand",
            json!({"command": "mkdirr demo"}),
        );
        let history = vec![
            Turn::user("create a project folder named demo"),
            Turn::tool_invocation(request.clone()),
            Turn::tool_result(&request, ToolResult::error("sh: mkdirr: not found")),
        ];

        let contents = provider.convert_history(&history);
        let json = serde_json::to_value(&contents).unwrap();

        assert_eq!(json[0]["role"], "user");
        assert_eq!(json[0]["parts"][0]["text"], "create a project folder named demo");
        assert_eq!(json[1]["role"], "model");
        assert_eq!(json[1]["parts"][0]["functionCall"]["name"], "executeCommand");
        assert_eq!(json[1]["parts"][0]["functionCall"]["args"]["command"], "mkdirr demo");
        assert_eq!(json[2]["role"], "user");
        let response = &json[2]["parts"][0]["functionResponse"];
        assert_eq!(response["name"], "executeCommand");
        assert_eq!(response["response"]["status"], "error");
        assert_eq!(response["response"]["output"], "sh: mkdirr: not found");
    }

    #[test]
    fn test_convert_history_merges_adjacent_user_contents() {
        let provider = provider("https://example.test");
        let request = ToolInvocationRequest::with_id("c1", "sum", json!({"num1": 1, "num2": 1}));
        let history = vec![
            Turn::user("add"),
            Turn::tool_invocation(request.clone()),
            Turn::tool_result(&request, ToolResult::success("2")),
            Turn::user("and now double it"),
        ];

        let contents = provider.convert_history(&history);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[2].role, "user");
        assert_eq!(contents[2].parts.len(), 2);
    }

    #[test]
    fn test_convert_tools_uses_upper_case_types() {
        let provider = provider("https://example.test");
        let tools = provider.convert_tools(&[command_declaration()]);
        let json = serde_json::to_value(&tools).unwrap();

        let declaration = &json[0]["functionDeclarations"][0];
        assert_eq!(declaration["name"], "executeCommand");
        assert_eq!(declaration["parameters"]["type"], "OBJECT");
        assert_eq!(
            declaration["parameters"]["properties"]["command"]["type"],
            "STRING"
        );
        assert_eq!(declaration["parameters"]["required"], json!(["command"]));
    }

    #[test]
    fn test_convert_tools_empty() {
        let provider = provider("https://example.test");
        assert!(provider.convert_tools(&[]).is_empty());
    }

    #[test]
    fn test_convert_response_collects_all_function_calls() {
        let provider = provider("https://example.test");
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "executeCommand", "args": {"command": "mkdir demo"}}},
                    {"functionCall": {"name": "executeCommand", "args": {"command": "ls"}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 120,
                "candidatesTokenCount": 8,
                "totalTokenCount": 128
            }
        }))
        .unwrap();

        let completion = provider.convert_response(response).unwrap();
        assert_eq!(completion.tool_calls.len(), 2);
        assert_eq!(completion.usage, Some(TokenUsage::new(120, 8)));

        match completion.into_outcome().unwrap() {
            ModelOutcome::ToolCall { request, dropped } => {
                assert_eq!(request.arguments["command"], "mkdir demo");
                assert_eq!(dropped, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_convert_response_blocked_prompt() {
        let provider = provider("https://example.test");
        let response: GeminiResponse =
            serde_json::from_value(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();

        let err = provider.convert_response(response).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_convert_response_candidate_without_content() {
        let provider = provider("https://example.test");
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "MAX_TOKENS"}]
        }))
        .unwrap();

        let err = provider.convert_response(response).unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[tokio::test]
    async fn test_generate_sends_key_system_instruction_and_tools() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "Created folder demo."}]},
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server.uri());
        let completion = provider
            .generate(
                &[Turn::user("create a project folder named demo")],
                &[command_declaration()],
                Some("You are a CLI assistant."),
            )
            .await
            .unwrap();

        assert_eq!(completion.text.as_deref(), Some("Created folder demo."));

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "You are a CLI assistant."
        );
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "executeCommand"
        );
        assert_eq!(body["contents"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_generate_omits_tools_in_direct_answer_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "42"}]}}]
            })))
            .mount(&server)
            .await;

        provider(&server.uri())
            .generate(&[Turn::user("meaning of life?")], &[], None)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("systemInstruction").is_none());
    }

    #[tokio::test]
    async fn test_generate_http_error_is_completion_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .generate(&[Turn::user("hi")], &[], None)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<AgentLoopError>(),
            Some(AgentLoopError::Completion(msg)) if msg.contains("403")
        ));
    }

    #[tokio::test]
    async fn test_generate_empty_text_part_is_not_an_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": ""}]}}]
            })))
            .mount(&server)
            .await;

        let response = provider(&server.uri())
            .generate(&[Turn::user("hi")], &[], None)
            .await
            .unwrap();
        let err = response.into_outcome().unwrap_err();

        assert!(matches!(
            err.downcast_ref::<AgentLoopError>(),
            Some(AgentLoopError::Completion(_))
        ));
    }
}
