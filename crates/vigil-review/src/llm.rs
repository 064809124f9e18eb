use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use vigil_core::{LlmConfig, VigilError};

/// A message in a chat conversation with the LLM.
///
/// # Examples
///
/// ```
/// use vigil_review::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("Review this code");
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use vigil_review::llm::Role;
///
/// let role = Role::System;
/// assert_eq!(serde_json::to_string(&role).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

/// A tool the model may call during free-form generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the tool arguments.
    pub parameters: Value,
}

impl ToolSchema {
    fn to_request(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// A tool call emitted by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
}

/// Result of [`LanguageModel::generate_with_tools`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolResponse {
    pub text: String,
    pub invocations: Vec<ToolInvocation>,
}

/// Response schema for [`LanguageModel::generate_structured`].
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredSchema {
    /// Short identifier sent to the provider (`review_step`, `review_result`).
    pub name: String,
    pub schema: Value,
}

impl StructuredSchema {
    /// Derive the schema of `T`.
    ///
    /// # Examples
    ///
    /// ```
    /// use vigil_core::ReviewStep;
    /// use vigil_review::llm::StructuredSchema;
    ///
    /// let schema = StructuredSchema::of::<ReviewStep>("review_step");
    /// assert!(schema.schema.to_string().contains("analysisComplete"));
    /// ```
    pub fn of<T: JsonSchema>(name: &str) -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null);
        Self {
            name: name.to_string(),
            schema,
        }
    }
}

/// Text generation capability the orchestrator drives.
///
/// Implemented by [`LlmClient`] for OpenAI-compatible providers.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-form generation with optional tool calls.
    async fn generate_with_tools(
        &self,
        system: &str,
        user: &str,
        tools: &[ToolSchema],
    ) -> Result<ToolResponse, VigilError>;

    /// Schema-constrained generation returning the raw JSON object.
    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &StructuredSchema,
    ) -> Result<Value, VigilError>;
}

/// Run a structured generation and decode it into `T`.
///
/// # Errors
///
/// Propagates provider errors; returns [`VigilError::Schema`] if the
/// returned object does not deserialize into `T`.
pub async fn generate_typed<T, M>(llm: &M, prompt: &str, name: &str) -> Result<T, VigilError>
where
    T: DeserializeOwned + JsonSchema,
    M: LanguageModel + ?Sized,
{
    let schema = StructuredSchema::of::<T>(name);
    let value = llm.generate_structured(prompt, &schema).await?;
    serde_json::from_value(value)
        .map_err(|e| VigilError::Schema(format!("{name} did not match schema: {e}")))
}

/// OpenAI-compatible chat completions client.
///
/// Works with any provider that exposes the `/v1/chat/completions` endpoint:
/// OpenAI, OpenRouter, Ollama, vLLM, LiteLLM, etc.
///
/// # Examples
///
/// ```
/// use vigil_core::LlmConfig;
/// use vigil_review::llm::LlmClient;
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.model(), "gpt-4o");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new LLM client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::Llm`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, VigilError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VigilError::Llm(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Return the model name from the configuration.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.config.resolved_base_url())
    }

    async fn complete(&self, body: Value) -> Result<Value, VigilError> {
        let mut request = self.client.post(self.endpoint());
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| VigilError::Llm(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let message = format!("LLM API error {status}: {body_text}");
            return Err(match status.as_u16() {
                429 => VigilError::RateLimited(message),
                401 | 403 => VigilError::Auth(message),
                _ => VigilError::Llm(message),
            });
        }

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| VigilError::Llm(format!("failed to parse response: {e}")))?;

        response_body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .cloned()
            .ok_or_else(|| VigilError::Llm(format!("unexpected response structure: {response_body}")))
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn generate_with_tools(
        &self,
        system: &str,
        user: &str,
        tools: &[ToolSchema],
    ) -> Result<ToolResponse, VigilError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": 0.1,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(ToolSchema::to_request).collect());
            body["tool_choice"] = json!("auto");
        }

        let message = self.complete(body).await?;
        Ok(parse_tool_message(&message))
    }

    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &StructuredSchema,
    ) -> Result<Value, VigilError> {
        let body = json!({
            "model": self.config.model,
            "messages": [ChatMessage::user(prompt)],
            "temperature": 0.1,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema,
                }
            },
        });

        let message = self.complete(body).await?;
        let content = message
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| VigilError::Schema(format!("{}: response had no content", schema.name)))?;
        serde_json::from_str(strip_code_fences(content))
            .map_err(|e| VigilError::Schema(format!("{}: response is not JSON: {e}", schema.name)))
    }
}

fn parse_tool_message(message: &Value) -> ToolResponse {
    let text = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let invocations = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|call| {
                    let function = call.get("function")?;
                    let name = function.get("name")?.as_str()?.to_string();
                    // Arguments arrive as a JSON-encoded string.
                    let arguments = match function.get("arguments") {
                        Some(Value::String(raw)) => {
                            serde_json::from_str(raw).unwrap_or_else(|_| json!({}))
                        }
                        Some(other) => other.clone(),
                        None => json!({}),
                    };
                    Some(ToolInvocation { name, arguments })
                })
                .collect()
        })
        .unwrap_or_default();

    ToolResponse { text, invocations }
}

/// Remove a surrounding Markdown code fence, if any.
///
/// # Examples
///
/// ```
/// use vigil_review::llm::strip_code_fences;
///
/// assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
/// assert_eq!(strip_code_fences("{}"), "{}");
/// ```
pub fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    match rest.strip_suffix("```") {
        Some(inner) => inner.trim(),
        None => trimmed,
    }
}
