/*
 * Kiln - Confined Tool-Calling Agent
 * File Path: src/llm.rs
 * Responsibility: OpenAI-compatible Responses API client.
 */

use anyhow::{Context, Result, anyhow};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{Value, json};

static POOLED_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("kiln/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// A tool call the model asked for in one response.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub call_id: String,
    pub name: String,
    /// Raw JSON text, exactly as the model produced it.
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    FunctionCall(FunctionCall),
    Message {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    OutputText { text: String },
    #[serde(other)]
    Other,
}

/// One model response: the raw output items (to be replayed into the next
/// request) plus what we need out of them.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub output: Vec<Value>,
    pub output_text: String,
    pub function_calls: Vec<FunctionCall>,
}

impl ModelResponse {
    pub fn from_json(body: &Value) -> Result<Self> {
        let output = body
            .get("output")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| anyhow!("Response has no `output` array: {}", body))?;

        let mut output_text = String::new();
        let mut function_calls = Vec::new();
        for item in &output {
            // Unknown item shapes are replayed but otherwise ignored.
            match serde_json::from_value::<OutputItem>(item.clone()) {
                Ok(OutputItem::FunctionCall(call)) => function_calls.push(call),
                Ok(OutputItem::Message { content }) => {
                    for part in content {
                        if let ContentPart::OutputText { text } = part {
                            output_text.push_str(&text);
                        }
                    }
                }
                Ok(OutputItem::Other) | Err(_) => {}
            }
        }

        Ok(Self {
            output,
            output_text,
            function_calls,
        })
    }
}

/// Input item carrying a tool result back to the model.
pub fn function_call_output(call_id: &str, output: &str) -> Value {
    json!({
        "type": "function_call_output",
        "call_id": call_id,
        "output": json!({ "output": output }).to_string(),
    })
}

pub fn user_message(content: &str) -> Value {
    json!({ "role": "user", "content": content })
}

pub fn system_message(content: &str) -> Value {
    json!({ "role": "system", "content": content })
}

#[derive(Debug, Clone)]
pub struct ResponsesClient {
    base_url: String,
    api_key: String,
    model: String,
}

impl ResponsesClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/responses", self.base_url.trim_end_matches('/'))
    }

    /// Sends the whole conversation so far. `tools` is omitted when `None`.
    pub async fn create(&self, input: &[Value], tools: Option<&Value>) -> Result<ModelResponse> {
        let mut payload = json!({
            "model": self.model,
            "input": input,
        });
        if let Some(tools) = tools {
            payload["tools"] = tools.clone();
        }

        tracing::debug!(model = %self.model, items = input.len(), "requesting model response");

        let response = POOLED_CLIENT
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.endpoint()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "LLM API Error (Model: {}, HTTP {}): {}",
                self.model,
                status,
                error_text
            ));
        }

        let body: Value = response
            .json()
            .await
            .context("LLM API returned a body that is not JSON")?;
        ModelResponse::from_json(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_text_and_function_calls() {
        let body = json!({
            "id": "resp_1",
            "output": [
                { "type": "reasoning", "id": "rs_1", "summary": [] },
                {
                    "type": "function_call",
                    "id": "fc_1",
                    "call_id": "call_abc",
                    "name": "get_files_info",
                    "arguments": "{\"directory\": \".\"}"
                },
                {
                    "type": "message",
                    "role": "assistant",
                    "content": [
                        { "type": "output_text", "text": "Listing ", "annotations": [] },
                        { "type": "refusal", "refusal": "no" },
                        { "type": "output_text", "text": "now.", "annotations": [] }
                    ]
                }
            ]
        });

        let response = ModelResponse::from_json(&body).unwrap();
        assert_eq!(response.output.len(), 3);
        assert_eq!(response.output_text, "Listing now.");
        assert_eq!(
            response.function_calls,
            vec![FunctionCall {
                call_id: "call_abc".to_string(),
                name: "get_files_info".to_string(),
                arguments: "{\"directory\": \".\"}".to_string(),
            }]
        );
    }

    #[test]
    fn test_missing_output_is_an_error() {
        assert!(ModelResponse::from_json(&json!({ "error": "nope" })).is_err());
    }

    #[test]
    fn test_function_call_output_wraps_result() {
        let item = function_call_output("call_1", "ERROR: Unknown function: x");
        assert_eq!(item["type"], "function_call_output");
        assert_eq!(item["call_id"], "call_1");
        let inner: Value = serde_json::from_str(item["output"].as_str().unwrap()).unwrap();
        assert_eq!(inner["output"], "ERROR: Unknown function: x");
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let client = ResponsesClient::new("http://localhost:8080/v1/", "k", "m");
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/responses");
    }
}
