use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::types::{ApiMessage, ModelResponse};
use crate::util::is_local_endpoint_url;
use anyhow::{anyhow, Result};
use serde_json::{json, Value};
#[cfg(test)]
use std::sync::Arc;

pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[cfg(test)]
pub trait MockResponseProducer: Send + Sync {
    fn produce(&self, messages: &[ApiMessage]) -> Result<ModelResponse>;
}

/// Non-streaming client for the model backend. The tool-use loop drives
/// it once per round-trip.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    api_url: String,
    anthropic_version: String,
    max_tokens: u32,
    #[cfg(test)]
    mock_response_producer: Option<Arc<dyn MockResponseProducer>>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            api_url: config.api_url.clone(),
            anthropic_version: config.anthropic_version.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            #[cfg(test)]
            mock_response_producer: None,
        }
    }

    #[cfg(test)]
    pub fn new_mock(producer: Arc<dyn MockResponseProducer>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: None,
            model: "mock-model".to_string(),
            api_url: "http://localhost:8000/v1/messages".to_string(),
            anthropic_version: "2023-06-01".to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            mock_response_producer: Some(producer),
        }
    }

    /// One non-streamed round-trip. `with_tools` attaches the two-tool
    /// catalog so the model may request file-system information.
    pub async fn complete(
        &self,
        messages: &[ApiMessage],
        system: &str,
        with_tools: bool,
    ) -> Result<ModelResponse> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_response_producer {
                return producer.produce(messages);
            }
        }

        let mut payload = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": messages,
        });
        if with_tools {
            let payload_object = payload
                .as_object_mut()
                .ok_or_else(|| anyhow!("payload must be a JSON object"))?;
            payload_object.insert("tools".to_string(), tool_definitions());
        }

        if debug_payload_enabled() {
            emit_debug_payload(&self.api_url, &payload);
        }

        let mut request = self
            .http
            .post(&self.api_url)
            .header("content-type", "application/json")
            .json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.header("x-api-key", api_key);
        }
        if !self.anthropic_version.trim().is_empty() {
            request = request.header("anthropic-version", &self.anthropic_version);
        }

        let response = request
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &self.api_url))?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or_else(|_| json!({}));
            return Err(anyhow!(upstream_error_message(&body, status.as_u16())));
        }

        response
            .json::<ModelResponse>()
            .await
            .map_err(|error| map_api_request_error(error, &self.api_url))
    }
}

/// The model may inspect the project through exactly these two tools.
pub fn tool_definitions() -> Value {
    json!([
        {
            "name": "list_files",
            "description": "List all source files in the connected project. Returns an array of relative paths.",
            "input_schema": { "type": "object", "properties": {}, "required": [] }
        },
        {
            "name": "read_file",
            "description": "Read the full content of a specific file in the project.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Relative path to the file, e.g. src/app/page.tsx" }
                },
                "required": ["path"]
            }
        }
    ])
}

/// Prefer the upstream body's error.message; fall back to the status code.
pub fn upstream_error_message(body: &Value, status: u16) -> String {
    body.get("error")
        .and_then(|error| error.get("message"))
        .and_then(|message| message.as_str())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| format!("API error {status}"))
}

pub(crate) fn map_api_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return anyhow!(
            "cannot reach local API endpoint '{}': {}. Start your local server or update ANTHROPIC_API_URL.",
            request_url,
            error
        );
    }
    if error.is_connect() {
        return anyhow!("cannot reach API endpoint '{}': {}", request_url, error);
    }
    if error.is_timeout() {
        return anyhow!("API request to '{}' timed out: {}", request_url, error);
    }
    anyhow!("API request to '{}' failed: {}", request_url, error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_catalog_is_exactly_the_two_file_tools() {
        let tools = tool_definitions();
        let names: Vec<&str> = tools
            .as_array()
            .expect("tool definitions must be an array")
            .iter()
            .filter_map(|tool| tool.get("name").and_then(|value| value.as_str()))
            .collect();
        assert_eq!(names, vec!["list_files", "read_file"]);
    }

    #[test]
    fn test_read_file_tool_requires_path() {
        let tools = tool_definitions();
        let read_file = &tools.as_array().unwrap()[1];
        assert_eq!(
            read_file["input_schema"]["required"],
            serde_json::json!(["path"])
        );
    }

    #[test]
    fn test_upstream_error_message_prefers_body_message() {
        let body = json!({ "error": { "message": "overloaded" } });
        assert_eq!(upstream_error_message(&body, 529), "overloaded");
        assert_eq!(upstream_error_message(&json!({}), 500), "API error 500");
    }
}
