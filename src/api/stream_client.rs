use super::client::{map_api_request_error, upstream_error_message};
use super::sse::{SseFrame, SseParser};
use crate::types::ApiMessage;
use anyhow::{anyhow, bail, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::json;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
#[cfg(test)]
use std::sync::Arc;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Aborts the stream when no chunk arrives for this long.
pub const SILENCE_TIMEOUT: Duration = Duration::from_secs(30);
/// Retry delay when the backend rate-limits without a retry-after header.
const RATE_LIMIT_FALLBACK_DELAY: Duration = Duration::from_secs(5);
const MAX_RATE_LIMIT_RETRIES: usize = 1;

#[cfg(test)]
pub trait MockStreamProducer: Send + Sync {
    fn create_mock_stream(&self) -> Result<ByteStream>;
}

#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub messages: Vec<ApiMessage>,
    pub system: String,
    pub model: String,
    pub max_tokens: u32,
    pub enable_code_engine: bool,
}

/// Progress surfaced to the caller while a stream is live.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    TextDelta(String),
    FileRead { file: String, lines: usize },
    Notice(String),
}

/// How a stream finished. Failures are reported as errors, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Complete {
        input_tokens: u64,
        output_tokens: u64,
    },
    Cancelled,
}

/// Client-side consumer of the orchestration endpoint's event stream.
/// At most one stream is live per client; starting a new one cancels the
/// previous in-flight stream.
pub struct StreamClient {
    http: reqwest::Client,
    endpoint: String,
    silence_timeout: Duration,
    active: Mutex<Option<CancellationToken>>,
    #[cfg(test)]
    mock_stream_producer: Option<Arc<dyn MockStreamProducer>>,
}

impl StreamClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            silence_timeout: SILENCE_TIMEOUT,
            active: Mutex::new(None),
            #[cfg(test)]
            mock_stream_producer: None,
        }
    }

    #[cfg(test)]
    pub fn new_mock(producer: Arc<dyn MockStreamProducer>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: "http://localhost:3000/api/chat".to_string(),
            silence_timeout: SILENCE_TIMEOUT,
            active: Mutex::new(None),
            mock_stream_producer: Some(producer),
        }
    }

    /// Aborts the in-flight stream, if any. Cooperative: the read loop
    /// observes the token and stops without further updates.
    pub fn cancel(&self) {
        if let Some(token) = self.active.lock().expect("active lock poisoned").take() {
            token.cancel();
        }
    }

    pub async fn stream(
        &self,
        request: &StreamRequest,
        update_tx: &mpsc::UnboundedSender<StreamUpdate>,
    ) -> Result<StreamEnd> {
        let token = self.begin_turn();

        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                let stream = producer.create_mock_stream()?;
                return self.consume(stream, &token, update_tx).await;
            }
        }

        let payload = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "stream": true,
            "system": request.system,
            "messages": request.messages,
            "enableCodeEngine": request.enable_code_engine,
        });

        let mut rate_limit_retries = 0usize;
        loop {
            let response = self
                .http
                .post(&self.endpoint)
                .header("content-type", "application/json")
                .json(&payload)
                .send()
                .await
                .map_err(|error| map_api_request_error(error, &self.endpoint))?;

            let status = response.status();
            if (status.as_u16() == 429 || status.as_u16() == 529)
                && rate_limit_retries < MAX_RATE_LIMIT_RETRIES
            {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok());
                let delay = rate_limit_retry_delay(retry_after);
                let _ = update_tx.send(StreamUpdate::Notice(format!(
                    "Rate-limited — retrying in {} s…",
                    delay.as_secs()
                )));
                rate_limit_retries += 1;
                tokio::select! {
                    _ = token.cancelled() => return Ok(StreamEnd::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                continue;
            }
            if status.as_u16() == 401 {
                bail!("Invalid API key — check ANTHROPIC_API_KEY on the server.");
            }
            if !status.is_success() {
                let body = response.json().await.unwrap_or_else(|_| json!({}));
                bail!(upstream_error_message(&body, status.as_u16()));
            }

            let endpoint = self.endpoint.clone();
            let stream = response
                .bytes_stream()
                .map(move |item| item.map_err(|error| map_api_request_error(error, &endpoint)));
            return self.consume(Box::pin(stream), &token, update_tx).await;
        }
    }

    fn begin_turn(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self
            .active
            .lock()
            .expect("active lock poisoned")
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        token
    }

    async fn consume(
        &self,
        mut stream: ByteStream,
        token: &CancellationToken,
        update_tx: &mpsc::UnboundedSender<StreamUpdate>,
    ) -> Result<StreamEnd> {
        let mut parser = SseParser::new();
        let mut input_tokens = 0u64;
        let mut output_tokens = 0u64;

        loop {
            let next = tokio::select! {
                _ = token.cancelled() => return Ok(StreamEnd::Cancelled),
                next = tokio::time::timeout(self.silence_timeout, stream.next()) => next,
            };

            let chunk = match next {
                Err(_) => bail!(
                    "No response from the model after {} s. Check your connection and try again.",
                    self.silence_timeout.as_secs()
                ),
                Ok(None) => break,
                Ok(Some(chunk)) => chunk?,
            };

            for frame in parser.process(&chunk) {
                match frame {
                    SseFrame::TextDelta(text) => {
                        let _ = update_tx.send(StreamUpdate::TextDelta(text));
                    }
                    SseFrame::FileRead { file, lines } => {
                        let _ = update_tx.send(StreamUpdate::FileRead { file, lines });
                    }
                    SseFrame::InputTokens(count) => input_tokens = count,
                    SseFrame::OutputTokens(count) => output_tokens = count,
                    SseFrame::Error(message) => return Err(anyhow!(message)),
                }
            }
        }

        Ok(StreamEnd::Complete {
            input_tokens,
            output_tokens,
        })
    }
}

fn rate_limit_retry_delay(retry_after: Option<&str>) -> Duration {
    retry_after
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(RATE_LIMIT_FALLBACK_DELAY)
}
