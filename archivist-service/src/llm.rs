//! Model endpoint client.
//!
//! Wraps a single operation, `invoke(model, prompt) -> text`, around an
//! Ollama-style generate API. Transient failures (rate limiting, temporary
//! unavailability) are retried with linear backoff; everything else fails the
//! invocation immediately.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::LlmConfig;
use crate::error::{LlmError, ServiceError, ServiceResult};

/// One generation request against the external model endpoint.
///
/// Sampling parameters are fixed from configuration per call; retries resend
/// the same request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

/// Transport seam for the external model endpoint.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn send(&self, request: &GenerateRequest) -> Result<String, LlmError>;
}

/// Model endpoint client with retry/backoff
pub struct LlmClient {
    transport: Box<dyn ModelTransport>,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a client backed by the HTTP transport
    pub fn new(config: LlmConfig) -> ServiceResult<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self {
            transport: Box::new(transport),
            config,
        })
    }

    /// Create a client over a custom transport
    pub fn with_transport(transport: Box<dyn ModelTransport>, config: LlmConfig) -> Self {
        Self { transport, config }
    }

    pub fn default_model(&self) -> &str {
        &self.config.model
    }

    /// Send a prompt to the model, retrying transient failures.
    ///
    /// Up to `max_retries` attempts; the wait before attempt N+1 is
    /// `retry_base_delay * N` (linear, not exponential). Cancellation aborts
    /// both in-flight sends and backoff waits.
    pub async fn invoke(
        &self,
        model: &str,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let request = GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
        };

        let max_attempts = self.config.max_retries.max(1);
        let mut attempt = 1u32;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                result = self.transport.send(&request) => result,
            };

            match result {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.config.retry_base_delay() * attempt;
                    warn!(
                        model = %request.model,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient model error, backing off"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(LlmError::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// HTTP transport for an Ollama-style generate endpoint
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &LlmConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::Llm(LlmError::Connection {
                    url: config.base_url.clone(),
                    source: e,
                })
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl ModelTransport for HttpTransport {
    async fn send(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);

        let body = GenerateApiRequest {
            model: &request.model,
            prompt: &request.prompt,
            stream: false,
            options: GenerateOptions {
                num_predict: request.max_tokens,
                temperature: request.temperature,
                top_p: request.top_p,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connection {
                url: url.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                429 => LlmError::RateLimited { message },
                code @ (502 | 503 | 504) => LlmError::Unavailable {
                    status: code,
                    message,
                },
                code => LlmError::Generation {
                    status: code,
                    message,
                },
            });
        }

        let generated: GenerateApiResponse =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                source: serde_json::Error::io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    e.to_string(),
                )),
            })?;

        Ok(generated.response)
    }
}

// Internal generate API types

#[derive(Debug, Serialize)]
struct GenerateApiRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateApiResponse {
    #[serde(default)]
    response: String,
}

/// Test transports shared by the invoker, enrichment, and pipeline tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    /// Transport that replays a scripted sequence of outcomes and records
    /// when each attempt arrived.
    pub(crate) struct ScriptedTransport {
        script: Mutex<VecDeque<Result<String, LlmError>>>,
        attempts: Mutex<Vec<Instant>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(script: Vec<Result<String, LlmError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                attempts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn shared(script: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self::new(script))
        }

        pub(crate) fn attempt_times(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelTransport for ScriptedTransport {
        async fn send(&self, _request: &GenerateRequest) -> Result<String, LlmError> {
            self.attempts.lock().unwrap().push(Instant::now());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::Cancelled))
        }
    }

    #[async_trait]
    impl ModelTransport for Arc<ScriptedTransport> {
        async fn send(&self, request: &GenerateRequest) -> Result<String, LlmError> {
            self.as_ref().send(request).await
        }
    }
}
