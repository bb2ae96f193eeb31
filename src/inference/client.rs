//! Inference Client
//!
//! Builds multimodal chat-completion requests, sends them through the
//! transport with randomized exponential backoff, and validates the
//! response shape before handing the answer to the caller.
//!
//! Per attempt the client is in one of: attempting, retrying (transient
//! failure with budget left), or done (success, protocol violation, or
//! exhausted budget). Protocol violations are never retried.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::config::{ClientConfig, IMAGE_LIMIT};
use crate::error::{NavError, NavResult, TransportError};
use crate::types::{Completion, InferenceTransport, ResponseFormat};

/// Retrying client over an abstract inference transport.
pub struct NavInferenceClient {
    config: ClientConfig,
    transport: Arc<dyn InferenceTransport>,
}

impl NavInferenceClient {
    /// Create a client, validating the configuration once up front.
    pub fn new(config: ClientConfig, transport: Arc<dyn InferenceTransport>) -> NavResult<Self> {
        config.validate()?;
        Ok(Self { config, transport })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send a multimodal request and return the validated answer.
    ///
    /// `images` holds base64-encoded JPEG payloads; `None` slots are skipped
    /// but their indices are preserved in the per-image markers. At most
    /// [`IMAGE_LIMIT`] present images per request; violations fail before
    /// any transport call.
    pub async fn infer(
        &self,
        system: &str,
        text: &str,
        images: &[Option<String>],
        response_format: Option<ResponseFormat>,
    ) -> NavResult<Completion> {
        let present = images.iter().filter(|i| i.is_some()).count();
        if present > IMAGE_LIMIT {
            return Err(NavError::ImageLimit {
                count: present,
                limit: IMAGE_LIMIT,
            });
        }

        let mut user_content = Vec::new();
        for (i, image) in images.iter().enumerate() {
            if let Some(b64) = image {
                user_content.push(json!({
                    "type": "text",
                    "text": format!("Image {}:", i),
                }));
                user_content.push(self.image_block(b64));
            }
        }
        user_content.push(json!({ "type": "text", "text": text }));

        let body = self.request_body(system, user_content, response_format);
        self.send_with_retry(&body).await
    }

    /// Caption a single image: same transport, retry, and validation path
    /// as [`infer`], with one unlabeled image block.
    pub async fn caption(&self, system: &str, text: &str, image: &str) -> NavResult<Completion> {
        let user_content = vec![
            json!({ "type": "text", "text": "Image :" }),
            self.image_block(image),
            json!({ "type": "text", "text": text }),
        ];

        let body = self.request_body(system, user_content, None);
        self.send_with_retry(&body).await
    }

    fn image_block(&self, b64: &str) -> Value {
        json!({
            "type": "image_url",
            "image_url": {
                "url": format!("data:image/jpeg;base64,{}", b64),
                "detail": self.config.image_detail,
            }
        })
    }

    fn request_body(
        &self,
        system: &str,
        user_content: Vec<Value>,
        response_format: Option<ResponseFormat>,
    ) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user_content },
            ],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        if let Some(format) = response_format {
            body["response_format"] = format.as_json();
        }

        body
    }

    /// Drive one request through the transport until success, a protocol
    /// violation, or an exhausted retry budget. Each attempt runs under the
    /// hard wall-clock timeout; expiry drops the in-flight call and counts
    /// as one failed attempt.
    async fn send_with_retry(&self, body: &Value) -> NavResult<Completion> {
        let retry = self.config.retry;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            debug!(attempt, model = %self.config.model, "sending inference request");

            let outcome = match timeout(
                self.config.attempt_timeout,
                self.transport.round_trip(body),
            )
            .await
            {
                Err(_) => Err(TransportError::Timeout(self.config.attempt_timeout)),
                Ok(result) => result,
            };

            let err = match outcome {
                Ok(response) => {
                    let completion = extract_completion(&response)?;
                    debug!(attempt, tokens = completion.total_tokens, "inference succeeded");
                    return Ok(completion);
                }
                Err(e) => e,
            };

            warn!(attempt, error = %err, "inference attempt failed");

            if attempt >= retry.max_attempts {
                return Err(NavError::Transport {
                    attempts: attempt,
                    source: err,
                });
            }

            sleep(retry.backoff_delay(attempt)).await;
        }
    }
}

/// Validate the response shape and pull out the answer text and token count.
/// Any missing required field is a protocol violation, not a retry.
fn extract_completion(response: &Value) -> NavResult<Completion> {
    if !response.is_object() {
        return Err(NavError::Protocol(format!(
            "response is not an object: {}",
            preview(response)
        )));
    }

    let choices = response["choices"].as_array().ok_or_else(|| {
        NavError::Protocol(format!("response has no 'choices': {}", preview(response)))
    })?;
    if choices.is_empty() {
        return Err(NavError::Protocol(format!(
            "response 'choices' is empty: {}",
            preview(response)
        )));
    }

    let text = choices[0]["message"]["content"]
        .as_str()
        .ok_or_else(|| {
            NavError::Protocol(format!(
                "choices[0].message.content missing or not a string: {}",
                preview(response)
            ))
        })?
        .to_string();

    let total_tokens = response["usage"]["total_tokens"].as_u64().ok_or_else(|| {
        NavError::Protocol(format!(
            "response has no 'usage.total_tokens': {}",
            preview(response)
        ))
    })?;

    Ok(Completion { text, total_tokens })
}

/// Truncated rendering of a response for error messages.
fn preview(value: &Value) -> String {
    let s = value.to_string();
    if s.len() > 200 {
        format!("{}...", &s[..200])
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::config::{default_client_config, RetryPolicy};
    use crate::types::InferenceTransport;

    fn fast_config() -> ClientConfig {
        let mut config = default_client_config();
        config.retry = RetryPolicy {
            max_attempts: 6,
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        };
        config.attempt_timeout = Duration::from_secs(5);
        config
    }

    fn good_response() -> Value {
        json!({
            "choices": [ { "message": { "content": "Waypoint_1" } } ],
            "usage": { "total_tokens": 128 },
        })
    }

    /// Fails transiently a fixed number of times, then answers.
    struct FlakyTransport {
        failures_before_success: u32,
        calls: AtomicU32,
        response: Value,
    }

    impl FlakyTransport {
        fn new(failures_before_success: u32, response: Value) -> Self {
            Self {
                failures_before_success,
                calls: AtomicU32::new(0),
                response,
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl InferenceTransport for FlakyTransport {
        async fn round_trip(&self, _body: &Value) -> Result<Value, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(TransportError::Connect("connection refused".to_string()))
            } else {
                Ok(self.response.clone())
            }
        }
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let transport = Arc::new(FlakyTransport::new(2, good_response()));
        let client = NavInferenceClient::new(fast_config(), transport.clone()).unwrap();

        let completion = client.infer("sys", "user", &[], None).await.unwrap();
        assert_eq!(completion.text, "Waypoint_1");
        assert_eq!(completion.total_tokens, 128);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_on_persistent_failure() {
        let transport = Arc::new(FlakyTransport::new(u32::MAX, good_response()));
        let client = NavInferenceClient::new(fast_config(), transport.clone()).unwrap();

        let err = client.infer("sys", "user", &[], None).await.unwrap_err();
        match err {
            NavError::Transport { attempts, .. } => assert_eq!(attempts, 6),
            other => panic!("expected Transport, got {:?}", other),
        }
        assert_eq!(transport.call_count(), 6);
    }

    #[tokio::test]
    async fn image_limit_fails_before_any_transport_call() {
        let transport = Arc::new(FlakyTransport::new(0, good_response()));
        let client = NavInferenceClient::new(fast_config(), transport.clone()).unwrap();

        let images: Vec<Option<String>> = (0..21).map(|_| Some("aGk=".to_string())).collect();
        let err = client.infer("sys", "user", &images, None).await.unwrap_err();
        match err {
            NavError::ImageLimit { count, limit } => {
                assert_eq!(count, 21);
                assert_eq!(limit, 20);
            }
            other => panic!("expected ImageLimit, got {:?}", other),
        }
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn none_slots_do_not_count_toward_the_image_limit() {
        let transport = Arc::new(FlakyTransport::new(0, good_response()));
        let client = NavInferenceClient::new(fast_config(), transport.clone()).unwrap();

        let mut images: Vec<Option<String>> = (0..20).map(|_| Some("aGk=".to_string())).collect();
        images.push(None);
        images.push(None);
        assert!(client.infer("sys", "user", &images, None).await.is_ok());
    }

    #[tokio::test]
    async fn missing_choices_is_not_retried() {
        let transport = Arc::new(FlakyTransport::new(
            0,
            json!({ "usage": { "total_tokens": 7 } }),
        ));
        let client = NavInferenceClient::new(fast_config(), transport.clone()).unwrap();

        let err = client.infer("sys", "user", &[], None).await.unwrap_err();
        assert!(matches!(err, NavError::Protocol(_)), "got {:?}", err);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn missing_token_usage_is_a_protocol_violation() {
        let transport = Arc::new(FlakyTransport::new(
            0,
            json!({ "choices": [ { "message": { "content": "hi" } } ] }),
        ));
        let client = NavInferenceClient::new(fast_config(), transport).unwrap();

        let err = client.infer("sys", "user", &[], None).await.unwrap_err();
        assert!(matches!(err, NavError::Protocol(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn attempt_timeout_counts_as_a_failed_attempt() {
        /// Never answers; forces the per-attempt timeout to fire.
        struct StalledTransport {
            calls: AtomicU32,
        }

        #[async_trait]
        impl InferenceTransport for StalledTransport {
            async fn round_trip(&self, _body: &Value) -> Result<Value, TransportError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("the timeout must abort this call first");
            }
        }

        let mut config = fast_config();
        config.retry.max_attempts = 2;
        config.attempt_timeout = Duration::from_millis(10);

        let transport = Arc::new(StalledTransport {
            calls: AtomicU32::new(0),
        });
        let client = NavInferenceClient::new(config, transport.clone()).unwrap();

        let err = client.infer("sys", "user", &[], None).await.unwrap_err();
        match err {
            NavError::Transport { attempts, source } => {
                assert_eq!(attempts, 2);
                assert!(matches!(source, TransportError::Timeout(_)));
            }
            other => panic!("expected Transport, got {:?}", other),
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn caption_uses_the_same_validation_path() {
        let transport = Arc::new(FlakyTransport::new(1, good_response()));
        let client = NavInferenceClient::new(fast_config(), transport.clone()).unwrap();

        let completion = client.caption("sys", "describe", "aGk=").await.unwrap();
        assert_eq!(completion.text, "Waypoint_1");
        assert_eq!(transport.call_count(), 2);
    }

    #[test]
    fn request_body_interleaves_markers_and_images() {
        let transport = Arc::new(FlakyTransport::new(0, good_response()));
        let client = NavInferenceClient::new(fast_config(), transport).unwrap();

        let images = vec![Some("AAA=".to_string()), None, Some("BBB=".to_string())];
        let mut user_content = Vec::new();
        for (i, image) in images.iter().enumerate() {
            if let Some(b64) = image {
                user_content.push(json!({ "type": "text", "text": format!("Image {}:", i) }));
                user_content.push(client.image_block(b64));
            }
        }
        user_content.push(json!({ "type": "text", "text": "choose" }));

        let body = client.request_body("sys", user_content, Some(ResponseFormat::JsonObject));
        let content = body["messages"][1]["content"].as_array().unwrap();

        // Two images plus their markers plus the trailing text.
        assert_eq!(content.len(), 5);
        assert_eq!(content[0]["text"], "Image 0:");
        assert_eq!(content[2]["text"], "Image 2:");
        assert!(content[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
        assert_eq!(content[1]["image_url"]["detail"], "low");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["temperature"], 0.0);
    }
}
