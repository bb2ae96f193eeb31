//! Wayfarer Configuration
//!
//! Explicit configuration values for the inference client and the agent.
//! Credentials are read from the environment once at startup and validated
//! before any client exists; nothing in the core reads ambient globals at
//! call time.

use std::env;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{NavError, NavResult};
use crate::types::OutputMode;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable holding the organization identifier.
pub const ORG_ID_ENV: &str = "OPENAI_ORG_ID";

/// Model served in free-text output mode.
pub const TEXT_MODEL: &str = "gpt-4-vision-preview";

/// Model served in structured JSON output mode.
pub const JSON_MODEL: &str = "gpt-4o-2024-08-06";

/// Maximum images embedded in a single inference request.
pub const IMAGE_LIMIT: usize = 20;

/// Credentials for the inference endpoint. Both identifiers must be present
/// and non-empty before any client can be constructed.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub api_key: String,
    pub organization_id: String,
}

impl Credentials {
    /// Build credentials from explicit values, rejecting empty identifiers.
    pub fn new(api_key: String, organization_id: String) -> NavResult<Self> {
        if api_key.trim().is_empty() {
            return Err(NavError::Config("API key is empty".to_string()));
        }
        if organization_id.trim().is_empty() {
            return Err(NavError::Config("organization id is empty".to_string()));
        }
        Ok(Self {
            api_key,
            organization_id,
        })
    }

    /// Read both identifiers from the process environment. Fails fast at
    /// startup, before any network activity.
    pub fn from_env() -> NavResult<Self> {
        let api_key = env::var(API_KEY_ENV)
            .map_err(|_| NavError::Config(format!("{} not set in environment", API_KEY_ENV)))?;
        let organization_id = env::var(ORG_ID_ENV)
            .map_err(|_| NavError::Config(format!("{} not set in environment", ORG_ID_ENV)))?;
        Self::new(api_key, organization_id)
    }
}

/// Retry policy for transient transport failures. Immutable, owned by the
/// inference client instance.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Randomized exponential backoff delay before the next attempt.
    /// Uniform over an exponentially widening window, always within
    /// `[min_backoff, max_backoff]`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let floor = self.min_backoff.as_secs_f64();
        let cap = self.max_backoff.as_secs_f64();
        let ceil = (floor * 2f64.powi(attempt.saturating_sub(1) as i32)).min(cap);
        if ceil <= floor {
            return self.min_backoff;
        }
        let secs = rand::thread_rng().gen_range(floor..=ceil);
        Duration::from_secs_f64(secs)
    }
}

/// Configuration for the inference client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the OpenAI-compatible endpoint.
    pub api_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Detail hint attached to every embedded image block.
    pub image_detail: String,
    /// Hard wall-clock limit per attempt. Expiry aborts the in-flight
    /// transport call and consumes one attempt.
    pub attempt_timeout: Duration,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn validate(&self) -> NavResult<()> {
        if self.api_url.trim().is_empty() {
            return Err(NavError::Config("api_url is empty".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(NavError::Config("model is empty".to_string()));
        }
        if self.max_tokens == 0 {
            return Err(NavError::Config("max_tokens must be positive".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(NavError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.min_backoff > self.retry.max_backoff {
            return Err(NavError::Config(
                "retry.min_backoff exceeds retry.max_backoff".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default client configuration for the structured-output model.
pub fn default_client_config() -> ClientConfig {
    ClientConfig {
        api_url: "https://api.openai.com".to_string(),
        model: JSON_MODEL.to_string(),
        max_tokens: 600,
        temperature: 0.0,
        image_detail: "low".to_string(),
        attempt_timeout: Duration::from_secs(120),
        retry: RetryPolicy::default(),
    }
}

/// Configuration for the navigation agent.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub model: String,
    pub output_mode: OutputMode,
    /// Caption each candidate image before prompt assembly.
    pub caption_images: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: JSON_MODEL.to_string(),
            output_mode: OutputMode::Json,
            caption_images: true,
        }
    }
}
