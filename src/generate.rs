//! Script generation client
//!
//! Asks a remote generator service to write an environment script or a
//! playbook from a free-text description. The service answers
//! `POST /generate/<kind>` with `{"script": "..."}`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Please enter {0} requirements.")]
    EmptyRequirements(&'static str),

    #[error("invalid generator endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Failed to generate script! (status {0})")]
    Status(reqwest::StatusCode),

    #[error("Connection error: {0}")]
    Request(#[from] reqwest::Error),
}

/// What the generator should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Environment,
    Playbook,
}

impl ScriptKind {
    fn route(self) -> &'static str {
        match self {
            ScriptKind::Environment => "generate/environment",
            ScriptKind::Playbook => "generate/playbook",
        }
    }

    /// Human name, as used in prompts and headings
    pub fn label(self) -> &'static str {
        match self {
            ScriptKind::Environment => "environment",
            ScriptKind::Playbook => "playbook",
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    requirements: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    script: String,
}

/// HTTP client for the generator service
pub struct ScriptClient {
    client: reqwest::Client,
    base: Url,
}

impl ScriptClient {
    pub fn new(endpoint: &str) -> Result<Self, GenerateError> {
        let mut base = Url::parse(endpoint).map_err(|e| GenerateError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(GenerateError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: "scheme must be http or https".to_string(),
            });
        }
        // Routes are joined relative to the endpoint path
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base,
        })
    }

    /// Request a script for `requirements`; blank requirements never hit the network
    pub async fn generate(
        &self,
        kind: ScriptKind,
        requirements: &str,
    ) -> Result<String, GenerateError> {
        if requirements.trim().is_empty() {
            return Err(GenerateError::EmptyRequirements(kind.label()));
        }

        let url = self
            .base
            .join(kind.route())
            .map_err(|e| GenerateError::InvalidEndpoint {
                endpoint: self.base.to_string(),
                reason: e.to_string(),
            })?;
        info!(%url, kind = kind.label(), "requesting script");

        let response = self
            .client
            .post(url)
            .json(&GenerateRequest { requirements })
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(GenerateError::Status(status));
        }

        let body: GenerateResponse = response.json().await?;
        debug!(bytes = body.script.len(), "script received");
        Ok(body.script)
    }
}
