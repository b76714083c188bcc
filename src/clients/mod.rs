//! Remote collaborators: the planner, the vision model and the memory store.
//!
//! Each is a trait so the orchestrator can be driven by fakes; the HTTP
//! implementations share one [`ApiClient`].

pub mod memory;
pub mod plan;
pub mod vision;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{AgentError, Result};

pub use memory::{HttpMemoryClient, InMemoryMemory, MemoryClient};
pub use plan::{HttpPlanClient, PlanClient, PlanRequest};
pub use vision::{HttpVisionClient, SuggestedAction, VisionAnalysis, VisionClient, VisionRequest};

/// `{success, data, error}` envelope used by every endpoint.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Shared HTTP plumbing: base URL, optional bearer key, JSON bodies.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: reqwest::Url,
    api_key: Option<String>,
}

impl ApiClient {
    pub fn new(api_base: &str, api_key: Option<String>) -> Result<Self> {
        let mut base = reqwest::Url::parse(api_base)
            .map_err(|err| AgentError::Config(format!("invalid api base `{api_base}`: {err}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }

    /// Resolves `path` below the base URL, keeping any prefix the base has.
    pub fn endpoint(&self, path: &str) -> Result<reqwest::Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|err| AgentError::Config(format!("invalid endpoint `{path}`: {err}")))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// POSTs `body` and decodes the response, failing on a non-2xx status.
    pub async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let response = self.authorize(self.http.post(url)).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::transport(format!(
                "{path} returned {status}: {}",
                text.trim()
            )));
        }
        Ok(response.json().await?)
    }

    pub async fn get<R: DeserializeOwned>(&self, url: reqwest::Url) -> Result<R> {
        debug!(%url, "GET");
        let response = self.authorize(self.http.get(url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::transport(format!("GET returned {status}")));
        }
        Ok(response.json().await?)
    }
}

/// Strips a markdown code fence a model may wrap around JSON.
pub fn strip_code_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn endpoints_join_onto_the_base() {
        let client = ApiClient::new("http://localhost:3000", Some(String::new())).unwrap();
        assert_eq!(
            client.endpoint("/api/plan").unwrap().as_str(),
            "http://localhost:3000/api/plan"
        );
        assert!(client.api_key.is_none());

        for base in ["http://gateway.test/v1", "http://gateway.test/v1/"] {
            let client = ApiClient::new(base, None).unwrap();
            assert_eq!(
                client.endpoint("/api/memory").unwrap().as_str(),
                "http://gateway.test/v1/api/memory"
            );
        }
        assert!(matches!(
            ApiClient::new("not a url", None),
            Err(AgentError::Config(_))
        ));
    }
}
