use super::{ProposalCandidate, ReasoningService};
use crate::domain::Insight;
use async_trait::async_trait;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct ReasoningRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

pub struct HttpReasoningService {
    client: ClientWithMiddleware,
    endpoint: String,
    model: String,
}

impl HttpReasoningService {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
        }
    }

    async fn call_json(&self, prompt: String, deadline: Duration) -> Option<serde_json::Value> {
        let request = self.client.post(&self.endpoint).json(&ReasoningRequest {
            model: &self.model,
            prompt: &prompt,
        });

        let response = match tokio::time::timeout(deadline, request.send()).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                warn!("reasoning service request failed: {e}");
                return None;
            }
            Err(_) => {
                warn!("reasoning service call exceeded {deadline:?} deadline");
                return None;
            }
        };

        match tokio::time::timeout(deadline, response.json::<serde_json::Value>()).await {
            Ok(Ok(body)) => Some(body),
            Ok(Err(e)) => {
                warn!("reasoning service response was not valid JSON: {e}");
                None
            }
            Err(_) => {
                warn!("reasoning service response body exceeded {deadline:?} deadline");
                None
            }
        }
    }
}

#[async_trait]
impl ReasoningService for HttpReasoningService {
    async fn propose(&self, prompt: String, deadline: Duration) -> Vec<ProposalCandidate> {
        let Some(body) = self.call_json(prompt, deadline).await else {
            return Vec::new();
        };
        match serde_json::from_value::<Vec<ProposalCandidate>>(body) {
            Ok(proposals) => proposals,
            Err(e) => {
                debug!("malformed proposal array from reasoning service: {e}");
                Vec::new()
            }
        }
    }

    async fn reflect(&self, prompt: String, deadline: Duration) -> Vec<Insight> {
        let Some(body) = self.call_json(prompt, deadline).await else {
            return Vec::new();
        };
        match serde_json::from_value::<Vec<Insight>>(body) {
            Ok(insights) => insights.into_iter().filter(|i| i.is_well_formed()).collect(),
            Err(e) => {
                debug!("malformed insight array from reasoning service: {e}");
                Vec::new()
            }
        }
    }
}
