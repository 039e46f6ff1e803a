//! # Adaptive Client
//!
//! Thin client for the external persona/recommendations service. The fetch
//! is bounded by a short wall-clock timeout and every failure mode (slow
//! engine, connection refused, bad payload) degrades to the built-in
//! defaults. A task must never fail because personalization was unavailable.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::errors::McpResult;
use crate::types::Recommendations;

#[derive(Debug, Serialize)]
struct RecommendationRequest<'a> {
    user_id: &'a str,
    query: &'a str,
    context: &'a str,
    conversation_history: &'a [JsonValue],
}

#[derive(Clone)]
pub struct AdaptiveClient {
    http: Option<reqwest::Client>,
    endpoint: String,
}

impl AdaptiveClient {
    /// Client against a live adaptive engine. `timeout` bounds the whole
    /// request (connect + response).
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> McpResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(crate::errors::McpError::from)?;
        Ok(Self {
            http: Some(http),
            endpoint: endpoint.into(),
        })
    }

    /// Client that always answers with the defaults; used in tests and in
    /// deployments without an adaptive engine.
    pub fn disabled() -> Self {
        Self {
            http: None,
            endpoint: String::new(),
        }
    }

    /// Fetch per-user recommendations. Infallible by contract: any failure
    /// returns [`Recommendations::default`].
    pub async fn get_recommendations(
        &self,
        user_id: &str,
        query: &str,
        conversation_history: &[JsonValue],
    ) -> Recommendations {
        let Some(http) = &self.http else {
            return Recommendations::default();
        };

        let request = RecommendationRequest {
            user_id,
            query,
            context: "",
            conversation_history,
        };

        let response = match http.post(&self.endpoint).json(&request).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "Adaptive engine unreachable, using defaults");
                return Recommendations::default();
            }
        };

        if !response.status().is_success() {
            warn!(
                user_id = %user_id,
                status = %response.status(),
                "Adaptive engine returned an error status, using defaults"
            );
            return Recommendations::default();
        }

        match response.json::<Recommendations>().await {
            Ok(recommendations) => {
                debug!(
                    user_id = %user_id,
                    confidence = recommendations.confidence,
                    "Fetched adaptive recommendations"
                );
                recommendations
            }
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "Bad adaptive payload, using defaults");
                Recommendations::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_client_returns_defaults() {
        let client = AdaptiveClient::disabled();
        let recommendations = client.get_recommendations("u1", "query", &[]).await;
        assert_eq!(recommendations, Recommendations::default());
    }

    #[tokio::test]
    async fn test_unreachable_engine_falls_back_to_defaults() {
        // Nothing listens on this port; the request fails fast
        let client = AdaptiveClient::new(
            "http://127.0.0.1:9/api/v1/optimization/recommendations",
            Duration::from_millis(250),
        )
        .unwrap();

        let recommendations = client.get_recommendations("u1", "query", &[]).await;
        assert_eq!(recommendations, Recommendations::default());
    }
}
