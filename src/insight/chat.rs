//! Chat-completion backed insight generator (OpenAI-compatible API).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Generation, GenerationError, InsightGenerator};
use crate::config::AiConfig;
use crate::metrics::AnomalyBatch;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct ChatInsightGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    persona: String,
}

impl ChatInsightGenerator {
    pub fn new(cfg: &AiConfig) -> Result<Self, GenerationError> {
        Self::with_timeout(cfg, cfg.timeout())
    }

    pub fn with_timeout(cfg: &AiConfig, timeout: Duration) -> Result<Self, GenerationError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            persona: cfg.persona.clone(),
        })
    }
}

/// User message embedding the serialized anomaly rows.
pub fn build_prompt(batch: &AnomalyBatch) -> String {
    let rows = serde_json::Value::Array(batch.rows.clone());
    format!(
        "My metrics monitoring found these {} issues on HTTP endpoints. \
         Give a 1-2 sentence recommendation for each one. \
         Keep the formatting plain.\n\nData:\n{}",
        batch.category, rows
    )
}

#[async_trait]
impl InsightGenerator for ChatInsightGenerator {
    async fn generate(&self, batch: &AnomalyBatch) -> Result<Generation, GenerationError> {
        if batch.is_empty() {
            debug!(query = %batch.query_id, "no actionable rows, skipping generation");
            return Ok(Generation::NoInsight);
        }

        let prompt = build_prompt(batch);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.persona,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        info!(query = %batch.query_id, model = %self.model, rows = batch.len(), "requesting insight");
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => {}
            s @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                return Err(GenerationError::Unauthorized(s.as_u16()))
            }
            StatusCode::TOO_MANY_REQUESTS => return Err(GenerationError::RateLimited),
            s => return Err(GenerationError::Status(s.as_u16())),
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(GenerationError::EmptyContent);
        }
        Ok(Generation::Insight(content))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::{routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config(base_url: &str) -> AiConfig {
        AiConfig {
            base_url: base_url.to_string(),
            api_key: "sk-test".to_string(),
            model: "test-model".to_string(),
            timeout_secs: 2,
            ..AiConfig::default()
        }
    }

    fn batch() -> AnomalyBatch {
        AnomalyBatch::new(
            "p95-latency",
            "latency",
            vec![json!({ "metric": { "uri": "/api/slow/{id}" }, "value": [1, "0.9"] })],
        )
    }

    #[test]
    fn test_prompt_embeds_rows() {
        let prompt = build_prompt(&batch());
        assert!(prompt.contains("latency"));
        assert!(prompt.contains("/api/slow/{id}"));
    }

    #[tokio::test]
    async fn test_empty_batch_is_no_insight() {
        // Unroutable base: the backend must not be contacted.
        let generator = ChatInsightGenerator::new(&config("http://127.0.0.1:1")).unwrap();
        let empty = AnomalyBatch::new("q", "latency", vec![]);
        assert_eq!(generator.generate(&empty).await.unwrap(), Generation::NoInsight);
    }

    #[tokio::test]
    async fn test_generate_returns_content() {
        let app = Router::new().route(
            "/chat/completions",
            post(|headers: HeaderMap, Json(req): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer sk-test");
                assert_eq!(req["model"], "test-model");
                assert_eq!(req["messages"][0]["role"], "system");
                assert_eq!(req["messages"][1]["role"], "user");
                Json(json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "  Increase connection pool size\n" } }
                    ]
                }))
            }),
        );
        let base = spawn(app).await;
        let generator = ChatInsightGenerator::new(&config(&base)).unwrap();

        assert_eq!(
            generator.generate(&batch()).await.unwrap(),
            Generation::Insight("Increase connection pool size".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_content_is_failure() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { Json(json!({ "choices": [ { "message": { "content": null } } ] })) }),
        );
        let base = spawn(app).await;
        let generator = ChatInsightGenerator::new(&config(&base)).unwrap();

        assert!(matches!(
            generator.generate(&batch()).await,
            Err(GenerationError::EmptyContent)
        ));
    }

    #[tokio::test]
    async fn test_auth_and_rate_limit_errors() {
        let app = Router::new()
            .route(
                "/auth/chat/completions",
                post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
            )
            .route(
                "/limited/chat/completions",
                post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
            );
        let base = spawn(app).await;

        let generator = ChatInsightGenerator::new(&config(&format!("{}/auth", base))).unwrap();
        assert!(matches!(
            generator.generate(&batch()).await,
            Err(GenerationError::Unauthorized(401))
        ));

        let generator = ChatInsightGenerator::new(&config(&format!("{}/limited/", base))).unwrap();
        assert!(matches!(
            generator.generate(&batch()).await,
            Err(GenerationError::RateLimited)
        ));
    }
}
