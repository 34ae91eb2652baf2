use std::time::Duration;

use anyhow::Context;
use log::warn;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;
use crate::error::ProviderError;

const PROVIDER: &str = "openai";

/// OpenAI 兼容的 embeddings 接口
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    max_retries: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        dimensions: Option<usize>,
        timeout: Duration,
        max_retries: usize,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "缺少 OpenAI API key");
        anyhow::ensure!(!model.trim().is_empty(), "缺少 embedding 模型名");
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&auth).context("无效的 OpenAI API key")?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder().timeout(timeout).default_headers(headers).build()?;
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));
        Ok(Self { client, endpoint, model, dimensions, max_retries: max_retries.max(1) })
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut attempt = 0usize;
        loop {
            let body = EmbeddingRequest {
                model: &self.model,
                input: text,
                encoding_format: "float",
                dimensions: self.dimensions,
            };
            let err = match self.client.post(&self.endpoint).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: EmbeddingResponse = resp
                        .json()
                        .await
                        .map_err(|e| ProviderError::new(PROVIDER, format!("无法解析响应: {e}")))?;
                    return parsed
                        .data
                        .into_iter()
                        .next()
                        .map(|entry| entry.embedding)
                        .ok_or_else(|| ProviderError::new(PROVIDER, "响应中没有向量"));
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text =
                        resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_owned());
                    if !should_retry(status) {
                        return Err(ProviderError::new(PROVIDER, format!("返回 {status}: {text}")));
                    }
                    format!("返回 {status}: {text}")
                }
                Err(e) => {
                    if !(e.is_timeout() || e.is_connect() || e.is_request()) {
                        return Err(ProviderError::new(PROVIDER, format!("请求失败: {e}")));
                    }
                    format!("请求失败: {e}")
                }
            };

            attempt += 1;
            if attempt >= self.max_retries {
                return Err(ProviderError::new(PROVIDER, err));
            }
            warn!("embedding 请求失败，第 {attempt} 次重试: {err}");
            tokio::time::sleep(retry_backoff(attempt)).await;
        }
    }
}

impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let embedding = self.request(text).await?;
        if let Some(dim) = self.dimensions {
            if embedding.len() != dim {
                return Err(ProviderError::new(
                    PROVIDER,
                    format!("向量维度为 {}，期望 {}", embedding.len(), dim),
                ));
            }
        }
        Ok(embedding)
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    encoding_format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy() {
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry(StatusCode::BAD_GATEWAY));
        assert!(!should_retry(StatusCode::UNAUTHORIZED));
        assert_eq!(retry_backoff(1), Duration::from_millis(1000));
        assert_eq!(retry_backoff(9), retry_backoff(5));
    }

    #[test]
    fn test_missing_key() {
        let result = OpenAiEmbedder::new(
            " ".into(),
            "https://api.openai.com/v1".into(),
            "text-embedding-3-small".into(),
            Some(1536),
            Duration::from_secs(5),
            3,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_request_skips_default_dimensions() {
        let body = EmbeddingRequest {
            model: "m",
            input: "{}",
            encoding_format: "float",
            dimensions: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("dimensions").is_none());
        assert_eq!(json["encoding_format"], "float");
    }
}
