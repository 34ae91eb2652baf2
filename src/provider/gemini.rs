use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{VisionProvider, parse_json_reply};
use crate::error::ProviderError;
use crate::section::SectionProfile;

const PROVIDER: &str = "gemini";
const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini 视觉模型，根据提示词返回区块的布局 JSON
pub struct GeminiVision {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl GeminiVision {
    pub fn new(api_key: String, model: String, timeout: Duration) -> anyhow::Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "缺少 Gemini API key");
        anyhow::ensure!(!model.trim().is_empty(), "缺少 Gemini 模型名");
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint: DEFAULT_ENDPOINT.to_owned(), api_key, model })
    }

    async fn generate(&self, image: &[u8], prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: prompt },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: sniff_mime(image),
                            data: STANDARD.encode(image),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 1.,
                top_p: 0.95,
                top_k: 40,
                max_output_tokens: 8192,
            },
        };

        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.trim())])
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::new(PROVIDER, format!("请求失败: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_owned());
            return Err(ProviderError::new(PROVIDER, format!("返回 {status}: {text}")));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::new(PROVIDER, format!("无法解析响应: {e}")))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join(""))
            .unwrap_or_default();
        debug!("gemini 返回 {} 字节", text.len());
        Ok(text)
    }
}

impl VisionProvider for GeminiVision {
    async fn describe_layout(
        &self,
        image: &[u8],
        profile: &SectionProfile,
    ) -> Result<serde_json::Value, ProviderError> {
        let reply = self.generate(image, &profile.prompt).await?;
        parse_json_reply(PROVIDER, &reply)
    }
}

/// 根据文件头猜测图片类型，截图以 webp 和 png 为主
fn sniff_mime(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        [b'G', b'I', b'F', ..] => "image/gif",
        _ => "image/webp",
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_mime() {
        assert_eq!(sniff_mime(b"\x89PNG\r\n\x1a\n"), "image/png");
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(sniff_mime(b"RIFF\x10\x00\x00\x00WEBPVP8 "), "image/webp");
    }

    #[test]
    fn test_request_shape() {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: "prompt" },
                    Part::InlineData {
                        inline_data: InlineData { mime_type: "image/png", data: "AA==".into() },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 1.,
                top_p: 0.95,
                top_k: 40,
                max_output_tokens: 8192,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "prompt");
        assert_eq!(json["contents"][0]["parts"][1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[test]
    fn test_response_text() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"```json\n{}"},{"text":"\n```"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        let text: String = parsed.candidates[0]
            .content
            .as_ref()
            .unwrap()
            .parts
            .iter()
            .filter_map(|p| p.text.clone())
            .collect();
        assert_eq!(parse_json_reply(PROVIDER, &text).unwrap(), serde_json::json!({}));
    }
}
