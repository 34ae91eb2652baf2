//! 外部服务：视觉分析、文本向量和图片存储

use std::future::Future;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ProviderError, Result};
use crate::section::SectionProfile;

mod gemini;
mod image;
mod openai;

pub use gemini::GeminiVision;
pub use image::ImageStore;
pub use openai::OpenAiEmbedder;

/// 把截图转换为结构化的布局描述
pub trait VisionProvider: Send + Sync {
    fn describe_layout(
        &self,
        image: &[u8],
        profile: &SectionProfile,
    ) -> impl Future<Output = std::result::Result<serde_json::Value, ProviderError>> + Send;
}

/// 把文本转换为固定维度的语义向量
pub trait EmbeddingProvider: Send + Sync {
    fn embed(
        &self,
        text: &str,
    ) -> impl Future<Output = std::result::Result<Vec<f32>, ProviderError>> + Send;
}

/// 根据存储中的相对路径读取图片
pub trait ImageSource: Send + Sync {
    fn fetch(&self, image_url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("failed to build regex")
});

/// 解析模型回复中的 JSON，允许外层包裹 markdown 代码块
pub fn parse_json_reply(
    provider: &'static str,
    reply: &str,
) -> std::result::Result<serde_json::Value, ProviderError> {
    let body = match CODE_FENCE.captures(reply) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => reply.trim(),
    };
    if body.is_empty() {
        return Err(ProviderError::new(provider, "模型返回了空内容"));
    }
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ProviderError::new(provider, format!("无法解析 JSON: {e}")))?;
    if value.is_null() {
        return Err(ProviderError::new(provider, "模型返回了 null"));
    }
    Ok(value)
}
