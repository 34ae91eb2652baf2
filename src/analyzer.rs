use log::debug;

use crate::color;
use crate::error::{Error, Result};
use crate::provider::{EmbeddingProvider, ImageSource, VisionProvider};
use crate::section::{SectionProfile, SectionRecord};

/// 单个截图区块的完整分析流程
///
/// 依次调用视觉模型、文本向量和颜色直方图，不写入数据库，由调用方负责持久化
pub struct SectionAnalyzer<V, E, I> {
    vision: V,
    embedder: E,
    images: I,
}

impl<V, E, I> SectionAnalyzer<V, E, I>
where
    V: VisionProvider,
    E: EmbeddingProvider,
    I: ImageSource,
{
    pub fn new(vision: V, embedder: E, images: I) -> Self {
        Self { vision, embedder, images }
    }

    pub fn images(&self) -> &I {
        &self.images
    }

    /// 分析一张截图，返回尚未写入的记录
    ///
    /// # Arguments
    ///
    /// * `image_url` - 存储中的相对路径
    /// * `site_url` - 截图来源网站
    /// * `profile` - 区块类型及其提示词
    pub async fn analyze(
        &self,
        image_url: &str,
        site_url: &str,
        profile: &SectionProfile,
    ) -> Result<SectionRecord> {
        let image = self.images.fetch(image_url).await?;

        let layout_description =
            self.vision.describe_layout(&image, profile).await.map_err(Error::Analysis)?;

        let layout_fingerprint = self.layout_fingerprint(&layout_description).await?;

        let color_fingerprint = color::color_fingerprint(&image)?;

        debug!(
            "{} 分析完成: layout {} 维, color {} 维",
            image_url,
            layout_fingerprint.len(),
            color_fingerprint.len()
        );

        Ok(SectionRecord {
            id: None,
            source_screen_id: None,
            section: profile.section,
            site_url: site_url.to_owned(),
            image_url: image_url.to_owned(),
            layout_fingerprint,
            color_fingerprint,
            layout_description,
            related_ids: None,
        })
    }

    /// 把布局描述格式化为缩进 JSON 后生成语义向量
    pub async fn layout_fingerprint(&self, description: &serde_json::Value) -> Result<Vec<f32>> {
        let text = layout_text(description);
        self.embedder.embed(&text).await.map_err(Error::Embedding)
    }
}

/// 字符串直接使用，其余按两空格缩进序列化
pub fn layout_text(description: &serde_json::Value) -> String {
    match description {
        serde_json::Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::color::tests::{encode_png, solid};
    use crate::error::ProviderError;
    use crate::section::{SectionCatalog, SectionType};

    struct FixedVision(Option<serde_json::Value>);

    impl VisionProvider for FixedVision {
        async fn describe_layout(
            &self,
            _image: &[u8],
            profile: &SectionProfile,
        ) -> std::result::Result<serde_json::Value, ProviderError> {
            assert!(!profile.prompt.is_empty());
            self.0.clone().ok_or_else(|| ProviderError::new("fake", "empty reply"))
        }
    }

    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::new("fake", "quota exceeded"));
            }
            Ok(vec![text.len() as f32, 1., 0.])
        }
    }

    struct MemoryImages(Option<Vec<u8>>);

    impl ImageSource for MemoryImages {
        async fn fetch(&self, image_url: &str) -> Result<Vec<u8>> {
            self.0.clone().ok_or_else(|| Error::Fetch {
                url: image_url.to_owned(),
                reason: "HTTP 404 Not Found".to_owned(),
            })
        }
    }

    fn png() -> Vec<u8> {
        encode_png(&solid(10, 10, (20., 40., 200.)))
    }

    fn footer() -> SectionProfile {
        SectionCatalog::builtin().profile(SectionType::Footer).unwrap().clone()
    }

    #[tokio::test]
    async fn test_analyze_populates_record() {
        let layout = json!({"rows": [{"rowIndex": 1, "content": []}]});
        let analyzer = SectionAnalyzer::new(
            FixedVision(Some(layout.clone())),
            CountingEmbedder::default(),
            MemoryImages(Some(png())),
        );
        let record = analyzer.analyze("a.com/footer.png", "a.com", &footer()).await.unwrap();
        assert_eq!(record.id, None);
        assert_eq!(record.related_ids, None);
        assert_eq!(record.section, SectionType::Footer);
        assert_eq!(record.image_url, "a.com/footer.png");
        assert_eq!(record.layout_description, layout);
        assert_eq!(record.layout_fingerprint.len(), 3);
        assert_eq!(record.color_fingerprint.len(), color::COLOR_FINGERPRINT_LEN);
        assert_eq!(record.layout_fingerprint[0], layout_text(&layout).len() as f32);
    }

    #[tokio::test]
    async fn test_vision_failure_is_analysis_error() {
        let analyzer = SectionAnalyzer::new(
            FixedVision(None),
            CountingEmbedder::default(),
            MemoryImages(Some(png())),
        );
        let err = analyzer.analyze("a.com/footer.png", "a.com", &footer()).await.unwrap_err();
        assert!(matches!(err, Error::Analysis(_)));
        assert_eq!(analyzer.embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_embedding_failure() {
        let analyzer = SectionAnalyzer::new(
            FixedVision(Some(json!({}))),
            CountingEmbedder { fail: true, ..Default::default() },
            MemoryImages(Some(png())),
        );
        let err = analyzer.analyze("a.com/footer.png", "a.com", &footer()).await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[tokio::test]
    async fn test_fetch_and_decode_failures() {
        let analyzer = SectionAnalyzer::new(
            FixedVision(Some(json!({}))),
            CountingEmbedder::default(),
            MemoryImages(None),
        );
        let err = analyzer.analyze("a.com/footer.png", "a.com", &footer()).await.unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));

        let analyzer = SectionAnalyzer::new(
            FixedVision(Some(json!({}))),
            CountingEmbedder::default(),
            MemoryImages(Some(b"<html>not found</html>".to_vec())),
        );
        let err = analyzer.analyze("a.com/footer.png", "a.com", &footer()).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_layout_text_indent() {
        let text = layout_text(&json!({"rows": [1]}));
        assert_eq!(text, "{\n  \"rows\": [\n    1\n  ]\n}");
        assert_eq!(layout_text(&json!("<footer/>")), "<footer/>");
    }
}
