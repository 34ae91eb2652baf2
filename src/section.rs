use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use clap::ValueEnum;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const FOOTER_PROMPT: &str = include_str!("prompts/footer.txt");
const ABOVE_THE_FOLD_PROMPT: &str = include_str!("prompts/above_the_fold.txt");
const GENERIC_PROMPT: &str = include_str!("prompts/generic.txt");

/// 网页截图中的区块类型
#[derive(
    ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum SectionType {
    #[serde(rename = "footer")]
    Footer,
    #[serde(rename = "above the fold")]
    AboveTheFold,
    #[serde(rename = "testimonials")]
    Testimonials,
    #[serde(rename = "features")]
    Features,
    #[serde(rename = "more features")]
    MoreFeatures,
    #[serde(rename = "how it works")]
    HowItWorks,
    #[serde(rename = "pricing")]
    Pricing,
    #[serde(rename = "complex pricing")]
    ComplexPricing,
    #[serde(rename = "FAQs")]
    Faqs,
    #[serde(rename = "Last CTA")]
    LastCta,
    #[serde(rename = "Blog")]
    Blog,
}

impl SectionType {
    pub const ALL: [SectionType; 11] = [
        Self::Footer,
        Self::AboveTheFold,
        Self::Testimonials,
        Self::Features,
        Self::MoreFeatures,
        Self::HowItWorks,
        Self::Pricing,
        Self::ComplexPricing,
        Self::Faqs,
        Self::LastCta,
        Self::Blog,
    ];

    /// 数据库中保存的标签
    pub fn label(self) -> &'static str {
        match self {
            Self::Footer => "footer",
            Self::AboveTheFold => "above the fold",
            Self::Testimonials => "testimonials",
            Self::Features => "features",
            Self::MoreFeatures => "more features",
            Self::HowItWorks => "how it works",
            Self::Pricing => "pricing",
            Self::ComplexPricing => "complex pricing",
            Self::Faqs => "FAQs",
            Self::LastCta => "Last CTA",
            Self::Blog => "Blog",
        }
    }

    /// 命令行与提示词文件使用的名字，如 `above-the-fold`
    pub fn slug(self) -> String {
        self.label().to_lowercase().replace(' ', "-")
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SectionType {
    type Err = Error;

    /// 同时接受数据库标签和命令行名字，不区分大小写
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase().replace('-', " ");
        Self::ALL
            .into_iter()
            .find(|section| section.label().to_lowercase() == wanted)
            .ok_or_else(|| Error::UnknownSection(s.to_owned()))
    }
}

/// 单个区块类型的分析配置
#[derive(Debug, Clone)]
pub struct SectionProfile {
    pub section: SectionType,
    /// 发送给视觉模型的提示词
    pub prompt: String,
}

/// 区块类型到分析配置的映射，由调用方构造后传入批处理
#[derive(Debug, Clone, Default)]
pub struct SectionCatalog {
    profiles: BTreeMap<SectionType, SectionProfile>,
}

impl SectionCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// 包含所有区块类型的内置提示词
    pub fn builtin() -> Self {
        SectionType::ALL.into_iter().fold(Self::empty(), |catalog, section| {
            catalog.with_prompt(section, builtin_prompt(section))
        })
    }

    /// 内置提示词，再用 `dir/<slug>.txt` 覆盖
    pub fn load(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        let mut catalog = Self::builtin();
        if !dir.is_dir() {
            return Ok(catalog);
        }
        for section in SectionType::ALL {
            let path = dir.join(format!("{}.txt", section.slug()));
            if path.is_file() {
                info!("使用自定义提示词: {}", path.display());
                catalog = catalog.with_prompt(section, std::fs::read_to_string(path)?);
            }
        }
        Ok(catalog)
    }

    pub fn with_prompt(mut self, section: SectionType, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        debug!("{} 提示词长度: {}", section, prompt.len());
        self.profiles.insert(section, SectionProfile { section, prompt });
        self
    }

    pub fn get(&self, section: SectionType) -> Option<&SectionProfile> {
        self.profiles.get(&section)
    }

    pub fn profile(&self, section: SectionType) -> Result<&SectionProfile> {
        self.get(section).ok_or_else(|| Error::UnknownSection(section.label().to_owned()))
    }

    /// 按固定顺序返回已配置的区块类型
    pub fn sections(&self) -> impl Iterator<Item = SectionType> + '_ {
        self.profiles.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn builtin_prompt(section: SectionType) -> String {
    match section {
        SectionType::Footer => FOOTER_PROMPT.to_owned(),
        SectionType::AboveTheFold => ABOVE_THE_FOLD_PROMPT.to_owned(),
        _ => GENERIC_PROMPT.replace("{section}", section.label()),
    }
}

/// 已分析的截图区块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRecord {
    /// 数据库 ID，写入前为空
    pub id: Option<i64>,
    /// 原始截图 ID
    pub source_screen_id: Option<i64>,
    pub section: SectionType,
    pub site_url: String,
    /// 存储中的相对路径
    pub image_url: String,
    /// 布局描述的语义向量
    pub layout_fingerprint: Vec<f32>,
    /// HSV 颜色直方图，8x8x8
    pub color_fingerprint: Vec<f32>,
    /// 视觉模型返回的布局描述，原样保存
    pub layout_description: serde_json::Value,
    /// 预先计算的相似区块 ID，按相似度降序
    pub related_ids: Option<Vec<i64>>,
}

/// 待分析的原始截图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub screen_id: i64,
    pub section: SectionType,
    pub site_url: String,
    /// 存储中的相对路径
    pub image_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_label_and_slug() {
        assert_eq!("above the fold".parse::<SectionType>().unwrap(), SectionType::AboveTheFold);
        assert_eq!("above-the-fold".parse::<SectionType>().unwrap(), SectionType::AboveTheFold);
        assert_eq!("faqs".parse::<SectionType>().unwrap(), SectionType::Faqs);
        assert_eq!("Last CTA".parse::<SectionType>().unwrap(), SectionType::LastCta);
        assert!("header".parse::<SectionType>().is_err());
    }

    #[test]
    fn test_slug_matches_value_enum() {
        for section in SectionType::ALL {
            let value = section.to_possible_value().unwrap();
            assert_eq!(value.get_name(), section.slug());
        }
    }

    #[test]
    fn test_serde_uses_label() {
        let json = serde_json::to_string(&SectionType::HowItWorks).unwrap();
        assert_eq!(json, "\"how it works\"");
        let section: SectionType = serde_json::from_str("\"FAQs\"").unwrap();
        assert_eq!(section, SectionType::Faqs);
    }

    #[test]
    fn test_builtin_catalog_covers_all_sections() {
        let catalog = SectionCatalog::builtin();
        assert_eq!(catalog.len(), SectionType::ALL.len());
        let pricing = catalog.profile(SectionType::Pricing).unwrap();
        assert!(pricing.prompt.contains("pricing section"));
        assert!(catalog.profile(SectionType::Footer).unwrap().prompt.contains("footer"));
    }

    #[test]
    fn test_catalog_override_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("footer.txt"), "custom footer prompt").unwrap();
        let catalog = SectionCatalog::load(dir.path()).unwrap();
        assert_eq!(catalog.profile(SectionType::Footer).unwrap().prompt, "custom footer prompt");
        assert_ne!(catalog.profile(SectionType::Blog).unwrap().prompt, "custom footer prompt");
    }

    #[test]
    fn test_empty_catalog_rejects_section() {
        let catalog = SectionCatalog::empty().with_prompt(SectionType::Footer, "x");
        assert!(matches!(catalog.profile(SectionType::Blog), Err(Error::UnknownSection(_))));
        assert_eq!(catalog.sections().collect::<Vec<_>>(), vec![SectionType::Footer]);
    }
}
