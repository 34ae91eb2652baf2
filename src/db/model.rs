use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::section::{SectionRecord, SectionType, WorkItem};

/// 导入清单中的一行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScreen {
    pub img_url: String,
    pub site_url: String,
    pub section: SectionType,
    #[serde(default = "default_public")]
    pub is_public: bool,
    /// RFC 3339 时间，缺省为导入时间
    #[serde(default)]
    pub captured_at: Option<String>,
}

fn default_public() -> bool {
    true
}

/// 待分析截图
#[derive(Debug, sqlx::FromRow)]
pub struct WorkRecord {
    pub screen_id: i64,
    pub site_url: String,
    pub img_url: String,
}

impl WorkRecord {
    pub fn into_item(self, section: SectionType) -> WorkItem {
        WorkItem {
            screen_id: self.screen_id,
            section,
            site_url: self.site_url,
            image_url: self.img_url,
        }
    }
}

/// 区块分析记录，向量以字节形式保存
#[derive(Debug, sqlx::FromRow)]
pub struct AnalysisRecord {
    pub id: i64,
    pub screen_id: i64,
    pub section: String,
    pub site_url: String,
    pub img_url: String,
    pub layout_embedding: Vec<u8>,
    pub color_embedding: Vec<u8>,
    /// 布局描述 JSON
    pub layout_data: String,
    /// 相关区块 ID 的 JSON 数组
    pub related_ids: Option<String>,
}

impl TryFrom<AnalysisRecord> for SectionRecord {
    type Error = Error;

    fn try_from(row: AnalysisRecord) -> Result<Self> {
        let id = row.id;
        let corrupt = |reason: String| Error::CorruptRecord { id, reason };

        let section = row
            .section
            .parse::<SectionType>()
            .map_err(|_| corrupt(format!("未知的区块类型 {}", row.section)))?;
        let layout_description = serde_json::from_str(&row.layout_data)
            .map_err(|e| corrupt(format!("布局描述不是有效的 JSON: {e}")))?;
        let related_ids = row
            .related_ids
            .as_deref()
            .map(serde_json::from_str::<Vec<i64>>)
            .transpose()
            .map_err(|e| corrupt(format!("related_ids 无法解析: {e}")))?;

        Ok(SectionRecord {
            id: Some(id),
            source_screen_id: Some(row.screen_id),
            section,
            site_url: row.site_url,
            image_url: row.img_url,
            layout_fingerprint: decode_vector(id, &row.layout_embedding)?,
            color_fingerprint: decode_vector(id, &row.color_embedding)?,
            layout_description,
            related_ids,
        })
    }
}

/// 只包含 ID 和布局向量，用于数据库侧的相似度查询
#[derive(Debug, sqlx::FromRow)]
pub struct EmbeddingRecord {
    pub id: i64,
    pub layout_embedding: Vec<u8>,
}

/// 每种区块的统计信息
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SectionStats {
    pub section: String,
    /// 截图总数
    pub screens: i64,
    /// 其中公开的截图
    pub public: i64,
    /// 已分析
    pub analyzed: i64,
    /// 已计算相关区块
    pub related: i64,
}

impl SectionStats {
    pub fn pending(&self) -> i64 {
        (self.public - self.analyzed).max(0)
    }
}

pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    bytemuck::cast_slice(vector).to_vec()
}

pub fn decode_vector(id: i64, bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % size_of::<f32>() != 0 {
        return Err(Error::CorruptRecord {
            id,
            reason: format!("向量字节长度 {} 不是 4 的倍数", bytes.len()),
        });
    }
    Ok(bytemuck::pod_collect_to_vec(bytes))
}
