use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::SectionStats;
use crate::ranker::{SearchOptions, SimilarSection};

/// 搜索请求参数，未填写的选项使用服务器默认值
#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequest {
    /// 已分析截图的地址，可以是存储中的相对路径或完整地址
    pub image_url: String,
    /// 是否比较布局向量
    pub include_layout: Option<bool>,
    /// 是否比较颜色直方图
    pub include_color: Option<bool>,
    /// 布局权重
    pub layout_weight: Option<f64>,
    /// 颜色权重
    pub color_weight: Option<f64>,
    /// 返回的结果数量
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn options(&self, default: &SearchOptions) -> SearchOptions {
        SearchOptions {
            include_layout: self.include_layout.unwrap_or(default.include_layout),
            include_color: self.include_color.unwrap_or(default.include_color),
            layout_weight: self.layout_weight.unwrap_or(default.layout_weight),
            color_weight: self.color_weight.unwrap_or(default.color_weight),
        }
    }
}

/// 单条搜索结果
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchHit {
    pub id: Option<i64>,
    pub screen_id: Option<i64>,
    /// 区块类型
    pub section: String,
    pub site_url: String,
    /// 完整图片地址
    pub image_url: String,
    /// 综合得分
    pub score: f64,
    pub layout_score: Option<f64>,
    pub color_score: Option<f64>,
}

impl From<SimilarSection> for SearchHit {
    fn from(hit: SimilarSection) -> Self {
        Self {
            id: hit.id,
            screen_id: hit.screen_id,
            section: hit.section.label().to_owned(),
            site_url: hit.site_url,
            image_url: hit.image_url,
            score: hit.score,
            layout_score: hit.layout_score,
            color_score: hit.color_score,
        }
    }
}

/// 搜索响应
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    /// 搜索耗时，单位为毫秒
    pub time: u64,
    /// 按综合得分降序排列的结果
    pub result: Vec<SearchHit>,
}

/// 每种区块的处理进度
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsRow {
    pub section: String,
    pub screens: i64,
    pub analyzed: i64,
    pub pending: i64,
    pub related: i64,
}

impl From<&SectionStats> for StatsRow {
    fn from(stats: &SectionStats) -> Self {
        Self {
            section: stats.section.clone(),
            screens: stats.screens,
            analyzed: stats.analyzed,
            pending: stats.pending(),
            related: stats.related,
        }
    }
}
