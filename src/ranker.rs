use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::SectionStore;
use crate::error::{Error, Result};
use crate::metrics;
use crate::section::{SectionRecord, SectionType};
use crate::similarity::{cosine_similarity, histogram_similarity};

/// 相似度计算选项
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// 比较布局向量
    pub include_layout: bool,
    /// 比较颜色直方图
    pub include_color: bool,
    /// 布局权重，只在两种比较都启用时生效
    pub layout_weight: f64,
    /// 颜色权重，只在两种比较都启用时生效
    pub color_weight: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { include_layout: true, include_color: true, layout_weight: 0.5, color_weight: 0.5 }
    }
}

impl SearchOptions {
    pub fn layout_only() -> Self {
        Self { include_color: false, ..Self::default() }
    }

    pub fn color_only() -> Self {
        Self { include_layout: false, ..Self::default() }
    }

    fn combine(&self, layout: Option<f64>, color: Option<f64>) -> f64 {
        match (layout, color) {
            (Some(l), Some(c)) => l * self.layout_weight + c * self.color_weight,
            (Some(score), None) | (None, Some(score)) => score,
            (None, None) => 0.,
        }
    }
}

/// 单个候选区块的排序结果
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResult<'a> {
    pub record: &'a SectionRecord,
    pub combined_score: f64,
    pub layout_score: Option<f64>,
    pub color_score: Option<f64>,
}

/// 对候选区块按与目标的相似度排序
///
/// 与目标 `image_url` 相同的候选会被排除；得分相同时保持输入顺序
pub fn rank<'a>(
    target: &SectionRecord,
    candidates: &'a [SectionRecord],
    options: &SearchOptions,
) -> Result<Vec<RankedResult<'a>>> {
    let mut results = candidates
        .par_iter()
        .filter(|candidate| candidate.image_url != target.image_url)
        .map(|candidate| score(target, candidate, options))
        .collect::<Result<Vec<_>>>()?;

    // 稳定排序，保证结果可复现
    results.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
    Ok(results)
}

fn score<'a>(
    target: &SectionRecord,
    candidate: &'a SectionRecord,
    options: &SearchOptions,
) -> Result<RankedResult<'a>> {
    let layout_score = options
        .include_layout
        .then(|| cosine_similarity(&target.layout_fingerprint, &candidate.layout_fingerprint))
        .transpose()?;
    let color_score = options
        .include_color
        .then(|| histogram_similarity(&target.color_fingerprint, &candidate.color_fingerprint))
        .transpose()?;

    Ok(RankedResult {
        record: candidate,
        combined_score: options.combine(layout_score, color_score),
        layout_score,
        color_score,
    })
}

/// 预先计算的相关区块
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelatedSection {
    pub id: i64,
    pub score: f64,
}

/// 相关区块的计算方式
pub trait Ranker: Send + Sync {
    /// 返回与 `target` 最相似的至多 `limit` 个区块，按相似度降序，不包含目标本身
    fn related<S: SectionStore>(
        &self,
        store: &S,
        target: &SectionRecord,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RelatedSection>>> + Send;
}

/// 读取同类区块后在本地计算得分
///
/// 同一类区块的候选只从存储读取一次，一个实例对应一次相关区块计算
#[derive(Debug, Default)]
pub struct SpecificRanker {
    pub options: SearchOptions,
    candidates: Mutex<HashMap<SectionType, Arc<Vec<SectionRecord>>>>,
}

impl SpecificRanker {
    pub fn new(options: SearchOptions) -> Self {
        Self { options, candidates: Mutex::default() }
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<SectionType, Arc<Vec<SectionRecord>>>> {
        self.candidates.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn candidates<S: SectionStore>(
        &self,
        store: &S,
        section: SectionType,
    ) -> Result<Arc<Vec<SectionRecord>>> {
        let cached = self.cache().get(&section).cloned();
        if let Some(candidates) = cached {
            return Ok(candidates);
        }
        let candidates = Arc::new(store.list_by_section(section).await?);
        debug!("{section}: 缓存 {} 个候选区块", candidates.len());
        self.cache().insert(section, candidates.clone());
        Ok(candidates)
    }
}

impl Ranker for SpecificRanker {
    async fn related<S: SectionStore>(
        &self,
        store: &S,
        target: &SectionRecord,
        limit: usize,
    ) -> Result<Vec<RelatedSection>> {
        let candidates = self.candidates(store, target.section).await?;
        let ranked = rank(target, &candidates, &self.options)?;
        Ok(ranked
            .into_iter()
            .filter_map(|r| r.record.id.map(|id| RelatedSection { id, score: r.combined_score }))
            .take(limit)
            .collect())
    }
}

/// 交给存储按布局向量查询，只使用布局相似度
#[derive(Debug, Clone)]
pub struct GeneralRanker {
    /// 最低相似度
    pub threshold: f64,
}

impl Default for GeneralRanker {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl Ranker for GeneralRanker {
    async fn related<S: SectionStore>(
        &self,
        store: &S,
        target: &SectionRecord,
        limit: usize,
    ) -> Result<Vec<RelatedSection>> {
        // 多取一条，目标自身通常排在第一位
        let mut hits = store
            .match_embeddings(&target.layout_fingerprint, target.section, self.threshold, limit + 1)
            .await?;
        hits.retain(|hit| Some(hit.id) != target.id);
        hits.truncate(limit);
        Ok(hits)
    }
}

/// 命令行选择的计算方式
#[derive(Debug)]
pub enum RelatedStrategy {
    Specific(SpecificRanker),
    General(GeneralRanker),
}

impl Ranker for RelatedStrategy {
    async fn related<S: SectionStore>(
        &self,
        store: &S,
        target: &SectionRecord,
        limit: usize,
    ) -> Result<Vec<RelatedSection>> {
        match self {
            Self::Specific(ranker) => ranker.related(store, target, limit).await,
            Self::General(ranker) => ranker.related(store, target, limit).await,
        }
    }
}

/// 搜索结果，`image_url` 已转换为完整地址
#[derive(Debug, Clone, Serialize)]
pub struct SimilarSection {
    pub id: Option<i64>,
    pub screen_id: Option<i64>,
    pub section: SectionType,
    pub site_url: String,
    pub image_url: String,
    pub score: f64,
    pub layout_score: Option<f64>,
    pub color_score: Option<f64>,
}

/// 在目标的同类区块中搜索最相似的记录
///
/// # Arguments
///
/// * `image_url` - 目标在存储中的相对路径
/// * `resolve` - 把相对路径转换为对外展示的地址
pub async fn search_similar<S, F>(
    store: &S,
    image_url: &str,
    options: &SearchOptions,
    limit: usize,
    resolve: F,
) -> Result<Vec<SimilarSection>>
where
    S: SectionStore,
    F: Fn(&str) -> String,
{
    let start = Instant::now();
    let target = store
        .get_by_image_url(image_url)
        .await?
        .ok_or_else(|| Error::NotFound(image_url.to_owned()))?;
    let candidates = store.list_by_section(target.section).await?;
    debug!("{}: {} 个候选区块", target.section, candidates.len());

    let ranked = rank(&target, &candidates, options)?;
    let hits = ranked
        .into_iter()
        .take(limit)
        .map(|r| SimilarSection {
            id: r.record.id,
            screen_id: r.record.source_screen_id,
            section: r.record.section,
            site_url: r.record.site_url.clone(),
            image_url: resolve(&r.record.image_url),
            score: r.combined_score,
            layout_score: r.layout_score,
            color_score: r.color_score,
        })
        .collect();

    metrics::observe_search_duration(target.section, start.elapsed().as_secs_f64());
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::db::{NewScreen, SqliteStore};

    fn record(id: i64, url: &str, layout: Vec<f32>, color: Vec<f32>) -> SectionRecord {
        SectionRecord {
            id: Some(id),
            source_screen_id: Some(id),
            section: SectionType::Footer,
            site_url: "a.com".into(),
            image_url: url.into(),
            layout_fingerprint: layout,
            color_fingerprint: color,
            layout_description: json!({}),
            related_ids: None,
        }
    }

    #[test]
    fn test_combine() {
        let options = SearchOptions { layout_weight: 0.8, color_weight: 0.2, ..Default::default() };
        assert!((options.combine(Some(1.), Some(0.5)) - 0.9).abs() < 1e-12);
        assert_eq!(options.combine(Some(0.3), None), 0.3);
        assert_eq!(options.combine(None, Some(0.7)), 0.7);
        assert_eq!(options.combine(None, None), 0.);
    }

    #[test]
    fn test_rank_both_modalities() {
        let target = record(1, "t.png", vec![1., 0.], vec![0.5, 0.5]);
        let candidates = vec![
            record(2, "a.png", vec![1., 0.], vec![1., 0.]),
            record(3, "b.png", vec![0., 1.], vec![0.5, 0.5]),
        ];
        let options = SearchOptions { layout_weight: 0.9, color_weight: 0.1, ..Default::default() };
        let ranked = rank(&target, &candidates, &options).unwrap();
        assert_eq!(ranked[0].record.id, Some(2));
        assert_eq!(ranked[1].layout_score, Some(0.));
        assert_eq!(ranked[1].color_score, Some(1.));
        assert!((ranked[1].combined_score - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_rank_dimension_mismatch() {
        let target = record(1, "t.png", vec![1., 0.], vec![1.]);
        let candidates = vec![record(2, "a.png", vec![1., 0., 0.], vec![1.])];
        let err = rank(&target, &candidates, &SearchOptions::layout_only()).unwrap_err();
        assert!(err.is_fatal());
        // 未启用的比较不检查维度
        assert!(rank(&target, &candidates, &SearchOptions::color_only()).is_ok());
    }

    /// 写入一条 footer 分析结果，返回记录 ID
    async fn seed(store: &SqliteStore, url: &str, layout: Vec<f32>, color: Vec<f32>) -> i64 {
        let screen = NewScreen {
            img_url: url.into(),
            site_url: "a.com".into(),
            section: SectionType::Footer,
            is_public: true,
            captured_at: None,
        };
        let screen_id = store.insert_screen(&screen).await.unwrap().unwrap();
        let mut record = record(0, url, layout, color);
        record.id = None;
        record.source_screen_id = Some(screen_id);
        store.insert(&record).await.unwrap()
    }

    #[tokio::test]
    async fn test_search_similar_resolves_top_hits() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("search.db")).await.unwrap();
        seed(&store, "s/0.png", vec![1., 0.], vec![1., 0.]).await;
        let far = seed(&store, "s/1.png", vec![0., 1.], vec![1., 0.]).await;
        let near = seed(&store, "s/2.png", vec![1., 0.1], vec![0., 1.]).await;
        let mid = seed(&store, "s/3.png", vec![1., 1.], vec![0., 1.]).await;

        let hits = search_similar(&store, "s/0.png", &SearchOptions::layout_only(), 2, |u| {
            format!("http://x/{u}")
        })
        .await
        .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![Some(near), Some(mid)]);
        assert_eq!(hits[0].image_url, "http://x/s/2.png");
        assert_eq!(hits[1].image_url, "http://x/s/3.png");
        assert!(hits.iter().all(|h| h.color_score.is_none()));
        assert!(hits.iter().all(|h| Some(h.score) == h.layout_score));
        assert!(hits[0].score > hits[1].score);
        assert!(hits.iter().all(|h| h.id != Some(far)));

        let hits = search_similar(&store, "s/0.png", &SearchOptions::default(), 10, str::to_owned)
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.image_url != "s/0.png"));
        assert!(hits.iter().all(|h| h.layout_score.is_some() && h.color_score.is_some()));

        let err = search_similar(&store, "s/9.png", &SearchOptions::default(), 10, str::to_owned)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_specific_ranker_reads_section_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("related.db")).await.unwrap();
        seed(&store, "s/0.png", vec![1., 0.], vec![1., 0.]).await;
        seed(&store, "s/1.png", vec![0.9, 0.1], vec![1., 0.]).await;

        let ranker = SpecificRanker::new(SearchOptions::layout_only());
        let target = store.get_by_image_url("s/0.png").await.unwrap().unwrap();
        assert_eq!(ranker.related(&store, &target, 5).await.unwrap().len(), 1);

        // 之后写入的记录不会出现在同一个实例的结果中
        seed(&store, "s/2.png", vec![1., 0.], vec![1., 0.]).await;
        let target = store.get_by_image_url("s/1.png").await.unwrap().unwrap();
        assert_eq!(ranker.related(&store, &target, 5).await.unwrap().len(), 1);

        let fresh = SpecificRanker::new(SearchOptions::layout_only());
        assert_eq!(fresh.related(&store, &target, 5).await.unwrap().len(), 2);
    }
}
