use std::path::Path;

use log::debug;
use serde_json::Value;

use super::{Database, SectionStore, crud, init_db, model::*};
use crate::error::{Error, Result};
use crate::ranker::RelatedSection;
use crate::section::{SectionRecord, SectionType, WorkItem};
use crate::similarity::cosine_similarity;

/// 基于 SQLite 的存储实现
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Database,
}

impl SqliteStore {
    /// 打开数据库，不存在时创建并执行迁移
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self { pool: init_db(path).await? })
    }

    pub fn from_pool(pool: Database) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Database {
        &self.pool
    }

    /// 添加原始截图，`img_url` 已存在时返回 None
    pub async fn insert_screen(&self, screen: &NewScreen) -> Result<Option<i64>> {
        Ok(crud::add_screen(&self.pool, screen).await?)
    }

    pub async fn stats(&self) -> Result<Vec<SectionStats>> {
        Ok(crud::get_stats(&self.pool).await?)
    }
}

fn into_records(rows: Vec<AnalysisRecord>) -> Result<Vec<SectionRecord>> {
    rows.into_iter().map(SectionRecord::try_from).collect()
}

impl SectionStore for SqliteStore {
    async fn list_unprocessed(
        &self,
        section: SectionType,
        limit: Option<usize>,
    ) -> Result<Vec<WorkItem>> {
        let limit = limit.map_or(-1, |n| n as i64);
        let rows = crud::get_unprocessed(&self.pool, section.label(), limit).await?;
        debug!("{section}: {} 张截图待分析", rows.len());
        Ok(rows.into_iter().map(|row| row.into_item(section)).collect())
    }

    async fn exists(&self, screen_id: i64) -> Result<bool> {
        Ok(crud::check_analysis(&self.pool, screen_id).await?)
    }

    async fn insert(&self, record: &SectionRecord) -> Result<i64> {
        let screen_id = record
            .source_screen_id
            .ok_or_else(|| Error::NotFound(format!("{} 的原始截图", record.image_url)))?;
        let id = crud::add_analysis(
            &self.pool,
            screen_id,
            record.section.label(),
            &record.site_url,
            &record.image_url,
            &encode_vector(&record.layout_fingerprint),
            &encode_vector(&record.color_fingerprint),
            &record.layout_description.to_string(),
        )
        .await?;
        Ok(id)
    }

    async fn update_related(&self, id: i64, related: &[RelatedSection]) -> Result<()> {
        let ids = Value::from(related.iter().map(|r| r.id).collect::<Vec<_>>());
        let scores = Value::from(related.iter().map(|r| r.score).collect::<Vec<_>>());
        let affected =
            crud::set_related(&self.pool, id, &ids.to_string(), &scores.to_string()).await?;
        if affected == 0 {
            return Err(Error::NotFound(format!("区块记录 {id}")));
        }
        Ok(())
    }

    async fn get_by_image_url(&self, image_url: &str) -> Result<Option<SectionRecord>> {
        crud::get_analysis_by_img_url(&self.pool, image_url)
            .await?
            .map(SectionRecord::try_from)
            .transpose()
    }

    async fn list_by_section(&self, section: SectionType) -> Result<Vec<SectionRecord>> {
        into_records(crud::get_analysis_by_section(&self.pool, section.label()).await?)
    }

    async fn list_missing_related(
        &self,
        section: Option<SectionType>,
    ) -> Result<Vec<SectionRecord>> {
        let section = section.map(SectionType::label);
        into_records(crud::get_analysis_missing_related(&self.pool, section).await?)
    }

    async fn match_embeddings(
        &self,
        query: &[f32],
        section: SectionType,
        threshold: f64,
        count: usize,
    ) -> Result<Vec<RelatedSection>> {
        // SQLite 没有向量索引，在内存中逐条计算
        let rows = crud::get_layout_embeddings(&self.pool, section.label()).await?;
        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let embedding = decode_vector(row.id, &row.layout_embedding)?;
            let score = cosine_similarity(query, &embedding)?;
            if score >= threshold {
                hits.push(RelatedSection { id: row.id, score });
            }
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(count);
        Ok(hits)
    }
}
