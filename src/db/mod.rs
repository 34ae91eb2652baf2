use std::future::Future;
use std::path::Path;

use log::info;
use sqlx::{SqlitePool, sqlite::*};

pub mod crud;
pub mod model;
mod store;

pub use model::*;
pub use store::SqliteStore;

use crate::error::Result;
use crate::ranker::RelatedSection;
use crate::section::{SectionRecord, SectionType, WorkItem};

pub type Database = SqlitePool;

pub async fn init_db(filename: impl AsRef<Path>) -> std::result::Result<Database, sqlx::Error> {
    let filename = filename.as_ref();
    info!("初始化数据库连接: {}", filename.display());

    let options = SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .filename(filename)
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;

    info!("检查数据库迁移");
    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}

/// 区块分析结果的持久化存储
///
/// 每个操作都是单条记录上的原子读写
pub trait SectionStore: Send + Sync {
    /// 获取某类区块中尚未分析的截图，按存储定义的顺序返回
    fn list_unprocessed(
        &self,
        section: SectionType,
        limit: Option<usize>,
    ) -> impl Future<Output = Result<Vec<WorkItem>>> + Send;

    /// 截图是否已有分析结果
    fn exists(&self, screen_id: i64) -> impl Future<Output = Result<bool>> + Send;

    /// 写入完整的分析结果，返回新记录的 ID
    fn insert(&self, record: &SectionRecord) -> impl Future<Output = Result<i64>> + Send;

    /// 覆盖记录的相关区块列表
    fn update_related(
        &self,
        id: i64,
        related: &[RelatedSection],
    ) -> impl Future<Output = Result<()>> + Send;

    /// 根据存储中的相对路径查找记录
    fn get_by_image_url(
        &self,
        image_url: &str,
    ) -> impl Future<Output = Result<Option<SectionRecord>>> + Send;

    fn list_by_section(
        &self,
        section: SectionType,
    ) -> impl Future<Output = Result<Vec<SectionRecord>>> + Send;

    /// 尚未计算相关区块的记录
    fn list_missing_related(
        &self,
        section: Option<SectionType>,
    ) -> impl Future<Output = Result<Vec<SectionRecord>>> + Send;

    /// 在同类区块中按布局向量余弦相似度查询，只返回不低于阈值的结果
    fn match_embeddings(
        &self,
        query: &[f32],
        section: SectionType,
        threshold: f64,
        count: usize,
    ) -> impl Future<Output = Result<Vec<RelatedSection>>> + Send;
}
