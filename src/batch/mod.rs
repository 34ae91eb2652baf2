use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures::{StreamExt, future, stream};
use indicatif::ProgressBar;
use log::{error, info, warn};

mod report;

pub use report::*;

use crate::analyzer::SectionAnalyzer;
use crate::db::SectionStore;
use crate::error::Result;
use crate::metrics;
use crate::provider::{EmbeddingProvider, ImageSource, VisionProvider};
use crate::ranker::{Ranker, RelatedSection};
use crate::section::{SectionCatalog, SectionProfile, SectionRecord, SectionType, WorkItem};

/// 批处理范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchScope {
    Section(SectionType),
    /// 按目录顺序处理所有区块类型
    All,
}

/// 驱动分析和相关区块计算，单张截图失败不会中断整批任务
pub struct BatchController<S> {
    store: S,
    catalog: SectionCatalog,
    concurrency: usize,
    stop: Arc<AtomicBool>,
    pb: ProgressBar,
}

impl<S: SectionStore> BatchController<S> {
    pub fn new(store: S, catalog: SectionCatalog) -> Self {
        Self {
            store,
            catalog,
            concurrency: 1,
            stop: Arc::new(AtomicBool::new(false)),
            pb: ProgressBar::hidden(),
        }
    }

    /// 同时分析的截图数量，写入仍按取出顺序进行
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    /// 置位后在当前截图处理完成时停止
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// 分析尚未处理的截图并写入存储
    ///
    /// # Arguments
    ///
    /// * `scope` - 单个区块类型或全部类型
    /// * `max_items` - 整次运行最多取出的截图数量
    pub async fn run_batch<V, E, I>(
        &self,
        analyzer: &SectionAnalyzer<V, E, I>,
        scope: BatchScope,
        max_items: Option<usize>,
    ) -> Result<BatchReport>
    where
        V: VisionProvider,
        E: EmbeddingProvider,
        I: ImageSource,
    {
        let sections: Vec<SectionType> = match scope {
            BatchScope::Section(section) => vec![self.catalog.profile(section)?.section],
            BatchScope::All => self.catalog.sections().collect(),
        };

        let mut report = BatchReport::default();
        let mut budget = max_items;

        for section in sections {
            if budget == Some(0) || self.stopped() {
                break;
            }
            let profile = self.catalog.profile(section)?;
            let items = self.store.list_unprocessed(section, budget).await?;
            if items.is_empty() {
                info!("{section}: 没有待分析的截图");
                continue;
            }

            info!("{section}: 找到 {} 张待分析截图", items.len());
            report.found += items.len();
            if let Some(budget) = budget.as_mut() {
                *budget = budget.saturating_sub(items.len());
            }
            self.pb.inc_length(items.len() as u64);

            self.process_section(analyzer, profile, items, &mut report).await?;
        }

        report.interrupted = self.stopped() && report.processed() < report.found;

        if report.is_empty() {
            info!("没有找到待分析的截图");
        } else if report.is_complete_failure() {
            warn!("批处理完成，但全部失败: {report}");
        } else {
            info!("批处理完成: {report}");
        }

        Ok(report)
    }

    async fn process_section<V, E, I>(
        &self,
        analyzer: &SectionAnalyzer<V, E, I>,
        profile: &SectionProfile,
        items: Vec<WorkItem>,
        report: &mut BatchReport,
    ) -> Result<()>
    where
        V: VisionProvider,
        E: EmbeddingProvider,
        I: ImageSource,
    {
        let stop = &self.stop;
        let mut results = stream::iter(items)
            .take_while(|_| future::ready(!stop.load(Ordering::SeqCst)))
            .map(|item| async move {
                let start = Instant::now();
                let result = analyzer.analyze(&item.image_url, &item.site_url, profile).await;
                (item, result, start.elapsed())
            })
            .buffered(self.concurrency);

        while let Some((item, result, elapsed)) = results.next().await {
            let status = match result {
                Ok(record) => self.persist(&item, record).await,
                Err(e) => Err(e),
            };

            let status = match status {
                Ok(Some(record_id)) => {
                    info!("✓ [{}] {} -> {}", item.section, item.image_url, record_id);
                    ItemStatus::Succeeded { record_id }
                }
                Ok(None) => {
                    info!("- [{}] {} 已存在，跳过", item.section, item.image_url);
                    ItemStatus::Skipped
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!("✗ [{}] {} (screen {}): {}", item.section, item.image_url, item.screen_id, e);
                    ItemStatus::Failed { reason: e.to_string() }
                }
            };

            metrics::inc_batch_item(item.section, status.label());
            metrics::observe_analyze_duration(item.section, elapsed.as_secs_f64());
            self.pb.inc(1);
            self.pb.set_message(format!("{}/{}", report.processed() + 1, report.found));

            report.push(ItemOutcome { screen_id: item.screen_id, image_url: item.image_url, status });
        }

        Ok(())
    }

    /// 写入前再次检查，保证每张截图只写入一次
    async fn persist(&self, item: &WorkItem, mut record: SectionRecord) -> Result<Option<i64>> {
        if self.store.exists(item.screen_id).await? {
            return Ok(None);
        }
        record.source_screen_id = Some(item.screen_id);
        self.store.insert(&record).await.map(Some)
    }

    /// 为缺少相关区块的记录计算并写入相关区块
    ///
    /// 单条记录失败只记录日志，没有结果的记录保持为空
    pub async fn sweep_related<R: Ranker>(
        &self,
        ranker: &R,
        section: Option<SectionType>,
        top_k: usize,
    ) -> Result<SweepReport> {
        let records = self.store.list_missing_related(section).await?;
        let mut report = SweepReport { found: records.len(), ..Default::default() };
        if records.is_empty() {
            info!("没有需要计算相关区块的记录");
            return Ok(report);
        }
        info!("找到 {} 条需要计算相关区块的记录", records.len());
        self.pb.inc_length(records.len() as u64);

        for record in &records {
            if self.stopped() {
                report.interrupted = true;
                break;
            }
            let Some(id) = record.id else {
                continue;
            };

            let status = match self.link(ranker, id, record, top_k).await {
                Ok(related) if related.is_empty() => {
                    warn!("- [{}] {} 没有相关区块", record.section, record.image_url);
                    report.empty += 1;
                    "empty"
                }
                Ok(related) => {
                    info!("✓ [{}] {} -> {:?}", record.section, record.image_url, related);
                    report.updated += 1;
                    "updated"
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!("✗ [{}] {} (id {}): {}", record.section, record.image_url, id, e);
                    report.failed += 1;
                    "failed"
                }
            };
            metrics::inc_related(record.section, status);
            self.pb.inc(1);
        }

        info!("相关区块计算完成: {report}");
        Ok(report)
    }

    async fn link<R: Ranker>(
        &self,
        ranker: &R,
        id: i64,
        record: &SectionRecord,
        top_k: usize,
    ) -> Result<Vec<i64>> {
        let related: Vec<RelatedSection> = ranker.related(&self.store, record, top_k).await?;
        if !related.is_empty() {
            self.store.update_related(id, &related).await?;
        }
        Ok(related.into_iter().map(|r| r.id).collect())
    }
}
