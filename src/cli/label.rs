use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use indicatif::ProgressBar;
use log::{error, warn};

use crate::analyzer::SectionAnalyzer;
use crate::batch::{BatchController, BatchScope, ItemStatus};
use crate::cli::SubCommandExtend;
use crate::config::{Opts, PrometheusOptions, ProviderOptions};
use crate::db::SqliteStore;
use crate::metrics;
use crate::section::SectionType;
use crate::utils::{ItemLimit, pb_style};

#[derive(Parser, Debug, Clone)]
pub struct LabelCommand {
    #[command(flatten)]
    pub provider: ProviderOptions,
    #[command(flatten)]
    pub prometheus: PrometheusOptions,
    /// 只处理一种区块
    #[arg(short, long, value_enum, conflicts_with = "all", required_unless_present = "all")]
    pub section: Option<SectionType>,
    /// 依次处理所有区块
    #[arg(long)]
    pub all: bool,
    /// 本次最多处理的截图数量
    #[arg(short, long, value_name = "N|all", default_value = "5")]
    pub max_items: ItemLimit,
    /// 同时分析的截图数量
    #[arg(short, long, value_name = "N", default_value_t = 1)]
    pub jobs: usize,
}

impl LabelCommand {
    fn scope(&self) -> BatchScope {
        match self.section {
            Some(section) if !self.all => BatchScope::Section(section),
            _ => BatchScope::All,
        }
    }
}

/// 置位停止标志，已经置位过时返回 false
fn request_stop(stop: &AtomicBool) -> bool {
    !stop.swap(true, Ordering::SeqCst)
}

impl SubCommandExtend for LabelCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let store = SqliteStore::open(opts.conf_dir.database()?).await?;
        let catalog = opts.conf_dir.catalog()?;
        let analyzer = SectionAnalyzer::new(
            self.provider.vision()?,
            self.provider.embedder()?,
            opts.image_store(self.provider.timeout())?,
        );

        let pb = ProgressBar::new(0).with_style(pb_style());
        let controller = BatchController::new(store, catalog)
            .with_concurrency(self.jobs)
            .with_progress(pb.clone());

        let stop = controller.stop_handle();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !request_stop(&stop) {
                    warn!("再次收到中断信号，立即退出");
                    std::process::exit(130);
                }
                warn!("收到中断信号，当前截图处理完成后停止，再按一次 Ctrl-C 立即退出");
            }
        });

        let report = controller.run_batch(&analyzer, self.scope(), self.max_items.0).await?;
        pb.finish_and_clear();

        println!("{report}");
        for failure in report.failures() {
            if let ItemStatus::Failed { reason } = &failure.status {
                println!("✗ {}\t{}", failure.image_url, reason);
            }
        }

        if let Some(url) = self.prometheus.prometheus_push.clone() {
            let instance = self.prometheus.prometheus_instance.clone();
            if let Err(e) = metrics::push(url, instance, self.prometheus.prometheus_auth.clone()).await {
                error!("推送指标失败: {e}");
            }
        }

        Ok(())
    }
}
