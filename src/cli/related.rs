use clap::{Parser, ValueEnum};
use indicatif::ProgressBar;

use crate::batch::BatchController;
use crate::cli::SubCommandExtend;
use crate::config::{Opts, SearchArgs};
use crate::db::SqliteStore;
use crate::ranker::{GeneralRanker, RelatedStrategy, SpecificRanker};
use crate::section::SectionType;
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct RelatedCommand {
    #[command(flatten)]
    pub search: SearchArgs,
    /// 计算方式
    #[arg(long, value_enum, default_value_t = RelatedMode::Specific)]
    pub mode: RelatedMode,
    /// 只处理一种区块，默认处理全部
    #[arg(short, long, value_enum)]
    pub section: Option<SectionType>,
    /// 每条记录保留的相关区块数量
    #[arg(short, long, value_name = "K", default_value_t = 5)]
    pub limit: usize,
    /// general 模式下的最低相似度
    #[arg(long, default_value_t = 0.5)]
    pub threshold: f64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelatedMode {
    /// 读取同类区块，综合布局和颜色在本地排序
    Specific,
    /// 只比较布局向量，交给数据库查询
    General,
}

impl RelatedCommand {
    fn strategy(&self) -> RelatedStrategy {
        match self.mode {
            RelatedMode::Specific => {
                RelatedStrategy::Specific(SpecificRanker::new((&self.search).into()))
            }
            RelatedMode::General => {
                RelatedStrategy::General(GeneralRanker { threshold: self.threshold })
            }
        }
    }
}

impl SubCommandExtend for RelatedCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let store = SqliteStore::open(opts.conf_dir.database()?).await?;
        let pb = ProgressBar::new(0).with_style(pb_style());
        let controller = BatchController::new(store, opts.conf_dir.catalog()?).with_progress(pb.clone());

        let report = controller.sweep_related(&self.strategy(), self.section, self.limit).await?;
        pb.finish_and_clear();

        println!("{report}");
        Ok(())
    }
}
