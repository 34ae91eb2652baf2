use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use crate::cli::SubCommandExtend;
use crate::config::{Opts, SearchArgs};
use crate::db::SqliteStore;
use crate::ranker::{SimilarSection, search_similar};

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub search: SearchArgs,
    /// 已分析截图的地址，可以是存储中的相对路径或完整地址
    pub image: String,
    /// 显示的结果数量
    #[arg(short, long, value_name = "COUNT", default_value_t = 5)]
    pub limit: usize,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let store = SqliteStore::open(opts.conf_dir.database()?).await?;
        let images = opts.image_store(Duration::from_secs(30))?;

        let image_url = images.relativize(&self.image);
        let options = (&self.search).into();
        let result =
            search_similar(&store, &image_url, &options, self.limit, |url| images.resolve(url))
                .await?;

        print_result(&result, self.output_format)
    }
}

fn print_result(result: &[SimilarSection], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for hit in result {
                println!(
                    "{:.4}\t{}\t{}\t{}",
                    hit.score,
                    fmt_score(hit.layout_score),
                    fmt_score(hit.color_score),
                    hit.image_url
                );
            }
        }
    }
    Ok(())
}

fn fmt_score(score: Option<f64>) -> String {
    score.map_or_else(|| "-".to_owned(), |s| format!("{s:.4}"))
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}
