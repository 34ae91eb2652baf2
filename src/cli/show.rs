use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::db::SqliteStore;

#[derive(Parser, Debug, Clone)]
pub struct ShowCommand {}

impl SubCommandExtend for ShowCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let store = SqliteStore::open(opts.conf_dir.database()?).await?;
        let stats = store.stats().await?;

        println!("{:<18}{:>10}{:>10}{:>10}{:>10}", "section", "screens", "analyzed", "pending", "related");
        for row in &stats {
            println!(
                "{:<18}{:>10}{:>10}{:>10}{:>10}",
                row.section,
                row.screens,
                row.analyzed,
                row.pending(),
                row.related
            );
        }
        let total = |f: fn(&crate::db::SectionStats) -> i64| stats.iter().map(f).sum::<i64>();
        println!(
            "{:<18}{:>10}{:>10}{:>10}{:>10}",
            "total",
            total(|r| r.screens),
            total(|r| r.analyzed),
            total(|r| r.pending()),
            total(|r| r.related)
        );
        Ok(())
    }
}
