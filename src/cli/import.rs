use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::{debug, info};

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::db::{NewScreen, SqliteStore};

#[derive(Parser, Debug, Clone)]
pub struct ImportCommand {
    /// 截图清单，每行一个 JSON 对象
    /// 例：{"img_url": "a.com/footer.webp", "site_url": "a.com", "section": "footer"}
    #[arg(verbatim_doc_comment)]
    pub manifest: PathBuf,
}

impl SubCommandExtend for ImportCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let content = tokio::fs::read_to_string(&self.manifest)
            .await
            .with_context(|| format!("无法读取清单 {}", self.manifest.display()))?;

        let screens = parse_manifest(&content)?;
        let store = SqliteStore::open(opts.conf_dir.database()?).await?;

        let (mut added, mut skipped) = (0, 0);
        for screen in &screens {
            match store.insert_screen(screen).await? {
                Some(id) => {
                    debug!("添加截图 {} -> {}", screen.img_url, id);
                    added += 1;
                }
                None => skipped += 1,
            }
        }

        info!("导入完成：新增 {added}，跳过 {skipped}");
        println!("新增 {added}，跳过 {skipped}");
        Ok(())
    }
}

/// 解析清单，忽略空行
fn parse_manifest(content: &str) -> anyhow::Result<Vec<NewScreen>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("清单第 {} 行无法解析", n + 1))
        })
        .collect()
}
