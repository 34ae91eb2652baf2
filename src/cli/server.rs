use std::time::Duration;

use clap::Parser;
use log::{error, info};
use rand::distr::{Alphanumeric, SampleString};
use tokio::net::TcpListener;
use tokio::time::sleep;

use crate::cli::SubCommandExtend;
use crate::config::{PrometheusOptions, SearchArgs};
use crate::db::SqliteStore;
use crate::{Opts, metrics, server};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub search: SearchArgs,
    #[command(flatten)]
    pub prometheus: PrometheusOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
    /// 请求验证 token，不填则随机生成
    #[arg(long, env = "SECTIONLENS_TOKEN", hide_env_values = true, default_value_t = String::new())]
    pub token: String,
    /// 默认返回的结果数量
    #[arg(long, value_name = "COUNT", default_value_t = 5)]
    pub limit: usize,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let store = SqliteStore::open(opts.conf_dir.database()?).await?;
        let images = opts.image_store(Duration::from_secs(30))?;

        let mut token = self.token.clone();
        if token.is_empty() {
            token = Alphanumeric.sample_string(&mut rand::rng(), 32);
            info!("鉴权 token: {}", token);
        }

        // 创建应用状态
        let state = server::AppState::new(store, images, (&self.search).into(), self.limit, token);

        // 创建应用
        let app = server::create_app(state);

        if let Some(url) = self.prometheus.prometheus_push.clone() {
            let instance = self.prometheus.prometheus_instance.clone();
            let auth = self.prometheus.prometheus_auth.clone();
            tokio::spawn(async move {
                loop {
                    if let Err(e) = metrics::push(url.clone(), instance.clone(), auth.clone()).await {
                        error!("推送指标失败: {e}");
                    }
                    sleep(Duration::from_secs(30)).await;
                }
            });
        }

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
