use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;
use crate::provider::{GeminiVision, ImageStore, OpenAiEmbedder};
use crate::ranker::SearchOptions;
use crate::section::SectionCatalog;

static CONF_DIR: LazyLock<String> = LazyLock::new(|| {
    ProjectDirs::from("", "", "sectionlens")
        .map(|dirs| dirs.config_dir().to_string_lossy().into_owned())
        .unwrap_or_else(|| ".sectionlens".to_owned())
});

fn default_config_dir() -> &'static str {
    CONF_DIR.as_str()
}

#[derive(Parser, Debug, Clone)]
#[command(name = "sectionlens", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 配置目录，包含数据库和自定义提示词
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
    /// 截图存储地址，不以 http(s):// 开头时视为本地目录
    #[arg(
        long,
        env = "SECTIONLENS_STORAGE_URL",
        default_value = "http://127.0.0.1:54321/storage/v1/object/public/screens"
    )]
    pub storage_url: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 导入待分析的原始截图
    Import(ImportCommand),
    /// 分析尚未处理的截图
    Label(LabelCommand),
    /// 为缺少相关区块的记录计算相关区块
    Related(RelatedCommand),
    /// 搜索与指定截图相似的区块
    Search(SearchCommand),
    /// 显示每种区块的处理进度
    Show(ShowCommand),
    /// 启动 HTTP 搜索服务
    Server(ServerCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径，同时确保目录存在
    pub fn database(&self) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.path)?;
        Ok(self.path.join("sectionlens.db"))
    }

    /// 返回自定义提示词目录
    pub fn prompts(&self) -> PathBuf {
        self.path.join("prompts")
    }

    /// 内置提示词，再用配置目录中的文件覆盖
    pub fn catalog(&self) -> std::io::Result<SectionCatalog> {
        SectionCatalog::load(self.prompts())
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

impl Opts {
    pub fn image_store(&self, timeout: Duration) -> crate::Result<ImageStore> {
        ImageStore::new(&self.storage_url, timeout)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ProviderOptions {
    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, default_value = "")]
    pub gemini_api_key: String,
    /// 视觉分析使用的 Gemini 模型
    #[arg(long, default_value = "gemini-2.0-flash-exp")]
    pub gemini_model: String,
    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, default_value = "")]
    pub openai_api_key: String,
    /// OpenAI 兼容接口地址
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,
    /// 布局向量使用的 embedding 模型
    #[arg(long, default_value = "text-embedding-3-small")]
    pub embedding_model: String,
    /// 布局向量维度，为 0 时使用模型默认值
    #[arg(long, value_name = "N", default_value_t = 1536)]
    pub embedding_dimensions: usize,
    /// 单次请求超时，单位为秒
    #[arg(long, value_name = "SECS", default_value_t = 120)]
    pub request_timeout: u64,
    /// embedding 请求最多尝试次数
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub max_retries: usize,
}

impl ProviderOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn vision(&self) -> anyhow::Result<GeminiVision> {
        GeminiVision::new(self.gemini_api_key.clone(), self.gemini_model.clone(), self.timeout())
    }

    pub fn embedder(&self) -> anyhow::Result<OpenAiEmbedder> {
        let dimensions = (self.embedding_dimensions > 0).then_some(self.embedding_dimensions);
        OpenAiEmbedder::new(
            self.openai_api_key.clone(),
            self.openai_base_url.clone(),
            self.embedding_model.clone(),
            dimensions,
            self.timeout(),
            self.max_retries,
        )
    }
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// 不比较布局向量
    #[arg(long)]
    pub no_layout: bool,
    /// 不比较颜色直方图
    #[arg(long)]
    pub no_color: bool,
    /// 布局权重，只在两种比较都启用时生效
    #[arg(long, value_name = "W", default_value_t = 0.7)]
    pub weight_layout: f64,
    /// 颜色权重，只在两种比较都启用时生效
    #[arg(long, value_name = "W", default_value_t = 0.3)]
    pub weight_color: f64,
}

impl From<&SearchArgs> for SearchOptions {
    fn from(args: &SearchArgs) -> Self {
        Self {
            include_layout: !args.no_layout,
            include_color: !args.no_color,
            layout_weight: args.weight_layout,
            color_weight: args.weight_color,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PrometheusOptions {
    /// prometheus 主动推送地址
    #[arg(long, value_name = "URL")]
    pub prometheus_push: Option<String>,
    /// 自定义 instance 标签值
    #[arg(long, value_name = "NAME", default_value = "sectionlens")]
    pub prometheus_instance: String,
    /// prometheus 认证信息，格式为 username:password
    #[arg(long, value_name = "AUTH")]
    pub prometheus_auth: Option<String>,
}
