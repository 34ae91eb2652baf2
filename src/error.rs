use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// 外部服务（视觉分析、文本向量）返回的通用错误
#[derive(Error, Debug)]
#[error("{provider}: {message}")]
pub struct ProviderError {
    pub provider: &'static str,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: &'static str, message: impl Into<String>) -> Self {
        Self { provider, message: message.into() }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("获取图片失败 {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("图片解码失败: {0}")]
    Decode(String),

    #[error("布局分析失败: {0}")]
    Analysis(#[source] ProviderError),

    #[error("布局向量生成失败: {0}")]
    Embedding(#[source] ProviderError),

    #[error("向量维度不一致: {left} != {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("数据库错误: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("记录 {id} 已损坏: {reason}")]
    CorruptRecord { id: i64, reason: String },

    #[error("未找到记录: {0}")]
    NotFound(String),

    #[error("未知的区块类型: {0}")]
    UnknownSection(String),
}

impl Error {
    /// 维度不一致意味着库中数据损坏或版本不匹配，不应被批处理吞掉
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. })
    }
}

impl From<opencv::Error> for Error {
    fn from(err: opencv::Error) -> Self {
        Self::Decode(err.message)
    }
}
