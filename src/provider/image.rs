use std::path::PathBuf;
use std::time::Duration;

use log::debug;
use reqwest::Client;

use super::ImageSource;
use crate::error::{Error, Result};

/// 截图存储位置：HTTP 对象存储或本地目录
///
/// 数据库中只保存相对路径，只有在读取图片和展示结果时才拼接为完整地址
#[derive(Debug, Clone)]
pub enum ImageStore {
    Http { base: String, client: Client },
    Local { root: PathBuf },
}

impl ImageStore {
    /// `http://` 或 `https://` 开头视为对象存储，否则视为本地目录
    pub fn new(location: &str, timeout: Duration) -> Result<Self> {
        let location = location.trim();
        if location.starts_with("http://") || location.starts_with("https://") {
            let client = Client::builder().timeout(timeout).build().map_err(|e| Error::Fetch {
                url: location.to_owned(),
                reason: format!("无法创建 HTTP 客户端: {e}"),
            })?;
            Ok(Self::Http { base: location.trim_end_matches('/').to_owned(), client })
        } else {
            Ok(Self::Local { root: PathBuf::from(location) })
        }
    }

    pub fn base(&self) -> String {
        match self {
            Self::Http { base, .. } => base.clone(),
            Self::Local { root } => root.to_string_lossy().trim_end_matches('/').to_owned(),
        }
    }

    /// 把相对路径转换为完整地址
    pub fn resolve(&self, image_url: &str) -> String {
        if is_absolute(image_url) {
            return image_url.to_owned();
        }
        format!("{}/{}", self.base(), image_url.trim_start_matches('/'))
    }

    /// 把完整地址还原为数据库中的相对路径
    pub fn relativize(&self, image_url: &str) -> String {
        let base = self.base();
        match image_url.strip_prefix(&base) {
            Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/').to_owned(),
            _ => image_url.to_owned(),
        }
    }
}

fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl ImageSource for ImageStore {
    async fn fetch(&self, image_url: &str) -> Result<Vec<u8>> {
        let url = self.resolve(image_url);
        debug!("读取图片: {url}");
        let fetch_err = |reason: String| Error::Fetch { url: url.clone(), reason };
        match self {
            Self::Http { client, .. } => {
                let resp = client.get(&url).send().await.map_err(|e| fetch_err(e.to_string()))?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(fetch_err(format!("HTTP {status}")));
                }
                let bytes = resp.bytes().await.map_err(|e| fetch_err(e.to_string()))?;
                Ok(bytes.to_vec())
            }
            Self::Local { .. } => {
                tokio::fs::read(&url).await.map_err(|e| fetch_err(e.to_string()))
            }
        }
    }
}
