use std::sync::Arc;

use crate::db::SqliteStore;
use crate::provider::ImageStore;
use crate::ranker::SearchOptions;

/// 应用状态
pub struct AppState {
    /// 数据库
    pub store: SqliteStore,
    /// 截图存储，用于转换地址
    pub images: ImageStore,
    /// 默认搜索选项
    pub options: SearchOptions,
    /// 默认返回的结果数量
    pub limit: usize,
    /// 鉴权 token
    pub token: String,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(
        store: SqliteStore,
        images: ImageStore,
        options: SearchOptions,
        limit: usize,
        token: String,
    ) -> Arc<Self> {
        Arc::new(AppState { store, images, options, limit, token })
    }

    pub fn authorize(&self, token: &str) -> bool {
        !self.token.is_empty() && self.token == token
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_authorize() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("t.db")).await.unwrap();
        let images = ImageStore::new("/data/screens", Duration::from_secs(1)).unwrap();
        let state = AppState::new(store.clone(), images.clone(), SearchOptions::default(), 10, "secret".into());
        assert!(state.authorize("secret"));
        assert!(!state.authorize("wrong"));

        let state = AppState::new(store, images, SearchOptions::default(), 10, String::new());
        assert!(!state.authorize(""));
    }
}
