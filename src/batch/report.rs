use std::fmt;

use serde::Serialize;

/// 单张截图的处理结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Succeeded { record_id: i64 },
    Failed { reason: String },
    /// 处理期间已被其它任务写入
    Skipped,
}

impl ItemStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutcome {
    pub screen_id: i64,
    pub image_url: String,
    #[serde(flatten)]
    pub status: ItemStatus,
}

/// 一次批处理的统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// 取到的待处理截图数量
    pub found: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// 是否被中途停止
    pub interrupted: bool,
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchReport {
    pub fn push(&mut self, outcome: ItemOutcome) {
        match outcome.status {
            ItemStatus::Succeeded { .. } => self.succeeded += 1,
            ItemStatus::Failed { .. } => self.failed += 1,
            ItemStatus::Skipped => self.skipped += 1,
        }
        self.outcomes.push(outcome);
    }

    /// 没有找到任何待处理截图
    pub fn is_empty(&self) -> bool {
        self.found == 0
    }

    /// 有待处理截图但全部失败
    pub fn is_complete_failure(&self) -> bool {
        self.found > 0 && self.succeeded == 0 && self.failed > 0
    }

    /// 已进入终态的截图数量
    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| matches!(o.status, ItemStatus::Failed { .. }))
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "找到 {} 张，成功 {}，失败 {}，跳过 {}",
            self.found, self.succeeded, self.failed, self.skipped
        )?;
        if self.interrupted {
            write!(f, "（已中断，{} 张未处理）", self.found - self.processed())?;
        }
        Ok(())
    }
}

/// 一次相关区块计算的统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub found: usize,
    pub updated: usize,
    /// 没有找到相关区块，保持为空等待下次计算
    pub empty: usize,
    pub failed: usize,
    pub interrupted: bool,
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "找到 {} 条，更新 {}，无结果 {}，失败 {}",
            self.found, self.updated, self.empty, self.failed
        )?;
        if self.interrupted {
            f.write_str("（已中断）")?;
        }
        Ok(())
    }
}
