use std::fmt;
use std::str::FromStr;

use indicatif::ProgressStyle;

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
        .expect("failed to build progress style")
        .progress_chars("#>-")
}

/// 数量限制，`all` 表示不限制
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemLimit(pub Option<usize>);

impl FromStr for ItemLimit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            s if s.eq_ignore_ascii_case("all") => Ok(Self(None)),
            s => s.parse::<usize>().map(|n| Self(Some(n))).map_err(|e| format!("无效的数量 {s}: {e}")),
        }
    }
}

impl fmt::Display for ItemLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(n) => write!(f, "{n}"),
            None => f.write_str("all"),
        }
    }
}
