use std::sync::LazyLock;

use prometheus::*;
use tokio::task::spawn_blocking;

use crate::section::SectionType;

static METRIC_BATCH_ITEMS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "sectionlens_batch_items_total",
        "count of the processed screenshots",
        &["section", "status"]
    )
    .unwrap()
});

static METRIC_ANALYZE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "sectionlens_analyze_duration",
        "duration of the per-screenshot analysis in seconds",
        &["section"],
        vec![0.5, 1., 2., 4., 8., 15., 30., 60., 120.]
    )
    .unwrap()
});

static METRIC_RELATED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "sectionlens_related_total",
        "count of the related-section updates",
        &["section", "status"]
    )
    .unwrap()
});

static METRIC_SEARCH_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "sectionlens_search_duration",
        "duration of the per-section search in seconds",
        &["section"]
    )
    .unwrap()
});

/// 增加批处理结果计数
pub fn inc_batch_item(section: SectionType, status: &str) {
    METRIC_BATCH_ITEMS.with_label_values(&[section.label(), status]).inc();
}

pub fn observe_analyze_duration(section: SectionType, seconds: f64) {
    METRIC_ANALYZE_DURATION.with_label_values(&[section.label()]).observe(seconds);
}

pub fn inc_related(section: SectionType, status: &str) {
    METRIC_RELATED.with_label_values(&[section.label(), status]).inc();
}

pub fn observe_search_duration(section: SectionType, seconds: f64) {
    METRIC_SEARCH_DURATION.with_label_values(&[section.label()]).observe(seconds);
}

/// 推送当前指标到 Pushgateway
///
/// `auth` 格式为 `username:password`
pub async fn push(url: String, instance: String, auth: Option<String>) -> anyhow::Result<()> {
    let auth = match auth {
        Some(auth) => {
            let (username, password) = auth
                .split_once(':')
                .ok_or_else(|| anyhow::anyhow!("prometheus 认证信息格式应为 username:password"))?;
            Some(BasicAuthentication { username: username.to_owned(), password: password.to_owned() })
        }
        None => None,
    };

    let metric_families = prometheus::gather();
    spawn_blocking(move || {
        prometheus::push_metrics(
            "sectionlens",
            labels! {
                "instance".to_string() => instance,
            },
            &url,
            metric_families,
            auth,
        )
    })
    .await??;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_labelled_by_section() {
        let counter = |section: &str, status: &str| {
            METRIC_BATCH_ITEMS.with_label_values(&[section, status]).get()
        };
        let pricing = counter("pricing", "failed");
        let footer = counter("footer", "failed");
        let pricing_ok = counter("pricing", "succeeded");

        inc_batch_item(SectionType::Pricing, "failed");
        inc_batch_item(SectionType::Pricing, "failed");

        assert_eq!(counter("pricing", "failed") - pricing, 2);
        assert_eq!(counter("footer", "failed"), footer);
        assert_eq!(counter("pricing", "succeeded"), pricing_ok);
    }
}
