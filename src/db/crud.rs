use sqlx::{Executor, Result, Sqlite};

use super::model::*;

/// 添加原始截图，已存在时返回 None
pub async fn add_screen<'c, E>(executor: E, screen: &NewScreen) -> Result<Option<i64>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO screen (img_url, site_url, section, is_public, captured_at)
        VALUES (?, ?, ?, ?, COALESCE(?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now')))
        ON CONFLICT (img_url) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&screen.img_url)
    .bind(&screen.site_url)
    .bind(screen.section.label())
    .bind(screen.is_public)
    .bind(screen.captured_at.as_deref())
    .fetch_optional(executor)
    .await?;

    Ok(id)
}

/// 获取未分析的公开截图，按截图时间从新到旧
///
/// `limit` 为负数时不限制数量
pub async fn get_unprocessed<'c, E>(executor: E, section: &str, limit: i64) -> Result<Vec<WorkRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, WorkRecord>(
        r#"
        SELECT s.id AS screen_id, s.site_url, s.img_url
        FROM screen s
        WHERE s.section = ? AND s.is_public = 1
          AND NOT EXISTS (SELECT 1 FROM section_analysis a WHERE a.screen_id = s.id)
        ORDER BY s.captured_at DESC, s.id DESC
        LIMIT ?
        "#,
    )
    .bind(section)
    .bind(limit)
    .fetch_all(executor)
    .await
}

/// 检查截图是否已有分析结果
pub async fn check_analysis<'c, E>(executor: E, screen_id: i64) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM section_analysis WHERE screen_id = ?
        "#,
    )
    .bind(screen_id)
    .fetch_one(executor)
    .await?;

    Ok(count > 0)
}

/// 添加分析结果
#[allow(clippy::too_many_arguments)]
pub async fn add_analysis<'c, E>(
    executor: E,
    screen_id: i64,
    section: &str,
    site_url: &str,
    img_url: &str,
    layout_embedding: &[u8],
    color_embedding: &[u8],
    layout_data: &str,
) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO section_analysis
            (screen_id, section, site_url, img_url, layout_embedding, color_embedding, layout_data)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(screen_id)
    .bind(section)
    .bind(site_url)
    .bind(img_url)
    .bind(layout_embedding)
    .bind(color_embedding)
    .bind(layout_data)
    .fetch_one(executor)
    .await
}

/// 更新相关区块，返回受影响的行数
pub async fn set_related<'c, E>(
    executor: E,
    id: i64,
    related_ids: &str,
    related_scores: &str,
) -> Result<u64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE section_analysis
        SET related_ids = ?, related_scores = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ?
        "#,
    )
    .bind(related_ids)
    .bind(related_scores)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

const ANALYSIS_COLUMNS: &str = "id, screen_id, section, site_url, img_url, layout_embedding, \
                                color_embedding, layout_data, related_ids";

pub async fn get_analysis_by_img_url<'c, E>(
    executor: E,
    img_url: &str,
) -> Result<Option<AnalysisRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let sql = format!("SELECT {ANALYSIS_COLUMNS} FROM section_analysis WHERE img_url = ?");
    sqlx::query_as::<_, AnalysisRecord>(&sql).bind(img_url).fetch_optional(executor).await
}

/// 获取一种区块的全部分析结果，按 ID 升序
pub async fn get_analysis_by_section<'c, E>(
    executor: E,
    section: &str,
) -> Result<Vec<AnalysisRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {ANALYSIS_COLUMNS} FROM section_analysis WHERE section = ? ORDER BY id ASC"
    );
    sqlx::query_as::<_, AnalysisRecord>(&sql).bind(section).fetch_all(executor).await
}

/// 获取尚未计算相关区块的分析结果，`section` 为空时不限制类型
pub async fn get_analysis_missing_related<'c, E>(
    executor: E,
    section: Option<&str>,
) -> Result<Vec<AnalysisRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {ANALYSIS_COLUMNS} FROM section_analysis \
         WHERE related_ids IS NULL AND (?1 IS NULL OR section = ?1) ORDER BY id ASC"
    );
    sqlx::query_as::<_, AnalysisRecord>(&sql).bind(section).fetch_all(executor).await
}

/// 获取一种区块的布局向量
pub async fn get_layout_embeddings<'c, E>(
    executor: E,
    section: &str,
) -> Result<Vec<EmbeddingRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, EmbeddingRecord>(
        r#"
        SELECT id, layout_embedding FROM section_analysis WHERE section = ? ORDER BY id ASC
        "#,
    )
    .bind(section)
    .fetch_all(executor)
    .await
}

/// 按区块类型统计截图和分析数量
pub async fn get_stats<'c, E>(executor: E) -> Result<Vec<SectionStats>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, SectionStats>(
        r#"
        SELECT
            s.section AS section,
            COUNT(*) AS screens,
            COALESCE(SUM(s.is_public), 0) AS public,
            COUNT(a.id) AS analyzed,
            COUNT(a.related_ids) AS related
        FROM screen s
        LEFT JOIN section_analysis a ON a.screen_id = s.id
        GROUP BY s.section
        ORDER BY s.section
        "#,
    )
    .fetch_all(executor)
    .await
}
