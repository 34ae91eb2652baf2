use crate::error::{Error, Result};

/// 卡方距离分母中的平滑项，避免空 bin 除零
pub const CHI_SQUARE_EPSILON: f64 = 1e-10;

fn check_dimension(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch { left: a.len(), right: b.len() });
    }
    Ok(())
}

/// 余弦相似度，任一向量模长为零时返回 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    check_dimension(a, b)?;

    let (mut dot, mut norm_a, mut norm_b) = (0f64, 0f64, 0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0. || norm_b == 0. {
        return Ok(0.);
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// 两个直方图的卡方距离 `Σ (a-b)² / (a+b+ε)`
pub fn chi_square_distance(a: &[f32], b: &[f32]) -> Result<f64> {
    check_dimension(a, b)?;

    Ok(a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let (x, y) = (x as f64, y as f64);
            (x - y).powi(2) / (x + y + CHI_SQUARE_EPSILON)
        })
        .sum())
}

/// 直方图相似度：卡方距离经过高斯核映射到 (0, 1]，相同直方图为 1
pub fn histogram_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    let distance = chi_square_distance(a, b)?;
    Ok((-distance / 2.).exp())
}
