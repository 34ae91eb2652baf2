use opencv::core::{Mat, Vector};
use opencv::imgcodecs;
use opencv::imgproc;
use opencv::prelude::*;

use crate::error::{Error, Result};

/// 每个通道的 bin 数量
pub const HSV_BINS: [i32; 3] = [8, 8, 8];
/// 颜色指纹长度，8 * 8 * 8
pub const COLOR_FINGERPRINT_LEN: usize = 512;

// OpenCV 中 8 位图像的 H 取值范围为 [0, 180)
const HSV_RANGES: [f32; 6] = [0., 180., 0., 256., 0., 256.];

/// 从编码后的图片字节计算颜色指纹
pub fn color_fingerprint(bytes: &[u8]) -> Result<Vec<f32>> {
    let image = imdecode(bytes)?;
    color_fingerprint_mat(&image)
}

/// 解码图片，统一转换为 BGR 三通道
pub fn imdecode(bytes: &[u8]) -> Result<Mat> {
    if bytes.is_empty() {
        return Err(Error::Decode("图片内容为空".to_owned()));
    }
    let buf = Mat::from_slice(bytes)?;
    let image = imgcodecs::imdecode(&buf, imgcodecs::IMREAD_COLOR)?;
    if image.empty() {
        return Err(Error::Decode("无法识别的图片格式".to_owned()));
    }
    Ok(image)
}

/// 计算 BGR 图片的 HSV 直方图，L2 归一化后展平为 512 维
pub fn color_fingerprint_mat(image: &Mat) -> Result<Vec<f32>> {
    let mut hsv = Mat::default();
    imgproc::cvt_color_def(image, &mut hsv, imgproc::COLOR_BGR2HSV)?;

    let mut images = Vector::<Mat>::new();
    images.push(hsv);
    let channels = Vector::<i32>::from_slice(&[0, 1, 2]);
    let hist_size = Vector::<i32>::from_slice(&HSV_BINS);
    let ranges = Vector::<f32>::from_slice(&HSV_RANGES);

    let mut hist = Mat::default();
    imgproc::calc_hist(
        &images,
        &channels,
        &Mat::default(),
        &mut hist,
        &hist_size,
        &ranges,
        false,
    )?;

    let mut fingerprint = hist.data_typed::<f32>()?.to_vec();
    if fingerprint.len() != COLOR_FINGERPRINT_LEN {
        return Err(Error::DimensionMismatch {
            left: fingerprint.len(),
            right: COLOR_FINGERPRINT_LEN,
        });
    }
    l2_normalize(&mut fingerprint);
    Ok(fingerprint)
}

/// 原地 L2 归一化，全零向量保持不变
pub fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|&v| (v as f64).powi(2)).sum::<f64>().sqrt();
    if norm == 0. {
        return;
    }
    for v in values.iter_mut() {
        *v = (*v as f64 / norm) as f32;
    }
}
