use anyhow::{anyhow, Result};
use image::RgbImage;
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::close;

use crate::config::DetectorArgs;
use crate::models::{Detection, Roi};
use crate::my_utils::image::{binarize, find_external_contours, foreground_is_bright};
use crate::my_utils::math::{bounding_rect, polygon_area};

/// 外部检测能力：在整图里找瓶子所在的区域
/// 引擎只负责挑置信度最高的那个
pub trait BottleDetector: Send + Sync {
    fn detect(&self, img: &RgbImage) -> Result<Vec<Detection>>;
    fn is_available(&self) -> bool {
        true
    }
    fn device(&self) -> &str;
    /// 写到返回结果的 detection_method 里
    fn method(&self) -> &str;
}

/// 传统方法的检测器：整图前景分割，按填充率和竖直比例打分
pub struct SilhouetteDetector {
    min_area_ratio: f64,
    blur_sigma: f32,
    device: String,
}

impl SilhouetteDetector {
    pub fn new(args: &DetectorArgs) -> Self {
        Self {
            min_area_ratio: args.min_area_ratio,
            blur_sigma: 1.5,
            device: args.device.clone(),
        }
    }
}

/// 瓶子一般是竖着的，高宽比 1.5~4 最像
fn proportion_score(upright_ratio: f64) -> f64 {
    if (1.5..=4.0).contains(&upright_ratio) {
        1.0
    } else if upright_ratio < 1.5 {
        (upright_ratio / 1.5).max(0.0)
    } else {
        (1.0 - (upright_ratio - 4.0) / 4.0).max(0.0)
    }
}

impl BottleDetector for SilhouetteDetector {
    fn detect(&self, img: &RgbImage) -> Result<Vec<Detection>> {
        let (width, height) = img.dimensions();
        if width < 3 || height < 3 {
            return Err(anyhow!("image too small for detection: {width}x{height}"));
        }
        let gray = image::imageops::grayscale(img);
        let blurred = gaussian_blur_f32(&gray, self.blur_sigma);
        let level = otsu_level(&blurred);
        let bright = foreground_is_bright(&blurred, level);
        let mask = close(&binarize(&blurred, level, bright), Norm::LInf, 2);

        let image_area = (width as f64) * (height as f64);
        let mut detections = Vec::new();
        for points in find_external_contours(&mask) {
            let area = polygon_area(&points);
            if area < self.min_area_ratio * image_area {
                continue;
            }
            let rect = bounding_rect(&points);
            // 铺满整张图的多半是背景没分开
            if rect.w as u32 >= width && rect.h as u32 >= height {
                continue;
            }
            let fill = area / (rect.w as f64 * rect.h as f64);
            let fill_score = (fill / 0.6).min(1.0);
            let confidence = 0.5 * fill_score + 0.5 * proportion_score(rect.h as f64 / rect.w as f64);
            detections.push(Detection {
                bbox: Roi::new(rect.x, rect.y, rect.x + rect.w, rect.y + rect.h),
                confidence: confidence.clamp(0.0, 1.0) as f32,
            });
        }
        log::debug!("silhouette detector found {} candidates", detections.len());
        Ok(detections)
    }

    fn device(&self) -> &str {
        &self.device
    }

    fn method(&self) -> &str {
        "Silhouette + Contour"
    }
}
