use std::f64::consts::PI;

use image::RgbImage;
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::convex_hull;
use imageproc::morphology::open;

use crate::config::{ReferenceArgs, ScaleArgs, ScaleMode};
use crate::error::AnalysisError;
use crate::models::measurement::{PixelDimensions, ReferenceObject, RealDimensions, ScaleMethod};
use crate::models::Roi;
use crate::my_utils::image::{binarize, find_external_contours};
use crate::my_utils::math::{bounding_rect, polygon_area};
use crate::recognition::engine::Engine;

pub trait ScaleInference {
    /// 像素尺寸换算成厘米，按配置选参照物标定或者经验比例
    fn infer_real_dimensions(
        &self,
        img: &RgbImage,
        roi: &Roi,
        pixel: &PixelDimensions,
    ) -> Result<(RealDimensions, Option<ReferenceObject>), AnalysisError>;
}

impl ScaleInference for Engine {
    fn infer_real_dimensions(
        &self,
        img: &RgbImage,
        roi: &Roi,
        pixel: &PixelDimensions,
    ) -> Result<(RealDimensions, Option<ReferenceObject>), AnalysisError> {
        let args = &self.config().scale;
        let reference = match args.mode {
            ScaleMode::Context => None,
            ScaleMode::Reference | ScaleMode::Auto => self.reference_locator().locate(img, roi),
        };
        match (args.mode, reference) {
            (ScaleMode::Reference, None) => Err(AnalysisError::ReferenceNotFound),
            (_, Some(reference)) => {
                log::info!("reference object found, ppm {:.2}", reference.ppm);
                Ok((estimate_from_reference(pixel, &reference, args)?, Some(reference)))
            }
            (_, None) => Ok((estimate_from_context(pixel, args)?, None)),
        }
    }
}

/// 没有参照物时按常见瓶子比例猜比例尺
/// 高瘦的按20cm高算，否则按7cm直径算，只是经验值
pub fn estimate_from_context(pixel: &PixelDimensions, args: &ScaleArgs) -> Result<RealDimensions, AnalysisError> {
    let raw_scale = if pixel.aspect_ratio > args.tall_aspect_ratio {
        pixel.estimated_height_px / args.typical_height_cm
    } else {
        pixel.estimated_diameter_px / args.typical_diameter_cm
    };
    if !raw_scale.is_finite() {
        return Err(AnalysisError::ScaleEstimation(format!("invalid scale {raw_scale}")));
    }
    let scale = args.scale_range.clamp(raw_scale);

    let height_cm = pixel.estimated_height_px / scale;
    let diameter_cm = pixel.estimated_diameter_px / scale;
    let volume_ml = pixel.volume_px3 / scale.powi(3);

    log::debug!(
        "context scale {:.2} px/cm (raw {:.2}): height {:.1}cm diameter {:.1}cm volume {:.0}mL",
        scale,
        raw_scale,
        height_cm,
        diameter_cm,
        volume_ml
    );
    RealDimensions::new(
        height_cm,
        diameter_cm,
        volume_ml,
        scale,
        pixel.measurement_confidence,
        ScaleMethod::Context,
        args,
    )
}

/// 参照物标定的比例尺，体积直接用圆柱公式，不再乘形状系数
pub fn estimate_from_reference(
    pixel: &PixelDimensions,
    reference: &ReferenceObject,
    args: &ScaleArgs,
) -> Result<RealDimensions, AnalysisError> {
    if !(reference.ppm.is_finite() && reference.ppm > 0.0) {
        return Err(AnalysisError::ScaleEstimation(format!("invalid pixels per metric {}", reference.ppm)));
    }
    let height_cm = pixel.estimated_height_px / reference.ppm;
    let diameter_cm = pixel.estimated_diameter_px / reference.ppm;
    let radius_cm = diameter_cm / 2.0;
    let volume_ml = PI * radius_cm * radius_cm * height_cm;
    RealDimensions::new(
        height_cm,
        diameter_cm,
        volume_ml,
        reference.ppm,
        pixel.measurement_confidence,
        ScaleMethod::Reference,
        args,
    )
}

/// 外部参照物查找能力
pub trait ReferenceLocator: Send + Sync {
    /// exclude 是瓶子的检测框，参照物不能和它重叠
    fn locate(&self, img: &RgbImage, exclude: &Roi) -> Option<ReferenceObject>;
}

/// 找图中深色、近似正方形、填充饱满的方块
pub struct DarkSquareLocator {
    args: ReferenceArgs,
    reference_width_cm: f64,
}

impl DarkSquareLocator {
    pub fn new(scale: &ScaleArgs) -> Self {
        Self { args: scale.reference.clone(), reference_width_cm: scale.reference_width_cm }
    }
}

struct Candidate {
    bbox: Roi,
    width: f64,
    area: f64,
    aspect_ratio: f64,
    solidity: f64,
}

impl ReferenceLocator for DarkSquareLocator {
    fn locate(&self, img: &RgbImage, exclude: &Roi) -> Option<ReferenceObject> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        let gray = image::imageops::grayscale(img);
        let blurred = gaussian_blur_f32(&gray, 1.0);
        let mask = open(&binarize(&blurred, self.args.dark_threshold, false), Norm::L1, 1);
        let max_area = self.args.max_area_ratio * width as f64 * height as f64;

        let mut candidates = Vec::new();
        for points in find_external_contours(&mask) {
            let area = polygon_area(&points);
            if area < self.args.min_area || area > max_area {
                continue;
            }
            let rect = bounding_rect(&points);
            let bbox = Roi::new(rect.x, rect.y, rect.x + rect.w, rect.y + rect.h);
            if bbox.intersects(exclude) {
                continue;
            }
            let aspect_ratio = rect.w as f64 / rect.h as f64;
            if !self.args.aspect_ratio.contains(aspect_ratio) {
                continue;
            }
            let fill = area / (rect.w as f64 * rect.h as f64);
            if fill < self.args.min_fill {
                continue;
            }
            let hull_area = polygon_area(&convex_hull(points.as_slice()));
            let solidity = if hull_area > 0.0 { (area / hull_area).min(1.0) } else { 0.0 };
            candidates.push(Candidate { bbox, width: rect.w as f64, area, aspect_ratio, solidity });
        }

        // 方正程度50%、面积30%、凸度20%
        let largest = candidates.iter().map(|c| c.area).fold(0.0, f64::max);
        let mut best: Option<(&Candidate, f64)> = None;
        for candidate in candidates.iter() {
            let squareness = (1.0 - (1.0 - candidate.aspect_ratio).abs()).max(0.0);
            let score = 0.5 * squareness + 0.3 * (candidate.area / largest) + 0.2 * candidate.solidity;
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((candidate, score));
            }
        }
        let (chosen, score) = best?;
        log::debug!("reference candidate {:?} score {:.3}", chosen.bbox, score);
        Some(ReferenceObject {
            bbox: chosen.bbox,
            ppm: chosen.width / self.reference_width_cm,
            aspect_ratio: chosen.aspect_ratio,
            solidity: chosen.solidity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn pixel(height: f64, diameter: f64, volume: f64, aspect: f64) -> PixelDimensions {
        PixelDimensions::new(height, diameter, diameter, volume, aspect, 0.95, 0.8).unwrap()
    }

    #[test]
    fn tall_bottle_assumes_canonical_height() {
        let args = ScaleArgs::default();
        let real = estimate_from_context(&pixel(160.0, 50.0, 256000.0, 3.2), &args).unwrap();
        assert_eq!(real.estimated_scale, 8.0);
        assert_eq!(real.real_height_cm, 20.0);
        assert_eq!(real.real_diameter_cm, 6.25);
        assert_eq!(real.estimated_volume_ml, 500.0);
        assert_eq!(real.confidence_percent, 80.0);
        assert_eq!(real.scale_method, ScaleMethod::Context);
    }

    #[test]
    fn squat_bottle_assumes_canonical_diameter() {
        let args = ScaleArgs::default();
        let real = estimate_from_context(&pixel(120.0, 70.0, 300000.0, 1.8), &args).unwrap();
        assert_eq!(real.estimated_scale, 10.0);
        assert_eq!(real.real_diameter_cm, 7.0);
        assert_eq!(real.real_height_cm, 12.0);
        assert_eq!(real.estimated_volume_ml, 300.0);
    }

    #[test]
    fn scale_clamped_at_and_beyond_limits() {
        let args = ScaleArgs::default();
        // 正好在下限
        assert_eq!(estimate_from_context(&pixel(100.0, 30.0, 10000.0, 3.0), &args).unwrap().estimated_scale, 5.0);
        // 刚好低于下限
        let below = estimate_from_context(&pixel(99.0, 30.0, 10000.0, 3.0), &args).unwrap();
        assert_eq!(below.estimated_scale, 5.0);
        assert_eq!(below.real_height_cm, 19.8);
        // 正好在上限
        assert_eq!(estimate_from_context(&pixel(1000.0, 300.0, 1e7, 3.0), &args).unwrap().estimated_scale, 50.0);
        // 超过上限
        let above = estimate_from_context(&pixel(1010.0, 300.0, 1e7, 3.0), &args).unwrap();
        assert_eq!(above.estimated_scale, 50.0);
        assert_eq!(above.real_height_cm, 20.2);
    }

    #[test]
    fn height_clamped_at_and_beyond_limits() {
        let args = ScaleArgs::default();
        assert_eq!(estimate_from_context(&pixel(40.0, 15.0, 10000.0, 3.0), &args).unwrap().real_height_cm, 8.0);
        assert_eq!(estimate_from_context(&pixel(30.0, 15.0, 10000.0, 3.0), &args).unwrap().real_height_cm, 8.0);
        assert_eq!(estimate_from_context(&pixel(1750.0, 300.0, 1e7, 3.0), &args).unwrap().real_height_cm, 35.0);
        assert_eq!(estimate_from_context(&pixel(2000.0, 300.0, 1e7, 3.0), &args).unwrap().real_height_cm, 35.0);
    }

    #[test]
    fn diameter_clamped_at_and_beyond_limits() {
        let args = ScaleArgs::default();
        let at_min = estimate_from_context(&pixel(60.0, 15.0, 10000.0, 1.8), &args).unwrap();
        assert_eq!(at_min.real_diameter_cm, 3.0);
        let below_min = estimate_from_context(&pixel(60.0, 10.0, 10000.0, 1.8), &args).unwrap();
        assert_eq!(below_min.real_diameter_cm, 3.0);
        let at_max = estimate_from_context(&pixel(900.0, 600.0, 1e7, 1.8), &args).unwrap();
        assert_eq!(at_max.real_diameter_cm, 12.0);
        let above_max = estimate_from_context(&pixel(900.0, 700.0, 1e7, 1.8), &args).unwrap();
        assert_eq!(above_max.real_diameter_cm, 12.0);
    }

    #[test]
    fn volume_clamped_at_and_beyond_limits() {
        let args = ScaleArgs::default();
        // 比例尺被夹到5，体积除以125
        assert_eq!(estimate_from_context(&pixel(100.0, 30.0, 6250.0, 3.0), &args).unwrap().estimated_volume_ml, 50.0);
        assert_eq!(estimate_from_context(&pixel(100.0, 30.0, 6000.0, 3.0), &args).unwrap().estimated_volume_ml, 50.0);
        assert_eq!(estimate_from_context(&pixel(100.0, 30.0, 250000.0, 3.0), &args).unwrap().estimated_volume_ml, 2000.0);
        assert_eq!(estimate_from_context(&pixel(100.0, 30.0, 260000.0, 3.0), &args).unwrap().estimated_volume_ml, 2000.0);
    }

    #[test]
    fn reference_calibration_uses_plain_cylinder() {
        let args = ScaleArgs::default();
        let reference = ReferenceObject { bbox: Roi::new(0, 0, 50, 50), ppm: 10.0, aspect_ratio: 1.0, solidity: 1.0 };
        let real = estimate_from_reference(&pixel(160.0, 65.0, 1.0, 2.5), &reference, &args).unwrap();
        assert_eq!(real.real_height_cm, 16.0);
        assert_eq!(real.real_diameter_cm, 6.5);
        // π * 3.25² * 16 = 530.9
        assert_eq!(real.estimated_volume_ml, 531.0);
        assert_eq!(real.estimated_scale, 10.0);
        assert_eq!(real.scale_method, ScaleMethod::Reference);
    }

    #[test]
    fn zero_ppm_is_scale_error() {
        let reference = ReferenceObject { bbox: Roi::new(0, 0, 5, 5), ppm: 0.0, aspect_ratio: 1.0, solidity: 1.0 };
        let err = estimate_from_reference(&pixel(160.0, 65.0, 1.0, 2.5), &reference, &ScaleArgs::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::ScaleEstimation(_)));
    }

    #[test]
    fn locator_finds_dark_square_outside_bottle() {
        let mut img = RgbImage::from_pixel(300, 300, Rgb([220, 220, 220]));
        // 瓶子区域里的深色方块不算
        draw_filled_rect_mut(&mut img, Rect::at(200, 100).of_size(40, 40), Rgb([10, 10, 10]));
        draw_filled_rect_mut(&mut img, Rect::at(30, 30).of_size(50, 50), Rgb([15, 15, 15]));
        // 长条不像正方形
        draw_filled_rect_mut(&mut img, Rect::at(30, 200).of_size(100, 25), Rgb([15, 15, 15]));

        let locator = DarkSquareLocator::new(&ScaleArgs::default());
        let reference = locator.locate(&img, &Roi::new(180, 60, 280, 280)).unwrap();
        assert!((reference.bbox.x1 - 30).abs() <= 2 && (reference.bbox.y1 - 30).abs() <= 2);
        // 宽50像素，参照物5cm
        assert!((reference.ppm - 10.0).abs() < 0.5);
        assert!(reference.solidity > 0.95);
    }

    #[test]
    fn locator_without_dark_square() {
        let img = RgbImage::from_pixel(100, 100, Rgb([220, 220, 220]));
        let locator = DarkSquareLocator::new(&ScaleArgs::default());
        assert!(locator.locate(&img, &Roi::new(0, 0, 10, 10)).is_none());
    }
}
