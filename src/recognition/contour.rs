use std::f64::consts::PI;

use image::{GrayImage, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{arc_length, convex_hull, min_area_rect};
use imageproc::morphology::{close, open};
use imageproc::point::Point;

use crate::config::ContourArgs;
use crate::error::AnalysisError;
use crate::models::measurement::{BottleContour, Centers, GeometricMeasurements, RotatedRect};
use crate::models::{MyPoint, Roi};
use crate::my_utils::image::*;
use crate::my_utils::math::*;
use crate::recognition::engine::Engine;

pub trait ContourAnalysis {
    /// 在检测框内提取瓶子轮廓并做几何测量
    /// 轮廓坐标已经换算回原图
    fn extract_bottle_contour(&self, img: &RgbImage, roi: &Roi) -> Result<(BottleContour, GeometricMeasurements), AnalysisError>;
}

impl ContourAnalysis for Engine {
    fn extract_bottle_contour(&self, img: &RgbImage, roi: &Roi) -> Result<(BottleContour, GeometricMeasurements), AnalysisError> {
        extract_bottle_contour(img, roi, &self.config().contour)
    }
}

pub fn extract_bottle_contour(img: &RgbImage, roi: &Roi, args: &ContourArgs) -> Result<(BottleContour, GeometricMeasurements), AnalysisError> {
    if roi.clamp_to(img.width(), img.height()).is_empty() {
        return Err(AnalysisError::ContourNotFound);
    }
    // 亮暗由边框判断，检测框贴边时边框全是瓶身，先外扩一圈
    let roi = roi.padded(args.roi_padding).clamp_to(img.width(), img.height());
    let gray_roi = image::imageops::grayscale(&crop_image(img, &roi));
    let silhouette = build_silhouette(&gray_roi, args).ok_or(AnalysisError::ContourNotFound)?;

    let candidates = find_external_contours(&silhouette);
    log::debug!("roi {:?}: {} external contours", roi, candidates.len());
    let points = select_contour(candidates, args).ok_or(AnalysisError::ContourNotFound)?;

    let contour = BottleContour::new(points).translated(roi.x1, roi.y1);
    let measurements = measure_contour(&contour)?;
    Ok((contour, measurements))
}

/// 四种二值化结果取或，再闭运算填缝、开运算去噪
/// 光照变化大时也能拿到完整的外形，代价是偶尔多出假边
pub fn build_silhouette(gray_roi: &GrayImage, args: &ContourArgs) -> Option<GrayImage> {
    let blurred = gaussian_blur_f32(gray_roi, args.gaussian_blur_sigma);

    let level = otsu_level(&blurred);
    let bright = foreground_is_bright(&blurred, level);
    let thresh_otsu = binarize(&blurred, level, bright);
    let thresh_adaptive = adaptive_threshold(&blurred, args.adaptive_block_radius, args.adaptive_offset, bright);
    let edges_strong = canny(&blurred, args.canny_strong.0, args.canny_strong.1);
    let edges_weak = canny(&blurred, args.canny_weak.0, args.canny_weak.1);

    let combined = bitwise_or(&[&thresh_otsu, &thresh_adaptive, &edges_strong, &edges_weak])?;
    let combined = close(&combined, Norm::L1, args.close_kernel);
    Some(open(&combined, Norm::L1, args.open_kernel))
}

fn circularity(area: f64, perimeter: f64) -> f64 {
    if perimeter > 0.0 {
        4.0 * PI * area / (perimeter * perimeter)
    } else {
        0.0
    }
}

/// 去掉面积太小和形状太乱的，剩下的取面积最大的，并列取先找到的
pub fn select_contour(candidates: Vec<Vec<Point<i32>>>, args: &ContourArgs) -> Option<Vec<Point<i32>>> {
    let mut best: Option<(Vec<Point<i32>>, f64)> = None;
    for points in candidates {
        let area = polygon_area(&points);
        if area < args.min_area {
            continue;
        }
        let perimeter = arc_length(&points, true);
        if perimeter > 0.0 && circularity(area, perimeter) < args.min_circularity {
            continue;
        }
        if best.as_ref().map_or(true, |(_, best_area)| area > *best_area) {
            best = Some((points, area));
        }
    }
    best.map(|(points, _)| points)
}

fn to_point(p: (f64, f64)) -> MyPoint {
    MyPoint::new(p.0 as i32, p.1 as i32)
}

/// 外接框、旋转矩形、外接圆、等效椭圆、凸包、矩
pub fn measure_contour(contour: &BottleContour) -> Result<GeometricMeasurements, AnalysisError> {
    let points = contour.points();
    if points.len() < 3 {
        return Err(AnalysisError::ContourNotFound);
    }
    let area = polygon_area(points);
    let perimeter = arc_length(points, true);
    let bounding = bounding_rect(points);

    let corners = min_area_rect(points);
    let corner = |i: usize| (corners[i].x as f64, corners[i].y as f64);
    let rect_w = euclidean_distance(corner(0), corner(1));
    let rect_h = euclidean_distance(corner(1), corner(2));
    let rect_center = (
        corners.iter().map(|p| p.x as f64).sum::<f64>() / 4.0,
        corners.iter().map(|p| p.y as f64).sum::<f64>() / 4.0,
    );
    let rect_angle = (corner(1).1 - corner(0).1).atan2(corner(1).0 - corner(0).0).to_degrees();

    let hull = convex_hull(points);
    let hull_area = polygon_area(&hull);
    let solidity = if hull_area > 0.0 { area / hull_area } else { 0.0 };
    let (circle_center, circle_radius) = min_enclosing_circle(&hull);

    let moments = polygon_moments(points);
    let fitted = if points.len() >= 5 { ellipse_from_moments(&moments) } else { None };
    let ellipse_fitted = fitted.is_some();
    let (ellipse_center, major_axis, minor_axis, angle) =
        fitted.unwrap_or((rect_center, rect_w.max(rect_h), rect_w.min(rect_h), rect_angle));

    let aspect_ratio = if minor_axis > 0.0 { major_axis / minor_axis } else { 1.0 };
    let box_area = (bounding.w * bounding.h) as f64;
    let extent = if box_area > 0.0 { area / box_area } else { 0.0 };
    // m00为0时用旋转矩形中心，避免除零
    let centroid = moments.centroid().unwrap_or(rect_center);

    let measurements = GeometricMeasurements {
        area,
        perimeter,
        bounding,
        rotated_rect: RotatedRect {
            center: rect_center,
            width: rect_w,
            height: rect_h,
            angle: rect_angle,
            corners: [0, 1, 2, 3].map(|i| MyPoint::new(corners[i].x, corners[i].y)),
        },
        circle_radius,
        major_axis,
        minor_axis,
        ellipse_fitted,
        solidity,
        aspect_ratio,
        extent,
        circularity: circularity(area, perimeter),
        angle,
        centers: Centers {
            bounding: bounding.center(),
            centroid: to_point(centroid),
            circle: to_point(circle_center),
            ellipse: to_point(ellipse_center),
        },
    }
    .validated()?;

    log::debug!(
        "contour measurements: area {:.0}px² perimeter {:.0}px bounding {}x{} ellipse {:.1}x{:.1} solidity {:.3} aspect {:.2}",
        measurements.area,
        measurements.perimeter,
        measurements.bounding.w,
        measurements.bounding.h,
        measurements.major_axis,
        measurements.minor_axis,
        measurements.solidity,
        measurements.aspect_ratio
    );
    Ok(measurements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::{draw_filled_ellipse_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    fn bottle_image() -> RgbImage {
        let mut img = RgbImage::from_pixel(240, 300, Rgb([30, 30, 30]));
        draw_filled_ellipse_mut(&mut img, (120, 150), 25, 80, Rgb([240, 240, 240]));
        img
    }

    #[test]
    fn extracts_ellipse_in_image_coordinates() {
        let img = bottle_image();
        let (contour, m) = extract_bottle_contour(&img, &Roi::new(60, 50, 180, 250), &ContourArgs::default()).unwrap();
        assert!(contour.len() > 100);
        // 坐标已经加回ROI偏移
        assert!((m.centers.centroid.x - 120).abs() <= 2);
        assert!((m.centers.centroid.y - 150).abs() <= 2);
        assert!((m.bounding.h - 161).abs() <= 4);
        assert!((m.aspect_ratio - 3.2).abs() < 0.25);
        assert!(m.solidity > 0.9 && m.solidity <= 1.0);
        assert!(m.circularity > 0.0 && m.circularity <= 1.0);
        assert!(m.ellipse_fitted);
    }

    #[test]
    fn dark_bottle_on_bright_background() {
        let mut img = RgbImage::from_pixel(200, 260, Rgb([235, 235, 235]));
        draw_filled_ellipse_mut(&mut img, (100, 130), 30, 90, Rgb([20, 40, 20]));
        let (_, m) = extract_bottle_contour(&img, &Roi::new(50, 20, 150, 240), &ContourArgs::default()).unwrap();
        assert!((m.major_axis - 180.0).abs() < 8.0);
        assert!((m.minor_axis - 60.0).abs() < 6.0);
    }

    #[test]
    fn tight_roi_around_rectangle() {
        let mut img = RgbImage::from_pixel(240, 300, Rgb([30, 30, 30]));
        draw_filled_rect_mut(&mut img, Rect::at(95, 60).of_size(50, 170), Rgb([240, 240, 240]));
        let (contour, m) = extract_bottle_contour(&img, &Roi::new(95, 60, 145, 230), &ContourArgs::default()).unwrap();
        assert!(contour.len() > 4);
        assert!((m.bounding.w - 50).abs() <= 3);
        assert!((m.bounding.h - 170).abs() <= 3);
        assert!((m.bounding.x - 95).abs() <= 2 && (m.bounding.y - 60).abs() <= 2);
        assert!(m.solidity > 0.95);
    }

    #[test]
    fn empty_roi_is_not_found() {
        let img = bottle_image();
        let err = extract_bottle_contour(&img, &Roi::new(400, 400, 500, 500), &ContourArgs::default()).unwrap_err();
        assert_eq!(err, AnalysisError::ContourNotFound);
    }

    #[test]
    fn featureless_roi_is_not_found() {
        let img = RgbImage::from_pixel(100, 100, Rgb([128, 128, 128]));
        let result = extract_bottle_contour(&img, &Roi::new(10, 10, 90, 90), &ContourArgs::default());
        assert!(result.is_err());
    }

    #[test]
    fn selection_drops_small_and_prefers_first_on_tie() {
        let square = |x: i32, side: i32| {
            vec![Point::new(x, 0), Point::new(x + side, 0), Point::new(x + side, side), Point::new(x, side)]
        };
        let args = ContourArgs::default();
        let picked = select_contour(vec![square(0, 10), square(100, 40), square(200, 40)], &args).unwrap();
        assert_eq!(picked[0].x, 100);
        assert!(select_contour(vec![square(0, 10)], &args).is_none());
    }

    #[test]
    fn rectangle_measurements() {
        let mut img = RgbImage::from_pixel(120, 160, Rgb([0, 0, 0]));
        draw_filled_rect_mut(&mut img, Rect::at(40, 30).of_size(40, 100), Rgb([255, 255, 255]));
        let (_, m) = extract_bottle_contour(&img, &Roi::new(20, 10, 100, 150), &ContourArgs::default()).unwrap();
        assert!(m.solidity > 0.97);
        assert!(m.extent > 0.95);
        assert!((m.rotated_rect.width.max(m.rotated_rect.height) - 100.0).abs() < 4.0);
        assert!((m.circle_radius - (50f64.powi(2) + 20f64.powi(2)).sqrt()).abs() < 3.0);
    }
}
