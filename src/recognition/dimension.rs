use std::f64::consts::PI;

use crate::config::DimensionArgs;
use crate::error::AnalysisError;
use crate::models::measurement::{GeometricMeasurements, PixelDimensions};
use crate::recognition::engine::Engine;

pub trait DimensionEstimate {
    /// 轮廓测量转成像素高度、直径、体积
    fn estimate_pixel_dimensions(&self, measurements: &GeometricMeasurements) -> Result<PixelDimensions, AnalysisError>;
}

impl DimensionEstimate for Engine {
    fn estimate_pixel_dimensions(&self, measurements: &GeometricMeasurements) -> Result<PixelDimensions, AnalysisError> {
        estimate_pixel_dimensions(measurements, &self.config().dimension)
    }
}

pub fn estimate_pixel_dimensions(m: &GeometricMeasurements, args: &DimensionArgs) -> Result<PixelDimensions, AnalysisError> {
    let (height, diameter) = if m.aspect_ratio > args.upright_aspect_ratio {
        // 直立的瓶子直接用椭圆长短轴
        (m.major_axis, m.minor_axis)
    } else {
        // 倾斜或矮胖的，高取大、直径取小，抵消透视
        (m.major_axis.max(m.bounding.h as f64), m.minor_axis.min(m.bounding.w as f64))
    };

    // 轮廓不完整时宽度比高度更容易估大
    let corrected_diameter = diameter * m.solidity.sqrt();
    let radius = corrected_diameter / 2.0;
    let volume_cylinder = PI * radius * radius * height;
    let corrected_volume = volume_cylinder * args.shape_factor * m.solidity;

    log::debug!(
        "pixel dimensions: height {:.1} diameter {:.1} volume {:.0} (cylinder {:.0})",
        height,
        corrected_diameter,
        corrected_volume,
        volume_cylinder
    );

    PixelDimensions::new(
        height,
        corrected_diameter,
        diameter,
        corrected_volume,
        m.aspect_ratio,
        m.solidity,
        measurement_confidence(m),
    )
}

/// 形状质量打分 0~1：凸度40%、长宽比40%、填充率20%
pub fn measurement_confidence(m: &GeometricMeasurements) -> f64 {
    let solidity_score = if m.solidity >= 0.3 { (m.solidity / 0.6).min(1.0) } else { 0.0 };

    let aspect = m.aspect_ratio;
    let aspect_score = if (1.5..=4.0).contains(&aspect) {
        1.0
    } else if (1.0..1.5).contains(&aspect) {
        (aspect - 1.0) / 0.5
    } else {
        (1.0 - (aspect - 2.5).abs() / 2.5).max(0.0)
    };

    let extent_score = if m.extent >= 0.2 { (m.extent / 0.5).min(1.0) } else { 0.0 };

    let total = solidity_score * 0.4 + aspect_score * 0.4 + extent_score * 0.2;
    total.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::measurement::{BoundingRect, Centers, RotatedRect};
    use crate::models::MyPoint;

    fn measurements(major: f64, minor: f64, solidity: f64, extent: f64, bounding: (i32, i32)) -> GeometricMeasurements {
        let origin = MyPoint::new(0, 0);
        GeometricMeasurements {
            area: 1000.0,
            perimeter: 200.0,
            bounding: BoundingRect { x: 0, y: 0, w: bounding.0, h: bounding.1 },
            rotated_rect: RotatedRect { center: (0.0, 0.0), width: minor, height: major, angle: 0.0, corners: [origin; 4] },
            circle_radius: major / 2.0,
            major_axis: major,
            minor_axis: minor,
            ellipse_fitted: true,
            solidity,
            aspect_ratio: major / minor,
            extent,
            circularity: 0.6,
            angle: 90.0,
            centers: Centers { bounding: origin, centroid: origin, circle: origin, ellipse: origin },
        }
    }

    #[test]
    fn upright_bottle_uses_ellipse_axes() {
        let m = measurements(140.0, 50.0, 0.81, 0.78, (60, 150));
        let dims = estimate_pixel_dimensions(&m, &DimensionArgs::default()).unwrap();
        assert_eq!(dims.estimated_height_px, 140.0);
        assert!((dims.estimated_diameter_px - 45.0).abs() < 1e-9);
        let expected = PI * 22.5 * 22.5 * 140.0 * 0.85 * 0.81;
        assert!((dims.volume_px3 - expected).abs() < 1e-6);
        assert_eq!(dims.raw_diameter_px, 50.0);
    }

    #[test]
    fn squat_shape_takes_larger_height_and_smaller_diameter() {
        let m = measurements(60.0, 50.0, 1.0, 0.78, (45, 70));
        let dims = estimate_pixel_dimensions(&m, &DimensionArgs::default()).unwrap();
        assert_eq!(dims.estimated_height_px, 70.0);
        assert_eq!(dims.estimated_diameter_px, 45.0);
    }

    #[test]
    fn confidence_weights() {
        // 全部满分
        assert!((measurement_confidence(&measurements(140.0, 50.0, 0.9, 0.8, (50, 140))) - 1.0).abs() < 1e-12);
        // 凸度太低直接0分
        let low = measurement_confidence(&measurements(140.0, 50.0, 0.25, 0.8, (50, 140)));
        assert!((low - 0.6).abs() < 1e-9);
        // 长宽比1.25在爬坡段，得一半
        let ramp = measurement_confidence(&measurements(50.0, 40.0, 0.9, 0.8, (40, 50)));
        assert!((ramp - (0.4 + 0.2 + 0.2)).abs() < 1e-9);
        // 长宽比5超出上限，以2.5为中心衰减
        let tall = measurement_confidence(&measurements(250.0, 50.0, 0.9, 0.1, (50, 250)));
        assert!((tall - (0.4 + 0.0)).abs() < 1e-9);
    }
}
