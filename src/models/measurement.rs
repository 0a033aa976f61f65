//! 测量流程中间结果，每个记录只在构造时校验一次，之后不再修改

use imageproc::point::Point;
use serde::{Deserialize, Serialize};

use crate::config::ScaleArgs;
use crate::error::AnalysisError;
use crate::my_utils::math::round_to;

use super::{MyPoint, Roi};

/// 瓶子轮廓，全图坐标下的闭合多边形
#[derive(Debug, Clone, PartialEq)]
pub struct BottleContour {
    points: Vec<Point<i32>>,
}

impl BottleContour {
    pub fn new(points: Vec<Point<i32>>) -> Self {
        Self { points }
    }

    /// ROI局部坐标平移回原图坐标
    pub fn translated(self, dx: i32, dy: i32) -> Self {
        let points = self.points.into_iter().map(|p| Point::new(p.x + dx, p.y + dy)).collect();
        Self { points }
    }

    pub fn points(&self) -> &[Point<i32>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// 轴对齐外接框
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl BoundingRect {
    pub fn center(&self) -> MyPoint {
        MyPoint::new(self.x + self.w / 2, self.y + self.h / 2)
    }
}

/// 最小面积旋转矩形
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotatedRect {
    pub center: (f64, f64),
    pub width: f64,
    pub height: f64,
    pub angle: f64,
    pub corners: [MyPoint; 4],
}

/// 各种方式求出的中心点，画图用
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centers {
    pub bounding: MyPoint,
    pub centroid: MyPoint,
    pub circle: MyPoint,
    pub ellipse: MyPoint,
}

/// 单个轮廓的几何测量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometricMeasurements {
    pub area: f64,
    pub perimeter: f64,
    pub bounding: BoundingRect,
    pub rotated_rect: RotatedRect,
    pub circle_radius: f64,
    pub major_axis: f64,
    pub minor_axis: f64,
    /// 点数少于5个时长短轴取旋转矩形的边
    pub ellipse_fitted: bool,
    pub solidity: f64,
    pub aspect_ratio: f64,
    pub extent: f64,
    pub circularity: f64,
    pub angle: f64,
    pub centers: Centers,
}

impl GeometricMeasurements {
    /// 比值限制在[0,1]，为0或者不是有限数说明测量有问题
    pub fn validated(mut self) -> Result<Self, AnalysisError> {
        let finite = [
            self.area,
            self.perimeter,
            self.major_axis,
            self.minor_axis,
            self.solidity,
            self.aspect_ratio,
            self.extent,
            self.circularity,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err(AnalysisError::DimensionComputation("non-finite contour measurement".to_string()));
        }
        self.solidity = self.solidity.min(1.0);
        self.extent = self.extent.clamp(0.0, 1.0);
        self.circularity = self.circularity.min(1.0);
        if !(self.solidity > 0.0) {
            return Err(AnalysisError::DimensionComputation(format!("solidity out of range: {}", self.solidity)));
        }
        if !(self.circularity > 0.0) {
            return Err(AnalysisError::DimensionComputation(format!(
                "circularity out of range: {}",
                self.circularity
            )));
        }
        if !(self.aspect_ratio > 0.0) {
            return Err(AnalysisError::DimensionComputation(format!(
                "aspect ratio out of range: {}",
                self.aspect_ratio
            )));
        }
        Ok(self)
    }
}

/// 像素空间的尺寸估计
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelDimensions {
    pub estimated_height_px: f64,
    /// 已经乘过 √solidity
    pub estimated_diameter_px: f64,
    pub raw_diameter_px: f64,
    pub volume_px3: f64,
    pub aspect_ratio: f64,
    pub solidity: f64,
    pub measurement_confidence: f64,
}

impl PixelDimensions {
    pub fn new(
        estimated_height_px: f64,
        estimated_diameter_px: f64,
        raw_diameter_px: f64,
        volume_px3: f64,
        aspect_ratio: f64,
        solidity: f64,
        measurement_confidence: f64,
    ) -> Result<Self, AnalysisError> {
        for (name, value) in [
            ("height", estimated_height_px),
            ("diameter", estimated_diameter_px),
            ("volume", volume_px3),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(AnalysisError::DimensionComputation(format!("invalid pixel {name}: {value}")));
            }
        }
        let measurement_confidence = if measurement_confidence.is_finite() {
            measurement_confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Ok(Self {
            estimated_height_px,
            estimated_diameter_px,
            raw_diameter_px,
            volume_px3,
            aspect_ratio,
            solidity,
            measurement_confidence,
        })
    }
}

/// 比例尺来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMethod {
    Context,
    Reference,
}

/// 真实尺寸，各字段在构造时限制到合理范围并取整
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealDimensions {
    pub real_height_cm: f64,
    pub real_diameter_cm: f64,
    pub estimated_volume_ml: f64,
    /// 像素每厘米
    pub estimated_scale: f64,
    pub confidence_percent: f64,
    pub scale_method: ScaleMethod,
}

impl RealDimensions {
    pub fn new(
        height_cm: f64,
        diameter_cm: f64,
        volume_ml: f64,
        scale: f64,
        measurement_confidence: f64,
        scale_method: ScaleMethod,
        bounds: &ScaleArgs,
    ) -> Result<Self, AnalysisError> {
        if ![height_cm, diameter_cm, volume_ml, scale].iter().all(|v| v.is_finite()) {
            return Err(AnalysisError::ScaleEstimation("non-finite real dimension".to_string()));
        }
        Ok(Self {
            real_height_cm: round_to(bounds.height_range_cm.clamp(height_cm), 2),
            real_diameter_cm: round_to(bounds.diameter_range_cm.clamp(diameter_cm), 2),
            estimated_volume_ml: round_to(bounds.volume_range_ml.clamp(volume_ml), 0),
            estimated_scale: round_to(scale, 2),
            confidence_percent: round_to(measurement_confidence.clamp(0.0, 1.0) * 100.0, 1),
            scale_method,
        })
    }
}

/// 图片中用于标定的参照物
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceObject {
    pub bbox: Roi,
    /// pixels per metric，像素每厘米
    pub ppm: f64,
    pub aspect_ratio: f64,
    pub solidity: f64,
}
