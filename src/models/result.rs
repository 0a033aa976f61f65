/*
    输出结构
*/

use serde::{Serialize, Deserialize};

use super::Detection;
use super::measurement::{GeometricMeasurements, PixelDimensions, ReferenceObject, RealDimensions, ScaleMethod};

pub const UNKNOWN_CLASSIFICATION: &str = "Unknown";
pub const ERROR_CLASSIFICATION: &str = "Error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult{
    /// 规格名，匹配不上是Unknown，计算出错是Error
    pub classification: String,
    pub confidence_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_match_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_quality: Option<f64>,
}

impl ClassificationResult{
    pub fn unknown(measurement_quality: Option<f64>) -> Self{
        Self{
            classification: UNKNOWN_CLASSIFICATION.to_string(),
            confidence_percent: 0.0,
            volume_match_percent: None,
            measurement_quality,
        }
    }

    pub fn error() -> Self{
        Self{
            classification: ERROR_CLASSIFICATION.to_string(),
            confidence_percent: 0.0,
            volume_match_percent: None,
            measurement_quality: None,
        }
    }
}

/// 一次分析的完整结果
#[derive(Debug, Clone)]
pub struct AnalysisReport{
    pub detection: Detection,
    pub measurements: GeometricMeasurements,
    pub pixel: PixelDimensions,
    pub real: RealDimensions,
    pub reference: Option<ReferenceObject>,
    pub classification: ClassificationResult,
    /// png data uri，编码失败时为空串
    pub processed_image: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeasurementDetails{
    pub contour: GeometricMeasurements,
    pub pixel_dimensions: PixelDimensions,
    pub scale_method: ScaleMethod,
    pub estimated_scale_ppm: f64,
    pub measurement_confidence_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_object: Option<ReferenceObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_match_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement_quality: Option<f64>,
}

/// POST / 成功返回
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisResponse{
    pub classification: String,
    pub confidence_percent: f64,
    pub real_height_cm: f64,
    pub real_diameter_cm: f64,
    pub estimated_volume_ml: f64,
    pub detection_method: String,
    pub detector_confidence: f32,
    pub bbox: [i32; 4],
    pub measurement_details: MeasurementDetails,
    pub processed_image: String,
}

impl AnalysisResponse{
    pub fn new(report: AnalysisReport, detection_method: &str) -> Self{
        let AnalysisReport{detection, measurements, pixel, real, reference, classification, processed_image} = report;
        Self{
            confidence_percent: classification.confidence_percent,
            real_height_cm: real.real_height_cm,
            real_diameter_cm: real.real_diameter_cm,
            estimated_volume_ml: real.estimated_volume_ml,
            detection_method: detection_method.to_string(),
            detector_confidence: detection.confidence,
            bbox: detection.bbox.as_array(),
            measurement_details: MeasurementDetails{
                contour: measurements,
                pixel_dimensions: pixel,
                scale_method: real.scale_method,
                estimated_scale_ppm: real.estimated_scale,
                measurement_confidence_percent: real.confidence_percent,
                reference_object: reference,
                volume_match_percent: classification.volume_match_percent,
                measurement_quality: classification.measurement_quality,
            },
            classification: classification.classification,
            processed_image,
        }
    }
}

/// 任何阶段失败都只返回error字段
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse{
    pub error: String,
}

/// GET /health
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse{
    pub status: String,
    pub detector_available: bool,
    pub device: String,
}
