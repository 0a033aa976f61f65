use crate::config::BottleSpec;
use crate::error::AnalysisError;
use crate::models::measurement::RealDimensions;
use crate::models::result::ClassificationResult;
use crate::my_utils::math::round_to;
use crate::recognition::engine::Engine;

pub trait Classify {
    /// 按体积匹配规格表，出错时返回 Error 哨兵而不是错误
    fn classify(&self, real: &RealDimensions) -> ClassificationResult;
}

impl Classify for Engine {
    fn classify(&self, real: &RealDimensions) -> ClassificationResult {
        let args = &self.config().classification;
        classify(real.estimated_volume_ml, Some(real.confidence_percent), &args.bottle_specs, args.tolerance_percent)
    }
}

pub fn classify(
    estimated_volume: f64,
    measurement_confidence_percent: Option<f64>,
    specs: &[BottleSpec],
    tolerance_percent: f64,
) -> ClassificationResult {
    match try_classify(estimated_volume, measurement_confidence_percent, specs, tolerance_percent) {
        Ok(result) => result,
        Err(e) => {
            log::warn!("classification failed: {e}");
            ClassificationResult::error()
        }
    }
}

/// 容差内的候选取体积绝对差最小的，相等时取规格表里靠前的
pub fn try_classify(
    estimated_volume: f64,
    measurement_confidence_percent: Option<f64>,
    specs: &[BottleSpec],
    tolerance_percent: f64,
) -> Result<ClassificationResult, AnalysisError> {
    if !estimated_volume.is_finite() {
        return Err(AnalysisError::Classification(format!("invalid volume {estimated_volume}")));
    }
    if specs.is_empty() {
        return Err(AnalysisError::Classification("empty bottle catalog".to_string()));
    }

    let mut best: Option<(&BottleSpec, f64)> = None;
    for spec in specs {
        if !(spec.volume_ml.is_finite() && spec.volume_ml > 0.0) {
            return Err(AnalysisError::Classification(format!(
                "invalid catalog volume for {}: {}",
                spec.bottle_type, spec.volume_ml
            )));
        }
        let diff = (estimated_volume - spec.volume_ml).abs();
        let diff_percent = diff / spec.volume_ml * 100.0;
        if diff_percent > tolerance_percent {
            continue;
        }
        if best.map_or(true, |(_, best_diff)| diff < best_diff) {
            best = Some((spec, diff));
        }
    }

    let measurement_quality = measurement_confidence_percent.filter(|c| c.is_finite()).map(|c| round_to(c, 2));
    let Some((spec, diff)) = best else {
        log::info!("volume {estimated_volume:.0}mL matches no catalog entry within {tolerance_percent}%");
        return Ok(ClassificationResult::unknown(measurement_quality));
    };

    let volume_match = (100.0 - diff / spec.volume_ml * 100.0).max(0.0);
    let confidence = match measurement_quality {
        Some(quality) => volume_match * 0.7 + quality * 0.3,
        None => volume_match,
    };
    log::debug!("classified as {} (diff {:.0}mL, volume match {:.1}%)", spec.bottle_type, diff, volume_match);

    Ok(ClassificationResult {
        classification: spec.bottle_type.clone(),
        confidence_percent: round_to(confidence, 2),
        volume_match_percent: Some(round_to(volume_match, 2)),
        measurement_quality,
    })
}
