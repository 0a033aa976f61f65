use ab_glyph::FontArc;
use anyhow::{Context, Result};
use image::RgbImage;

use crate::config::Config;
use crate::error::AnalysisError;
use crate::models::result::AnalysisReport;
use crate::models::Detection;
use crate::my_utils::image::{image_to_base64, trans_base64_to_image};
use crate::my_utils::io::read_bytes;
use crate::recognition::annotate::{builtin_font, Annotate, Overlay};
use crate::recognition::classify::Classify;
use crate::recognition::contour::ContourAnalysis;
use crate::recognition::detector::{BottleDetector, SilhouetteDetector};
use crate::recognition::dimension::DimensionEstimate;
use crate::recognition::scale::{DarkSquareLocator, ReferenceLocator, ScaleInference};

/// 启动时构建一次，之后只读，可以在线程间共享
pub struct Engine {
    config: Config,
    detector: Box<dyn BottleDetector>,
    locator: Box<dyn ReferenceLocator>,
    font: FontArc,
}

impl Engine {
    /// 默认用轮廓检测器和深色方块参照物
    pub fn new(config: Config) -> Result<Self> {
        let detector = Box::new(SilhouetteDetector::new(&config.detector));
        Self::with_detector(config, detector)
    }

    pub fn with_detector(config: Config, detector: Box<dyn BottleDetector>) -> Result<Self> {
        let font = match &config.annotation.font_path {
            Some(path) => load_font(path)?,
            None => builtin_font()?,
        };
        let locator = Box::new(DarkSquareLocator::new(&config.scale));
        Ok(Engine { config, detector, locator, font })
    }

    pub fn with_reference_locator(mut self, locator: Box<dyn ReferenceLocator>) -> Self {
        self.locator = locator;
        self
    }

    /// 跨模块实现方法的时候访问不到成员变量，需要调用此函数
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn detector(&self) -> &dyn BottleDetector {
        self.detector.as_ref()
    }

    pub fn reference_locator(&self) -> &dyn ReferenceLocator {
        self.locator.as_ref()
    }

    pub fn font(&self) -> &FontArc {
        &self.font
    }

    /// base64 图片入口
    pub fn analyze(&self, base64_image: &str) -> Result<AnalysisReport, AnalysisError> {
        let img = trans_base64_to_image(base64_image)?;
        self.analyze_image(&img)
    }

    /// 检测 -> 轮廓 -> 像素尺寸 -> 比例尺 -> 分类 -> 画图
    pub fn analyze_image(&self, img: &RgbImage) -> Result<AnalysisReport, AnalysisError> {
        let detection = self.locate_bottle(img)?;
        log::info!("bottle at {:?} (confidence {:.2})", detection.bbox, detection.confidence);

        let (contour, measurements) = self.extract_bottle_contour(img, &detection.bbox)?;
        let pixel = self.estimate_pixel_dimensions(&measurements)?;
        let (real, reference) = self.infer_real_dimensions(img, &detection.bbox, &pixel)?;
        let classification = self.classify(&real);
        log::info!(
            "measured {:.2}cm x {:.2}cm, {:.0}mL -> {} ({:.1}%)",
            real.real_height_cm,
            real.real_diameter_cm,
            real.estimated_volume_ml,
            classification.classification,
            classification.confidence_percent
        );

        let overlay = Overlay {
            detection: &detection,
            contour: &contour,
            measurements: &measurements,
            real: &real,
            reference: reference.as_ref(),
        };
        let processed_image = self.render_processed_image(img, &overlay);

        Ok(AnalysisReport { detection, measurements, pixel, real, reference, classification, processed_image })
    }

    /// 画图失败不影响结果，退回原图；编码失败给空串
    fn render_processed_image(&self, img: &RgbImage, overlay: &Overlay) -> String {
        let rendering = if self.config.annotation.disabled {
            img.clone()
        } else {
            self.annotate(img, overlay).unwrap_or_else(|e| {
                log::warn!("annotation failed, returning plain image: {e:#}");
                img.clone()
            })
        };
        image_to_base64(&rendering).unwrap_or_else(|e| {
            log::warn!("encode processed image failed: {e:#}");
            String::new()
        })
    }

    /// 检测器出错当作没检测到，低于阈值的丢掉，剩下取置信度最高的
    fn locate_bottle(&self, img: &RgbImage) -> Result<Detection, AnalysisError> {
        let detections = self.detector.detect(img).unwrap_or_else(|e| {
            log::warn!("detector failed: {e:#}");
            Vec::new()
        });
        let threshold = self.config.detector.confidence_threshold;
        let confident: Vec<Detection> = detections.into_iter().filter(|d| d.confidence >= threshold).collect();
        Detection::best(&confident).ok_or(AnalysisError::DetectionEmpty)
    }
}

fn load_font(path: &str) -> Result<FontArc> {
    let data = read_bytes(path).with_context(|| format!("read font {path}"))?;
    FontArc::try_from_vec(data).with_context(|| format!("parse font {path}"))
}
