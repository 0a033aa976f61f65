use std::fs::File;
use std::io::BufReader;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::my_utils::io::compatible_path_format;

/// 服务监听参数
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerArgs {
    pub host: String,
    pub port: u16,
}

impl Default for ServerArgs {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8001 }
    }
}

/// 检测器参数
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectorArgs {
    /// 低于该置信度的检测框直接丢弃
    pub confidence_threshold: f32,
    pub device: String,
    /// 候选前景区域至少占整图面积的比例
    pub min_area_ratio: f64,
}

impl Default for DetectorArgs {
    fn default() -> Self {
        Self { confidence_threshold: 0.5, device: "cpu".to_string(), min_area_ratio: 0.01 }
    }
}

/// 轮廓提取参数
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContourArgs {
    /// 检测框四周外扩的像素，框贴着瓶子时边框才能落在背景上
    pub roi_padding: i32,
    pub gaussian_blur_sigma: f32,
    /// 自适应阈值邻域半径，11x11 窗口对应 5
    pub adaptive_block_radius: u32,
    pub adaptive_offset: i32,
    pub canny_strong: (f32, f32),
    pub canny_weak: (f32, f32),
    /// 闭运算核半径，先填小缝
    pub close_kernel: u8,
    /// 开运算核半径，再去噪点
    pub open_kernel: u8,
    pub min_area: f64,
    pub min_circularity: f64,
}

impl Default for ContourArgs {
    fn default() -> Self {
        Self {
            roi_padding: 8,
            gaussian_blur_sigma: 1.1,
            adaptive_block_radius: 5,
            adaptive_offset: 2,
            canny_strong: (50.0, 150.0),
            canny_weak: (30.0, 100.0),
            close_kernel: 2,
            open_kernel: 1,
            min_area: 500.0,
            min_circularity: 0.1,
        }
    }
}

/// 像素尺寸估计参数
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DimensionArgs {
    /// 长宽比大于该值视为直立的瓶子
    pub upright_aspect_ratio: f64,
    /// 瓶颈瓶肩不是圆柱，体积打折
    pub shape_factor: f64,
}

impl Default for DimensionArgs {
    fn default() -> Self {
        Self { upright_aspect_ratio: 1.5, shape_factor: 0.85 }
    }
}

/// 比例尺推断方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    /// 按常见瓶子比例猜比例尺
    Context,
    /// 必须找到参照物
    Reference,
    /// 有参照物用参照物，没有就退回 Context
    Auto,
}

/// 闭区间
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// 比例尺推断参数
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScaleArgs {
    pub mode: ScaleMode,
    pub tall_aspect_ratio: f64,
    pub typical_height_cm: f64,
    pub typical_diameter_cm: f64,
    /// 像素每厘米
    pub scale_range: Range,
    pub height_range_cm: Range,
    pub diameter_range_cm: Range,
    pub volume_range_ml: Range,
    /// 参照物真实宽度
    pub reference_width_cm: f64,
    pub reference: ReferenceArgs,
}

impl Default for ScaleArgs {
    fn default() -> Self {
        Self {
            mode: ScaleMode::Context,
            tall_aspect_ratio: 2.0,
            typical_height_cm: 20.0,
            typical_diameter_cm: 7.0,
            scale_range: Range::new(5.0, 50.0),
            height_range_cm: Range::new(8.0, 35.0),
            diameter_range_cm: Range::new(3.0, 12.0),
            volume_range_ml: Range::new(50.0, 2000.0),
            reference_width_cm: 5.0,
            reference: ReferenceArgs::default(),
        }
    }
}

/// 参照物查找参数
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReferenceArgs {
    /// 灰度低于该值才算深色
    pub dark_threshold: u8,
    pub min_area: f64,
    /// 相对整图面积的上限
    pub max_area_ratio: f64,
    pub aspect_ratio: Range,
    /// 轮廓面积 / 外接框面积
    pub min_fill: f64,
}

impl Default for ReferenceArgs {
    fn default() -> Self {
        Self {
            dark_threshold: 80,
            min_area: 400.0,
            max_area_ratio: 0.25,
            aspect_ratio: Range::new(0.7, 1.3),
            min_fill: 0.6,
        }
    }
}

/// 瓶子规格
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BottleSpec {
    pub bottle_type: String,
    pub volume_ml: f64,
    pub height_cm: f64,
    pub diameter_cm: f64,
}

impl BottleSpec {
    pub fn new(bottle_type: &str, volume_ml: f64, height_cm: f64, diameter_cm: f64) -> Self {
        Self { bottle_type: bottle_type.to_string(), volume_ml, height_cm, diameter_cm }
    }
}

/// 分类参数，规格表按配置顺序遍历
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassificationArgs {
    pub tolerance_percent: f64,
    pub bottle_specs: Vec<BottleSpec>,
}

impl Default for ClassificationArgs {
    fn default() -> Self {
        Self {
            tolerance_percent: 25.0,
            bottle_specs: vec![
                BottleSpec::new("100mL", 100.0, 8.5, 3.8),
                BottleSpec::new("200mL", 200.0, 10.28, 4.39),
                BottleSpec::new("300mL", 300.0, 12.5, 5.2),
                BottleSpec::new("400mL", 400.0, 14.2, 5.8),
                BottleSpec::new("500mL", 500.0, 16.0, 6.5),
                BottleSpec::new("600mL", 600.0, 17.5, 7.0),
                BottleSpec::new("1000mL", 1000.0, 22.0, 8.5),
                BottleSpec::new("1500mL", 1500.0, 28.0, 9.5),
            ],
        }
    }
}

/// 可视化参数
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AnnotationArgs {
    pub disabled: bool,
    /// 替换内置字体
    pub font_path: Option<String>,
}

/// 配置参数
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerArgs,
    pub detector: DetectorArgs,
    pub contour: ContourArgs,
    pub dimension: DimensionArgs,
    pub scale: ScaleArgs,
    pub classification: ClassificationArgs,
    pub annotation: AnnotationArgs,
}

impl Config {
    /// 读取yaml配置，缺省字段用默认值
    pub fn load(path: &str) -> Result<Self> {
        let path = compatible_path_format(path);
        let file = File::open(&path).with_context(|| format!("Failed to open config file {path}"))?;
        let reader = BufReader::new(file);
        let config: Config = serde_yaml::from_reader(reader)
            .with_context(|| format!("Failed to parse config file {path}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.classification.bottle_specs.is_empty() {
            return Err(anyhow!("classification.bottle_specs must not be empty"));
        }
        for spec in self.classification.bottle_specs.iter() {
            if !(spec.volume_ml > 0.0) {
                return Err(anyhow!("bottle spec {} has non-positive volume", spec.bottle_type));
            }
        }
        if !(self.classification.tolerance_percent >= 0.0) {
            return Err(anyhow!("classification.tolerance_percent must be >= 0"));
        }
        if self.contour.roi_padding < 0 {
            return Err(anyhow!("contour.roi_padding must be >= 0"));
        }
        if !(self.contour.gaussian_blur_sigma > 0.0) {
            return Err(anyhow!("contour.gaussian_blur_sigma must be > 0"));
        }
        let scale = &self.scale;
        for (name, range) in [
            ("scale_range", &scale.scale_range),
            ("height_range_cm", &scale.height_range_cm),
            ("diameter_range_cm", &scale.diameter_range_cm),
            ("volume_range_ml", &scale.volume_range_ml),
        ] {
            if !(range.min > 0.0 && range.min <= range.max) {
                return Err(anyhow!("scale.{name} must satisfy 0 < min <= max"));
            }
        }
        if !(scale.typical_height_cm > 0.0 && scale.typical_diameter_cm > 0.0) {
            return Err(anyhow!("scale typical bottle size must be positive"));
        }
        if !(scale.reference_width_cm > 0.0) {
            return Err(anyhow!("scale.reference_width_cm must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.classification.bottle_specs.len(), 8);
        assert_eq!(config.classification.bottle_specs[4].bottle_type, "500mL");
        assert_eq!(config.scale.mode, ScaleMode::Context);
    }

    #[test]
    fn partial_yaml_keeps_defaults() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "classification:\n  tolerance_percent: 10\nscale:\n  mode: auto\n  reference_width_cm: 2.5")?;
        let config = Config::load(file.path().to_str().unwrap())?;
        assert_eq!(config.classification.tolerance_percent, 10.0);
        // 没写规格表就用默认的
        assert_eq!(config.classification.bottle_specs.len(), 8);
        assert_eq!(config.scale.mode, ScaleMode::Auto);
        assert_eq!(config.scale.reference_width_cm, 2.5);
        assert_eq!(config.server.port, 8001);
        Ok(())
    }

    #[test]
    fn invalid_catalog_is_rejected() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "classification:\n  bottle_specs:\n    - {{bottle_type: bad, volume_ml: 0, height_cm: 1, diameter_cm: 1}}")?;
        assert!(Config::load(file.path().to_str().unwrap()).is_err());
        Ok(())
    }

    #[test]
    fn shipped_config_matches_defaults() -> Result<()> {
        let config = Config::load("config.yaml")?;
        let defaults = Config::default();
        assert_eq!(config.classification.bottle_specs, defaults.classification.bottle_specs);
        assert_eq!(config.contour.canny_strong, defaults.contour.canny_strong);
        assert_eq!(config.contour.roi_padding, defaults.contour.roi_padding);
        assert_eq!(config.scale.volume_range_ml, defaults.scale.volume_range_ml);
        Ok(())
    }

    #[test]
    fn range_clamps_at_limits() {
        let range = Range::new(5.0, 50.0);
        assert_eq!(range.clamp(4.99), 5.0);
        assert_eq!(range.clamp(5.0), 5.0);
        assert_eq!(range.clamp(50.0), 50.0);
        assert_eq!(range.clamp(50.01), 50.0);
        assert!(range.contains(5.0) && !range.contains(50.01));
    }
}
