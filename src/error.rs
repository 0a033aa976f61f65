use thiserror::Error;

/// 分析流程每个阶段的失败原因，全部作为正常结果返回给调用方
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Invalid image data: {0}")]
    InputDecode(String),

    #[error("No bottles detected by detector")]
    DetectionEmpty,

    #[error("Could not extract bottle contour")]
    ContourNotFound,

    #[error("Dimension computation failed: {0}")]
    DimensionComputation(String),

    #[error("Scale estimation failed: {0}")]
    ScaleEstimation(String),

    #[error("Reference object (box/square) not found for size calibration")]
    ReferenceNotFound,

    #[error("Classification failed: {0}")]
    Classification(String),
}

impl AnalysisError {
    /// 只有图片本身坏掉才算客户端错误
    pub fn is_client_error(&self) -> bool {
        matches!(self, AnalysisError::InputDecode(_))
    }
}
