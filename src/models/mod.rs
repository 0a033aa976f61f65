//! 定义输入输出和公用结构体

pub mod request;
pub mod measurement;
pub mod result;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq)]
pub struct MyPoint{
    pub x: i32, // 引擎所有坐标点均使用i32
    pub y: i32,
}

impl MyPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// 感兴趣区域，(x1,y1) 左上 (x2,y2) 右下，右下不包含
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq)]
pub struct Roi{
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Roi {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// 裁到图片范围内
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as i32, height as i32);
        Self {
            x1: self.x1.clamp(0, w),
            y1: self.y1.clamp(0, h),
            x2: self.x2.clamp(0, w),
            y2: self.y2.clamp(0, h),
        }
    }

    /// 四周各外扩 margin 像素，不做裁剪
    pub fn padded(&self, margin: i32) -> Self {
        Self {
            x1: self.x1 - margin,
            y1: self.y1 - margin,
            x2: self.x2 + margin,
            y2: self.y2 + margin,
        }
    }

    pub fn intersects(&self, other: &Roi) -> bool {
        self.x1 < other.x2 && other.x1 < self.x2 && self.y1 < other.y2 && other.y1 < self.y2
    }

    pub fn as_array(&self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// 外部检测器的输出
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq)]
pub struct Detection{
    pub bbox: Roi,
    pub confidence: f32,
}

impl Detection {
    /// 取置信度最高的一个，并列时取先出现的
    pub fn best(detections: &[Detection]) -> Option<Detection> {
        let mut best: Option<Detection> = None;
        for detection in detections.iter(){
            if best.map_or(true, |b| detection.confidence > b.confidence){
                best = Some(*detection);
            }
        }
        best
    }
}
