use std::io::Cursor;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{GrayImage, ImageBuffer, ImageFormat, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::integral_image::{integral_image, sum_image_pixels};
use imageproc::point::Point;

use crate::error::AnalysisError;
use crate::models::Roi;

/// base64转图片，兼容 data:image/png;base64, 前缀
pub fn trans_base64_to_image(base64_image: &str) -> Result<RgbImage, AnalysisError> {
    let data = match base64_image.find(',') {
        Some(index) if base64_image.starts_with("data:") => &base64_image[index + 1..],
        _ => base64_image,
    };
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| AnalysisError::InputDecode(e.to_string()))?;
    let image = image::load_from_memory(&bytes).map_err(|e| AnalysisError::InputDecode(e.to_string()))?;
    Ok(image.to_rgb8())
}

/// 图片转png的data uri
pub fn image_to_base64(img: &RgbImage) -> Result<String> {
    let mut image_data: Vec<u8> = Vec::new();
    img.write_to(&mut Cursor::new(&mut image_data), ImageFormat::Png)
        .map_err(|e| anyhow!("Encode Image to Base64 Failed: {e}"))?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(image_data)))
}

/// 截取ROI，调用方保证roi已经裁到图片范围内且非空
pub fn crop_image(input_image: &RgbImage, roi: &Roi) -> RgbImage {
    image::imageops::crop_imm(
        input_image,
        roi.x1 as u32,
        roi.y1 as u32,
        roi.width() as u32,
        roi.height() as u32,
    )
    .to_image()
}

/// 二值化，foreground_bright为true时亮的是前景
pub fn binarize(img: &GrayImage, level: u8, foreground_bright: bool) -> GrayImage {
    let mut out = img.clone();
    out.enumerate_pixels_mut().for_each(|(_, _, pixel)| {
        let bright = pixel[0] > level;
        *pixel = if bright == foreground_bright { Luma([255u8]) } else { Luma([0u8]) };
    });
    out
}

/// 根据边框像素判断前景是亮还是暗，边框多数像素要落在背景上
/// 调用方传进来的区域要比物体大一圈，见 ContourArgs::roi_padding
pub fn foreground_is_bright(img: &GrayImage, level: u8) -> bool {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return true;
    }
    let mut bright = 0u64;
    let mut total = 0u64;
    let mut count = |x: u32, y: u32| {
        total += 1;
        if img.get_pixel(x, y)[0] > level {
            bright += 1;
        }
    };
    for x in 0..w {
        count(x, 0);
        count(x, h - 1);
    }
    for y in 0..h {
        count(0, y);
        count(w - 1, y);
    }
    // 边框偏暗说明背景暗，前景亮
    bright * 2 <= total
}

/// 局部自适应阈值：和邻域均值的差超过offset才算前景
/// 和 OpenCV 的 ADAPTIVE_THRESH_MEAN_C + THRESH_BINARY 不同：那边 value > mean - C，
/// 平坦区域整片都会被选中；这里要求比均值亮(或暗)过offset，平坦区域不选，
/// 只留下物体边缘内侧的一圈，实心部分交给 Otsu
pub fn adaptive_threshold(img: &GrayImage, block_radius: u32, offset: i32, foreground_bright: bool) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut out: GrayImage = ImageBuffer::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }
    let integral: ImageBuffer<Luma<i64>, Vec<i64>> = integral_image(img);
    for y in 0..h {
        for x in 0..w {
            let left = x.saturating_sub(block_radius);
            let top = y.saturating_sub(block_radius);
            let right = (x + block_radius).min(w - 1);
            let bottom = (y + block_radius).min(h - 1);
            let sum = sum_image_pixels(&integral, left, top, right, bottom)[0];
            let num_pixels = ((right - left + 1) * (bottom - top + 1)) as i64;
            let mean = sum / num_pixels;
            let value = img.get_pixel(x, y)[0] as i64;
            let hit = if foreground_bright {
                value > mean + offset as i64
            } else {
                value < mean - offset as i64
            };
            if hit {
                out.put_pixel(x, y, Luma([255u8]));
            }
        }
    }
    out
}

/// 多张二值图逐像素取或
pub fn bitwise_or(images: &[&GrayImage]) -> Option<GrayImage> {
    let first = images.first()?;
    let mut out = (*first).clone();
    for img in images.iter().skip(1) {
        if img.dimensions() != out.dimensions() {
            return None;
        }
        for (dst, src) in out.pixels_mut().zip(img.pixels()) {
            dst[0] = dst[0].max(src[0]);
        }
    }
    Some(out)
}

/// 只取最外层轮廓，相当于 RETR_EXTERNAL，顺序为扫描到的先后
pub fn find_external_contours(bin: &GrayImage) -> Vec<Vec<Point<i32>>> {
    find_contours::<i32>(bin)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| c.points)
        .collect()
}
