use ab_glyph::FontArc;
use anyhow::{bail, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::models::measurement::{BottleContour, GeometricMeasurements, RealDimensions, ReferenceObject};
use crate::models::{Detection, MyPoint, Roi};
use crate::recognition::engine::Engine;

const CONTOUR_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const BOUNDING_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const ROTATED_COLOR: Rgb<u8> = Rgb([255, 128, 0]);
const DETECTION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const REFERENCE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const PANEL_WIDTH: i32 = 350;
const LINE_HEIGHT: i32 = 20;

static FONT_BYTES: &[u8] = include_bytes!("../../fonts/DejaVuSans.ttf");

/// 内置字体，配置里没指定 font_path 时使用
pub fn builtin_font() -> Result<FontArc> {
    FontArc::try_from_slice(FONT_BYTES).context("parse built-in font")
}

/// 需要画到图上的东西
pub struct Overlay<'a> {
    pub detection: &'a Detection,
    pub contour: &'a BottleContour,
    pub measurements: &'a GeometricMeasurements,
    pub real: &'a RealDimensions,
    pub reference: Option<&'a ReferenceObject>,
}

pub trait Annotate {
    /// 在原图副本上画检测框、轮廓、中心点和信息面板，原图不动
    fn annotate(&self, img: &RgbImage, overlay: &Overlay) -> Result<RgbImage>;
}

impl Annotate for Engine {
    fn annotate(&self, img: &RgbImage, overlay: &Overlay) -> Result<RgbImage> {
        render_overlay(img, overlay, self.font())
    }
}

pub fn render_overlay(img: &RgbImage, overlay: &Overlay, font: &FontArc) -> Result<RgbImage> {
    if img.width() == 0 || img.height() == 0 {
        bail!("cannot annotate empty image");
    }
    if overlay.contour.len() < 2 {
        bail!("contour has {} points, nothing to draw", overlay.contour.len());
    }
    let mut rendering = img.clone();

    draw_detection(&mut rendering, overlay.detection, font);
    if let Some(reference) = overlay.reference {
        draw_box(&mut rendering, &reference.bbox, REFERENCE_COLOR);
        let label = format!("Ref: {:.1} px/cm", reference.ppm);
        draw_text_mut(&mut rendering, REFERENCE_COLOR, reference.bbox.x1, reference.bbox.y1 - 18, 14.0, font, &label);
    }
    draw_contour(&mut rendering, overlay.contour);

    let m = overlay.measurements;
    let bounding = Roi::new(m.bounding.x, m.bounding.y, m.bounding.x + m.bounding.w, m.bounding.y + m.bounding.h);
    draw_box(&mut rendering, &bounding, BOUNDING_COLOR);
    draw_polygon(&mut rendering, &m.rotated_rect.corners, ROTATED_COLOR);
    draw_centers(&mut rendering, m, font);
    draw_info_panel(&mut rendering, overlay, font);
    Ok(rendering)
}

/// 两像素宽的空心框，宽或高为0时不画
fn draw_box(img: &mut RgbImage, roi: &Roi, color: Rgb<u8>) {
    for inset in 0..2 {
        let (w, h) = (roi.width() - 2 * inset, roi.height() - 2 * inset);
        if w <= 0 || h <= 0 {
            break;
        }
        draw_hollow_rect_mut(img, Rect::at(roi.x1 + inset, roi.y1 + inset).of_size(w as u32, h as u32), color);
    }
}

fn draw_polygon(img: &mut RgbImage, corners: &[MyPoint], color: Rgb<u8>) {
    let n = corners.len();
    for i in 0..n {
        let (a, b) = (corners[i], corners[(i + 1) % n]);
        draw_line_segment_mut(img, (a.x as f32, a.y as f32), (b.x as f32, b.y as f32), color);
    }
}

fn draw_contour(img: &mut RgbImage, contour: &BottleContour) {
    let points = contour.points();
    let n = points.len();
    for i in 0..n {
        let (a, b) = (points[i], points[(i + 1) % n]);
        // 加粗
        for (dx, dy) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)] {
            draw_line_segment_mut(
                img,
                (a.x as f32 + dx, a.y as f32 + dy),
                (b.x as f32 + dx, b.y as f32 + dy),
                CONTOUR_COLOR,
            );
        }
    }
}

fn draw_detection(img: &mut RgbImage, detection: &Detection, font: &FontArc) {
    draw_box(img, &detection.bbox, DETECTION_COLOR);
    let label = format!("Bottle: {:.2}", detection.confidence);
    let (x, y) = (detection.bbox.x1, detection.bbox.y1);
    draw_filled_rect_mut(img, Rect::at(x, y - 22).of_size(110, 22), DETECTION_COLOR);
    draw_text_mut(img, Rgb([0, 0, 0]), x + 2, y - 20, 16.0, font, &label);
}

fn draw_centers(img: &mut RgbImage, m: &GeometricMeasurements, font: &FontArc) {
    let centers = [
        ("bou", m.centers.bounding, Rgb([0, 0, 255])),
        ("cen", m.centers.centroid, Rgb([0, 255, 0])),
        ("cir", m.centers.circle, Rgb([255, 0, 0])),
        ("ell", m.centers.ellipse, Rgb([0, 255, 255])),
    ];
    for (name, center, color) in centers {
        draw_filled_circle_mut(img, (center.x, center.y), 3, color);
        draw_text_mut(img, color, center.x + 5, center.y - 12, 11.0, font, name);
    }
}

/// 外接框上方的黑底白框面板
fn draw_info_panel(img: &mut RgbImage, overlay: &Overlay, font: &FontArc) {
    let real = overlay.real;
    let m = overlay.measurements;
    let lines = [
        format!("Measured: {:.1}cm x {:.1}cm", real.real_height_cm, real.real_diameter_cm),
        format!("Volume: {:.0}mL", real.estimated_volume_ml),
        format!("Confidence: {:.1}%", real.confidence_percent),
        format!("Solidity: {:.2}", m.solidity),
        format!("Aspect: {:.2}", m.aspect_ratio),
        format!("Scale: {:.1} px/cm", real.estimated_scale),
    ];
    let panel_height = lines.len() as i32 * LINE_HEIGHT + 20;
    let (x, y) = (m.bounding.x, m.bounding.y);
    let top = y - panel_height - 10;
    let panel = Rect::at(x, top).of_size(PANEL_WIDTH as u32, (panel_height + 5) as u32);
    draw_filled_rect_mut(img, panel, Rgb([0, 0, 0]));
    draw_box(img, &Roi::new(x, top, x + PANEL_WIDTH, y - 5), Rgb([255, 255, 255]));
    for (i, line) in lines.iter().enumerate() {
        draw_text_mut(img, Rgb([255, 255, 255]), x + 5, top + 12 + i as i32 * LINE_HEIGHT, 15.0, font, line);
    }
}
