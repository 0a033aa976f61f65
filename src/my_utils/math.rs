use imageproc::point::Point;

use crate::models::measurement::BoundingRect;

/// 多边形的零阶到二阶原点矩，按格林公式对闭合轮廓求积
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Moments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
    pub m20: f64,
    pub m11: f64,
    pub m02: f64,
}

impl Moments {
    /// 质心，m00为0时没有定义
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.m00 == 0.0 {
            return None;
        }
        Some((self.m10 / self.m00, self.m01 / self.m00))
    }

    /// 归一化二阶中心矩 (mu20, mu11, mu02)
    pub fn central_second_order(&self) -> Option<(f64, f64, f64)> {
        let (cx, cy) = self.centroid()?;
        Some((
            self.m20 / self.m00 - cx * cx,
            self.m11 / self.m00 - cx * cy,
            self.m02 / self.m00 - cy * cy,
        ))
    }
}

pub fn polygon_moments(points: &[Point<i32>]) -> Moments {
    let mut m = Moments::default();
    let n = points.len();
    if n < 3 {
        return m;
    }
    for i in 0..n {
        let p = points[i];
        let q = points[(i + 1) % n];
        let (x0, y0, x1, y1) = (p.x as f64, p.y as f64, q.x as f64, q.y as f64);
        let a = x0 * y1 - x1 * y0;
        m.m00 += a;
        m.m10 += a * (x0 + x1);
        m.m01 += a * (y0 + y1);
        m.m20 += a * (x0 * x0 + x0 * x1 + x1 * x1);
        m.m02 += a * (y0 * y0 + y0 * y1 + y1 * y1);
        m.m11 += a * (x0 * y1 + 2.0 * x0 * y0 + 2.0 * x1 * y1 + x1 * y0);
    }
    m.m00 /= 2.0;
    m.m10 /= 6.0;
    m.m01 /= 6.0;
    m.m20 /= 12.0;
    m.m02 /= 12.0;
    m.m11 /= 24.0;
    // 顺时针轮廓面积为负，统一翻成正的
    if m.m00 < 0.0 {
        m = Moments {
            m00: -m.m00,
            m10: -m.m10,
            m01: -m.m01,
            m20: -m.m20,
            m11: -m.m11,
            m02: -m.m02,
        };
    }
    m
}

/// 鞋带公式求多边形面积
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    polygon_moments(points).m00
}

/// 用二阶矩拟合等效椭圆，返回 (中心, 长轴, 短轴, 角度)
/// 实心椭圆的协方差特征值为 a²/4，所以全轴长是 4√λ
pub fn ellipse_from_moments(m: &Moments) -> Option<((f64, f64), f64, f64, f64)> {
    let center = m.centroid()?;
    let (mu20, mu11, mu02) = m.central_second_order()?;
    let half_diff = (mu20 - mu02) / 2.0;
    let common = (half_diff * half_diff + mu11 * mu11).sqrt();
    let lambda1 = (mu20 + mu02) / 2.0 + common;
    let lambda2 = ((mu20 + mu02) / 2.0 - common).max(0.0);
    if !(lambda1 > 0.0) {
        return None;
    }
    let major = 4.0 * lambda1.sqrt();
    let minor = 4.0 * lambda2.sqrt();
    let angle = (0.5 * (2.0 * mu11).atan2(mu20 - mu02)).to_degrees();
    Some((center, major, minor, angle))
}

/// 欧氏距离
pub fn euclidean_distance(point1: (f64, f64), point2: (f64, f64)) -> f64 {
    let dx = point2.0 - point1.0;
    let dy = point2.1 - point1.1;

    (dx.powi(2) + dy.powi(2)).sqrt()
}

fn circle_from_two(a: (f64, f64), b: (f64, f64)) -> ((f64, f64), f64) {
    let center = ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0);
    (center, euclidean_distance(a, b) / 2.0)
}

fn circle_from_three(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> ((f64, f64), f64) {
    let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
    if d.abs() < 1e-12 {
        // 三点共线，取最远的两点
        let candidates = [circle_from_two(a, b), circle_from_two(a, c), circle_from_two(b, c)];
        return candidates
            .into_iter()
            .fold(((0.0, 0.0), -1.0), |best, c| if c.1 > best.1 { c } else { best });
    }
    let a2 = a.0 * a.0 + a.1 * a.1;
    let b2 = b.0 * b.0 + b.1 * b.1;
    let c2 = c.0 * c.0 + c.1 * c.1;
    let ux = (a2 * (b.1 - c.1) + b2 * (c.1 - a.1) + c2 * (a.1 - b.1)) / d;
    let uy = (a2 * (c.0 - b.0) + b2 * (a.0 - c.0) + c2 * (b.0 - a.0)) / d;
    ((ux, uy), euclidean_distance((ux, uy), a))
}

fn in_circle(circle: &((f64, f64), f64), p: (f64, f64)) -> bool {
    euclidean_distance(circle.0, p) <= circle.1 + 1e-7
}

/// 最小外接圆，增量法，按输入顺序处理保证结果确定
/// 传凸包点进来更快
pub fn min_enclosing_circle(points: &[Point<i32>]) -> ((f64, f64), f64) {
    let pts: Vec<(f64, f64)> = points.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    if pts.is_empty() {
        return ((0.0, 0.0), 0.0);
    }
    let mut circle = (pts[0], 0.0);
    for i in 1..pts.len() {
        if in_circle(&circle, pts[i]) {
            continue;
        }
        circle = (pts[i], 0.0);
        for j in 0..i {
            if in_circle(&circle, pts[j]) {
                continue;
            }
            circle = circle_from_two(pts[i], pts[j]);
            for k in 0..j {
                if !in_circle(&circle, pts[k]) {
                    circle = circle_from_three(pts[i], pts[j], pts[k]);
                }
            }
        }
    }
    circle
}

/// 轴对齐外接框，宽高按像素个数算（和OpenCV boundingRect一致）
pub fn bounding_rect(points: &[Point<i32>]) -> BoundingRect {
    if points.is_empty() {
        return BoundingRect { x: 0, y: 0, w: 0, h: 0 };
    }
    let mut minx = i32::MAX;
    let mut maxx = i32::MIN;
    let mut miny = i32::MAX;
    let mut maxy = i32::MIN;
    for point in points {
        minx = minx.min(point.x);
        maxx = maxx.max(point.x);
        miny = miny.min(point.y);
        maxy = maxy.max(point.y);
    }
    BoundingRect { x: minx, y: miny, w: maxx - minx + 1, h: maxy - miny + 1 }
}

/// 四舍五入到指定小数位
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
