use image::{Rgba, RgbaImage};

use crate::{
    math::{vec2, Vec2f},
    render::{Composite, LineCap, LineJoin, StrokeStyle, Surface},
    stroke::Color,
};

/// [`Surface`] over an RGBA image with straight alpha.
///
/// Coverage is the largest anti-aliased signed-distance value over the pieces of a stroke
/// (segment bodies, caps and joins) at each pixel center.
pub struct Raster {
    image: RgbaImage,
    subpaths: Vec<Vec<Vec2f>>,
}

impl Raster {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            subpaths: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Copy of the current pixels, for export.
    pub fn snapshot(&self) -> RgbaImage {
        self.image.clone()
    }

    /// Replaces the pixel buffer with an empty one of the new size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::new(width, height);
    }

    fn composite(&mut self, mask: &Mask, color: Color, composite: Composite) {
        let (w, h) = (self.image.width() as i32, self.image.height() as i32);
        for my in 0..mask.height {
            let y = mask.top + my as i32;
            if y < 0 || y >= h {
                continue;
            }
            for mx in 0..mask.width {
                let x = mask.left + mx as i32;
                if x < 0 || x >= w {
                    continue;
                }
                let alpha = mask.data[my * mask.width + mx];
                if alpha <= 0.0 {
                    continue;
                }
                let dst = self.image.get_pixel_mut(x as u32, y as u32);
                match composite {
                    Composite::SourceOver => source_over(dst, color, alpha),
                    Composite::DestinationOut => destination_out(dst, alpha),
                }
            }
        }
    }
}

impl Surface for Raster {
    fn clear(&mut self) {
        for px in self.image.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
        self.subpaths.clear();
    }

    fn begin_path(&mut self) {
        self.subpaths.clear();
    }

    fn move_to(&mut self, p: Vec2f) {
        self.subpaths.push(vec![p]);
    }

    fn line_to(&mut self, p: Vec2f) {
        match self.subpaths.last_mut() {
            Some(subpath) => subpath.push(p),
            None => self.subpaths.push(vec![p]),
        }
    }

    fn stroke(&mut self, style: &StrokeStyle) {
        if self.subpaths.is_empty() || style.width <= 0.0 {
            return;
        }

        let sigma = style.shadow.map_or(0.0, |shadow| shadow.blur / 2.0);
        let radius = box_radius(sigma);
        // Three box passes spread coverage by up to `3 * radius` pixels, so nothing further
        // off-canvas than that can reach a visible pixel.
        let spill = 3 * radius as i32 + 1;
        let margin = style.width / 2.0 + 2.0 + spill as f32;

        let (mut min, mut max) = (vec2(f32::MAX, f32::MAX), vec2(f32::MIN, f32::MIN));
        for p in self.subpaths.iter().flatten() {
            min = vec2(min.x().min(p.x()), min.y().min(p.y()));
            max = vec2(max.x().max(p.x()), max.y().max(p.y()));
        }
        let left = ((min.x() - margin).floor() as i32).max(-spill);
        let top = ((min.y() - margin).floor() as i32).max(-spill);
        let right = ((max.x() + margin).ceil() as i32).min(self.width() as i32 + spill);
        let bottom = ((max.y() + margin).ceil() as i32).min(self.height() as i32 + spill);
        if right <= left || bottom <= top {
            return;
        }

        let mut mask = Mask::new(left, top, right, bottom);
        for subpath in &self.subpaths {
            stroke_subpath(&mut mask, subpath, style);
        }

        if let Some(shadow) = style.shadow {
            let blurred = mask.blurred(radius);
            self.composite(&blurred, shadow.color, style.composite);
        }
        self.composite(&mask, style.color, style.composite);
    }
}

/// Maps a signed distance to the outline (positive inside) to pixel coverage.
fn aa(signed_distance: f32) -> f32 {
    (signed_distance + 0.5).clamp(0.0, 1.0)
}

fn cross(a: Vec2f, b: Vec2f) -> f32 {
    a.x() * b.y() - a.y() * b.x()
}

fn dot(a: Vec2f, b: Vec2f) -> f32 {
    a.x() * b.x() + a.y() * b.y()
}

/// Per-pixel coverage over a rectangle of the canvas. `left`/`top` may be negative.
struct Mask {
    left: i32,
    top: i32,
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Mask {
    fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        let width = (right - left) as usize;
        let height = (bottom - top) as usize;
        Self {
            left,
            top,
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    /// Evaluates `coverage` at every pixel center within `min..=max` and keeps the maximum.
    fn splat(&mut self, min: Vec2f, max: Vec2f, coverage: impl Fn(Vec2f) -> f32) {
        let x0 = (min.x().floor() as i32 - self.left).max(0) as usize;
        let y0 = (min.y().floor() as i32 - self.top).max(0) as usize;
        let x1 = ((max.x().ceil() as i32 - self.left + 1).max(0) as usize).min(self.width);
        let y1 = ((max.y().ceil() as i32 - self.top + 1).max(0) as usize).min(self.height);
        for my in y0..y1 {
            for mx in x0..x1 {
                let p = vec2(
                    (self.left + mx as i32) as f32 + 0.5,
                    (self.top + my as i32) as f32 + 0.5,
                );
                let cov = coverage(p);
                let slot = &mut self.data[my * self.width + mx];
                if cov > *slot {
                    *slot = cov;
                }
            }
        }
    }

    fn disc(&mut self, center: Vec2f, radius: f32) {
        let r = vec2(radius + 1.0, radius + 1.0);
        self.splat(center - r, center + r, |p| aa(radius - p.dist(center)));
    }

    fn square(&mut self, center: Vec2f, half: f32) {
        let r = vec2(half + 1.0, half + 1.0);
        self.splat(center - r, center + r, |p| {
            let d = p - center;
            aa(half - d.x().abs()).min(aa(half - d.y().abs()))
        });
    }

    /// Straight segment body of half-width `half`, extended past `a` and `b` by the given amounts.
    fn segment(&mut self, a: Vec2f, b: Vec2f, half: f32, ext_a: f32, ext_b: f32) {
        let len = a.dist(b);
        if len == 0.0 {
            return;
        }
        let dir = (b - a) / len;
        let pad = half + ext_a.max(ext_b) + 1.0;
        let min = vec2(a.x().min(b.x()) - pad, a.y().min(b.y()) - pad);
        let max = vec2(a.x().max(b.x()) + pad, a.y().max(b.y()) + pad);
        self.splat(min, max, |p| {
            let rel = p - a;
            let along = dot(rel, dir);
            let across = cross(dir, rel).abs();
            let along_inside = (along + ext_a).min(len + ext_b - along);
            aa(half - across).min(aa(along_inside))
        });
    }

    fn triangle(&mut self, a: Vec2f, b: Vec2f, c: Vec2f) {
        let (b, c) = if cross(b - a, c - a) < 0.0 { (c, b) } else { (b, c) };
        let edges = [(a, b), (b, c), (c, a)];
        if edges.iter().any(|&(p, q)| p.dist(q) == 0.0) {
            return;
        }
        let min = vec2(a.x().min(b.x()).min(c.x()) - 1.0, a.y().min(b.y()).min(c.y()) - 1.0);
        let max = vec2(a.x().max(b.x()).max(c.x()) + 1.0, a.y().max(b.y()).max(c.y()) + 1.0);
        self.splat(min, max, |p| {
            let inside = edges
                .iter()
                .map(|&(from, to)| cross(to - from, p - from) / from.dist(to))
                .fold(f32::MAX, f32::min);
            aa(inside)
        });
    }

    /// Applies three horizontal and vertical box blur passes of the given radius.
    fn blurred(&self, radius: usize) -> Mask {
        let mut out = Mask {
            left: self.left,
            top: self.top,
            width: self.width,
            height: self.height,
            data: self.data.clone(),
        };
        if radius == 0 {
            return out;
        }
        let mut scratch = vec![0.0; self.width.max(self.height)];
        for _ in 0..3 {
            for y in 0..out.height {
                let row = y * out.width;
                box_blur_line(&mut out.data, row, 1, out.width, radius, &mut scratch);
            }
            for x in 0..out.width {
                box_blur_line(&mut out.data, x, out.width, out.height, radius, &mut scratch);
            }
        }
        out
    }
}

/// Box radius whose triple application approximates a Gaussian of standard deviation `sigma`.
fn box_radius(sigma: f32) -> usize {
    if sigma <= 0.0 {
        return 0;
    }
    let width = (12.0 * sigma * sigma / 3.0 + 1.0).sqrt();
    ((width - 1.0) / 2.0).round().max(1.0) as usize
}

/// Blurs `len` values starting at `start`, `stride` apart. Values outside the line count as 0.
fn box_blur_line(
    data: &mut [f32],
    start: usize,
    stride: usize,
    len: usize,
    radius: usize,
    scratch: &mut [f32],
) {
    let at = |i: usize| start + i * stride;
    let norm = 1.0 / (2 * radius + 1) as f32;
    let mut sum: f32 = (0..radius.min(len)).map(|i| data[at(i)]).sum();
    for i in 0..len {
        if i + radius < len {
            sum += data[at(i + radius)];
        }
        scratch[i] = sum * norm;
        if i >= radius {
            sum -= data[at(i - radius)];
        }
    }
    for i in 0..len {
        data[at(i)] = scratch[i];
    }
}

fn stroke_subpath(mask: &mut Mask, points: &[Vec2f], style: &StrokeStyle) {
    let mut points = points.to_vec();
    points.dedup();
    let half = style.width / 2.0;

    let (first, last) = match (points.first(), points.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return,
    };

    if points.len() == 1 {
        match style.cap {
            LineCap::Round => mask.disc(first, half),
            LineCap::Square => mask.square(first, half),
            LineCap::Butt => {}
        }
        return;
    }

    let cap_ext = if style.cap == LineCap::Square { half } else { 0.0 };
    let segments = points.len() - 1;
    for (i, pair) in points.windows(2).enumerate() {
        let ext_a = if i == 0 { cap_ext } else { 0.0 };
        let ext_b = if i + 1 == segments { cap_ext } else { 0.0 };
        mask.segment(pair[0], pair[1], half, ext_a, ext_b);
    }

    if style.cap == LineCap::Round {
        mask.disc(first, half);
        mask.disc(last, half);
    }

    for triple in points.windows(3) {
        let (prev, at, next) = (triple[0], triple[1], triple[2]);
        match style.join {
            LineJoin::Round => mask.disc(at, half),
            LineJoin::Bevel => {
                let d1 = (at - prev) / prev.dist(at);
                let d2 = (next - at) / at.dist(next);
                let turn = cross(d1, d2);
                if turn == 0.0 {
                    continue;
                }
                // The gap between the two segment bodies is on the outside of the turn.
                let side = if turn > 0.0 { -half } else { half };
                let n1 = vec2(-d1.y(), d1.x()) * side;
                let n2 = vec2(-d2.y(), d2.x()) * side;
                mask.triangle(at, at + n1, at + n2);
            }
        }
    }
}

fn source_over(dst: &mut Rgba<u8>, color: Color, alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    let dst_a = dst[3] as f32 / 255.0;
    let out_a = alpha + dst_a * (1.0 - alpha);
    if out_a <= 0.0 {
        return;
    }
    let blend = |src: u8, dst: u8| {
        let src = src as f32 / 255.0;
        let dst = dst as f32 / 255.0;
        ((src * alpha + dst * dst_a * (1.0 - alpha)) / out_a * 255.0)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    let [r, g, b] = color.0;
    *dst = Rgba([
        blend(r, dst[0]),
        blend(g, dst[1]),
        blend(b, dst[2]),
        (out_a * 255.0).round() as u8,
    ]);
}

fn destination_out(dst: &mut Rgba<u8>, alpha: f32) {
    let keep = 1.0 - alpha.clamp(0.0, 1.0);
    let out_a = (dst[3] as f32 * keep).round() as u8;
    *dst = if out_a == 0 {
        Rgba([0, 0, 0, 0])
    } else {
        Rgba([dst[0], dst[1], dst[2], out_a])
    };
}
