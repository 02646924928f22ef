use crate::data::{InferenceOutcome, Landmark, HAND_CONNECTIONS};
use crate::display::{GestureSummary, ResultDisplay};
use image::{imageops, Rgba, RgbImage, RgbaImage};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    pub color: [u8; 4],
    pub line_width: u32,
}

pub const CONNECTOR_STYLE: Style = Style {
    color: [0, 255, 0, 255],
    line_width: 5,
};

pub const LANDMARK_STYLE: Style = Style {
    color: [255, 0, 0, 255],
    line_width: 2,
};

pub trait Surface {
    /// Resizing discards all prior content.
    fn resize(&mut self, width: u32, height: u32);
    fn clear(&mut self);
    fn draw_line(&mut self, from: Point, to: Point, style: Style);
    fn draw_point(&mut self, at: Point, style: Style);
    fn dimensions(&self) -> (u32, u32);
}

pub fn mirror_x(landmark: &Landmark) -> Landmark {
    Landmark {
        x: 1.0 - landmark.x,
        ..*landmark
    }
}

/// Mapping shared by the video layer and the overlay layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewTransform {
    pub mirrored: bool,
}

impl ViewTransform {
    pub fn map(&self, landmark: &Landmark, width: u32, height: u32) -> Point {
        let lm = if self.mirrored {
            mirror_x(landmark)
        } else {
            *landmark
        };
        Point {
            x: lm.x * width as f32,
            y: lm.y * height as f32,
        }
    }

    pub fn present(&self, video: &RgbImage) -> RgbImage {
        if self.mirrored {
            imageops::flip_horizontal(video)
        } else {
            video.clone()
        }
    }
}

pub struct OverlayRenderer<S> {
    surface: S,
    transform: ViewTransform,
}

impl<S: Surface> OverlayRenderer<S> {
    pub fn new(surface: S, transform: ViewTransform) -> Self {
        Self { surface, transform }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn transform(&self) -> ViewTransform {
        self.transform
    }

    /// Resizing clears the surface, so nothing from an earlier tick survives.
    pub fn tick(
        &mut self,
        dimensions: (u32, u32),
        outcome: Option<&InferenceOutcome>,
        display: &mut dyn ResultDisplay,
    ) {
        let (width, height) = dimensions;
        self.surface.resize(width, height);
        let Some(outcome) = outcome else {
            display.show(None);
            return;
        };
        for hand in &outcome.landmarks {
            for &(a, b) in HAND_CONNECTIONS.iter() {
                if let (Some(a), Some(b)) = (hand.get(a), hand.get(b)) {
                    let from = self.transform.map(a, width, height);
                    let to = self.transform.map(b, width, height);
                    self.surface.draw_line(from, to, CONNECTOR_STYLE);
                }
            }
            for landmark in hand {
                let at = self.transform.map(landmark, width, height);
                self.surface.draw_point(at, LANDMARK_STYLE);
            }
        }
        let summary = outcome.result.as_ref().map(GestureSummary::from);
        display.show(summary.as_ref());
    }

    pub fn clear(&mut self) {
        self.surface.clear();
    }
}

#[derive(Debug, Clone)]
pub struct ImageSurface {
    canvas: RgbaImage,
}

impl Default for ImageSurface {
    fn default() -> Self {
        Self {
            canvas: RgbaImage::new(0, 0),
        }
    }
}

impl ImageSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn is_blank(&self) -> bool {
        self.canvas.pixels().all(|p| p.0[3] == 0)
    }

    fn stamp(&mut self, cx: f32, cy: f32, radius: f32, color: Rgba<u8>) {
        if !cx.is_finite() || !cy.is_finite() {
            return;
        }
        let (w, h) = self.canvas.dimensions();
        let r = radius.max(0.5);
        let x0 = (cx - r).floor().max(0.0) as i64;
        let y0 = (cy - r).floor().max(0.0) as i64;
        let x1 = ((cx + r).ceil() as i64).min(w as i64 - 1);
        let y1 = ((cy + r).ceil() as i64).min(h as i64 - 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let (dx, dy) = (x as f32 + 0.5 - cx, y as f32 + 0.5 - cy);
                if dx * dx + dy * dy <= r * r {
                    self.canvas.put_pixel(x as u32, y as u32, color);
                }
            }
        }
    }

    /// Overlay drawn over `video`, which must already be presented.
    pub fn composite(&self, video: &RgbImage) -> RgbImage {
        let mut out = video.clone();
        for (x, y, px) in out.enumerate_pixels_mut() {
            if x >= self.canvas.width() || y >= self.canvas.height() {
                continue;
            }
            let over = self.canvas.get_pixel(x, y).0;
            let alpha = over[3] as u32;
            if alpha == 0 {
                continue;
            }
            for c in 0..3 {
                px.0[c] = ((over[c] as u32 * alpha + px.0[c] as u32 * (255 - alpha)) / 255) as u8;
            }
        }
        out
    }
}

/// Part of the segment inside `bounds` (Liang-Barsky).
fn clip(from: Point, to: Point, bounds: (Point, Point)) -> Option<(Point, Point)> {
    let (min, max) = bounds;
    let (x0, y0) = (from.x as f64, from.y as f64);
    let (dx, dy) = (to.x as f64 - x0, to.y as f64 - y0);
    if !(x0.is_finite() && y0.is_finite() && dx.is_finite() && dy.is_finite()) {
        return None;
    }
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [
        (-dx, x0 - min.x as f64),
        (dx, max.x as f64 - x0),
        (-dy, y0 - min.y as f64),
        (dy, max.y as f64 - y0),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else if p < 0.0 {
            t0 = t0.max(q / p);
        } else {
            t1 = t1.min(q / p);
        }
    }
    if t0 > t1 {
        return None;
    }
    let at = |t: f64| Point {
        x: (x0 + dx * t) as f32,
        y: (y0 + dy * t) as f32,
    };
    Some((at(t0), at(t1)))
}

impl Surface for ImageSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.canvas = RgbaImage::new(width, height);
    }

    fn clear(&mut self) {
        for px in self.canvas.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
    }

    fn draw_line(&mut self, from: Point, to: Point, style: Style) {
        let (w, h) = self.canvas.dimensions();
        let radius = style.line_width as f32 / 2.0;
        let bounds = (
            Point {
                x: -radius,
                y: -radius,
            },
            Point {
                x: w as f32 + radius,
                y: h as f32 + radius,
            },
        );
        let Some((from, to)) = clip(from, to, bounds) else {
            return;
        };
        let (dx, dy) = (to.x - from.x, to.y - from.y);
        let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as u32;
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            self.stamp(from.x + dx * t, from.y + dy * t, radius, Rgba(style.color));
        }
    }

    fn draw_point(&mut self, at: Point, style: Style) {
        self.stamp(at.x, at.y, style.line_width as f32 + 1.0, Rgba(style.color));
    }

    fn dimensions(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }
}
