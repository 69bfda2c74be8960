// Coordinate mapping between detector space (normalised 0–1), screenshot
// pixel space and the injection space the input driver clicks in.

/// Normalised bounding box `[x1, y1, x2, y2]`, each component in `0.0..=1.0`.
pub type NormalizedBox = [f64; 4];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// A point in screenshot pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Integer coordinates relative to the session window, ready for injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectionPoint {
    pub x: i32,
    pub y: i32,
}

pub fn denormalize(bbox: &NormalizedBox, width: u32, height: u32) -> PixelBox {
    let (w, h) = (width as f64, height as f64);
    PixelBox {
        x1: bbox[0] * w,
        y1: bbox[1] * h,
        x2: bbox[2] * w,
        y2: bbox[3] * h,
    }
}

pub fn center(b: &PixelBox) -> Point {
    Point {
        x: (b.x1 + b.x2) / 2.0,
        y: (b.y1 + b.y2) / 2.0,
    }
}

/// Inverts the capture-time upscale. Truncates toward zero.
pub fn to_injection_space(point: Point, display_scale: f64) -> InjectionPoint {
    InjectionPoint {
        x: (point.x / display_scale) as i32,
        y: (point.y / display_scale) as i32,
    }
}

/// Size of the live view for a frame of `width`×`height`.
pub fn view_size(width: u32, height: u32, display_scale: f64) -> (u32, u32) {
    (
        ((width as f64 / display_scale) as u32).max(1),
        ((height as f64 / display_scale) as u32).max(1),
    )
}

/// Screenshot-space point → live-view pixel.
pub fn to_view_space(point: Point, display_scale: f64) -> (i32, i32) {
    let p = to_injection_space(point, display_scale);
    (p.x, p.y)
}
