/// Draw numbered bounding boxes on a frame for the live view.
///
/// Each control gets a colour-coded rectangle (by kind) and its per-frame
/// id stamped above the top-left corner, so what the operator sees lines up
/// with the id list the model was given.
use image::RgbaImage;

use crate::perception::types::{Control, ControlKind};

const ICON_COLOUR: [u8; 4] = [255, 170, 0, 220];
const TEXT_COLOUR: [u8; 4] = [68, 200, 255, 220];
pub const MARKER_COLOUR: [u8; 4] = [255, 40, 40, 255];

fn kind_colour(kind: ControlKind) -> [u8; 4] {
    match kind {
        ControlKind::Icon => ICON_COLOUR,
        ControlKind::Text => TEXT_COLOUR,
    }
}

pub fn annotate(frame: &RgbaImage, controls: &[Control]) -> RgbaImage {
    let mut canvas = frame.clone();
    let (w, h) = canvas.dimensions();

    // Labels stay legible on the downscaled live view of large captures.
    let label_scale: u32 = if w > 1600 { 2 } else { 1 };
    let box_thickness: i32 = if w > 1600 { 3 } else { 2 };

    for control in controls {
        let [x1n, y1n, x2n, y2n] = control.bbox;
        let x1 = (x1n * w as f64).round() as i32;
        let y1 = (y1n * h as f64).round() as i32;
        let x2 = (x2n * w as f64).round() as i32;
        let y2 = (y2n * h as f64).round() as i32;

        let col = kind_colour(control.kind);
        draw_rect(&mut canvas, x1, y1, x2, y2, col, box_thickness);

        let label = control.id.to_string();
        let label_h_px = (5 * label_scale + 4 * label_scale) as i32;
        draw_label(&mut canvas, x1.max(0), (y1 - label_h_px).max(0), &label, col, label_scale);
    }
    canvas
}

/// Ring marking where a click is about to land.
pub fn draw_marker(canvas: &mut RgbaImage, cx: i32, cy: i32, radius: i32) {
    let (w, h) = canvas.dimensions();
    let outer = radius * radius;
    let inner = (radius - 3).max(0).pow(2);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let d = dx * dx + dy * dy;
            if d > outer || d < inner {
                continue;
            }
            let (x, y) = (cx + dx, cy + dy);
            if x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h {
                set_pixel(canvas, x as u32, y as u32, MARKER_COLOUR);
            }
        }
    }
}

// ── Drawing primitives ──────────────────────────────────────────────────────

fn draw_rect(canvas: &mut RgbaImage, x1: i32, y1: i32, x2: i32, y2: i32, col: [u8; 4], thickness: i32) {
    let (w, h) = canvas.dimensions();
    let (iw, ih) = (w as i32, h as i32);
    let mut plot = |x: i32, y: i32| {
        if x >= 0 && x < iw && y >= 0 && y < ih {
            set_pixel(canvas, x as u32, y as u32, col);
        }
    };

    for t in 0..thickness {
        for x in x1..=x2 {
            plot(x, y1 + t);
            plot(x, y2 - t);
        }
        for y in y1..=y2 {
            plot(x1 + t, y);
            plot(x2 - t, y);
        }
    }
}

fn draw_label(canvas: &mut RgbaImage, x: i32, y: i32, text: &str, col: [u8; 4], scale: u32) {
    let (w, h) = canvas.dimensions();
    let step = 5 * scale + scale;
    let pad = 2 * scale;
    let label_w = text.len() as u32 * step + pad * 2;
    let label_h = 5 * scale + pad * 2;

    // Darken the backdrop so digits read on any background.
    for dy in 0..label_h {
        for dx in 0..label_w {
            let (px, py) = (x as u32 + dx, y as u32 + dy);
            if px < w && py < h {
                let p = canvas.get_pixel_mut(px, py);
                p[0] /= 5;
                p[1] /= 5;
                p[2] /= 5;
                p[3] = 255;
            }
        }
    }

    for (i, c) in text.chars().enumerate() {
        let gx = x as u32 + pad + i as u32 * step;
        if gx + 5 * scale >= w {
            break;
        }
        draw_digit(canvas, c, gx, y as u32 + pad, col, scale);
    }
}

fn draw_digit(canvas: &mut RgbaImage, c: char, px: u32, py: u32, col: [u8; 4], scale: u32) {
    let Some(glyph) = c.to_digit(10).map(|d| DIGITS[d as usize]) else {
        return;
    };
    let (w, h) = canvas.dimensions();
    for (row, bits) in glyph.iter().enumerate() {
        for bit in 0..5u32 {
            if (bits >> (4 - bit)) & 1 == 0 {
                continue;
            }
            for sy in 0..scale {
                for sx in 0..scale {
                    let x = px + bit * scale + sx;
                    let y = py + row as u32 * scale + sy;
                    if x < w && y < h {
                        set_pixel(canvas, x, y, col);
                    }
                }
            }
        }
    }
}

fn set_pixel(canvas: &mut RgbaImage, x: u32, y: u32, col: [u8; 4]) {
    let p = canvas.get_pixel_mut(x, y);
    let a = col[3] as f32 / 255.0;
    for i in 0..3 {
        p[i] = (p[i] as f32 * (1.0 - a) + col[i] as f32 * a).round() as u8;
    }
    p[3] = 255;
}

/// 5×5 bitmap digits, MSB = leftmost column.
const DIGITS: [[u8; 5]; 10] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110],
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110],
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111],
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110],
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010],
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110],
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110],
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100],
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110],
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110],
];
