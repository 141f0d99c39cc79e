//! Pixel-level primitives on RGB canvases: rectangles, a 3x5 bitmap font and gradients.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x0: x,
            y0: y,
            x1: x + width,
            y1: y + height,
        }
    }

    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn inset(&self, by: u32) -> Self {
        let by_x = by.min(self.width() / 2);
        let by_y = by.min(self.height() / 2);
        Self {
            x0: self.x0 + by_x,
            y0: self.y0 + by_y,
            x1: self.x1 - by_x,
            y1: self.y1 - by_y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_rgb(self) -> Rgb<u8> {
        Rgb([self.r, self.g, self.b])
    }

    pub fn lerp(self, other: Color, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Self {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColorStop {
    pub at: f32,
    pub color: Color,
}

pub fn sample_gradient(stops: &[ColorStop], value: f32) -> Color {
    let (Some(first), Some(last)) = (stops.first(), stops.last()) else {
        return Color::new(255, 255, 255);
    };
    let value = value.clamp(0.0, 1.0);
    if value <= first.at {
        return first.color;
    }
    for window in stops.windows(2) {
        if let [start, end] = window {
            if value <= end.at {
                let span = (end.at - start.at).max(f32::EPSILON);
                return start.color.lerp(end.color, (value - start.at) / span);
            }
        }
    }
    last.color
}

pub fn put_pixel(image: &mut RgbImage, x: u32, y: u32, color: Color) {
    if x < image.width() && y < image.height() {
        image.put_pixel(x, y, color.to_rgb());
    }
}

pub fn fill_rect(image: &mut RgbImage, rect: Rect, color: Color) {
    let x1 = rect.x1.min(image.width());
    let y1 = rect.y1.min(image.height());
    for y in rect.y0.min(y1)..y1 {
        for x in rect.x0.min(x1)..x1 {
            image.put_pixel(x, y, color.to_rgb());
        }
    }
}

pub fn draw_border(image: &mut RgbImage, rect: Rect, color: Color) {
    if rect.width() == 0 || rect.height() == 0 {
        return;
    }
    let (x0, y0) = (rect.x0, rect.y0);
    let (x1, y1) = (rect.x1 - 1, rect.y1 - 1);
    for x in x0..=x1 {
        put_pixel(image, x, y0, color);
        put_pixel(image, x, y1, color);
    }
    for y in y0..=y1 {
        put_pixel(image, x0, y, color);
        put_pixel(image, x1, y, color);
    }
}

/// Resizes `source` to fit inside `rect` keeping its aspect ratio, centered.
pub fn blit_fit(image: &mut RgbImage, source: &RgbImage, rect: Rect) {
    let (sw, sh) = source.dimensions();
    if sw == 0 || sh == 0 || rect.width() == 0 || rect.height() == 0 {
        return;
    }
    let scale = (rect.width() as f32 / sw as f32).min(rect.height() as f32 / sh as f32);
    let w = ((sw as f32 * scale) as u32).max(1);
    let h = ((sh as f32 * scale) as u32).max(1);
    let resized = if (w, h) == (sw, sh) {
        source.clone()
    } else {
        imageops::resize(source, w, h, FilterType::Triangle)
    };
    let x = rect.x0 + (rect.width() - w) / 2;
    let y = rect.y0 + (rect.height() - h) / 2;
    imageops::replace(image, &resized, x as i64, y as i64);
}

pub const GLYPH_WIDTH: u32 = 3;
pub const GLYPH_HEIGHT: u32 = 5;
const GLYPH_ADVANCE: u32 = 4;

const fn glyph_bits(ch: char) -> [u8; 5] {
    match ch {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b010, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        'A' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'C' => [0b111, 0b100, 0b100, 0b100, 0b111],
        'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'E' => [0b111, 0b100, 0b110, 0b100, 0b111],
        'F' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'G' => [0b111, 0b100, 0b101, 0b101, 0b111],
        'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'J' => [0b111, 0b001, 0b001, 0b101, 0b111],
        'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'M' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'N' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'O' => [0b111, 0b101, 0b101, 0b101, 0b111],
        'P' => [0b111, 0b101, 0b111, 0b100, 0b100],
        'Q' => [0b111, 0b101, 0b101, 0b111, 0b011],
        'R' => [0b111, 0b101, 0b111, 0b110, 0b101],
        'S' => [0b111, 0b100, 0b111, 0b001, 0b111],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'V' => [0b101, 0b101, 0b101, 0b101, 0b010],
        'W' => [0b101, 0b101, 0b111, 0b111, 0b101],
        'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'Y' => [0b101, 0b101, 0b010, 0b010, 0b010],
        'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '+' => [0b000, 0b010, 0b111, 0b010, 0b000],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        ',' => [0b000, 0b000, 0b000, 0b010, 0b100],
        '%' => [0b101, 0b001, 0b010, 0b100, 0b101],
        '/' => [0b001, 0b001, 0b010, 0b100, 0b100],
        '(' => [0b001, 0b010, 0b010, 0b010, 0b001],
        ')' => [0b100, 0b010, 0b010, 0b010, 0b100],
        '#' => [0b101, 0b111, 0b101, 0b111, 0b101],
        '_' => [0b000, 0b000, 0b000, 0b000, 0b111],
        ' ' => [0b000, 0b000, 0b000, 0b000, 0b000],
        _ => [0b111, 0b101, 0b010, 0b010, 0b111],
    }
}

/// Pixel width of `text` drawn at `scale`.
pub fn text_width(text: &str, scale: u32) -> u32 {
    let count = text.chars().count() as u32;
    if count == 0 {
        return 0;
    }
    (count * GLYPH_ADVANCE - 1) * scale
}

fn draw_char(image: &mut RgbImage, x: u32, y: u32, ch: char, scale: u32, color: Color) {
    let glyph = glyph_bits(ch.to_ascii_uppercase());
    for (row, pattern) in glyph.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if (pattern >> (2 - col)) & 1 == 1 {
                let px = x + col * scale;
                let py = y + row as u32 * scale;
                fill_rect(image, Rect::new(px, py, scale, scale), color);
            }
        }
    }
}

/// Draws a single line of text; glyphs that would cross the right edge are dropped.
pub fn draw_text(image: &mut RgbImage, x: u32, y: u32, text: &str, scale: u32, color: Color) {
    let scale = scale.max(1);
    let mut cursor = x;
    for ch in text.chars() {
        if cursor + GLYPH_WIDTH * scale > image.width() {
            break;
        }
        draw_char(image, cursor, y, ch, scale, color);
        cursor += GLYPH_ADVANCE * scale;
    }
}

pub fn draw_text_centered(image: &mut RgbImage, rect: Rect, text: &str, scale: u32, color: Color) {
    let width = text_width(text, scale);
    let x = rect.x0 + rect.width().saturating_sub(width) / 2;
    let y = rect.y0 + rect.height().saturating_sub(GLYPH_HEIGHT * scale) / 2;
    draw_text(image, x, y, text, scale, color);
}

/// Largest scale at which `text` fits in `max_width`, capped at `max_scale`.
pub fn fit_scale(text: &str, max_width: u32, max_scale: u32) -> u32 {
    let unit = text_width(text, 1).max(1);
    (max_width / unit).clamp(1, max_scale.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_interpolates_between_stops() {
        let stops = [
            ColorStop {
                at: 0.0,
                color: Color::new(0, 0, 0),
            },
            ColorStop {
                at: 1.0,
                color: Color::new(200, 100, 0),
            },
        ];
        assert_eq!(sample_gradient(&stops, 0.5), Color::new(100, 50, 0));
        assert_eq!(sample_gradient(&stops, 3.0), Color::new(200, 100, 0));
    }

    #[test]
    fn text_is_clipped_to_the_canvas() {
        let mut image = RgbImage::new(10, 10);
        let white = Color::new(255, 255, 255);
        draw_text(&mut image, 0, 0, "1111", 1, white);
        // "1" has its middle column lit in the top row.
        assert_eq!(image.get_pixel(1, 0).0, [255, 255, 255]);
        assert_eq!(image.get_pixel(5, 0).0, [255, 255, 255]);
        assert_eq!(image.get_pixel(9, 0).0, [0, 0, 0]);
    }

    #[test]
    fn text_width_scales() {
        assert_eq!(text_width("AB", 1), 7);
        assert_eq!(text_width("AB", 2), 14);
        assert_eq!(text_width("", 3), 0);
        assert_eq!(fit_scale("AB", 30, 3), 3);
        assert_eq!(fit_scale("AB", 5, 3), 1);
    }

    #[test]
    fn blit_centers_the_source() {
        let mut canvas = RgbImage::new(10, 4);
        let source = RgbImage::from_pixel(2, 2, Rgb([9, 9, 9]));
        blit_fit(&mut canvas, &source, Rect::new(0, 0, 10, 4));
        assert_eq!(canvas.get_pixel(3, 0).0, [9, 9, 9]);
        assert_eq!(canvas.get_pixel(0, 0).0, [0, 0, 0]);
    }
}
