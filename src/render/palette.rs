use image::{Rgb, RgbImage};

use super::draw::{sample_gradient, Color, ColorStop};
use crate::model::Attention;

pub const BACKGROUND: Color = Color::new(14, 16, 26);
pub const PANEL: Color = Color::new(24, 28, 42);
pub const BORDER: Color = Color::new(60, 66, 90);
pub const TEXT: Color = Color::new(220, 226, 236);
pub const MUTED: Color = Color::new(140, 148, 170);
pub const BAR: Color = Color::new(92, 132, 196);
pub const ACCENT: Color = Color::new(250, 176, 52);
pub const VEHICLE_MARKER: Color = Color::new(120, 230, 150);

const HEAT_STOPS: [ColorStop; 4] = [
    ColorStop {
        at: 0.0,
        color: Color::new(0, 0, 255),
    },
    ColorStop {
        at: 0.33,
        color: Color::new(0, 255, 255),
    },
    ColorStop {
        at: 0.66,
        color: Color::new(255, 255, 0),
    },
    ColorStop {
        at: 1.0,
        color: Color::new(255, 0, 0),
    },
];

/// Heat overlay opacity at full heat.
const MAX_OVERLAY_ALPHA: f32 = 0.75;

pub fn heat_color(value: f32) -> Color {
    sample_gradient(&HEAT_STOPS, value)
}

/// Camera image with the attention map color-mapped and blended over it, weighted by heat.
pub fn overlay_attention(camera: &RgbImage, attention: &Attention) -> RgbImage {
    let (width, height) = camera.dimensions();
    let heat = attention.upsample(width, height);
    let mut out = RgbImage::new(width, height);
    for (i, (x, y, pixel)) in camera.enumerate_pixels().enumerate() {
        let h = heat[i].clamp(0.0, 1.0);
        let alpha = h * MAX_OVERLAY_ALPHA;
        let color = heat_color(h);
        let blend = |base: u8, over: u8| {
            (base as f32 * (1.0 - alpha) + over as f32 * alpha).round() as u8
        };
        out.put_pixel(
            x,
            y,
            Rgb([
                blend(pixel[0], color.r),
                blend(pixel[1], color.g),
                blend(pixel[2], color.b),
            ]),
        );
    }
    out
}
