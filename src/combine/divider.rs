use std::path::Path;

use chrono::{DateTime, Utc};
use image::imageops::FilterType;
use image::RgbImage;

use crate::render::draw::{draw_text_centered, fill_rect, fit_scale, Rect, GLYPH_HEIGHT};
use crate::render::palette;

/// Title card shown before each clip of a combined video.
pub struct DividerStyle {
    background: Option<RgbImage>,
}

impl DividerStyle {
    pub fn solid() -> Self {
        Self { background: None }
    }

    /// Uses `path` as the card background, darkened so the text stays readable.
    pub fn with_background(path: &Path) -> Result<Self, image::ImageError> {
        let mut image = image::open(path)?.to_rgb8();
        for pixel in image.pixels_mut() {
            for c in pixel.0.iter_mut() {
                *c /= 2;
            }
        }
        Ok(Self {
            background: Some(image),
        })
    }

    pub fn render(
        &self,
        width: u32,
        height: u32,
        subject: &str,
        model: &str,
        timestamp: DateTime<Utc>,
    ) -> RgbImage {
        let mut frame = match &self.background {
            Some(background) => image::imageops::resize(background, width, height, FilterType::Triangle),
            None => {
                let mut frame = RgbImage::new(width, height);
                fill_rect(&mut frame, Rect::new(0, 0, width, height), palette::BACKGROUND);
                frame
            }
        };

        let max_width = width * 9 / 10;
        let title_scale = fit_scale(subject, max_width, (height / (GLYPH_HEIGHT * 6)).max(1));
        let line_scale = (title_scale / 2).max(1);
        let title_h = GLYPH_HEIGHT * title_scale;
        let line_h = GLYPH_HEIGHT * line_scale;
        let top = height.saturating_sub(title_h + 2 * line_h * 2) / 2;

        draw_text_centered(
            &mut frame,
            Rect::new(0, top, width, title_h),
            subject,
            title_scale,
            palette::TEXT,
        );
        let model_top = top + title_h + line_h;
        draw_text_centered(
            &mut frame,
            Rect::new(0, model_top, width, line_h),
            model,
            line_scale.min(fit_scale(model, max_width, line_scale)),
            palette::ACCENT,
        );
        let stamp = timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string();
        draw_text_centered(
            &mut frame,
            Rect::new(0, model_top + line_h * 2, width, line_h),
            &stamp,
            line_scale.min(fit_scale(&stamp, max_width, line_scale)),
            palette::MUTED,
        );
        frame
    }
}
