use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use super::background::Background;
use super::draw::{
    blit_fit, draw_border, draw_text, draw_text_centered, fill_rect, fit_scale, text_width, Rect,
    GLYPH_HEIGHT,
};
use super::palette::{self, overlay_attention};
use crate::bag::{ActionSpace, BagInfo};
use crate::error::RenderError;
use crate::model::Attention;
use crate::pipeline::Step;

#[derive(Debug, Clone)]
pub struct ComposerSettings {
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
    pub relative_labels: bool,
    pub subject: String,
}

#[derive(Debug, Clone, Copy)]
struct Layout {
    header: Rect,
    camera: Rect,
    attention: Rect,
    chart: Rect,
}

impl Layout {
    fn new(width: u32, height: u32) -> Self {
        let margin = (width / 64).max(2);
        let header_h = (height / 14).max(GLYPH_HEIGHT + 4);
        let panels_top = header_h + margin;
        let panels_h = (height * 55 / 100).saturating_sub(panels_top).max(1);
        let panel_w = (width.saturating_sub(margin * 3) / 2).max(1);
        let chart_top = panels_top + panels_h + margin;

        Self {
            header: Rect::new(0, 0, width, header_h),
            camera: Rect::new(margin, panels_top, panel_w, panels_h),
            attention: Rect::new(margin * 2 + panel_w, panels_top, panel_w, panels_h),
            chart: Rect::new(
                margin,
                chart_top,
                width.saturating_sub(margin * 2).max(1),
                height.saturating_sub(chart_top + margin).max(1),
            ),
        }
    }
}

/// Draws the four-panel frame: header, camera, attention overlay and the
/// probability chart. Static chrome is drawn once and copied per frame.
pub struct FrameComposer {
    settings: ComposerSettings,
    layout: Layout,
    action_space: Option<ActionSpace>,
    total_frames: u64,
    base: RgbImage,
    canvas: RgbImage,
    background: Option<Background>,
}

impl FrameComposer {
    pub fn new(settings: ComposerSettings, info: &BagInfo, background: Option<Background>) -> Self {
        let layout = Layout::new(settings.width, settings.height);
        let base = draw_chrome(&settings, &layout);
        let canvas = base.clone();
        Self {
            layout,
            action_space: info.action_space.clone(),
            total_frames: info.total_frames,
            base,
            canvas,
            background,
            settings,
        }
    }

    pub fn compose(&mut self, camera: &RgbImage, attention: &Attention, step: &Step) -> &RgbImage {
        self.canvas.copy_from_slice(&self.base);

        self.draw_header(step);
        blit_fit(&mut self.canvas, camera, self.layout.camera.inset(1));
        let overlay = overlay_attention(camera, attention);
        blit_fit(&mut self.canvas, &overlay, self.layout.attention.inset(1));
        self.draw_panel_titles();
        self.draw_chart(step);

        if let Some(background) = &self.background {
            background.composite(&mut self.canvas);
        }
        &self.canvas
    }

    pub fn render_jpeg(
        &mut self,
        camera: &RgbImage,
        attention: &Attention,
        step: &Step,
    ) -> Result<Vec<u8>, RenderError> {
        let quality = self.settings.jpeg_quality.clamp(1, 100);
        let canvas = self.compose(camera, attention, step);
        let mut buffer = Cursor::new(Vec::with_capacity(256 * 1024));
        JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(canvas)?;
        Ok(buffer.into_inner())
    }

    fn text_scale(&self) -> u32 {
        (self.layout.header.height() / (GLYPH_HEIGHT * 2)).max(1)
    }

    fn draw_header(&mut self, step: &Step) {
        let header = self.layout.header;
        let scale = self.text_scale();
        let y = header.y0 + header.height().saturating_sub(GLYPH_HEIGHT * scale) / 2;
        let pad = scale * 4;

        draw_text(
            &mut self.canvas,
            header.x0 + pad,
            y,
            &self.settings.subject,
            scale,
            palette::TEXT,
        );

        let time = format_clock(step.timestamp);
        draw_text_centered(&mut self.canvas, header, &time, scale, palette::TEXT);

        let counter = format!("FRAME {}/{}", step.index, self.total_frames);
        let x = header.x1.saturating_sub(text_width(&counter, scale) + pad);
        draw_text(&mut self.canvas, x, y, &counter, scale, palette::MUTED);
    }

    fn draw_panel_titles(&mut self) {
        let scale = (self.text_scale() / 2).max(1);
        for (rect, title) in [
            (self.layout.camera, "CAMERA"),
            (self.layout.attention, "ATTENTION"),
        ] {
            draw_text(
                &mut self.canvas,
                rect.x0 + scale * 3,
                rect.y0 + scale * 3,
                title,
                scale,
                palette::TEXT,
            );
        }
    }

    fn label(&self, action: usize) -> String {
        match &self.action_space {
            Some(space) => space.label(action, self.settings.relative_labels),
            None => action.to_string(),
        }
    }

    fn bar_order(&self, count: usize) -> Vec<usize> {
        match &self.action_space {
            Some(space) if space.len() == count => space.display_order(),
            _ => (0..count).collect(),
        }
    }

    fn draw_chart(&mut self, step: &Step) {
        let count = step
            .model_probabilities
            .len()
            .max(step.vehicle_probabilities.len());
        if count == 0 {
            return;
        }
        let chart = self.layout.chart.inset(2);
        let slot_w = (chart.width() / count as u32).max(1);

        let bars: Vec<(usize, String)> = self
            .bar_order(count)
            .into_iter()
            .map(|action| (action, self.label(action)))
            .collect();
        let widest = bars
            .iter()
            .map(|(_, label)| label.as_str())
            .max_by_key(|label| label.len())
            .unwrap_or("");
        let scale = fit_scale(widest, slot_w.saturating_sub(4), self.text_scale().min(3));
        let text_h = GLYPH_HEIGHT * scale;

        let bars_top = chart.y0 + text_h * 2 + scale * 2;
        let bars_bottom = chart.y1.saturating_sub(text_h + scale * 3);
        let bar_area = bars_bottom.saturating_sub(bars_top);

        for (slot, (action, label)) in bars.iter().enumerate() {
            let action = *action;
            let slot_rect = Rect::new(chart.x0 + slot as u32 * slot_w, chart.y0, slot_w, chart.height());
            let bar_w = (slot_w * 3 / 5).max(1);
            let bar_x = slot_rect.x0 + (slot_w - bar_w) / 2;

            let model_p = step.model_probabilities.get(action).copied().unwrap_or(0.0);
            let bar_h = (model_p.clamp(0.0, 1.0) * bar_area as f32).round() as u32;
            let color = if step.model_action == Some(action) {
                palette::ACCENT
            } else {
                palette::BAR
            };
            fill_rect(
                &mut self.canvas,
                Rect::new(bar_x, bars_bottom.saturating_sub(bar_h), bar_w, bar_h),
                color,
            );

            if let Some(vehicle_p) = step.vehicle_probabilities.get(action) {
                let marker_y = bars_bottom
                    .saturating_sub((vehicle_p.clamp(0.0, 1.0) * bar_area as f32).round() as u32);
                let marker_w = (slot_w * 4 / 5).max(1);
                fill_rect(
                    &mut self.canvas,
                    Rect::new(
                        slot_rect.x0 + (slot_w - marker_w) / 2,
                        marker_y.saturating_sub(scale),
                        marker_w,
                        scale.max(2),
                    ),
                    palette::VEHICLE_MARKER,
                );
            }

            let value = format!("{model_p:.2}");
            let value_y = bars_bottom
                .saturating_sub(bar_h + text_h + scale * 2)
                .max(chart.y0 + text_h + scale);
            draw_text_centered(
                &mut self.canvas,
                Rect::new(slot_rect.x0, value_y, slot_w, text_h),
                &value,
                scale,
                palette::TEXT,
            );
            draw_text_centered(
                &mut self.canvas,
                Rect::new(slot_rect.x0, bars_bottom + scale * 2, slot_w, text_h),
                label,
                scale,
                color,
            );
        }

        draw_text(
            &mut self.canvas,
            chart.x0,
            chart.y0,
            "BARS: MODEL   LINE: VEHICLE",
            scale,
            palette::MUTED,
        );
    }
}

fn draw_chrome(settings: &ComposerSettings, layout: &Layout) -> RgbImage {
    let mut base = RgbImage::from_pixel(settings.width, settings.height, palette::BACKGROUND.to_rgb());
    fill_rect(&mut base, layout.header, palette::PANEL);
    for rect in [layout.camera, layout.attention, layout.chart] {
        fill_rect(&mut base, rect, palette::PANEL);
        draw_border(&mut base, rect, palette::BORDER);
    }
    base
}

/// `mm:ss.ss` from seconds.
pub fn format_clock(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let minutes = (seconds / 60.0).floor();
    format!("{:02}:{:05.2}", minutes as u64, seconds - minutes * 60.0)
}
