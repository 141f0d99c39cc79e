use std::path::Path;

use image::imageops::FilterType;
use image::RgbImage;

const ALPHA_TOP: f32 = 0.72;
const ALPHA_BOTTOM: f32 = 0.95;

/// A background image with its gradient-alpha weights folded in ahead of time.
///
/// Compositing a frame is then one multiply-add per channel:
/// `out = frame * alpha(y) + background * (1 - alpha(y))`.
#[derive(Debug, Clone)]
pub struct Background {
    width: u32,
    height: u32,
    row_alpha: Vec<f32>,
    weighted: Vec<f32>,
}

impl Background {
    pub fn load(path: &Path, width: u32, height: u32) -> Result<Self, image::ImageError> {
        let image = image::open(path)?.to_rgb8();
        Ok(Self::from_image(&image, width, height))
    }

    pub fn from_image(image: &RgbImage, width: u32, height: u32) -> Self {
        let resized = image::imageops::resize(image, width, height, FilterType::Triangle);
        let row_alpha: Vec<f32> = (0..height)
            .map(|y| {
                let t = if height > 1 {
                    y as f32 / (height - 1) as f32
                } else {
                    0.0
                };
                ALPHA_TOP + (ALPHA_BOTTOM - ALPHA_TOP) * t
            })
            .collect();

        let mut weighted = Vec::with_capacity((width * height * 3) as usize);
        for (_, y, pixel) in resized.enumerate_pixels() {
            let keep = 1.0 - row_alpha[y as usize];
            weighted.extend(pixel.0.iter().map(|c| *c as f32 * keep));
        }

        Self {
            width,
            height,
            row_alpha,
            weighted,
        }
    }

    pub fn composite(&self, frame: &mut RgbImage) {
        if frame.dimensions() != (self.width, self.height) {
            return;
        }
        let row_len = (self.width * 3) as usize;
        let data: &mut [u8] = frame;
        for (i, value) in data.iter_mut().enumerate() {
            let alpha = self.row_alpha[i / row_len];
            *value = (*value as f32 * alpha + self.weighted[i]).round().min(255.0) as u8;
        }
    }
}
