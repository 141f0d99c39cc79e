use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};

pub const MODEL_INPUT_WIDTH: u32 = 160;
pub const MODEL_INPUT_HEIGHT: u32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
}

impl Default for InputShape {
    fn default() -> Self {
        Self {
            width: MODEL_INPUT_WIDTH,
            height: MODEL_INPUT_HEIGHT,
            channels: 1,
        }
    }
}

/// Grayscale NHWC tensor data in `[0, 255]`, batch size one.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub shape: InputShape,
    pub data: Vec<f32>,
}

impl Observation {
    /// Stacks one grayscale channel per camera. A missing camera repeats the first one.
    pub fn from_images(images: &[RgbImage], shape: InputShape) -> Option<Self> {
        let first = images.first()?;
        let planes: Vec<Vec<u8>> = (0..shape.channels)
            .map(|c| {
                let source = images.get(c).unwrap_or(first);
                let gray = DynamicImage::ImageRgb8(source.clone()).to_luma8();
                let resized = if gray.dimensions() == (shape.width, shape.height) {
                    gray
                } else {
                    imageops::resize(&gray, shape.width, shape.height, FilterType::Triangle)
                };
                resized.into_raw()
            })
            .collect();

        let pixels = (shape.width * shape.height) as usize;
        let mut data = Vec::with_capacity(pixels * shape.channels);
        for i in 0..pixels {
            for plane in &planes {
                data.push(plane[i] as f32);
            }
        }
        Some(Self { shape, data })
    }

    pub fn tensor_shape(&self) -> [usize; 4] {
        [
            1,
            self.shape.height as usize,
            self.shape.width as usize,
            self.shape.channels,
        ]
    }

    pub fn channel_means(&self) -> Vec<f32> {
        let channels = self.shape.channels.max(1);
        let mut sums = vec![0.0f64; channels];
        for (i, value) in self.data.iter().enumerate() {
            sums[i % channels] += *value as f64;
        }
        let pixels = (self.data.len() / channels).max(1) as f64;
        sums.into_iter().map(|s| (s / pixels) as f32).collect()
    }

    /// Copy with the rectangle `[x0, x1) x [y0, y1)` replaced by `fill` per channel.
    pub fn occluded(&self, x0: u32, y0: u32, x1: u32, y1: u32, fill: &[f32]) -> Self {
        let mut data = self.data.clone();
        let channels = self.shape.channels;
        for y in y0..y1.min(self.shape.height) {
            for x in x0..x1.min(self.shape.width) {
                let base = ((y * self.shape.width + x) as usize) * channels;
                for c in 0..channels {
                    data[base + c] = fill[c];
                }
            }
        }
        Self {
            shape: self.shape,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn stacks_channels_in_nhwc_order() {
        let dark = RgbImage::from_pixel(4, 2, Rgb([10, 10, 10]));
        let shape = InputShape {
            width: 4,
            height: 2,
            channels: 2,
        };
        let observation = Observation::from_images(&[dark], shape).unwrap();
        assert_eq!(observation.data.len(), 16);
        assert_eq!(observation.tensor_shape(), [1, 2, 4, 2]);
        assert!(observation.data.iter().all(|v| *v == 10.0));
    }

    #[test]
    fn occlusion_fills_only_the_patch() {
        let image = RgbImage::from_pixel(4, 4, Rgb([200, 200, 200]));
        let shape = InputShape {
            width: 4,
            height: 4,
            channels: 1,
        };
        let observation = Observation::from_images(&[image], shape).unwrap();
        let occluded = observation.occluded(0, 0, 2, 2, &[0.0]);

        assert_eq!(occluded.data[0], 0.0);
        assert_eq!(occluded.data[5], 0.0);
        assert_eq!(occluded.data[2], 200.0);
        assert_eq!(observation.channel_means(), vec![200.0]);
    }

    #[test]
    fn no_images_means_no_observation() {
        assert!(Observation::from_images(&[], InputShape::default()).is_none());
    }
}
