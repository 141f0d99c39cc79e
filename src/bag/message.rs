use image::{DynamicImage, GrayImage, RgbImage};

use super::cdr::CdrReader;
use crate::error::BagError;

/// Smallest possible serialized `sensor_msgs/Image`: stamp, empty frame id,
/// dimensions, empty encoding, flag, step and an empty data sequence.
const MIN_IMAGE_SIZE: usize = 4 * 7 + 1;
const INFER_RESULT_SIZE: usize = 4 * 6;

#[derive(Debug, Clone, PartialEq)]
pub struct CameraImage {
    pub stamp_sec: i32,
    pub stamp_nanosec: u32,
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    pub step: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferResult {
    pub class_label: i32,
    pub class_prob: f32,
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

/// Decoded `deepracer_interfaces_pkg/InferResultsArray` message.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceMessage {
    pub images: Vec<CameraImage>,
    pub results: Vec<InferResult>,
}

impl InferenceMessage {
    pub fn decode(payload: &[u8]) -> Result<Self, BagError> {
        let mut reader = CdrReader::new(payload)?;

        let image_count = reader.read_sequence_len(MIN_IMAGE_SIZE)?;
        let mut images = Vec::with_capacity(image_count);
        for _ in 0..image_count {
            images.push(read_image(&mut reader)?);
        }

        let result_count = reader.read_sequence_len(INFER_RESULT_SIZE)?;
        let mut results = Vec::with_capacity(result_count);
        for _ in 0..result_count {
            results.push(InferResult {
                class_label: reader.read_i32()?,
                class_prob: reader.read_f32()?,
                x_min: reader.read_f32()?,
                y_min: reader.read_f32()?,
                x_max: reader.read_f32()?,
                y_max: reader.read_f32()?,
            });
        }

        Ok(Self { images, results })
    }

    /// On-vehicle probabilities indexed by class label. Labels outside
    /// `[0, action_count)` are ignored.
    pub fn probabilities(&self, action_count: usize) -> Vec<f32> {
        let count = if action_count == 0 {
            self.results.len()
        } else {
            action_count
        };
        let mut probs = vec![0.0; count];
        for result in &self.results {
            if let Ok(label) = usize::try_from(result.class_label) {
                if label < count {
                    probs[label] = result.class_prob;
                }
            }
        }
        probs
    }

    pub fn primary_image(&self) -> Result<RgbImage, BagError> {
        self.images
            .first()
            .ok_or(BagError::NoImage)
            .and_then(CameraImage::to_rgb)
    }
}

impl CameraImage {
    pub fn to_rgb(&self) -> Result<RgbImage, BagError> {
        let bad_image = || BagError::BadImage {
            encoding: self.encoding.clone(),
            width: self.width,
            height: self.height,
            len: self.data.len(),
        };
        let (width, height) = (self.width, self.height);
        let row = self.step.max(width * self.channels()) as usize;

        match self.encoding.as_str() {
            "rgb8" | "bgr8" => {
                if self.data.len() < row * height as usize {
                    return Err(bad_image());
                }
                let swap = self.encoding == "bgr8";
                let mut pixels = Vec::with_capacity((width * height * 3) as usize);
                for y in 0..height as usize {
                    let line = &self.data[y * row..y * row + width as usize * 3];
                    for px in line.chunks_exact(3) {
                        if swap {
                            pixels.extend_from_slice(&[px[2], px[1], px[0]]);
                        } else {
                            pixels.extend_from_slice(px);
                        }
                    }
                }
                RgbImage::from_raw(width, height, pixels).ok_or_else(bad_image)
            }
            "mono8" => {
                if self.data.len() < row * height as usize {
                    return Err(bad_image());
                }
                let mut pixels = Vec::with_capacity((width * height) as usize);
                for y in 0..height as usize {
                    pixels.extend_from_slice(&self.data[y * row..y * row + width as usize]);
                }
                GrayImage::from_raw(width, height, pixels)
                    .map(|gray| DynamicImage::ImageLuma8(gray).to_rgb8())
                    .ok_or_else(bad_image)
            }
            _ => image::load_from_memory(&self.data)
                .map(|decoded| decoded.to_rgb8())
                .map_err(|_| bad_image()),
        }
    }

    fn channels(&self) -> u32 {
        match self.encoding.as_str() {
            "mono8" => 1,
            _ => 3,
        }
    }
}

fn read_image(reader: &mut CdrReader<'_>) -> Result<CameraImage, BagError> {
    let stamp_sec = reader.read_i32()?;
    let stamp_nanosec = reader.read_u32()?;
    let _frame_id = reader.read_string()?;
    let height = reader.read_u32()?;
    let width = reader.read_u32()?;
    let encoding = reader.read_string()?;
    let _is_bigendian = reader.read_u8()?;
    let step = reader.read_u32()?;
    let data = reader.read_bytes()?.to_vec();
    Ok(CameraImage {
        stamp_sec,
        stamp_nanosec,
        height,
        width,
        encoding,
        step,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::fixtures::encode_message;

    #[test]
    fn decodes_images_and_results() {
        let payload = encode_message(4, 2, [10, 20, 30], &[0.1, 0.7, 0.2]);
        let message = InferenceMessage::decode(&payload).unwrap();

        assert_eq!(message.images.len(), 1);
        assert_eq!(message.images[0].encoding, "bgr8");
        assert_eq!(message.results.len(), 3);
        assert_eq!(message.results[1].class_label, 1);
        assert_eq!(message.results[1].class_prob, 0.7);
    }

    #[test]
    fn bgr_pixels_are_swapped_to_rgb() {
        let payload = encode_message(4, 2, [10, 20, 30], &[1.0]);
        let message = InferenceMessage::decode(&payload).unwrap();
        let rgb = message.primary_image().unwrap();

        assert_eq!(rgb.dimensions(), (4, 2));
        assert_eq!(rgb.get_pixel(3, 1).0, [30, 20, 10]);
    }

    #[test]
    fn probabilities_follow_class_labels() {
        let message = InferenceMessage {
            images: vec![],
            results: vec![
                InferResult {
                    class_label: 2,
                    class_prob: 0.6,
                    x_min: 0.0,
                    y_min: 0.0,
                    x_max: 0.0,
                    y_max: 0.0,
                },
                InferResult {
                    class_label: 9,
                    class_prob: 0.4,
                    x_min: 0.0,
                    y_min: 0.0,
                    x_max: 0.0,
                    y_max: 0.0,
                },
            ],
        };
        assert_eq!(message.probabilities(3), vec![0.0, 0.0, 0.6]);
        assert!(matches!(message.primary_image(), Err(BagError::NoImage)));
    }

    #[test]
    fn short_pixel_buffer_is_rejected() {
        let image = CameraImage {
            stamp_sec: 0,
            stamp_nanosec: 0,
            height: 2,
            width: 2,
            encoding: "rgb8".into(),
            step: 6,
            data: vec![0; 5],
        };
        assert!(matches!(image.to_rgb(), Err(BagError::BadImage { .. })));
    }
}
