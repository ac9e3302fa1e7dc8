use crate::image_decoder::{DecodedImage, TARGET_SIZE};
use ndarray::{s, Array3, Array4, Axis};
use thiserror::Error;

pub const CHANNELS: usize = 3;

#[derive(Error, Debug, PartialEq)]
pub enum PreprocessError {
    #[error("expected a {expected:?} pixel grid with 3 or 4 channels, got {got:?}")]
    Shape {
        expected: (usize, usize),
        got: Vec<usize>,
    },
}

/// Scales a decoded 224x224 grid to `[0, 1]` floats, keeping only the first
/// three channels. Output shape is `(224, 224, 3)`.
pub fn normalize(image: &DecodedImage) -> Result<Array3<f32>, PreprocessError> {
    let side = TARGET_SIZE as usize;
    if image.height() != side || image.width() != side || !(3..=4).contains(&image.channels()) {
        return Err(PreprocessError::Shape {
            expected: (side, side),
            got: image.pixels.shape().to_vec(),
        });
    }

    let rgb = image.pixels.slice(s![.., .., ..CHANNELS]);
    Ok(rgb.mapv(|value| value as f32 / 255.))
}

/// Adds the leading batch axis of size 1.
pub fn batch(tensor: Array3<f32>) -> Array4<f32> {
    tensor.insert_axis(Axis(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn grid(channels: usize, fill: impl Fn(usize, usize, usize) -> u8) -> DecodedImage {
        DecodedImage {
            pixels: Array3::from_shape_fn((224, 224, channels), |(y, x, c)| fill(y, x, c)),
        }
    }

    #[test]
    fn test_normalize_shape_and_range() {
        let image = grid(3, |y, x, c| ((y * 7 + x * 3 + c * 11) % 256) as u8);

        let tensor = normalize(&image).unwrap();

        assert_eq!(tensor.shape(), &[224, 224, 3]);
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_normalize_scales_linearly() {
        let image = grid(3, |_, _, c| [0, 51, 255][c]);

        let tensor = normalize(&image).unwrap();

        assert_eq!(tensor[[0, 0, 0]], 0.0);
        assert_eq!(tensor[[5, 9, 1]], 0.2);
        assert_eq!(tensor[[223, 223, 2]], 1.0);
    }

    #[test]
    fn test_alpha_channel_is_dropped() {
        let colour = |y: usize, x: usize, c: usize| ((y * 13 + x * 5 + c * 29) % 256) as u8;
        let rgba = grid(4, |y, x, c| if c == 3 { (x % 256) as u8 } else { colour(y, x, c) });
        let rgb = grid(3, colour);

        let from_rgba = normalize(&rgba).unwrap();
        let from_rgb = normalize(&rgb).unwrap();

        assert_eq!(from_rgba.shape(), &[224, 224, 3]);
        assert_eq!(from_rgba, from_rgb);
    }

    #[test]
    fn test_wrong_spatial_size_is_rejected() {
        let image = DecodedImage {
            pixels: Array3::zeros((100, 224, 3)),
        };

        let result = normalize(&image);

        assert_eq!(
            result,
            Err(PreprocessError::Shape {
                expected: (224, 224),
                got: vec![100, 224, 3],
            })
        );
    }

    #[test]
    fn test_wrong_channel_count_is_rejected() {
        let image = DecodedImage {
            pixels: Array3::zeros((224, 224, 1)),
        };

        assert!(normalize(&image).is_err());
    }

    #[test]
    fn test_batch_adds_leading_axis() {
        let tensor = Array3::<f32>::zeros((224, 224, 3));

        let batched = batch(tensor);

        assert_eq!(batched.shape(), &[1, 224, 224, 3]);
    }
}
