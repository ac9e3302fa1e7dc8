use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array3;
use thiserror::Error;

pub const TARGET_SIZE: u32 = 224;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,
    #[error("{0}")]
    Image(#[from] image::ImageError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("invalid pixel buffer: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Pixel grid in height x width x channel order, 3 (RGB) or 4 (RGBA) channels.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub pixels: Array3<u8>,
}

impl DecodedImage {
    pub fn height(&self) -> usize {
        self.pixels.shape()[0]
    }

    pub fn width(&self) -> usize {
        self.pixels.shape()[1]
    }

    pub fn channels(&self) -> usize {
        self.pixels.shape()[2]
    }
}

pub fn decode(image_data: &[u8]) -> Result<DecodedImage, DecodeError> {
    if image_data.is_empty() {
        return Err(DecodeError::Empty);
    }

    let original_img = image::ImageReader::new(std::io::Cursor::new(image_data))
        .with_guessed_format()?
        .decode()?;

    let img = if original_img.dimensions() == (TARGET_SIZE, TARGET_SIZE) {
        original_img
    } else {
        original_img.resize_exact(TARGET_SIZE, TARGET_SIZE, FilterType::CatmullRom)
    };

    to_pixel_grid(img)
}

// Grayscale and 16-bit sources are widened to 8-bit RGB(A); alpha survives
// so the preprocessor can drop it.
fn to_pixel_grid(img: DynamicImage) -> Result<DecodedImage, DecodeError> {
    let (width, height) = img.dimensions();
    let (channels, raw) = if img.color().has_alpha() {
        (4, img.into_rgba8().into_raw())
    } else {
        (3, img.into_rgb8().into_raw())
    };

    let pixels = Array3::from_shape_vec((height as usize, width as usize, channels), raw)?;
    Ok(DecodedImage { pixels })
}
