use serde::{Serialize, Deserialize};

use crate::data::PIXEL_SCALE;
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;
use crate::network::spec::DIGIT_INPUT_SHAPE;

/// An interleaved 8-bit pixel buffer as produced by a canvas or an image
/// decoder. Row-major, `channels` values per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    width: usize,
    height: usize,
    channels: usize,
    pixels: Vec<u8>,
}

impl RawImage {
    /// Accepts RGB (3) or RGBA (4) buffers whose length matches the
    /// dimensions.
    pub fn new(width: usize, height: usize, channels: usize, pixels: Vec<u8>) -> Result<RawImage> {
        if channels != 3 && channels != 4 {
            return Err(Error::config(format!("expected 3 or 4 channels, got {}", channels)));
        }
        if width == 0 || height == 0 {
            return Err(Error::config(format!("empty image {}x{}", width, height)));
        }
        let needed = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(channels))
            .ok_or_else(|| Error::config(format!("{}x{}x{} image is too large", width, height, channels)))?;
        if pixels.len() != needed {
            return Err(Error::config(format!(
                "{}x{}x{} image needs {} bytes, got {}",
                width, height, channels, needed, pixels.len()
            )));
        }
        Ok(RawImage { width, height, channels, pixels })
    }

    pub fn from_rgba(width: usize, height: usize, pixels: Vec<u8>) -> Result<RawImage> {
        RawImage::new(width, height, 4, pixels)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// How a color pixel collapses to one intensity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grayscale {
    /// Keep the red channel only. Exact for monochrome drawings, where all
    /// color channels carry the same value.
    #[default]
    FirstChannel,
    /// ITU-R BT.601 weighted sum of red, green and blue.
    Luminance,
}

/// Align-corners bilinear resize. Returns a `[out_height, out_width,
/// channels]` tensor of unscaled pixel values; a same-size resize returns
/// the input values unchanged.
pub fn resize_bilinear(image: &RawImage, out_width: usize, out_height: usize) -> Tensor {
    let c = image.channels;
    let scale = |input: usize, output: usize| {
        if output > 1 { (input - 1) as f64 / (output - 1) as f64 } else { 0.0 }
    };
    let sy = scale(image.height, out_height);
    let sx = scale(image.width, out_width);
    let at = |y: usize, x: usize, ch: usize| image.pixels[(y * image.width + x) * c + ch] as f64;

    let mut out = Tensor::zeros(&[out_height, out_width, c]);
    for y in 0..out_height {
        let fy = y as f64 * sy;
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(image.height - 1);
        let dy = fy - y0 as f64;
        for x in 0..out_width {
            let fx = x as f64 * sx;
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(image.width - 1);
            let dx = fx - x0 as f64;
            for ch in 0..c {
                let top = at(y0, x0, ch) + (at(y0, x1, ch) - at(y0, x0, ch)) * dx;
                let bottom = at(y1, x0, ch) + (at(y1, x1, ch) - at(y1, x0, ch)) * dx;
                out.data[(y * out_width + x) * c + ch] = top + (bottom - top) * dy;
            }
        }
    }
    out
}

/// Turns an arbitrary canvas image into a `[1, 28, 28, 1]` model input:
/// resize, first channel, scale into `[0, 1]`, add the batch dimension.
pub fn preprocess(image: &RawImage) -> Result<Tensor> {
    preprocess_with(image, Grayscale::FirstChannel)
}

pub fn preprocess_with(image: &RawImage, grayscale: Grayscale) -> Result<Tensor> {
    let [h, w, _] = DIGIT_INPUT_SHAPE;
    let resized = resize_bilinear(image, w, h);
    let c = image.channels;
    let gray = resized
        .data
        .chunks(c)
        .map(|px| {
            let v = match grayscale {
                Grayscale::FirstChannel => px[0],
                Grayscale::Luminance => 0.299 * px[0] + 0.587 * px[1] + 0.114 * px[2],
            };
            v / PIXEL_SCALE
        })
        .collect();
    Ok(Tensor::from_vec(&DIGIT_INPUT_SHAPE, gray)?.expand_dims(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(size: usize) -> RawImage {
        let pixels = (0..size * size)
            .flat_map(|i| {
                let v = (i * 7 % 256) as u8;
                [v, 255 - v, v / 2, 255]
            })
            .collect();
        RawImage::from_rgba(size, size, pixels).unwrap()
    }

    #[test]
    fn same_size_resize_is_identity() {
        let image = gradient_image(28);
        let resized = resize_bilinear(&image, 28, 28);
        let original: Vec<f64> = image.pixels().iter().map(|&p| p as f64).collect();
        assert_eq!(resized.data, original);
    }

    #[test]
    fn align_corners_keeps_the_corners() {
        let image = gradient_image(100);
        let resized = resize_bilinear(&image, 28, 28);
        assert_eq!(resized.data[0], image.pixels()[0] as f64);
        let last_in = (100 * 100 - 1) * 4;
        let last_out = (28 * 28 - 1) * 4;
        assert!((resized.data[last_out] - image.pixels()[last_in] as f64).abs() < 1e-9);
    }

    #[test]
    fn upscaling_interpolates_midpoints() {
        let image = RawImage::new(2, 1, 3, vec![0, 0, 0, 200, 100, 50]).unwrap();
        let resized = resize_bilinear(&image, 3, 1);
        assert_eq!(&resized.data[3..6], &[100.0, 50.0, 25.0]);
    }

    #[test]
    fn preprocess_yields_unit_range_batch_of_one() {
        let x = preprocess(&gradient_image(280)).unwrap();
        assert_eq!(x.shape, vec![1, 28, 28, 1]);
        assert!(x.data.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn luminance_mixes_channels() {
        let image = RawImage::new(1, 1, 3, vec![255, 0, 0]).unwrap();
        let first = preprocess_with(&image, Grayscale::FirstChannel).unwrap();
        let lum = preprocess_with(&image, Grayscale::Luminance).unwrap();
        assert_eq!(first.data[0], 1.0);
        assert!((lum.data[0] - 0.299).abs() < 1e-12);
    }

    #[test]
    fn malformed_buffers_are_rejected() {
        assert!(matches!(RawImage::new(2, 2, 2, vec![0; 8]), Err(Error::Configuration(_))));
        assert!(matches!(RawImage::from_rgba(2, 2, vec![0; 15]), Err(Error::Configuration(_))));
    }

    #[test]
    fn overflowing_dimensions_are_rejected() {
        assert!(matches!(RawImage::from_rgba(1 << 62, 1, vec![]), Err(Error::Configuration(_))));
        assert!(matches!(RawImage::new(usize::MAX, 2, 3, vec![]), Err(Error::Configuration(_))));
    }
}
