//! Decoders for the IDX binary format MNIST ships in.
//!
//! # IDX3 image file layout
//! ```text
//! bytes  0-1:   0x00 0x00   (reserved, must be zero)
//! byte   2:     0x08        (dtype = uint8)
//! byte   3:     0x03        (number of dimensions = 3)
//! bytes  4-7:   N           (number of images, big-endian u32)
//! bytes  8-11:  rows        (image height in pixels, big-endian u32)
//! bytes 12-15:  cols        (image width in pixels, big-endian u32)
//! bytes 16..:   N * rows * cols bytes, row-major, uint8
//! ```
//!
//! # IDX1 label file layout
//! ```text
//! bytes  0-1:   0x00 0x00   (reserved, must be zero)
//! byte   2:     0x08        (dtype = uint8)
//! byte   3:     0x01        (number of dimensions = 1)
//! bytes  4-7:   N           (number of labels, big-endian u32)
//! bytes  8..:   N bytes, each a class index
//! ```

use crate::data::PIXEL_SCALE;
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

fn read_u32(bytes: &[u8], offset: usize) -> usize {
    u32::from_be_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]) as usize
}

fn check_header(bytes: &[u8], what: &str, header_len: usize, dims: u8) -> Result<()> {
    if bytes.len() < header_len {
        return Err(Error::load(format!(
            "IDX {} file too short: expected at least {} header bytes, got {}",
            what, header_len, bytes.len()
        )));
    }
    if bytes[0] != 0x00 || bytes[1] != 0x00 {
        return Err(Error::load(format!(
            "IDX {} file: bytes 0-1 must be 0x00 0x00 (reserved), got 0x{:02X} 0x{:02X}",
            what, bytes[0], bytes[1]
        )));
    }
    if bytes[2] != 0x08 {
        return Err(Error::load(format!(
            "IDX {} file: byte 2 (dtype) must be 0x08 (uint8), got 0x{:02X}",
            what, bytes[2]
        )));
    }
    if bytes[3] != dims {
        return Err(Error::load(format!(
            "IDX {} file: byte 3 (dimensions) must be {}, got {}",
            what, dims, bytes[3]
        )));
    }
    Ok(())
}

/// Decodes an IDX3 image file into a `[N, rows, cols, 1]` tensor with pixels
/// scaled into `[0, 1]`. At most `limit` images are decoded.
pub fn parse_images(bytes: &[u8], limit: Option<usize>) -> Result<Tensor> {
    check_header(bytes, "image", 16, 3)?;
    let declared = read_u32(bytes, 4);
    let rows = read_u32(bytes, 8);
    let cols = read_u32(bytes, 12);

    let n_pixels = rows
        .checked_mul(cols)
        .ok_or_else(|| Error::load(format!("IDX image file: {}x{} pixels overflow", rows, cols)))?;
    let required = declared
        .checked_mul(n_pixels)
        .and_then(|n| n.checked_add(16))
        .ok_or_else(|| Error::load("IDX image file: data length overflows"))?;
    if bytes.len() < required {
        return Err(Error::load(format!(
            "IDX image file too short: header declares {} images of {}x{} pixels, \
             but file is only {} bytes",
            declared, rows, cols, bytes.len()
        )));
    }

    let n = limit.map_or(declared, |l| l.min(declared));
    let data = bytes[16..16 + n * n_pixels]
        .iter()
        .map(|&px| px as f64 / PIXEL_SCALE)
        .collect();
    Tensor::from_vec(&[n, rows, cols, 1], data)
}

/// Decodes an IDX1 label file into class indices, rejecting any index
/// `>= num_classes`.
pub fn parse_labels(bytes: &[u8], num_classes: usize, limit: Option<usize>) -> Result<Vec<u8>> {
    check_header(bytes, "label", 8, 1)?;
    let declared = read_u32(bytes, 4);
    if bytes.len() < 8 + declared {
        return Err(Error::load(format!(
            "IDX label file too short: header declares {} labels but file is only {} bytes",
            declared, bytes.len()
        )));
    }

    let n = limit.map_or(declared, |l| l.min(declared));
    let labels = bytes[8..8 + n].to_vec();
    if let Some((i, &class)) = labels.iter().enumerate().find(|(_, &c)| c as usize >= num_classes) {
        return Err(Error::load(format!(
            "IDX label at index {}: class {} is out of range for {} classes",
            i, class, num_classes
        )));
    }
    Ok(labels)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn idx3(images: &[[u8; 4]]) -> Vec<u8> {
        let mut bytes = vec![0, 0, 8, 3];
        bytes.extend((images.len() as u32).to_be_bytes());
        bytes.extend(2u32.to_be_bytes());
        bytes.extend(2u32.to_be_bytes());
        for img in images {
            bytes.extend(img);
        }
        bytes
    }

    pub(crate) fn idx1(labels: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0, 0, 8, 1];
        bytes.extend((labels.len() as u32).to_be_bytes());
        bytes.extend(labels);
        bytes
    }

    #[test]
    fn images_are_scaled_to_unit_range() {
        let t = parse_images(&idx3(&[[0, 255, 51, 0], [255; 4]]), None).unwrap();
        assert_eq!(t.shape, vec![2, 2, 2, 1]);
        assert_eq!(t.data[1], 1.0);
        assert!((t.data[2] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn limit_truncates() {
        let t = parse_images(&idx3(&[[1; 4], [2; 4], [3; 4]]), Some(2)).unwrap();
        assert_eq!(t.batch_size(), 2);
        assert_eq!(parse_labels(&idx1(&[1, 2, 3]), 10, Some(1)).unwrap(), vec![1]);
    }

    #[test]
    fn bad_headers_are_load_errors() {
        let mut bytes = idx3(&[[0; 4]]);
        bytes[3] = 2;
        assert!(matches!(parse_images(&bytes, None), Err(Error::Load(_))));
        let truncated = &idx3(&[[0; 4]])[..18];
        assert!(matches!(parse_images(truncated, None), Err(Error::Load(_))));
        assert!(matches!(parse_labels(&idx1(&[3, 11]), 10, None), Err(Error::Load(_))));
    }
}
