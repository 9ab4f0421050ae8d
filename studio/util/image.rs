use digit_cnn::RawImage;

/// Decodes image bytes (PNG/JPEG/BMP/GIF) into an RGBA buffer at its
/// original size. Resizing and normalization happen in the classifier.
pub fn image_bytes_to_raw(bytes: &[u8]) -> Result<RawImage, String> {
    let img = image::load_from_memory(bytes).map_err(|e| e.to_string())?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    RawImage::from_rgba(width as usize, height as usize, rgba.into_raw()).map_err(|e| e.to_string())
}
