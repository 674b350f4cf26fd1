use image::GrayImage;
use tracing::trace;

/// First decodable QR payload in a grayscale frame, if any.
///
/// Frames without a readable code are an expected outcome and yield `None`.
pub fn decode_frame(frame: &GrayImage) -> Option<String> {
    let (w, h) = frame.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(w as usize, h as usize, |x, y| {
        frame.get_pixel(x as u32, y as u32).0[0]
    });
    for grid in prepared.detect_grids() {
        match grid.decode() {
            Ok((_meta, content)) => return Some(content),
            Err(e) => trace!(error = ?e, "qr grid found but not decodable"),
        }
    }
    None
}

/// Decode a captured still image in any supported raster format.
pub fn decode_image(image: &image::DynamicImage) -> Option<String> {
    decode_frame(&image.to_luma8())
}
