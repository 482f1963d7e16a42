use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use super::CaptureError;

/// Quality tuned for latency over fidelity, matching what the detection
/// service expects from its clients.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Encode a frame as the `data:image/jpeg;base64,` URL the detect endpoint
/// takes in its `frame` field.
pub fn encode_frame(frame: &RgbImage, quality: u8) -> Result<String, CaptureError> {
    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
    frame
        .write_with_encoder(encoder)
        .map_err(CaptureError::Encode)?;

    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg)))
}
